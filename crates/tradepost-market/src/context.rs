//! Collaborators the market reads from and writes to.
//!
//! The board and the town AI never look anything up globally. Everything
//! they need from the surrounding world arrives in a [`MarketContext`]:
//!
//! - a [`ResourceLedger`] for balances and escrow debits/credits,
//! - a [`DistanceOracle`] for courier pricing,
//! - a [`NotificationSink`] for informational messages to towns,
//! - a [`Clock`] giving the current logical tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use tradepost_ledger::ResourceLedger;
use tradepost_types::AgentId;

/// Distance between two towns, used to price courier jobs.
pub trait DistanceOracle {
    /// Distance between the towns. Unknown towns are infinitely far apart.
    fn distance(&self, a: AgentId, b: AgentId) -> f64;
}

/// Best-effort delivery of messages to towns.
///
/// Delivery may silently fail; the market never depends on it.
pub trait NotificationSink {
    /// Send `message` to `agent`.
    fn notify(&mut self, agent: AgentId, message: &str);
}

/// Source of the current simulation tick.
pub trait Clock {
    /// The current tick.
    fn now(&self) -> u64;
}

/// A clock frozen at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Everything a board or AI operation needs from the world.
pub struct MarketContext<'a> {
    /// Town balances.
    pub ledger: &'a mut dyn ResourceLedger,
    /// Town distances.
    pub oracle: &'a dyn DistanceOracle,
    /// Outgoing messages.
    pub notifier: &'a mut dyn NotificationSink,
    /// Current tick.
    pub clock: &'a dyn Clock,
}

impl MarketContext<'_> {
    /// The current tick.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

// ---------------------------------------------------------------------------
// Notification sinks
// ---------------------------------------------------------------------------

/// A message sent to a town.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient town.
    pub agent: AgentId,
    /// Message text.
    pub message: String,
    /// Wall-clock time the message was produced.
    pub sent_at: DateTime<Utc>,
}

/// Writes every notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&mut self, agent: AgentId, message: &str) {
        info!(target: "tradepost::notify", %agent, message, "Town notified");
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    notifications: Vec<Notification>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    pub const fn new() -> Self {
        Self {
            notifications: Vec::new(),
        }
    }

    /// All notifications, oldest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Notifications addressed to `agent`.
    pub fn for_agent(&self, agent: AgentId) -> Vec<&Notification> {
        self.notifications
            .iter()
            .filter(|n| n.agent == agent)
            .collect()
    }

    /// Remove and return everything collected so far.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify(&mut self, agent: AgentId, message: &str) {
        self.notifications.push(Notification {
            agent,
            message: message.to_owned(),
            sent_at: Utc::now(),
        });
    }
}
