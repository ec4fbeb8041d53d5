//! Tick cycle: one synchronous step of the whole market.
//!
//! Each tick runs these phases in order:
//!
//! 1. **Advance** -- move the world clock forward one tick.
//! 2. **Expire** -- close or unwind contracts whose deadlines passed.
//! 3. **Trade** -- run every town's AI in town id order. Scheduled bids
//!    reach the board one at a time, so the first submission wins a tie.
//! 4. **Prune** -- drop settled contracts past retention.
//! 5. **Audit** -- replay the escrow journal against the live holds.
//!
//! Given the same state, seed, and configuration a tick is deterministic.

use std::collections::BTreeMap;

use tracing::{debug, info};

use tradepost_ledger::TownLedger;
use tradepost_market::{
    AgentContractAi, BoardError, ContractBoard, ExpirySweep, MarketContext, NotificationSink,
};
use tradepost_types::AgentId;

use crate::clock::{ClockError, WorldClock};
use crate::config::SimulationConfig;
use crate::persistence::MarketSnapshot;
use crate::world::{World, WorldError};

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A board operation outside any town's AI failed.
    #[error("board error: {source}")]
    Board {
        /// The underlying board error.
        #[from]
        source: BoardError,
    },

    /// A town's AI hit a board error.
    #[error("AI error for {agent_id}: {source}")]
    Agent {
        /// The town whose AI failed.
        agent_id: AgentId,
        /// The underlying board error.
        source: BoardError,
    },

    /// The world could not be built.
    #[error("world error: {source}")]
    World {
        /// The underlying world error.
        #[from]
        source: WorldError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Deadlines applied this tick.
    pub expirations: ExpirySweep,
    /// Sell contracts listed.
    pub listed: usize,
    /// Bids scheduled.
    pub bids_scheduled: usize,
    /// Bids submitted to the board.
    pub bids_submitted: usize,
    /// Submitted bids the board accepted.
    pub bids_accepted: usize,
    /// Contracts removed by pruning.
    pub pruned: usize,
    /// Contracts on the board at the end of the tick.
    pub contracts: usize,
    /// Whether the escrow audit passed.
    pub escrow_balanced: bool,
}

/// The mutable state the tick cycle runs on.
#[derive(Debug)]
pub struct SimulationState {
    /// The world clock.
    pub clock: WorldClock,
    /// Towns and positions.
    pub world: World,
    /// Town stock outside escrow.
    pub ledger: TownLedger,
    /// The contract board.
    pub board: ContractBoard,
    /// One AI per town.
    pub ais: BTreeMap<AgentId, AgentContractAi>,
}

impl SimulationState {
    /// Fresh world built from the configured towns.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::World`] if the towns collide.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, TickError> {
        let mut ledger = TownLedger::new();
        let world = World::seed(&config.towns, &mut ledger)?;
        let ais = world
            .ids()
            .map(|id| (id, AgentContractAi::new(id, config.world.seed)))
            .collect();
        Ok(Self {
            clock: WorldClock::new(),
            world,
            ledger,
            board: ContractBoard::new(config.market.clone()),
            ais,
        })
    }

    /// Resume from a snapshot. Market tunables come from `config`, not the
    /// save.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::World`] if the saved towns collide.
    pub fn restore(snapshot: MarketSnapshot, config: &SimulationConfig) -> Result<Self, TickError> {
        let world = World::from_towns(snapshot.towns)?;
        let mut pending = snapshot.pending_bids;
        let ais = world
            .ids()
            .map(|id| {
                let bids = pending.remove(&id).unwrap_or_default();
                (id, AgentContractAi::with_pending(id, config.world.seed, bids))
            })
            .collect();
        info!(
            tick = snapshot.tick,
            towns = world.len(),
            contracts = snapshot.board.contracts.len(),
            "Simulation state restored"
        );
        Ok(Self {
            clock: WorldClock::at(snapshot.tick),
            world,
            ledger: snapshot.ledger,
            board: ContractBoard::from_state(snapshot.board, config.market.clone()),
            ais,
        })
    }

    /// Everything needed to resume from this point.
    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            tick: self.clock.tick(),
            towns: self.world.towns().cloned().collect(),
            ledger: self.ledger.clone(),
            board: self.board.state(),
            pending_bids: self
                .ais
                .iter()
                .filter(|(_, ai)| !ai.pending_bids().is_empty())
                .map(|(id, ai)| (*id, ai.pending_bids().clone()))
                .collect(),
        }
    }
}

/// Execute one complete tick.
///
/// # Errors
///
/// Returns [`TickError`] if the clock overflows or a board operation fails
/// unexpectedly. Rejected bids and abstentions are not errors.
pub fn run_tick(
    state: &mut SimulationState,
    notifier: &mut dyn NotificationSink,
) -> Result<TickSummary, TickError> {
    // --- Phase 1: Advance ---
    let tick = state.clock.advance()?;
    let mut summary = TickSummary {
        tick,
        ..TickSummary::default()
    };

    let mut ctx = MarketContext {
        ledger: &mut state.ledger,
        oracle: &state.world,
        notifier,
        clock: &state.clock,
    };

    // --- Phase 2: Expire ---
    summary.expirations = state.board.process_expirations(&mut ctx)?;

    // --- Phase 3: Trade ---
    for (agent_id, ai) in &mut state.ais {
        let report = ai
            .tick(&mut state.board, &mut ctx)
            .map_err(|source| TickError::Agent {
                agent_id: *agent_id,
                source,
            })?;
        summary.listed = summary.listed.saturating_add(report.listed.len());
        summary.bids_scheduled = summary.bids_scheduled.saturating_add(report.scheduled.len());
        summary.bids_submitted = summary.bids_submitted.saturating_add(report.submitted.len());
        summary.bids_accepted = summary.bids_accepted.saturating_add(
            report
                .submitted
                .iter()
                .filter(|(_, result)| result.is_accepted())
                .count(),
        );
    }

    // --- Phase 4: Prune ---
    summary.pruned = state.board.prune(tick);

    // --- Phase 5: Audit ---
    summary.escrow_balanced = state.board.audit_escrow().is_balanced();
    summary.contracts = state.board.contracts().len();

    debug!(
        tick,
        listed = summary.listed,
        bids_scheduled = summary.bids_scheduled,
        bids_accepted = summary.bids_accepted,
        contracts = summary.contracts,
        "Tick complete"
    );
    Ok(summary)
}
