//! Tick callback that logs a periodic market report.
//!
//! Running totals accumulate every tick; every `interval` ticks one `info`
//! line summarizes the board and each town's listings.

use tracing::{debug, info, warn};

use tradepost_core::{SimulationState, TickCallback, TickSummary};

/// Running totals since the engine started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketTotals {
    /// Sell contracts listed.
    pub listed: u64,
    /// Bids the board accepted.
    pub bids_accepted: u64,
    /// Auctions that closed with a winner.
    pub auctions_closed: u64,
    /// Listings that expired unsold.
    pub expired_unsold: u64,
    /// Courier jobs that timed out.
    pub courier_timeouts: u64,
    /// Ticks whose escrow audit failed.
    pub audit_failures: u64,
}

/// Logs market activity as the simulation runs.
pub struct ReportCallback {
    interval: u64,
    totals: MarketTotals,
}

impl ReportCallback {
    /// Report every `interval` ticks. 0 disables the periodic report.
    pub const fn new(interval: u64) -> Self {
        Self {
            interval,
            totals: MarketTotals {
                listed: 0,
                bids_accepted: 0,
                auctions_closed: 0,
                expired_unsold: 0,
                courier_timeouts: 0,
                audit_failures: 0,
            },
        }
    }

    /// Totals so far.
    pub const fn totals(&self) -> MarketTotals {
        self.totals
    }

    fn accumulate(&mut self, summary: &TickSummary) {
        let t = &mut self.totals;
        t.listed = t.listed.saturating_add(count(summary.listed));
        t.bids_accepted = t.bids_accepted.saturating_add(count(summary.bids_accepted));
        t.auctions_closed = t
            .auctions_closed
            .saturating_add(count(summary.expirations.closed.len()));
        t.expired_unsold = t
            .expired_unsold
            .saturating_add(count(summary.expirations.expired_unsold.len()));
        t.courier_timeouts = t
            .courier_timeouts
            .saturating_add(count(summary.expirations.courier_timeouts.len()));
        if !summary.escrow_balanced {
            t.audit_failures = t.audit_failures.saturating_add(1);
        }
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl TickCallback for ReportCallback {
    fn on_tick(&mut self, summary: &TickSummary, sim: &SimulationState) {
        self.accumulate(summary);

        if !summary.expirations.is_empty() {
            debug!(
                tick = summary.tick,
                closed = summary.expirations.closed.len(),
                expired_unsold = summary.expirations.expired_unsold.len(),
                courier_timeouts = summary.expirations.courier_timeouts.len(),
                "Deadlines applied"
            );
        }

        let due = summary
            .tick
            .checked_rem(self.interval)
            .is_some_and(|rem| rem == 0);
        if !due {
            return;
        }

        let now = sim.clock.tick();
        let open = sim.board.open_sell_contracts(now).count();
        info!(
            tick = summary.tick,
            contracts = summary.contracts,
            open_auctions = open,
            listed = self.totals.listed,
            bids_accepted = self.totals.bids_accepted,
            auctions_closed = self.totals.auctions_closed,
            expired_unsold = self.totals.expired_unsold,
            courier_timeouts = self.totals.courier_timeouts,
            "Market report"
        );
        for town in sim.world.towns() {
            debug!(
                tick = summary.tick,
                town = %town.name,
                active_contracts = sim.board.active_contracts_for(town.id, now),
                pending_bids = sim.ais.get(&town.id).map_or(0, |ai| ai.pending_bids().len()),
                "Town report"
            );
        }
        if self.totals.audit_failures > 0 {
            warn!(
                audit_failures = self.totals.audit_failures,
                "Escrow audit has failed since startup"
            );
        }
    }
}
