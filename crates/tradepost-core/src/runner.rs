//! Simulation loop runner.
//!
//! [`run_simulation`] drives [`run_tick`] at a fixed interval until the tick
//! limit is reached or shutdown is requested. Dirty board state is saved
//! every `save_interval_ticks` and once more on the way out.
//!
//! [`run_tick`]: crate::tick::run_tick

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use tradepost_market::NotificationSink;

use crate::config::SimulationConfig;
use crate::persistence::{PersistenceError, PersistenceStore};
use crate::tick::{self, SimulationState, TickError, TickSummary};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },

    /// The final save failed.
    #[error("persistence error: {source}")]
    Persistence {
        /// The underlying persistence error.
        #[from]
        source: PersistenceError,
    },
}

/// Why the simulation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationEndReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// Shutdown was requested (Ctrl-C or the shutdown channel).
    ShutdownRequested,
}

/// Loop bounds and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop after this tick. 0 runs until shutdown.
    pub max_ticks: u64,
    /// Wall-clock pause between ticks. 0 runs flat out.
    pub tick_interval_ms: u64,
    /// Ticks between periodic saves. 0 saves only at the end.
    pub save_interval_ticks: u64,
}

impl RunOptions {
    /// Options taken from the loaded configuration.
    pub const fn from_config(config: &SimulationConfig) -> Self {
        Self {
            max_ticks: config.world.max_ticks,
            tick_interval_ms: config.world.tick_interval_ms,
            save_interval_ticks: config.persistence.save_interval_ticks,
        }
    }

    const fn tick_limit_reached(&self, tick: u64) -> bool {
        self.max_ticks > 0 && tick >= self.max_ticks
    }

    const fn save_due(&self, tick: u64) -> bool {
        matches!(tick.checked_rem(self.save_interval_ticks), Some(0))
    }
}

/// Result of the simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks executed in this run.
    pub total_ticks: u64,
}

/// Callback invoked after each tick completes.
pub trait TickCallback: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary, state: &SimulationState);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _state: &SimulationState) {}
}

/// Where the loop sends notifications and snapshots.
pub struct RunContext<'a> {
    /// Notifications for towns.
    pub notifier: &'a mut dyn NotificationSink,
    /// Snapshot store.
    pub store: &'a mut dyn PersistenceStore,
    /// Called after each tick.
    pub callback: &'a mut dyn TickCallback,
}

/// Run the simulation loop until a termination condition is met.
///
/// `shutdown` flipping to `true` stops the loop between ticks; a sleeping
/// loop wakes immediately. Periodic save failures are logged and retried at
/// the next interval.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails or the final save fails.
pub async fn run_simulation(
    state: &mut SimulationState,
    run: RunContext<'_>,
    options: RunOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<SimulationResult, RunnerError> {
    let RunContext {
        notifier,
        store,
        callback,
    } = run;
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        start_tick = state.clock.tick(),
        max_ticks = options.max_ticks,
        tick_interval_ms = options.tick_interval_ms,
        save_interval_ticks = options.save_interval_ticks,
        towns = state.world.len(),
        "Simulation starting"
    );

    let end_reason = loop {
        // --- Check shutdown (before tick) ---
        if *shutdown.borrow() {
            info!("Shutdown requested");
            break SimulationEndReason::ShutdownRequested;
        }

        // --- Check tick limit (before tick) ---
        if options.tick_limit_reached(state.clock.tick()) {
            info!(
                tick = state.clock.tick(),
                max_ticks = options.max_ticks,
                "Tick limit reached"
            );
            break SimulationEndReason::MaxTicksReached;
        }

        // --- Execute tick ---
        let summary = tick::run_tick(state, notifier)?;
        total_ticks = total_ticks.saturating_add(1);

        if !summary.escrow_balanced {
            warn!(tick = summary.tick, "Escrow audit failed");
        }

        callback.on_tick(&summary, state);

        // --- Periodic save ---
        if options.save_due(summary.tick) && state.board.is_dirty() {
            match store.save(&state.snapshot()) {
                Ok(()) => state.board.mark_clean(),
                Err(e) => warn!(tick = summary.tick, error = %e, "Periodic save failed"),
            }
        }

        last_summary = Some(summary);

        // --- Sleep for tick interval ---
        if options.tick_interval_ms > 0 {
            let sleep = tokio::time::sleep(tokio::time::Duration::from_millis(
                options.tick_interval_ms,
            ));
            tokio::pin!(sleep);
            tokio::select! {
                () = &mut sleep => {}
                changed = shutdown.changed() => {
                    // Sender dropped: nobody can request shutdown anymore.
                    if changed.is_err() {
                        sleep.await;
                    }
                }
            }
        }
    };

    // --- Final save ---
    store.save(&state.snapshot())?;
    state.board.mark_clean();

    Ok(SimulationResult {
        end_reason,
        final_summary: last_summary,
        total_ticks,
    })
}

/// Log the simulation end sequence.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        "Simulation ended"
    );

    if let Some(ref summary) = result.final_summary {
        info!(
            tick = summary.tick,
            contracts = summary.contracts,
            escrow_balanced = summary.escrow_balanced,
            "Final tick summary"
        );
    } else {
        warn!("Simulation ended with no ticks executed");
    }
}
