//! Headless market engine for Tradepost.
//!
//! Loads configuration, resumes the saved market or founds the configured
//! towns, and runs the tick loop until the tick limit or Ctrl-C. The board
//! is saved periodically and on shutdown.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tradepost-config.yaml` (or the path given as
//!    the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Resume from the save file, or seed a fresh world
//! 4. Install the Ctrl-C handler
//! 5. Run the simulation loop
//! 6. Log the result

mod error;
mod report_callback;

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tradepost_core::config::LoggingConfig;
use tradepost_core::{
    JsonFileStore, PersistenceStore, RunContext, RunOptions, SimulationConfig, SimulationState,
    runner,
};
use tradepost_market::TracingNotifier;

use crate::error::EngineError;
use crate::report_callback::ReportCallback;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "tradepost-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        config = %config_path.display(),
        world_name = config.world.name,
        seed = config.world.seed,
        tick_interval_ms = config.world.tick_interval_ms,
        max_ticks = config.world.max_ticks,
        "Configuration loaded"
    );

    // 3. Resume or seed.
    let mut store = JsonFileStore::new(&config.persistence.path);
    let mut state = match store.load()? {
        Some(snapshot) => SimulationState::restore(snapshot, &config)?,
        None => {
            info!(path = %store.path().display(), "No save file, founding towns");
            SimulationState::from_config(&config)?
        }
    };
    if state.world.is_empty() {
        warn!("No towns configured; the market will stay empty");
    }

    // 4. Ctrl-C requests a clean stop.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping after the current tick");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    // 5. Run the simulation.
    let mut notifier = TracingNotifier;
    let mut callback = ReportCallback::new(config.persistence.save_interval_ticks);
    let run = RunContext {
        notifier: &mut notifier,
        store: &mut store,
        callback: &mut callback,
    };
    let result = runner::run_simulation(
        &mut state,
        run,
        RunOptions::from_config(&config),
        shutdown_rx,
    )
    .await
    .map_err(EngineError::from)?;

    // 6. Log results.
    runner::log_simulation_end(&result);
    let totals = callback.totals();
    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        listed = totals.listed,
        bids_accepted = totals.bids_accepted,
        save = %store.path().display(),
        "tradepost-engine shutdown complete"
    );

    Ok(())
}

/// Load the simulation configuration, falling back to defaults when the
/// file does not exist. Environment overrides apply either way.
fn load_config(path: &Path) -> Result<SimulationConfig, EngineError> {
    if path.exists() {
        return Ok(SimulationConfig::from_file(path)?);
    }
    let mut config = SimulationConfig::default();
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}
