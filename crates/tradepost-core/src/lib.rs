//! World clock, configuration, tick cycle, and orchestration for Tradepost.
//!
//! This crate wires the contract market into a running world: it places the
//! towns, advances the logical clock, runs every town's trading AI once per
//! tick, and saves the whole market so a run can resume.
//!
//! # Modules
//!
//! - [`clock`] -- Logical tick counter that every market deadline reads.
//! - [`config`] -- Configuration loading from `tradepost-config.yaml` into
//!   strongly-typed structs.
//! - [`persistence`] -- [`MarketSnapshot`] and the stores that keep it.
//! - [`runner`] -- The async run loop with periodic saves and shutdown.
//! - [`tick`] -- The tick cycle: advance, expire, trade, prune, audit.
//! - [`world`] -- Towns, positions, and the distance oracle.
//!
//! [`MarketSnapshot`]: persistence::MarketSnapshot

pub mod clock;
pub mod config;
pub mod persistence;
pub mod runner;
pub mod tick;
pub mod world;

pub use clock::{ClockError, WorldClock};
pub use config::{ConfigError, SimulationConfig};
pub use persistence::{
    JsonFileStore, MarketSnapshot, MemoryStore, PersistenceError, PersistenceStore,
};
pub use runner::{
    NoOpCallback, RunContext, RunOptions, RunnerError, SimulationEndReason, SimulationResult,
    TickCallback, log_simulation_end, run_simulation,
};
pub use tick::{SimulationState, TickError, TickSummary, run_tick};
pub use world::{Town, World, WorldError};
