//! Contract board, escrowed auctions, and town trading AI for Tradepost.
//!
//! Towns with surplus list it as a [`SellContract`]; towns short of that
//! resource place escrowed bids; the winning bid turns into a
//! [`CourierContract`] that a player claims and delivers. All of it runs on
//! logical ticks, with the world's collaborators passed in through a
//! [`MarketContext`].
//!
//! # Modules
//!
//! - [`ai`] -- Per-town listing and bid scheduling ([`AgentContractAi`]).
//! - [`board`] -- The [`ContractBoard`]: registry, bids, closure, delivery, expiry.
//! - [`config`] -- Market tunables ([`MarketConfig`]).
//! - [`context`] -- Collaborator traits and notification sinks.
//! - [`contract`] -- Contract variants and their state.
//! - [`error`] -- [`BoardError`].
//! - [`pricing`] -- Bid raise, courier cost, and the budget rule.

pub mod ai;
pub mod board;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod pricing;

pub use ai::{AgentContractAi, AiTickReport};
pub use board::{BoardState, CloseOutcome, ContractBoard, ExpirySweep, Settlement};
pub use config::MarketConfig;
pub use context::{
    Clock, DistanceOracle, FixedClock, MarketContext, MemoryNotifier, Notification,
    NotificationSink, TracingNotifier,
};
pub use contract::{Contract, ContractTerms, CourierContract, SellContract};
pub use error::BoardError;
pub use pricing::{AbstainReason, BidDecision};
