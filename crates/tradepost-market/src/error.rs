//! Error types for the tradepost-market crate.
//!
//! Ordinary auction outcomes (bid too low, auction closed, ...) are values,
//! see [`BidResult`](tradepost_types::BidResult). The errors here are the
//! cases where a caller asked for something the board cannot do at all.

use tradepost_ledger::LedgerError;
use tradepost_types::{AgentId, ContractId, ContractKind, ResourceId};

/// Errors raised by [`ContractBoard`](crate::ContractBoard) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// No contract with this id is on the board.
    #[error("contract not found: {0}")]
    ContractNotFound(ContractId),

    /// The operation needs a different contract variant.
    #[error("contract {contract_id} is a {actual:?} contract, expected {expected:?}")]
    WrongKind {
        /// The contract addressed.
        contract_id: ContractId,
        /// The variant the operation works on.
        expected: ContractKind,
        /// The variant found on the board.
        actual: ContractKind,
    },

    /// A contract with this id is already registered.
    #[error("duplicate contract id: {0}")]
    DuplicateContract(ContractId),

    /// Quantities must be strictly positive.
    #[error("invalid quantity {quantity} for contract listing")]
    InvalidQuantity {
        /// The rejected quantity.
        quantity: i64,
    },

    /// Unit prices must be strictly positive.
    #[error("invalid unit price {price}")]
    InvalidPrice {
        /// The rejected price.
        price: i64,
    },

    /// The currency itself cannot be listed for sale.
    #[error("{0} is the market currency and cannot be listed")]
    CurrencyListing(ResourceId),

    /// The issuer does not hold the goods it tried to list.
    #[error("{agent} cannot supply {requested} {resource} (holds {available})")]
    InsufficientGoods {
        /// The issuing town.
        agent: AgentId,
        /// The resource listed.
        resource: ResourceId,
        /// Quantity requested.
        requested: i64,
        /// Quantity held.
        available: i64,
    },

    /// Delivery was reported before any player took the courier job.
    #[error("courier contract {0} has no courier assigned")]
    CourierUnassigned(ContractId),

    /// The contract already completed or expired.
    #[error("contract {0} is already settled")]
    AlreadySettled(ContractId),

    /// An escrow movement failed.
    #[error("escrow error: {0}")]
    Escrow(#[from] LedgerError),
}
