//! Town resource ledgers and contract escrow for the Tradepost economy.
//!
//! Every unit a town owns lives in a [`ResourceLedger`]. Units committed to
//! a contract leave the owner's ledger and sit in the [`EscrowBook`] until
//! the contract settles, expires, or the bid that reserved them is outbid.
//! Nothing is created or destroyed along the way: a unit is either in some
//! town's ledger or held against exactly one contract.
//!
//! # Modules
//!
//! - [`ledger`] -- The [`ResourceLedger`] collaborator trait and the in-memory
//!   [`TownLedger`].
//! - [`escrow`] -- The [`EscrowBook`]: per-contract holds plus an append-only
//!   journal of every reserve, release, and settle.
//! - [`conservation`] -- Journal audit that the holds match the movements.
//!
//! # Conservation Law
//!
//! For every resource R:
//!
//! ```text
//! sum(reserved R) - sum(released R) - sum(settled R) == held R
//! ```
//!
//! # Usage
//!
//! ```
//! use tradepost_ledger::{EscrowBook, HoldKind, HoldRequest, ResourceLedger, TownLedger};
//! use tradepost_ledger::conservation::AuditResult;
//! use tradepost_types::{AgentId, ContractId, ResourceId};
//!
//! let mut ledger = TownLedger::new();
//! let mut escrow = EscrowBook::new();
//! let seller = AgentId::new();
//! let buyer = AgentId::new();
//! let wood = ResourceId::from("wood");
//! let contract = ContractId::new();
//!
//! ledger.credit(seller, &wood, 300);
//! escrow
//!     .reserve(&mut ledger, HoldRequest {
//!         tick: 1,
//!         contract_id: contract,
//!         kind: HoldKind::Goods,
//!         owner: seller,
//!         resource: wood.clone(),
//!         amount: 50,
//!     })
//!     .ok();
//! assert_eq!(ledger.balance(seller, &wood), 250);
//!
//! escrow.settle(&mut ledger, 2, contract, HoldKind::Goods, buyer);
//! assert_eq!(ledger.balance(buyer, &wood), 50);
//! assert_eq!(escrow.audit(), AuditResult::Balanced);
//! ```

pub mod conservation;
pub mod escrow;
pub mod ledger;

// Re-export primary types at crate root.
pub use conservation::AuditResult;
pub use escrow::{EscrowBook, EscrowEntry, EscrowHold, EscrowMovement, HoldKind, HoldRequest};
pub use ledger::{ResourceLedger, TownLedger};

use std::collections::BTreeMap;

use tradepost_types::{AgentId, ContractId, ResourceId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when moving resources into or out of escrow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Escrow amounts must be strictly positive.
    #[error("escrow amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The invalid amount.
        amount: i64,
    },

    /// The owner's ledger cannot cover the reservation.
    #[error("{agent} holds {available} {resource}, cannot reserve {requested}")]
    InsufficientBalance {
        /// The town whose ledger was short.
        agent: AgentId,
        /// The resource being reserved.
        resource: ResourceId,
        /// The amount requested.
        requested: i64,
        /// The balance at the time of the request.
        available: i64,
    },

    /// A contract already has a hold of this kind.
    #[error("contract {contract_id} already holds {kind:?} in escrow")]
    SlotOccupied {
        /// The contract.
        contract_id: ContractId,
        /// The occupied slot.
        kind: HoldKind,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A mismatch between the escrow journal and the live holds.
///
/// Produced by [`EscrowBook::audit`]. Any anomaly means units were lost or
/// duplicated somewhere between a town ledger and the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowAnomaly {
    /// Per-resource mismatch: (`journal_net`, `held_total`).
    pub imbalances: BTreeMap<ResourceId, (i64, i64)>,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for EscrowAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
