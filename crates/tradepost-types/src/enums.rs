//! Enumeration types shared by the board, the town AI, and observers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Contract classification
// ---------------------------------------------------------------------------

/// The variant of a contract on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ContractKind {
    /// A town offers surplus goods to the highest bidder.
    Sell,
    /// Delivery job spawned when a sell auction closes.
    Courier,
}

/// Lifecycle stage of a contract, derived from its state and the clock.
///
/// ```text
/// Open --(close)--> CourierPhase --(delivery)--> Completed
///   |                    |
///   +--(no bids)--> Expired <--(courier timeout)--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ContractStatus {
    /// Auction is accepting bids.
    Open,
    /// Auction closed; the winning bid awaits delivery.
    CourierPhase,
    /// Goods delivered and payment settled.
    Completed,
    /// Deadline passed without settlement.
    Expired,
}

impl ContractStatus {
    /// Whether the contract still ties up the issuer's listing slot.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::CourierPhase)
    }
}

// ---------------------------------------------------------------------------
// Bidding outcomes
// ---------------------------------------------------------------------------

/// Why the board turned a bid down.
///
/// All of these are ordinary business outcomes. The bidder drops or
/// re-evaluates on its next cycle; nothing is retried internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum BidRejection {
    /// No contract with that id is on the board.
    NotFound,
    /// The auction duration has elapsed.
    Expired,
    /// The auction already moved to the courier phase.
    AuctionClosed,
    /// Amount does not beat the current highest bid (or the base price).
    TooLow,
    /// The bidder cannot cover the amount from its currency balance.
    InsufficientFunds,
    /// Towns cannot bid on their own listings.
    OwnContract,
}

impl core::fmt::Display for BidRejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Self::NotFound => "contract not found",
            Self::Expired => "contract expired",
            Self::AuctionClosed => "auction closed",
            Self::TooLow => "bid too low",
            Self::InsufficientFunds => "insufficient funds",
            Self::OwnContract => "cannot bid on own contract",
        };
        f.write_str(text)
    }
}

/// Result of submitting a bid to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum BidResult {
    /// The bid is now the highest bid and its funds are in escrow.
    Accepted,
    /// The bid was refused and board state is unchanged.
    Rejected(BidRejection),
}

impl BidResult {
    /// Whether the bid was accepted.
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of a player trying to take a courier job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum ClaimResult {
    /// The player is now the courier.
    Claimed,
    /// Another player got there first.
    AlreadyClaimed,
    /// No courier job with that id is open.
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses() {
        assert!(ContractStatus::Open.is_active());
        assert!(ContractStatus::CourierPhase.is_active());
        assert!(!ContractStatus::Completed.is_active());
        assert!(!ContractStatus::Expired.is_active());
    }

    #[test]
    fn bid_result_serde_shape() {
        let json = serde_json::to_string(&BidResult::Rejected(BidRejection::TooLow)).ok();
        assert_eq!(json.as_deref(), Some(r#"{"Rejected":"TooLow"}"#));
        assert!(BidResult::Accepted.is_accepted());
    }
}
