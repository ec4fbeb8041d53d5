//! Contract variants held by the board.
//!
//! A [`Contract`] is either a [`SellContract`] (an auction for a town's
//! surplus) or a [`CourierContract`] (the delivery job spawned when that
//! auction closes). The shared identity lives in [`ContractTerms`], which
//! never changes after creation. Mutable auction state is private and only
//! the board writes it.

use serde::{Deserialize, Serialize};

use tradepost_types::{AgentId, ContractId, ContractKind, ContractStatus, PlayerId, ResourceId};

/// Immutable identity and terms of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    /// Unique contract id.
    pub id: ContractId,
    /// Town that issued the contract.
    pub issuer_id: AgentId,
    /// Traded resource.
    pub resource: ResourceId,
    /// Units offered.
    pub quantity: i64,
    /// Price per unit at creation time.
    pub price_per_unit: i64,
    /// Tick the contract was created on.
    pub created_at: u64,
    /// Ticks the contract stays live after `created_at`.
    pub duration: u64,
}

impl ContractTerms {
    /// `price_per_unit × quantity`, the floor for the first bid.
    pub const fn base_price(&self) -> i64 {
        self.price_per_unit.saturating_mul(self.quantity)
    }

    /// Last tick on which the contract is still live.
    pub const fn deadline(&self) -> u64 {
        self.created_at.saturating_add(self.duration)
    }

    /// Whether `created_at + duration < now`.
    pub const fn is_expired(&self, now: u64) -> bool {
        self.deadline() < now
    }
}

// ---------------------------------------------------------------------------
// Sell contract
// ---------------------------------------------------------------------------

/// An auction for a fixed quantity of one resource.
///
/// While the auction is open the highest bid only ever goes up, and there is
/// at most one highest bidder. Once `auction_closed` is set no bid is
/// accepted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellContract {
    terms: ContractTerms,
    highest_bid: Option<i64>,
    highest_bidder_id: Option<AgentId>,
    auction_closed: bool,
    closed_at: Option<u64>,
    courier_contract_id: Option<ContractId>,
    completed: bool,
    expired: bool,
    settled_at: Option<u64>,
}

impl SellContract {
    /// Create an open auction with no bids.
    pub const fn new(terms: ContractTerms) -> Self {
        Self {
            terms,
            highest_bid: None,
            highest_bidder_id: None,
            auction_closed: false,
            closed_at: None,
            courier_contract_id: None,
            completed: false,
            expired: false,
            settled_at: None,
        }
    }

    /// The contract terms.
    pub const fn terms(&self) -> &ContractTerms {
        &self.terms
    }

    /// Current highest bid, if any.
    pub const fn highest_bid(&self) -> Option<i64> {
        self.highest_bid
    }

    /// Town holding the current highest bid, if any.
    pub const fn highest_bidder_id(&self) -> Option<AgentId> {
        self.highest_bidder_id
    }

    /// Whether the auction moved to the courier phase.
    pub const fn auction_closed(&self) -> bool {
        self.auction_closed
    }

    /// Tick the auction closed on.
    pub const fn closed_at(&self) -> Option<u64> {
        self.closed_at
    }

    /// The delivery job spawned when the auction closed.
    pub const fn courier_contract_id(&self) -> Option<ContractId> {
        self.courier_contract_id
    }

    /// Whether the goods were delivered and paid for.
    pub const fn completed(&self) -> bool {
        self.completed
    }

    /// Tick the contract completed or was unwound on.
    pub const fn settled_at(&self) -> Option<u64> {
        self.settled_at
    }

    /// The price the next bid has to beat: the highest bid, or the base price.
    pub const fn price_floor(&self) -> i64 {
        match self.highest_bid {
            Some(bid) => bid,
            None => self.terms.base_price(),
        }
    }

    /// Whether `agent` currently holds the highest bid.
    pub fn is_highest_bidder(&self, agent: AgentId) -> bool {
        self.highest_bidder_id == Some(agent)
    }

    /// Lifecycle stage at tick `now`.
    pub const fn status(&self, now: u64) -> ContractStatus {
        if self.completed {
            ContractStatus::Completed
        } else if self.expired {
            ContractStatus::Expired
        } else if self.auction_closed {
            ContractStatus::CourierPhase
        } else if self.terms.is_expired(now) {
            ContractStatus::Expired
        } else {
            ContractStatus::Open
        }
    }

    pub(crate) const fn record_bid(&mut self, bidder: AgentId, amount: i64) {
        self.highest_bid = Some(amount);
        self.highest_bidder_id = Some(bidder);
    }

    pub(crate) const fn close(&mut self, now: u64, courier_contract_id: ContractId) {
        self.auction_closed = true;
        self.closed_at = Some(now);
        self.courier_contract_id = Some(courier_contract_id);
    }

    pub(crate) const fn complete(&mut self, now: u64) {
        self.completed = true;
        self.settled_at = Some(now);
    }

    pub(crate) const fn expire(&mut self, now: u64) {
        self.expired = true;
        self.settled_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Courier contract
// ---------------------------------------------------------------------------

/// Delivery job for the goods of a closed auction.
///
/// Issued by the seller, addressed to the winning bidder. A player takes the
/// job with a claim; the first claim wins and later claims are refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierContract {
    terms: ContractTerms,
    sell_contract_id: ContractId,
    destination_id: AgentId,
    courier_fee: i64,
    courier_id: Option<PlayerId>,
    claimed_at: Option<u64>,
    completed: bool,
    expired: bool,
    settled_at: Option<u64>,
}

impl CourierContract {
    /// Create an unclaimed delivery job.
    pub const fn new(
        terms: ContractTerms,
        sell_contract_id: ContractId,
        destination_id: AgentId,
        courier_fee: i64,
    ) -> Self {
        Self {
            terms,
            sell_contract_id,
            destination_id,
            courier_fee,
            courier_id: None,
            claimed_at: None,
            completed: false,
            expired: false,
            settled_at: None,
        }
    }

    /// The contract terms (issuer is the seller).
    pub const fn terms(&self) -> &ContractTerms {
        &self.terms
    }

    /// The auction this job delivers for.
    pub const fn sell_contract_id(&self) -> ContractId {
        self.sell_contract_id
    }

    /// The town receiving the goods (the winning bidder).
    pub const fn destination_id(&self) -> AgentId {
        self.destination_id
    }

    /// Fee owed to the courier on delivery, as quoted when the auction closed.
    pub const fn courier_fee(&self) -> i64 {
        self.courier_fee
    }

    /// The player running the job, once claimed.
    pub const fn courier_id(&self) -> Option<PlayerId> {
        self.courier_id
    }

    /// Tick the job was claimed on.
    pub const fn claimed_at(&self) -> Option<u64> {
        self.claimed_at
    }

    /// Whether the goods were delivered.
    pub const fn completed(&self) -> bool {
        self.completed
    }

    /// Lifecycle stage. Courier jobs expire only through the board's
    /// timeout sweep, never lazily.
    pub const fn status(&self) -> ContractStatus {
        if self.completed {
            ContractStatus::Completed
        } else if self.expired {
            ContractStatus::Expired
        } else {
            ContractStatus::CourierPhase
        }
    }

    pub(crate) const fn assign(&mut self, courier: PlayerId, now: u64) {
        self.courier_id = Some(courier);
        self.claimed_at = Some(now);
    }

    pub(crate) const fn complete(&mut self, now: u64) {
        self.completed = true;
        self.settled_at = Some(now);
    }

    pub(crate) const fn expire(&mut self, now: u64) {
        self.expired = true;
        self.settled_at = Some(now);
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Any contract on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Contract {
    /// An auction for surplus goods.
    Sell(SellContract),
    /// A delivery job for a closed auction.
    Courier(CourierContract),
}

impl Contract {
    /// Shared terms of either variant.
    pub const fn terms(&self) -> &ContractTerms {
        match self {
            Self::Sell(c) => c.terms(),
            Self::Courier(c) => c.terms(),
        }
    }

    /// Contract id.
    pub const fn id(&self) -> ContractId {
        self.terms().id
    }

    /// Issuing town.
    pub const fn issuer_id(&self) -> AgentId {
        self.terms().issuer_id
    }

    /// Which variant this is.
    pub const fn kind(&self) -> ContractKind {
        match self {
            Self::Sell(_) => ContractKind::Sell,
            Self::Courier(_) => ContractKind::Courier,
        }
    }

    /// Lifecycle stage at tick `now`.
    pub const fn status(&self, now: u64) -> ContractStatus {
        match self {
            Self::Sell(c) => c.status(now),
            Self::Courier(c) => c.status(),
        }
    }

    /// Tick the contract completed or expired on, once settled.
    pub const fn settled_at(&self) -> Option<u64> {
        match self {
            Self::Sell(c) => c.settled_at,
            Self::Courier(c) => c.settled_at,
        }
    }

    /// The sell variant, if this is one.
    pub const fn as_sell(&self) -> Option<&SellContract> {
        match self {
            Self::Sell(c) => Some(c),
            Self::Courier(_) => None,
        }
    }

    /// The courier variant, if this is one.
    pub const fn as_courier(&self) -> Option<&CourierContract> {
        match self {
            Self::Courier(c) => Some(c),
            Self::Sell(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(created_at: u64, duration: u64) -> ContractTerms {
        ContractTerms {
            id: ContractId::new(),
            issuer_id: AgentId::new(),
            resource: ResourceId::from("wood"),
            quantity: 100,
            price_per_unit: 1,
            created_at,
            duration,
        }
    }

    #[test]
    fn base_price_is_unit_price_times_quantity() {
        let mut t = terms(0, 10);
        t.price_per_unit = 3;
        assert_eq!(t.base_price(), 300);
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let t = terms(10, 5);
        assert!(!t.is_expired(15));
        assert!(t.is_expired(16));
    }

    #[test]
    fn sell_status_progression() {
        let mut sell = SellContract::new(terms(0, 100));
        assert_eq!(sell.status(5), ContractStatus::Open);
        assert_eq!(sell.status(101), ContractStatus::Expired);

        sell.record_bid(AgentId::new(), 110);
        sell.close(50, ContractId::new());
        assert_eq!(sell.status(500), ContractStatus::CourierPhase);

        sell.complete(60);
        assert_eq!(sell.status(500), ContractStatus::Completed);
        assert_eq!(sell.settled_at(), Some(60));
    }

    #[test]
    fn price_floor_tracks_highest_bid() {
        let mut sell = SellContract::new(terms(0, 100));
        assert_eq!(sell.price_floor(), 100);
        let bidder = AgentId::new();
        sell.record_bid(bidder, 121);
        assert_eq!(sell.price_floor(), 121);
        assert!(sell.is_highest_bidder(bidder));
    }

    #[test]
    fn contract_accessors_dispatch_by_variant() {
        let sell = Contract::Sell(SellContract::new(terms(0, 100)));
        assert_eq!(sell.kind(), ContractKind::Sell);
        assert!(sell.as_sell().is_some());
        assert!(sell.as_courier().is_none());

        let courier = Contract::Courier(CourierContract::new(
            terms(0, 100),
            sell.id(),
            AgentId::new(),
            20,
        ));
        assert_eq!(courier.kind(), ContractKind::Courier);
        assert_eq!(courier.status(1_000), ContractStatus::CourierPhase);
    }
}
