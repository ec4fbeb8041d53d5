//! The contract board: auction registry and escrow authority for one world.
//!
//! The board is the only writer of contract state. Towns read contracts
//! through [`ContractBoard::contracts`] and change them only by calling
//! board operations, so [`ContractBoard::add_bid`] is the single point where
//! auction state is serialized. Whichever bid reaches it first wins a tie.
//!
//! # Lifecycle
//!
//! ```text
//! list_sell_contract ──► Open ──add_bid*──► close_auction ──► CourierPhase
//!                         │                                   │      │
//!                         │ (deadline, no bids)  claim_courier ▼      │ (courier timeout)
//!                         ▼                  complete_delivery       ▼
//!                       Expired                  Completed         Expired
//! ```
//!
//! # Escrow
//!
//! - Listing moves the seller's goods into escrow.
//! - An accepted bid moves the bidder's currency into escrow after the
//!   previous highest bidder's currency is released.
//! - Delivery pays goods to the buyer and currency to the seller.
//! - Expiry returns everything to its owner.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tradepost_ledger::{AuditResult, EscrowBook, HoldKind, HoldRequest};
use tradepost_types::{
    AgentId, BidRejection, BidResult, ClaimResult, ContractId, ContractKind, ContractStatus,
    PlayerId, ResourceId,
};

use crate::config::MarketConfig;
use crate::context::{DistanceOracle, MarketContext};
use crate::contract::{Contract, ContractTerms, CourierContract, SellContract};
use crate::error::BoardError;
use crate::pricing;

/// Serializable board contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    /// Every contract, in insertion order.
    pub contracts: Vec<Contract>,
    /// Escrow holds and journal.
    pub escrow: EscrowBook,
    /// Whether the board changed since the last save.
    pub dirty: bool,
}

/// Result of [`ContractBoard::close_auction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The auction is in the courier phase with this delivery job.
    Closed {
        /// The courier contract for the winning bid.
        courier_contract_id: ContractId,
        /// `false` when the auction had already been closed by an earlier call.
        newly_spawned: bool,
    },
    /// Nobody bid, so there is nothing to deliver. The auction stays as is.
    NoBids,
    /// The contract already completed or expired.
    Settled,
}

/// Summary of a completed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The auction.
    pub sell_contract_id: ContractId,
    /// The delivery job.
    pub courier_contract_id: ContractId,
    /// Town that sold the goods.
    pub seller: AgentId,
    /// Town that bought them.
    pub buyer: AgentId,
    /// Player who delivered.
    pub courier: PlayerId,
    /// Delivered resource.
    pub resource: ResourceId,
    /// Delivered quantity.
    pub quantity: i64,
    /// Currency paid to the seller.
    pub price: i64,
    /// Fee the host owes the courier.
    pub courier_fee: i64,
}

/// What a single [`ContractBoard::process_expirations`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirySweep {
    /// Auctions past their deadline that closed into the courier phase.
    pub closed: Vec<ContractId>,
    /// Auctions past their deadline with no bids; goods returned.
    pub expired_unsold: Vec<ContractId>,
    /// Courier phases that timed out; both sides refunded.
    pub courier_timeouts: Vec<ContractId>,
}

impl ExpirySweep {
    /// Whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.expired_unsold.is_empty() && self.courier_timeouts.is_empty()
    }
}

/// Registry of all contracts in one world, plus their escrow.
#[derive(Debug, Clone)]
pub struct ContractBoard {
    contracts: Vec<Contract>,
    escrow: EscrowBook,
    dirty: bool,
    config: MarketConfig,
}

impl ContractBoard {
    /// Create an empty board.
    pub const fn new(config: MarketConfig) -> Self {
        Self {
            contracts: Vec::new(),
            escrow: EscrowBook::new(),
            dirty: false,
            config,
        }
    }

    /// Rebuild a board from saved state.
    pub fn from_state(state: BoardState, config: MarketConfig) -> Self {
        Self {
            contracts: state.contracts,
            escrow: state.escrow,
            dirty: state.dirty,
            config,
        }
    }

    /// Copy of the board contents for persistence.
    pub fn state(&self) -> BoardState {
        BoardState {
            contracts: self.contracts.clone(),
            escrow: self.escrow.clone(),
            dirty: self.dirty,
        }
    }

    /// Market configuration the board was built with.
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Whether the board changed since [`mark_clean`](Self::mark_clean).
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a successful save.
    pub const fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Escrow holds and journal.
    pub const fn escrow(&self) -> &EscrowBook {
        &self.escrow
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register a contract.
    ///
    /// For a sell contract the issuer's goods must already be out of its
    /// ledger; the board records them as the contract's goods hold.
    ///
    /// # Errors
    ///
    /// [`BoardError::DuplicateContract`], [`BoardError::InvalidQuantity`],
    /// [`BoardError::InvalidPrice`], or an escrow error. The board is
    /// unchanged on error.
    pub fn add_contract(&mut self, contract: Contract) -> Result<ContractId, BoardError> {
        let id = contract.id();
        if self.position(id).is_some() {
            return Err(BoardError::DuplicateContract(id));
        }

        let terms = contract.terms();
        if terms.quantity <= 0 {
            return Err(BoardError::InvalidQuantity {
                quantity: terms.quantity,
            });
        }

        if let Contract::Sell(sell) = &contract {
            let terms = sell.terms();
            if terms.price_per_unit <= 0 {
                return Err(BoardError::InvalidPrice {
                    price: terms.price_per_unit,
                });
            }
            self.escrow.record_prefunded(HoldRequest {
                tick: terms.created_at,
                contract_id: id,
                kind: HoldKind::Goods,
                owner: terms.issuer_id,
                resource: terms.resource.clone(),
                amount: terms.quantity,
            })?;
        }

        info!(
            contract = %id,
            kind = ?contract.kind(),
            issuer = %contract.issuer_id(),
            resource = %contract.terms().resource,
            quantity = contract.terms().quantity,
            "Contract registered"
        );
        self.contracts.push(contract);
        self.dirty = true;
        Ok(id)
    }

    /// Move `quantity` of the issuer's `resource` into escrow and list it.
    ///
    /// # Errors
    ///
    /// [`BoardError::InsufficientGoods`] if the issuer cannot supply the
    /// goods, [`BoardError::CurrencyListing`] for the currency, or any
    /// [`add_contract`](Self::add_contract) error. Nothing changes on error.
    pub fn list_sell_contract(
        &mut self,
        issuer: AgentId,
        resource: ResourceId,
        quantity: i64,
        price_per_unit: i64,
        ctx: &mut MarketContext<'_>,
    ) -> Result<ContractId, BoardError> {
        if resource == self.config.currency {
            return Err(BoardError::CurrencyListing(resource));
        }
        if quantity <= 0 {
            return Err(BoardError::InvalidQuantity { quantity });
        }
        if price_per_unit <= 0 {
            return Err(BoardError::InvalidPrice {
                price: price_per_unit,
            });
        }

        if !ctx.ledger.debit(issuer, &resource, quantity) {
            return Err(BoardError::InsufficientGoods {
                agent: issuer,
                available: ctx.ledger.balance(issuer, &resource),
                resource,
                requested: quantity,
            });
        }

        let terms = ContractTerms {
            id: ContractId::new(),
            issuer_id: issuer,
            resource: resource.clone(),
            quantity,
            price_per_unit,
            created_at: ctx.now(),
            duration: self.config.contract_duration_ticks,
        };
        let base_price = terms.base_price();

        match self.add_contract(Contract::Sell(SellContract::new(terms))) {
            Ok(id) => {
                ctx.notifier.notify(
                    issuer,
                    &format!("Listed {quantity} {resource} for a starting price of {base_price}"),
                );
                Ok(id)
            }
            Err(e) => {
                ctx.ledger.credit(issuer, &resource, quantity);
                Err(e)
            }
        }
    }

    /// Look up a contract.
    pub fn get_contract(&self, id: ContractId) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.id() == id)
    }

    /// All contracts in insertion order, including expired ones not yet pruned.
    pub fn contracts(&self) -> &[Contract] {
        &self.contracts
    }

    /// Sell contracts that accept bids at tick `now`.
    pub fn open_sell_contracts(&self, now: u64) -> impl Iterator<Item = &SellContract> + '_ {
        self.contracts
            .iter()
            .filter_map(Contract::as_sell)
            .filter(move |c| c.status(now) == ContractStatus::Open)
    }

    /// Number of sell contracts `issuer` has open or in the courier phase.
    pub fn active_contracts_for(&self, issuer: AgentId, now: u64) -> usize {
        self.contracts
            .iter()
            .filter_map(Contract::as_sell)
            .filter(|c| c.terms().issuer_id == issuer && c.status(now).is_active())
            .count()
    }

    /// Whether `issuer` has an active sell contract for `resource`.
    pub fn has_active_listing(&self, issuer: AgentId, resource: &ResourceId, now: u64) -> bool {
        self.contracts
            .iter()
            .filter_map(Contract::as_sell)
            .any(|c| {
                c.terms().issuer_id == issuer
                    && &c.terms().resource == resource
                    && c.status(now).is_active()
            })
    }

    /// Write a modified contract back over the one with the same id.
    ///
    /// # Errors
    ///
    /// [`BoardError::ContractNotFound`] if no contract has that id, or
    /// [`BoardError::WrongKind`] if the variant differs.
    pub fn update_contract(&mut self, contract: Contract) -> Result<(), BoardError> {
        let id = contract.id();
        let slot = self
            .contracts
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(BoardError::ContractNotFound(id))?;
        if slot.kind() != contract.kind() {
            return Err(BoardError::WrongKind {
                contract_id: id,
                expected: slot.kind(),
                actual: contract.kind(),
            });
        }
        *slot = contract;
        self.dirty = true;
        Ok(())
    }

    /// Courier cost between two towns.
    pub fn calculate_courier_cost(
        &self,
        buyer: AgentId,
        seller: AgentId,
        oracle: &dyn DistanceOracle,
    ) -> i32 {
        pricing::courier_cost(
            oracle.distance(buyer, seller),
            self.config.courier_base_cost,
            self.config.courier_cost_per_distance,
        )
    }

    // -----------------------------------------------------------------------
    // Bidding
    // -----------------------------------------------------------------------

    /// Submit a bid.
    ///
    /// Accepts when the contract is an open, unexpired sell contract of
    /// another town, `amount` beats the highest bid (or reaches the base
    /// price when unbid), and the bidder can pay `amount`. On acceptance the
    /// previous highest bidder's escrow is released and `amount` is taken
    /// from the new bidder. A town raising its own bid only pays the
    /// difference.
    ///
    /// # Errors
    ///
    /// [`BoardError::WrongKind`] when `contract_id` names a courier
    /// contract. Every business outcome is an `Ok` [`BidResult`].
    pub fn add_bid(
        &mut self,
        contract_id: ContractId,
        bidder: AgentId,
        amount: i64,
        ctx: &mut MarketContext<'_>,
    ) -> Result<BidResult, BoardError> {
        let now = ctx.now();
        let currency = self.config.currency.clone();

        let Some(contract) = self.get_contract(contract_id) else {
            return Ok(reject(contract_id, bidder, amount, BidRejection::NotFound));
        };
        let Contract::Sell(sell) = contract else {
            return Err(BoardError::WrongKind {
                contract_id,
                expected: ContractKind::Sell,
                actual: contract.kind(),
            });
        };

        if sell.auction_closed() {
            return Ok(reject(contract_id, bidder, amount, BidRejection::AuctionClosed));
        }
        match sell.status(now) {
            ContractStatus::Open => {}
            ContractStatus::Expired => {
                return Ok(reject(contract_id, bidder, amount, BidRejection::Expired));
            }
            ContractStatus::CourierPhase | ContractStatus::Completed => {
                return Ok(reject(contract_id, bidder, amount, BidRejection::AuctionClosed));
            }
        }
        let issuer = sell.terms().issuer_id;
        if issuer == bidder {
            return Ok(reject(contract_id, bidder, amount, BidRejection::OwnContract));
        }
        let too_low = match sell.highest_bid() {
            Some(highest) => amount <= highest,
            None => amount < sell.terms().base_price(),
        };
        if too_low {
            return Ok(reject(contract_id, bidder, amount, BidRejection::TooLow));
        }

        let previous = self.escrow.hold(contract_id, HoldKind::Funds).cloned();
        let own_previous = previous
            .as_ref()
            .filter(|hold| hold.owner == bidder)
            .map_or(0, |hold| hold.amount);
        let available = ctx.ledger.balance(bidder, &currency).saturating_add(own_previous);
        if available < amount {
            return Ok(reject(
                contract_id,
                bidder,
                amount,
                BidRejection::InsufficientFunds,
            ));
        }

        let released = self
            .escrow
            .release(ctx.ledger, now, contract_id, HoldKind::Funds);
        let reserved = self.escrow.reserve(
            ctx.ledger,
            HoldRequest {
                tick: now,
                contract_id,
                kind: HoldKind::Funds,
                owner: bidder,
                resource: currency.clone(),
                amount,
            },
        );
        if let Err(e) = reserved {
            // Put the previous bidder's hold back before giving up.
            if let Some(prev) = released {
                self.escrow.reserve(
                    ctx.ledger,
                    HoldRequest {
                        tick: now,
                        contract_id,
                        kind: HoldKind::Funds,
                        owner: prev.owner,
                        resource: prev.resource,
                        amount: prev.amount,
                    },
                )?;
            }
            return Err(e.into());
        }

        if let Some(Contract::Sell(sell)) =
            self.contracts.iter_mut().find(|c| c.id() == contract_id)
        {
            sell.record_bid(bidder, amount);
        }
        self.dirty = true;

        info!(contract = %contract_id, %bidder, amount, "Bid accepted");
        ctx.notifier.notify(
            issuer,
            &format!("New highest bid of {amount} {currency} on contract {contract_id}"),
        );
        if let Some(prev) = previous.filter(|hold| hold.owner != bidder) {
            ctx.notifier.notify(
                prev.owner,
                &format!(
                    "Outbid on contract {contract_id}: {amount} beats your {}; {} returned",
                    prev.amount, prev.amount
                ),
            );
        }
        Ok(BidResult::Accepted)
    }

    // -----------------------------------------------------------------------
    // Courier phase
    // -----------------------------------------------------------------------

    /// Close an auction and spawn the delivery job for the winning bid.
    ///
    /// Calling this again on a closed auction returns the same courier
    /// contract without spawning another. Once the sale is delivered or
    /// unwound it reports [`CloseOutcome::Settled`].
    ///
    /// # Errors
    ///
    /// [`BoardError::ContractNotFound`] or [`BoardError::WrongKind`].
    pub fn close_auction(
        &mut self,
        contract_id: ContractId,
        ctx: &mut MarketContext<'_>,
    ) -> Result<CloseOutcome, BoardError> {
        let now = ctx.now();
        let contract = self
            .get_contract(contract_id)
            .ok_or(BoardError::ContractNotFound(contract_id))?;
        let Contract::Sell(sell) = contract else {
            return Err(BoardError::WrongKind {
                contract_id,
                expected: ContractKind::Sell,
                actual: contract.kind(),
            });
        };

        if matches!(
            sell.status(now),
            ContractStatus::Completed | ContractStatus::Expired
        ) && sell.settled_at().is_some()
        {
            return Ok(CloseOutcome::Settled);
        }
        if let Some(courier_contract_id) = sell.courier_contract_id() {
            return Ok(CloseOutcome::Closed {
                courier_contract_id,
                newly_spawned: false,
            });
        }
        let (Some(buyer), Some(price)) = (sell.highest_bidder_id(), sell.highest_bid()) else {
            return Ok(CloseOutcome::NoBids);
        };

        let seller = sell.terms().issuer_id;
        let fee = i64::from(self.calculate_courier_cost(buyer, seller, ctx.oracle));
        let courier_terms = ContractTerms {
            id: ContractId::new(),
            issuer_id: seller,
            resource: sell.terms().resource.clone(),
            quantity: sell.terms().quantity,
            price_per_unit: sell.terms().price_per_unit,
            created_at: now,
            duration: self.config.courier_timeout_ticks.unwrap_or(u64::MAX),
        };
        let courier_contract_id = courier_terms.id;
        let resource = courier_terms.resource.clone();
        let quantity = courier_terms.quantity;

        if let Some(Contract::Sell(sell)) =
            self.contracts.iter_mut().find(|c| c.id() == contract_id)
        {
            sell.close(now, courier_contract_id);
        }
        self.contracts.push(Contract::Courier(CourierContract::new(
            courier_terms,
            contract_id,
            buyer,
            fee,
        )));
        self.dirty = true;

        info!(
            contract = %contract_id,
            courier_contract = %courier_contract_id,
            %seller,
            %buyer,
            price,
            courier_fee = fee,
            "Auction closed"
        );
        ctx.notifier.notify(
            seller,
            &format!("Auction {contract_id} closed: {quantity} {resource} sold for {price}"),
        );
        ctx.notifier.notify(
            buyer,
            &format!(
                "You won auction {contract_id}: {quantity} {resource} for {price}, \
                 awaiting courier"
            ),
        );

        Ok(CloseOutcome::Closed {
            courier_contract_id,
            newly_spawned: true,
        })
    }

    /// Assign a player to a courier job. The first claim wins.
    pub fn claim_courier(
        &mut self,
        courier_contract_id: ContractId,
        player: PlayerId,
        now: u64,
    ) -> ClaimResult {
        let Some(Contract::Courier(job)) = self
            .contracts
            .iter_mut()
            .find(|c| c.id() == courier_contract_id)
        else {
            return ClaimResult::NotFound;
        };
        if job.status() != ContractStatus::CourierPhase {
            return ClaimResult::NotFound;
        }
        if job.courier_id().is_some() {
            debug!(contract = %courier_contract_id, %player, "Courier job already claimed");
            return ClaimResult::AlreadyClaimed;
        }
        job.assign(player, now);
        self.dirty = true;
        info!(contract = %courier_contract_id, %player, "Courier job claimed");
        ClaimResult::Claimed
    }

    /// Record delivery of a claimed courier job and settle the escrow.
    ///
    /// The buyer receives the goods and the seller receives the winning bid.
    /// Both contracts are marked completed; [`prune`](Self::prune) removes
    /// them.
    ///
    /// # Errors
    ///
    /// [`BoardError::ContractNotFound`], [`BoardError::WrongKind`],
    /// [`BoardError::CourierUnassigned`], or [`BoardError::AlreadySettled`].
    pub fn complete_delivery(
        &mut self,
        courier_contract_id: ContractId,
        ctx: &mut MarketContext<'_>,
    ) -> Result<Settlement, BoardError> {
        let now = ctx.now();
        let contract = self
            .get_contract(courier_contract_id)
            .ok_or(BoardError::ContractNotFound(courier_contract_id))?;
        let Contract::Courier(job) = contract else {
            return Err(BoardError::WrongKind {
                contract_id: courier_contract_id,
                expected: ContractKind::Courier,
                actual: contract.kind(),
            });
        };
        if job.status() != ContractStatus::CourierPhase {
            return Err(BoardError::AlreadySettled(courier_contract_id));
        }
        let courier = job
            .courier_id()
            .ok_or(BoardError::CourierUnassigned(courier_contract_id))?;

        let sell_contract_id = job.sell_contract_id();
        let seller = job.terms().issuer_id;
        let buyer = job.destination_id();
        let resource = job.terms().resource.clone();
        let quantity = job.terms().quantity;
        let courier_fee = job.courier_fee();

        self.escrow
            .settle(ctx.ledger, now, sell_contract_id, HoldKind::Goods, buyer);
        let price = self
            .escrow
            .settle(ctx.ledger, now, sell_contract_id, HoldKind::Funds, seller)
            .map_or(0, |hold| hold.amount);

        for contract in &mut self.contracts {
            match contract {
                Contract::Sell(sell) if sell.terms().id == sell_contract_id => sell.complete(now),
                Contract::Courier(job) if job.terms().id == courier_contract_id => {
                    job.complete(now);
                }
                Contract::Sell(_) | Contract::Courier(_) => {}
            }
        }
        self.dirty = true;

        info!(
            contract = %sell_contract_id,
            courier_contract = %courier_contract_id,
            %seller,
            %buyer,
            %courier,
            price,
            "Delivery completed"
        );
        ctx.notifier.notify(
            buyer,
            &format!("Received {quantity} {resource} from contract {sell_contract_id}"),
        );
        ctx.notifier.notify(
            seller,
            &format!("Payment of {price} received for contract {sell_contract_id}"),
        );

        Ok(Settlement {
            sell_contract_id,
            courier_contract_id,
            seller,
            buyer,
            courier,
            resource,
            quantity,
            price,
            courier_fee,
        })
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Apply deadlines that passed by tick `now`.
    ///
    /// - An open auction past its deadline closes into the courier phase if
    ///   it has a bidder, otherwise it expires and the goods go back to the
    ///   seller.
    /// - A courier phase older than `courier_timeout_ticks` expires; the
    ///   buyer gets its bid back and the seller its goods.
    ///
    /// # Errors
    ///
    /// Propagates [`close_auction`](Self::close_auction) errors, which cannot
    /// happen for ids taken from the board itself.
    pub fn process_expirations(
        &mut self,
        ctx: &mut MarketContext<'_>,
    ) -> Result<ExpirySweep, BoardError> {
        let now = ctx.now();
        let mut sweep = ExpirySweep::default();

        let lapsed: Vec<(ContractId, bool)> = self
            .contracts
            .iter()
            .filter_map(Contract::as_sell)
            .filter(|c| {
                !c.auction_closed() && c.settled_at().is_none() && c.terms().is_expired(now)
            })
            .map(|c| (c.terms().id, c.highest_bidder_id().is_some()))
            .collect();

        for (id, has_bidder) in lapsed {
            if has_bidder {
                self.close_auction(id, ctx)?;
                sweep.closed.push(id);
            } else {
                self.unwind(id, None, ctx);
                sweep.expired_unsold.push(id);
            }
        }

        if let Some(timeout) = self.config.courier_timeout_ticks {
            let stale: Vec<(ContractId, Option<ContractId>)> = self
                .contracts
                .iter()
                .filter_map(Contract::as_sell)
                .filter(|c| c.status(now) == ContractStatus::CourierPhase)
                .filter(|c| {
                    c.closed_at()
                        .is_some_and(|closed| now.saturating_sub(closed) > timeout)
                })
                .map(|c| (c.terms().id, c.courier_contract_id()))
                .collect();

            for (id, courier_id) in stale {
                let claimed_at = courier_id
                    .and_then(|job| self.get_contract(job))
                    .and_then(Contract::as_courier)
                    .and_then(CourierContract::claimed_at);
                warn!(contract = %id, timeout, ?claimed_at, "Courier phase timed out");
                self.unwind(id, courier_id, ctx);
                sweep.courier_timeouts.push(id);
            }
        }

        if !sweep.is_empty() {
            debug!(
                tick = now,
                closed = sweep.closed.len(),
                expired_unsold = sweep.expired_unsold.len(),
                courier_timeouts = sweep.courier_timeouts.len(),
                "Expiry sweep"
            );
        }
        Ok(sweep)
    }

    /// Return all escrow of a sell contract to its owners and mark it (and its
    /// courier job, if any) expired.
    fn unwind(
        &mut self,
        sell_contract_id: ContractId,
        courier_contract_id: Option<ContractId>,
        ctx: &mut MarketContext<'_>,
    ) {
        let now = ctx.now();
        let goods = self
            .escrow
            .release(ctx.ledger, now, sell_contract_id, HoldKind::Goods);
        let funds = self
            .escrow
            .release(ctx.ledger, now, sell_contract_id, HoldKind::Funds);

        for contract in &mut self.contracts {
            match contract {
                Contract::Sell(sell) if sell.terms().id == sell_contract_id => sell.expire(now),
                Contract::Courier(job) if Some(job.terms().id) == courier_contract_id => {
                    job.expire(now);
                }
                Contract::Sell(_) | Contract::Courier(_) => {}
            }
        }
        self.dirty = true;

        if let Some(hold) = goods {
            info!(
                contract = %sell_contract_id,
                seller = %hold.owner,
                "Contract expired, goods returned"
            );
            ctx.notifier.notify(
                hold.owner,
                &format!(
                    "Contract {sell_contract_id} expired: {} {} returned",
                    hold.amount, hold.resource
                ),
            );
        }
        if let Some(hold) = funds {
            ctx.notifier.notify(
                hold.owner,
                &format!(
                    "Contract {sell_contract_id} expired before delivery: {} {} refunded",
                    hold.amount, hold.resource
                ),
            );
        }
    }

    /// Remove settled contracts.
    ///
    /// Completed contracts go immediately; expired ones once they have been
    /// expired for `retention_ticks`. Contracts that still hold escrow are
    /// never removed. Returns the number removed.
    pub fn prune(&mut self, now: u64) -> usize {
        let retention = self.config.retention_ticks;
        let escrow = &self.escrow;
        let removable: Vec<ContractId> = self
            .contracts
            .iter()
            .filter(|c| {
                let id = c.id();
                if escrow.hold(id, HoldKind::Goods).is_some()
                    || escrow.hold(id, HoldKind::Funds).is_some()
                {
                    return false;
                }
                match (c.status(now), c.settled_at()) {
                    (ContractStatus::Completed, _) => true,
                    (ContractStatus::Expired, Some(at)) => now.saturating_sub(at) >= retention,
                    _ => false,
                }
            })
            .map(Contract::id)
            .collect();

        if removable.is_empty() {
            return 0;
        }
        self.contracts.retain(|c| !removable.contains(&c.id()));
        let journal_entries = removable
            .iter()
            .fold(0_usize, |acc, id| acc.saturating_add(self.escrow.compact(*id)));
        self.dirty = true;
        debug!(
            tick = now,
            removed = removable.len(),
            journal_entries,
            "Pruned contracts"
        );
        removable.len()
    }

    /// Check the escrow journal against the live holds, logging any anomaly.
    pub fn audit_escrow(&self) -> AuditResult {
        let result = self.escrow.audit();
        if let AuditResult::Anomaly(anomaly) = &result {
            warn!(%anomaly, "Escrow audit failed");
        }
        result
    }

    fn position(&self, id: ContractId) -> Option<usize> {
        self.contracts.iter().position(|c| c.id() == id)
    }
}

/// Log a rejected bid and build the result.
fn reject(
    contract_id: ContractId,
    bidder: AgentId,
    amount: i64,
    reason: BidRejection,
) -> BidResult {
    debug!(contract = %contract_id, %bidder, amount, %reason, "Bid rejected");
    BidResult::Rejected(reason)
}
