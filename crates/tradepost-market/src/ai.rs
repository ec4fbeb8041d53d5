//! Per-town trading AI.
//!
//! Every town owns one [`AgentContractAi`]. On its check interval the AI
//! lists surplus stock and schedules bids on listings it needs; every tick it
//! submits the bids that came due. Scheduled bids wait `bid_delay_ticks` plus
//! a seeded random jitter so towns that reach the same decision on the same
//! tick do not all submit identical bids together.
//!
//! Abstaining (over budget, cannot afford) is an expected outcome. It is
//! logged at debug level and the contract is looked at again on the next
//! check.

use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use tradepost_types::{AgentId, BidResult, ContractId, ContractStatus};

use crate::board::ContractBoard;
use crate::context::MarketContext;
use crate::contract::Contract;
use crate::error::BoardError;
use crate::pricing::{self, BidDecision};

/// What one [`AgentContractAi::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AiTickReport {
    /// Whether the check interval elapsed and the town evaluated the market.
    pub evaluated: bool,
    /// Sell contracts listed this tick.
    pub listed: Vec<ContractId>,
    /// Contracts a bid was scheduled for.
    pub scheduled: Vec<ContractId>,
    /// Bids submitted to the board, with the board's answer.
    pub submitted: Vec<(ContractId, BidResult)>,
}

/// Trading decisions for one town.
#[derive(Debug, Clone)]
pub struct AgentContractAi {
    agent_id: AgentId,
    pending_bids: BTreeMap<ContractId, u64>,
    next_check: u64,
    rng: SmallRng,
}

impl AgentContractAi {
    /// Create the AI for `agent_id`. The jitter stream is derived from
    /// `seed` and the agent id, so a run is reproducible.
    pub fn new(agent_id: AgentId, seed: u64) -> Self {
        let (hi, lo) = agent_id.into_inner().as_u64_pair();
        Self {
            agent_id,
            pending_bids: BTreeMap::new(),
            next_check: 0,
            rng: SmallRng::seed_from_u64(seed ^ hi ^ lo),
        }
    }

    /// Restore an AI with bids scheduled before a save.
    pub fn with_pending(agent_id: AgentId, seed: u64, pending: BTreeMap<ContractId, u64>) -> Self {
        Self {
            pending_bids: pending,
            ..Self::new(agent_id, seed)
        }
    }

    /// The town this AI trades for.
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Scheduled bids: contract id to the tick the bid is due.
    pub const fn pending_bids(&self) -> &BTreeMap<ContractId, u64> {
        &self.pending_bids
    }

    /// Tick of the next listing/bidding evaluation.
    pub const fn next_check(&self) -> u64 {
        self.next_check
    }

    /// Run one tick: evaluate the market if the check interval elapsed, then
    /// submit every bid that is due.
    ///
    /// # Errors
    ///
    /// Propagates [`BoardError`] from board calls. Business outcomes such as
    /// rejected bids are reported in the [`AiTickReport`], not as errors.
    pub fn tick(
        &mut self,
        board: &mut ContractBoard,
        ctx: &mut MarketContext<'_>,
    ) -> Result<AiTickReport, BoardError> {
        let now = ctx.now();
        let mut report = AiTickReport::default();

        if now >= self.next_check {
            report.evaluated = true;
            report.listed = self.try_create_contract(board, ctx)?;
            report.scheduled = self.scan_for_bids(board, ctx);
            self.next_check = now.saturating_add(board.config().check_interval_ticks.max(1));
        }

        report.submitted = self.process_pending_bids(board, ctx)?;
        Ok(report)
    }

    /// List surplus stock.
    ///
    /// For each non-currency resource held above `excess_threshold`, while
    /// the town has fewer than `max_active_contracts` active listings and no
    /// active listing of that resource, list half the excess.
    ///
    /// # Errors
    ///
    /// Propagates listing errors other than running short of goods.
    pub fn try_create_contract(
        &mut self,
        board: &mut ContractBoard,
        ctx: &mut MarketContext<'_>,
    ) -> Result<Vec<ContractId>, BoardError> {
        let now = ctx.now();
        let config = board.config();
        let currency = config.currency.clone();
        let threshold = config.excess_threshold;
        let max_active = config.max_active_contracts;

        let mut listed = Vec::new();
        for (resource, count) in ctx.ledger.holdings(self.agent_id) {
            if resource == currency || count <= threshold {
                continue;
            }
            if board.active_contracts_for(self.agent_id, now) >= max_active {
                debug!(
                    agent = %self.agent_id,
                    max_active,
                    "Listing skipped: contract limit reached"
                );
                break;
            }
            if board.has_active_listing(self.agent_id, &resource, now) {
                continue;
            }

            let quantity = count.saturating_sub(threshold).checked_div(2).unwrap_or(0);
            if quantity <= 0 {
                continue;
            }
            let price = board.config().unit_price(&resource);
            match board.list_sell_contract(self.agent_id, resource.clone(), quantity, price, ctx) {
                Ok(id) => {
                    info!(
                        agent = %self.agent_id,
                        contract = %id,
                        %resource,
                        quantity,
                        price,
                        "Surplus listed"
                    );
                    listed.push(id);
                }
                Err(BoardError::InsufficientGoods { available, .. }) => {
                    debug!(
                        agent = %self.agent_id,
                        %resource,
                        quantity,
                        available,
                        "Listing skipped: goods moved"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(listed)
    }

    /// Schedule bids on listings of resources the town is short of.
    ///
    /// Returns the contracts a bid was scheduled for.
    pub fn scan_for_bids(
        &mut self,
        board: &ContractBoard,
        ctx: &MarketContext<'_>,
    ) -> Vec<ContractId> {
        let now = ctx.now();
        let config = board.config();
        let mut scheduled = Vec::new();

        for sell in board.open_sell_contracts(now) {
            let terms = sell.terms();
            if terms.issuer_id == self.agent_id
                || self.pending_bids.contains_key(&terms.id)
                || sell.is_highest_bidder(self.agent_id)
            {
                continue;
            }
            if ctx.ledger.balance(self.agent_id, &terms.resource) >= config.need_threshold {
                continue;
            }

            let courier_cost =
                board.calculate_courier_cost(self.agent_id, terms.issuer_id, ctx.oracle);
            let balance = ctx.ledger.balance(self.agent_id, &config.currency);
            match pricing::evaluate_bid(sell, balance, courier_cost, config) {
                BidDecision::Bid { amount, .. } => {
                    let jitter = if config.bid_jitter_ticks == 0 {
                        0
                    } else {
                        self.rng.random_range(0..=config.bid_jitter_ticks)
                    };
                    let due = now
                        .saturating_add(config.bid_delay_ticks)
                        .saturating_add(jitter);
                    self.pending_bids.insert(terms.id, due);
                    scheduled.push(terms.id);
                    debug!(
                        agent = %self.agent_id,
                        contract = %terms.id,
                        amount,
                        courier_cost,
                        due,
                        "Bid scheduled"
                    );
                }
                BidDecision::Abstain(reason) => {
                    debug!(
                        agent = %self.agent_id,
                        contract = %terms.id,
                        ?reason,
                        "Abstained from bidding"
                    );
                }
            }
        }
        scheduled
    }

    /// Submit every scheduled bid that is due.
    ///
    /// Each due bid is re-checked against the live contract first: it must
    /// still be open, the town must not already lead, and a fresh bid over
    /// the current highest must still satisfy the budget rule. The entry is
    /// removed whatever happens.
    ///
    /// # Errors
    ///
    /// Propagates [`BoardError`] from [`ContractBoard::add_bid`].
    pub fn process_pending_bids(
        &mut self,
        board: &mut ContractBoard,
        ctx: &mut MarketContext<'_>,
    ) -> Result<Vec<(ContractId, BidResult)>, BoardError> {
        let now = ctx.now();
        let due: Vec<ContractId> = self
            .pending_bids
            .iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(&id, _)| id)
            .collect();

        let mut submitted = Vec::new();
        for id in due {
            self.pending_bids.remove(&id);

            let Some(sell) = board.get_contract(id).and_then(Contract::as_sell) else {
                debug!(
                    agent = %self.agent_id,
                    contract = %id,
                    "Scheduled bid dropped: contract gone"
                );
                continue;
            };
            if sell.status(now) != ContractStatus::Open {
                debug!(
                    agent = %self.agent_id,
                    contract = %id,
                    "Scheduled bid dropped: auction no longer open"
                );
                continue;
            }
            if sell.is_highest_bidder(self.agent_id) {
                continue;
            }

            let courier_cost =
                board.calculate_courier_cost(self.agent_id, sell.terms().issuer_id, ctx.oracle);
            let balance = ctx.ledger.balance(self.agent_id, &board.config().currency);
            let amount = match pricing::evaluate_bid(sell, balance, courier_cost, board.config()) {
                BidDecision::Bid { amount, .. } => amount,
                BidDecision::Abstain(reason) => {
                    debug!(
                        agent = %self.agent_id,
                        contract = %id,
                        ?reason,
                        "Scheduled bid dropped"
                    );
                    continue;
                }
            };

            let result = board.add_bid(id, self.agent_id, amount, ctx)?;
            submitted.push((id, result));
        }
        Ok(submitted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;
    use tradepost_ledger::{ResourceLedger, TownLedger};
    use tradepost_types::{BidRejection, ResourceId};

    use super::*;
    use crate::config::MarketConfig;
    use crate::context::{DistanceOracle, FixedClock, MemoryNotifier};

    /// Every pair of towns is the same distance apart.
    struct FlatOracle(f64);

    impl DistanceOracle for FlatOracle {
        fn distance(&self, _a: AgentId, _b: AgentId) -> f64 {
            self.0
        }
    }

    fn wood() -> ResourceId {
        ResourceId::from("wood")
    }

    fn coin() -> ResourceId {
        ResourceId::from("coin")
    }

    fn config() -> MarketConfig {
        MarketConfig {
            courier_base_cost: 0,
            courier_cost_per_distance: dec!(1),
            bid_delay_ticks: 20,
            bid_jitter_ticks: 10,
            check_interval_ticks: 100,
            ..MarketConfig::default()
        }
    }

    struct World {
        board: ContractBoard,
        ledger: TownLedger,
        oracle: FlatOracle,
        notifier: MemoryNotifier,
    }

    impl World {
        fn new(config: MarketConfig, distance: f64) -> Self {
            Self {
                board: ContractBoard::new(config),
                ledger: TownLedger::new(),
                oracle: FlatOracle(distance),
                notifier: MemoryNotifier::new(),
            }
        }

        fn tick(&mut self, ai: &mut AgentContractAi, now: u64) -> AiTickReport {
            let clock = FixedClock(now);
            let mut ctx = MarketContext {
                ledger: &mut self.ledger,
                oracle: &self.oracle,
                notifier: &mut self.notifier,
                clock: &clock,
            };
            ai.tick(&mut self.board, &mut ctx).unwrap()
        }

        fn bid(&mut self, id: ContractId, bidder: AgentId, amount: i64, now: u64) -> BidResult {
            let clock = FixedClock(now);
            let mut ctx = MarketContext {
                ledger: &mut self.ledger,
                oracle: &self.oracle,
                notifier: &mut self.notifier,
                clock: &clock,
            };
            self.board.add_bid(id, bidder, amount, &mut ctx).unwrap()
        }
    }

    #[test]
    fn lists_half_of_the_excess() {
        let mut world = World::new(config(), 20.0);
        let town = AgentId::new();
        world.ledger.credit(town, &wood(), 350);
        world.ledger.credit(town, &coin(), 1_000);
        let mut ai = AgentContractAi::new(town, 7);

        let report = world.tick(&mut ai, 0);
        assert!(report.evaluated);
        assert_eq!(report.listed.len(), 1);

        let sell = world
            .board
            .get_contract(*report.listed.first().unwrap())
            .and_then(Contract::as_sell)
            .unwrap();
        assert_eq!(sell.terms().quantity, 75);
        assert_eq!(world.ledger.balance(town, &wood()), 275);
    }

    #[test]
    fn does_not_relist_the_same_resource() {
        let mut world = World::new(config(), 20.0);
        let town = AgentId::new();
        world.ledger.credit(town, &wood(), 1_000);
        let mut ai = AgentContractAi::new(town, 7);

        assert_eq!(world.tick(&mut ai, 0).listed.len(), 1);
        let second = world.tick(&mut ai, 100);
        assert!(second.evaluated);
        assert!(second.listed.is_empty());
    }

    #[test]
    fn respects_active_contract_limit() {
        let mut world = World::new(
            MarketConfig {
                max_active_contracts: 2,
                ..config()
            },
            20.0,
        );
        let town = AgentId::new();
        for name in ["clay", "iron", "stone", "wood"] {
            world.ledger.credit(town, &ResourceId::from(name), 400);
        }
        let mut ai = AgentContractAi::new(town, 7);

        assert_eq!(world.tick(&mut ai, 0).listed.len(), 2);
        assert_eq!(world.board.active_contracts_for(town, 0), 2);
    }

    #[test]
    fn never_lists_currency() {
        let mut world = World::new(config(), 20.0);
        let town = AgentId::new();
        world.ledger.credit(town, &coin(), 10_000);
        let mut ai = AgentContractAi::new(town, 7);
        assert!(world.tick(&mut ai, 0).listed.is_empty());
    }

    #[test]
    fn evaluation_waits_for_check_interval() {
        let mut world = World::new(config(), 20.0);
        let mut ai = AgentContractAi::new(AgentId::new(), 7);
        assert!(world.tick(&mut ai, 0).evaluated);
        assert!(!world.tick(&mut ai, 50).evaluated);
        assert!(world.tick(&mut ai, 100).evaluated);
    }

    #[test]
    fn schedules_bid_with_delay_and_jitter() {
        let mut world = World::new(config(), 20.0);
        let seller = AgentId::new();
        let buyer = AgentId::new();
        world.ledger.credit(seller, &wood(), 400);
        world.ledger.credit(buyer, &coin(), 500);

        let mut seller_ai = AgentContractAi::new(seller, 7);
        let listed = world.tick(&mut seller_ai, 0).listed;
        let mut buyer_ai = AgentContractAi::new(buyer, 7);
        let report = world.tick(&mut buyer_ai, 0);

        assert_eq!(report.scheduled, listed);
        let due = *buyer_ai.pending_bids().get(listed.first().unwrap()).unwrap();
        assert!((20..=30).contains(&due));
        assert!(report.submitted.is_empty());
    }

    #[test]
    fn due_bid_is_submitted_and_removed() {
        let mut world = World::new(config(), 20.0);
        let seller = AgentId::new();
        let buyer = AgentId::new();
        world.ledger.credit(seller, &wood(), 400);
        world.ledger.credit(buyer, &coin(), 500);
        let mut seller_ai = AgentContractAi::new(seller, 7);
        let id = *world.tick(&mut seller_ai, 0).listed.first().unwrap();
        let mut buyer_ai = AgentContractAi::new(buyer, 7);
        world.tick(&mut buyer_ai, 0);

        let report = world.tick(&mut buyer_ai, 30);
        assert_eq!(report.submitted, vec![(id, BidResult::Accepted)]);
        assert!(buyer_ai.pending_bids().is_empty());

        // 100 units at base price 100 → first bid 110.
        let sell = world.board.get_contract(id).and_then(Contract::as_sell).unwrap();
        assert_eq!(sell.highest_bid(), Some(110));
        assert_eq!(world.ledger.balance(buyer, &coin()), 390);
    }

    #[test]
    fn abstains_when_courier_eats_the_budget() {
        let mut world = World::new(config(), 250.0);
        let seller = AgentId::new();
        let buyer = AgentId::new();
        world.ledger.credit(seller, &wood(), 400);
        world.ledger.credit(buyer, &coin(), 10_000);
        let mut seller_ai = AgentContractAi::new(seller, 7);
        world.tick(&mut seller_ai, 0);

        let mut buyer_ai = AgentContractAi::new(buyer, 7);
        let report = world.tick(&mut buyer_ai, 0);
        assert!(report.scheduled.is_empty());
        assert!(buyer_ai.pending_bids().is_empty());
    }

    #[test]
    fn well_stocked_town_does_not_bid() {
        let mut world = World::new(config(), 20.0);
        let seller = AgentId::new();
        let buyer = AgentId::new();
        world.ledger.credit(seller, &wood(), 400);
        world.ledger.credit(buyer, &wood(), 150);
        world.ledger.credit(buyer, &coin(), 500);
        let mut seller_ai = AgentContractAi::new(seller, 7);
        world.tick(&mut seller_ai, 0);

        let mut buyer_ai = AgentContractAi::new(buyer, 7);
        assert!(world.tick(&mut buyer_ai, 0).scheduled.is_empty());
    }

    #[test]
    fn stale_bid_is_revalidated_against_current_price() {
        let mut world = World::new(config(), 20.0);
        let seller = AgentId::new();
        let buyer = AgentId::new();
        let rival = AgentId::new();
        world.ledger.credit(seller, &wood(), 400);
        world.ledger.credit(buyer, &coin(), 500);
        world.ledger.credit(rival, &coin(), 1_000);
        let mut seller_ai = AgentContractAi::new(seller, 7);
        let id = *world.tick(&mut seller_ai, 0).listed.first().unwrap();
        let mut buyer_ai = AgentContractAi::new(buyer, 7);
        world.tick(&mut buyer_ai, 0);

        // While the bid waits, a rival pushes the price past the budget:
        // ceil(275 × 1.1) + 20 = 323 > 300.
        assert_eq!(world.bid(id, rival, 275, 5), BidResult::Accepted);

        let report = world.tick(&mut buyer_ai, 30);
        assert!(report.submitted.is_empty());
        assert!(buyer_ai.pending_bids().is_empty());
        assert_eq!(world.ledger.balance(buyer, &coin()), 500);
    }

    #[test]
    fn bid_on_expired_listing_is_dropped() {
        let mut world = World::new(
            MarketConfig {
                contract_duration_ticks: 10,
                ..config()
            },
            20.0,
        );
        let seller = AgentId::new();
        let buyer = AgentId::new();
        world.ledger.credit(seller, &wood(), 400);
        world.ledger.credit(buyer, &coin(), 500);
        let mut seller_ai = AgentContractAi::new(seller, 7);
        let id = *world.tick(&mut seller_ai, 0).listed.first().unwrap();
        let mut buyer_ai = AgentContractAi::new(buyer, 7);
        world.tick(&mut buyer_ai, 0);

        let report = world.tick(&mut buyer_ai, 30);
        assert!(report.submitted.is_empty());
        assert_eq!(
            world.bid(id, buyer, 200, 30),
            BidResult::Rejected(BidRejection::Expired)
        );
    }

    #[test]
    fn same_seed_gives_same_schedule() {
        let town = AgentId::new();
        let mut a = AgentContractAi::new(town, 99);
        let mut b = AgentContractAi::new(town, 99);
        let draws_a: Vec<u64> = (0..8).map(|_| a.rng.random_range(0..=10)).collect();
        let draws_b: Vec<u64> = (0..8).map(|_| b.rng.random_range(0..=10)).collect();
        assert_eq!(draws_a, draws_b);
    }
}
