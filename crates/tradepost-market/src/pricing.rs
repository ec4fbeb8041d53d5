//! Bid pricing, courier cost, and the budget rule.
//!
//! All multiplications go through [`Decimal`] so that `100 × 1.1` is exactly
//! `110`; binary floating point would round it up to `111` after `ceil`.
//!
//! Budget rule for a bid on a contract with base price `B`:
//!
//! ```text
//! bid + courier_cost <= B × max_bid_multiplier
//! ```

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::config::MarketConfig;
use crate::contract::SellContract;

/// Why a town decided not to bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstainReason {
    /// `bid + courier_cost` is above the budget cap.
    BudgetExceeded {
        /// The candidate bid.
        bid: i64,
        /// Quoted courier cost.
        courier_cost: i32,
    },
    /// The town cannot pay the bid plus the courier cost.
    InsufficientFunds {
        /// Bid plus courier cost.
        needed: i64,
        /// Currency balance.
        available: i64,
    },
    /// The price arithmetic left the representable range.
    Overflow,
}

/// Outcome of evaluating one contract for bidding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidDecision {
    /// Bid this amount.
    Bid {
        /// The bid amount.
        amount: i64,
        /// Courier cost the bid was budgeted against.
        courier_cost: i32,
    },
    /// Do not bid.
    Abstain(AbstainReason),
}

/// Courier cost for moving goods over `distance`.
///
/// `ceil(base + distance × per_distance)`, never negative, saturating at
/// `i32::MAX` for unknown (infinite) or absurd distances. Non-decreasing in
/// `distance`.
pub fn courier_cost(distance: f64, base: i64, per_distance: Decimal) -> i32 {
    if !distance.is_finite() {
        return i32::MAX;
    }
    let Some(distance) = Decimal::from_f64(distance.max(0.0)) else {
        return i32::MAX;
    };
    distance
        .checked_mul(per_distance)
        .and_then(|d| d.checked_add(Decimal::from(base)))
        .map(|cost| cost.ceil().max(Decimal::ZERO))
        .and_then(|cost| cost.to_i32())
        .unwrap_or(i32::MAX)
}

/// Next bid on a contract whose price to beat is `floor`.
///
/// `ceil(floor × raise)`. When a bid already exists the result is at least
/// one more than it, so the highest bid strictly increases. Returns `None`
/// on overflow.
pub fn next_bid(floor: i64, has_bid: bool, raise: Decimal) -> Option<i64> {
    let raised = Decimal::from(floor).checked_mul(raise)?.ceil().to_i64()?;
    if has_bid {
        Some(raised.max(floor.checked_add(1)?))
    } else {
        Some(raised.max(floor))
    }
}

/// Budget cap `base_price × multiplier`.
pub fn budget_cap(base_price: i64, multiplier: Decimal) -> Option<Decimal> {
    Decimal::from(base_price).checked_mul(multiplier)
}

/// Whether `bid + courier_cost` fits under the budget cap.
pub fn within_budget(bid: i64, courier_cost: i32, base_price: i64, multiplier: Decimal) -> bool {
    let Some(cap) = budget_cap(base_price, multiplier) else {
        return false;
    };
    Decimal::from(bid)
        .checked_add(Decimal::from(courier_cost))
        .is_some_and(|total| total <= cap)
}

/// Decide whether and how much to bid on `contract`.
///
/// Applies the raise factor to the current best price, then the budget rule,
/// then affordability of bid plus courier cost against `balance`.
pub fn evaluate_bid(
    contract: &SellContract,
    balance: i64,
    courier_cost: i32,
    config: &MarketConfig,
) -> BidDecision {
    let Some(amount) = next_bid(
        contract.price_floor(),
        contract.highest_bid().is_some(),
        config.bid_raise_factor,
    ) else {
        return BidDecision::Abstain(AbstainReason::Overflow);
    };

    let base = contract.terms().base_price();
    if !within_budget(amount, courier_cost, base, config.max_bid_multiplier) {
        return BidDecision::Abstain(AbstainReason::BudgetExceeded {
            bid: amount,
            courier_cost,
        });
    }

    let Some(needed) = amount.checked_add(i64::from(courier_cost)) else {
        return BidDecision::Abstain(AbstainReason::Overflow);
    };
    if balance < needed {
        return BidDecision::Abstain(AbstainReason::InsufficientFunds {
            needed,
            available: balance,
        });
    }

    BidDecision::Bid {
        amount,
        courier_cost,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tradepost_types::{AgentId, ContractId, ResourceId};

    use super::*;
    use crate::contract::ContractTerms;

    fn contract(quantity: i64, price: i64) -> SellContract {
        SellContract::new(ContractTerms {
            id: ContractId::new(),
            issuer_id: AgentId::new(),
            resource: ResourceId::from("wood"),
            quantity,
            price_per_unit: price,
            created_at: 0,
            duration: 100,
        })
    }

    #[test]
    fn first_bid_is_ten_percent_over_base() {
        assert_eq!(next_bid(100, false, dec!(1.1)), Some(110));
    }

    #[test]
    fn raise_rounds_up() {
        assert_eq!(next_bid(115, true, dec!(1.1)), Some(127));
    }

    #[test]
    fn raise_always_beats_existing_bid() {
        assert_eq!(next_bid(1, true, dec!(1.1)), Some(2));
        assert_eq!(next_bid(5, true, dec!(1.0)), Some(6));
    }

    #[test]
    fn courier_cost_scales_with_distance() {
        assert_eq!(courier_cost(0.0, 5, dec!(0.1)), 5);
        assert_eq!(courier_cost(100.0, 5, dec!(0.1)), 15);
        assert_eq!(courier_cost(101.0, 5, dec!(0.1)), 16);
        assert!(courier_cost(50.0, 5, dec!(0.1)) <= courier_cost(51.0, 5, dec!(0.1)));
    }

    #[test]
    fn unknown_distance_is_unaffordable() {
        assert_eq!(courier_cost(f64::INFINITY, 5, dec!(0.1)), i32::MAX);
        assert_eq!(courier_cost(f64::NAN, 5, dec!(0.1)), i32::MAX);
    }

    #[test]
    fn budget_boundary_is_inclusive() {
        assert!(within_budget(280, 20, 100, dec!(3)));
        assert!(!within_budget(281, 20, 100, dec!(3)));
    }

    #[test]
    fn evaluate_bids_within_budget() {
        let config = MarketConfig::default();
        let decision = evaluate_bid(&contract(100, 1), 500, 20, &config);
        assert_eq!(
            decision,
            BidDecision::Bid {
                amount: 110,
                courier_cost: 20
            }
        );
    }

    #[test]
    fn evaluate_abstains_when_courier_eats_budget() {
        // 100 × 3.0 − 250 leaves 50; the 110 candidate does not fit.
        let config = MarketConfig::default();
        let decision = evaluate_bid(&contract(100, 1), 10_000, 250, &config);
        assert_eq!(
            decision,
            BidDecision::Abstain(AbstainReason::BudgetExceeded {
                bid: 110,
                courier_cost: 250
            })
        );
    }

    #[test]
    fn evaluate_abstains_when_poor() {
        let config = MarketConfig::default();
        let decision = evaluate_bid(&contract(100, 1), 120, 20, &config);
        assert_eq!(
            decision,
            BidDecision::Abstain(AbstainReason::InsufficientFunds {
                needed: 130,
                available: 120
            })
        );
    }
}
