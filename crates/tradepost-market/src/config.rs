//! Tunable parameters for the contract market.
//!
//! Loaded from the `market` section of `tradepost-config.yaml`. Every field
//! has a default so a partial section is valid. Durations are in ticks.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tradepost_types::ResourceId;

/// Market configuration shared by the board and every town AI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Resource used to pay for bids. Never listed for sale.
    #[serde(default = "default_currency")]
    pub currency: ResourceId,

    /// Stock above which a town lists the excess.
    #[serde(default = "default_excess_threshold")]
    pub excess_threshold: i64,

    /// Stock below which a town bids on other towns' listings.
    #[serde(default = "default_need_threshold")]
    pub need_threshold: i64,

    /// Maximum number of active contracts a town may have issued.
    #[serde(default = "default_max_active_contracts")]
    pub max_active_contracts: usize,

    /// Cap on `bid + courier cost` as a multiple of the base price.
    #[serde(default = "default_max_bid_multiplier")]
    pub max_bid_multiplier: Decimal,

    /// Factor applied to the current best price to form a new bid.
    #[serde(default = "default_bid_raise_factor")]
    pub bid_raise_factor: Decimal,

    /// Ticks between a town's listing/bidding evaluations.
    #[serde(default = "default_check_interval_ticks")]
    pub check_interval_ticks: u64,

    /// Ticks between deciding to bid and submitting the bid.
    #[serde(default = "default_bid_delay_ticks")]
    pub bid_delay_ticks: u64,

    /// Extra random delay, `0..=bid_jitter_ticks`, added per scheduled bid.
    #[serde(default = "default_bid_jitter_ticks")]
    pub bid_jitter_ticks: u64,

    /// Length of the auction window in ticks.
    #[serde(default = "default_contract_duration_ticks")]
    pub contract_duration_ticks: u64,

    /// Unit price for resources without an entry in `unit_prices`.
    #[serde(default = "default_unit_price")]
    pub default_unit_price: i64,

    /// Unit price per resource.
    #[serde(default)]
    pub unit_prices: BTreeMap<ResourceId, i64>,

    /// Flat part of the courier cost.
    #[serde(default = "default_courier_base_cost")]
    pub courier_base_cost: i64,

    /// Courier cost per unit of distance between the two towns.
    #[serde(default = "default_courier_cost_per_distance")]
    pub courier_cost_per_distance: Decimal,

    /// Ticks a closed auction may wait for delivery before it is unwound.
    /// `None` keeps courier jobs open forever.
    #[serde(default = "default_courier_timeout_ticks")]
    pub courier_timeout_ticks: Option<u64>,

    /// Ticks an expired contract stays readable before it is pruned.
    #[serde(default = "default_retention_ticks")]
    pub retention_ticks: u64,
}

impl MarketConfig {
    /// Unit price configured for `resource`.
    pub fn unit_price(&self, resource: &ResourceId) -> i64 {
        self.unit_prices
            .get(resource)
            .copied()
            .unwrap_or(self.default_unit_price)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            excess_threshold: default_excess_threshold(),
            need_threshold: default_need_threshold(),
            max_active_contracts: default_max_active_contracts(),
            max_bid_multiplier: default_max_bid_multiplier(),
            bid_raise_factor: default_bid_raise_factor(),
            check_interval_ticks: default_check_interval_ticks(),
            bid_delay_ticks: default_bid_delay_ticks(),
            bid_jitter_ticks: default_bid_jitter_ticks(),
            contract_duration_ticks: default_contract_duration_ticks(),
            default_unit_price: default_unit_price(),
            unit_prices: BTreeMap::new(),
            courier_base_cost: default_courier_base_cost(),
            courier_cost_per_distance: default_courier_cost_per_distance(),
            courier_timeout_ticks: default_courier_timeout_ticks(),
            retention_ticks: default_retention_ticks(),
        }
    }
}

fn default_currency() -> ResourceId {
    ResourceId::from("coin")
}

const fn default_excess_threshold() -> i64 {
    200
}

const fn default_need_threshold() -> i64 {
    100
}

const fn default_max_active_contracts() -> usize {
    3
}

const fn default_max_bid_multiplier() -> Decimal {
    Decimal::from_parts(3, 0, 0, false, 0)
}

const fn default_bid_raise_factor() -> Decimal {
    Decimal::from_parts(11, 0, 0, false, 1)
}

const fn default_check_interval_ticks() -> u64 {
    100
}

const fn default_bid_delay_ticks() -> u64 {
    20
}

const fn default_bid_jitter_ticks() -> u64 {
    10
}

const fn default_contract_duration_ticks() -> u64 {
    6_000
}

const fn default_unit_price() -> i64 {
    1
}

const fn default_courier_base_cost() -> i64 {
    5
}

const fn default_courier_cost_per_distance() -> Decimal {
    Decimal::from_parts(1, 0, 0, false, 1)
}

const fn default_courier_timeout_ticks() -> Option<u64> {
    Some(12_000)
}

const fn default_retention_ticks() -> u64 {
    1_200
}
