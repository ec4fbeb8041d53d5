//! Per-town resource balances.
//!
//! [`ResourceLedger`] is the narrow interface the contract board and the
//! town AI use to read and move resources. The host world may back it with
//! its own storage; [`TownLedger`] is the in-memory implementation used by
//! the headless engine and the tests.
//!
//! # Design
//!
//! - **Never negative**: a debit that would overdraw fails and changes nothing.
//! - **Positive amounts only**: zero or negative credits and debits are ignored.
//! - **Saturating**: balances saturate at `i64::MAX` instead of wrapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use tradepost_types::{AgentId, ResourceId};

/// Read and mutate the resource balances of towns.
pub trait ResourceLedger {
    /// Current quantity of `resource` held by `agent` (0 if unknown).
    fn balance(&self, agent: AgentId, resource: &ResourceId) -> i64;

    /// Add `amount` units of `resource` to `agent`.
    fn credit(&mut self, agent: AgentId, resource: &ResourceId, amount: i64);

    /// Remove `amount` units of `resource` from `agent`.
    ///
    /// Returns `false` and leaves the balance untouched if the agent holds
    /// fewer than `amount` units.
    fn debit(&mut self, agent: AgentId, resource: &ResourceId, amount: i64) -> bool;

    /// Every resource the agent holds a positive quantity of.
    fn holdings(&self, agent: AgentId) -> BTreeMap<ResourceId, i64>;
}

/// In-memory ledger of every town's stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownLedger {
    /// Balances per town, per resource.
    accounts: BTreeMap<AgentId, BTreeMap<ResourceId, i64>>,
}

impl TownLedger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            accounts: BTreeMap::new(),
        }
    }

    /// Open an empty account so the town shows up in [`agents`](Self::agents).
    pub fn open_account(&mut self, agent: AgentId) {
        self.accounts.entry(agent).or_default();
    }

    /// Towns with an account, in id order.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.accounts.keys().copied()
    }

    /// Total quantity of `resource` across all towns.
    pub fn total_supply(&self, resource: &ResourceId) -> i64 {
        self.accounts
            .values()
            .filter_map(|stock| stock.get(resource))
            .fold(0_i64, |acc, qty| acc.saturating_add(*qty))
    }
}

impl ResourceLedger for TownLedger {
    fn balance(&self, agent: AgentId, resource: &ResourceId) -> i64 {
        self.accounts
            .get(&agent)
            .and_then(|stock| stock.get(resource))
            .copied()
            .unwrap_or(0)
    }

    fn credit(&mut self, agent: AgentId, resource: &ResourceId, amount: i64) {
        if amount <= 0 {
            warn!(%agent, %resource, amount, "Ignoring non-positive credit");
            return;
        }
        let qty = self
            .accounts
            .entry(agent)
            .or_default()
            .entry(resource.clone())
            .or_insert(0);
        *qty = qty.saturating_add(amount);
    }

    fn debit(&mut self, agent: AgentId, resource: &ResourceId, amount: i64) -> bool {
        if amount <= 0 {
            warn!(%agent, %resource, amount, "Ignoring non-positive debit");
            return false;
        }
        let Some(qty) = self
            .accounts
            .get_mut(&agent)
            .and_then(|stock| stock.get_mut(resource))
        else {
            return false;
        };
        match qty.checked_sub(amount) {
            Some(rest) if rest >= 0 => {
                *qty = rest;
                true
            }
            _ => false,
        }
    }

    fn holdings(&self, agent: AgentId) -> BTreeMap<ResourceId, i64> {
        self.accounts
            .get(&agent)
            .map(|stock| {
                stock
                    .iter()
                    .filter(|(_, qty)| **qty > 0)
                    .map(|(res, qty)| (res.clone(), *qty))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood() -> ResourceId {
        ResourceId::from("wood")
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = TownLedger::new();
        assert_eq!(ledger.agents().count(), 0);
        assert_eq!(ledger.balance(AgentId::new(), &wood()), 0);
    }

    #[test]
    fn credit_then_debit() {
        let mut ledger = TownLedger::new();
        let town = AgentId::new();
        ledger.credit(town, &wood(), 10);
        assert!(ledger.debit(town, &wood(), 4));
        assert_eq!(ledger.balance(town, &wood()), 6);
    }

    #[test]
    fn overdraw_fails_without_change() {
        let mut ledger = TownLedger::new();
        let town = AgentId::new();
        ledger.credit(town, &wood(), 3);
        assert!(!ledger.debit(town, &wood(), 4));
        assert_eq!(ledger.balance(town, &wood()), 3);
    }

    #[test]
    fn debit_unknown_account_fails() {
        let mut ledger = TownLedger::new();
        assert!(!ledger.debit(AgentId::new(), &wood(), 1));
    }

    #[test]
    fn non_positive_amounts_are_ignored() {
        let mut ledger = TownLedger::new();
        let town = AgentId::new();
        ledger.credit(town, &wood(), 5);
        ledger.credit(town, &wood(), -2);
        ledger.credit(town, &wood(), 0);
        assert!(!ledger.debit(town, &wood(), 0));
        assert!(!ledger.debit(town, &wood(), -1));
        assert_eq!(ledger.balance(town, &wood()), 5);
    }

    #[test]
    fn holdings_skip_empty_resources() {
        let mut ledger = TownLedger::new();
        let town = AgentId::new();
        let stone = ResourceId::from("stone");
        ledger.credit(town, &wood(), 5);
        ledger.credit(town, &stone, 2);
        assert!(ledger.debit(town, &stone, 2));

        let holdings = ledger.holdings(town);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings.get(&wood()).copied(), Some(5));
    }

    #[test]
    fn total_supply_sums_towns() {
        let mut ledger = TownLedger::new();
        ledger.credit(AgentId::new(), &wood(), 5);
        ledger.credit(AgentId::new(), &wood(), 7);
        assert_eq!(ledger.total_supply(&wood()), 12);
    }

    #[test]
    fn open_account_registers_town() {
        let mut ledger = TownLedger::new();
        let town = AgentId::new();
        ledger.open_account(town);
        assert_eq!(ledger.agents().collect::<Vec<_>>(), vec![town]);
        assert!(ledger.holdings(town).is_empty());
    }
}
