//! Contract escrow: units reserved against a contract until it settles.
//!
//! Each contract has at most two holds:
//!
//! - [`HoldKind::Goods`], owned by the seller, reserved at listing. Settled
//!   to the buyer on delivery, or released to the seller on expiry.
//! - [`HoldKind::Funds`], owned by the highest bidder, reserved when the bid
//!   is accepted. Released when outbid or expired, or settled to the seller
//!   on delivery.
//!
//! Every movement is appended to the journal. The journal is never
//! rewritten; [`EscrowBook::audit`] replays it against the live holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tradepost_types::{AgentId, ContractId, ResourceId};

use crate::LedgerError;
use crate::conservation::{AuditResult, audit_journal};
use crate::ledger::ResourceLedger;

/// Which side of a contract a hold belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HoldKind {
    /// The seller's listed goods.
    Goods,
    /// The highest bidder's currency.
    Funds,
}

/// Units currently held against one side of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowHold {
    /// The town the units came from.
    pub owner: AgentId,
    /// The held resource.
    pub resource: ResourceId,
    /// Quantity held (always positive).
    pub amount: i64,
}

/// Direction of an escrow movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowMovement {
    /// Units left the owner's ledger and entered escrow.
    Reserve,
    /// Units went back to the owner's ledger.
    Release,
    /// Units went to the counterparty's ledger.
    Settle,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEntry {
    /// Tick the movement happened on.
    pub tick: u64,
    /// The contract the hold belongs to.
    pub contract_id: ContractId,
    /// Which hold moved.
    pub kind: HoldKind,
    /// Reserve, release, or settle.
    pub movement: EscrowMovement,
    /// Owner for reserve/release, recipient for settle.
    pub agent: AgentId,
    /// The resource moved.
    pub resource: ResourceId,
    /// Quantity moved.
    pub amount: i64,
}

/// Parameters for placing a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRequest {
    /// The current tick.
    pub tick: u64,
    /// Contract to hold against.
    pub contract_id: ContractId,
    /// Which slot of the contract.
    pub kind: HoldKind,
    /// Town the units come from.
    pub owner: AgentId,
    /// The resource to hold.
    pub resource: ResourceId,
    /// Quantity to hold.
    pub amount: i64,
}

/// Both hold slots of one contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ContractHolds {
    goods: Option<EscrowHold>,
    funds: Option<EscrowHold>,
}

impl ContractHolds {
    const fn slot(&self, kind: HoldKind) -> Option<&EscrowHold> {
        match kind {
            HoldKind::Goods => self.goods.as_ref(),
            HoldKind::Funds => self.funds.as_ref(),
        }
    }

    const fn slot_mut(&mut self, kind: HoldKind) -> &mut Option<EscrowHold> {
        match kind {
            HoldKind::Goods => &mut self.goods,
            HoldKind::Funds => &mut self.funds,
        }
    }

    const fn is_empty(&self) -> bool {
        self.goods.is_none() && self.funds.is_none()
    }
}

/// Escrow holds for every contract on a board, plus the movement journal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowBook {
    holds: BTreeMap<ContractId, ContractHolds>,
    journal: Vec<EscrowEntry>,
}

impl EscrowBook {
    /// Create an empty escrow book.
    pub const fn new() -> Self {
        Self {
            holds: BTreeMap::new(),
            journal: Vec::new(),
        }
    }

    /// Debit the owner's ledger and hold the units against the contract.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NonPositiveAmount`] for zero or negative amounts.
    /// - [`LedgerError::SlotOccupied`] if the contract already has this hold.
    /// - [`LedgerError::InsufficientBalance`] if the debit fails.
    pub fn reserve(
        &mut self,
        ledger: &mut dyn ResourceLedger,
        request: HoldRequest,
    ) -> Result<(), LedgerError> {
        self.check_slot(&request)?;
        if !ledger.debit(request.owner, &request.resource, request.amount) {
            return Err(LedgerError::InsufficientBalance {
                agent: request.owner,
                resource: request.resource.clone(),
                requested: request.amount,
                available: ledger.balance(request.owner, &request.resource),
            });
        }
        self.insert_hold(request);
        Ok(())
    }

    /// Hold units the caller already removed from the owner's ledger.
    ///
    /// # Errors
    ///
    /// Same validation as [`reserve`](Self::reserve), minus the balance check.
    pub fn record_prefunded(&mut self, request: HoldRequest) -> Result<(), LedgerError> {
        self.check_slot(&request)?;
        self.insert_hold(request);
        Ok(())
    }

    /// Return a hold to its owner's ledger.
    ///
    /// Returns the released hold, or `None` if the slot was empty. Releasing
    /// an empty slot is a no-op, so a hold can never be released twice.
    pub fn release(
        &mut self,
        ledger: &mut dyn ResourceLedger,
        tick: u64,
        contract_id: ContractId,
        kind: HoldKind,
    ) -> Option<EscrowHold> {
        let hold = self.take_hold(contract_id, kind)?;
        ledger.credit(hold.owner, &hold.resource, hold.amount);
        self.push_entry(tick, contract_id, kind, EscrowMovement::Release, hold.owner, &hold);
        Some(hold)
    }

    /// Pay a hold out to `recipient`.
    ///
    /// Returns the settled hold, or `None` if the slot was empty.
    pub fn settle(
        &mut self,
        ledger: &mut dyn ResourceLedger,
        tick: u64,
        contract_id: ContractId,
        kind: HoldKind,
        recipient: AgentId,
    ) -> Option<EscrowHold> {
        let hold = self.take_hold(contract_id, kind)?;
        ledger.credit(recipient, &hold.resource, hold.amount);
        self.push_entry(tick, contract_id, kind, EscrowMovement::Settle, recipient, &hold);
        Some(hold)
    }

    /// The hold in a contract slot, if any.
    pub fn hold(&self, contract_id: ContractId, kind: HoldKind) -> Option<&EscrowHold> {
        self.holds.get(&contract_id).and_then(|h| h.slot(kind))
    }

    /// Total quantity of `resource` currently in escrow.
    pub fn held_total(&self, resource: &ResourceId) -> i64 {
        self.holds
            .values()
            .flat_map(|h| [h.goods.as_ref(), h.funds.as_ref()])
            .flatten()
            .filter(|hold| &hold.resource == resource)
            .fold(0_i64, |acc, hold| acc.saturating_add(hold.amount))
    }

    /// Quantity of `resource` a town currently has in escrow.
    pub fn held_by(&self, owner: AgentId, resource: &ResourceId) -> i64 {
        self.holds
            .values()
            .flat_map(|h| [h.goods.as_ref(), h.funds.as_ref()])
            .flatten()
            .filter(|hold| hold.owner == owner && &hold.resource == resource)
            .fold(0_i64, |acc, hold| acc.saturating_add(hold.amount))
    }

    /// All journal entries, oldest first.
    pub fn journal(&self) -> &[EscrowEntry] {
        &self.journal
    }

    /// Journal entries for one contract, oldest first.
    pub fn entries_for_contract(&self, contract_id: ContractId) -> Vec<&EscrowEntry> {
        self.journal
            .iter()
            .filter(|e| e.contract_id == contract_id)
            .collect()
    }

    /// Drop journal entries for contracts that no longer hold anything.
    ///
    /// Called when the board prunes settled contracts so the journal does not
    /// grow without bound. Entries of contracts with live holds are kept.
    /// Returns the number of entries dropped.
    pub fn compact(&mut self, contract_id: ContractId) -> usize {
        if self.holds.contains_key(&contract_id) {
            return 0;
        }
        let dropped = self.entries_for_contract(contract_id).len();
        self.journal.retain(|e| e.contract_id != contract_id);
        dropped
    }

    /// Replay the journal and compare it with the live holds.
    pub fn audit(&self) -> AuditResult {
        let mut held: BTreeMap<ResourceId, i64> = BTreeMap::new();
        for hold in self
            .holds
            .values()
            .flat_map(|h| [h.goods.as_ref(), h.funds.as_ref()])
            .flatten()
        {
            let v = held.entry(hold.resource.clone()).or_insert(0);
            *v = v.saturating_add(hold.amount);
        }
        audit_journal(&self.journal, &held)
    }

    fn check_slot(&self, request: &HoldRequest) -> Result<(), LedgerError> {
        if request.amount <= 0 {
            return Err(LedgerError::NonPositiveAmount {
                amount: request.amount,
            });
        }
        if self.hold(request.contract_id, request.kind).is_some() {
            return Err(LedgerError::SlotOccupied {
                contract_id: request.contract_id,
                kind: request.kind,
            });
        }
        Ok(())
    }

    fn insert_hold(&mut self, request: HoldRequest) {
        let hold = EscrowHold {
            owner: request.owner,
            resource: request.resource,
            amount: request.amount,
        };
        self.push_entry(
            request.tick,
            request.contract_id,
            request.kind,
            EscrowMovement::Reserve,
            request.owner,
            &hold,
        );
        *self
            .holds
            .entry(request.contract_id)
            .or_default()
            .slot_mut(request.kind) = Some(hold);
    }

    fn take_hold(&mut self, contract_id: ContractId, kind: HoldKind) -> Option<EscrowHold> {
        let holds = self.holds.get_mut(&contract_id)?;
        let hold = holds.slot_mut(kind).take();
        if holds.is_empty() {
            self.holds.remove(&contract_id);
        }
        hold
    }

    fn push_entry(
        &mut self,
        tick: u64,
        contract_id: ContractId,
        kind: HoldKind,
        movement: EscrowMovement,
        agent: AgentId,
        hold: &EscrowHold,
    ) {
        debug!(
            tick,
            contract = %contract_id,
            ?kind,
            ?movement,
            %agent,
            resource = %hold.resource,
            amount = hold.amount,
            "Escrow movement"
        );
        self.journal.push(EscrowEntry {
            tick,
            contract_id,
            kind,
            movement,
            agent,
            resource: hold.resource.clone(),
            amount: hold.amount,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::TownLedger;

    fn coin() -> ResourceId {
        ResourceId::from("coin")
    }

    fn funds(contract_id: ContractId, owner: AgentId, amount: i64) -> HoldRequest {
        HoldRequest {
            tick: 1,
            contract_id,
            kind: HoldKind::Funds,
            owner,
            resource: coin(),
            amount,
        }
    }

    #[test]
    fn reserve_debits_owner() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let town = AgentId::new();
        let contract = ContractId::new();
        ledger.credit(town, &coin(), 500);

        book.reserve(&mut ledger, funds(contract, town, 110)).unwrap();

        assert_eq!(ledger.balance(town, &coin()), 390);
        assert_eq!(book.hold(contract, HoldKind::Funds).map(|h| h.amount), Some(110));
        assert_eq!(book.held_total(&coin()), 110);
        assert_eq!(book.held_by(town, &coin()), 110);
    }

    #[test]
    fn reserve_insufficient_changes_nothing() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let town = AgentId::new();
        ledger.credit(town, &coin(), 50);

        let err = book
            .reserve(&mut ledger, funds(ContractId::new(), town, 110))
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientBalance { available: 50, .. }));
        assert_eq!(ledger.balance(town, &coin()), 50);
        assert!(book.journal().is_empty());
    }

    #[test]
    fn occupied_slot_rejected() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let town = AgentId::new();
        let contract = ContractId::new();
        ledger.credit(town, &coin(), 500);

        book.reserve(&mut ledger, funds(contract, town, 100)).unwrap();
        let err = book.reserve(&mut ledger, funds(contract, town, 120)).unwrap_err();

        assert!(matches!(err, LedgerError::SlotOccupied { .. }));
        assert_eq!(ledger.balance(town, &coin()), 400);
    }

    #[test]
    fn zero_amount_rejected() {
        let mut book = EscrowBook::new();
        let err = book
            .record_prefunded(funds(ContractId::new(), AgentId::new(), 0))
            .unwrap_err();
        assert_eq!(err, LedgerError::NonPositiveAmount { amount: 0 });
    }

    #[test]
    fn release_happens_exactly_once() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let town = AgentId::new();
        let contract = ContractId::new();
        ledger.credit(town, &coin(), 500);
        book.reserve(&mut ledger, funds(contract, town, 110)).unwrap();

        assert!(book.release(&mut ledger, 2, contract, HoldKind::Funds).is_some());
        assert!(book.release(&mut ledger, 2, contract, HoldKind::Funds).is_none());

        assert_eq!(ledger.balance(town, &coin()), 500);
        assert_eq!(book.held_total(&coin()), 0);
        assert_eq!(book.audit(), AuditResult::Balanced);
    }

    #[test]
    fn settle_pays_recipient() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let buyer = AgentId::new();
        let seller = AgentId::new();
        let contract = ContractId::new();
        ledger.credit(buyer, &coin(), 200);
        book.reserve(&mut ledger, funds(contract, buyer, 150)).unwrap();

        let settled = book.settle(&mut ledger, 5, contract, HoldKind::Funds, seller);

        assert_eq!(settled.map(|h| h.owner), Some(buyer));
        assert_eq!(ledger.balance(seller, &coin()), 150);
        assert_eq!(ledger.balance(buyer, &coin()), 50);
        assert_eq!(book.entries_for_contract(contract).len(), 2);
        assert_eq!(book.audit(), AuditResult::Balanced);
    }

    #[test]
    fn compact_keeps_live_contracts() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let town = AgentId::new();
        let live = ContractId::new();
        let done = ContractId::new();
        ledger.credit(town, &coin(), 500);
        book.reserve(&mut ledger, funds(live, town, 10)).unwrap();
        book.reserve(&mut ledger, funds(done, town, 10)).unwrap();
        book.release(&mut ledger, 2, done, HoldKind::Funds);

        assert_eq!(book.compact(live), 0);
        assert_eq!(book.compact(done), 2);

        assert_eq!(book.journal().len(), 1);
        assert!(book.entries_for_contract(done).is_empty());
        assert_eq!(book.audit(), AuditResult::Balanced);
    }

    #[test]
    fn book_roundtrips_through_json() {
        let mut ledger = TownLedger::new();
        let mut book = EscrowBook::new();
        let town = AgentId::new();
        ledger.credit(town, &coin(), 500);
        book.reserve(&mut ledger, funds(ContractId::new(), town, 10)).unwrap();

        let json = serde_json::to_string(&book).unwrap();
        let restored: EscrowBook = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, book);
    }
}
