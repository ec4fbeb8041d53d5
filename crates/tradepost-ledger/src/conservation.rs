//! Escrow conservation audit.
//!
//! Units enter escrow only through `Reserve` and leave only through
//! `Release` or `Settle`. For each resource R the journal therefore implies
//! how much of R should still be held:
//!
//! ```text
//! sum(Reserve R) - sum(Release R) - sum(Settle R) == held R
//! ```
//!
//! The book maintains this by construction. The audit replays the journal
//! so corruption or a faulty restore shows up as an [`EscrowAnomaly`]
//! instead of silently minting or burning currency.

use std::collections::{BTreeMap, BTreeSet};

use tradepost_types::ResourceId;

use crate::EscrowAnomaly;
use crate::escrow::{EscrowEntry, EscrowMovement};

/// The result of an escrow audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// Journal and holds agree for every resource.
    Balanced,
    /// One or more resources disagree.
    Anomaly(EscrowAnomaly),
}

impl AuditResult {
    /// Whether the audit passed.
    pub const fn is_balanced(&self) -> bool {
        matches!(self, Self::Balanced)
    }
}

/// Net quantity per resource implied by the journal.
pub fn journal_net(journal: &[EscrowEntry]) -> BTreeMap<ResourceId, i64> {
    let mut net: BTreeMap<ResourceId, i64> = BTreeMap::new();
    for entry in journal {
        let v = net.entry(entry.resource.clone()).or_insert(0);
        *v = match entry.movement {
            EscrowMovement::Reserve => v.saturating_add(entry.amount),
            EscrowMovement::Release | EscrowMovement::Settle => v.saturating_sub(entry.amount),
        };
    }
    net
}

/// Compare the journal against the live per-resource holds.
pub fn audit_journal(journal: &[EscrowEntry], held: &BTreeMap<ResourceId, i64>) -> AuditResult {
    let net = journal_net(journal);

    let resources: BTreeSet<&ResourceId> = net.keys().chain(held.keys()).collect();
    let mut imbalances = BTreeMap::new();

    for resource in resources {
        let expected = net.get(resource).copied().unwrap_or(0);
        let actual = held.get(resource).copied().unwrap_or(0);
        if expected != actual {
            imbalances.insert(resource.clone(), (expected, actual));
        }
    }

    if imbalances.is_empty() {
        return AuditResult::Balanced;
    }

    let detail: Vec<String> = imbalances
        .iter()
        .map(|(res, (expected, actual))| format!("{res}: journal {expected}, held {actual}"))
        .collect();

    AuditResult::Anomaly(EscrowAnomaly {
        message: format!("ESCROW_ANOMALY: {}", detail.join("; ")),
        imbalances,
    })
}
