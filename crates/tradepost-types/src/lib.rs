//! Shared type definitions for the Tradepost contract economy.
//!
//! This crate holds the identifiers and outcome enums that flow between the
//! ledger, the contract board, the town AI, and any observer frontend.
//! Types here are exported to `TypeScript` via `ts-rs`.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers and the string [`ResourceId`]
//! - [`enums`] -- Contract kinds, lifecycle status, bid and claim outcomes

pub mod enums;
pub mod ids;

pub use enums::{BidRejection, BidResult, ClaimResult, ContractKind, ContractStatus};
pub use ids::{AgentId, ContractId, PlayerId, ResourceId};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::AgentId::export_all();
        let _ = crate::ids::PlayerId::export_all();
        let _ = crate::ids::ContractId::export_all();
        let _ = crate::ids::ResourceId::export_all();

        let _ = crate::enums::ContractKind::export_all();
        let _ = crate::enums::ContractStatus::export_all();
        let _ = crate::enums::BidRejection::export_all();
        let _ = crate::enums::BidResult::export_all();
        let _ = crate::enums::ClaimResult::export_all();
    }
}
