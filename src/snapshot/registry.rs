//! Assembler registration.

use crate::types::config::contract::ContractAddresses;

use super::assemblers::{
    AuctionSnapshot, BpdSnapshot, ForeignSwapSnapshot, NativeSwapSnapshot, StakingSnapshot,
    SubBalancesSnapshot, TokenSnapshot,
};
use super::traits::SnapshotAssembler;

pub fn all_assemblers() -> Vec<Box<dyn SnapshotAssembler>> {
    vec![
        Box::new(AuctionSnapshot),
        Box::new(BpdSnapshot),
        Box::new(ForeignSwapSnapshot),
        Box::new(NativeSwapSnapshot),
        Box::new(StakingSnapshot),
        Box::new(SubBalancesSnapshot),
        Box::new(TokenSnapshot),
    ]
}

/// Assemblers whose contract has a configured address.
pub fn build_registry(contracts: &ContractAddresses) -> Vec<Box<dyn SnapshotAssembler>> {
    let (enabled, skipped): (Vec<_>, Vec<_>) = all_assemblers()
        .into_iter()
        .partition(|a| contracts.get(a.contract()).is_some());

    for assembler in &skipped {
        tracing::debug!(
            "Skipping {} snapshot: no {} address configured",
            assembler.name(),
            assembler.contract().name()
        );
    }
    tracing::info!(
        "Built snapshot registry with {} assemblers ({} skipped)",
        enabled.len(),
        skipped.len()
    );

    enabled
}
