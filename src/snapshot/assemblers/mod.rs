//! One assembler per tracked contract, plus the read helpers they share.

mod auction;
mod bpd;
mod foreign_swap;
mod native_swap;
mod staking;
mod sub_balances;
mod token;

pub use auction::AuctionSnapshot;
pub use bpd::BpdSnapshot;
pub use foreign_swap::ForeignSwapSnapshot;
pub use native_swap::NativeSwapSnapshot;
pub use staking::StakingSnapshot;
pub use sub_balances::SubBalancesSnapshot;
pub use token::TokenSnapshot;

use std::collections::BTreeSet;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use serde_json::{Map, Value};

use crate::types::abi::{format_address, parse_function, to_json};
use crate::types::config::contract::ContractKind;
use crate::types::event::{ContractCall, EventRecord};

use super::context::SnapshotContext;
use super::document::SnapshotDocument;
use super::error::SnapshotError;

pub(crate) const BALANCE_OF: &str = "function balanceOf(address account) view returns (uint256)";

/// Reads each zero-argument getter on `address` and stores its first output
/// under the paired field name.
pub(crate) async fn read_scalars(
    ctx: &SnapshotContext,
    doc: &mut SnapshotDocument,
    address: Address,
    getters: &[(&str, &str)],
) -> Result<(), SnapshotError> {
    let calls = getters
        .iter()
        .map(|(_, signature)| ContractCall::parse(address, signature, vec![]))
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = ctx
        .read_batched(&calls, &format!("{} scalars", doc.name()))
        .await?;

    for ((field, _), values) in getters.iter().zip(outputs) {
        doc.insert(field, to_json(first_output(&values, field)?));
    }
    Ok(())
}

/// Token balance held by one of the tracked contracts.
pub(crate) async fn token_balance_of(
    ctx: &SnapshotContext,
    holder: Address,
) -> Result<Value, SnapshotError> {
    let token = ctx.contract(ContractKind::Token)?;
    let call = ContractCall::parse(token, BALANCE_OF, vec![DynSolValue::Address(holder)])?;
    let values = ctx.read(&call).await?;
    Ok(to_json(first_output(&values, "balanceOf")?))
}

/// Reads `signature(holder)` on `contract` for every holder and keeps the
/// non-zero amounts, keyed by lowercase address.
pub(crate) async fn balances_of(
    ctx: &SnapshotContext,
    contract: Address,
    signature: &str,
    holders: &BTreeSet<Address>,
) -> Result<Map<String, Value>, SnapshotError> {
    let function = parse_function(signature)?;
    let calls: Vec<ContractCall> = holders
        .iter()
        .map(|holder| ContractCall::new(contract, &function, vec![DynSolValue::Address(*holder)]))
        .collect();
    let outputs = ctx
        .read_batched(&calls, &format!("{} reads", function.name))
        .await?;

    let mut balances = Map::new();
    for (holder, values) in holders.iter().zip(outputs) {
        let amount = first_uint(&values, &function.name)?;
        if !amount.is_zero() {
            balances.insert(format_address(*holder), Value::String(amount.to_string()));
        }
    }

    tracing::info!(
        "{}: {} of {} addresses hold a non-zero amount",
        function.name,
        balances.len(),
        holders.len()
    );
    Ok(balances)
}

/// Distinct non-zero addresses found in the `arg` argument of `records`.
pub(crate) fn addresses_in(
    records: &[EventRecord],
    arg: &str,
) -> Result<BTreeSet<Address>, SnapshotError> {
    let mut addresses = BTreeSet::new();
    for record in records {
        let address = record
            .address_arg(arg)
            .ok_or_else(|| SnapshotError::MissingField(format!("{}.{}", record.event, arg)))?;
        if !address.is_zero() {
            addresses.insert(address);
        }
    }
    Ok(addresses)
}

pub(crate) fn first_output<'a>(
    values: &'a [DynSolValue],
    what: &str,
) -> Result<&'a DynSolValue, SnapshotError> {
    values
        .first()
        .ok_or_else(|| SnapshotError::MissingField(format!("{}: empty output", what)))
}

pub(crate) fn first_uint(values: &[DynSolValue], what: &str) -> Result<U256, SnapshotError> {
    first_output(values, what)?
        .as_uint()
        .map(|(value, _)| value)
        .ok_or_else(|| SnapshotError::TypeConversion(format!("{}: expected uint", what)))
}

pub(crate) fn uint_arg(record: &EventRecord, arg: &str) -> Result<U256, SnapshotError> {
    record
        .uint_arg(arg)
        .ok_or_else(|| SnapshotError::MissingField(format!("{}.{}", record.event, arg)))
}

pub(crate) fn to_u64(value: U256, what: &str) -> Result<u64, SnapshotError> {
    u64::try_from(value)
        .map_err(|_| SnapshotError::TypeConversion(format!("{}: {} does not fit in u64", what, value)))
}
