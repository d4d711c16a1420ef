use alloy::dyn_abi::DynSolValue;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::abi::{named_outputs, parse_function};
use crate::types::config::contract::ContractKind;
use crate::types::event::ContractCall;

use super::read_scalars;

const SUB_BALANCE_LIST: &str = "function subBalanceList(uint256) view returns (uint256 totalSharesOf, uint256 totalWithdrawAmount, uint256 payDayTime, uint256 requiredStakePeriod, bool minted)";

/// Yearly sub-balance pools. Slots that were never populated revert and are
/// left out of `subBalanceList`; each entry keeps its slot in `index`.
pub struct SubBalancesSnapshot;

#[async_trait]
impl SnapshotAssembler for SubBalancesSnapshot {
    fn name(&self) -> &'static str {
        "sub_balances"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::SubBalances
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let sub_balances = ctx.contract(ContractKind::SubBalances)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        read_scalars(
            ctx,
            &mut doc,
            sub_balances,
            &[
                ("startTimestamp", "function startTimestamp() view returns (uint256)"),
                ("basePeriod", "function basePeriod() view returns (uint256)"),
                (
                    "currentSharesTotalSupply",
                    "function currentSharesTotalSupply() view returns (uint256)",
                ),
            ],
        )
        .await?;

        let pool_count = ctx.settings().pool_count;
        let sub_balance_list = parse_function(SUB_BALANCE_LIST)?;
        let calls: Vec<ContractCall> = (0..pool_count)
            .map(|index| {
                ContractCall::new(
                    sub_balances,
                    &sub_balance_list,
                    vec![DynSolValue::Uint(U256::from(index), 256)],
                )
            })
            .collect();
        let outputs = ctx
            .read_batched_tolerant(&calls, "sub_balances subBalanceList")
            .await?;

        let entries: Vec<Value> = (0..pool_count)
            .zip(outputs)
            .filter_map(|(index, values)| {
                let values = values?;
                let mut entry = named_outputs(&sub_balance_list, &values);
                entry.insert("index".to_string(), Value::from(index));
                Some(Value::Object(entry))
            })
            .collect();
        tracing::info!(
            "sub_balances: {} of {} pools populated",
            entries.len(),
            pool_count
        );
        doc.insert("subBalanceList", entries);

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::primitives::Address;
    use serde_json::json;

    use super::*;
    use crate::testing::{context_for, fixed_settings, uint, MockLedger};
    use crate::types::config::contract::ContractAddresses;

    #[tokio::test]
    async fn test_unpopulated_slot_is_omitted() {
        let sub_balances = Address::repeat_byte(0x77);
        let ledger = Arc::new(MockLedger::new(20_000));
        ledger.set_uint(sub_balances, "startTimestamp", vec![], 1_600_000_000);
        ledger.set_uint(sub_balances, "basePeriod", vec![], 350);
        ledger.set_uint(sub_balances, "currentSharesTotalSupply", vec![], 9_000);
        for index in [0u64, 1, 3, 4] {
            ledger.set_call(
                sub_balances,
                "subBalanceList",
                vec![uint(index)],
                vec![
                    uint(100 * index),
                    uint(0),
                    uint(1_000 + index),
                    uint(350 * (index + 1)),
                    DynSolValue::Bool(false),
                ],
            );
        }

        let contracts = ContractAddresses {
            sub_balances: Some(sub_balances),
            ..ContractAddresses::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx =
            context_for(&ledger, fixed_settings(contracts, dir.path()), &SubBalancesSnapshot).await;

        let doc = SubBalancesSnapshot.generate(&ctx).await.unwrap();

        let list = doc.get("subBalanceList").unwrap().as_array().unwrap();
        assert_eq!(list.len(), 4);
        let indices: Vec<u64> = list.iter().map(|e| e["index"].as_u64().unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 3, 4]);
        assert_eq!(
            list[2],
            json!({
                "index": 3,
                "totalSharesOf": "300",
                "totalWithdrawAmount": "0",
                "payDayTime": "1003",
                "requiredStakePeriod": "1400",
                "minted": false,
            })
        );
        assert_eq!(doc.get("basePeriod"), Some(&json!("350")));
    }

    #[tokio::test]
    async fn test_scalar_failure_is_fatal() {
        let sub_balances = Address::repeat_byte(0x77);
        let ledger = Arc::new(MockLedger::new(20_000));
        ledger.set_uint(sub_balances, "startTimestamp", vec![], 1);

        let contracts = ContractAddresses {
            sub_balances: Some(sub_balances),
            ..ContractAddresses::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx =
            context_for(&ledger, fixed_settings(contracts, dir.path()), &SubBalancesSnapshot).await;

        assert!(SubBalancesSnapshot.generate(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_transient_slot_failure_is_fatal() {
        let sub_balances = Address::repeat_byte(0x77);
        let ledger = Arc::new(MockLedger::new(20_000).failing_transport_for("subBalanceList"));
        ledger.set_uint(sub_balances, "startTimestamp", vec![], 1);
        ledger.set_uint(sub_balances, "basePeriod", vec![], 350);
        ledger.set_uint(sub_balances, "currentSharesTotalSupply", vec![], 9_000);

        let contracts = ContractAddresses {
            sub_balances: Some(sub_balances),
            ..ContractAddresses::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx =
            context_for(&ledger, fixed_settings(contracts, dir.path()), &SubBalancesSnapshot).await;

        assert!(matches!(
            SubBalancesSnapshot.generate(&ctx).await,
            Err(SnapshotError::Rpc(_))
        ));
    }
}
