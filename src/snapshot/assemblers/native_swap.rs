use async_trait::async_trait;
use serde_json::Value;

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::config::contract::ContractKind;
use crate::types::event::EventQuery;

use super::{addresses_in, balances_of, read_scalars};

const TOKENS_DEPOSITED: &str = "event TokensDeposited(address indexed account, uint256 amount)";
const SWAP_TOKEN_BALANCE_OF: &str =
    "function swapTokenBalanceOf(address account) view returns (uint256)";

pub struct NativeSwapSnapshot;

#[async_trait]
impl SnapshotAssembler for NativeSwapSnapshot {
    fn name(&self) -> &'static str {
        "native_swap"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::NativeSwap
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let swap = ctx.contract(ContractKind::NativeSwap)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        read_scalars(
            ctx,
            &mut doc,
            swap,
            &[
                ("start", "function start() view returns (uint256)"),
                ("period", "function period() view returns (uint256)"),
                ("stepTimestamp", "function stepTimestamp() view returns (uint256)"),
                ("swapToken", "function swapToken() view returns (address)"),
            ],
        )
        .await?;

        let deposits = ctx
            .events(&EventQuery::parse(swap, TOKENS_DEPOSITED)?, false)
            .await?;
        let depositors = addresses_in(&deposits, "account")?;
        let balances = balances_of(ctx, swap, SWAP_TOKEN_BALANCE_OF, &depositors).await?;
        doc.insert("swapTokenBalanceOf", Value::Object(balances));

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::Address;
    use serde_json::json;

    use super::*;
    use crate::testing::{context_for, fixed_settings, hex_address, record, uint, MockLedger};
    use crate::types::config::contract::ContractAddresses;

    #[tokio::test]
    async fn test_scalars_and_depositor_balances() {
        let swap = Address::repeat_byte(0x74);
        let swap_token = Address::repeat_byte(0x75);
        let depositor = Address::repeat_byte(0x0a);
        let ledger = Arc::new(MockLedger::new(20_000));

        ledger.set_uint(swap, "start", vec![], 1_000);
        ledger.set_uint(swap, "period", vec![], 350);
        ledger.set_uint(swap, "stepTimestamp", vec![], 86_400);
        ledger.set_call(swap, "swapToken", vec![], vec![DynSolValue::Address(swap_token)]);
        ledger.push_log(record(
            "TokensDeposited",
            swap,
            500,
            vec![("account", DynSolValue::Address(depositor)), ("amount", uint(77))],
        ));
        ledger.set_uint(
            swap,
            "swapTokenBalanceOf",
            vec![DynSolValue::Address(depositor)],
            77,
        );

        let contracts = ContractAddresses {
            native_swap: Some(swap),
            ..ContractAddresses::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx =
            context_for(&ledger, fixed_settings(contracts, dir.path()), &NativeSwapSnapshot).await;

        let doc = NativeSwapSnapshot.generate(&ctx).await.unwrap();

        assert_eq!(doc.get("period"), Some(&json!("350")));
        assert_eq!(doc.get("swapToken"), Some(&json!(hex_address(swap_token))));
        let balances = doc.get("swapTokenBalanceOf").unwrap().as_object().unwrap();
        assert_eq!(balances[hex_address(depositor).as_str()], "77");
    }
}
