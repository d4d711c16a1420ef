use async_trait::async_trait;
use serde_json::Value;

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::config::contract::ContractKind;
use crate::types::event::EventQuery;

use super::{addresses_in, balances_of, read_scalars, token_balance_of};

const TOKENS_CLAIMED: &str = "event TokensClaimed(address indexed account, uint256 indexed stepsFromStart, uint256 userAmount, uint256 penaltyAmount)";
const CLAIMED_BALANCE_OF: &str =
    "function claimedBalanceOf(address account) view returns (uint256)";

pub struct ForeignSwapSnapshot;

#[async_trait]
impl SnapshotAssembler for ForeignSwapSnapshot {
    fn name(&self) -> &'static str {
        "foreign_swap"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::ForeignSwap
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let swap = ctx.contract(ContractKind::ForeignSwap)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        read_scalars(
            ctx,
            &mut doc,
            swap,
            &[
                ("start", "function start() view returns (uint256)"),
                ("stepTimestamp", "function stepTimestamp() view returns (uint256)"),
                ("maxClaimAmount", "function maxClaimAmount() view returns (uint256)"),
                ("totalSnapshotAmount", "function totalSnapshotAmount() view returns (uint256)"),
                ("totalSnapshotAddresses", "function totalSnapshotAddresses() view returns (uint256)"),
            ],
        )
        .await?;
        doc.insert("balanceOf", token_balance_of(ctx, swap).await?);

        let claims = ctx
            .events(&EventQuery::parse(swap, TOKENS_CLAIMED)?, false)
            .await?;
        let claimers = addresses_in(&claims, "account")?;
        let claimed = balances_of(ctx, swap, CLAIMED_BALANCE_OF, &claimers).await?;
        doc.insert("claimedBalanceOf", Value::Object(claimed));

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
    async fn test_claimed_balances_from_claim_events() {
        let token = Address::repeat_byte(0x70);
        let swap = Address::repeat_byte(0x73);
        let (alice, bob) = (Address::repeat_byte(0x0a), Address::repeat_byte(0x0b));
        let ledger = Arc::new(MockLedger::new(20_000));

        for (field, value) in [
            ("start", 1_000),
            ("stepTimestamp", 86_400),
            ("maxClaimAmount", 5_000),
            ("totalSnapshotAmount", 90_000),
            ("totalSnapshotAddresses", 12),
        ] {
            ledger.set_uint(swap, field, vec![], value);
        }
        ledger.set_uint(token, "balanceOf", vec![DynSolValue::Address(swap)], 42);

        for (account, block) in [(alice, 100), (bob, 200), (alice, 300)] {
            ledger.push_log(record(
                "TokensClaimed",
                swap,
                block,
                vec![
                    ("account", DynSolValue::Address(account)),
                    ("stepsFromStart", uint(1)),
                    ("userAmount", uint(10)),
                    ("penaltyAmount", uint(0)),
                ],
            ));
        }
        ledger.set_uint(swap, "claimedBalanceOf", vec![DynSolValue::Address(alice)], 20);
        ledger.set_uint(swap, "claimedBalanceOf", vec![DynSolValue::Address(bob)], 0);

        let contracts = ContractAddresses {
            token: Some(token),
            foreign_swap: Some(swap),
            ..ContractAddresses::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx =
            context_for(&ledger, fixed_settings(contracts, dir.path()), &ForeignSwapSnapshot).await;

        let doc = ForeignSwapSnapshot.generate(&ctx).await.unwrap();

        assert_eq!(doc.get("stepTimestamp"), Some(&json!("86400")));
        assert_eq!(doc.get("totalSnapshotAddresses"), Some(&json!("12")));
        assert_eq!(doc.get("balanceOf"), Some(&json!("42")));

        let claimed = doc.get("claimedBalanceOf").unwrap().as_object().unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[hex_address(alice).as_str()], "20");
    }
}
