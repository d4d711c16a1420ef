use std::collections::{BTreeMap, BTreeSet};

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::abi::{format_address, named_outputs, parse_function};
use crate::types::config::contract::ContractKind;
use crate::types::event::{ContractCall, EventQuery, EventRecord};

use super::{read_scalars, token_balance_of, uint_arg};

const MAKE_PAYOUT: &str = "event MakePayout(uint256 indexed value, uint256 indexed sharesTotalSupply, uint256 indexed time)";
const STAKE: &str = "event Stake(address indexed account, uint256 indexed sessionId, uint256 amount, uint256 start, uint256 end, uint256 shares)";
const SESSION_DATA_OF: &str = "function sessionDataOf(address account, uint256 sessionId) view returns (uint256 amount, uint256 shares, uint256 start, uint256 end, uint256 firstPayout, bool withdrawn)";

/// Staking globals, the payout history, and every stake session opened in the window.
pub struct StakingSnapshot;

impl StakingSnapshot {
    /// Payouts in emission order. Replay applies them positionally.
    fn payouts(records: &[EventRecord]) -> Result<Vec<Value>, SnapshotError> {
        records
            .iter()
            .map(|record| -> Result<Value, SnapshotError> {
                let mut payout = Map::new();
                payout.insert("payout".into(), uint_arg(record, "value")?.to_string().into());
                payout.insert(
                    "sharesTotalSupply".into(),
                    uint_arg(record, "sharesTotalSupply")?.to_string().into(),
                );
                payout.insert("time".into(), uint_arg(record, "time")?.to_string().into());
                payout.insert(
                    "blockTimestamp".into(),
                    record.timestamp.map(Value::from).unwrap_or(Value::Null),
                );
                Ok(Value::Object(payout))
            })
            .collect()
    }

    async fn sessions(
        ctx: &SnapshotContext,
        staking: Address,
        stakes: &[EventRecord],
    ) -> Result<Value, SnapshotError> {
        let mut sessions = BTreeSet::new();
        for record in stakes {
            let account = record
                .address_arg("account")
                .ok_or_else(|| SnapshotError::MissingField("Stake.account".to_string()))?;
            sessions.insert((account, uint_arg(record, "sessionId")?));
        }

        let session_data_of = parse_function(SESSION_DATA_OF)?;
        let calls: Vec<ContractCall> = sessions
            .iter()
            .map(|(account, session_id)| {
                ContractCall::new(
                    staking,
                    &session_data_of,
                    vec![
                        DynSolValue::Address(*account),
                        DynSolValue::Uint(*session_id, 256),
                    ],
                )
            })
            .collect();
        let outputs = ctx.read_batched(&calls, "staking sessionDataOf").await?;

        let mut by_account: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for ((account, session_id), values) in sessions.iter().zip(outputs) {
            by_account.entry(format_address(*account)).or_default().insert(
                session_id.to_string(),
                Value::Object(named_outputs(&session_data_of, &values)),
            );
        }

        tracing::info!(
            "staking: {} sessions across {} accounts",
            sessions.len(),
            by_account.len()
        );
        Ok(Value::Object(
            by_account
                .into_iter()
                .map(|(account, sessions)| (account, Value::Object(sessions)))
                .collect(),
        ))
    }
}

#[async_trait]
impl SnapshotAssembler for StakingSnapshot {
    fn name(&self) -> &'static str {
        "staking"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::Staking
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let staking = ctx.contract(ContractKind::Staking)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        read_scalars(
            ctx,
            &mut doc,
            staking,
            &[
                ("shareRate", "function shareRate() view returns (uint256)"),
                ("sharesTotalSupply", "function sharesTotalSupply() view returns (uint256)"),
                ("nextPayoutCall", "function nextPayoutCall() view returns (uint256)"),
                ("startContract", "function startContract() view returns (uint256)"),
                ("globalPayout", "function globalPayout() view returns (uint256)"),
                ("globalPayin", "function globalPayin() view returns (uint256)"),
                ("lastSessionId", "function lastSessionId() view returns (uint256)"),
            ],
        )
        .await?;
        doc.insert("balanceOf", token_balance_of(ctx, staking).await?);

        let payouts = ctx
            .events(&EventQuery::parse(staking, MAKE_PAYOUT)?, true)
            .await?;
        doc.insert("payouts", Self::payouts(&payouts)?);

        let stakes = ctx.events(&EventQuery::parse(staking, STAKE)?, false).await?;
        doc.insert("sessionDataOf", Self::sessions(ctx, staking, &stakes).await?);

        Ok(doc)
    }
}
