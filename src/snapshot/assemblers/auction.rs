use alloy::dyn_abi::DynSolValue;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::abi::{named_outputs, parse_function};
use crate::types::config::contract::ContractKind;
use crate::types::event::ContractCall;

use super::{first_uint, read_scalars, to_u64, token_balance_of};

const RESERVES_OF: &str = "function reservesOf(uint256 sessionId) view returns (uint256 eth, uint256 token, uint256 lastPrice, uint256 middlePrice)";

/// Auction start, per-session reserves, and the auction's token holdings.
pub struct AuctionSnapshot;

#[async_trait]
impl SnapshotAssembler for AuctionSnapshot {
    fn name(&self) -> &'static str {
        "auction"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::Auction
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let auction = ctx.contract(ContractKind::Auction)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        read_scalars(ctx, &mut doc, auction, &[("start", "function start() view returns (uint256)")])
            .await?;

        let last_event = ContractCall::parse(
            auction,
            "function lastAuctionEventId() view returns (uint256)",
            vec![],
        )?;
        let last_event_id = first_uint(&ctx.read(&last_event).await?, "lastAuctionEventId")?;
        doc.insert("lastEventId", Value::String(last_event_id.to_string()));
        doc.insert("balanceOf", token_balance_of(ctx, auction).await?);

        // Sessions without a recorded auction revert and are skipped.
        let last = to_u64(last_event_id, "lastAuctionEventId")?;
        let reserves_of = parse_function(RESERVES_OF)?;
        let calls: Vec<ContractCall> = (0..=last)
            .map(|session| {
                ContractCall::new(
                    auction,
                    &reserves_of,
                    vec![DynSolValue::Uint(U256::from(session), 256)],
                )
            })
            .collect();
        let outputs = ctx
            .read_batched_tolerant(&calls, "auction reservesOf")
            .await?;

        let mut reserves = Map::new();
        for (session, values) in (0..=last).zip(outputs) {
            if let Some(values) = values {
                reserves.insert(
                    session.to_string(),
                    Value::Object(named_outputs(&reserves_of, &values)),
                );
            }
        }
        tracing::info!(
            "auction: reserves for {} of {} sessions",
            reserves.len(),
            last + 1
        );
        doc.insert("reservesOf", Value::Object(reserves));

        Ok(doc)
    }
}
