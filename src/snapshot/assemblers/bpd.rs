use alloy::dyn_abi::DynSolValue;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::abi::{parse_function, to_json};
use crate::types::config::contract::ContractKind;
use crate::types::event::ContractCall;

use super::{first_output, token_balance_of};

const POOL_YEAR_AMOUNTS: &str = "function poolYearAmounts(uint256) view returns (uint256)";
const POOL_TRANSFERRED: &str = "function poolTransferred(uint256) view returns (bool)";

/// Big-pay-day pools. Every pool slot exists, so both arrays are read strictly.
pub struct BpdSnapshot;

impl BpdSnapshot {
    async fn read_pools(
        &self,
        ctx: &SnapshotContext,
        signature: &str,
    ) -> Result<Vec<Value>, SnapshotError> {
        let bpd = ctx.contract(ContractKind::Bpd)?;
        let function = parse_function(signature)?;
        let calls: Vec<ContractCall> = (0..ctx.settings().pool_count)
            .map(|i| ContractCall::new(bpd, &function, vec![DynSolValue::Uint(U256::from(i), 256)]))
            .collect();

        let outputs = ctx
            .read_batched(&calls, &format!("bpd {}", function.name))
            .await?;
        let pools = outputs
            .iter()
            .map(|values| first_output(values, &function.name).map(to_json))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pools)
    }
}

#[async_trait]
impl SnapshotAssembler for BpdSnapshot {
    fn name(&self) -> &'static str {
        "bpd"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::Bpd
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let bpd = ctx.contract(ContractKind::Bpd)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        doc.insert("poolYearAmounts", self.read_pools(ctx, POOL_YEAR_AMOUNTS).await?);
        doc.insert("poolTransferred", self.read_pools(ctx, POOL_TRANSFERRED).await?);
        doc.insert("balanceOf", token_balance_of(ctx, bpd).await?);

        Ok(doc)
    }
}
