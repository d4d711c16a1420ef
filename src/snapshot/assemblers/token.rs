use async_trait::async_trait;
use serde_json::Value;

use crate::snapshot::context::SnapshotContext;
use crate::snapshot::document::SnapshotDocument;
use crate::snapshot::error::SnapshotError;
use crate::snapshot::traits::SnapshotAssembler;
use crate::types::config::contract::ContractKind;
use crate::types::event::EventQuery;

use super::{addresses_in, balances_of, read_scalars, BALANCE_OF};

const TRANSFER: &str = "event Transfer(address indexed from, address indexed to, uint256 value)";

/// Holder balances of the main token. The token has no holder index, so
/// holders are recovered from both sides of every `Transfer` in the window.
pub struct TokenSnapshot;

#[async_trait]
impl SnapshotAssembler for TokenSnapshot {
    fn name(&self) -> &'static str {
        "token"
    }

    fn contract(&self) -> ContractKind {
        ContractKind::Token
    }

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError> {
        let token = ctx.contract(ContractKind::Token)?;
        let mut doc = SnapshotDocument::new(self.name(), self.version());

        read_scalars(
            ctx,
            &mut doc,
            token,
            &[("totalSupply", "function totalSupply() view returns (uint256)")],
        )
        .await?;

        let transfers = ctx.events(&EventQuery::parse(token, TRANSFER)?, false).await?;
        let mut holders = addresses_in(&transfers, "to")?;
        holders.extend(addresses_in(&transfers, "from")?);
        tracing::info!(
            "token: {} distinct holders in {} transfers",
            holders.len(),
            transfers.len()
        );

        let balances = balances_of(ctx, token, BALANCE_OF, &holders).await?;
        doc.insert("balanceOf", Value::Object(balances));

        Ok(doc)
    }
}
