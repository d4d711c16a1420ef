//! The trait every per-contract snapshot implements.

use async_trait::async_trait;

use crate::types::config::contract::ContractKind;

use super::context::SnapshotContext;
use super::document::SnapshotDocument;
use super::error::SnapshotError;

/// Builds one snapshot document from chain history and current state.
///
/// An assembler reads its contract addresses from the context at call time
/// and either returns a complete document or fails. It never writes files;
/// the runner persists the returned document.
#[async_trait]
pub trait SnapshotAssembler: Send + Sync + 'static {
    /// Unique name, also the stem of the output file.
    fn name(&self) -> &'static str;

    /// Bump when the document layout changes; the output file name changes with it.
    fn version(&self) -> u32 {
        1
    }

    /// Computed identity key: `"{name}_v{version}"`.
    fn snapshot_key(&self) -> String {
        format!("{}_v{}", self.name(), self.version())
    }

    /// The contract whose configured address enables this snapshot.
    fn contract(&self) -> ContractKind;

    async fn generate(&self, ctx: &SnapshotContext) -> Result<SnapshotDocument, SnapshotError>;
}
