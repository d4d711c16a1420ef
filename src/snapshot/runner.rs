//! Runs assemblers one after another and persists their documents.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::rpc::ProviderPool;

use super::context::{SnapshotContext, SnapshotSettings};
use super::document::write_snapshot;
use super::error::SnapshotError;
use super::traits::SnapshotAssembler;

#[derive(Debug, Default)]
pub struct RunReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, SnapshotError)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SnapshotRunner {
    pool: Arc<ProviderPool>,
    settings: Arc<SnapshotSettings>,
}

impl SnapshotRunner {
    pub fn new(pool: Arc<ProviderPool>, settings: Arc<SnapshotSettings>) -> Self {
        Self { pool, settings }
    }

    /// Generates and writes one snapshot. Nothing is written unless the
    /// assembler produced a complete document; its raw archive goes first and
    /// the document last.
    pub async fn run_one(&self, assembler: &dyn SnapshotAssembler) -> Result<PathBuf, SnapshotError> {
        let started = Instant::now();
        let key = assembler.snapshot_key();

        let ctx =
            SnapshotContext::prepare(self.pool.clone(), self.settings.clone(), key.clone()).await?;
        let document = assembler.generate(&ctx).await?;

        let archived = ctx.write_archive().await?;
        let path = match write_snapshot(&self.settings.output_dir, &document) {
            Ok(path) => path,
            Err(e) => {
                for file in &archived {
                    let _ = fs::remove_file(file);
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Snapshot {} done in {:.1}s ({} event sets archived)",
            key,
            started.elapsed().as_secs_f64(),
            archived.len()
        );
        Ok(path)
    }

    /// Runs every assembler in order. A failed snapshot is recorded and the
    /// remaining ones still run.
    pub async fn run(&self, assemblers: &[Box<dyn SnapshotAssembler>]) -> RunReport {
        let mut report = RunReport::default();

        for assembler in assemblers {
            tracing::info!("Generating {} snapshot", assembler.snapshot_key());
            match self.run_one(assembler.as_ref()).await {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    tracing::error!("Snapshot {} failed: {}", assembler.snapshot_key(), e);
                    report.failed.push((assembler.snapshot_key(), e));
                }
            }
        }

        tracing::info!(
            "Snapshot run complete: {} written, {} failed",
            report.written.len(),
            report.failed.len()
        );
        report
    }
}
