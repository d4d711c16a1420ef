//! Per-run context handed to snapshot assemblers.
//!
//! A context is resolved once per snapshot: the scan window is fixed before
//! the assembler starts, and every state read goes to the block at the end of
//! that window, so events and reads describe the same chain state.

use std::path::PathBuf;
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use tokio::sync::Mutex;

use crate::paginator::{EventPaginator, PaginationSettings, ResolvedWindow, WindowStrategy};
use crate::rpc::ProviderPool;
use crate::scheduler::{run_batched, tolerant};
use crate::types::config::contract::{ContractAddresses, ContractKind};
use crate::types::event::{ContractCall, EventQuery, EventRecord};

use super::archive::{self, ArchivedEvents};
use super::error::SnapshotError;

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub output_dir: PathBuf,
    pub window: WindowStrategy,
    pub pagination: PaginationSettings,
    pub contracts: ContractAddresses,
    /// Number of yearly pools held by the bpd and sub-balances contracts.
    pub pool_count: u64,
    pub archive_raw_events: bool,
}

pub struct SnapshotContext {
    pool: Arc<ProviderPool>,
    paginator: EventPaginator,
    window: ResolvedWindow,
    settings: Arc<SnapshotSettings>,
    snapshot_key: String,
    archived: Mutex<Vec<ArchivedEvents>>,
}

impl SnapshotContext {
    pub async fn prepare(
        pool: Arc<ProviderPool>,
        settings: Arc<SnapshotSettings>,
        snapshot_key: String,
    ) -> Result<Self, SnapshotError> {
        let paginator = EventPaginator::new(pool.clone(), settings.pagination.clone());
        let window = paginator.resolve(&settings.window).await?;
        Ok(Self {
            pool,
            paginator,
            window,
            settings,
            snapshot_key,
            archived: Mutex::new(Vec::new()),
        })
    }

    pub fn window(&self) -> &ResolvedWindow {
        &self.window
    }

    pub fn settings(&self) -> &SnapshotSettings {
        &self.settings
    }

    pub fn contract(&self, kind: ContractKind) -> Result<Address, SnapshotError> {
        self.settings
            .contracts
            .get(kind)
            .ok_or(SnapshotError::MissingContract(kind.name()))
    }

    /// One state read, pinned to the window's read block.
    pub async fn read(&self, call: &ContractCall) -> Result<Vec<DynSolValue>, SnapshotError> {
        Ok(self.pool.call(call, self.window.read_block()).await?)
    }

    /// Reads every call through the scheduler. Any failure fails the whole set.
    pub async fn read_batched(
        &self,
        calls: &[ContractCall],
        label: &str,
    ) -> Result<Vec<Vec<DynSolValue>>, SnapshotError> {
        let pool = &self.pool;
        let block = self.window.read_block();
        let items = calls
            .iter()
            .map(|call| move || async move { pool.call(call, block).await });

        let pagination = &self.settings.pagination;
        Ok(run_batched(items, pagination.batch_size, label, pagination.inter_batch_delay).await?)
    }

    /// Like [`read_batched`](Self::read_batched), but a reverted read yields
    /// `None` in its slot. Transient failures still fail the set.
    pub async fn read_batched_tolerant(
        &self,
        calls: &[ContractCall],
        label: &str,
    ) -> Result<Vec<Option<Vec<DynSolValue>>>, SnapshotError> {
        let pool = &self.pool;
        let block = self.window.read_block();
        let items = calls.iter().map(|call| {
            move || async move {
                let what = call.describe();
                tolerant(&what, pool.call(call, block)).await
            }
        });

        let pagination = &self.settings.pagination;
        Ok(run_batched(items, pagination.batch_size, label, pagination.inter_batch_delay).await?)
    }

    /// Every emission of `query` within the window, in chain order. With the
    /// raw archive enabled the records are also kept for [`write_archive`](Self::write_archive).
    pub async fn events(
        &self,
        query: &EventQuery,
        with_timestamp: bool,
    ) -> Result<Vec<EventRecord>, SnapshotError> {
        let records = self
            .paginator
            .fetch(query, &self.window, with_timestamp)
            .await?;

        if self.settings.archive_raw_events {
            self.archived.lock().await.push(ArchivedEvents {
                event: query.name().to_string(),
                records: records.clone(),
            });
        }

        Ok(records)
    }

    /// Writes the event sets collected so far to the raw archive.
    pub async fn write_archive(&self) -> Result<Vec<PathBuf>, SnapshotError> {
        let sets = std::mem::take(&mut *self.archived.lock().await);
        archive::write_archive(
            &self.settings.output_dir,
            &self.snapshot_key,
            &self.window,
            &sets,
        )
    }
}
