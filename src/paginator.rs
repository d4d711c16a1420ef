//! Block-range pagination of historical event scans.
//!
//! A scan window is resolved from a [`WindowStrategy`], cut into contiguous
//! pages by [`build_pages`], and each page becomes one `eth_getLogs` work item
//! for the batch scheduler. Page construction lives only here, so coverage
//! (no gaps, no overlap) is enforced in one place for both strategies.
//!
//! Known nondeterminism: a [`WindowStrategy::LatestRelative`] window queries
//! its final page up to the node's live `latest` tag, so two runs against a
//! moving chain can legitimately return different records. Only
//! [`WindowStrategy::FixedRange`] scans are reproducible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use alloy::rpc::types::{BlockId, BlockNumberOrTag};
use thiserror::Error;

use crate::rpc::{ProviderPool, RpcError};
use crate::scheduler::run_batched;
use crate::types::event::{EventQuery, EventRecord};

pub const DEFAULT_BLOCKS_PER_DAY: u64 = 6500;
pub const DEFAULT_PAGES_PER_DAY: u64 = 10;
pub const DEFAULT_BLOCKS_PER_PAGE: u64 = 500;

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("Invalid block range [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },

    #[error("Page size must be at least one block")]
    ZeroPageSize,

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Half-open interval `[start, end)` of block numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Result<Self, PaginationError> {
        if start > end {
            return Err(PaginationError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Highest block inside the range.
    pub fn last_block(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.end - 1)
    }
}

/// Splits `range` into `ceil(len / page_size)` contiguous pages; every page
/// but the last spans exactly `page_size` blocks and the last ends at `range.end`.
pub fn build_pages(range: BlockRange, page_size: u64) -> Result<Vec<BlockRange>, PaginationError> {
    if page_size == 0 {
        return Err(PaginationError::ZeroPageSize);
    }

    let page_count = range.len().div_ceil(page_size);
    Ok((0..page_count)
        .map(|k| {
            let start = range.start + page_size * k;
            let end = if k + 1 == page_count {
                range.end
            } else {
                start + page_size
            };
            BlockRange { start, end }
        })
        .collect())
}

/// How the scan window is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStrategy {
    /// The last `days` days up to the chain head, paged by day fractions.
    LatestRelative { days: u64 },
    /// An explicit `[from, to)` range, paged by a fixed block count.
    FixedRange { from: u64, to: u64 },
}

/// One unit of log querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub range: BlockRange,
    /// Queried up to the node's `latest` tag instead of `range.end - 1`.
    pub open_ended: bool,
}

impl Page {
    pub fn to_block(&self) -> BlockNumberOrTag {
        match (self.open_ended, self.range.last_block()) {
            (false, Some(last)) => BlockNumberOrTag::Number(last),
            _ => BlockNumberOrTag::Latest,
        }
    }
}

/// A window with its paging parameters fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub range: BlockRange,
    pub page_size: u64,
    /// The final page follows the live chain head.
    pub live_tail: bool,
}

impl ResolvedWindow {
    pub fn pages(&self) -> Result<Vec<Page>, PaginationError> {
        let pages = build_pages(self.range, self.page_size)?;
        let last = pages.len().saturating_sub(1);
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(k, range)| Page {
                range,
                open_ended: self.live_tail && k == last,
            })
            .collect())
    }

    /// Block that direct state reads are pinned to, so they describe the same
    /// point in time as the end of the scanned window.
    pub fn read_block(&self) -> BlockId {
        match (self.live_tail, self.range.last_block()) {
            (false, Some(last)) => BlockId::number(last),
            _ => BlockId::latest(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub blocks_per_day: u64,
    pub pages_per_day: u64,
    pub blocks_per_page: u64,
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            blocks_per_day: DEFAULT_BLOCKS_PER_DAY,
            pages_per_day: DEFAULT_PAGES_PER_DAY,
            blocks_per_page: DEFAULT_BLOCKS_PER_PAGE,
            batch_size: 50,
            inter_batch_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventPaginator {
    pool: Arc<ProviderPool>,
    settings: PaginationSettings,
}

impl EventPaginator {
    pub fn new(pool: Arc<ProviderPool>, settings: PaginationSettings) -> Self {
        Self { pool, settings }
    }

    pub fn settings(&self) -> &PaginationSettings {
        &self.settings
    }

    pub async fn resolve(&self, strategy: &WindowStrategy) -> Result<ResolvedWindow, PaginationError> {
        match *strategy {
            WindowStrategy::LatestRelative { days } => {
                if self.settings.pages_per_day == 0 {
                    return Err(PaginationError::ZeroPageSize);
                }
                let latest = self.pool.latest_block().await?;
                let span = self.settings.blocks_per_day.saturating_mul(days);
                // The open-ended last page also covers `latest` itself.
                let range = BlockRange::new(latest.saturating_sub(span), latest)?;
                let page_count = days.saturating_mul(self.settings.pages_per_day).max(1);
                let page_size = range.len().div_ceil(page_count).max(1);
                tracing::info!(
                    "Resolved {}-day window to blocks {}-latest (head {}, {} blocks per page)",
                    days,
                    range.start,
                    latest,
                    page_size
                );
                Ok(ResolvedWindow {
                    range,
                    page_size,
                    live_tail: true,
                })
            }
            WindowStrategy::FixedRange { from, to } => Ok(ResolvedWindow {
                range: BlockRange::new(from, to)?,
                page_size: self.settings.blocks_per_page,
                live_tail: false,
            }),
        }
    }

    /// Scans the last `days` days of the chain for `query`.
    pub async fn by_day_window(
        &self,
        query: &EventQuery,
        days: u64,
        with_timestamp: bool,
    ) -> Result<Vec<EventRecord>, PaginationError> {
        let window = self.resolve(&WindowStrategy::LatestRelative { days }).await?;
        self.fetch(query, &window, with_timestamp).await
    }

    /// Scans `[from, to)` for `query` in pages of `blocks_per_page` blocks.
    pub async fn by_explicit_range(
        &self,
        query: &EventQuery,
        from: u64,
        to: u64,
        with_timestamp: bool,
        blocks_per_page: u64,
    ) -> Result<Vec<EventRecord>, PaginationError> {
        let window = ResolvedWindow {
            range: BlockRange::new(from, to)?,
            page_size: blocks_per_page,
            live_tail: false,
        };
        self.fetch(query, &window, with_timestamp).await
    }

    /// Fetches every page of `window`, concatenated in page order.
    pub async fn fetch(
        &self,
        query: &EventQuery,
        window: &ResolvedWindow,
        with_timestamp: bool,
    ) -> Result<Vec<EventRecord>, PaginationError> {
        let pages = window.pages()?;
        let label = format!("{} logs", query.name());
        let pool = &self.pool;

        let items = pages.iter().map(|page| {
            let page = *page;
            move || async move { pool.query_logs(query, page.range.start, page.to_block()).await }
        });

        let per_page = run_batched(
            items,
            self.settings.batch_size,
            &label,
            self.settings.inter_batch_delay,
        )
        .await?;

        let mut records: Vec<EventRecord> = per_page.into_iter().flatten().collect();
        tracing::info!(
            "Fetched {} {} events from {} pages (blocks {}-{})",
            records.len(),
            query.name(),
            pages.len(),
            window.range.start,
            if window.live_tail {
                "latest".to_string()
            } else {
                window.range.end.saturating_sub(1).to_string()
            }
        );

        if with_timestamp {
            self.enrich_timestamps(&mut records, query.name()).await?;
        }

        Ok(records)
    }

    /// Attaches the containing block's timestamp to every record. Each
    /// distinct block is fetched once.
    async fn enrich_timestamps(
        &self,
        records: &mut [EventRecord],
        event_name: &str,
    ) -> Result<(), PaginationError> {
        let mut seen = HashSet::new();
        let hashes: Vec<B256> = records
            .iter()
            .map(|r| r.block_hash)
            .filter(|hash| seen.insert(*hash))
            .collect();

        let pool = &self.pool;
        let items = hashes.iter().map(|hash| {
            let hash = *hash;
            move || async move { pool.block_timestamp(hash).await }
        });

        let timestamps = run_batched(
            items,
            self.settings.batch_size,
            &format!("{} block timestamps", event_name),
            self.settings.inter_batch_delay,
        )
        .await?;

        let by_hash: HashMap<B256, u64> = hashes.into_iter().zip(timestamps).collect();
        for record in records.iter_mut() {
            record.timestamp = by_hash.get(&record.block_hash).copied();
        }

        Ok(())
    }
}
