//! In-memory ledger used by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, BlockNumber, B256, U256};
use alloy::rpc::types::{BlockId, BlockNumberOrTag};
use async_trait::async_trait;

use crate::paginator::{PaginationSettings, WindowStrategy};
use crate::rpc::{LedgerReader, ProviderPool, RpcError};
use crate::snapshot::{SnapshotAssembler, SnapshotContext, SnapshotSettings};
use crate::types::config::contract::ContractAddresses;
use crate::types::event::{ContractCall, EventQuery, EventRecord};

pub const TRANSFER: &str =
    "event Transfer(address indexed from, address indexed to, uint256 value)";

pub struct MockLedger {
    head: u64,
    logs: Mutex<Vec<EventRecord>>,
    calls: Mutex<HashMap<String, Vec<DynSolValue>>>,
    broken_transport: bool,
    flaky_function: Option<String>,
    failing_logs_from: Option<u64>,
    requests: AtomicUsize,
    timestamp_lookups: AtomicUsize,
    log_queries: Mutex<Vec<(u64, BlockNumberOrTag)>>,
    call_blocks: Mutex<Vec<BlockId>>,
}

impl MockLedger {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            logs: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
            broken_transport: false,
            flaky_function: None,
            failing_logs_from: None,
            requests: AtomicUsize::new(0),
            timestamp_lookups: AtomicUsize::new(0),
            log_queries: Mutex::new(Vec::new()),
            call_blocks: Mutex::new(Vec::new()),
        }
    }

    /// Every request fails with a retryable transport error.
    pub fn failing_transport(mut self) -> Self {
        self.broken_transport = true;
        self
    }

    /// Calls of `function` fail with a retryable transport error.
    pub fn failing_transport_for(mut self, function: &str) -> Self {
        self.flaky_function = Some(function.to_string());
        self
    }

    /// Log queries for pages starting at or after `block` fail.
    pub fn failing_logs_from(mut self, block: u64) -> Self {
        self.failing_logs_from = Some(block);
        self
    }

    pub fn block_hash_of(block: u64) -> B256 {
        B256::left_padding_from(&block.to_be_bytes())
    }

    pub fn timestamp_of(block: u64) -> u64 {
        1_600_000_000 + block * 13
    }

    /// Appends a log, keeping (block, log index) order.
    pub fn push_log(&self, mut record: EventRecord) {
        let mut logs = self.logs.lock().unwrap();
        record.log_index = logs
            .iter()
            .filter(|r| r.block_number == record.block_number)
            .count() as u64;
        logs.push(record);
        logs.sort_by_key(|r| (r.block_number, r.log_index));
    }

    /// Registers the outputs of `function(args)` on `address`. Unregistered calls revert.
    pub fn set_call(
        &self,
        address: Address,
        function: &str,
        args: Vec<DynSolValue>,
        outputs: Vec<DynSolValue>,
    ) {
        self.calls
            .lock()
            .unwrap()
            .insert(call_key(address, function, &args), outputs);
    }

    pub fn set_uint(&self, address: Address, function: &str, args: Vec<DynSolValue>, value: u64) {
        self.set_call(address, function, args, vec![uint(value)]);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn timestamp_lookups(&self) -> usize {
        self.timestamp_lookups.load(Ordering::SeqCst)
    }

    pub fn log_queries(&self) -> Vec<(u64, BlockNumberOrTag)> {
        self.log_queries.lock().unwrap().clone()
    }

    pub fn call_blocks(&self) -> Vec<BlockId> {
        self.call_blocks.lock().unwrap().clone()
    }

    fn begin(&self) -> Result<(), RpcError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.broken_transport {
            return Err(RpcError::Transport("connection reset by peer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn latest_block(&self) -> Result<BlockNumber, RpcError> {
        self.begin()?;
        Ok(self.head)
    }

    async fn block_timestamp(&self, hash: B256) -> Result<u64, RpcError> {
        self.begin()?;
        self.timestamp_lookups.fetch_add(1, Ordering::SeqCst);
        let logs = self.logs.lock().unwrap();
        logs.iter()
            .find(|r| r.block_hash == hash)
            .map(|r| Self::timestamp_of(r.block_number))
            .ok_or(RpcError::BlockNotFound(hash))
    }

    async fn query_logs(
        &self,
        query: &EventQuery,
        from: BlockNumber,
        to: BlockNumberOrTag,
    ) -> Result<Vec<EventRecord>, RpcError> {
        self.begin()?;
        self.log_queries.lock().unwrap().push((from, to));
        if self.failing_logs_from.is_some_and(|block| from >= block) {
            return Err(RpcError::ProviderError(
                "query returned more than 10000 results".to_string(),
            ));
        }
        let to = match to {
            BlockNumberOrTag::Number(n) => n,
            _ => self.head,
        };
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|r| r.event == query.name() && r.address == query.address)
            .filter(|r| r.block_number >= from && r.block_number <= to)
            .cloned()
            .collect())
    }

    async fn call(
        &self,
        call: &ContractCall,
        block: BlockId,
    ) -> Result<Vec<DynSolValue>, RpcError> {
        self.begin()?;
        if self.flaky_function.as_deref() == Some(call.function.name.as_str()) {
            return Err(RpcError::Transport("connection reset by peer".to_string()));
        }
        self.call_blocks.lock().unwrap().push(block);
        self.calls
            .lock()
            .unwrap()
            .get(&call_key(call.address, &call.function.name, &call.args))
            .cloned()
            .ok_or_else(|| RpcError::ProviderError("execution reverted".to_string()))
    }
}

fn call_key(address: Address, function: &str, args: &[DynSolValue]) -> String {
    format!("{}:{}:{:?}", address, function, args)
}

pub fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

pub fn pool_of(ledgers: &[Arc<MockLedger>]) -> ProviderPool {
    let connections = ledgers
        .iter()
        .map(|ledger| ledger.clone() as Arc<dyn LedgerReader>)
        .collect();
    ProviderPool::new(connections).unwrap()
}

pub fn record(
    event: &str,
    address: Address,
    block: u64,
    args: Vec<(&str, DynSolValue)>,
) -> EventRecord {
    EventRecord {
        event: event.to_string(),
        address,
        args: args
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect::<BTreeMap<_, _>>(),
        block_number: block,
        block_hash: MockLedger::block_hash_of(block),
        transaction_hash: B256::left_padding_from(&(block * 1_000).to_be_bytes()),
        log_index: 0,
        timestamp: None,
    }
}

pub fn transfer(token: Address, from: Address, to: Address, block: u64, value: u64) -> EventRecord {
    record(
        "Transfer",
        token,
        block,
        vec![
            ("from", DynSolValue::Address(from)),
            ("to", DynSolValue::Address(to)),
            ("value", uint(value)),
        ],
    )
}

/// Fixed window `[0, 10_000)`, so state reads land on block 9_999.
pub fn fixed_settings(contracts: ContractAddresses, output_dir: &Path) -> SnapshotSettings {
    SnapshotSettings {
        output_dir: output_dir.to_path_buf(),
        window: WindowStrategy::FixedRange { from: 0, to: 10_000 },
        pagination: PaginationSettings {
            batch_size: 4,
            inter_batch_delay: Duration::ZERO,
            ..PaginationSettings::default()
        },
        contracts,
        pool_count: 5,
        archive_raw_events: false,
    }
}

pub async fn context_for(
    ledger: &Arc<MockLedger>,
    settings: SnapshotSettings,
    assembler: &dyn SnapshotAssembler,
) -> SnapshotContext {
    SnapshotContext::prepare(
        Arc::new(pool_of(&[ledger.clone()])),
        Arc::new(settings),
        assembler.snapshot_key(),
    )
    .await
    .unwrap()
}

pub fn hex_address(address: Address) -> String {
    format!("0x{}", hex::encode(address))
}
