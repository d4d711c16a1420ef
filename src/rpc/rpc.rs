use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy::dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt};
use alloy::network::Ethereum;
use alloy::primitives::{BlockNumber, B256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{
    BlockId, BlockNumberOrTag, Filter, Log, TransactionInput, TransactionRequest,
};
use async_trait::async_trait;
use governor::clock::{QuantaClock, QuantaInstant};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use thiserror::Error;
use url::Url;

use crate::types::event::{ContractCall, EventQuery, EventRecord};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Block {0} not found")]
    BlockNotFound(B256),

    #[error("Log is missing {0} (pending log?)")]
    IncompleteLog(&'static str),

    #[error("Provider pool needs at least one connection")]
    EmptyPool,
}

/// Lowercased fragments of node or transport messages that mark a failure
/// as transient.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "reset",
    "broken pipe",
    "eof",
    "sending request",
    "rate limit",
    "too many requests",
    "429",
    "502",
    "503",
    "504",
    "service unavailable",
    "bad gateway",
    "try again",
];

impl RpcError {
    /// Whether the same request could succeed if sent again. Reverts and
    /// decoding failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            RpcError::ProviderError(msg) => {
                let msg = msg.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|marker| msg.contains(marker))
            }
            RpcError::InvalidUrl(_)
            | RpcError::Abi(_)
            | RpcError::BlockNotFound(_)
            | RpcError::IncompleteLog(_)
            | RpcError::EmptyPool => false,
        }
    }
}

/// Failover policy of the provider pool. `max_retries == 0` fails fast.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Pause before retry number `attempt`; nothing before the first request.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.backoff_multiplier.powi(attempt as i32 - 1);
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Read-only view of the ledger runtime that snapshots are reconstructed from.
///
/// Every connection handed out by the provider pool implements this; the
/// snapshot pipeline never talks to a node through anything else.
#[async_trait]
pub trait LedgerReader: Send + Sync + 'static {
    async fn latest_block(&self) -> Result<BlockNumber, RpcError>;

    async fn block_timestamp(&self, hash: B256) -> Result<u64, RpcError>;

    /// Logs for `query` in `[from, to]` (inclusive), in the node's
    /// (block, transaction, log index) order.
    async fn query_logs(
        &self,
        query: &EventQuery,
        from: BlockNumber,
        to: BlockNumberOrTag,
    ) -> Result<Vec<EventRecord>, RpcError>;

    async fn call(&self, call: &ContractCall, block: BlockId)
        -> Result<Vec<DynSolValue>, RpcError>;
}

pub type StandardRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl RateLimitConfig {
    pub fn per_second(requests_per_second: NonZeroU32) -> Self {
        Self {
            requests_per_second,
            jitter_min_ms: 5,
            jitter_max_ms: 50,
        }
    }
}

pub struct RpcClient {
    provider: RootProvider<Ethereum>,
    url: Url,
    rate_limiter: Option<Arc<StandardRateLimiter>>,
    jitter: Option<Jitter>,
}

impl RpcClient {
    pub fn new(url: Url, rate_limit: Option<&RateLimitConfig>) -> Self {
        let provider = RootProvider::<Ethereum>::new_http(url.clone());

        let (rate_limiter, jitter) = match rate_limit {
            Some(rate_config) => {
                let quota = Quota::per_second(rate_config.requests_per_second);
                let jitter = Jitter::new(
                    Duration::from_millis(rate_config.jitter_min_ms),
                    Duration::from_millis(rate_config.jitter_max_ms),
                );
                (Some(Arc::new(RateLimiter::direct(quota))), Some(jitter))
            }
            None => (None, None),
        };

        Self {
            provider,
            url,
            rate_limiter,
            jitter,
        }
    }

    pub fn from_url(url: &str, rate_limit: Option<&RateLimitConfig>) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::InvalidUrl(e.to_string()))?;
        Ok(Self::new(url, rate_limit))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn wait_for_rate_limit(&self) {
        if let (Some(limiter), Some(jitter)) = (&self.rate_limiter, &self.jitter) {
            limiter.until_ready_with_jitter(*jitter).await;
        }
    }
}

#[async_trait]
impl LedgerReader for RpcClient {
    async fn latest_block(&self) -> Result<BlockNumber, RpcError> {
        self.wait_for_rate_limit().await;
        self.provider
            .get_block_number()
            .await
            .map_err(|e| RpcError::ProviderError(e.to_string()))
    }

    async fn block_timestamp(&self, hash: B256) -> Result<u64, RpcError> {
        self.wait_for_rate_limit().await;
        let block = self
            .provider
            .get_block(BlockId::hash(hash))
            .await
            .map_err(|e| RpcError::ProviderError(e.to_string()))?
            .ok_or(RpcError::BlockNotFound(hash))?;
        Ok(block.header.timestamp)
    }

    async fn query_logs(
        &self,
        query: &EventQuery,
        from: BlockNumber,
        to: BlockNumberOrTag,
    ) -> Result<Vec<EventRecord>, RpcError> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.event.selector())
            .from_block(from)
            .to_block(to);

        self.wait_for_rate_limit().await;
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| RpcError::ProviderError(e.to_string()))?;

        logs.iter().map(|log| decode_log(query, log)).collect()
    }

    async fn call(
        &self,
        call: &ContractCall,
        block: BlockId,
    ) -> Result<Vec<DynSolValue>, RpcError> {
        let input = call
            .function
            .abi_encode_input(&call.args)
            .map_err(|e| RpcError::Abi(format!("encoding {}: {}", call.describe(), e)))?;
        let tx = TransactionRequest::default()
            .to(call.address)
            .input(TransactionInput::new(input.into()));

        self.wait_for_rate_limit().await;
        let output = self
            .provider
            .call(tx)
            .block(block)
            .await
            .map_err(|e| RpcError::ProviderError(e.to_string()))?;

        call.function
            .abi_decode_output(&output)
            .map_err(|e| RpcError::Abi(format!("decoding {}: {}", call.describe(), e)))
    }
}

/// Decodes a raw log into an [`EventRecord`], keying arguments by parameter name.
/// Unnamed parameters are keyed by position (`arg0`, `arg1`, ...).
fn decode_log(query: &EventQuery, log: &Log) -> Result<EventRecord, RpcError> {
    let decoded = query
        .event
        .decode_log_parts(log.topics().iter().copied(), &log.data().data)
        .map_err(|e| RpcError::Abi(format!("decoding {} log: {}", query.name(), e)))?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut args = BTreeMap::new();

    for (position, input) in query.event.inputs.iter().enumerate() {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        let value = value.ok_or_else(|| {
            RpcError::Abi(format!(
                "{} log is missing argument {}",
                query.name(),
                position
            ))
        })?;
        let key = if input.name.is_empty() {
            format!("arg{}", position)
        } else {
            input.name.clone()
        };
        args.insert(key, value);
    }

    Ok(EventRecord {
        event: query.name().to_string(),
        address: log.address(),
        args,
        block_number: log
            .block_number
            .ok_or(RpcError::IncompleteLog("block number"))?,
        block_hash: log.block_hash.ok_or(RpcError::IncompleteLog("block hash"))?,
        transaction_hash: log
            .transaction_hash
            .ok_or(RpcError::IncompleteLog("transaction hash"))?,
        log_index: log.log_index.ok_or(RpcError::IncompleteLog("log index"))?,
        timestamp: None,
    })
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("url", &self.url.host_str())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish()
    }
}
