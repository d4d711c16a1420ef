//! Round-robin pool of ledger connections.
//!
//! Spreads requests over several endpoints so no single endpoint's throughput
//! limit caps a scan. The pool does no health checking; a failed request is
//! only retried (on the next connection) when the configured [`RetryConfig`]
//! allows it, and the default is to fail fast.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{BlockNumber, B256};
use alloy::rpc::types::{BlockId, BlockNumberOrTag};

use crate::rpc::rpc::{LedgerReader, RateLimitConfig, RetryConfig, RpcClient, RpcError};
use crate::types::event::{ContractCall, EventQuery, EventRecord};

pub struct ProviderPool {
    connections: Vec<Arc<dyn LedgerReader>>,
    cursor: AtomicUsize,
    retry: RetryConfig,
}

impl ProviderPool {
    pub fn new(connections: Vec<Arc<dyn LedgerReader>>) -> Result<Self, RpcError> {
        if connections.is_empty() {
            return Err(RpcError::EmptyPool);
        }
        Ok(Self {
            connections,
            cursor: AtomicUsize::new(0),
            retry: RetryConfig::default(),
        })
    }

    /// One HTTP connection per endpoint URL, all sharing the same per-endpoint rate limit.
    pub fn from_urls(
        urls: &[String],
        rate_limit: Option<&RateLimitConfig>,
    ) -> Result<Self, RpcError> {
        let connections = urls
            .iter()
            .map(|url| {
                RpcClient::from_url(url, rate_limit)
                    .map(|client| Arc::new(client) as Arc<dyn LedgerReader>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(connections)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the next connection in strict rotation.
    pub fn next(&self) -> Arc<dyn LedgerReader> {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.connections[i % self.connections.len()].clone()
    }

    /// Runs `operation` against the next connection. Retryable failures move on
    /// to the following connection after a backoff delay, up to `max_retries` times.
    pub async fn with_failover<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, RpcError>
    where
        F: FnMut(Arc<dyn LedgerReader>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt);
                tracing::warn!(
                    "RPC retry {}/{} for '{}' on next connection in {:?}",
                    attempt,
                    self.retry.max_retries,
                    operation_name,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match operation(self.next()).await {
                Ok(result) => {
                    if attempt > 0 {
                        tracing::info!(
                            "RPC '{}' succeeded after {} retries",
                            operation_name,
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    tracing::warn!(
                        "RPC '{}' failed (attempt {}/{}): {}",
                        operation_name,
                        attempt + 1,
                        self.retry.max_retries + 1,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 0 {
                        tracing::error!(
                            "RPC '{}' failed after {} attempts: {}",
                            operation_name,
                            attempt + 1,
                            e
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    pub async fn latest_block(&self) -> Result<BlockNumber, RpcError> {
        self.with_failover("eth_blockNumber", |conn| async move {
            conn.latest_block().await
        })
        .await
    }

    pub async fn block_timestamp(&self, hash: B256) -> Result<u64, RpcError> {
        let op_name = format!("eth_getBlockByHash({})", hash);
        self.with_failover(&op_name, |conn| async move { conn.block_timestamp(hash).await })
            .await
    }

    pub async fn query_logs(
        &self,
        query: &EventQuery,
        from: BlockNumber,
        to: BlockNumberOrTag,
    ) -> Result<Vec<EventRecord>, RpcError> {
        let op_name = format!("eth_getLogs({}, {}-{:?})", query.name(), from, to);
        self.with_failover(&op_name, |conn| async move {
            conn.query_logs(query, from, to).await
        })
        .await
    }

    pub async fn call(
        &self,
        call: &ContractCall,
        block: BlockId,
    ) -> Result<Vec<DynSolValue>, RpcError> {
        let op_name = format!("eth_call({})", call.describe());
        self.with_failover(&op_name, |conn| async move { conn.call(call, block).await })
            .await
    }
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("connections", &self.connections.len())
            .field("retry", &self.retry)
            .finish()
    }
}
