mod pool;
mod rpc;

pub use pool::ProviderPool;
pub use rpc::{LedgerReader, RateLimitConfig, RetryConfig, RpcClient, RpcError};
