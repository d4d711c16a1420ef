//! Snapshot error types.

use thiserror::Error;

use crate::paginator::PaginationError;
use crate::rpc::RpcError;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Pagination error: {0}")]
    Pagination(#[from] PaginationError),

    #[error("No address configured for contract '{0}'")]
    MissingContract(&'static str),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
