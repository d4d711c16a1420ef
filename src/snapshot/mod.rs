//! Snapshot generation.
//!
//! ```text
//! SnapshotRunner ──► SnapshotContext::prepare (resolve window) ──► SnapshotAssembler::generate
//!                                                                        │
//!                        ┌───────────────────────────────────────────────┤
//!                        ▼                                               ▼
//!              EventPaginator (history)                    ProviderPool (state reads)
//!                        │
//!                        └─► optional parquet archive
//!
//! SnapshotDocument ──► {output_dir}/{name}_v{version}.json
//! ```

pub mod archive;
pub mod assemblers;
pub mod context;
pub mod document;
pub mod error;
pub mod registry;
pub mod runner;
pub mod traits;

pub use context::{SnapshotContext, SnapshotSettings};
pub use document::{write_snapshot, SnapshotDocument};
pub use error::SnapshotError;
pub use registry::{all_assemblers, build_registry};
pub use runner::{RunReport, SnapshotRunner};
pub use traits::SnapshotAssembler;
