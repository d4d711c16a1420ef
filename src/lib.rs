//! Point-in-time state snapshots of a token economy's contracts.
//!
//! Each tracked contract gets one JSON document rebuilt from two sources:
//! direct state reads, and event history scanned in block-range pages across
//! a pool of RPC connections. Current state is often only reachable through
//! history (the set of token holders has no on-chain index), so most
//! snapshots scan events first and then read per-address state.

pub mod paginator;
pub mod rpc;
pub mod scheduler;
pub mod snapshot;
#[cfg(test)]
mod testing;
pub mod types;
