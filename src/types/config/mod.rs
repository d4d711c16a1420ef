pub mod contract;
pub mod snapshot;
