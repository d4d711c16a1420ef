pub mod abi;
pub mod config;
pub mod event;
