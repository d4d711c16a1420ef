use std::collections::BTreeMap;

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::{Event, Function};
use alloy::primitives::{Address, B256, U256};

use crate::rpc::RpcError;
use crate::types::abi::{parse_event, parse_function};

/// One historical event emission, decoded.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event: String,
    pub address: Address,
    /// Decoded arguments keyed by parameter name (indexed and data params merged).
    pub args: BTreeMap<String, DynSolValue>,
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    pub log_index: u64,
    /// Only populated when timestamp enrichment was requested.
    pub timestamp: Option<u64>,
}

impl EventRecord {
    pub fn arg(&self, name: &str) -> Option<&DynSolValue> {
        self.args.get(name)
    }

    pub fn address_arg(&self, name: &str) -> Option<Address> {
        self.arg(name).and_then(DynSolValue::as_address)
    }

    pub fn uint_arg(&self, name: &str) -> Option<U256> {
        self.arg(name).and_then(|v| v.as_uint()).map(|(value, _)| value)
    }
}

/// An event to scan for, emitted by one contract.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub address: Address,
    pub event: Event,
}

impl EventQuery {
    /// `signature` is a human-readable declaration, e.g.
    /// `"event Transfer(address indexed from, address indexed to, uint256 value)"`.
    pub fn parse(address: Address, signature: &str) -> Result<Self, RpcError> {
        Ok(Self {
            address,
            event: parse_event(signature)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }
}

/// A read-only contract method invocation.
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub address: Address,
    pub function: Function,
    pub args: Vec<DynSolValue>,
}

impl ContractCall {
    pub fn new(address: Address, function: &Function, args: Vec<DynSolValue>) -> Self {
        Self {
            address,
            function: function.clone(),
            args,
        }
    }

    pub fn parse(
        address: Address,
        signature: &str,
        args: Vec<DynSolValue>,
    ) -> Result<Self, RpcError> {
        Ok(Self {
            address,
            function: parse_function(signature)?,
            args,
        })
    }

    pub fn describe(&self) -> String {
        format!("{}.{}{:?}", self.address, self.function.name, self.args)
    }
}
