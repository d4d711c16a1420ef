//! ABI signature parsing and conversion of decoded values into snapshot JSON.
//!
//! Snapshot documents must be byte-identical across runs over the same data,
//! so every value has exactly one JSON rendering: integers become decimal
//! strings (a `uint256` does not fit a JSON number), addresses and byte
//! strings become lowercase `0x` hex.

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::{Event, Function};
use alloy::primitives::Address;
use serde_json::{Map, Value};

use crate::rpc::RpcError;

pub fn parse_function(signature: &str) -> Result<Function, RpcError> {
    Function::parse(signature)
        .map_err(|e| RpcError::Abi(format!("invalid function signature '{}': {}", signature, e)))
}

pub fn parse_event(signature: &str) -> Result<Event, RpcError> {
    Event::parse(signature)
        .map_err(|e| RpcError::Abi(format!("invalid event signature '{}': {}", signature, e)))
}

pub fn format_address(address: Address) -> String {
    format!("0x{}", hex::encode(address))
}

pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Address(address) => Value::String(format_address(*address)),
        DynSolValue::Function(function) => Value::String(format!("0x{}", hex::encode(function))),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => Value::Array(values.iter().map(to_json).collect()),
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}

/// Pairs a call's decoded outputs with the output names in its signature.
/// Unnamed outputs fall back to their position.
pub fn named_outputs(function: &Function, values: &[DynSolValue]) -> Map<String, Value> {
    function
        .outputs
        .iter()
        .zip(values)
        .enumerate()
        .map(|(position, (param, value))| {
            let key = if param.name.is_empty() {
                position.to_string()
            } else {
                param.name.clone()
            };
            (key, to_json(value))
        })
        .collect()
}
