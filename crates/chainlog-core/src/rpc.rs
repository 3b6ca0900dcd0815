//! JSON-RPC 2.0 wire types shared by the HTTP and WebSocket backends.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackendError, DecodeFailure};
use crate::log::{NativeLog, RawLog};

/// JSON-RPC request ID: string, number, or null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(id),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value, or the node's error object as [`BackendError::Rpc`].
    pub fn into_result(self) -> Result<Value, BackendError> {
        match self.error {
            Some(err) => Err(BackendError::Rpc(err)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A log entry exactly as a node returns it from `eth_getLogs`: hex strings.
///
/// Pending logs carry `null` block and transaction fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub transaction_index: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl NativeLog for RpcLog {
    fn to_raw(&self) -> Result<RawLog, DecodeFailure> {
        Ok(RawLog {
            address: parse_field::<Address>("address", &self.address)?,
            topics: self
                .topics
                .iter()
                .map(|t| parse_field::<B256>("topic", t))
                .collect::<Result<_, _>>()?,
            data: decode_data(&self.data)?,
            block_number: opt_quantity("blockNumber", &self.block_number)?,
            block_hash: opt_field("blockHash", &self.block_hash)?,
            transaction_index: opt_quantity("transactionIndex", &self.transaction_index)?,
            transaction_hash: opt_field("transactionHash", &self.transaction_hash)?,
            log_index: opt_quantity("logIndex", &self.log_index)?,
            removed: self.removed.unwrap_or(false),
        })
    }
}

/// Untouched JSON from the wire. Used as the WebSocket backend's native log.
impl NativeLog for Value {
    fn to_raw(&self) -> Result<RawLog, DecodeFailure> {
        let log: RpcLog = serde_json::from_value(self.clone())
            .map_err(|e| DecodeFailure::Malformed(e.to_string()))?;
        log.to_raw()
    }
}

/// The parts of `eth_getTransactionReceipt` the log engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt<L = RpcLog> {
    pub transaction_hash: String,
    pub logs: Vec<L>,
}

/// Parse a hex quantity (`0x1a`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// Parse an `eth_blockNumber` style result.
pub fn quantity_from_value(value: &Value) -> Result<u64, BackendError> {
    value
        .as_str()
        .and_then(parse_hex_u64)
        .ok_or_else(|| BackendError::Other(format!("invalid hex quantity: {value}")))
}

fn parse_field<T: std::str::FromStr>(field: &str, s: &str) -> Result<T, DecodeFailure> {
    s.parse::<T>()
        .map_err(|_| DecodeFailure::Malformed(format!("invalid {field} '{s}'")))
}

fn opt_field<T: std::str::FromStr>(field: &str, s: &Option<String>) -> Result<Option<T>, DecodeFailure> {
    s.as_deref().map(|s| parse_field(field, s)).transpose()
}

fn opt_quantity(field: &str, s: &Option<String>) -> Result<Option<u64>, DecodeFailure> {
    s.as_deref()
        .map(|s| {
            parse_hex_u64(s)
                .ok_or_else(|| DecodeFailure::Malformed(format!("invalid {field} '{s}'")))
        })
        .transpose()
}

fn decode_data(s: &str) -> Result<Bytes, DecodeFailure> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s)
        .map(Bytes::from)
        .map_err(|e| DecodeFailure::Malformed(format!("invalid data: {e}")))
}
