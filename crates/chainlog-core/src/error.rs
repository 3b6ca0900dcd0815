//! Error types for the event-log pipeline.

use alloy_primitives::B256;
use thiserror::Error;

use crate::rpc::JsonRpcError;

/// Errors raised while resolving an event or encoding its filter.
///
/// These are synchronous and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("No event matches '{identifier}'")]
    NotFound { identifier: String },

    #[error("Invalid event signature '{signature}': {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("Too many indexed arguments: event has {expected} indexed parameters, got {got}")]
    TooManyArguments { expected: usize, got: usize },

    #[error("Invalid topic value for '{param}': {reason}")]
    InvalidTopicValue { param: String, reason: String },

    #[error("Type '{ty}' cannot be used as an indexed filter value")]
    UnsupportedIndexedType { ty: String },

    #[error("Invalid ABI: {reason}")]
    InvalidAbi { reason: String },
}

impl EventError {
    pub(crate) fn invalid_value(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTopicValue {
            param: param.into(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by a backend. Propagated to callers untranslated.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed (connection refused, timeout, non-2xx status).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The backend connection or subscription is gone.
    #[error("Backend closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Errors from the public fetch/watch operations.
#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Transaction {hash} has no receipt")]
    TransactionNotFound { hash: B256 },
}

/// Errors while loading configuration or deployment artifacts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Event(#[from] EventError),
}

/// Why a native log could not be decoded against a descriptor.
///
/// Never surfaced from the public operations: the normalizer reports these as
/// `None` and logs the reason at debug level.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("malformed native log: {0}")]
    Malformed(String),

    #[error("signature topic does not match")]
    SignatureMismatch,

    #[error("expected {expected} indexed topics, got {got}")]
    TopicCount { expected: usize, got: usize },

    #[error("ABI decode failed: {0}")]
    Abi(String),
}
