//! chainlog-ws: WebSocket JSON-RPC backend for the ChainLog engine.
//!
//! # Features
//! - Request multiplexing over a single connection
//! - Live logs through `eth_subscribe("logs")`, one batch per notification
//! - Unsubscribing sends `eth_unsubscribe` and closes the subscription channel
//!
//! The native log shape is the untouched `serde_json::Value` the node sent.
//! There is no reconnect: when the socket drops, in-flight requests fail
//! with `BackendError::WebSocket` and every subscription channel closes.

pub mod client;
pub mod subscriptions;

pub use client::WsBackend;
pub use subscriptions::{SubscriptionId, SubscriptionManager};
