//! # chainlog-http
//!
//! HTTP JSON-RPC backend for the ChainLog engine.
//!
//! Range queries go through `eth_getLogs`, receipts through
//! `eth_getTransactionReceipt`. HTTP has no push channel, so a watch is a
//! background task that polls `eth_getLogs` from the last block it saw up to
//! the current head on every tick.

pub mod client;

pub use client::{HttpBackend, HttpBackendConfig};
