//! The capability interface every log backend implements.
//!
//! The engine only ever talks to [`LogBackend`]. A backend chooses its own
//! native log shape (`type Log`) and hands entries back untouched; the
//! normalizer turns them into [`NormalizedLog`](crate::NormalizedLog)s.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc;

use crate::error::BackendError;
use crate::log::NativeLog;
use crate::topic::Topic;

/// A block bound for a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    Number(u64),
    #[default]
    Latest,
}

impl BlockTag {
    /// Resolve against the current head.
    pub fn resolve(&self, head: u64) -> u64 {
        match self {
            Self::Number(n) => *n,
            Self::Latest => head,
        }
    }
}

impl From<u64> for BlockTag {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl Serialize for BlockTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_str(&format!("{n:#x}")),
            Self::Latest => serializer.serialize_str("latest"),
        }
    }
}

/// An `eth_getLogs` style filter. `topics[0]` is the signature slot for
/// non-anonymous events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Address,
    pub from_block: BlockTag,
    pub to_block: BlockTag,
    pub topics: Vec<Topic>,
}

impl LogFilter {
    pub fn new(address: Address, topics: Vec<Topic>) -> Self {
        Self {
            address,
            from_block: BlockTag::Number(0),
            to_block: BlockTag::Latest,
            topics,
        }
    }

    pub fn from_block(mut self, block: impl Into<BlockTag>) -> Self {
        self.from_block = block.into();
        self
    }

    pub fn to_block(mut self, block: impl Into<BlockTag>) -> Self {
        self.to_block = block.into();
        self
    }

    /// Address and topic match. Block range is not checked.
    pub fn matches(&self, address: &Address, topics: &[B256]) -> bool {
        if *address != self.address {
            return false;
        }
        self.topics
            .iter()
            .enumerate()
            .all(|(i, slot)| slot.matches(topics.get(i)))
    }

    /// Render as the single `eth_getLogs` / `eth_subscribe` params object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "address": self.address,
            "topics": self.topics,
        });
        value["fromBlock"] = serde_json::json!(self.from_block);
        value["toBlock"] = serde_json::json!(self.to_block);
        value
    }

    /// Subscriptions take no block range.
    pub fn to_subscribe_json(&self) -> serde_json::Value {
        serde_json::json!({
            "address": self.address,
            "topics": self.topics,
        })
    }
}

/// A transaction receipt reduced to what the engine needs.
#[derive(Debug, Clone)]
pub struct Receipt<L> {
    pub transaction_hash: B256,
    pub logs: Vec<L>,
}

/// Releases a backend's listener registration. Must be idempotent.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self);
}

/// A live log subscription: batches of native logs plus the guard that ends it.
pub struct LogSubscription<L> {
    pub batches: mpsc::UnboundedReceiver<Vec<L>>,
    pub guard: Box<dyn Unsubscribe>,
}

impl<L> LogSubscription<L> {
    pub fn new(batches: mpsc::UnboundedReceiver<Vec<L>>, guard: impl Unsubscribe + 'static) -> Self {
        Self {
            batches,
            guard: Box::new(guard),
        }
    }
}

/// What the engine needs from a blockchain client.
#[async_trait]
pub trait LogBackend: Send + Sync + 'static {
    /// The backend's own log record, handed back to callers as `native`.
    type Log: NativeLog;

    /// Current head block number.
    async fn block_number(&self) -> Result<u64, BackendError>;

    /// One range query. Entries are returned in node order.
    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<Self::Log>, BackendError>;

    /// `None` when the node has no receipt for `tx_hash`.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt<Self::Log>>, BackendError>;

    /// Register a live listener. The block range of `filter` is ignored.
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription<Self::Log>, BackendError>;
}
