//! In-process log backend.
//!
//! A deterministic chain held in memory: blocks are pushed explicitly, range
//! queries follow `eth_getLogs` matching, and each pushed block is delivered
//! to live subscribers as one batch. Useful for tests and offline tooling.

use alloy_primitives::B256;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::backend::{LogBackend, LogFilter, LogSubscription, Receipt, Unsubscribe};
use crate::error::BackendError;
use crate::log::RawLog;

#[derive(Default)]
struct Inner {
    head: u64,
    logs: Vec<RawLog>,
    /// tx hash → receipt logs, in emission order
    receipts: HashMap<B256, Vec<RawLog>>,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber: u64,
}

struct Subscriber {
    filter: LogFilter,
    tx: mpsc::UnboundedSender<Vec<RawLog>>,
}

/// Thread-safe in-memory chain. Cloning shares the same chain.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Append a block. Logs without a block number are stamped with `number`
    /// and every log is added to its transaction's receipt. Matching live
    /// subscribers receive the block's logs as one batch.
    pub fn push_block(&self, number: u64, logs: Vec<RawLog>) {
        let mut inner = self.lock();
        inner.head = inner.head.max(number);

        let logs: Vec<RawLog> = logs
            .into_iter()
            .map(|mut log| {
                log.block_number.get_or_insert(number);
                log
            })
            .collect();

        for log in &logs {
            if let Some(hash) = log.transaction_hash {
                inner.receipts.entry(hash).or_default().push(log.clone());
            }
        }

        inner.subscribers.retain(|id, sub| {
            let batch: Vec<RawLog> = logs
                .iter()
                .filter(|l| sub.filter.matches(&l.address, &l.topics))
                .cloned()
                .collect();
            if batch.is_empty() {
                return true;
            }
            let delivered = sub.tx.send(batch).is_ok();
            if !delivered {
                tracing::debug!(subscriber = id, "dropping closed subscriber");
            }
            delivered
        });

        inner.logs.extend(logs);
    }

    /// Register a receipt directly, replacing any logs recorded for `tx_hash`.
    pub fn add_receipt(&self, tx_hash: B256, logs: Vec<RawLog>) {
        self.lock().receipts.insert(tx_hash, logs);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MemoryGuard {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl Unsubscribe for MemoryGuard {
    fn unsubscribe(&self) {
        lock(&self.inner).subscribers.remove(&self.id);
    }
}

#[async_trait]
impl LogBackend for MemoryBackend {
    type Log = RawLog;

    async fn block_number(&self) -> Result<u64, BackendError> {
        Ok(self.lock().head)
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, BackendError> {
        let inner = self.lock();
        let from = filter.from_block.resolve(inner.head);
        let to = filter.to_block.resolve(inner.head);
        Ok(inner
            .logs
            .iter()
            .filter(|l| l.block_number.is_some_and(|n| (from..=to).contains(&n)))
            .filter(|l| filter.matches(&l.address, &l.topics))
            .cloned()
            .collect())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt<RawLog>>, BackendError> {
        Ok(self.lock().receipts.get(&tx_hash).map(|logs| Receipt {
            transaction_hash: tx_hash,
            logs: logs.clone(),
        }))
    }

    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription<RawLog>, BackendError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(
            id,
            Subscriber {
                filter: filter.clone(),
                tx,
            },
        );
        Ok(LogSubscription::new(
            rx,
            MemoryGuard {
                id,
                inner: Arc::clone(&self.inner),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BlockTag;
    use crate::topic::Topic;
    use alloy_primitives::{Address, Bytes};

    fn log(address: Address, topics: Vec<B256>, tx: u8) -> RawLog {
        RawLog {
            address,
            topics,
            data: Bytes::new(),
            block_number: None,
            block_hash: None,
            transaction_index: Some(0),
            transaction_hash: Some(B256::repeat_byte(tx)),
            log_index: Some(0),
            removed: false,
        }
    }

    #[tokio::test]
    async fn range_and_topic_matching() {
        let addr = Address::repeat_byte(1);
        let (a, b) = (B256::repeat_byte(0xa), B256::repeat_byte(0xb));
        let backend = MemoryBackend::new();
        backend.push_block(1, vec![log(addr, vec![a], 1)]);
        backend.push_block(2, vec![log(addr, vec![b], 2), log(Address::ZERO, vec![a], 2)]);
        backend.push_block(3, vec![log(addr, vec![a, b], 3)]);

        let all = LogFilter::new(addr, vec![]);
        assert_eq!(backend.query_logs(&all).await.unwrap().len(), 3);

        let only_a = LogFilter::new(addr, vec![Topic::Exact(a)]);
        let got = backend.query_logs(&only_a).await.unwrap();
        assert_eq!(got.iter().map(|l| l.block_number).collect::<Vec<_>>(), [Some(1), Some(3)]);

        let ranged = only_a.clone().from_block(2u64).to_block(BlockTag::Latest);
        assert_eq!(backend.query_logs(&ranged).await.unwrap().len(), 1);

        let either = LogFilter::new(addr, vec![Topic::AnyOf(vec![a, b])]).to_block(2u64);
        assert_eq!(backend.query_logs(&either).await.unwrap().len(), 2);

        assert_eq!(backend.block_number().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn receipts_collect_logs_by_transaction() {
        let backend = MemoryBackend::new();
        backend.push_block(5, vec![log(Address::ZERO, vec![], 9), log(Address::ZERO, vec![], 9)]);
        let receipt = backend.receipt(B256::repeat_byte(9)).await.unwrap().unwrap();
        assert_eq!(receipt.logs.len(), 2);
        assert!(backend.receipt(B256::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscribers_receive_matching_batches_until_unsubscribed() {
        let addr = Address::repeat_byte(1);
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe(&LogFilter::new(addr, vec![])).await.unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        backend.push_block(1, vec![log(addr, vec![], 1), log(Address::ZERO, vec![], 1)]);
        let batch = sub.batches.recv().await.unwrap();
        assert_eq!(batch.len(), 1);

        sub.guard.unsubscribe();
        sub.guard.unsubscribe();
        assert_eq!(backend.subscriber_count(), 0);
        backend.push_block(2, vec![log(addr, vec![], 2)]);
        assert!(sub.batches.recv().await.is_none());
    }
}
