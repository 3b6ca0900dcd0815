//! `LogEngine`: fetch, watch and receipt lookups over any [`LogBackend`].

use alloy_primitives::B256;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::args::{normalize_args, IndexedArgs};
use crate::backend::{BlockTag, LogBackend, LogFilter, Unsubscribe};
use crate::contract::Contract;
use crate::descriptor::EventDescriptor;
use crate::error::LogError;
use crate::log::{normalize_log, NativeLog, NormalizedLog};
use crate::topic::{encode_topics, topic_filter};

/// Error type a watch callback may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Backend-agnostic event-log operations.
///
/// The engine resolves the event, normalizes and encodes the indexed filter
/// arguments, issues the backend query and normalizes every entry it gets
/// back. Resolution and encoding errors surface before the backend is
/// contacted; backend errors are returned unchanged.
pub struct LogEngine<B> {
    backend: Arc<B>,
}

impl<B> Clone for LogEngine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: LogBackend> LogEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fetch every log of `event` emitted by `contract` in
    /// `[from_block, to_block]`. `from_block` defaults to genesis and
    /// `to_block` to the latest block. Logs come back in backend order.
    pub async fn fetch_logs(
        &self,
        contract: &Contract,
        event: &str,
        from_block: Option<u64>,
        to_block: Option<u64>,
        args: IndexedArgs,
    ) -> Result<Vec<NormalizedLog<B::Log>>, LogError> {
        let (descriptor, filter) = prepare(contract, event, args)?;
        let filter = filter
            .from_block(from_block.unwrap_or(0))
            .to_block(to_block.map_or(BlockTag::Latest, BlockTag::Number));

        debug!(
            event = %descriptor.signature(),
            address = %contract.address,
            from = ?filter.from_block,
            to = ?filter.to_block,
            "fetching logs"
        );
        let natives = self.backend.query_logs(&filter).await?;
        let total = natives.len();
        let logs: Vec<_> = natives
            .into_iter()
            .filter_map(|native| normalize_log(&descriptor, native))
            .collect();
        debug!(event = %descriptor.name, total, decoded = logs.len(), "fetched logs");
        Ok(logs)
    }

    /// Watch `event` with every indexed slot as a wildcard.
    pub async fn watch_logs<F>(
        &self,
        contract: &Contract,
        event: &str,
        callback: F,
    ) -> Result<WatchHandle, LogError>
    where
        F: FnMut(NormalizedLog<B::Log>) -> Result<(), BoxError> + Send + 'static,
    {
        self.watch_logs_with(contract, event, IndexedArgs::None, callback)
            .await
    }

    /// Watch `event` for logs matching `args`.
    ///
    /// Each received log is normalized and handed to `callback` on its own,
    /// in delivery order. A callback that returns an error or panics is
    /// logged and delivery continues with the next log. Logs removed by a
    /// reorg are skipped.
    pub async fn watch_logs_with<F>(
        &self,
        contract: &Contract,
        event: &str,
        args: IndexedArgs,
        callback: F,
    ) -> Result<WatchHandle, LogError>
    where
        F: FnMut(NormalizedLog<B::Log>) -> Result<(), BoxError> + Send + 'static,
    {
        let (descriptor, filter) = prepare(contract, event, args)?;
        let subscription = self.backend.subscribe(&filter).await?;
        info!(event = %descriptor.signature(), address = %contract.address, "watching logs");

        let stopped = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(deliver(
            descriptor,
            subscription.batches,
            callback,
            Arc::clone(&stopped),
        ));

        Ok(WatchHandle {
            stopped,
            guard: subscription.guard,
            task: task.abort_handle(),
        })
    }

    /// Logs of `event` recorded in the receipt of `tx_hash`, in receipt
    /// order. Receipt entries that do not decode against `event` (other
    /// events, other contracts' logs with a different shape) are dropped.
    pub async fn fetch_transaction_logs(
        &self,
        contract: &Contract,
        tx_hash: B256,
        event: &str,
    ) -> Result<Vec<NormalizedLog<B::Log>>, LogError> {
        let descriptor = contract.event(event)?.clone();
        let receipt = self
            .backend
            .receipt(tx_hash)
            .await?
            .ok_or(LogError::TransactionNotFound { hash: tx_hash })?;

        let total = receipt.logs.len();
        let logs: Vec<_> = receipt
            .logs
            .into_iter()
            .filter_map(|native| normalize_log(&descriptor, native))
            .collect();
        debug!(tx = %tx_hash, event = %descriptor.name, total, decoded = logs.len(), "receipt logs");
        Ok(logs)
    }
}

/// Resolve, normalize and encode. Never touches the backend.
fn prepare(
    contract: &Contract,
    event: &str,
    args: IndexedArgs,
) -> Result<(EventDescriptor, LogFilter), LogError> {
    let descriptor = contract.event(event)?.clone();
    let normalized = normalize_args(&descriptor, args)?;
    let topics = topic_filter(&descriptor, encode_topics(&descriptor, &normalized)?);
    Ok((
        descriptor,
        LogFilter::new(contract.address, topics),
    ))
}

async fn deliver<N, F>(
    descriptor: EventDescriptor,
    mut batches: mpsc::UnboundedReceiver<Vec<N>>,
    mut callback: F,
    stopped: Arc<AtomicBool>,
) where
    N: NativeLog,
    F: FnMut(NormalizedLog<N>) -> Result<(), BoxError>,
{
    while let Some(batch) = batches.recv().await {
        for native in batch {
            if stopped.load(Ordering::Acquire) {
                return;
            }
            if native.to_raw().is_ok_and(|raw| raw.removed) {
                debug!(event = %descriptor.name, "skipping removed log");
                continue;
            }
            let Some(log) = normalize_log(&descriptor, native) else {
                continue;
            };
            if stopped.load(Ordering::Acquire) {
                return;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(log))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = %descriptor.name, error = %e, "log callback failed");
                }
                Err(panic) => {
                    warn!(event = %descriptor.name, panic = %panic_message(&*panic), "log callback panicked");
                }
            }
        }
    }
    if !stopped.load(Ordering::Acquire) {
        warn!(event = %descriptor.name, "log subscription closed by the backend");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

/// A live watch. Dropping it unsubscribes.
pub struct WatchHandle {
    stopped: Arc<AtomicBool>,
    guard: Box<dyn Unsubscribe>,
    task: AbortHandle,
}

impl WatchHandle {
    /// Stop delivery and release the backend listener. Safe to call any
    /// number of times. A callback already running when this is called may
    /// finish, but the delivery task checks the stop flag right before each
    /// invocation and starts no further callbacks once it is set.
    pub fn unsubscribe(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.guard.unsubscribe();
        self.task.abort();
        debug!("log watch unsubscribed");
    }

    /// `false` after `unsubscribe`, or once the backend has closed the
    /// subscription and the delivery task has ended.
    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && !self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}
