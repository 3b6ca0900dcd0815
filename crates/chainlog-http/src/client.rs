//! HTTP JSON-RPC log backend backed by `reqwest`.

use alloy_primitives::B256;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use chainlog_core::backend::{LogBackend, LogFilter, LogSubscription, Receipt, Unsubscribe};
use chainlog_core::config::ChainlogConfig;
use chainlog_core::error::BackendError;
use chainlog_core::rpc::{quantity_from_value, JsonRpcRequest, JsonRpcResponse, RpcLog, RpcReceipt};

/// Configuration for `HttpBackend`.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub request_timeout: Duration,
    /// Delay between `eth_getLogs` polls of a watch.
    pub poll_interval: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl From<&ChainlogConfig> for HttpBackendConfig {
    fn from(config: &ChainlogConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

struct RpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::debug!(id, method, url = %self.url, "rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        serde_json::from_slice::<JsonRpcResponse>(&body)?.into_result()
    }

    async fn block_number(&self) -> Result<u64, BackendError> {
        quantity_from_value(&self.call("eth_blockNumber", vec![]).await?)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, BackendError> {
        let result = self.call("eth_getLogs", vec![filter.to_json()]).await?;
        Ok(serde_json::from_value(result)?)
    }
}

/// HTTP JSON-RPC backend. Native log shape: [`RpcLog`].
#[derive(Clone)]
pub struct HttpBackend {
    client: Arc<RpcClient>,
    poll_interval: Duration,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>, config: HttpBackendConfig) -> Result<Self, BackendError> {
        if config.poll_interval.is_zero() {
            return Err(BackendError::Other("poll interval must be non-zero".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            client: Arc::new(RpcClient {
                url: url.into(),
                http,
                next_id: AtomicU64::new(1),
            }),
            poll_interval: config.poll_interval,
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, BackendError> {
        Self::new(url, HttpBackendConfig::default())
    }

    pub fn url(&self) -> &str {
        &self.client.url
    }
}

#[async_trait]
impl LogBackend for HttpBackend {
    type Log = RpcLog;

    async fn block_number(&self) -> Result<u64, BackendError> {
        self.client.block_number().await
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>, BackendError> {
        self.client.get_logs(filter).await
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt<RpcLog>>, BackendError> {
        let result = self
            .client
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: RpcReceipt = serde_json::from_value(result)?;
        Ok(Some(Receipt {
            transaction_hash: tx_hash,
            logs: receipt.logs,
        }))
    }

    /// Starts a polling task. The first poll covers the block after the
    /// current head, so only logs emitted after subscribing are delivered.
    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription<RpcLog>, BackendError> {
        let head = self.client.block_number().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(poll_logs(
            Arc::clone(&self.client),
            filter.clone(),
            head + 1,
            self.poll_interval,
            tx,
        ));
        tracing::info!(url = %self.client.url, from = head + 1, "polling for logs");
        Ok(LogSubscription::new(rx, PollGuard(task.abort_handle())))
    }
}

struct PollGuard(AbortHandle);

impl Unsubscribe for PollGuard {
    fn unsubscribe(&self) {
        self.0.abort();
    }
}

/// Poll `[next, head]` once per tick. A failed poll is retried on the next
/// tick over the same range.
async fn poll_logs(
    client: Arc<RpcClient>,
    filter: LogFilter,
    mut next: u64,
    interval: Duration,
    tx: mpsc::UnboundedSender<Vec<RpcLog>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let head = match client.block_number().await {
            Ok(head) => head,
            Err(e) => {
                tracing::warn!(error = %e, url = %client.url, "poll: eth_blockNumber failed");
                continue;
            }
        };
        if head < next {
            continue;
        }

        let range = filter.clone().from_block(next).to_block(head);
        match client.get_logs(&range).await {
            Ok(logs) => {
                tracing::debug!(from = next, to = head, count = logs.len(), "poll");
                next = head + 1;
                if !logs.is_empty() && tx.send(logs).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, from = next, to = head, "poll: eth_getLogs failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_chainlog_config() {
        let mut cfg = ChainlogConfig::new("http://localhost:8545");
        cfg.poll_interval_ms = 250;
        let http = HttpBackendConfig::from(&cfg);
        assert_eq!(http.poll_interval, Duration::from_millis(250));
        assert_eq!(http.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let config = HttpBackendConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            HttpBackend::new("http://localhost:8545", config),
            Err(BackendError::Other(_))
        ));
        assert!(HttpBackend::default_for("http://localhost:8545").is_ok());
    }

    #[tokio::test]
    async fn connection_refused_is_an_http_error() {
        // Port 9 (discard) is not listening on test hosts.
        let backend = HttpBackend::default_for("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            backend.block_number().await,
            Err(BackendError::Http(_))
        ));
    }
}
