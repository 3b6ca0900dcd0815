//! WebSocket JSON-RPC log backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chainlog_core::backend::{LogBackend, LogFilter, LogSubscription, Receipt, Unsubscribe};
use chainlog_core::error::BackendError;
use chainlog_core::rpc::{quantity_from_value, JsonRpcRequest, JsonRpcResponse, RpcId, RpcReceipt};

use crate::subscriptions::{SubscriptionId, SubscriptionManager};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SubscribeReply = (SubscriptionId, mpsc::UnboundedReceiver<Vec<Value>>);

/// Command sent from callers to the background WS task.
enum WsCommand {
    Call {
        req: JsonRpcRequest,
        tx: oneshot::Sender<Result<Value, BackendError>>,
    },
    /// `eth_subscribe`; the task registers the subscription before reading
    /// the next frame, so no notification can outrun the registration.
    Subscribe {
        req: JsonRpcRequest,
        tx: oneshot::Sender<Result<SubscribeReply, BackendError>>,
    },
    /// Fire-and-forget `eth_unsubscribe`.
    Notify(JsonRpcRequest),
    Close,
}

/// A request waiting for its response.
enum Pending {
    Call(oneshot::Sender<Result<Value, BackendError>>),
    Subscribe(oneshot::Sender<Result<SubscribeReply, BackendError>>),
}

impl Pending {
    fn fail(self, err: BackendError) {
        match self {
            Self::Call(tx) => {
                let _ = tx.send(Err(err));
            }
            Self::Subscribe(tx) => {
                let _ = tx.send(Err(err));
            }
        }
    }
}

/// Command side of the connection task. The task closes the socket once the
/// last holder drops this: the backend and every live subscription guard
/// keep a share.
struct Connection {
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    next_id: AtomicU64,
}

impl Connection {
    fn request(&self, method: &str, params: Vec<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params)
    }

    fn send(&self, cmd: WsCommand) -> Result<(), BackendError> {
        self.cmd_tx.send(cmd).map_err(|_| closed())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

/// WebSocket JSON-RPC backend. Native log shape: `serde_json::Value`.
///
/// One background task owns the connection and multiplexes every request
/// and subscription over it. Live watches keep the connection open after
/// the backend itself is dropped.
pub struct WsBackend {
    url: String,
    conn: Arc<Connection>,
    subscriptions: SubscriptionManager,
}

impl WsBackend {
    /// Connect to `url` and start the background task.
    pub async fn connect(url: impl Into<String>) -> Result<Self, BackendError> {
        let url = url.into();
        tracing::info!(url = %url, "connecting via WebSocket");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| BackendError::WebSocket(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new();
        tokio::spawn(ws_task(url.clone(), ws, cmd_rx, subscriptions.clone()));

        Ok(Self {
            url,
            conn: Arc::new(Connection {
                cmd_tx,
                next_id: AtomicU64::new(1),
            }),
            subscriptions,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, BackendError> {
        let (tx, rx) = oneshot::channel();
        self.conn.send(WsCommand::Call {
            req: self.conn.request(method, params),
            tx,
        })?;
        rx.await.map_err(|_| closed())?
    }
}

fn closed() -> BackendError {
    BackendError::WebSocket("connection closed".into())
}

struct WsGuard {
    id: SubscriptionId,
    subscriptions: SubscriptionManager,
    conn: Arc<Connection>,
}

impl Unsubscribe for WsGuard {
    fn unsubscribe(&self) {
        if !self.subscriptions.remove(&self.id) {
            return;
        }
        let req = self.conn.request("eth_unsubscribe", vec![Value::String(self.id.0.clone())]);
        // The connection may already be gone, in which case there is nothing to release.
        let _ = self.conn.send(WsCommand::Notify(req));
        tracing::debug!(subscription = %self.id, "unsubscribed");
    }
}

#[async_trait]
impl LogBackend for WsBackend {
    type Log = Value;

    async fn block_number(&self) -> Result<u64, BackendError> {
        quantity_from_value(&self.call("eth_blockNumber", vec![]).await?)
    }

    async fn query_logs(&self, filter: &LogFilter) -> Result<Vec<Value>, BackendError> {
        let result = self.call("eth_getLogs", vec![filter.to_json()]).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt<Value>>, BackendError> {
        let result = self
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let receipt: RpcReceipt<Value> = serde_json::from_value(result)?;
        Ok(Some(Receipt {
            transaction_hash: tx_hash,
            logs: receipt.logs,
        }))
    }

    async fn subscribe(&self, filter: &LogFilter) -> Result<LogSubscription<Value>, BackendError> {
        let (tx, rx) = oneshot::channel();
        let req = self.conn.request(
            "eth_subscribe",
            vec![Value::String("logs".into()), filter.to_subscribe_json()],
        );
        self.conn.send(WsCommand::Subscribe { req, tx })?;
        let (id, batches) = rx.await.map_err(|_| closed())??;

        tracing::info!(subscription = %id, url = %self.url, "subscribed to logs");
        Ok(LogSubscription::new(
            batches,
            WsGuard {
                id,
                subscriptions: self.subscriptions.clone(),
                conn: Arc::clone(&self.conn),
            },
        ))
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    ws: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionManager,
) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, Pending> = HashMap::new();

    let reason = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let (req, waiter) = match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.close().await;
                        break "backend dropped".to_string();
                    }
                    Some(WsCommand::Call { req, tx }) => (req, Some(Pending::Call(tx))),
                    Some(WsCommand::Subscribe { req, tx }) => (req, Some(Pending::Subscribe(tx))),
                    Some(WsCommand::Notify(req)) => (req, None),
                };
                let id = match &req.id { RpcId::Number(n) => *n, _ => 0 };
                let msg = match serde_json::to_string(&req) {
                    Ok(msg) => msg,
                    Err(e) => {
                        if let Some(waiter) = waiter {
                            waiter.fail(BackendError::Deserialization(e));
                        }
                        continue;
                    }
                };
                if let Some(waiter) = waiter {
                    pending.insert(id, waiter);
                }
                tracing::debug!(id, method = %req.method, "ws request");
                if let Err(e) = sink.send(Message::Text(msg)).await {
                    break e.to_string();
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break "stream closed".to_string(),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WS receive error");
                        break e.to_string();
                    }
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&text, &mut pending, &subscriptions);
                    }
                    Some(Ok(Message::Close(_))) => break "closed by server".to_string(),
                    _ => {}
                }
            }
        }
    };

    tracing::warn!(url = %url, reason = %reason, pending = pending.len(), "WS connection ended");
    for (_, waiter) in pending.drain() {
        waiter.fail(BackendError::WebSocket(reason.clone()));
    }
    subscriptions.clear();
}

fn handle_message(text: &str, pending: &mut HashMap<u64, Pending>, subscriptions: &SubscriptionManager) {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return;
    };

    if val.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &val["params"];
        if let Some(id) = params["subscription"].as_str() {
            let id = SubscriptionId(id.to_string());
            if !subscriptions.dispatch(&id, params["result"].clone()) {
                tracing::debug!(subscription = %id, "notification for unknown subscription");
            }
        }
        return;
    }

    let resp: JsonRpcResponse = match serde_json::from_value(val) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "unrecognised WS message");
            return;
        }
    };
    let RpcId::Number(id) = resp.id else {
        return;
    };
    let Some(waiter) = pending.remove(&id) else {
        return;
    };

    match waiter {
        Pending::Call(tx) => {
            let _ = tx.send(resp.into_result());
        }
        Pending::Subscribe(tx) => {
            let reply = resp.into_result().and_then(|result| {
                let id = result.as_str().ok_or_else(|| {
                    BackendError::Other(format!("eth_subscribe returned {result}"))
                })?;
                let id = SubscriptionId(id.to_string());
                let rx = subscriptions.register(id.clone());
                Ok((id, rx))
            });
            let _ = tx.send(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_are_routed_to_their_subscription() {
        let subs = SubscriptionManager::new();
        let mut pending = HashMap::new();
        let mut rx = subs.register(SubscriptionId("0xabc".into()));

        handle_message(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{"logIndex":"0x2"}}}"#,
            &mut pending,
            &subs,
        );
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch[0]["logIndex"], "0x2");
    }

    #[test]
    fn subscribe_response_registers_before_returning() {
        let subs = SubscriptionManager::new();
        let mut pending = HashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(7, Pending::Subscribe(tx));

        handle_message(r#"{"jsonrpc":"2.0","id":7,"result":"0x99"}"#, &mut pending, &subs);
        assert_eq!(subs.len(), 1);
        let (id, _batches) = rx.try_recv().unwrap().unwrap();
        assert_eq!(id, SubscriptionId("0x99".into()));
        assert!(pending.is_empty());
    }

    #[test]
    fn rpc_errors_reach_the_caller() {
        let subs = SubscriptionManager::new();
        let mut pending = HashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(3, Pending::Call(tx));

        handle_message(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"method not found"}}"#,
            &mut pending,
            &subs,
        );
        assert!(matches!(rx.try_recv().unwrap(), Err(BackendError::Rpc(e)) if e.code == -32601));
    }
}
