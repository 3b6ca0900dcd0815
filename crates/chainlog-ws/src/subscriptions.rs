//! Routing of `eth_subscription` notifications to log subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;

/// A subscription ID returned by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Entries = HashMap<SubscriptionId, mpsc::UnboundedSender<Vec<Value>>>;

/// Active log subscriptions, shared between the connection task and the
/// unsubscribe guards.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    entries: Arc<Mutex<Entries>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, id: SubscriptionId) -> mpsc::UnboundedReceiver<Vec<Value>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries().insert(id, tx);
        rx
    }

    /// Forward one notification result as a single-entry batch. Returns
    /// `false` when nobody is listening on `id`.
    pub fn dispatch(&self, id: &SubscriptionId, result: Value) -> bool {
        match self.entries().get(id) {
            Some(sender) => sender.send(vec![result]).is_ok(),
            None => false,
        }
    }

    /// Drop the subscription's sender, closing its channel. Returns `true`
    /// only for the call that actually removed it.
    pub fn remove(&self, id: &SubscriptionId) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Close every subscription channel.
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_dispatch() {
        let mgr = SubscriptionManager::new();
        let id = SubscriptionId("0xdeadbeef".into());
        let mut rx = mgr.register(id.clone());

        assert!(mgr.dispatch(&id, serde_json::json!({"logIndex": "0x1"})));

        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["logIndex"], "0x1");
        assert!(!mgr.dispatch(&SubscriptionId("0xother".into()), Value::Null));
    }

    #[test]
    fn remove_is_idempotent_and_closes_channel() {
        let mgr = SubscriptionManager::new();
        let id = SubscriptionId("0x1".into());
        let mut rx = mgr.register(id.clone());
        assert_eq!(mgr.len(), 1);
        assert!(mgr.remove(&id));
        assert!(!mgr.remove(&id));
        assert!(mgr.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn clear_closes_everything() {
        let mgr = SubscriptionManager::new();
        let mut a = mgr.register(SubscriptionId("0xa".into()));
        let mut b = mgr.register(SubscriptionId("0xb".into()));
        mgr.clear();
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
        assert!(mgr.is_empty());
    }
}
