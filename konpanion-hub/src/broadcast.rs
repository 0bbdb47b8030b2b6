/**
 * BROADCAST HUB - Fan-out des événements vers les viewers live
 *
 * RÔLE :
 * Maintient l'ensemble des viewers connectés (WebSocket dashboard) et pousse
 * chaque événement accepté à tous. Un viewer qui n'accepte pas la livraison
 * (file fermée, timeout) est retiré après la passe de livraison.
 *
 * FONCTIONNEMENT :
 * - Chaque viewer = identité UUID + file bornée vers sa tâche d'écriture
 * - broadcast() itère sur une copie de l'ensemble (ajouts/retraits concurrents
 *   sans effet sur la passe en cours)
 * - Un verrou async sérialise acceptation + broadcast : ordre préservé par viewer
 * - Livraisons concurrentes entre viewers, aucune ne bloque les autres
 */

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ViewerId = Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("viewer channel closed")]
    Closed,
    #[error("viewer did not accept message within {0:?}")]
    Timeout(Duration),
}

/// Handle vers un viewer connecté
#[derive(Debug, Clone)]
pub struct ViewerHandle {
    id: ViewerId,
    tx: mpsc::Sender<Arc<str>>,
}

impl ViewerHandle {
    /// Crée un handle et la file côté transport
    pub fn channel(queue: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Livre un message ; échec si la file est fermée ou reste pleine trop longtemps
    pub async fn deliver(&self, msg: Arc<str>, timeout: Duration) -> Result<(), DeliveryError> {
        self.tx.send_timeout(msg, timeout).await.map_err(|e| match e {
            mpsc::error::SendTimeoutError::Closed(_) => DeliveryError::Closed,
            mpsc::error::SendTimeoutError::Timeout(_) => DeliveryError::Timeout(timeout),
        })
    }
}

/// Bilan d'un broadcast (logs + tests)
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

pub struct BroadcastHub {
    viewers: Mutex<HashMap<ViewerId, ViewerHandle>>,
    delivery: tokio::sync::Mutex<()>,
    delivery_timeout: Duration,
}

pub type SharedBroadcastHub = Arc<BroadcastHub>;

impl BroadcastHub {
    pub fn new(delivery_timeout: Duration) -> Self {
        Self {
            viewers: Mutex::new(HashMap::new()),
            delivery: tokio::sync::Mutex::new(()),
            delivery_timeout,
        }
    }

    /// Idempotent : un même handle n'est membre qu'une fois
    pub fn add(&self, handle: ViewerHandle) {
        let mut viewers = self.viewers.lock();
        let id = handle.id();
        if viewers.insert(id, handle).is_none() {
            tracing::info!(viewer = %id, total = viewers.len(), "viewer connected");
        }
    }

    /// Retirer un viewer absent n'est pas une erreur
    pub fn remove(&self, id: &ViewerId) {
        let mut viewers = self.viewers.lock();
        if viewers.remove(id).is_some() {
            tracing::info!(viewer = %id, total = viewers.len(), "viewer disconnected");
        }
    }

    pub fn contains(&self, id: &ViewerId) -> bool {
        self.viewers.lock().contains_key(id)
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().len()
    }

    /// Pousse `msg` à tous les viewers ; None ou message vide = no-op
    pub async fn broadcast<T: Serialize>(&self, msg: Option<&T>) -> BroadcastReport {
        let _ordering = self.delivery.lock().await;
        self.deliver_all(msg).await
    }

    /// Accepte puis diffuse sous le même verrou d'ordre : les viewers reçoivent
    /// les messages dans l'ordre où `accept` a été exécuté
    pub async fn accept_then_broadcast<T, F>(&self, accept: F) -> BroadcastReport
    where
        T: Serialize,
        F: FnOnce() -> Option<T>,
    {
        let _ordering = self.delivery.lock().await;
        let msg = accept();
        self.deliver_all(msg.as_ref()).await
    }

    // appelant détenteur de `delivery`
    async fn deliver_all<T: Serialize>(&self, msg: Option<&T>) -> BroadcastReport {
        let Some(msg) = msg else {
            return BroadcastReport::default();
        };
        let payload: Arc<str> = match serde_json::to_string(msg) {
            Ok(json) if !is_empty_json(&json) => json.into(),
            Ok(_) => return BroadcastReport::default(),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize broadcast message");
                return BroadcastReport::default();
            }
        };

        // copie à l'instant t de l'ensemble des membres
        let targets: Vec<ViewerHandle> = self.viewers.lock().values().cloned().collect();
        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let timeout = self.delivery_timeout;
        let results = join_all(targets.iter().map(|viewer| {
            let payload = payload.clone();
            async move { (viewer.id(), viewer.deliver(payload, timeout).await) }
        }))
        .await;

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(viewer = %id, error = %e, "delivery failed, dropping viewer");
                    dead.push(id);
                }
            }
        }

        // retrait après la passe, jamais pendant l'itération
        if !dead.is_empty() {
            let mut viewers = self.viewers.lock();
            for id in &dead {
                viewers.remove(id);
            }
            report.pruned = dead.len();
        }

        report
    }
}

fn is_empty_json(json: &str) -> bool {
    matches!(json, "null" | "{}" | "[]" | "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hub() -> BroadcastHub {
        BroadcastHub::new(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_dead_viewer_is_pruned_others_delivered() {
        let hub = hub();
        let (v1, mut rx1) = ViewerHandle::channel(8);
        let (v2, rx2) = ViewerHandle::channel(8);
        let (v3, mut rx3) = ViewerHandle::channel(8);
        let dead_id = v2.id();
        drop(rx2);

        hub.add(v1);
        hub.add(v2);
        hub.add(v3);

        let report = hub.broadcast(Some(&json!({"device_id": "VAEL-01"}))).await;
        assert_eq!(report, BroadcastReport { delivered: 2, pruned: 1 });
        assert!(!hub.contains(&dead_id));
        assert_eq!(hub.viewer_count(), 2);

        assert_eq!(&*rx1.recv().await.unwrap(), r#"{"device_id":"VAEL-01"}"#);
        assert_eq!(&*rx3.recv().await.unwrap(), r#"{"device_id":"VAEL-01"}"#);
    }

    #[tokio::test]
    async fn test_empty_message_is_noop() {
        let hub = hub();
        let (v1, mut rx1) = ViewerHandle::channel(8);
        hub.add(v1);

        let none: Option<&serde_json::Value> = None;
        assert_eq!(hub.broadcast(none).await, BroadcastReport::default());
        assert_eq!(hub.broadcast(Some(&json!({}))).await, BroadcastReport::default());
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_add_is_idempotent_and_remove_absent_is_noop() {
        let hub = hub();
        let (v1, _rx1) = ViewerHandle::channel(8);
        hub.add(v1.clone());
        hub.add(v1.clone());
        assert_eq!(hub.viewer_count(), 1);

        hub.remove(&v1.id());
        hub.remove(&v1.id());
        hub.remove(&Uuid::new_v4());
        assert_eq!(hub.viewer_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_viewer_times_out() {
        let hub = hub();
        let (slow, _rx_slow) = ViewerHandle::channel(1);
        let (fast, mut rx_fast) = ViewerHandle::channel(8);
        let slow_id = slow.id();
        hub.add(slow);
        hub.add(fast);

        // la première remplit la file du viewer lent
        let first = hub.broadcast(Some(&json!({"n": 1}))).await;
        assert_eq!(first.delivered, 2);

        let second = hub.broadcast(Some(&json!({"n": 2}))).await;
        assert_eq!(second, BroadcastReport { delivered: 1, pruned: 1 });
        assert!(!hub.contains(&slow_id));

        assert_eq!(&*rx_fast.recv().await.unwrap(), r#"{"n":1}"#);
        assert_eq!(&*rx_fast.recv().await.unwrap(), r#"{"n":2}"#);
    }

    #[tokio::test]
    async fn test_per_viewer_order_matches_broadcast_order() {
        let hub = hub();
        let (v1, mut rx1) = ViewerHandle::channel(64);
        hub.add(v1);

        for n in 0..20 {
            hub.broadcast(Some(&json!({ "n": n }))).await;
        }
        for n in 0..20 {
            let msg = rx1.recv().await.unwrap();
            assert_eq!(&*msg, format!(r#"{{"n":{}}}"#, n));
        }
    }
}
