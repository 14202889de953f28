//! In-process mesh
//!
//! Routes payloads between endpoints attached to the same [`InProcMesh`].
//! Delivery to a peer that has not attached yet waits on a single path
//! deadline, woken by a [`Notify`] when any peer attaches, rather than
//! polling. Used by the test suites and by workflow simulations.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use super::{MeshEvent, MeshTransport, PeerId, TransportError};

/// Default time to wait for an unattached peer before giving up.
const DEFAULT_PATH_TIMEOUT: Duration = Duration::from_secs(30);

struct MeshInner {
    peers: Mutex<HashMap<PeerId, mpsc::UnboundedSender<MeshEvent>>>,
    attached: Notify,
    path_timeout: Duration,
}

/// Shared in-process mesh; clone-cheap handle.
#[derive(Clone)]
pub struct InProcMesh {
    inner: Arc<MeshInner>,
}

impl InProcMesh {
    pub fn new() -> Self {
        Self::with_path_timeout(DEFAULT_PATH_TIMEOUT)
    }

    pub fn with_path_timeout(path_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(MeshInner {
                peers: Mutex::new(HashMap::new()),
                attached: Notify::new(),
                path_timeout,
            }),
        }
    }

    /// Attach an endpoint under `id`, returning its outbound half and the
    /// inbound event stream. Attaching wakes senders waiting for a path.
    pub fn attach(&self, id: impl Into<PeerId>) -> (InProcEndpoint, mpsc::UnboundedReceiver<MeshEvent>) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .peers
            .lock()
            .expect("mesh peer table poisoned")
            .insert(id.clone(), tx);
        self.inner.attached.notify_waiters();
        debug!(peer = %id.short(), "peer attached to in-proc mesh");
        (
            InProcEndpoint {
                id,
                inner: Arc::clone(&self.inner),
            },
            rx,
        )
    }

    /// Detach a peer; every remaining peer observes `PeerClosed`.
    pub fn detach(&self, id: &PeerId) {
        let mut peers = self.inner.peers.lock().expect("mesh peer table poisoned");
        if peers.remove(id).is_some() {
            for tx in peers.values() {
                let _ = tx.send(MeshEvent::PeerClosed { peer: id.clone() });
            }
            debug!(peer = %id.short(), "peer detached from in-proc mesh");
        }
    }
}

impl Default for InProcMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// One attached endpoint's outbound half.
pub struct InProcEndpoint {
    id: PeerId,
    inner: Arc<MeshInner>,
}

impl InProcEndpoint {
    fn try_deliver(&self, to: &PeerId, event: MeshEvent) -> Option<Result<(), TransportError>> {
        let peers = self.inner.peers.lock().expect("mesh peer table poisoned");
        let tx = peers.get(to)?;
        Some(tx.send(event).map_err(|_| TransportError::Closed))
    }
}

#[async_trait]
impl MeshTransport for InProcEndpoint {
    fn local_id(&self) -> &PeerId {
        &self.id
    }

    async fn send(&self, to: &PeerId, payload: Vec<u8>) -> Result<(), TransportError> {
        let deadline = tokio::time::Instant::now() + self.inner.path_timeout;
        loop {
            // Arm the notification before the lookup so an attach between
            // lookup and await cannot be missed.
            let attached = self.inner.attached.notified();
            let event = MeshEvent::Message {
                from: self.id.clone(),
                payload: payload.clone(),
            };
            if let Some(result) = self.try_deliver(to, event) {
                return result;
            }
            if tokio::time::timeout_at(deadline, attached).await.is_err() {
                return Err(TransportError::NoPath(to.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_between_attached_peers() {
        let mesh = InProcMesh::new();
        let (a, _a_rx) = mesh.attach("aaaa");
        let (_b, mut b_rx) = mesh.attach("bbbb");

        a.send(&PeerId::from("bbbb"), b"hello".to_vec()).await.unwrap();

        match b_rx.recv().await.unwrap() {
            MeshEvent::Message { from, payload } => {
                assert_eq!(from.as_str(), "aaaa");
                assert_eq!(payload, b"hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_waits_for_late_attach() {
        let mesh = InProcMesh::with_path_timeout(Duration::from_secs(5));
        let (a, _a_rx) = mesh.attach("aaaa");

        let mesh2 = mesh.clone();
        let attacher = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            mesh2.attach("late")
        });

        a.send(&PeerId::from("late"), b"queued".to_vec()).await.unwrap();

        let (_late, mut late_rx) = attacher.await.unwrap();
        match late_rx.recv().await.unwrap() {
            MeshEvent::Message { payload, .. } => assert_eq!(payload, b"queued"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_to_unresolvable_peer_times_out() {
        let mesh = InProcMesh::with_path_timeout(Duration::from_millis(50));
        let (a, _a_rx) = mesh.attach("aaaa");

        match a.send(&PeerId::from("nowhere"), vec![1]).await {
            Err(TransportError::NoPath(peer)) => assert_eq!(peer.as_str(), "nowhere"),
            other => panic!("expected NoPath, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detach_notifies_remaining_peers() {
        let mesh = InProcMesh::new();
        let (_a, mut a_rx) = mesh.attach("aaaa");
        let (_b, _b_rx) = mesh.attach("bbbb");

        mesh.detach(&PeerId::from("bbbb"));

        match a_rx.recv().await.unwrap() {
            MeshEvent::PeerClosed { peer } => assert_eq!(peer.as_str(), "bbbb"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
