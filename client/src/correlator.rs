//! Request correlator
//!
//! The mesh gives no ordering or pairing guarantees, so every request
//! carries a fresh correlation id and parks a one-shot slot here until the
//! matching response arrives or the deadline passes. Transport send happens
//! inside the same deadline: an unresolvable hub and a silent hub both
//! surface as the one timeout the operator can reason about.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use mw_protocol::{decode, encode, CodecError, MeshEvent, MeshTransport, Message, PeerId, TransportError};

/// Deadline for one request/response exchange over the mesh. Store-and-
/// forward delivery is slow; this is an operator-patience bound, not an
/// RTT estimate.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No response within the deadline, or the hub was never reachable.
    #[error("Request timed out")]
    Timeout,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Matches responses to in-flight requests by correlation id.
pub struct Correlator {
    transport: Arc<dyn MeshTransport>,
    hub: PeerId,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Message>>>,
}

impl Correlator {
    pub fn new(transport: Arc<dyn MeshTransport>, hub: PeerId) -> Arc<Self> {
        Arc::new(Self {
            transport,
            hub,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Send one request and wait for its response. The pending slot is
    /// removed on every exit path, so a response landing after a timeout
    /// finds no slot and is logged as an anomaly instead of leaking.
    pub async fn send_request(
        &self,
        msg: Message,
        timeout: Duration,
    ) -> Result<Message, RequestError> {
        let correlation_id = msg.correlation_id();
        let payload = encode(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(correlation_id, tx);
        debug!(kind = %msg.kind(), %correlation_id, "request sent");

        let outcome = tokio::time::timeout(timeout, async {
            match self.transport.send(&self.hub, payload).await {
                Ok(()) => {}
                // An unresolvable hub and a silent hub look the same to the
                // operator: the one timeout.
                Err(TransportError::NoPath(_)) => return Err(RequestError::Timeout),
                Err(e) => return Err(e.into()),
            }
            rx.await.map_err(|_| RequestError::Timeout)
        })
        .await;

        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&correlation_id);

        match outcome {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout),
        }
    }

    /// Route one inbound response to its waiting request, if any.
    pub fn handle_inbound(&self, msg: Message) {
        let correlation_id = msg.correlation_id();
        let slot = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&correlation_id);
        match slot {
            Some(tx) => {
                // A timed-out waiter may already be gone.
                let _ = tx.send(msg);
            }
            None => warn!(
                kind = %msg.kind(),
                %correlation_id,
                "response with no pending request"
            ),
        }
    }

    /// Drain the transport event stream into the correlator until the
    /// transport closes.
    pub fn spawn_pump(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<MeshEvent>) -> JoinHandle<()> {
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    MeshEvent::Message { from, payload } => match decode(&payload) {
                        Ok(msg) if !msg.is_request() => correlator.handle_inbound(msg),
                        Ok(msg) => {
                            warn!(from = %from.short(), kind = %msg.kind(), "request kind at client")
                        }
                        Err(e) => warn!(from = %from.short(), error = %e, "undecodable frame"),
                    },
                    MeshEvent::PeerClosed { peer } => {
                        debug!(peer = %peer.short(), "peer went away");
                    }
                }
            }
        })
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_protocol::transport::InProcMesh;
    use mw_protocol::{BalanceRequest, BalanceResponse};

    fn hub_id() -> PeerId {
        PeerId::from("hub")
    }

    /// A hub that answers every balance request with a canned response.
    fn spawn_echo_hub(mesh: &InProcMesh) {
        let (endpoint, mut events) = mesh.attach(hub_id());
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let MeshEvent::Message { from, payload } = event {
                    let Ok(msg) = decode(&payload) else { continue };
                    let response = Message::BalanceResponse(BalanceResponse::ok(
                        msg.correlation_id(),
                        1.5,
                        1.0,
                        99,
                    ));
                    let _ = endpoint.send(&from, encode(&response).unwrap()).await;
                }
            }
        });
    }

    #[tokio::test]
    async fn test_response_is_matched_by_correlation_id() {
        let mesh = InProcMesh::new();
        spawn_echo_hub(&mesh);
        let (endpoint, events) = mesh.attach("client");
        let correlator = Correlator::new(Arc::new(endpoint), hub_id());
        correlator.spawn_pump(events);

        let request = Message::BalanceRequest(BalanceRequest::new("alice"));
        let correlation_id = request.correlation_id();
        let response = correlator
            .send_request(request, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.correlation_id(), correlation_id);
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_unresolvable_hub_surfaces_as_timeout() {
        // No hub ever attaches; the path wait burns the whole deadline.
        let mesh = InProcMesh::with_path_timeout(Duration::from_secs(60));
        let (endpoint, events) = mesh.attach("client");
        let correlator = Correlator::new(Arc::new(endpoint), hub_id());
        correlator.spawn_pump(events);

        let err = correlator
            .send_request(
                Message::BalanceRequest(BalanceRequest::new("alice")),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request timed out");
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_no_path_before_request_deadline_surfaces_as_timeout() {
        // The path deadline fires well before the request deadline; the
        // caller must still see the one timeout, not a transport error.
        let mesh = InProcMesh::with_path_timeout(Duration::from_millis(50));
        let (endpoint, events) = mesh.attach("client");
        let correlator = Correlator::new(Arc::new(endpoint), hub_id());
        correlator.spawn_pump(events);

        let err = correlator
            .send_request(
                Message::BalanceRequest(BalanceRequest::new("alice")),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request timed out");
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_silent_hub_surfaces_as_timeout() {
        let mesh = InProcMesh::new();
        let (_hub, _hub_events) = mesh.attach(hub_id());
        let (endpoint, events) = mesh.attach("client");
        let correlator = Correlator::new(Arc::new(endpoint), hub_id());
        correlator.spawn_pump(events);

        let err = correlator
            .send_request(
                Message::BalanceRequest(BalanceRequest::new("alice")),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Timeout));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_response_is_dropped() {
        let mesh = InProcMesh::new();
        let (endpoint, _events) = mesh.attach("client");
        let correlator = Correlator::new(Arc::new(endpoint), hub_id());

        correlator.handle_inbound(Message::BalanceResponse(BalanceResponse::ok(
            Uuid::new_v4(),
            1.0,
            1.0,
            1,
        )));
        assert_eq!(correlator.pending_len(), 0);
    }
}
