//! Hub service loop
//!
//! Drains mesh events, routes frames to per-peer sessions, and sends back
//! whatever the session produced. Frames that fail to decode still get a
//! typed error response when a correlation id can be recovered; per-message
//! work runs in its own task so one slow daemon call never blocks the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use mw_protocol::{
    decode, encode, recover_correlation_id, DecodeError, ErrorResponse, MeshEvent, MeshTransport,
    Message, PeerId,
};
use mw_wallet_rpc::WalletRpc;

use crate::lease::WalletLease;
use crate::registry::OperatorRegistry;
use crate::session::OperatorSession;

pub struct HubService<G: WalletRpc + 'static> {
    transport: Arc<dyn MeshTransport>,
    lease: WalletLease<G>,
    registry: Arc<OperatorRegistry>,
    single_tenant: bool,
    sessions: Mutex<HashMap<PeerId, Arc<Mutex<OperatorSession<G>>>>>,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
}

impl<G: WalletRpc + 'static> HubService<G> {
    pub fn new(
        transport: Arc<dyn MeshTransport>,
        gateway: G,
        registry: Arc<OperatorRegistry>,
        single_tenant: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            lease: WalletLease::new(gateway),
            registry,
            single_tenant,
            sessions: Mutex::new(HashMap::new()),
            frames_in: AtomicU64::new(0),
            frames_out: AtomicU64::new(0),
        })
    }

    /// Drain mesh events until the transport closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<MeshEvent>) {
        info!(local = %self.transport.local_id(), "hub service running");
        while let Some(event) = events.recv().await {
            match event {
                MeshEvent::Message { from, payload } => {
                    self.frames_in.fetch_add(1, Ordering::Relaxed);
                    let service = Arc::clone(&self);
                    tokio::spawn(async move {
                        service.handle_frame(from, payload).await;
                    });
                }
                MeshEvent::PeerClosed { peer } => self.teardown_session(&peer).await,
            }
        }
        info!(
            frames_in = self.frames_in.load(Ordering::Relaxed),
            frames_out = self.frames_out.load(Ordering::Relaxed),
            "hub service stopped"
        );
    }

    async fn handle_frame(self: &Arc<Self>, from: PeerId, payload: Vec<u8>) {
        let msg = match decode(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = %from.short(), error = %e, "undecodable frame");
                self.reply_decode_error(&from, &payload, &e).await;
                return;
            }
        };

        debug!(peer = %from.short(), kind = %msg.kind(), "frame received");
        let session = self.session_for(&from).await;
        let response = session.lock().await.handle(msg).await;
        self.send_to(&from, &response).await;
    }

    /// Every inbound frame gets an answer; for garbage this is a typed
    /// error carrying whatever correlation id can be salvaged.
    async fn reply_decode_error(&self, peer: &PeerId, payload: &[u8], e: &DecodeError) {
        let correlation_id = recover_correlation_id(payload).unwrap_or_default();
        let response = Message::Error(ErrorResponse::new(correlation_id, e.to_string()));
        self.send_to(peer, &response).await;
    }

    async fn session_for(&self, peer: &PeerId) -> Arc<Mutex<OperatorSession<G>>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(sessions.entry(peer.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(OperatorSession::new(
                peer.clone(),
                self.lease.clone(),
                Arc::clone(&self.registry),
                self.single_tenant,
            )))
        }))
    }

    async fn teardown_session(&self, peer: &PeerId) {
        if let Some(session) = self.sessions.lock().await.remove(peer) {
            session.lock().await.close();
        }
    }

    async fn send_to(&self, to: &PeerId, msg: &Message) {
        let payload = match encode(msg) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "response failed to encode");
                return;
            }
        };
        match self.transport.send(to, payload).await {
            Ok(()) => {
                self.frames_out.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(peer = %to.short(), error = %e, "response undeliverable"),
        }
    }
}
