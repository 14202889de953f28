//! Mesh transport seam
//!
//! The protocol only needs store-and-forward delivery with eventual
//! success-or-recognized-failure; request/response pairing is done by
//! correlation id, so no ordering guarantee is required of the mesh.
//!
//! Two reference transports ship here: an in-process mesh for tests and
//! simulations, and a single-hop TCP transport for development deployments.
//! A real mesh stack plugs in behind [`MeshTransport`].

mod mem;
mod tcp;

pub use mem::{InProcEndpoint, InProcMesh};
pub use tcp::TcpMesh;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque peer identity on the mesh (hex identity hash or similar).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines. Ids are free-form strings, so the cut
    /// must land on a char boundary.
    pub fn short(&self) -> &str {
        let mut end = self.0.len().min(16);
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        &self.0[..end]
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Inbound transport events, delivered per attached endpoint.
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// A payload arrived from a peer.
    Message { from: PeerId, payload: Vec<u8> },
    /// The transport noticed a peer going away.
    PeerClosed { peer: PeerId },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer could not be resolved before the path deadline.
    #[error("no path to peer {0}")]
    NoPath(PeerId),

    /// The transport has shut down and can no longer deliver.
    #[error("transport closed")]
    Closed,
}

/// Outbound half of a mesh attachment. Inbound traffic arrives on the
/// event receiver handed out when the endpoint was created.
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// This endpoint's own identity on the mesh.
    fn local_id(&self) -> &PeerId;

    /// Hand a payload to the mesh for delivery to `to`. Resolution and
    /// delivery may take arbitrarily long; an `Ok` means the transport
    /// accepted responsibility, not that the peer has read it.
    async fn send(&self, to: &PeerId, payload: Vec<u8>) -> Result<(), TransportError>;
}
