//! Single-hop TCP transport
//!
//! Development stand-in for a real mesh stack: length-prefixed frames over
//! TCP, with a hello frame carrying each side's peer id. No relaying and no
//! store-and-forward; a send to a peer without a live connection fails with
//! `NoPath` immediately.

use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::mpsc,
};
use tracing::{debug, warn};

use super::{MeshEvent, MeshTransport, PeerId, TransportError};

/// Upper bound on a single frame; outputs blobs can be large but bounded.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub struct TcpMesh {
    local: PeerId,
    peers: Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl TcpMesh {
    /// Listen for inbound peers (hub side). Returns the transport, the
    /// inbound event stream, and the bound address.
    pub async fn listen(
        local: PeerId,
        addr: &str,
    ) -> io::Result<(Arc<Self>, mpsc::UnboundedReceiver<MeshEvent>, SocketAddr)> {
        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mesh = Arc::new(Self {
            local,
            peers: Arc::new(Mutex::new(HashMap::new())),
        });

        let accept_mesh = Arc::clone(&mesh);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        debug!(%remote, "inbound transport connection");
                        let mesh = Arc::clone(&accept_mesh);
                        let events = events_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = mesh.run_connection(stream, events).await {
                                debug!("connection ended: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                        break;
                    }
                }
            }
        });

        Ok((mesh, events_rx, bound))
    }

    /// Dial a single peer (client side).
    pub async fn connect(
        local: PeerId,
        addr: &str,
    ) -> io::Result<(Arc<Self>, mpsc::UnboundedReceiver<MeshEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mesh = Arc::new(Self {
            local,
            peers: Arc::new(Mutex::new(HashMap::new())),
        });

        let conn_mesh = Arc::clone(&mesh);
        tokio::spawn(async move {
            if let Err(e) = conn_mesh.run_connection(stream, events_tx).await {
                debug!("connection ended: {e}");
            }
        });

        Ok((mesh, events_rx))
    }

    /// Drive one connection: exchange hellos, pump frames both ways, emit
    /// `PeerClosed` when the socket goes away.
    async fn run_connection(
        &self,
        stream: TcpStream,
        events: mpsc::UnboundedSender<MeshEvent>,
    ) -> io::Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        write_frame(&mut writer, self.local.as_str().as_bytes()).await?;
        let hello = read_frame(&mut reader).await?;
        let peer = PeerId::new(String::from_utf8(hello).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, "peer hello is not utf-8")
        })?);
        debug!(peer = %peer.short(), "transport link established");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.peers
            .lock()
            .expect("peer table poisoned")
            .insert(peer.clone(), out_tx);

        let write_peer = peer.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    debug!(peer = %write_peer.short(), "write failed: {e}");
                    break;
                }
            }
        });

        let result = loop {
            tokio::select! {
                frame = read_frame(&mut reader) => match frame {
                    Ok(payload) => {
                        if events
                            .send(MeshEvent::Message {
                                from: peer.clone(),
                                payload,
                            })
                            .is_err()
                        {
                            break Ok(());
                        }
                    }
                    Err(e) => break Err(e),
                },
                // The event receiver is gone; this endpoint is shutting down.
                _ = events.closed() => break Ok(()),
            }
        };

        self.peers.lock().expect("peer table poisoned").remove(&peer);
        let _ = events.send(MeshEvent::PeerClosed { peer: peer.clone() });
        writer_task.abort();

        match result {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
            other => other,
        }
    }
}

#[async_trait]
impl MeshTransport for TcpMesh {
    fn local_id(&self) -> &PeerId {
        &self.local
    }

    async fn send(&self, to: &PeerId, payload: Vec<u8>) -> Result<(), TransportError> {
        let tx = {
            let peers = self.peers.lock().expect("peer table poisoned");
            peers.get(to).cloned()
        };
        match tx {
            Some(tx) => tx.send(payload).map_err(|_| TransportError::Closed),
            None => Err(TransportError::NoPath(to.clone())),
        }
    }
}

async fn write_frame(writer: &mut OwnedWriteHalf, payload: &[u8]) -> io::Result<()> {
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

async fn read_frame(reader: &mut OwnedReadHalf) -> io::Result<Vec<u8>> {
    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_roundtrip_and_close() {
        let (hub, mut hub_events, addr) = TcpMesh::listen(PeerId::from("hub0"), "127.0.0.1:0")
            .await
            .unwrap();
        let (client, mut client_events) =
            TcpMesh::connect(PeerId::from("cli0"), &addr.to_string())
                .await
                .unwrap();

        client.send(&PeerId::from("hub0"), b"ping".to_vec()).await.unwrap();

        let from = match hub_events.recv().await.unwrap() {
            MeshEvent::Message { from, payload } => {
                assert_eq!(payload, b"ping");
                from
            }
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(from.as_str(), "cli0");

        hub.send(&from, b"pong".to_vec()).await.unwrap();
        match client_events.recv().await.unwrap() {
            MeshEvent::Message { payload, .. } => assert_eq!(payload, b"pong"),
            other => panic!("unexpected event: {:?}", other),
        }

        drop(client);
        drop(client_events);
        // The hub should observe the disconnect.
        loop {
            match hub_events.recv().await.unwrap() {
                MeshEvent::PeerClosed { peer } => {
                    assert_eq!(peer.as_str(), "cli0");
                    break;
                }
                MeshEvent::Message { .. } => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_tcp_send_without_link_is_no_path() {
        let (hub, _events, _addr) = TcpMesh::listen(PeerId::from("hub0"), "127.0.0.1:0")
            .await
            .unwrap();
        assert!(matches!(
            hub.send(&PeerId::from("ghost"), vec![0]).await,
            Err(TransportError::NoPath(_))
        ));
    }
}
