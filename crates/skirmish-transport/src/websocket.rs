//! WebSocket transport on `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// Limits applied to every accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Inbound frames longer than this are refused.
    pub max_frame_bytes: usize,
    /// How long a peer may take to finish the HTTP upgrade.
    pub upgrade_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024,
            upgrade_timeout: Duration::from_secs(5),
        }
    }
}

/// Listens for WebSocket clients.
///
/// Connection ids start at 1 and increase with every accepted peer, so they
/// double as an age ordering.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: TransportConfig,
    next_id: u64,
}

impl WebSocketTransport {
    /// Binds with [`TransportConfig::default`].
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, TransportConfig::default()).await
    }

    pub async fn bind_with(addr: &str, config: TransportConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, max_frame_bytes = config.max_frame_bytes, "listening for WebSocket clients");
        Ok(Self {
            listener,
            config,
            next_id: 1,
        })
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (tcp, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::trace!(%peer, error = %e, "could not disable Nagle");
        }

        let upgrade = tokio_tungstenite::accept_async(tcp);
        let ws = match tokio::time::timeout(self.config.upgrade_timeout, upgrade).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(source)) => return Err(TransportError::Upgrade { peer, source }),
            Err(_) => return Err(TransportError::UpgradeTimeout(peer)),
        };

        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        tracing::debug!(conn_id = %id, %peer, "WebSocket client connected");

        let (sink, stream) = ws.split();
        Ok(WebSocketConnection {
            id,
            peer,
            max_frame_bytes: self.config.max_frame_bytes,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// One upgraded client socket.
///
/// Read and write halves sit behind separate locks: a task parked in
/// `recv` never holds up an outbound frame.
pub struct WebSocketConnection {
    id: ConnectionId,
    peer: SocketAddr,
    max_frame_bytes: usize,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketConnection {
    fn check_len(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // JSON goes out as text; anything else as binary.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.lock().await.send(msg).await.map_err(TransportError::Send)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        while let Some(msg) = stream.next().await {
            match msg.map_err(TransportError::Receive)? {
                Message::Text(text) => {
                    self.check_len(text.len())?;
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Message::Binary(data) => {
                    self.check_len(data.len())?;
                    return Ok(Some(data.to_vec()));
                }
                Message::Close(_) => return Ok(None),
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(TransportError::Send)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}
