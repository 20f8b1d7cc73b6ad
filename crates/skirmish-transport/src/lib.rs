//! Client connections for Skirmish.
//!
//! The server is written against [`Transport`] (hands out connections) and
//! [`Connection`] (moves whole frames). The `websocket` feature, on by
//! default, provides the browser-facing implementation.

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{TransportConfig, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;

/// Identifies one client connection for its whole lifetime.
///
/// Ordering by id is ordering by connection age; the simulation breaks
/// ties with it. The raw value doubles as the player's public id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener producing ready-to-use connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client and completes any upgrade handshake.
    ///
    /// An error concerns that one client; the listener stays usable.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address this transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// A framed, bidirectional client connection.
///
/// `send` and `recv` may run concurrently on the same connection.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Writes one frame.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Next inbound frame, or `None` once the peer has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// Session tokens are bound to this address's IP.
    fn peer_addr(&self) -> SocketAddr;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_connection_id_display_prefixes_conn() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).into_inner(), 7);
    }

    #[test]
    fn test_connection_id_btreemap_iterates_oldest_first() {
        let mut players = BTreeMap::new();
        for raw in [9, 2, 5] {
            players.insert(ConnectionId::new(raw), raw);
        }
        let order: Vec<u64> = players.into_values().collect();
        assert_eq!(order, vec![2, 5, 9]);
    }
}
