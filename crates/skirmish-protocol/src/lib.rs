//! Wire protocol for Skirmish.
//!
//! This crate defines the message contract between the browser client and
//! the authoritative server:
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`Snapshot`], ...):
//!   the frames that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those frames are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding or
//!   validating a frame.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (ClientEvent) → Server handlers → Lobby
//! Lobby → projection (Snapshot) → Protocol (ServerEvent) → Transport
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    BuffView, BulletView, ClientEvent, CursorReport, Direction, JoinAck,
    LobbyId, LobbyListEntry, MAX_LOBBY_ID_LEN, MovePacket, MovementView,
    PlayerView, Point, PowerupView, ServerEvent, Snapshot, Toggle,
};
