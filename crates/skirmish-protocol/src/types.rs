//! Core protocol types for Skirmish's real-time message contract.
//!
//! Every frame on the wire is a JSON object with an `event` name and an
//! optional `data` payload:
//!
//! ```text
//! { "event": "move", "data": { "direction": "up", "enable": "1" } }
//! ```
//!
//! Client→server frames decode into [`ClientEvent`], server→client frames
//! are built from [`ServerEvent`]. The snapshot types at the bottom of this
//! module are the *only* view of a lobby a client ever sees.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Longest lobby id a client may reference.
pub const MAX_LOBBY_ID_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of a lobby (one match instance).
///
/// Private lobbies get a short random alphanumeric id; public lobbies are
/// named `public-<n>`. Serialized as a plain string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LobbyId(String);

impl LobbyId {
    /// Wraps a raw id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that the id is something the server could have issued.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let ok = !self.0.is_empty()
            && self.0.len() <= MAX_LOBBY_ID_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if ok {
            Ok(())
        } else {
            Err(ProtocolError::InvalidMessage(format!(
                "malformed lobby id {:?}",
                self.0
            )))
        }
    }
}

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Client payloads
// ---------------------------------------------------------------------------

/// One of the four movement keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

/// The `"0"` / `"1"` flag clients send for key-down/key-up style input.
///
/// Anything other than those two exact strings fails to decode, which the
/// server treats as a malformed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Toggle {
    #[serde(rename = "0")]
    Off,
    #[serde(rename = "1")]
    On,
}

impl Toggle {
    /// `true` for `"1"`.
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Payload of a `move` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovePacket {
    pub direction: Direction,
    pub enable: Toggle,
}

/// Payload of a `cursor` event: the mouse offset from the centre of the
/// player's screen, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorReport {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Everything a client may send.
///
/// `#[serde(tag = "event", content = "data")]` produces the adjacently
/// tagged `{ "event": ..., "data": ... }` shape; unit variants such as
/// `lobbies` carry no `data` at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ClientEvent {
    /// Binds the connection to the account behind a session token.
    Authenticate(String),
    /// Spawns the caller into a lobby.
    Join(LobbyId),
    /// Presses or releases a movement key.
    Move(MovePacket),
    /// Reports the current cursor offset.
    Cursor(CursorReport),
    /// Starts or stops firing.
    Fire(Toggle),
    /// Sends a chat line to the caller's lobby.
    Chat(String),
    /// Latency ping; the token is echoed back in a `pong`.
    Ping(u64),
    /// Requests the list of public lobbies.
    Lobbies,
}

impl ClientEvent {
    /// The wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::Join(_) => "join",
            Self::Move(_) => "move",
            Self::Cursor(_) => "cursor",
            Self::Fire(_) => "fire",
            Self::Chat(_) => "chat",
            Self::Ping(_) => "ping",
            Self::Lobbies => "lobbies",
        }
    }

    /// Checks the constraints serde cannot express on its own.
    ///
    /// Decoding already guarantees the shape; this rejects values that are
    /// well-typed but could never come from a legitimate client.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Authenticate(token) if token.is_empty() => Err(
                ProtocolError::InvalidMessage("empty session token".into()),
            ),
            Self::Join(lobby_id) => lobby_id.validate(),
            Self::Cursor(report)
                if !report.x.is_finite() || !report.y.is_finite() =>
            {
                Err(ProtocolError::InvalidMessage(
                    "cursor offset is not finite".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Sent in reply to a successful `join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    /// The joining connection's public id; the key of its own entry in
    /// [`Snapshot::players`].
    pub id: u64,
    /// The lobby that was joined.
    pub lobby: LobbyId,
}

/// One row of the public lobby listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyListEntry {
    pub id: LobbyId,
    pub players: usize,
}

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Sterilized lobby state, once per tick.
    Game(Snapshot),
    /// A formatted `username: text` line or a system notice.
    #[serde(rename = "chatmessage")]
    ChatMessage(String),
    /// Human-readable reason, usually followed by a forced disconnect.
    Error(String),
    /// Join acknowledgment.
    Ack(JoinAck),
    /// Reply to `ping`, echoing the client's token.
    Pong(u64),
    /// Reply to `lobbies`.
    Lobbies(Vec<LobbyListEntry>),
}

// ---------------------------------------------------------------------------
// Snapshot: the client-visible projection of a lobby
// ---------------------------------------------------------------------------

/// A point or offset in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Which movement keys a player is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementView {
    pub up: bool,
    pub right: bool,
    pub down: bool,
    pub left: bool,
}

/// The only buff information a client gets: whether the player moves
/// faster than normal. Other buff kinds and all timers stay server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuffView {
    pub speed: bool,
}

/// Public view of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub username: String,
    pub health: f64,
    pub position: Point,
    pub movement: MovementView,
    pub firecd: u32,
    pub buffs: BuffView,
}

/// Public view of one bullet: where it is and where it is going.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulletView {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

/// Public view of one powerup. The buff it grants is not revealed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerupView {
    pub position: Point,
}

/// The sterilized state of one lobby, rebuilt every tick.
///
/// Players are keyed by their public connection id (the `id` in
/// [`JoinAck`]); a `BTreeMap` keeps the key order stable across ticks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub players: BTreeMap<u64, PlayerView>,
    pub bullets: Vec<BulletView>,
    pub powerups: Vec<PowerupView>,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The client speaks exact JSON shapes; these tests pin them down.

    use super::*;

    fn decode(json: &str) -> Result<ClientEvent, serde_json::Error> {
        serde_json::from_str(json)
    }

    // =====================================================================
    // ClientEvent decoding
    // =====================================================================

    #[test]
    fn test_decode_move_packet() {
        let event =
            decode(r#"{"event":"move","data":{"direction":"left","enable":"1"}}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::Move(MovePacket {
                direction: Direction::Left,
                enable: Toggle::On,
            })
        );
    }

    #[test]
    fn test_decode_move_with_numeric_enable_fails() {
        // The flag is the string "1", never the number 1.
        let result =
            decode(r#"{"event":"move","data":{"direction":"up","enable":1}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_move_with_unknown_direction_fails() {
        let result = decode(
            r#"{"event":"move","data":{"direction":"sideways","enable":"0"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_fire_accepts_only_zero_or_one() {
        assert_eq!(
            decode(r#"{"event":"fire","data":"0"}"#).unwrap(),
            ClientEvent::Fire(Toggle::Off)
        );
        assert!(decode(r#"{"event":"fire","data":"2"}"#).is_err());
        assert!(decode(r#"{"event":"fire","data":true}"#).is_err());
    }

    #[test]
    fn test_decode_cursor_requires_both_axes() {
        assert!(decode(r#"{"event":"cursor","data":{"x":3.5}}"#).is_err());
        assert_eq!(
            decode(r#"{"event":"cursor","data":{"x":3.5,"y":-2}}"#).unwrap(),
            ClientEvent::Cursor(CursorReport { x: 3.5, y: -2.0 })
        );
    }

    #[test]
    fn test_decode_lobbies_without_data() {
        assert_eq!(
            decode(r#"{"event":"lobbies"}"#).unwrap(),
            ClientEvent::Lobbies
        );
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        assert!(decode(r#"{"event":"teleport","data":{"x":0}}"#).is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode("not json at all").is_err());
    }

    // =====================================================================
    // ClientEvent validation
    // =====================================================================

    #[test]
    fn test_validate_rejects_empty_token() {
        let event = ClientEvent::Authenticate(String::new());
        assert!(matches!(
            event.validate(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_validate_rejects_malformed_lobby_id() {
        let event = ClientEvent::Join(LobbyId::new("../../etc"));
        assert!(event.validate().is_err());
        let event = ClientEvent::Join(LobbyId::new("x".repeat(33)));
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_public_lobby_id() {
        let event = ClientEvent::Join(LobbyId::new("public-3"));
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_finite_cursor() {
        let event = ClientEvent::Cursor(CursorReport {
            x: f64::INFINITY,
            y: 0.0,
        });
        assert!(event.validate().is_err());
    }

    // =====================================================================
    // ServerEvent encoding
    // =====================================================================

    #[test]
    fn test_chat_message_event_name() {
        let json = serde_json::to_value(ServerEvent::ChatMessage(
            "alice: hi".into(),
        ))
        .unwrap();
        assert_eq!(json["event"], "chatmessage");
        assert_eq!(json["data"], "alice: hi");
    }

    #[test]
    fn test_ack_carries_public_id() {
        let json = serde_json::to_value(ServerEvent::Ack(JoinAck {
            id: 7,
            lobby: LobbyId::new("public-0"),
        }))
        .unwrap();
        assert_eq!(json["event"], "ack");
        assert_eq!(json["data"]["id"], 7);
        assert_eq!(json["data"]["lobby"], "public-0");
    }

    #[test]
    fn test_snapshot_players_keyed_by_id_string() {
        let mut snapshot = Snapshot::default();
        snapshot.players.insert(
            12,
            PlayerView {
                username: "alice".into(),
                health: 100.0,
                position: Point { x: 1.0, y: 2.0 },
                movement: MovementView::default(),
                firecd: 0,
                buffs: BuffView { speed: true },
            },
        );
        let json =
            serde_json::to_value(ServerEvent::Game(snapshot)).unwrap();
        let player = &json["data"]["players"]["12"];
        assert_eq!(player["username"], "alice");
        assert_eq!(player["buffs"]["speed"], true);
        assert!(player["buffs"].get("attack").is_none());
    }
}
