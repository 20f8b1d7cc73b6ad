//! Error types for the Skirmish server.

use skirmish_anticheat::{AntiCheatError, Verdict};
use skirmish_lobby::LobbyError;
use skirmish_protocol::ProtocolError;
use skirmish_session::SessionError;
use skirmish_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SkirmishError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error(transparent)]
    AntiCheat(#[from] AntiCheatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A session was requested for a name the account store doesn't know.
    #[error("unknown account {0:?}")]
    UnknownAccount(String),

    /// `reload` on a server that was not started from a config file.
    #[error("server was not started from a config file")]
    NoConfigFile,
}

/// Why an inbound message did not go through cleanly.
///
/// Handlers return these instead of reacting themselves; the connection
/// layer maps each kind onto one reaction.
#[derive(Debug, thiserror::Error)]
pub enum Fault {
    /// Payload failed decoding or validation. Counted as a `packets`
    /// violation, then dropped.
    #[error("malformed packet: {0}")]
    Protocol(#[source] ProtocolError),

    /// Packet or ping flood, with the monitor's verdict.
    #[error("rate abuse")]
    RateAbuse(Verdict),

    /// Cursor jump, with the monitor's verdict. The update is discarded.
    #[error("implausible input")]
    InputImplausible(Verdict),

    /// The lobby or player the message refers to is already gone.
    /// Disconnects and messages race across the tick boundary, so this is
    /// never fatal.
    #[error("stale lobby state")]
    StateRace,

    /// Chat heat too high; only the sender hears about it.
    #[error("chat throttled")]
    ChatFlood,

    /// Notify the client with this reason, then close the connection.
    #[error("{0}")]
    Fatal(&'static str),
}
