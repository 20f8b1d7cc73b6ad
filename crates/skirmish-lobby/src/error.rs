//! Error types for the lobby layer.

use skirmish_protocol::LobbyId;

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The lobby does not exist (never created, or already timed out).
    #[error("lobby {0} not found")]
    NotFound(LobbyId),

    /// A `[game]` setting the simulation cannot run with.
    #[error("invalid game config: {0}")]
    InvalidConfig(String),
}
