//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding or validating a frame.
///
/// A decode or validation failure on an inbound frame is what the server
/// counts as a malformed packet.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not a well-formed frame: bad JSON, unknown event,
    /// missing fields or wrong field types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded but carries a value no legitimate client sends
    /// (empty token, non-finite cursor, malformed lobby id).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
