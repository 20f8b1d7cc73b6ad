//! Error types for the session layer.

/// Errors from account-name validation and the session registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The name is not 3 to 16 ASCII alphanumerics.
    #[error("invalid account name {0:?}")]
    InvalidAccountName(String),

    /// The token failed signature or format checks.
    #[error("invalid session token")]
    InvalidToken,

    /// The token is well-signed but names no live session (revoked,
    /// purged, or from before a restart).
    #[error("unknown session")]
    UnknownSession,

    /// The session's expiry has passed.
    #[error("session expired")]
    Expired,

    /// The token was presented from a different address than the one it
    /// was issued to.
    #[error("session used from a different address")]
    SourceMismatch,

    /// The lifetime runs past what the clock can represent.
    #[error("session lifetime of {0:?} is out of range")]
    TtlOutOfRange(std::time::Duration),

    /// Signing a new token failed.
    #[error("failed to sign session token: {0}")]
    TokenEncoding(#[source] jsonwebtoken::errors::Error),
}
