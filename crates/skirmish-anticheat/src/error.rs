//! Error types for the anti-cheat layer.

#[derive(Debug, thiserror::Error)]
pub enum AntiCheatError {
    /// An `[anticheat]` setting that cannot be enforced.
    #[error("invalid anticheat config: {0}")]
    InvalidConfig(String),
}
