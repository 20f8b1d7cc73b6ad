//! Server configuration, loaded from TOML.
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! wants to change:
//!
//! ```toml
//! log_level = "debug"
//!
//! [network]
//! bind_addr = "0.0.0.0:3000"
//!
//! [session]
//! token_secret = "change me"
//!
//! [game]
//! movement_speed = 25.0
//!
//! [anticheat]
//! lenient_checks = ["mouse_pos"]
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skirmish_anticheat::AntiCheatConfig;
use skirmish_lobby::GameConfig;
use skirmish_transport::TransportConfig;

/// Errors from loading or validating a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub session: SessionConfig,
    pub lobbies: LobbiesConfig,
    pub game: GameConfig,
    pub anticheat: AntiCheatConfig,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_addr: String,
    /// Time a fresh connection has to authenticate.
    pub handshake_timeout_ms: u64,
    /// Silence after which a connection is dropped.
    pub idle_timeout_ms: u64,
    /// Largest inbound frame a client may send.
    pub max_frame_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            handshake_timeout_ms: 5_000,
            idle_timeout_ms: 15_000,
            max_frame_bytes: 16 * 1024,
        }
    }
}

impl NetworkConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// The WebSocket upgrade shares the authentication deadline.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            max_frame_bytes: self.max_frame_bytes,
            upgrade_timeout: self.handshake_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC key for session tokens. Must be set.
    pub token_secret: String,
    pub ttl_secs: u64,
    /// Reject tokens presented from another IP than they were issued to.
    pub bind_to_address: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            ttl_secs: 24 * 60 * 60,
            bind_to_address: true,
        }
    }
}

impl SessionConfig {
    pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbiesConfig {
    /// Always-alive public lobbies created at startup.
    pub public_pool_size: usize,
}

impl Default for LobbiesConfig {
    fn default() -> Self {
        Self { public_pool_size: 4 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            session: SessionConfig::default(),
            lobbies: LobbiesConfig::default(),
            game: GameConfig::default(),
            anticheat: AntiCheatConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl ServerConfig {
    /// Reads, parses and validates the file at `path`.
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file can't be read, [`ConfigError::Parse`]
    /// for malformed TOML, [`ConfigError::Invalid`] for bad values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self = content.parse()?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// # Errors
    /// [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.bind_addr.is_empty() {
            return Err(invalid("network.bind_addr cannot be empty"));
        }
        if self.network.handshake_timeout_ms == 0 {
            return Err(invalid("network.handshake_timeout_ms must be positive"));
        }
        if self.network.idle_timeout_ms == 0 {
            return Err(invalid("network.idle_timeout_ms must be positive"));
        }
        if self.network.max_frame_bytes < 256 {
            return Err(invalid("network.max_frame_bytes must be at least 256"));
        }
        if self.session.token_secret.is_empty() {
            return Err(invalid("session.token_secret must be set"));
        }
        if self.session.ttl_secs == 0 {
            return Err(invalid("session.ttl_secs must be positive"));
        }
        if self.session.ttl_secs > SessionConfig::MAX_TTL_SECS {
            return Err(invalid("session.ttl_secs must be at most one year"));
        }
        self.game
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.anticheat
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

impl FromStr for ServerConfig {
    type Err = ConfigError;

    /// Parses and validates a TOML document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
