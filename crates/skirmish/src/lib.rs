//! # Skirmish
//!
//! Authoritative server for a real-time, top-down multiplayer shooter.
//!
//! The server owns the only trusted copy of the world. Clients connect over
//! WebSocket, authenticate with a session token, join a lobby and send
//! intents (`move`, `cursor`, `fire`, `chat`). A fixed-interval tick loop
//! advances every lobby and streams a sterilized snapshot back to its
//! members.
//!
//! ## Layers
//!
//! | Crate | Role |
//! |---|---|
//! | `skirmish-transport` | WebSocket connections |
//! | `skirmish-protocol` | wire events and codec |
//! | `skirmish-session` | accounts and session tokens |
//! | `skirmish-lobby` | the simulation |
//! | `skirmish-anticheat` | rate, input and chat policing |
//! | `skirmish-tick` | the tick scheduler |
//!
//! This crate wires them together: [`ServerConfig`], the per-connection
//! protocol layer, the [`World`] and its tick loop, and the operator
//! console.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skirmish::SkirmishServer;
//!
//! # async fn start() -> Result<(), skirmish::SkirmishError> {
//! let server = SkirmishServer::builder()
//!     .config_file("skirmish.toml")?
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
pub mod console;
mod error;
mod handler;
mod server;
mod world;

pub use config::{ConfigError, LobbiesConfig, NetworkConfig, ServerConfig, SessionConfig};
pub use error::{Fault, SkirmishError};
pub use server::{SHUTDOWN_NOTICE, ServerHandle, SkirmishServer, SkirmishServerBuilder};
pub use world::{LobbySummary, World};
