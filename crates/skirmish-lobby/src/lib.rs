//! Lobbies for Skirmish: the authoritative match simulation.
//!
//! # Key types
//!
//! - [`Lobby`]: one match and its per-tick state machine
//! - [`LobbyRegistry`]: creates, finds and garbage-collects lobbies
//! - [`GameConfig`]: every tuning constant the simulation reads
//! - [`project`]: builds the sterilized [`Snapshot`](skirmish_protocol::Snapshot)
//!   clients receive
//!
//! Nothing here performs I/O or reads a clock. The server owns the
//! registry, feeds it input between ticks and calls [`Lobby::tick`] on a
//! fixed schedule.

mod config;
mod entity;
mod error;
mod geometry;
mod lobby;
mod player;
mod registry;
mod snapshot;

pub use config::{BuffConfig, DamageRange, GameConfig};
pub use entity::{Bullet, Powerup};
pub use error::LobbyError;
pub use geometry::{Vec2, point_segment_distance};
pub use lobby::{Lobby, LobbyKind, Removal, TickReport};
pub use player::{BuffKind, MAX_HEALTH, Movement, Player};
pub use registry::{LobbyRegistry, PRIVATE_ID_LEN, PUBLIC_PREFIX};
pub use snapshot::project;
