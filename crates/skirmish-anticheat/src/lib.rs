//! Heuristic anti-cheat for Skirmish.
//!
//! [`AntiCheatMonitor`] polices each connection's packet rate, cursor
//! plausibility, malformed payloads and ping frequency, and throttles
//! chat per account. It only returns [`Verdict`]s; closing connections is
//! the server's job.

mod config;
mod error;
mod monitor;

pub use config::AntiCheatConfig;
pub use error::AntiCheatError;
pub use monitor::{AntiCheatMonitor, ChatVerdict, Check, Profile, Verdict};
