//! The anti-cheat monitor.
//!
//! Every connection gets a [`Profile`] when it is accepted and loses it
//! when it closes. Checks feed named violation counters; a counter that
//! climbs past `max_violations` produces exactly one [`Verdict::Kick`],
//! after which the profile rejects everything until the server drops it.
//!
//! Chat heat is tracked separately per *account*, so reconnecting or
//! switching lobbies does not reset it.
//!
//! Time is always passed in. The monitor never reads a clock itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use skirmish_protocol::CursorReport;
use skirmish_session::AccountName;
use skirmish_transport::ConnectionId;

use crate::AntiCheatConfig;

const PACKET_WINDOW: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Check / Verdict
// ---------------------------------------------------------------------------

/// The heuristics the monitor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Too many messages inside one second.
    PacketRate,
    /// Implausible cursor jump.
    MousePos,
    /// Payload failed decoding or validation.
    Packets,
    /// Pings sent faster than allowed.
    Ping,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PacketRate => "packet_rate",
            Self::MousePos => "mouse_pos",
            Self::Packets => "packets",
            Self::Ping => "ping",
        };
        f.write_str(name)
    }
}

/// What the caller should do with the input that was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Apply it.
    Pass,
    /// Drop it; the connection stays.
    Reject,
    /// Notify the client, then close the connection.
    Kick(Check),
}

/// Outcome of a chat send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatVerdict {
    Allowed,
    Throttled,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Per-connection anti-cheat state.
#[derive(Debug, Clone)]
pub struct Profile {
    violations: HashMap<Check, u32>,
    last_cursor: Option<CursorReport>,
    window_start: Instant,
    window_count: u32,
    last_ping: Option<Instant>,
    kicked: bool,
}

impl Profile {
    fn new(now: Instant) -> Self {
        Self {
            violations: HashMap::new(),
            last_cursor: None,
            window_start: now,
            window_count: 0,
            last_ping: None,
            kicked: false,
        }
    }

    pub fn violations(&self, check: Check) -> u32 {
        self.violations.get(&check).copied().unwrap_or(0)
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked
    }
}

// ---------------------------------------------------------------------------
// AntiCheatMonitor
// ---------------------------------------------------------------------------

pub struct AntiCheatMonitor {
    config: Arc<AntiCheatConfig>,
    profiles: HashMap<ConnectionId, Profile>,
    chat_heat: HashMap<AccountName, f64>,
}

impl AntiCheatMonitor {
    pub fn new(config: Arc<AntiCheatConfig>) -> Self {
        Self {
            config,
            profiles: HashMap::new(),
            chat_heat: HashMap::new(),
        }
    }

    /// Swaps in new thresholds. Existing counters are kept.
    pub fn set_config(&mut self, config: Arc<AntiCheatConfig>) {
        self.config = config;
    }

    pub fn config(&self) -> &AntiCheatConfig {
        &self.config
    }

    /// Starts tracking a connection.
    pub fn open(&mut self, conn: ConnectionId, now: Instant) {
        self.profiles.insert(conn, Profile::new(now));
    }

    /// Stops tracking a connection.
    pub fn close(&mut self, conn: ConnectionId) {
        self.profiles.remove(&conn);
    }

    pub fn profile(&self, conn: ConnectionId) -> Option<&Profile> {
        self.profiles.get(&conn)
    }

    /// Bumps the `check` counter of `conn` by `weight`.
    ///
    /// Returns [`Verdict::Kick`] the first time the counter passes
    /// `max_violations` (unless the check is lenient) and
    /// [`Verdict::Reject`] otherwise. Unknown connections pass untouched.
    pub fn record_violation(
        &mut self,
        conn: ConnectionId,
        check: Check,
        weight: u32,
    ) -> Verdict {
        let lenient = self.config.is_lenient(check);
        let max = self.config.max_violations;
        let Some(profile) = self.profiles.get_mut(&conn) else {
            return Verdict::Pass;
        };
        if profile.kicked {
            return Verdict::Reject;
        }

        let count = profile.violations.entry(check).or_insert(0);
        *count = count.saturating_add(weight);

        if *count > max && !lenient {
            profile.kicked = true;
            tracing::warn!(conn_id = %conn, %check, count = *count, "violation limit exceeded, kicking");
            Verdict::Kick(check)
        } else {
            tracing::debug!(conn_id = %conn, %check, count = *count, "violation recorded");
            Verdict::Reject
        }
    }

    /// Counts one inbound message against the one-second window.
    ///
    /// Going over `max_packets_per_sec` kicks at once; there is no
    /// counter to escalate.
    pub fn observe_packet(&mut self, conn: ConnectionId, now: Instant) -> Verdict {
        let max = self.config.max_packets_per_sec;
        let Some(profile) = self.profiles.get_mut(&conn) else {
            return Verdict::Pass;
        };
        if profile.kicked {
            return Verdict::Reject;
        }

        if now.saturating_duration_since(profile.window_start) >= PACKET_WINDOW {
            profile.window_start = now;
            profile.window_count = 0;
        }
        profile.window_count += 1;

        if profile.window_count > max {
            profile.kicked = true;
            *profile.violations.entry(Check::PacketRate).or_insert(0) += 1;
            tracing::warn!(
                conn_id = %conn,
                packets = profile.window_count,
                "packet rate exceeded, kicking"
            );
            return Verdict::Kick(Check::PacketRate);
        }
        Verdict::Pass
    }

    /// Checks a cursor report against the previous one.
    ///
    /// A jump longer than `max_mouse_distance` is rejected and counted.
    /// The report becomes the new reference either way, so one large
    /// flick does not poison every report after it.
    pub fn check_cursor(&mut self, conn: ConnectionId, report: CursorReport) -> Verdict {
        let max = self.config.max_mouse_distance;
        let Some(profile) = self.profiles.get_mut(&conn) else {
            return Verdict::Pass;
        };
        let previous = profile.last_cursor.replace(report);
        let jumped = previous.is_some_and(|prev| {
            (report.x - prev.x).hypot(report.y - prev.y) > max
        });
        if jumped {
            self.record_violation(conn, Check::MousePos, 1)
        } else {
            Verdict::Pass
        }
    }

    /// A payload failed decoding or validation.
    pub fn malformed_packet(&mut self, conn: ConnectionId) -> Verdict {
        self.record_violation(conn, Check::Packets, 1)
    }

    /// Checks a ping against the previous one. Flooded pings are counted
    /// with `ping_flood_weight` and should not be answered.
    pub fn check_ping(&mut self, conn: ConnectionId, now: Instant) -> Verdict {
        let min_gap = Duration::from_millis(self.config.min_time_between_ping_ms);
        let weight = self.config.ping_flood_weight;
        let Some(profile) = self.profiles.get_mut(&conn) else {
            return Verdict::Pass;
        };
        let previous = profile.last_ping.replace(now);
        let flooded =
            previous.is_some_and(|prev| now.saturating_duration_since(prev) < min_gap);
        if flooded {
            self.record_violation(conn, Check::Ping, weight)
        } else {
            Verdict::Pass
        }
    }

    // -- Chat heat ----------------------------------------------------------

    /// Charges a chat message of `len` characters to `account`.
    ///
    /// Rejected once the account's heat has reached `max_chat_heat`;
    /// otherwise the heat grows by `len + chat_message_cost`, capped at
    /// the maximum.
    pub fn charge_chat(&mut self, account: &AccountName, len: usize) -> ChatVerdict {
        let max = self.config.max_chat_heat;
        let cost = len as f64 + self.config.chat_message_cost;
        let heat = self.chat_heat.entry(account.clone()).or_insert(0.0);
        if *heat >= max {
            tracing::debug!(%account, heat = *heat, "chat throttled");
            return ChatVerdict::Throttled;
        }
        *heat = (*heat + cost).min(max);
        ChatVerdict::Allowed
    }

    pub fn chat_heat(&self, account: &AccountName) -> f64 {
        self.chat_heat.get(account).copied().unwrap_or(0.0)
    }

    /// Cools every account by `chat_heat_decline`. Called once per tick.
    pub fn decay_chat_heat(&mut self) {
        let decline = self.config.chat_heat_decline;
        self.chat_heat.retain(|_, heat| {
            *heat = (*heat - decline).max(0.0);
            *heat > 0.0
        });
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
