//! Anti-cheat thresholds, loaded from the server's `[anticheat]` table.

use serde::{Deserialize, Serialize};

use crate::{AntiCheatError, Check};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    /// A violation counter above this kicks the connection.
    pub max_violations: u32,
    /// Inbound messages allowed per one-second window.
    pub max_packets_per_sec: u32,
    /// Largest plausible jump between two cursor reports.
    pub max_mouse_distance: f64,
    /// Chat heat at which messages start being rejected.
    pub max_chat_heat: f64,
    /// Heat removed from every account each tick.
    pub chat_heat_decline: f64,
    /// Heat added per message on top of its length.
    pub chat_message_cost: f64,
    /// Pings closer together than this count as a flood.
    pub min_time_between_ping_ms: u64,
    /// Violation weight of one flooded ping.
    pub ping_flood_weight: u32,
    /// Checks that count violations but never kick.
    pub lenient_checks: Vec<Check>,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            max_violations: 10,
            max_packets_per_sec: 100,
            max_mouse_distance: 800.0,
            max_chat_heat: 200.0,
            chat_heat_decline: 1.0,
            chat_message_cost: 20.0,
            min_time_between_ping_ms: 1000,
            ping_flood_weight: 3,
            lenient_checks: Vec::new(),
        }
    }
}

impl AntiCheatConfig {
    /// # Errors
    /// [`AntiCheatError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> Result<(), AntiCheatError> {
        if self.max_packets_per_sec == 0 {
            return Err(invalid("max_packets_per_sec", "must be at least 1"));
        }
        if !(self.max_mouse_distance.is_finite() && self.max_mouse_distance > 0.0) {
            return Err(invalid("max_mouse_distance", "must be positive"));
        }
        if !(self.max_chat_heat.is_finite() && self.max_chat_heat > 0.0) {
            return Err(invalid("max_chat_heat", "must be positive"));
        }
        if !(self.chat_heat_decline.is_finite() && self.chat_heat_decline > 0.0) {
            return Err(invalid("chat_heat_decline", "must be positive"));
        }
        if !(self.chat_message_cost.is_finite() && self.chat_message_cost >= 0.0) {
            return Err(invalid("chat_message_cost", "must not be negative"));
        }
        if self.ping_flood_weight == 0 {
            return Err(invalid("ping_flood_weight", "must be at least 1"));
        }
        Ok(())
    }

    pub fn is_lenient(&self, check: Check) -> bool {
        self.lenient_checks.contains(&check)
    }
}

fn invalid(key: &str, reason: &str) -> AntiCheatError {
    AntiCheatError::InvalidConfig(format!("anticheat.{key} {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AntiCheatConfig::default().validate().is_ok());
    }

    #[test]
    fn test_lenient_checks_parse_from_toml() {
        let config: AntiCheatConfig = toml::from_str(
            r#"
            max_violations = 3
            lenient_checks = ["mouse_pos", "ping"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_violations, 3);
        assert!(config.is_lenient(Check::MousePos));
        assert!(config.is_lenient(Check::Ping));
        assert!(!config.is_lenient(Check::Packets));
        assert_eq!(config.max_packets_per_sec, 100);
    }

    #[test]
    fn test_validate_rejects_zero_decline() {
        let config = AntiCheatConfig {
            chat_heat_decline: 0.0,
            ..AntiCheatConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AntiCheatError::InvalidConfig(msg)) if msg.contains("chat_heat_decline")
        ));
    }
}
