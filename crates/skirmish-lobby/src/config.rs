//! Game tuning.
//!
//! Every number the simulation uses lives in [`GameConfig`]. The server
//! loads it from the `[game]` table of its TOML file; any key left out
//! falls back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::LobbyError;

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Tuning for every lobby on the server.
///
/// Distances are world units, durations are ticks unless the field name
/// says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Distance moved per tick per held direction key.
    pub movement_speed: f64,
    /// Half-extent of the square world; positions stay within
    /// `[-world_border, world_border]` on both axes.
    pub world_border: f64,
    /// A private lobby is destroyed after this many consecutive empty ticks.
    pub ticks_before_game_timeout: u32,
    /// Ticks between powerup spawns.
    pub ticks_before_powerup: u32,
    /// Powerups a lobby holds at most.
    pub max_powerups: usize,
    /// Half-size of the pickup box around a powerup.
    pub powerup_hitbox: f64,
    /// Radius within which a bullet's path hits a player.
    pub player_hitbox: f64,
    pub buffs: BuffConfig,
    /// Ticks a buff lasts before it is removed.
    pub buff_timeout: u32,
    /// Ticks between two shots.
    pub player_fire_cooldown: u32,
    /// Distance a bullet travels per tick.
    pub bullet_speed: f64,
    pub bullet_damage: DamageRange,
    /// Straight-line distance from spawn after which a bullet expires.
    pub bullet_range: f64,
    /// Ticks after which a bullet expires.
    pub bullet_lifetime: u32,
    /// Maximum uniform jitter added to both velocity axes when firing.
    pub bullet_randomness: f64,
    /// Wall-clock period of one simulation tick.
    pub tick_interval_ms: u64,
    /// Chat messages are truncated to this many characters.
    pub max_chat_length: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            movement_speed: 20.0,
            world_border: 2000.0,
            ticks_before_game_timeout: 600,
            ticks_before_powerup: 100,
            max_powerups: 10,
            powerup_hitbox: 20.0,
            player_hitbox: 12.0,
            buffs: BuffConfig::default(),
            buff_timeout: 100,
            player_fire_cooldown: 1,
            bullet_speed: 30.0,
            bullet_damage: DamageRange::default(),
            bullet_range: 500.0,
            bullet_lifetime: 100,
            bullet_randomness: 2.0,
            tick_interval_ms: 100,
            max_chat_length: 200,
        }
    }
}

impl GameConfig {
    /// Rejects values the simulation cannot run with.
    ///
    /// # Errors
    /// Returns [`LobbyError::InvalidConfig`] naming the first bad key.
    pub fn validate(&self) -> Result<(), LobbyError> {
        let positive = [
            ("movement_speed", self.movement_speed),
            ("world_border", self.world_border),
            ("powerup_hitbox", self.powerup_hitbox),
            ("player_hitbox", self.player_hitbox),
            ("bullet_speed", self.bullet_speed),
            ("bullet_range", self.bullet_range),
            ("buffs.speed", self.buffs.speed),
            ("buffs.attack", self.buffs.attack),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(key, "must be a positive number"));
            }
        }

        if !(self.buffs.health.is_finite() && self.buffs.health >= 0.0) {
            return Err(invalid("buffs.health", "must not be negative"));
        }
        if !(self.bullet_randomness.is_finite() && self.bullet_randomness >= 0.0)
        {
            return Err(invalid("bullet_randomness", "must not be negative"));
        }
        let DamageRange { min, max } = self.bullet_damage;
        if !(max.is_finite() && (0.0..=max).contains(&min)) {
            return Err(invalid(
                "bullet_damage",
                "min must be non-negative and not above max",
            ));
        }
        // Tick counters step one past these values.
        let timers = [
            ("ticks_before_game_timeout", self.ticks_before_game_timeout),
            ("ticks_before_powerup", self.ticks_before_powerup),
            ("buff_timeout", self.buff_timeout),
            ("bullet_lifetime", self.bullet_lifetime),
        ];
        for (key, value) in timers {
            if value == u32::MAX {
                return Err(invalid(key, "must be below 4294967295"));
            }
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms", "must be at least 1"));
        }
        if self.max_chat_length == 0 {
            return Err(invalid("max_chat_length", "must be at least 1"));
        }
        Ok(())
    }

    /// Movement per tick for a player with or without the speed buff.
    pub fn step_length(&self, speed_buff: bool) -> f64 {
        if speed_buff {
            self.movement_speed * self.buffs.speed
        } else {
            self.movement_speed
        }
    }
}

fn invalid(key: &str, reason: &str) -> LobbyError {
    LobbyError::InvalidConfig(format!("game.{key} {reason}"))
}

// ---------------------------------------------------------------------------
// BuffConfig / DamageRange
// ---------------------------------------------------------------------------

/// Strength of each buff kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffConfig {
    /// Movement multiplier while the speed buff is held.
    pub speed: f64,
    /// Damage multiplier while the attack buff is held.
    pub attack: f64,
    /// Health restored on picking up a health powerup.
    pub health: f64,
}

impl Default for BuffConfig {
    fn default() -> Self {
        Self {
            speed: 2.0,
            attack: 1.5,
            health: 10.0,
        }
    }
}

/// Inclusive range bullet damage is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageRange {
    pub min: f64,
    pub max: f64,
}

impl Default for DamageRange {
    fn default() -> Self {
        Self { min: 3.0, max: 9.0 }
    }
}
