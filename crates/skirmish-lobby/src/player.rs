//! Players and the status they carry between ticks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skirmish_protocol::{Direction, MovementView};
use skirmish_transport::ConnectionId;

use crate::Vec2;

/// Health a player spawns with and can never exceed.
pub const MAX_HEALTH: f64 = 100.0;

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// The set of movement keys a player is holding, as a 4-bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Movement(u8);

impl Movement {
    const fn bit(direction: Direction) -> u8 {
        match direction {
            Direction::Up => 1 << 0,
            Direction::Right => 1 << 1,
            Direction::Down => 1 << 2,
            Direction::Left => 1 << 3,
        }
    }

    pub fn set(&mut self, direction: Direction, held: bool) {
        if held {
            self.0 |= Self::bit(direction);
        } else {
            self.0 &= !Self::bit(direction);
        }
    }

    pub fn contains(self, direction: Direction) -> bool {
        self.0 & Self::bit(direction) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Displacement for one tick. Diagonals are not normalized, so two
    /// perpendicular keys move `step` along each axis.
    pub fn displacement(self, step: f64) -> Vec2 {
        let mut delta = Vec2::ZERO;
        if self.contains(Direction::Up) {
            delta.y -= step;
        }
        if self.contains(Direction::Right) {
            delta.x += step;
        }
        if self.contains(Direction::Down) {
            delta.y += step;
        }
        if self.contains(Direction::Left) {
            delta.x -= step;
        }
        delta
    }

    pub fn view(self) -> MovementView {
        MovementView {
            up: self.contains(Direction::Up),
            right: self.contains(Direction::Right),
            down: self.contains(Direction::Down),
            left: self.contains(Direction::Left),
        }
    }
}

// ---------------------------------------------------------------------------
// BuffKind
// ---------------------------------------------------------------------------

/// The effect a powerup grants.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BuffKind {
    Attack,
    Health,
    Speed,
}

impl BuffKind {
    pub const ALL: [BuffKind; 3] =
        [BuffKind::Attack, BuffKind::Health, BuffKind::Speed];
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One connection's avatar inside a lobby.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: ConnectionId,
    pub username: String,
    /// Always within `[0, MAX_HEALTH]`.
    pub health: f64,
    pub position: Vec2,
    pub movement: Movement,
    /// Last accepted cursor offset relative to the player.
    pub cursor: Vec2,
    pub firing: bool,
    pub fire_cooldown: u32,
    /// Held buffs and the ticks since each was granted.
    pub buffs: BTreeMap<BuffKind, u32>,
    /// Cleared when the connection drops; the next tick removes the player.
    pub connected: bool,
}

impl Player {
    /// A fresh player at full health with no input and no buffs.
    pub fn spawn(
        id: ConnectionId,
        username: impl Into<String>,
        position: Vec2,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            health: MAX_HEALTH,
            position,
            movement: Movement::default(),
            cursor: Vec2::ZERO,
            firing: false,
            fire_cooldown: 0,
            buffs: BTreeMap::new(),
            connected: true,
        }
    }

    pub fn has_buff(&self, kind: BuffKind) -> bool {
        self.buffs.contains_key(&kind)
    }

    /// Whether the next tick should drop this player.
    pub fn is_gone(&self) -> bool {
        !self.connected || self.health < 1.0
    }

    pub fn take_damage(&mut self, amount: f64) {
        self.health = (self.health - amount).max(0.0);
    }

    pub fn heal(&mut self, amount: f64) {
        self.health = (self.health + amount).min(MAX_HEALTH);
    }

    /// Grants (or refreshes) a buff with its timer at zero.
    pub fn grant_buff(&mut self, kind: BuffKind) {
        self.buffs.insert(kind, 0);
    }

    /// Advances every buff timer, dropping buffs already past `timeout`.
    pub fn age_buffs(&mut self, timeout: u32) {
        self.buffs.retain(|_, elapsed| {
            if *elapsed > timeout {
                false
            } else {
                *elapsed += 1;
                true
            }
        });
    }
}
