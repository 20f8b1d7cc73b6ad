//! Bullets and powerups.

use skirmish_transport::ConnectionId;

use crate::{BuffKind, GameConfig, Vec2};

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub position: Vec2,
    /// Where it was spawned; range is measured from here.
    pub spawn: Vec2,
    /// Displacement per tick.
    pub velocity: Vec2,
    /// Never damaged by this bullet.
    pub owner: ConnectionId,
    pub damage: f64,
    /// Ticks survived so far.
    pub age: u32,
}

impl Bullet {
    /// Straight-line distance from the spawn point.
    pub fn travelled(&self) -> f64 {
        self.position.distance(self.spawn)
    }

    /// Past its lifetime or its range.
    pub fn is_spent(&self, config: &GameConfig) -> bool {
        self.age > config.bullet_lifetime
            || self.travelled() > config.bullet_range
    }

    /// Far end of the segment tested for hits this tick: one
    /// `bullet_speed` step along the current heading.
    pub fn sweep_end(&self, bullet_speed: f64) -> Vec2 {
        self.position + self.velocity.normalize_or_zero() * bullet_speed
    }

    pub fn advance(&mut self) {
        self.position += self.velocity;
        self.age += 1;
    }
}

/// A pickup lying in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Powerup {
    pub position: Vec2,
    pub kind: BuffKind,
}
