//! The simulation of one match.
//!
//! The server calls [`Lobby::tick`] once per interval and applies client
//! input through the `set_*` methods in between. Players are visited in
//! ascending connection id; when two compete for one bullet or powerup,
//! the lower id wins.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use skirmish_protocol::{Direction, LobbyId};
use skirmish_transport::ConnectionId;

use crate::geometry::point_segment_distance;
use crate::{BuffKind, Bullet, GameConfig, Player, Powerup, Vec2};

// ---------------------------------------------------------------------------
// LobbyKind
// ---------------------------------------------------------------------------

/// Public lobbies are pre-created and live forever; private lobbies are
/// created on demand and time out once they have been empty long enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyKind {
    Public,
    Private,
}

impl fmt::Display for LobbyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// Why a player left the lobby during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Disconnected,
    Died,
}

/// What happened during one [`Lobby::tick`], for logging and tests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub removed: Vec<(ConnectionId, Removal)>,
    pub shots: usize,
    pub hits: usize,
    pub pickups: usize,
    pub powerup_spawned: bool,
}

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// One match: players, bullets, powerups and the lobby's own timers.
#[derive(Debug, Clone)]
pub struct Lobby {
    id: LobbyId,
    kind: LobbyKind,
    players: BTreeMap<ConnectionId, Player>,
    bullets: Vec<Bullet>,
    powerups: Vec<Powerup>,
    /// Consecutive ticks that ended with no players.
    empty_ticks: u32,
    /// Ticks since the last powerup spawn.
    powerup_timer: u32,
}

impl Lobby {
    pub fn new(id: LobbyId, kind: LobbyKind) -> Self {
        Self {
            id,
            kind,
            players: BTreeMap::new(),
            bullets: Vec::new(),
            powerups: Vec::new(),
            empty_ticks: 0,
            powerup_timer: 0,
        }
    }

    pub fn id(&self) -> &LobbyId {
        &self.id
    }

    pub fn kind(&self) -> LobbyKind {
        self.kind
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: ConnectionId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn powerups(&self) -> &[Powerup] {
        &self.powerups
    }

    pub fn empty_ticks(&self) -> u32 {
        self.empty_ticks
    }

    /// Players still connected (disconnected ones linger until the next
    /// tick).
    pub fn player_count(&self) -> usize {
        self.players.values().filter(|p| p.connected).count()
    }

    /// A private lobby that has sat empty past the timeout.
    pub fn is_expired(&self, config: &GameConfig) -> bool {
        self.kind == LobbyKind::Private
            && self.empty_ticks > config.ticks_before_game_timeout
    }

    // -- Input -------------------------------------------------------------

    /// Spawns a fresh player for `id` at a random in-bounds position.
    ///
    /// Any earlier player for the same connection is replaced outright:
    /// re-joining never resurrects old health, buffs or position.
    pub fn join(
        &mut self,
        id: ConnectionId,
        username: impl Into<String>,
        config: &GameConfig,
        rng: &mut impl Rng,
    ) -> &Player {
        let position = random_position(config.world_border, rng);
        let player = Player::spawn(id, username, position);
        tracing::info!(lobby_id = %self.id, conn_id = %id, "player joined");
        self.players.insert(id, player);
        self.empty_ticks = 0;
        &self.players[&id]
    }

    /// Flags the player for removal on the next tick. Returns `false` if
    /// the connection has no player here.
    pub fn mark_disconnected(&mut self, id: ConnectionId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.connected = false;
                true
            }
            None => false,
        }
    }

    /// Presses or releases a movement key. `false` if there is no live
    /// player for `id`.
    pub fn set_movement(
        &mut self,
        id: ConnectionId,
        direction: Direction,
        held: bool,
    ) -> bool {
        self.with_live_player(id, |p| p.movement.set(direction, held))
    }

    /// Replaces the cursor offset.
    pub fn set_cursor(&mut self, id: ConnectionId, cursor: Vec2) -> bool {
        self.with_live_player(id, |p| p.cursor = cursor)
    }

    pub fn set_firing(&mut self, id: ConnectionId, firing: bool) -> bool {
        self.with_live_player(id, |p| p.firing = firing)
    }

    fn with_live_player(
        &mut self,
        id: ConnectionId,
        f: impl FnOnce(&mut Player),
    ) -> bool {
        match self.players.get_mut(&id) {
            Some(player) if player.connected => {
                f(player);
                true
            }
            _ => false,
        }
    }

    // -- Simulation --------------------------------------------------------

    /// Advances the match by one tick.
    ///
    /// Order: drop gone players, move and fire, resolve bullets, resolve
    /// pickups, age buffs, spawn powerups, update the empty-lobby counter.
    pub fn tick(
        &mut self,
        config: &GameConfig,
        rng: &mut impl Rng,
    ) -> TickReport {
        let mut report = TickReport::default();

        self.remove_gone_players(&mut report);
        self.move_and_fire(config, rng, &mut report);
        self.resolve_bullets(config, &mut report);
        self.resolve_pickups(config, &mut report);
        for player in self.players.values_mut() {
            player.age_buffs(config.buff_timeout);
        }
        self.spawn_powerups(config, rng, &mut report);

        if self.players.is_empty() {
            self.empty_ticks = self.empty_ticks.saturating_add(1);
        } else {
            self.empty_ticks = 0;
        }

        report
    }

    fn remove_gone_players(&mut self, report: &mut TickReport) {
        // `retain` never skips an element after a removal.
        self.players.retain(|id, player| {
            if !player.is_gone() {
                return true;
            }
            let reason = if player.connected {
                Removal::Died
            } else {
                Removal::Disconnected
            };
            report.removed.push((*id, reason));
            false
        });
        for (conn_id, reason) in &report.removed {
            tracing::debug!(lobby_id = %self.id, %conn_id, ?reason, "player removed");
        }
    }

    fn move_and_fire(
        &mut self,
        config: &GameConfig,
        rng: &mut impl Rng,
        report: &mut TickReport,
    ) {
        for (id, player) in self.players.iter_mut() {
            let step = config.step_length(player.has_buff(BuffKind::Speed));
            player.position = (player.position
                + player.movement.displacement(step))
            .clamp_to_border(config.world_border);

            if player.firing && player.fire_cooldown < 1 {
                let velocity = aim(player.cursor, config, rng);
                let mut damage = rng.random_range(
                    config.bullet_damage.min..=config.bullet_damage.max,
                );
                if player.has_buff(BuffKind::Attack) {
                    damage *= config.buffs.attack;
                }
                // One step behind the shooter so the first broadcast
                // already shows it moving.
                let spawn = player.position - velocity;
                self.bullets.push(Bullet {
                    position: spawn,
                    spawn,
                    velocity,
                    owner: *id,
                    damage,
                    age: 0,
                });
                player.fire_cooldown = config.player_fire_cooldown;
                report.shots += 1;
            } else if player.fire_cooldown > 0 {
                player.fire_cooldown -= 1;
            }
        }
    }

    fn resolve_bullets(&mut self, config: &GameConfig, report: &mut TickReport) {
        let bullets = std::mem::take(&mut self.bullets);
        for mut bullet in bullets {
            if bullet.is_spent(config) {
                continue;
            }

            let end = bullet.sweep_end(config.bullet_speed);
            let victim = self
                .players
                .iter_mut()
                .filter(|(id, _)| **id != bullet.owner)
                .map(|(_, player)| player)
                .find(|player| {
                    point_segment_distance(player.position, bullet.position, end)
                        < config.player_hitbox
                });

            if let Some(player) = victim {
                player.take_damage(bullet.damage);
                report.hits += 1;
                tracing::trace!(
                    lobby_id = %self.id,
                    shooter = %bullet.owner,
                    target = %player.id,
                    damage = bullet.damage,
                    "bullet hit"
                );
                continue;
            }

            bullet.advance();
            self.bullets.push(bullet);
        }
    }

    fn resolve_pickups(&mut self, config: &GameConfig, report: &mut TickReport) {
        let players = &mut self.players;
        self.powerups.retain(|powerup| {
            let picker = players.values_mut().find(|player| {
                player.position.within_box(powerup.position, config.powerup_hitbox)
            });
            match picker {
                Some(player) => {
                    if powerup.kind == BuffKind::Health {
                        player.heal(config.buffs.health);
                    }
                    player.grant_buff(powerup.kind);
                    report.pickups += 1;
                    false
                }
                None => true,
            }
        });
    }

    fn spawn_powerups(
        &mut self,
        config: &GameConfig,
        rng: &mut impl Rng,
        report: &mut TickReport,
    ) {
        if self.powerup_timer <= config.ticks_before_powerup {
            self.powerup_timer += 1;
            return;
        }
        if self.powerups.len() >= config.max_powerups {
            // Hold the timer at the threshold so a spawn happens as soon
            // as there is room again.
            self.powerup_timer = config.ticks_before_powerup;
            return;
        }
        let kind = BuffKind::ALL[rng.random_range(0..BuffKind::ALL.len())];
        self.powerups.push(Powerup {
            position: random_position(config.world_border, rng),
            kind,
        });
        self.powerup_timer = 0;
        report.powerup_spawned = true;
    }
}

/// Bullet velocity for a shot aimed at `cursor` (relative to the shooter).
///
/// A zero-length aim yields a stationary bullet; jitter only perturbs a
/// bullet that is actually moving.
fn aim(cursor: Vec2, config: &GameConfig, rng: &mut impl Rng) -> Vec2 {
    let velocity = cursor.normalize_or_zero() * config.bullet_speed;
    if velocity == Vec2::ZERO || config.bullet_randomness <= 0.0 {
        return velocity;
    }
    let r = config.bullet_randomness;
    let jitter = rng.random_range(-r..=r);
    velocity + Vec2::new(jitter, jitter)
}

fn random_position(border: f64, rng: &mut impl Rng) -> Vec2 {
    Vec2::new(
        rng.random_range(-border..=border),
        rng.random_range(-border..=border),
    )
}

// =========================================================================
// Tests
// =========================================================================
