//! Projection of a [`Lobby`] into the client-visible [`Snapshot`].
//!
//! The snapshot is built fresh from the authoritative state each tick and
//! copies only what a client needs to draw the frame. Cursor targets,
//! bullet owners and damage, powerup kinds and buff timers never leave
//! the server.

use skirmish_protocol::{
    BuffView, BulletView, PlayerView, PowerupView, Snapshot,
};

use crate::{BuffKind, Lobby};

/// Builds the wire view of `lobby`.
pub fn project(lobby: &Lobby) -> Snapshot {
    let players = lobby
        .players()
        .map(|player| {
            let view = PlayerView {
                username: player.username.clone(),
                health: player.health,
                position: player.position.into(),
                movement: player.movement.view(),
                firecd: player.fire_cooldown,
                buffs: BuffView {
                    speed: player.has_buff(BuffKind::Speed),
                },
            };
            (player.id.into_inner(), view)
        })
        .collect();

    let bullets = lobby
        .bullets()
        .iter()
        .map(|bullet| BulletView {
            x: bullet.position.x,
            y: bullet.position.y,
            dx: bullet.velocity.x,
            dy: bullet.velocity.y,
        })
        .collect();

    let powerups = lobby
        .powerups()
        .iter()
        .map(|powerup| PowerupView {
            position: powerup.position.into(),
        })
        .collect();

    Snapshot {
        players,
        bullets,
        powerups,
    }
}
