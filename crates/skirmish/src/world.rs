//! The authoritative world: every registry the server owns, behind one lock.
//!
//! Nothing in here awaits. Outbound frames go onto per-connection queues
//! that each connection task drains.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use skirmish_anticheat::{AntiCheatConfig, AntiCheatMonitor};
use skirmish_lobby::{GameConfig, LobbyKind, LobbyRegistry, project};
use skirmish_protocol::{Codec, JsonCodec, LobbyId, ServerEvent};
use skirmish_session::{AccountName, AccountStore, SessionRegistry};
use skirmish_transport::ConnectionId;
use tokio::sync::mpsc::UnboundedSender;

use crate::{ServerConfig, SkirmishError};

/// Expired sessions are swept every this many ticks, on top of the lazy
/// eviction at lookup.
const SESSION_PURGE_TICKS: u64 = 600;

/// Something for a connection task to do.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    /// Write this frame.
    Frame(Arc<[u8]>),
    /// Send an `error` notice with this reason (if any), then close.
    Close(Option<String>),
}

/// Server-side record of one live connection.
#[derive(Debug)]
pub(crate) struct Client {
    pub(crate) peer: SocketAddr,
    pub(crate) account: Option<AccountName>,
    pub(crate) lobby: Option<LobbyId>,
    pub(crate) outbound: UnboundedSender<Outbound>,
}

/// One row of the operator's lobby listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySummary {
    pub id: LobbyId,
    pub kind: LobbyKind,
    pub players: usize,
}

pub struct World {
    pub(crate) lobbies: LobbyRegistry,
    pub(crate) anticheat: AntiCheatMonitor,
    pub(crate) sessions: SessionRegistry,
    pub(crate) accounts: Arc<dyn AccountStore>,
    pub(crate) connections: BTreeMap<ConnectionId, Client>,
    pub(crate) game: Arc<GameConfig>,
    pub(crate) codec: JsonCodec,
    pub(crate) rng: StdRng,
    session_ttl: Duration,
    pub(crate) bind_sessions: bool,
}

impl World {
    /// Builds the registries and pre-allocates the public lobby pool.
    pub fn new(config: &ServerConfig, accounts: Arc<dyn AccountStore>) -> Self {
        let mut lobbies = LobbyRegistry::new();
        lobbies.create_public_pool(config.lobbies.public_pool_size);
        Self {
            lobbies,
            anticheat: AntiCheatMonitor::new(Arc::new(config.anticheat.clone())),
            sessions: SessionRegistry::new(config.session.token_secret.as_bytes()),
            accounts,
            connections: BTreeMap::new(),
            game: Arc::new(config.game.clone()),
            codec: JsonCodec,
            rng: StdRng::from_os_rng(),
            session_ttl: config.session.ttl(),
            bind_sessions: config.session.bind_to_address,
        }
    }

    /// Replaces the random source, for reproducible tests.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    // -- Sessions ----------------------------------------------------------

    /// Starts a session for a known account and returns its token.
    ///
    /// This is the hook the external login front calls after checking a
    /// password.
    ///
    /// # Errors
    /// [`SkirmishError::Session`] for a malformed name or a signing
    /// failure, [`SkirmishError::UnknownAccount`] if the store has no such
    /// account.
    pub fn issue_session(
        &mut self,
        account: &str,
        source: IpAddr,
    ) -> Result<String, SkirmishError> {
        let name = AccountName::parse(account)?;
        if self.accounts.lookup(&name).is_none() {
            return Err(SkirmishError::UnknownAccount(account.to_string()));
        }
        Ok(self.sessions.issue(name, source, self.session_ttl)?)
    }

    // -- Connections -------------------------------------------------------

    pub(crate) fn connect(
        &mut self,
        id: ConnectionId,
        peer: SocketAddr,
        outbound: UnboundedSender<Outbound>,
        now: Instant,
    ) {
        self.anticheat.open(id, now);
        self.connections.insert(
            id,
            Client {
                peer,
                account: None,
                lobby: None,
                outbound,
            },
        );
        tracing::info!(conn_id = %id, %peer, "connection accepted");
    }

    /// Forgets a connection. Its player, if any, is flagged and leaves the
    /// lobby on the next tick.
    pub(crate) fn disconnect(&mut self, id: ConnectionId) {
        let Some(client) = self.connections.remove(&id) else {
            return;
        };
        if let Some(lobby_id) = &client.lobby {
            if let Ok(lobby) = self.lobbies.get_mut(lobby_id) {
                lobby.mark_disconnected(id);
            }
        }
        self.anticheat.close(id);
        tracing::info!(
            conn_id = %id,
            account = ?client.account.as_ref().map(AccountName::as_str),
            "connection closed"
        );
    }

    pub(crate) fn is_authenticated(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|client| client.account.is_some())
    }

    /// Queues `event` for one connection. Unknown connections are ignored.
    pub(crate) fn send_to(&self, id: ConnectionId, event: &ServerEvent) {
        let Some(client) = self.connections.get(&id) else {
            return;
        };
        match self.codec.encode(event) {
            Ok(bytes) => {
                let _ = client.outbound.send(Outbound::Frame(bytes.into()));
            }
            Err(e) => tracing::warn!(conn_id = %id, error = %e, "failed to encode event"),
        }
    }

    /// Asks a connection's task to notify the client and hang up.
    ///
    /// Returns `false` if the connection is unknown.
    pub fn kick(&mut self, id: ConnectionId, reason: &str) -> bool {
        match self.connections.get(&id) {
            Some(client) => {
                tracing::info!(conn_id = %id, reason, "kicking connection");
                let _ = client.outbound.send(Outbound::Close(Some(reason.into())));
                true
            }
            None => false,
        }
    }

    /// Kicks every connection with the same notice.
    pub fn close_all(&mut self, reason: &str) {
        for client in self.connections.values() {
            let _ = client.outbound.send(Outbound::Close(Some(reason.into())));
        }
        tracing::info!(connections = self.connections.len(), reason, "closing all connections");
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // -- Lobbies -----------------------------------------------------------

    pub fn create_private_lobby(&mut self) -> LobbyId {
        self.lobbies.create_private(&mut self.rng)
    }

    pub fn lobby_summaries(&self) -> Vec<LobbySummary> {
        self.lobbies
            .iter()
            .map(|lobby| LobbySummary {
                id: lobby.id().clone(),
                kind: lobby.kind(),
                players: lobby.player_count(),
            })
            .collect()
    }

    // -- Config ------------------------------------------------------------

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.game.tick_interval_ms)
    }

    /// Swaps in new game and anti-cheat tuning. Takes effect from the next
    /// tick; running lobbies keep their entities.
    pub fn reload(&mut self, game: GameConfig, anticheat: AntiCheatConfig) {
        self.game = Arc::new(game);
        self.anticheat.set_config(Arc::new(anticheat));
        tracing::info!("game and anticheat config reloaded");
    }

    // -- Tick --------------------------------------------------------------

    /// Runs one simulation step for every lobby and broadcasts the result.
    ///
    /// Each lobby's snapshot is encoded once and the same frame is queued
    /// for every connection joined to it, dead or alive. Afterwards chat
    /// heat cools and expired private lobbies are dropped.
    pub fn tick(&mut self, tick: u64) {
        let config = Arc::clone(&self.game);

        for lobby in self.lobbies.iter_mut() {
            let report = lobby.tick(&config, &mut self.rng);
            if report.hits > 0 || !report.removed.is_empty() {
                tracing::debug!(
                    lobby_id = %lobby.id(),
                    tick,
                    hits = report.hits,
                    removed = report.removed.len(),
                    "lobby tick"
                );
            }
            let lobby = &*lobby;
            let mut members = self
                .connections
                .values()
                .filter(|client| client.lobby.as_ref() == Some(lobby.id()))
                .peekable();
            if members.peek().is_none() {
                continue;
            }

            let frame: Arc<[u8]> =
                match self.codec.encode(&ServerEvent::Game(project(lobby))) {
                    Ok(bytes) => bytes.into(),
                    Err(e) => {
                        tracing::warn!(lobby_id = %lobby.id(), error = %e, "failed to encode snapshot");
                        continue;
                    }
                };
            for client in members {
                let _ = client.outbound.send(Outbound::Frame(Arc::clone(&frame)));
            }
        }

        self.anticheat.decay_chat_heat();
        self.lobbies.collect_expired(&config);
        if tick % SESSION_PURGE_TICKS == 0 {
            self.sessions.purge_expired();
        }
    }
}

#[cfg(test)]
mod tests {
    use skirmish_session::{Account, MemoryAccountStore};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;

    fn world() -> World {
        let mut config = ServerConfig::default();
        config.session.token_secret = "test".into();
        config.lobbies.public_pool_size = 2;
        let accounts = MemoryAccountStore::new()
            .with_account(Account::new(AccountName::parse("alice").unwrap(), "x"));
        World::new(&config, Arc::new(accounts)).with_rng(StdRng::seed_from_u64(3))
    }

    fn attach(world: &mut World, n: u64) -> (ConnectionId, UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new(n);
        world.connect(id, "127.0.0.1:4000".parse().unwrap(), tx, Instant::now());
        (id, rx)
    }

    /// Joins `id` to `lobby_id` on both sides, as the join handler does.
    fn enter(world: &mut World, id: ConnectionId, lobby_id: &LobbyId) {
        let game = Arc::clone(&world.game);
        world
            .lobbies
            .get_mut(lobby_id)
            .unwrap()
            .join(id, "alice", &game, &mut world.rng);
        world.connections.get_mut(&id).unwrap().lobby = Some(lobby_id.clone());
    }

    fn game_frames(rx: &mut UnboundedReceiver<Outbound>) -> usize {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|out| matches!(out, Outbound::Frame(f) if f.starts_with(br#"{"event":"game""#)))
            .count()
    }

    #[test]
    fn test_new_creates_public_pool() {
        let world = world();
        let summaries = world.lobby_summaries();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.kind == LobbyKind::Public));
    }

    #[test]
    fn test_issue_session_unknown_account_is_rejected() {
        let mut world = world();
        let result = world.issue_session("mallory", "127.0.0.1".parse().unwrap());
        assert!(matches!(result, Err(SkirmishError::UnknownAccount(_))));
        assert!(world.issue_session("alice", "127.0.0.1".parse().unwrap()).is_ok());
    }

    #[test]
    fn test_tick_broadcasts_one_frame_to_each_member() {
        let mut world = world();
        let (a, mut rx_a) = attach(&mut world, 1);
        let (b, mut rx_b) = attach(&mut world, 2);
        let (_idle, mut rx_idle) = attach(&mut world, 3);

        let lobby_id = LobbyId::new("public-0");
        for id in [a, b] {
            enter(&mut world, id, &lobby_id);
        }

        world.tick(1);

        let frame_a = match rx_a.try_recv().unwrap() {
            Outbound::Frame(bytes) => bytes,
            other => panic!("expected frame, got {other:?}"),
        };
        let frame_b = match rx_b.try_recv().unwrap() {
            Outbound::Frame(bytes) => bytes,
            other => panic!("expected frame, got {other:?}"),
        };
        assert!(Arc::ptr_eq(&frame_a, &frame_b));
        assert!(frame_a.starts_with(br#"{"event":"game""#));
        assert!(rx_idle.try_recv().is_err());
    }

    #[test]
    fn test_tick_keeps_snapshotting_killed_player() {
        let mut world = world();
        world.game = Arc::new(GameConfig {
            world_border: 100.0,
            bullet_randomness: 0.0,
            bullet_damage: skirmish_lobby::DamageRange { min: 500.0, max: 500.0 },
            ticks_before_powerup: 1000,
            ..GameConfig::default()
        });
        let (shooter, mut rx_shooter) = attach(&mut world, 1);
        let (victim, mut rx_victim) = attach(&mut world, 2);
        let lobby_id = LobbyId::new("public-0");
        enter(&mut world, shooter, &lobby_id);
        enter(&mut world, victim, &lobby_id);

        let lobby = world.lobbies.get_mut(&lobby_id).unwrap();
        let aim = lobby.player(victim).unwrap().position - lobby.player(shooter).unwrap().position;
        lobby.set_cursor(shooter, aim);
        lobby.set_firing(shooter, true);

        let mut tick = 0;
        while world.lobbies.get(&lobby_id).unwrap().player(victim).is_some() {
            tick += 1;
            assert!(tick < 30, "victim never died");
            world.tick(tick);
        }
        game_frames(&mut rx_shooter);
        game_frames(&mut rx_victim);

        for n in 1..=3 {
            world.tick(tick + n);
        }
        assert_eq!(game_frames(&mut rx_victim), 3);
        assert_eq!(game_frames(&mut rx_shooter), 3);
    }

    #[test]
    fn test_tick_skips_lobby_without_joined_connections() {
        let mut world = world();
        let (a, mut rx) = attach(&mut world, 1);
        let game = Arc::clone(&world.game);
        world
            .lobbies
            .get_mut(&LobbyId::new("public-0"))
            .unwrap()
            .join(a, "alice", &game, &mut world.rng);

        world.tick(1);
        assert_eq!(game_frames(&mut rx), 0);
    }

    #[test]
    fn test_disconnect_flags_player_for_next_tick() {
        let mut world = world();
        let (a, _rx) = attach(&mut world, 1);
        let lobby_id = LobbyId::new("public-0");
        enter(&mut world, a, &lobby_id);

        world.disconnect(a);
        assert!(world.anticheat.profile(a).is_none());
        assert_eq!(world.lobbies.get(&lobby_id).unwrap().player_count(), 0);
        assert!(world.lobbies.get(&lobby_id).unwrap().player(a).is_some());

        world.tick(1);
        assert!(world.lobbies.get(&lobby_id).unwrap().player(a).is_none());
    }

    #[test]
    fn test_tick_drops_expired_private_lobby() {
        let mut world = world();
        let id = world.create_private_lobby();
        let timeout = u64::from(world.game.ticks_before_game_timeout);
        for n in 1..=timeout + 1 {
            world.tick(n);
        }
        assert!(!world.lobbies.contains(&id));
        assert_eq!(world.lobby_summaries().len(), 2);
    }

    #[test]
    fn test_close_all_queues_notice_for_everyone() {
        let mut world = world();
        let (_a, mut rx_a) = attach(&mut world, 1);
        let (_b, mut rx_b) = attach(&mut world, 2);

        world.close_all("Server shutting down");

        for rx in [&mut rx_a, &mut rx_b] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                Outbound::Close(Some(reason)) if reason == "Server shutting down"
            ));
        }
    }

    #[test]
    fn test_reload_swaps_tick_interval() {
        let mut world = world();
        let game = GameConfig {
            tick_interval_ms: 50,
            ..GameConfig::default()
        };
        world.reload(game, AntiCheatConfig::default());
        assert_eq!(world.tick_interval(), Duration::from_millis(50));
    }
}
