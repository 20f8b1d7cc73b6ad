//! Per-connection protocol layer: the inbound middleware chain, the event
//! handlers, and the task that drives one socket.
//!
//! Every inbound frame passes through the same chain, composed as plain
//! function calls:
//!
//! ```text
//! rate check → decode + validate → dispatch → react
//! ```
//!
//! Handlers never close sockets or count violations themselves. They
//! return a [`Fault`], and [`react`] turns it into the one reaction the
//! fault kind calls for.

use std::sync::Arc;
use std::time::Instant;

use skirmish_anticheat::{ChatVerdict, Verdict};
use skirmish_lobby::Vec2;
use skirmish_protocol::{
    ClientEvent, Codec, CursorReport, JoinAck, JsonCodec, LobbyId, MovePacket,
    ServerEvent, Toggle,
};
use skirmish_session::AccountName;
use skirmish_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time;

use crate::server::Shared;
use crate::world::{Outbound, World};
use crate::{Fault, SkirmishError};

pub(crate) const NO_AUTHENTICATION: &str = "No Authentication";
pub(crate) const INVALID_SESSION: &str = "Invalid Session";
pub(crate) const LOBBY_NOT_FOUND: &str = "Game not found";
pub(crate) const NO_GAME: &str = "No Game";
pub(crate) const INVALID_PACKET: &str = "Invalid Packet";
pub(crate) const DUPLICATE_LOGIN: &str = "Logged in from another location";
pub(crate) const CHAT_THROTTLED: &str = "You are sending messages too quickly";
pub(crate) const IDLE_TIMEOUT: &str = "Timed out";

/// What the connection task should do after a frame was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reaction {
    Continue,
    /// Send an `error` notice with this reason, then close.
    Close(String),
}

// ---------------------------------------------------------------------------
// Middleware chain
// ---------------------------------------------------------------------------

/// Runs one inbound frame through the whole chain.
pub(crate) fn process_frame(
    world: &mut World,
    conn: ConnectionId,
    frame: &[u8],
    now: Instant,
) -> Reaction {
    let outcome = rate_check(world, conn, now)
        .and_then(|()| decode(&world.codec, frame))
        .and_then(|event| dispatch(world, conn, event, now));

    match outcome {
        Ok(()) => Reaction::Continue,
        Err(fault) => react(world, conn, fault),
    }
}

fn rate_check(world: &mut World, conn: ConnectionId, now: Instant) -> Result<(), Fault> {
    match world.anticheat.observe_packet(conn, now) {
        Verdict::Pass => Ok(()),
        verdict => Err(Fault::RateAbuse(verdict)),
    }
}

fn decode(codec: &JsonCodec, frame: &[u8]) -> Result<ClientEvent, Fault> {
    let event: ClientEvent = codec.decode(frame).map_err(Fault::Protocol)?;
    event.validate().map_err(Fault::Protocol)?;
    Ok(event)
}

fn dispatch(
    world: &mut World,
    conn: ConnectionId,
    event: ClientEvent,
    now: Instant,
) -> Result<(), Fault> {
    tracing::trace!(conn_id = %conn, event = event.name(), "inbound event");
    match event {
        ClientEvent::Authenticate(token) => authenticate(world, conn, &token),
        ClientEvent::Join(lobby_id) => join(world, conn, lobby_id),
        ClientEvent::Move(packet) => movement(world, conn, packet),
        ClientEvent::Cursor(report) => cursor(world, conn, report),
        ClientEvent::Fire(toggle) => fire(world, conn, toggle),
        ClientEvent::Chat(text) => chat(world, conn, &text),
        ClientEvent::Ping(token) => ping(world, conn, token, now),
        ClientEvent::Lobbies => {
            let listing = world.lobbies.list_public();
            world.send_to(conn, &ServerEvent::Lobbies(listing));
            Ok(())
        }
    }
}

/// Maps a fault onto its reaction.
fn react(world: &mut World, conn: ConnectionId, fault: Fault) -> Reaction {
    match fault {
        Fault::Protocol(err) => {
            tracing::debug!(conn_id = %conn, error = %err, "malformed packet");
            let verdict = world.anticheat.malformed_packet(conn);
            if verdict == Verdict::Reject {
                world.send_to(conn, &ServerEvent::Error(INVALID_PACKET.into()));
            }
            verdict_reaction(verdict)
        }
        Fault::RateAbuse(verdict) | Fault::InputImplausible(verdict) => {
            verdict_reaction(verdict)
        }
        Fault::StateRace => {
            tracing::trace!(conn_id = %conn, "message for a player that is gone, ignored");
            Reaction::Continue
        }
        Fault::ChatFlood => {
            world.send_to(conn, &ServerEvent::ChatMessage(CHAT_THROTTLED.into()));
            Reaction::Continue
        }
        Fault::Fatal(reason) => {
            tracing::info!(conn_id = %conn, reason, "closing connection");
            Reaction::Close(reason.to_string())
        }
    }
}

fn verdict_reaction(verdict: Verdict) -> Reaction {
    match verdict {
        Verdict::Kick(check) => Reaction::Close(format!("Kicked by anticheat ({check})")),
        Verdict::Pass | Verdict::Reject => Reaction::Continue,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn authenticate(world: &mut World, conn: ConnectionId, token: &str) -> Result<(), Fault> {
    let peer = world.connections.get(&conn).ok_or(Fault::StateRace)?.peer;
    let expected_source = world.bind_sessions.then_some(peer.ip());

    let account = match world.sessions.validate(token, expected_source) {
        Ok(account) => account,
        Err(e) => {
            tracing::info!(conn_id = %conn, %peer, error = %e, "authentication failed");
            return Err(Fault::Fatal(INVALID_SESSION));
        }
    };
    if world.accounts.lookup(&account).is_none() {
        tracing::info!(conn_id = %conn, %account, "session for a deleted account");
        return Err(Fault::Fatal(INVALID_SESSION));
    }

    // One connection per account: the newest wins.
    let stale: Vec<ConnectionId> = world
        .connections
        .iter()
        .filter(|(id, client)| **id != conn && client.account.as_ref() == Some(&account))
        .map(|(id, _)| *id)
        .collect();
    for id in stale {
        if let Some(client) = world.connections.get_mut(&id) {
            client.account = None;
        }
        world.kick(id, DUPLICATE_LOGIN);
    }

    tracing::info!(conn_id = %conn, %account, "player authenticated");
    if let Some(client) = world.connections.get_mut(&conn) {
        client.account = Some(account);
    }
    Ok(())
}

fn join(world: &mut World, conn: ConnectionId, lobby_id: LobbyId) -> Result<(), Fault> {
    let client = world.connections.get(&conn).ok_or(Fault::StateRace)?;
    let account = client.account.clone().ok_or(Fault::Fatal(NO_AUTHENTICATION))?;
    let previous = client.lobby.clone();

    if !world.lobbies.contains(&lobby_id) {
        return Err(Fault::Fatal(LOBBY_NOT_FOUND));
    }
    if let Some(previous) = previous.filter(|prev| *prev != lobby_id) {
        if let Ok(lobby) = world.lobbies.get_mut(&previous) {
            lobby.mark_disconnected(conn);
        }
    }

    let game = Arc::clone(&world.game);
    world
        .lobbies
        .get_mut(&lobby_id)
        .map_err(|_| Fault::Fatal(LOBBY_NOT_FOUND))?
        .join(conn, account.as_str(), &game, &mut world.rng);

    if let Some(client) = world.connections.get_mut(&conn) {
        client.lobby = Some(lobby_id.clone());
    }
    world.send_to(
        conn,
        &ServerEvent::Ack(JoinAck {
            id: conn.into_inner(),
            lobby: lobby_id,
        }),
    );
    Ok(())
}

/// The lobby the connection joined. Acting before joining is fatal.
fn joined_lobby(world: &World, conn: ConnectionId) -> Result<LobbyId, Fault> {
    match world.connections.get(&conn) {
        Some(client) => client.lobby.clone().ok_or(Fault::Fatal(NO_GAME)),
        None => Err(Fault::StateRace),
    }
}

/// Applies `f` to the connection's lobby. A lobby that timed out or a
/// player that already left is a race, not an error.
fn with_lobby(
    world: &mut World,
    conn: ConnectionId,
    f: impl FnOnce(&mut skirmish_lobby::Lobby) -> bool,
) -> Result<(), Fault> {
    let lobby_id = joined_lobby(world, conn)?;
    let lobby = world.lobbies.get_mut(&lobby_id).map_err(|_| Fault::StateRace)?;
    if f(lobby) { Ok(()) } else { Err(Fault::StateRace) }
}

fn movement(world: &mut World, conn: ConnectionId, packet: MovePacket) -> Result<(), Fault> {
    with_lobby(world, conn, |lobby| {
        lobby.set_movement(conn, packet.direction, packet.enable.is_on())
    })
}

fn cursor(world: &mut World, conn: ConnectionId, report: CursorReport) -> Result<(), Fault> {
    let lobby_id = joined_lobby(world, conn)?;
    // Only reports that reach a live player move the jump reference.
    let live = world
        .lobbies
        .get(&lobby_id)
        .is_ok_and(|lobby| lobby.player(conn).is_some());
    if !live {
        return Err(Fault::StateRace);
    }
    match world.anticheat.check_cursor(conn, report) {
        Verdict::Pass => with_lobby(world, conn, |lobby| {
            lobby.set_cursor(conn, Vec2::new(report.x, report.y))
        }),
        verdict => Err(Fault::InputImplausible(verdict)),
    }
}

fn fire(world: &mut World, conn: ConnectionId, toggle: Toggle) -> Result<(), Fault> {
    with_lobby(world, conn, |lobby| lobby.set_firing(conn, toggle.is_on()))
}

fn chat(world: &mut World, conn: ConnectionId, text: &str) -> Result<(), Fault> {
    let lobby_id = joined_lobby(world, conn)?;
    let account: AccountName = world
        .connections
        .get(&conn)
        .and_then(|client| client.account.clone())
        .ok_or(Fault::Fatal(NO_AUTHENTICATION))?;

    let text: String = text.trim().chars().take(world.game.max_chat_length).collect();
    if text.is_empty() {
        return Ok(());
    }
    if world.anticheat.charge_chat(&account, text.chars().count()) == ChatVerdict::Throttled {
        return Err(Fault::ChatFlood);
    }

    let line = ServerEvent::ChatMessage(format!("{account}: {text}"));
    let recipients: Vec<ConnectionId> = world
        .connections
        .iter()
        .filter(|(id, client)| **id != conn && client.lobby.as_ref() == Some(&lobby_id))
        .map(|(id, _)| *id)
        .collect();
    for id in recipients {
        world.send_to(id, &line);
    }
    Ok(())
}

fn ping(world: &mut World, conn: ConnectionId, token: u64, now: Instant) -> Result<(), Fault> {
    match world.anticheat.check_ping(conn, now) {
        Verdict::Pass => {
            world.send_to(conn, &ServerEvent::Pong(token));
            Ok(())
        }
        verdict => Err(Fault::RateAbuse(verdict)),
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Unregisters the connection when the handler exits, even on panic.
///
/// `Drop` is synchronous, so the async lock is taken on a spawned task.
struct ConnectionGuard {
    conn_id: ConnectionId,
    shared: Arc<Shared>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.world.lock().await.disconnect(conn_id);
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    shared: Arc<Shared>,
) -> Result<(), SkirmishError> {
    let conn_id = conn.id();
    let (tx, mut outbound) = mpsc::unbounded_channel();
    shared
        .world
        .lock()
        .await
        .connect(conn_id, conn.peer_addr(), tx, Instant::now());
    let _guard = ConnectionGuard {
        conn_id,
        shared: Arc::clone(&shared),
    };

    let result = serve(&conn, &shared, &mut outbound).await;
    if let Err(e) = conn.close().await {
        tracing::trace!(%conn_id, error = %e, "close after session end failed");
    }
    result
}

async fn serve(
    conn: &WebSocketConnection,
    shared: &Shared,
    outbound: &mut UnboundedReceiver<Outbound>,
) -> Result<(), SkirmishError> {
    let conn_id = conn.id();
    let handshake_deadline = time::Instant::now() + shared.network.handshake_timeout();
    let idle_timeout = shared.network.idle_timeout();
    let mut idle_deadline = time::Instant::now() + idle_timeout;
    let mut authenticated = false;

    loop {
        tokio::select! {
            biased;

            out = outbound.recv() => match out {
                Some(Outbound::Frame(bytes)) => conn.send(&bytes).await?,
                Some(Outbound::Close(notice)) => {
                    if let Some(reason) = notice {
                        send_notice(conn, &reason).await?;
                    }
                    return Ok(());
                }
                None => return Ok(()),
            },

            _ = time::sleep_until(handshake_deadline), if !authenticated => {
                tracing::info!(%conn_id, "no authentication before deadline");
                return close_with(conn, outbound, NO_AUTHENTICATION).await;
            }

            _ = time::sleep_until(idle_deadline) => {
                tracing::info!(%conn_id, "connection idle, closing");
                return close_with(conn, outbound, IDLE_TIMEOUT).await;
            }

            frame = conn.recv() => {
                let data = match frame? {
                    Some(data) => data,
                    None => {
                        tracing::debug!(%conn_id, "connection closed by peer");
                        return Ok(());
                    }
                };
                idle_deadline = time::Instant::now() + idle_timeout;

                let reaction = {
                    let mut world = shared.world.lock().await;
                    let reaction = process_frame(&mut world, conn_id, &data, Instant::now());
                    authenticated = world.is_authenticated(conn_id);
                    reaction
                };
                if let Reaction::Close(reason) = reaction {
                    return close_with(conn, outbound, &reason).await;
                }
            }
        }
    }
}

/// Flushes queued frames, then sends the closing notice.
async fn close_with(
    conn: &WebSocketConnection,
    outbound: &mut UnboundedReceiver<Outbound>,
    reason: &str,
) -> Result<(), SkirmishError> {
    while let Ok(out) = outbound.try_recv() {
        if let Outbound::Frame(bytes) = out {
            conn.send(&bytes).await?;
        }
    }
    send_notice(conn, reason).await
}

async fn send_notice(conn: &WebSocketConnection, reason: &str) -> Result<(), SkirmishError> {
    let bytes = JsonCodec.encode(&ServerEvent::Error(reason.to_string()))?;
    conn.send(&bytes).await?;
    Ok(())
}
