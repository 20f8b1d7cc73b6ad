//! End-to-end tests: a real server on a random port, driven by WebSocket
//! clients speaking the JSON event protocol.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use skirmish::{NetworkConfig, ServerConfig, ServerHandle, SessionConfig, SkirmishServer};
use skirmish_protocol::{LobbyId, ServerEvent};
use skirmish_session::{Account, AccountName, MemoryAccountStore};
use skirmish_transport::ConnectionId;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const RECV_TIMEOUT: Duration = Duration::from_secs(3);

fn test_config() -> ServerConfig {
    ServerConfig {
        network: NetworkConfig {
            bind_addr: "127.0.0.1:0".into(),
            handshake_timeout_ms: 2_000,
            idle_timeout_ms: 10_000,
            ..NetworkConfig::default()
        },
        session: SessionConfig {
            token_secret: "integration-test-secret".into(),
            ..SessionConfig::default()
        },
        ..ServerConfig::default()
    }
}

fn accounts() -> MemoryAccountStore {
    let account = |name: &str| Account::new(AccountName::parse(name).unwrap(), "hash");
    MemoryAccountStore::new()
        .with_account(account("alice"))
        .with_account(account("bob"))
}

/// Starts a server on a random port and returns its address and handle.
async fn start_server_with(config: ServerConfig) -> (String, ServerHandle) {
    let server = SkirmishServer::builder()
        .config(config)
        .accounts(accounts())
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let handle = server.handle();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, handle)
}

async fn start_server() -> (String, ServerHandle) {
    start_server_with(test_config()).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, event: serde_json::Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .expect("send");
}

/// Next server event, or `None` once the server closed the socket.
async fn recv(ws: &mut ClientWs) -> Option<ServerEvent> {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame");
        match msg {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                return Some(serde_json::from_slice(&msg.into_data()).expect("decode"));
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Next event that is not a per-tick snapshot.
async fn recv_non_game(ws: &mut ClientWs) -> Option<ServerEvent> {
    loop {
        match recv(ws).await {
            Some(ServerEvent::Game(_)) => continue,
            other => return other,
        }
    }
}

/// Reads until the server closes, returning the last error notice seen.
async fn expect_closed_with(ws: &mut ClientWs, notice: &str) {
    let mut last_error = None;
    while let Some(event) = recv(ws).await {
        if let ServerEvent::Error(reason) = event {
            last_error = Some(reason);
        }
    }
    assert_eq!(last_error.as_deref(), Some(notice));
}

async fn authenticate(ws: &mut ClientWs, handle: &ServerHandle, account: &str) {
    let token = handle
        .issue_session(account, LOCALHOST)
        .await
        .expect("issue session");
    send(ws, json!({"event": "authenticate", "data": token})).await;
}

/// Authenticates and joins `lobby`, returning the connection's public id.
async fn login_and_join(ws: &mut ClientWs, handle: &ServerHandle, account: &str, lobby: &str) -> u64 {
    authenticate(ws, handle, account).await;
    send(ws, json!({"event": "join", "data": lobby})).await;
    match recv_non_game(ws).await {
        Some(ServerEvent::Ack(ack)) => {
            assert_eq!(ack.lobby, LobbyId::new(lobby));
            ack.id
        }
        other => panic!("expected Ack, got {other:?}"),
    }
}

// =========================================================================
// Authentication and joining
// =========================================================================

#[tokio::test]
async fn test_join_after_authenticate_acks_and_streams_snapshots() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;

    let id = login_and_join(&mut ws, &handle, "alice", "public-0").await;

    let snapshot = loop {
        match recv(&mut ws).await {
            Some(ServerEvent::Game(snapshot)) => break snapshot,
            Some(_) => continue,
            None => panic!("closed before a snapshot arrived"),
        }
    };
    let me = snapshot.players.get(&id).expect("own player in snapshot");
    assert_eq!(me.username, "alice");
}

#[tokio::test]
async fn test_join_without_authentication_is_rejected() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"event": "join", "data": "public-0"})).await;
    expect_closed_with(&mut ws, "No Authentication").await;
}

#[tokio::test]
async fn test_authenticate_with_forged_token_is_rejected() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"event": "authenticate", "data": "not-a-real-token"})).await;
    expect_closed_with(&mut ws, "Invalid Session").await;
}

#[tokio::test]
async fn test_join_unknown_lobby_is_rejected() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;

    authenticate(&mut ws, &handle, "alice").await;
    send(&mut ws, json!({"event": "join", "data": "nowhere"})).await;
    expect_closed_with(&mut ws, "Game not found").await;
}

#[tokio::test]
async fn test_join_private_lobby_created_by_operator() {
    let (addr, handle) = start_server().await;
    let lobby = handle.create_lobby().await;
    let mut ws = connect(&addr).await;

    login_and_join(&mut ws, &handle, "alice", lobby.as_str()).await;

    let summary = handle
        .lobbies()
        .await
        .into_iter()
        .find(|summary| summary.id == lobby)
        .expect("lobby listed");
    assert_eq!(summary.players, 1);
}

#[tokio::test]
async fn test_no_authentication_before_deadline_closes() {
    let mut config = test_config();
    config.network.handshake_timeout_ms = 100;
    let (addr, _handle) = start_server_with(config).await;
    let mut ws = connect(&addr).await;

    expect_closed_with(&mut ws, "No Authentication").await;
}

#[tokio::test]
async fn test_silent_connection_times_out() {
    let mut config = test_config();
    config.network.idle_timeout_ms = 200;
    let (addr, handle) = start_server_with(config).await;
    let mut ws = connect(&addr).await;

    login_and_join(&mut ws, &handle, "alice", "public-0").await;
    expect_closed_with(&mut ws, "Timed out").await;
}

#[tokio::test]
async fn test_second_login_kicks_first_connection() {
    let (addr, handle) = start_server().await;
    let mut first = connect(&addr).await;
    login_and_join(&mut first, &handle, "alice", "public-0").await;

    let mut second = connect(&addr).await;
    login_and_join(&mut second, &handle, "alice", "public-0").await;

    expect_closed_with(&mut first, "Logged in from another location").await;
}

// =========================================================================
// In-game events
// =========================================================================

#[tokio::test]
async fn test_ping_echoes_token() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;
    authenticate(&mut ws, &handle, "alice").await;

    send(&mut ws, json!({"event": "ping", "data": 1234})).await;
    assert_eq!(recv_non_game(&mut ws).await, Some(ServerEvent::Pong(1234)));
}

#[tokio::test]
async fn test_lobbies_lists_public_pool() {
    let (addr, _handle) = start_server().await;
    let mut ws = connect(&addr).await;

    send(&mut ws, json!({"event": "lobbies"})).await;
    match recv_non_game(&mut ws).await {
        Some(ServerEvent::Lobbies(listing)) => {
            assert_eq!(listing.len(), test_config().lobbies.public_pool_size);
            assert!(listing.iter().all(|entry| entry.players == 0));
            assert!(listing.iter().any(|entry| entry.id.as_str() == "public-0"));
        }
        other => panic!("expected Lobbies, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chat_reaches_other_lobby_members() {
    let (addr, handle) = start_server().await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;
    login_and_join(&mut alice, &handle, "alice", "public-1").await;
    login_and_join(&mut bob, &handle, "bob", "public-1").await;

    send(&mut alice, json!({"event": "chat", "data": "  gg  "})).await;
    assert_eq!(
        recv_non_game(&mut bob).await,
        Some(ServerEvent::ChatMessage("alice: gg".into()))
    );
}

#[tokio::test]
async fn test_malformed_packet_gets_notice_and_stays_open() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;
    authenticate(&mut ws, &handle, "alice").await;

    send(&mut ws, json!({"event": "teleport", "data": [1, 2]})).await;
    assert_eq!(
        recv_non_game(&mut ws).await,
        Some(ServerEvent::Error("Invalid Packet".into()))
    );

    send(&mut ws, json!({"event": "ping", "data": 7})).await;
    assert_eq!(recv_non_game(&mut ws).await, Some(ServerEvent::Pong(7)));
}

#[tokio::test]
async fn test_movement_moves_player_in_snapshot() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;
    let id = login_and_join(&mut ws, &handle, "alice", "public-2").await;

    let start = loop {
        if let Some(ServerEvent::Game(snapshot)) = recv(&mut ws).await {
            break snapshot.players[&id].position;
        }
    };
    // Head toward the centre so the world border cannot block the move.
    let direction = if start.x > 0.0 { "left" } else { "right" };
    send(&mut ws, json!({"event": "move", "data": {"direction": direction, "enable": "1"}})).await;

    let mut moved = false;
    for _ in 0..20 {
        if let Some(ServerEvent::Game(snapshot)) = recv(&mut ws).await {
            let pos = snapshot.players[&id].position;
            if pos.x != start.x {
                assert_eq!(pos.x > start.x, direction == "right");
                assert_eq!(pos.y, start.y);
                moved = true;
                break;
            }
        }
    }
    assert!(moved, "player never moved");
}

// =========================================================================
// Operator control
// =========================================================================

#[tokio::test]
async fn test_operator_kick_sends_notice() {
    let (addr, handle) = start_server().await;
    let mut ws = connect(&addr).await;
    let id = login_and_join(&mut ws, &handle, "alice", "public-0").await;

    assert!(handle.kick(ConnectionId::new(id), "Kicked by operator").await);
    expect_closed_with(&mut ws, "Kicked by operator").await;
    assert!(!handle.kick(ConnectionId::new(id), "Kicked by operator").await);
}

#[tokio::test]
async fn test_shutdown_notifies_every_client() {
    let (addr, handle) = start_server().await;
    let mut alice = connect(&addr).await;
    let mut bob = connect(&addr).await;
    login_and_join(&mut alice, &handle, "alice", "public-0").await;
    authenticate(&mut bob, &handle, "bob").await;

    handle.shutdown();

    expect_closed_with(&mut alice, "Server shutting down").await;
    expect_closed_with(&mut bob, "Server shutting down").await;
}

#[tokio::test]
async fn test_issue_session_for_unknown_account_fails() {
    let (_addr, handle) = start_server().await;
    assert!(handle.issue_session("mallory", LOCALHOST).await.is_err());
}

#[tokio::test]
async fn test_reload_without_config_file_fails() {
    let (_addr, handle) = start_server().await;
    assert!(matches!(
        handle.reload().await,
        Err(skirmish::SkirmishError::NoConfigFile)
    ));
}
