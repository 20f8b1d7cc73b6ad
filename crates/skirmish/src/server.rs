//! `SkirmishServer` builder and server loops.
//!
//! This is the entry point for running a Skirmish game server. It ties
//! together all the layers: transport → protocol → world, plus the tick
//! loop that advances every lobby.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use skirmish_protocol::LobbyId;
use skirmish_session::{AccountStore, MemoryAccountStore};
use skirmish_tick::TickScheduler;
use skirmish_transport::{Connection, ConnectionId, Transport, WebSocketTransport};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;

use crate::config::NetworkConfig;
use crate::handler::handle_connection;
use crate::world::{LobbySummary, World};
use crate::{ConfigError, ServerConfig, SkirmishError};

/// Notice every client receives on graceful shutdown.
pub const SHUTDOWN_NOTICE: &str = "Server shutting down";

/// How long shutdown waits for connections to flush their last frames.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Shared server state passed to each connection task and the tick loop.
pub(crate) struct Shared {
    pub(crate) world: Mutex<World>,
    pub(crate) network: NetworkConfig,
    config_path: Option<PathBuf>,
    shutdown: watch::Sender<bool>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Skirmish server.
///
/// # Example
///
/// ```rust,ignore
/// let server = SkirmishServer::builder()
///     .config_file("skirmish.toml")?
///     .bind("127.0.0.1:0")
///     .build()
///     .await?;
/// let handle = server.handle();
/// server.run().await
/// ```
pub struct SkirmishServerBuilder {
    config: ServerConfig,
    config_path: Option<PathBuf>,
    accounts: Arc<dyn AccountStore>,
}

impl SkirmishServerBuilder {
    /// Creates a new builder with default settings and no accounts.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            config_path: None,
            accounts: Arc::new(MemoryAccountStore::new()),
        }
    }

    /// Uses `config` as is. `reload` will not be available.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the config from `path` and remembers the path for `reload`.
    ///
    /// # Errors
    /// Any [`ConfigError`] from loading the file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        self.config = ServerConfig::load(path)?;
        self.config_path = Some(path.to_path_buf());
        Ok(self)
    }

    /// Overrides `network.bind_addr`.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.network.bind_addr = addr.into();
        self
    }

    /// Sets the account store sessions are checked against.
    pub fn accounts(mut self, accounts: impl AccountStore) -> Self {
        let accounts: Arc<dyn AccountStore> = Arc::new(accounts);
        self.accounts = accounts;
        self
    }

    /// Validates the config, binds the listener and builds the world.
    pub async fn build(self) -> Result<SkirmishServer, SkirmishError> {
        self.config.validate()?;
        let transport = WebSocketTransport::bind_with(
            &self.config.network.bind_addr,
            self.config.network.transport(),
        )
        .await?;
        let world = World::new(&self.config, self.accounts);
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            world: Mutex::new(world),
            network: self.config.network,
            config_path: self.config_path,
            shutdown,
        });
        Ok(SkirmishServer { transport, shared })
    }
}

impl Default for SkirmishServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Skirmish server. Call [`run()`](Self::run) to start serving.
pub struct SkirmishServer {
    transport: WebSocketTransport,
    shared: Arc<Shared>,
}

impl SkirmishServer {
    pub fn builder() -> SkirmishServerBuilder {
        SkirmishServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle for controlling the server once `run` owns it.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Serves until [`ServerHandle::shutdown`] is called.
    ///
    /// Spawns the tick loop, then accepts connections and spawns a task
    /// for each. On shutdown every client gets [`SHUTDOWN_NOTICE`] and is
    /// closed.
    pub async fn run(mut self) -> Result<(), SkirmishError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Skirmish server running");

        let ticker = tokio::spawn(tick_loop(
            Arc::clone(&self.shared),
            self.shared.shutdown.subscribe(),
        ));
        let mut shutdown = self.shared.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let shared = Arc::clone(&self.shared);
                        connections.spawn(async move {
                            let conn_id = conn.id();
                            if let Err(e) = handle_connection(conn, shared).await {
                                tracing::debug!(%conn_id, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::debug!(error = %e, "client dropped during accept"),
                },
            }
            while connections.try_join_next().is_some() {}
        }

        self.shared.world.lock().await.close_all(SHUTDOWN_NOTICE);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = connections.len(), "connections did not close in time, aborting");
            connections.abort_all();
        }
        if let Err(e) = ticker.await {
            tracing::warn!(error = %e, "tick loop panicked");
        }
        tracing::info!("Skirmish server stopped");
        Ok(())
    }
}

/// Drives [`World::tick`] at the configured interval until shutdown.
async fn tick_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let interval = shared.world.lock().await.tick_interval();
    let mut scheduler = TickScheduler::with_interval(interval);

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            info = scheduler.wait_for_tick() => {
                let interval = {
                    let mut world = shared.world.lock().await;
                    world.tick(info.tick);
                    world.tick_interval()
                };
                scheduler.record_tick_end();
                if interval != scheduler.interval() {
                    scheduler.set_interval(interval);
                }
            }
        }
    }

    let metrics = scheduler.metrics();
    tracing::debug!(
        ticks = metrics.total_ticks,
        overruns = metrics.total_overruns,
        skipped = metrics.total_skipped,
        max_tick_ms = metrics.max_tick_time.as_secs_f64() * 1000.0,
        "tick loop stopped"
    );
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable control surface for a running server: the operator
/// console and the external login front use it.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Issues a session token for `account`, bound to `source`.
    ///
    /// # Errors
    /// See [`World::issue_session`].
    pub async fn issue_session(
        &self,
        account: &str,
        source: IpAddr,
    ) -> Result<String, SkirmishError> {
        self.shared.world.lock().await.issue_session(account, source)
    }

    /// Starts a graceful shutdown. `run` returns once it completes.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.shared.shutdown.send_replace(true);
    }

    /// Re-reads the config file and swaps in its `[game]` and
    /// `[anticheat]` sections. Network and session settings stay as they
    /// were at startup.
    ///
    /// # Errors
    /// [`SkirmishError::NoConfigFile`] if the server was built without a
    /// file, or any [`ConfigError`] from the file.
    pub async fn reload(&self) -> Result<(), SkirmishError> {
        let path = self
            .shared
            .config_path
            .as_ref()
            .ok_or(SkirmishError::NoConfigFile)?;
        let config = ServerConfig::load(path)?;
        self.shared
            .world
            .lock()
            .await
            .reload(config.game, config.anticheat);
        Ok(())
    }

    /// Kicks a connection. Returns `false` if it doesn't exist.
    pub async fn kick(&self, conn: ConnectionId, reason: &str) -> bool {
        self.shared.world.lock().await.kick(conn, reason)
    }

    pub async fn create_lobby(&self) -> LobbyId {
        self.shared.world.lock().await.create_private_lobby()
    }

    pub async fn lobbies(&self) -> Vec<LobbySummary> {
        self.shared.world.lock().await.lobby_summaries()
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.world.lock().await.connection_count()
    }
}
