//! Live reload development server.
//!
//! This crate provides a static file server that keeps an event stream open
//! to every browser tab and tells them to reload when files change:
//!
//! - Static files from one or more directories (first match wins)
//! - `GET /__mini_sync__`: server-push event stream
//! - `GET /__mini_sync__/client.js`: the browser-side client
//! - `GET /favicon.ico`: a fixed icon
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use minisync_server::{DevServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = DevServer::new(ServerConfig {
//!         dirs: vec![PathBuf::from("app")],
//!         port: 3000,
//!         ..ServerConfig::default()
//!     });
//!
//!     let info = server.start().await.unwrap();
//!     println!("Now serving at: {}", info.local);
//!
//!     // any time a file changes, use "reload"
//!     server.reload(Some("app.css"));
//!
//!     // reloads the whole page
//!     server.reload(None);
//!
//!     server.close().await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! controlling process ──start()──► PortBinder ──► axum (app::create_router)
//!        │                                             │
//!        │                                             ├─► /__mini_sync__ ──► ConnectionRegistry
//!        │                                             └─► static files (tower-http ServeDir)
//!        │
//!        └──reload(file)──► Broadcaster ──for_each──► every registered stream
//! ```

mod app;
mod binder;
mod broadcaster;
mod connection;
mod error;
mod event;
mod handlers;
mod middleware;
mod network;
mod registry;
mod state;
mod static_files;
mod watch;

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch as signal;
use tokio::task::JoinHandle;

pub use binder::{BindError, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, PortBinder};
pub use broadcaster::{BroadcastReport, Broadcaster};
pub use connection::{CloseReason, ConnectionLifecycle};
pub use error::ServerError;
pub use event::{EventKind, PING_FRAME, ReloadEvent, retry_frame};
pub use registry::{ConnectionId, ConnectionRegistry, FrameSink, SinkError};
pub use watch::{ChangeKind, DEFAULT_DEBOUNCE, DirWatcher, FileChange, WatchHandle};

use state::AppState;

/// Path of the event-stream endpoint.
pub const EVENT_PATH: &str = "/__mini_sync__";

/// Path of the browser-side client script.
pub const CLIENT_SCRIPT_PATH: &str = "/__mini_sync__/client.js";

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Preferred port. The next free port is used on conflict.
    pub port: u16,
    /// Directories to serve, in lookup order.
    pub dirs: Vec<PathBuf>,
    /// Inject the client script into served HTML pages.
    pub inject_client_script: bool,
    /// Ports tried before giving up.
    pub max_port_attempts: u32,
    /// Delay before trying the next port.
    pub port_retry_delay: Duration,
    /// Interval between keepalive frames.
    pub keepalive_interval: Duration,
    /// Reconnect hint sent to clients.
    pub retry_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            dirs: vec![PathBuf::from(".")],
            inject_client_script: true,
            max_port_attempts: DEFAULT_MAX_ATTEMPTS,
            port_retry_delay: DEFAULT_RETRY_DELAY,
            keepalive_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(10),
        }
    }
}

/// Create server configuration from minisync config.
#[must_use]
pub fn server_config_from_config(config: &minisync_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        dirs: config.serve_resolved.dirs.clone(),
        inject_client_script: config.serve_resolved.inject_client_script,
        max_port_attempts: config.server.max_port_attempts,
        port_retry_delay: DEFAULT_RETRY_DELAY,
        keepalive_interval: config.live_reload.keepalive_interval(),
        retry_interval: config.live_reload.retry_interval(),
    }
}

/// Addresses of a started server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartInfo {
    /// URL on this machine, e.g. `http://localhost:3000`.
    pub local: String,
    /// URL on the local network, or the local URL when none is known.
    pub network: String,
    /// Port the server ended up on.
    pub port: u16,
}

/// Running server tasks.
struct Session {
    port: u16,
    serve: JoinHandle<io::Result<()>>,
    keepalive: JoinHandle<()>,
}

enum Lifecycle {
    Created,
    Starting,
    Listening(Session),
    Closing,
    Closed,
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Listening(_) => "listening",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Live reload development server.
///
/// Owns its own connection registry, so several servers in one process
/// never see each other's clients. `start` and `close` are meant to be
/// called from one controlling task.
pub struct DevServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    lifecycle: Mutex<Lifecycle>,
    shutdown: signal::Sender<bool>,
}

impl DevServer {
    /// Create a server. Nothing is bound until [`start`](Self::start).
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let (shutdown, _) = signal::channel(false);

        Self {
            config,
            registry,
            broadcaster,
            lifecycle: Mutex::new(Lifecycle::Created),
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a port and begin serving.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if no port could be bound or `close`
    /// was called meanwhile, and [`ServerError::InvalidState`] if the server
    /// was already started.
    pub async fn start(&self) -> Result<StartInfo, ServerError> {
        {
            let mut lifecycle = self.lock();
            if !matches!(*lifecycle, Lifecycle::Created) {
                return Err(ServerError::InvalidState(lifecycle.name()));
            }
            *lifecycle = Lifecycle::Starting;
        }

        let binder = PortBinder::new(self.config.host.clone())
            .with_max_attempts(self.config.max_port_attempts)
            .with_retry_delay(self.config.port_retry_delay);

        let (listener, port) = match binder.bind(self.config.port, self.shutdown.subscribe()).await {
            Ok(bound) => bound,
            Err(err) => {
                let mut lifecycle = self.lock();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Closed;
                }
                return Err(err.into());
            }
        };

        let mut lifecycle = self.lock();
        if !matches!(*lifecycle, Lifecycle::Starting) {
            // Closed while binding; never report a stale listening state.
            return Err(BindError::Cancelled.into());
        }

        let state = Arc::new(AppState {
            registry: Arc::clone(&self.registry),
            dirs: self.config.dirs.clone(),
            inject_client_script: self.config.inject_client_script,
            retry_interval: self.config.retry_interval,
        });
        let router = app::create_router(state);

        let mut stop = self.shutdown.subscribe();
        let serve = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { binder::cancelled(&mut stop).await })
                .await
        });
        let keepalive = tokio::spawn(keepalive_loop(
            self.broadcaster.clone(),
            self.config.keepalive_interval,
            self.shutdown.subscribe(),
        ));

        *lifecycle = Lifecycle::Listening(Session {
            port,
            serve,
            keepalive,
        });
        drop(lifecycle);

        let info = StartInfo {
            local: network::local_url(&self.config.host, port),
            network: network::network_url(&self.config.host, port),
            port,
        };
        tracing::info!(port, local = %info.local, network = %info.network, "Server listening");
        Ok(info)
    }

    /// Tell every connected client to reload.
    ///
    /// `None` (or an empty path) reloads whole pages; a path asks clients
    /// to refresh just that asset. Delivery is fire-and-forget; events are
    /// dropped when nobody is connected.
    pub fn reload(&self, file: Option<&str>) -> BroadcastReport {
        let event = ReloadEvent::reload(file);
        let report = self.broadcaster.broadcast(&event);
        tracing::info!(
            file = event.file().unwrap_or("<page>"),
            clients = report.delivered(),
            "Reload sent"
        );
        report
    }

    /// Stop the server and terminate every open event stream.
    ///
    /// Calling `close` while `start` is still looking for a port cancels
    /// the search.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the server is not started and
    /// [`ServerError::Close`] if the listener fails while shutting down.
    pub async fn close(&self) -> Result<(), ServerError> {
        let session = {
            let mut lifecycle = self.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Closing) {
                Lifecycle::Listening(session) => session,
                Lifecycle::Starting => {
                    *lifecycle = Lifecycle::Closed;
                    drop(lifecycle);
                    self.shutdown.send_replace(true);
                    self.registry.close_all();
                    tracing::info!("Server closed before it started listening");
                    return Ok(());
                }
                other => {
                    *lifecycle = other;
                    return Err(ServerError::NotRunning);
                }
            }
        };

        self.shutdown.send_replace(true);
        let terminated = self.registry.close_all();

        if let Err(err) = session.keepalive.await {
            tracing::warn!(error = %err, "Keepalive task failed");
        }
        let result = match session.serve.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ServerError::Close(err)),
            Err(err) => Err(ServerError::Close(io::Error::other(err))),
        };

        *self.lock() = Lifecycle::Closed;
        tracing::info!(port = session.port, terminated, "Server closed");
        result
    }

    /// Port the server is listening on, if started.
    pub fn port(&self) -> Option<u16> {
        match &*self.lock() {
            Lifecycle::Listening(session) => Some(session.port),
            _ => None,
        }
    }

    /// Number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        self.registry.close_all();
    }
}

/// Send keepalive frames every `period` until shutdown.
async fn keepalive_loop(
    broadcaster: Broadcaster,
    period: Duration,
    mut shutdown: signal::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = broadcaster.keepalive();
                tracing::trace!(attempted = report.attempted, failed = report.failed, "Keepalive sent");
            }
            () = binder::cancelled(&mut shutdown) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
            dirs: Vec::new(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_reports_bound_port() {
        let server = DevServer::new(config());

        let info = server.start().await.unwrap();

        assert_ne!(info.port, 0);
        assert_eq!(server.port(), Some(info.port));
        assert_eq!(info.local, format!("http://localhost:{}", info.port));
        server.close().await.unwrap();
        assert_eq!(server.port(), None);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let server = DevServer::new(config());
        server.start().await.unwrap();

        let err = server.start().await.unwrap_err();

        assert!(matches!(err, ServerError::InvalidState("listening")));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_unstarted_is_error() {
        let server = DevServer::new(config());
        assert!(matches!(server.close().await, Err(ServerError::NotRunning)));
    }

    #[tokio::test]
    async fn test_close_twice_is_error() {
        let server = DevServer::new(config());
        server.start().await.unwrap();
        server.close().await.unwrap();

        assert!(matches!(server.close().await, Err(ServerError::NotRunning)));
    }

    #[tokio::test]
    async fn test_reload_without_clients_is_dropped() {
        let server = DevServer::new(config());
        let report = server.reload(None);
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_close_during_port_search_cancels_start() {
        let blocker = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = blocker.local_addr().unwrap().port();
        let server = Arc::new(DevServer::new(ServerConfig {
            port,
            port_retry_delay: Duration::from_secs(30),
            ..config()
        }));

        let starter = Arc::clone(&server);
        let start = tokio::spawn(async move { starter.start().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), start)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Bind(BindError::Cancelled))
        ));
        assert_eq!(server.port(), None);
    }

    #[test]
    fn test_server_config_from_config() {
        let config = minisync_config::Config::default();
        let server_config = server_config_from_config(&config);

        assert_eq!(server_config.host, "0.0.0.0");
        assert_eq!(server_config.port, 3000);
        assert_eq!(server_config.dirs, vec![PathBuf::from(".")]);
        assert!(server_config.inject_client_script);
        assert_eq!(server_config.max_port_attempts, 100);
        assert_eq!(server_config.keepalive_interval, Duration::from_secs(10));
        assert_eq!(server_config.retry_interval, Duration::from_secs(10));
    }
}
