//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the single dispatch handler
//! - Wire up middleware (request id, tracing, timeout)
//! - Bind every configured address and serve it, with TLS when secure
//! - Dispatch each request to the WebSocket tunnel, the HTTP relay or static files
//! - Stop all listeners and tunnels through one shutdown token
//!
//! # Data Flow
//! ```text
//! request ─▶ relay prefix? ─ yes ─▶ websocket upgrade? ─ yes ─▶ websocket::tunnel
//!                 │                         └──────── no ──▶ relay::forward
//!                 └─ no ──▶ static_files::serve
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ListenConfig, MimeTable, ServerConfig, TimeoutConfig};
use crate::http::relay::{self, RelayClient};
use crate::http::request::raw_path;
use crate::http::static_files;
use crate::http::websocket::{self, TunnelSettings};
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{self, BoundListener, ListenerError};
use crate::net::tls::load_tls_config;
use crate::routing::{Router as RelayRouter, StaticResolver};

/// Failure to start or run the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error("secure listener requires a certificate and a private key")]
    MissingTls,

    #[error("failed to load TLS certificate: {0}")]
    Tls(#[source] io::Error),

    #[error("listener failed: {0}")]
    Serve(#[source] io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RelayRouter>,
    pub resolver: Arc<StaticResolver>,
    pub mime_types: Arc<MimeTable>,
    pub client: RelayClient,
    pub tunnels: TunnelSettings,
    pub shutdown: Shutdown,
}

/// The embeddable server, configured but not yet listening.
pub struct HttpServer {
    router: Router,
    stop_grace: Duration,
    shutdown: Shutdown,
    tunnels: ConnectionTracker,
}

impl HttpServer {
    /// Compile the route tables and build the handler stack.
    pub fn new(config: ServerConfig, shutdown: Shutdown) -> Result<Self, ConfigError> {
        let resolver = StaticResolver::compile(&config.served_dir, &config.routes)?;
        let relays = RelayRouter::from_config(&config.routes);
        let tunnels = ConnectionTracker::new();

        tracing::debug!(
            root = %resolver.root().display(),
            relays = relays.relay_count(),
            redirects = config.routes.redirect.len(),
            mappings = config.routes.mapping.len(),
            "Route tables compiled"
        );

        let state = AppState {
            router: Arc::new(relays),
            resolver: Arc::new(resolver),
            mime_types: Arc::new(config.mime_types.clone()),
            client: relay::build_client(&config.timeouts),
            tunnels: TunnelSettings {
                shutdown: shutdown.clone(),
                tracker: tunnels.clone(),
                connect_timeout: Duration::from_secs(config.timeouts.connect_secs),
            },
            shutdown: shutdown.clone(),
        };

        let router = Self::build_router(&config.timeouts, state);
        Ok(Self {
            router,
            stop_grace: Duration::from_secs(config.timeouts.stop_grace_secs),
            shutdown,
            tunnels,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(timeouts: &TimeoutConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(timeouts.request_secs))),
            )
    }

    /// Bind every configured address and start serving.
    ///
    /// Nothing is served unless every address binds.
    pub async fn start(self, listen: &ListenConfig) -> Result<RunningServer, ServerError> {
        let tls = if listen.secure {
            let tls = listen.tls.as_ref().ok_or(ServerError::MissingTls)?;
            Some(load_tls_config(tls).await.map_err(ServerError::Tls)?)
        } else {
            None
        };

        let mut bound = Vec::new();
        for address in listen.bind_addresses() {
            bound.push(listener::bind(&address, listen.port(), listen.scheme()).await?);
        }

        let stop_grace = self.stop_grace;
        let mut tasks = JoinSet::new();
        let mut prefixes = Vec::with_capacity(bound.len());
        let mut local_addrs = Vec::with_capacity(bound.len());

        for BoundListener {
            prefix,
            local_addr,
            listener,
        } in bound
        {
            let app = self.router.clone();

            match &tls {
                Some(tls) => {
                    let std_listener = listener.into_std().map_err(|source| ListenerError {
                        address: local_addr.to_string(),
                        source,
                    })?;
                    let handle = axum_server::Handle::new();
                    let stopping = handle.clone();
                    let token = self.shutdown.subscribe();
                    tokio::spawn(async move {
                        token.cancelled().await;
                        stopping.graceful_shutdown(Some(stop_grace));
                    });
                    let server = axum_server::from_tcp_rustls(std_listener, tls.clone()).handle(handle);
                    tasks.spawn(async move { server.serve(app.into_make_service()).await });
                }
                None => {
                    let token = self.shutdown.subscribe();
                    tasks.spawn(async move {
                        axum::serve(listener, app)
                            .with_graceful_shutdown(token.cancelled_owned())
                            .await
                    });
                }
            }

            tracing::info!(prefix = %prefix, address = %local_addr, "Listening");
            prefixes.push(prefix);
            local_addrs.push(local_addr);
        }

        Ok(RunningServer {
            shutdown: self.shutdown,
            prefixes,
            local_addrs,
            tasks,
            tunnels: self.tunnels,
            stop_grace,
        })
    }
}

/// Build the server from `config` and start listening as `listen` describes.
pub async fn start(config: ServerConfig, listen: &ListenConfig) -> Result<RunningServer, ServerError> {
    HttpServer::new(config, Shutdown::new())?.start(listen).await
}

/// A server that is accepting connections.
///
/// Dropping it aborts the listeners without a graceful stop.
pub struct RunningServer {
    shutdown: Shutdown,
    prefixes: Vec<String>,
    local_addrs: Vec<SocketAddr>,
    tasks: JoinSet<io::Result<()>>,
    tunnels: ConnectionTracker,
    stop_grace: Duration,
}

impl RunningServer {
    /// Prefixes as configured, e.g. `http://localhost:8080/`.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Socket addresses actually bound, one per prefix.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// WebSocket tunnels currently open.
    pub fn active_tunnels(&self) -> u64 {
        self.tunnels.active_count()
    }

    /// Stop accepting, close tunnels and let in-flight requests finish.
    ///
    /// Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown.is_triggered() {
            tracing::info!("Stopping server");
        }
        self.shutdown.trigger();
    }

    /// Wait until every listener has stopped.
    ///
    /// Connections still open `stop_grace` after shutdown is triggered are aborted.
    pub async fn wait(mut self) -> Result<(), ServerError> {
        let shutdown = self.shutdown.clone();
        let grace = self.stop_grace;
        let deadline = async move {
            shutdown.triggered().await;
            tokio::time::sleep(grace).await;
        };
        tokio::pin!(deadline);

        let mut result = Ok(());
        let mut aborted = false;
        loop {
            tokio::select! {
                joined = self.tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        tracing::error!(error = %e, "Listener failed");
                        if result.is_ok() {
                            result = Err(ServerError::Serve(e));
                        }
                        self.shutdown.trigger();
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Listener task panicked");
                        self.shutdown.trigger();
                    }
                },
                _ = &mut deadline, if !aborted => {
                    tracing::warn!(grace = ?grace, "Connections still open after stop grace, aborting");
                    self.tasks.abort_all();
                    aborted = true;
                }
            }
        }

        tracing::info!("Server stopped");
        result
    }

    /// Trigger [`RunningServer::stop`] and wait for completion.
    pub async fn stop_and_wait(self) -> Result<(), ServerError> {
        self.stop();
        self.wait().await
    }
}

/// Route one request to the tunnel, the relay or the static files.
async fn dispatch(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request<Body>,
) -> Response {
    tracing::debug!(method = %request.method(), path = %request.uri().path(), "Request");

    let path = raw_path(request.uri()).to_string();
    if let Some(target) = state.router.match_relay(&path) {
        tracing::debug!(prefix = target.prefix, host = target.host_id, "Relay matched");
        return match upgrade {
            Ok(upgrade) => websocket::tunnel(&state.tunnels, upgrade, request, target.host).await,
            Err(_) => relay::forward(&state.client, &state.shutdown, request, target.host).await,
        };
    }

    static_files::serve(&state.resolver, &state.mime_types, request.uri().path()).await
}
