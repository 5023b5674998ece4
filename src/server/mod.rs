//! The file server: shares one directory tree with any number of clients.
//!
//! Every request except `init_session`, `close_session` and `/health` must
//! carry a live session cookie. The access ledger decides which handles may
//! be opened; storage only sees requests the ledger has already accepted.

pub mod handlers;
pub mod session;

use crate::config::ShareConfig;
use crate::error::{Result, ShareError};
use crate::ledger::SharedLedger;
use crate::observability;
use crate::protocol::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::storage::LocalStorage;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// State shared by every request handler.
#[derive(Clone)]
pub struct ServerState {
    pub ledger: SharedLedger,
    pub storage: Arc<LocalStorage>,
}

impl ServerState {
    pub fn new(ledger: SharedLedger, storage: LocalStorage) -> Self {
        Self {
            ledger,
            storage: Arc::new(storage),
        }
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.is_ledger_violation() => StatusCode::FORBIDDEN,
            ShareError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ShareError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, self.to_string()).into_response()
    }
}

/// Build the HTTP router. Write bodies may be up to `max_write_bytes` long.
pub fn router(
    state: ServerState,
    max_write_bytes: usize,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let protected = Router::new()
        .route(routes::CREATE, get(handlers::create))
        .route(routes::OPEN, get(handlers::open))
        .route(routes::RELEASE, get(handlers::release))
        .route(routes::READ, get(handlers::read))
        .route(
            routes::WRITE,
            post(handlers::write).layer(DefaultBodyLimit::max(max_write_bytes)),
        )
        .route(routes::GETATTR_ROOT, get(handlers::getattr_root))
        .route(routes::GETATTR, get(handlers::getattr))
        .route(routes::READDIR_ROOT, get(handlers::readdir_root))
        .route(routes::READDIR, get(handlers::readdir))
        .route(routes::READDIR_PLUS_ROOT, get(handlers::readdir_plus_root))
        .route(routes::READDIR_PLUS, get(handlers::readdir_plus))
        .route(routes::MKDIR, get(handlers::mkdir))
        .route(routes::UNLINK, get(handlers::unlink))
        .route(routes::RMDIR, get(handlers::rmdir))
        .route(routes::RENAME, get(handlers::rename))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    let app = Router::new()
        .route(routes::HEALTH, get(health_check))
        .route(routes::INIT_SESSION, get(handlers::init_session))
        .route(routes::CLOSE_SESSION, get(handlers::close_session))
        .merge(protected)
        .with_state(state);

    match metrics {
        Some(handle) => app.route(
            routes::METRICS,
            get(move || async move { handle.render() }),
        ),
        None => app,
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// A configured file server, ready to bind.
pub struct ShareServer {
    config: ShareConfig,
    state: ServerState,
}

impl ShareServer {
    /// Open the shared root (creating it if absent) and an empty ledger.
    pub fn new(config: ShareConfig) -> Result<Self> {
        let storage = LocalStorage::open_or_create(&config.server.root_dir)?;
        let ledger = SharedLedger::new(config.ledger.clone());
        Ok(Self {
            state: ServerState::new(ledger, storage),
            config,
        })
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.server.bind_addr).await?;
        Ok(listener)
    }

    /// Serve on `listener` until the coordinator shuts down.
    pub async fn serve(self, listener: TcpListener, coordinator: ShutdownCoordinator) -> Result<()> {
        let reaper = self.config.ledger.session_idle_timeout.map(|idle| {
            info!(idle_secs = idle.as_secs(), "Idle session reaper enabled");
            self.state.ledger.spawn_reaper(
                idle,
                self.config.ledger.reaper_interval,
                coordinator.watch(),
            )
        });

        let metrics = if self.config.observability.metrics_enabled {
            match observability::install_metrics_recorder() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "Metrics disabled");
                    None
                }
            }
        } else {
            None
        };

        let app = router(self.state, self.config.server.max_write_bytes, metrics);

        info!(
            addr = %listener.local_addr()?,
            root = %self.config.server.root_dir.display(),
            "File server listening"
        );

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { coordinator.wait_for_shutdown().await })
            .await
            .map_err(|e| ShareError::Network(e.to_string()));

        if let Some(reaper) = reaper {
            reaper.abort();
        }

        info!("File server stopped");
        result
    }

    /// Bind and serve.
    pub async fn run(self, coordinator: ShutdownCoordinator) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, coordinator).await
    }
}

/// Run the file server described by `config` until shutdown.
pub async fn run_share_server(config: ShareConfig, coordinator: ShutdownCoordinator) -> Result<()> {
    info!(root = %config.server.root_dir.display(), "Starting file server");
    ShareServer::new(config)?.run(coordinator).await
}
