//! sharefs - a shared directory tree served from one host and mounted on many.
//!
//! One server exports a local directory over HTTP. Each client mounts it with
//! FUSE and holds a session for the life of the mount. The server keeps an
//! access ledger of sessions and open handles and grants at most one writer
//! per path at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐        ┌──────────────────────────────┐
//! │ client                       │        │ server                       │
//! │  fuse::ShareFuse             │  HTTP  │  server::router              │
//! │   └ client::RemoteFs         │ ─────> │   ├ ledger::SharedLedger     │
//! │      └ client::ShareClient   │ cookie │   └ storage::LocalStorage    │
//! └──────────────────────────────┘        └──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use sharefs::config::ShareConfig;
//!
//! #[tokio::main]
//! async fn main() -> sharefs::Result<()> {
//!     let config = ShareConfig::development();
//!     sharefs::run(config).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod ledger;
pub mod protocol;
pub mod shutdown;
pub mod storage;

pub mod cli;
pub mod client;
pub mod fuse;
pub mod observability;
pub mod server;

// Re-exports
pub use error::{Result, ShareError};

use config::ShareConfig;
use shutdown::{shutdown_on_signal, ShutdownCoordinator};
use tracing::{error, info};

/// Run the file server until SIGINT or SIGTERM.
pub async fn run(config: ShareConfig) -> Result<()> {
    let coordinator = ShutdownCoordinator::new();

    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_on_signal(signal_coordinator).await {
            error!(error = %e, "Failed to install signal handlers");
        }
    });

    let result = server::run_share_server(config, coordinator.clone()).await;
    coordinator.shutdown();

    info!("sharefs shutdown complete");
    result
}
