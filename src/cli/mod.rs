//! Command-line interface for sharefs.

use crate::config::ShareConfig;
use crate::error::{Result, ShareError};
use clap::{Parser, Subcommand};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// sharefs - share one directory tree with many machines over FUSE.
#[derive(Parser)]
#[command(name = "sharefs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "SHAREFS_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Serve a local directory to sharefs clients
    Server {
        /// Directory to share (created if absent)
        root_dir: PathBuf,

        /// Listening address
        #[arg(short, long)]
        bind_address: Option<String>,

        /// Listening port
        #[arg(short, long)]
        port: Option<u16>,

        /// Configuration file path
        #[arg(short, long, env = "SHAREFS_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Mount a remote share
    #[cfg(feature = "fuse")]
    Mount {
        /// Local directory to mount on (created if absent)
        mount_point: PathBuf,

        /// Remote server URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        server_url: String,

        /// Print verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Build the server configuration: file (or defaults), then flags on top.
pub fn server_config(
    config_file: Option<&Path>,
    root_dir: &Path,
    bind_address: Option<&str>,
    port: Option<u16>,
    log_level: Option<&str>,
) -> Result<ShareConfig> {
    let mut config = match config_file {
        Some(path) => ShareConfig::from_file(path)?,
        None => ShareConfig::default(),
    };

    config.server.root_dir = root_dir.to_path_buf();

    if bind_address.is_some() || port.is_some() {
        let host = bind_address
            .map(str::to_string)
            .unwrap_or_else(|| config.server.bind_addr.ip().to_string());
        let port = port.unwrap_or(config.server.bind_addr.port());
        config.server.bind_addr = resolve_bind(&host, port)?;
    }

    if let Some(level) = log_level {
        config.observability.log_level = level.to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Resolve `host` (a name or an IP) to a listening address.
pub fn resolve_bind(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| ShareError::InvalidConfig {
            field: "server.bind_addr".to_string(),
            reason: format!("{}: {}", host, e),
        })?
        .next()
        .ok_or_else(|| ShareError::InvalidConfig {
            field: "server.bind_addr".to_string(),
            reason: format!("{} resolved to no address", host),
        })
}
