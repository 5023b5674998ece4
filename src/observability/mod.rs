//! Logging and metrics for sharefs.

use crate::config::ObservabilityConfig;
use crate::error::{Result, ShareError};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging. `RUST_LOG` overrides the configured level.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| ShareError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| ShareError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Install the global Prometheus recorder and register the sharefs metrics.
///
/// The returned handle renders the `/metrics` page.
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ShareError::Internal(format!("Failed to install metrics recorder: {}", e)))?;

    register_metrics();
    Ok(handle)
}

fn register_metrics() {
    counter!("sharefs_bytes_read").absolute(0);
    counter!("sharefs_bytes_written").absolute(0);
    gauge!("sharefs_live_sessions").set(0.0);
}

/// Record a dispatched request.
pub fn record_request(op: &'static str) {
    counter!("sharefs_requests_total", "op" => op).increment(1);
}

/// Record a refused grant or a refused unlink/rename.
pub fn record_denial(op: &'static str) {
    counter!("sharefs_denials_total", "op" => op).increment(1);
}

pub fn record_read(bytes: u64) {
    counter!("sharefs_bytes_read").increment(bytes);
}

pub fn record_write(bytes: u64) {
    counter!("sharefs_bytes_written").increment(bytes);
}

pub fn update_live_sessions(count: usize) {
    gauge!("sharefs_live_sessions").set(count as f64);
}
