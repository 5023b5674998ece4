//! Graceful shutdown for the file server.
//!
//! A [`ShutdownCoordinator`] is flipped once, by a signal or by the caller.
//! Long-running tasks (the HTTP listener, the idle-session reaper) watch it
//! and stop when it flips.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared shutdown flag.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    watch_rx: watch::Receiver<bool>,
    watch_tx: Arc<watch::Sender<bool>>,
    is_shutting_down: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (watch_tx, watch_rx) = watch::channel(false);
        Self {
            watch_rx,
            watch_tx: Arc::new(watch_tx),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a watch receiver for shutdown status.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.watch_rx.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate shutdown. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown");
            let _ = self.watch_tx.send(true);
        }
    }

    /// Resolve once shutdown has been initiated.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.watch_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT or SIGTERM, then shut the coordinator down.
#[cfg(unix)]
pub async fn shutdown_on_signal(coordinator: ShutdownCoordinator) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = coordinator.wait_for_shutdown() => return Ok(()),
    }

    coordinator.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_flips_once() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());

        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_watch() {
        let coordinator = ShutdownCoordinator::new();
        let mut watch = coordinator.watch();
        assert!(!*watch.borrow());

        coordinator.shutdown();

        watch.changed().await.unwrap();
        assert!(*watch.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_shutdown().await })
        };

        coordinator.shutdown();
        let result = tokio::time::timeout(Duration::from_millis(500), waiter).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_signal_waiter_returns_on_manual_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let task = tokio::spawn(shutdown_on_signal(coordinator.clone()));

        coordinator.shutdown();
        let result = tokio::time::timeout(Duration::from_millis(500), task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
