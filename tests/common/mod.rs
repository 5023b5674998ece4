//! Common test utilities for integration tests.

#![allow(dead_code)]

use sharefs::client::{RemoteFs, ShareClient};
use sharefs::config::{ClientConfig, LedgerConfig, ShareConfig};
use sharefs::ledger::SharedLedger;
use sharefs::server::ShareServer;
use sharefs::shutdown::ShutdownCoordinator;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A file server on a random local port, sharing a fresh temp directory.
///
/// The server runs on its own runtime thread so tests can drive it with the
/// blocking client. Dropping the value shuts it down.
pub struct TestServer {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub url: String,
    pub ledger: SharedLedger,
    coordinator: ShutdownCoordinator,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(LedgerConfig::default())
    }

    pub fn start_with(ledger_config: LedgerConfig) -> Self {
        let mut config = ShareConfig::default();
        config.ledger = ledger_config;
        Self::start_with_config(config)
    }

    /// Start with `config`; its root directory is replaced by a temp dir.
    pub fn start_with_config(mut config: ShareConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("share");
        config.server.root_dir = root.clone();

        let server = ShareServer::new(config).expect("Failed to create server");
        let ledger = server.state().ledger.clone();
        let coordinator = ShutdownCoordinator::new();

        let (addr_tx, addr_rx) = mpsc::channel();
        let server_coordinator = coordinator.clone();
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("Failed to build runtime");

            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("Failed to bind");
                addr_tx
                    .send(listener.local_addr().expect("No local address"))
                    .expect("Test dropped");
                server
                    .serve(listener, server_coordinator)
                    .await
                    .expect("Server failed");
            });
        });

        let addr = addr_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("Server did not bind");
        let url = format!("http://{}", addr);
        assert!(wait_for_server(&url, 10), "Server did not become healthy");

        Self {
            temp_dir,
            root,
            url,
            ledger,
            coordinator,
            thread: Some(thread),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.url.clone(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// A bridge with a live session.
    pub fn connect(&self) -> RemoteFs {
        RemoteFs::connect(&self.client_config()).expect("Failed to connect")
    }

    /// A protocol client with a live session.
    pub fn session_client(&self) -> ShareClient {
        let mut client = ShareClient::new(&self.client_config()).expect("Failed to build client");
        client.init_session().expect("Failed to init session");
        client
    }

    /// Write a file straight into the shared root, bypassing the server.
    pub fn seed(&self, path: &str, content: &[u8]) {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent");
        }
        std::fs::write(full, content).expect("Failed to seed file");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.coordinator.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Wait for a server to be ready by polling its health endpoint.
pub fn wait_for_server(url: &str, timeout_secs: u64) -> bool {
    let client = reqwest::blocking::Client::new();
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);

    while start.elapsed() < timeout {
        if let Ok(response) = client.get(format!("{}/health", url)).send() {
            if response.status().is_success() {
                return true;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}
