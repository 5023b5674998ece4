//! Client for the sharefs file server.
//!
//! [`ShareClient`] speaks the wire protocol one request at a time and hands
//! back raw payloads, sentinels included. [`RemoteFs`] sits on top and turns
//! those payloads into filesystem results and errors.
//!
//! Both are blocking: the kernel bridge calls them from its own threads.

pub mod bridge;

pub use bridge::RemoteFs;

use crate::config::ClientConfig;
use crate::error::{Result, ShareError};
use crate::protocol::{cookie_header, decode_payload, parse_set_cookie_header, Operation};
use crate::types::{Descriptor, DirEntry, FileAttributes, SessionToken};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Protocol client holding at most one session.
pub struct ShareClient {
    base: Url,
    http: reqwest::blocking::Client,
    session: Option<SessionToken>,
}

impl ShareClient {
    /// Build a client for the configured server. Does not contact it.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.server_url).map_err(|e| ShareError::InvalidConfig {
            field: "client.server_url".to_string(),
            reason: e.to_string(),
        })?;

        let http = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ShareError::Network(e.to_string()))?;

        Ok(Self {
            base,
            http,
            session: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn session(&self) -> Option<&SessionToken> {
        self.session.as_ref()
    }

    /// Start a session and keep its token for every later request.
    pub fn init_session(&mut self) -> Result<SessionToken> {
        let op = Operation::InitSession;
        let url = op.url(&self.base)?;
        let target = url.path().to_string();

        let response = self.http.get(url).send()?;
        if response.status() != StatusCode::OK {
            return Err(ShareError::Transport {
                status: response.status().as_u16(),
                path: target,
            });
        }

        let token = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(parse_set_cookie_header)
            .ok_or_else(|| {
                ShareError::Network("init_session response carried no session cookie".to_string())
            })?;

        debug!(session = %token, "Session established");
        self.session = Some(token.clone());
        Ok(token)
    }

    /// End the current session, if any.
    pub fn close_session(&mut self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }

        let result = self.call::<()>(Operation::CloseSession, None);
        self.session = None;
        result
    }

    fn call<T: DeserializeOwned>(&self, op: Operation<'_>, body: Option<&[u8]>) -> Result<T> {
        let url = op.url(&self.base)?;
        let target = url.path().to_string();

        let mut request = self.http.request(op.method(), url);
        if let Some(token) = &self.session {
            request = request.header(COOKIE, cookie_header(token));
        }
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let response = request.send()?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ShareError::Transport {
                status: status.as_u16(),
                path: target,
            });
        }

        response
            .json()
            .map_err(|e| ShareError::Deserialization(format!("{}: {}", target, e)))
    }

    /// Returns a descriptor or the denial sentinel.
    pub fn create(&self, path: &str, mode: u32) -> Result<i64> {
        self.call(Operation::Create { mode, path }, None)
    }

    /// Returns a descriptor or the denial sentinel.
    pub fn open(&self, path: &str, flags: i32) -> Result<i64> {
        self.call(Operation::Open { flags, path }, None)
    }

    pub fn release(&self, path: &str, fd: Descriptor) -> Result<()> {
        self.call(Operation::Release { fd, path }, None)
    }

    /// Returns `None` when the file vanished after it was opened.
    pub fn read(&self, path: &str, fd: Descriptor, size: u64, offset: u64) -> Result<Option<Vec<u8>>> {
        let payload: Option<String> = self.call(
            Operation::Read {
                fd,
                size,
                offset,
                path,
            },
            None,
        )?;
        payload.as_deref().map(decode_payload).transpose()
    }

    /// Sends `data` as the raw request body.
    pub fn write(&self, path: &str, fd: Descriptor, offset: u64, data: &[u8]) -> Result<usize> {
        self.call(Operation::Write { fd, offset, path }, Some(data))
    }

    pub fn getattr(&self, path: &str) -> Result<Option<FileAttributes>> {
        self.call(Operation::Getattr { path }, None)
    }

    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        self.call(Operation::Readdir { path }, None)
    }

    pub fn readdir_plus(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.call(Operation::ReaddirPlus { path }, None)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        self.call(Operation::Mkdir { mode, path }, None)
    }

    /// Returns `0`, or the denial sentinel if handles are outstanding.
    pub fn unlink(&self, path: &str) -> Result<i64> {
        self.call(Operation::Unlink { path }, None)
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.call(Operation::Rmdir { path }, None)
    }

    /// Returns `0`, or the denial sentinel if handles are outstanding.
    pub fn rename(&self, path: &str, new_path: &str) -> Result<i64> {
        self.call(Operation::Rename { path, new_path }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(url: &str) -> ClientConfig {
        ClientConfig {
            server_url: url.to_string(),
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            ShareClient::new(&config("not a url")),
            Err(ShareError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unreachable_server_is_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut client = ShareClient::new(&config(&format!("http://127.0.0.1:{}", port))).unwrap();
        let err = client.init_session().unwrap_err();
        assert!(matches!(err, ShareError::Network(_)));
        assert_eq!(err.to_errno(), libc::EIO);
        assert!(client.session().is_none());
    }

    #[test]
    fn test_close_without_session_is_noop() {
        let mut client = ShareClient::new(&config("http://127.0.0.1:1")).unwrap();
        assert!(client.close_session().is_ok());
    }
}
