//! Wire protocol shared by the file server and the client bridge.
//!
//! Every filesystem operation is one HTTP request. Positional parameters are
//! path segments, the target path is the tail of the URL, and rename's
//! destination travels in the `new` query parameter. Responses are a single
//! JSON value with 200 status; domain denials are ordinary payloads
//! ([`DENIED`], `null`), never error statuses.
//!
//! Read payloads are base64 text inside the JSON response. Write bodies are
//! the raw bytes, unencoded.
//!
//! The session credential is the `session-id` cookie set by `init_session`.

use crate::error::{Result, ShareError};
use crate::types::{Descriptor, SessionToken};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Method, Url};

pub use crate::ledger::DENIED;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session-id";

/// Query parameter carrying rename's destination.
pub const RENAME_TARGET_PARAM: &str = "new";

/// Route templates, in axum syntax.
pub mod routes {
    pub const HEALTH: &str = "/health";
    pub const METRICS: &str = "/metrics";
    pub const INIT_SESSION: &str = "/init_session";
    pub const CLOSE_SESSION: &str = "/close_session";
    pub const CREATE: &str = "/create/:mode/*path";
    pub const OPEN: &str = "/open/:flags/*path";
    pub const RELEASE: &str = "/release/:fd/*path";
    pub const READ: &str = "/read/:fd/:size/:offset/*path";
    pub const WRITE: &str = "/write/:fd/:offset/*path";
    pub const GETATTR_ROOT: &str = "/getattr";
    pub const GETATTR: &str = "/getattr/*path";
    pub const READDIR_ROOT: &str = "/readdir";
    pub const READDIR: &str = "/readdir/*path";
    pub const READDIR_PLUS_ROOT: &str = "/readdir_plus";
    pub const READDIR_PLUS: &str = "/readdir_plus/*path";
    pub const MKDIR: &str = "/mkdir/:mode/*path";
    pub const UNLINK: &str = "/unlink/*path";
    pub const RMDIR: &str = "/rmdir/*path";
    pub const RENAME: &str = "/rename/*path";
}

/// One protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    InitSession,
    CloseSession,
    Create { mode: u32, path: &'a str },
    Open { flags: i32, path: &'a str },
    Release { fd: Descriptor, path: &'a str },
    Read { fd: Descriptor, size: u64, offset: u64, path: &'a str },
    Write { fd: Descriptor, offset: u64, path: &'a str },
    Getattr { path: &'a str },
    Readdir { path: &'a str },
    ReaddirPlus { path: &'a str },
    Mkdir { mode: u32, path: &'a str },
    Unlink { path: &'a str },
    Rmdir { path: &'a str },
    Rename { path: &'a str, new_path: &'a str },
}

impl<'a> Operation<'a> {
    /// Operation name, also the first URL segment.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::InitSession => "init_session",
            Operation::CloseSession => "close_session",
            Operation::Create { .. } => "create",
            Operation::Open { .. } => "open",
            Operation::Release { .. } => "release",
            Operation::Read { .. } => "read",
            Operation::Write { .. } => "write",
            Operation::Getattr { .. } => "getattr",
            Operation::Readdir { .. } => "readdir",
            Operation::ReaddirPlus { .. } => "readdir_plus",
            Operation::Mkdir { .. } => "mkdir",
            Operation::Unlink { .. } => "unlink",
            Operation::Rmdir { .. } => "rmdir",
            Operation::Rename { .. } => "rename",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::Write { .. } => Method::POST,
            _ => Method::GET,
        }
    }

    /// Target path, if the operation has one.
    pub fn path(&self) -> Option<&'a str> {
        match *self {
            Operation::InitSession | Operation::CloseSession => None,
            Operation::Create { path, .. }
            | Operation::Open { path, .. }
            | Operation::Release { path, .. }
            | Operation::Read { path, .. }
            | Operation::Write { path, .. }
            | Operation::Getattr { path }
            | Operation::Readdir { path }
            | Operation::ReaddirPlus { path }
            | Operation::Mkdir { path, .. }
            | Operation::Unlink { path }
            | Operation::Rmdir { path }
            | Operation::Rename { path, .. } => Some(path),
        }
    }

    fn positional(&self) -> Vec<String> {
        match *self {
            Operation::Create { mode, .. } | Operation::Mkdir { mode, .. } => {
                vec![mode.to_string()]
            }
            Operation::Open { flags, .. } => vec![flags.to_string()],
            Operation::Release { fd, .. } => vec![fd.to_string()],
            Operation::Read {
                fd, size, offset, ..
            } => vec![fd.to_string(), size.to_string(), offset.to_string()],
            Operation::Write { fd, offset, .. } => vec![fd.to_string(), offset.to_string()],
            _ => Vec::new(),
        }
    }

    /// Build the request URL against a server base URL.
    ///
    /// Each path component becomes its own percent-encoded segment.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut url = base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ShareError::Config(format!("Not a base URL: {}", base)))?;
            segments.pop_if_empty();
            segments.push(self.name());
            for param in self.positional() {
                segments.push(&param);
            }
            if let Some(path) = self.path() {
                for component in path.split('/').filter(|c| !c.is_empty()) {
                    segments.push(component);
                }
            }
        }

        if let Operation::Rename { new_path, .. } = self {
            url.query_pairs_mut()
                .append_pair(RENAME_TARGET_PARAM, new_path);
        }

        Ok(url)
    }
}

/// Encode file bytes for a read response.
pub fn encode_payload(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a read response payload.
pub fn decode_payload(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| ShareError::Deserialization(format!("Invalid read payload: {}", e)))
}

/// Value for a request's `Cookie` header.
pub fn cookie_header(token: &SessionToken) -> String {
    format!("{}={}", SESSION_COOKIE, token)
}

/// Value for the `Set-Cookie` header issued by `init_session`.
pub fn set_cookie_header(token: &SessionToken) -> String {
    format!("{}={}; Path=/", SESSION_COOKIE, token)
}

/// Find the session token in a `Cookie` header.
pub fn parse_cookie_header(header: &str) -> Option<SessionToken> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| SessionToken::from(value))
    })
}

/// Extract the session token from a `Set-Cookie` header.
pub fn parse_set_cookie_header(header: &str) -> Option<SessionToken> {
    let first = header.split(';').next()?;
    parse_cookie_header(first)
}
