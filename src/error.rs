//! Error types for sharefs.
//!
//! This module provides a unified error type [`ShareError`] for the access
//! ledger, the request dispatcher and the client bridge, along with a
//! convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Ledger violations**: unknown sessions, stale or out-of-range
//!   descriptors, descriptors used against the wrong path. These are protocol
//!   errors; the server answers them with `403 Forbidden`.
//! - **Domain denials**: `Busy` and `NotFound`. On the wire these travel as
//!   ordinary payloads (negative sentinel, `null`, `-1`) and are only turned
//!   into errors by the client bridge.
//! - **Transport**: a non-200 response or a failed connection.
//! - **Configuration** and **I/O**.
//!
//! # FUSE Integration
//!
//! Errors convert to POSIX errno values for the kernel bridge:
//!
//! ```rust,ignore
//! use sharefs::error::ShareError;
//!
//! let err = ShareError::Busy("/lock".into());
//! assert_eq!(err.to_errno(), libc::EBUSY);
//! ```

use crate::types::Descriptor;
use std::io;
use thiserror::Error;

/// Main error type for sharefs operations.
#[derive(Error, Debug)]
pub enum ShareError {
    // Ledger violations
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Invalid handle {descriptor}: {reason}")]
    InvalidHandle { descriptor: Descriptor, reason: String },

    #[error("Handle {descriptor} is open on {expected}, not {actual}")]
    PathMismatch {
        descriptor: Descriptor,
        expected: String,
        actual: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    // Domain denials
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Could not allocate a unique session token after {attempts} attempts")]
    AllocationExhausted { attempts: usize },

    // Transport errors
    #[error("Bad status code {status}: {path}")]
    Transport { status: u16, path: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // Path errors
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShareError {
    /// Convert to POSIX errno for FUSE operations.
    pub fn to_errno(&self) -> i32 {
        match self {
            ShareError::Busy(_) => libc::EBUSY,
            ShareError::NotFound(_) => libc::ENOENT,
            ShareError::AccessDenied(_)
            | ShareError::InvalidSession(_)
            | ShareError::InvalidHandle { .. }
            | ShareError::PathMismatch { .. } => libc::EACCES,
            ShareError::InvalidPath(_) => libc::EINVAL,
            ShareError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            _ => libc::EIO,
        }
    }

    /// Whether this error is a misuse of the access ledger (unknown session,
    /// stale descriptor or descriptor/path mismatch).
    pub fn is_ledger_violation(&self) -> bool {
        matches!(
            self,
            ShareError::InvalidSession(_)
                | ShareError::InvalidHandle { .. }
                | ShareError::PathMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(e: serde_json::Error) -> Self {
        ShareError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for ShareError {
    fn from(e: reqwest::Error) -> Self {
        ShareError::Network(e.to_string())
    }
}

/// Result type alias for sharefs operations.
pub type Result<T> = std::result::Result<T, ShareError>;
