//! Core type definitions shared by the server and the client bridge.
//!
//! # Key Types
//!
//! - [`SessionToken`]: opaque credential identifying one client connection
//! - [`Descriptor`]: per-session handle position returned by open/create
//! - [`AccessMode`]: read or write grant recorded for a handle
//! - [`FileAttributes`]: the `getattr` payload
//!
//! ```rust
//! use sharefs::types::{requests_write, AccessMode};
//!
//! assert_eq!(AccessMode::from_open_flags(libc::O_RDONLY), AccessMode::Read);
//! assert!(requests_write(libc::O_WRONLY | libc::O_TRUNC));
//! ```

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Position of a handle slot in a session's handle table.
pub type Descriptor = u64;

/// Opaque session credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Access mode of an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    /// Pick the grant an `open(2)` call with these flags needs.
    pub fn from_open_flags(flags: i32) -> Self {
        if requests_write(flags) {
            AccessMode::Write
        } else {
            AccessMode::Read
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, AccessMode::Write)
    }
}

/// Whether open flags ask for write, read-write or append access.
pub fn requests_write(flags: i32) -> bool {
    flags & (libc::O_WRONLY | libc::O_RDWR | libc::O_APPEND) != 0
}

/// File metadata returned by `getattr`.
///
/// Times are seconds since the Unix epoch with sub-second precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub mode: u32,
    pub nlink: u64,
    pub size: u64,
    pub ctime: f64,
    pub mtime: f64,
    pub atime: f64,
}

impl FileAttributes {
    /// Build attributes from a local `stat` result.
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            mode: meta.mode(),
            nlink: meta.nlink(),
            size: meta.size(),
            ctime: meta.ctime() as f64 + meta.ctime_nsec() as f64 / 1e9,
            mtime: meta.mtime() as f64 + meta.mtime_nsec() as f64 / 1e9,
            atime: meta.atime() as f64 + meta.atime_nsec() as f64 / 1e9,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32
    }

    pub fn is_file(&self) -> bool {
        self.mode & (libc::S_IFMT as u32) == libc::S_IFREG as u32
    }

    /// Permission bits without the file type.
    pub fn permissions(&self) -> u16 {
        (self.mode & 0o7777) as u16
    }
}

/// A directory entry with its attributes, as returned by `readdir_plus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub attrs: FileAttributes,
}

/// Convert epoch seconds to a `SystemTime`, clamping negatives to the epoch.
pub fn epoch_seconds_to_system_time(secs: f64) -> SystemTime {
    if secs.is_finite() && secs > 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(secs)
    } else {
        UNIX_EPOCH
    }
}
