//! Filesystem-facing client bridge.
//!
//! Holds one session for its whole lifetime and maps every filesystem call
//! onto one protocol request. Payload sentinels become errors here: a denied
//! grant is [`ShareError::Busy`], a missing entry is [`ShareError::NotFound`].

use super::ShareClient;
use crate::config::ClientConfig;
use crate::error::{Result, ShareError};
use crate::types::{Descriptor, DirEntry, FileAttributes, SessionToken};
use tracing::{debug, info, warn};

/// A mounted view of the remote share.
pub struct RemoteFs {
    client: ShareClient,
}

impl RemoteFs {
    /// Connect and start a session.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        info!(server = %config.server_url, "Init session with server");
        let mut client = ShareClient::new(config)?;
        let token = client.init_session()?;
        info!(session = %token, "Got session");
        Ok(Self { client })
    }

    pub fn session(&self) -> Option<&SessionToken> {
        self.client.session()
    }

    /// End the session, releasing every handle it still holds on the server.
    pub fn close(&mut self) -> Result<()> {
        if let Some(token) = self.client.session() {
            info!(session = %token, "Closing session");
        }
        self.client.close_session()
    }

    pub fn create(&self, path: &str, mode: u32) -> Result<Descriptor> {
        descriptor_or_busy(self.client.create(path, mode)?, path)
    }

    pub fn open(&self, path: &str, flags: i32) -> Result<Descriptor> {
        descriptor_or_busy(self.client.open(path, flags)?, path)
    }

    pub fn release(&self, path: &str, fd: Descriptor) -> Result<()> {
        self.client.release(path, fd)
    }

    /// A file that vanished after open reads as empty.
    pub fn read(&self, path: &str, fd: Descriptor, size: u64, offset: u64) -> Result<Vec<u8>> {
        Ok(self.client.read(path, fd, size, offset)?.unwrap_or_default())
    }

    pub fn write(&self, path: &str, fd: Descriptor, offset: u64, data: &[u8]) -> Result<usize> {
        self.client.write(path, fd, offset, data)
    }

    pub fn getattr(&self, path: &str) -> Result<FileAttributes> {
        self.client
            .getattr(path)?
            .ok_or_else(|| ShareError::NotFound(path.to_string()))
    }

    /// Directory entries, led by `.` and `..`.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let names = self.client.readdir(path)?;
        let mut entries = Vec::with_capacity(names.len() + 2);
        entries.push(".".to_string());
        entries.push("..".to_string());
        entries.extend(names);
        Ok(entries)
    }

    /// Directory entries with attributes, without `.` and `..`.
    pub fn readdir_plus(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.client.readdir_plus(path)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        self.client.mkdir(path, mode)
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        status_or_busy(self.client.unlink(path)?, path)
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.client.rmdir(path)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        status_or_busy(self.client.rename(old, new)?, old)
    }

    /// Accepted and ignored. Truncation only happens through create.
    pub fn truncate(&self, path: &str, length: u64) -> Result<()> {
        debug!(path, length, "Ignoring truncate");
        Ok(())
    }
}

impl Drop for RemoteFs {
    fn drop(&mut self) {
        if self.client.session().is_some() {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close session");
            }
        }
    }
}

fn descriptor_or_busy(fd: i64, path: &str) -> Result<Descriptor> {
    Descriptor::try_from(fd).map_err(|_| ShareError::Busy(path.to_string()))
}

fn status_or_busy(status: i64, path: &str) -> Result<()> {
    if status < 0 {
        Err(ShareError::Busy(path.to_string()))
    } else {
        Ok(())
    }
}
