//! FUSE filesystem implementation.

use super::inode::{child_path, parent_of, InodeMap, ROOT_INO};
use crate::client::RemoteFs;
use crate::error::ShareError;
use crate::types::{epoch_seconds_to_system_time, FileAttributes};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use std::ffi::OsStr;
use std::os::raw::c_int;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

const TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u32 = 512;

/// Kernel-facing adapter over a [`RemoteFs`].
pub struct ShareFuse {
    fs: RemoteFs,
    inodes: InodeMap,
    uid: u32,
    gid: u32,
}

impl ShareFuse {
    pub fn new(fs: RemoteFs) -> Self {
        Self {
            fs,
            inodes: InodeMap::new(),
            uid: 0,
            gid: 0,
        }
    }

    fn to_file_attr(&self, ino: u64, attrs: &FileAttributes) -> FileAttr {
        let ctime = epoch_seconds_to_system_time(attrs.ctime);
        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(BLOCK_SIZE as u64),
            atime: epoch_seconds_to_system_time(attrs.atime),
            mtime: epoch_seconds_to_system_time(attrs.mtime),
            ctime,
            crtime: ctime,
            kind: file_type(attrs),
            perm: attrs.permissions(),
            nlink: attrs.nlink as u32,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.get_path(ino).map(str::to_string)
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent = self.inodes.get_path(parent)?;
        Some(child_path(parent, name.to_str()?))
    }

    /// Stat `path` and register it in the inode table.
    fn entry_for(&mut self, path: &str) -> Result<FileAttr, ShareError> {
        let attrs = self.fs.getattr(path)?;
        let ino = self.inodes.get_or_insert(path);
        Ok(self.to_file_attr(ino, &attrs))
    }
}

fn file_type(attrs: &FileAttributes) -> FileType {
    match attrs.mode & libc::S_IFMT as u32 {
        m if m == libc::S_IFDIR as u32 => FileType::Directory,
        m if m == libc::S_IFLNK as u32 => FileType::Symlink,
        _ => FileType::RegularFile,
    }
}

/// Log a failed call at a level matching how unusual it is.
fn errno_for(op: &str, path: &str, e: &ShareError) -> c_int {
    match e {
        ShareError::NotFound(_) => debug!(op, path, "No such entry"),
        ShareError::Busy(_) => warn!(op, path, "Resource busy"),
        _ => error!(op, path, error = %e, "Call failed"),
    }
    e.to_errno()
}

impl Filesystem for ShareFuse {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        self.uid = req.uid();
        self.gid = req.gid();
        info!(session = ?self.fs.session().map(|s| s.to_string()), "Filesystem mounted");
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(e) = self.fs.close() {
            warn!(error = %e, "Failed to close session on unmount");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_of(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(parent, %path, "lookup");

        match self.entry_for(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(errno_for("lookup", &path, &e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, "getattr");

        match self.fs.getattr(&path) {
            Ok(attrs) => reply.attr(&TTL, &self.to_file_attr(ino, &attrs)),
            Err(e) => reply.error(errno_for("getattr", &path, &e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, ?mode, ?size, "setattr");

        if let Some(length) = size {
            if let Err(e) = self.fs.truncate(&path, length) {
                reply.error(errno_for("truncate", &path, &e));
                return;
            }
        }

        match self.fs.getattr(&path) {
            Ok(attrs) => reply.attr(&TTL, &self.to_file_attr(ino, &attrs)),
            Err(e) => reply.error(errno_for("setattr", &path, &e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_of(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(parent, %path, mode, "mkdir");

        let result = self
            .fs
            .mkdir(&path, mode & !umask)
            .and_then(|_| self.entry_for(&path));
        match result {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(errno_for("mkdir", &path, &e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_of(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(parent, %path, "unlink");

        match self.fs.unlink(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_for("unlink", &path, &e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_of(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(parent, %path, "rmdir");

        match self.fs.rmdir(&path) {
            Ok(()) => {
                self.inodes.remove_path(&path);
                reply.ok();
            }
            Err(e) => reply.error(errno_for("rmdir", &path, &e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(old), Some(new)) = (self.child_of(parent, name), self.child_of(newparent, newname))
        else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(%old, %new, "rename");

        match self.fs.rename(&old, &new) {
            Ok(()) => {
                self.inodes.rename(&old, &new);
                reply.ok();
            }
            Err(e) => reply.error(errno_for("rename", &old, &e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, flags, "open");

        match self.fs.open(&path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(errno_for("open", &path, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, fh, offset, size, "read");

        match self.fs.read(&path, fh, size as u64, offset.max(0) as u64) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno_for("read", &path, &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, fh, offset, size = data.len(), "write");

        match self.fs.write(&path, fh, offset.max(0) as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(errno_for("write", &path, &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, fh, "release");

        match self.fs.release(&path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_for("release", &path, &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(ino, %path, offset, "readdir");

        let listing = match self.fs.readdir_plus(&path) {
            Ok(listing) => listing,
            Err(e) => {
                reply.error(errno_for("readdir", &path, &e));
                return;
            }
        };

        let parent = if ino == ROOT_INO {
            ROOT_INO
        } else {
            self.inodes.get_ino(parent_of(&path)).unwrap_or(ROOT_INO)
        };

        let mut entries = Vec::with_capacity(listing.len() + 2);
        entries.push((ino, FileType::Directory, ".".to_string()));
        entries.push((parent, FileType::Directory, "..".to_string()));
        for entry in listing {
            let child_ino = self.inodes.get_or_insert(&child_path(&path, &entry.name));
            entries.push((child_ino, file_type(&entry.attrs), entry.name));
        }

        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child_of(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        debug!(parent, %path, mode, flags, "create");

        let fh = match self.fs.create(&path, mode & !umask) {
            Ok(fh) => fh,
            Err(e) => {
                reply.error(errno_for("create", &path, &e));
                return;
            }
        };

        match self.entry_for(&path) {
            Ok(attr) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(e) => {
                if let Err(release_err) = self.fs.release(&path, fh) {
                    warn!(%path, fh, error = %release_err, "Failed to release handle after create");
                }
                reply.error(errno_for("create", &path, &e));
            }
        }
    }
}
