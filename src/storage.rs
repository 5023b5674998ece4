//! Physical storage under the server's shared root directory.
//!
//! All operations take paths already passed through [`normalize`]: relative,
//! `/`-separated, with no `.` or `..` components. The empty string is the
//! root itself. Storage knows nothing about sessions or handles; the access
//! ledger gates every call before it reaches here.

use crate::error::{Result, ShareError};
use crate::types::{DirEntry, FileAttributes};
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// Normalize a client-supplied path into its canonical relative form.
///
/// Leading separators and `.` components are dropped. A `..` component would
/// let the path climb above the root, so it is rejected.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(ShareError::InvalidPath(format!(
                    "{} escapes the shared root",
                    path
                )))
            }
            c if c.contains('\0') => {
                return Err(ShareError::InvalidPath(format!("{:?} contains NUL", path)))
            }
            c => parts.push(c),
        }
    }
    Ok(parts.join("/"))
}

/// A directory tree on local disk.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the root, creating it if absent.
    pub fn open_or_create(root: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self::new(root);
        fs::create_dir_all(&storage.root)?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a normalized path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    /// Attributes of `path`, or `None` if nothing exists there.
    pub fn stat(&self, path: &str) -> Result<Option<FileAttributes>> {
        match fs::metadata(self.resolve(path)) {
            Ok(meta) => Ok(Some(FileAttributes::from_metadata(&meta))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `size` bytes at `offset`. `None` if the file is gone.
    pub fn read_at(&self, path: &str, size: u64, offset: u64) -> Result<Option<Vec<u8>>> {
        let mut file = match File::open(self.resolve(path)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::new();
        file.take(size).read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// Write `data` at `offset`, leaving the rest of the file intact.
    pub fn write_at(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.resolve(path))?;
        file.write_all_at(data, offset)?;
        Ok(data.len())
    }

    /// Create `path` with `mode`, truncating any existing file.
    pub fn create_truncate(&self, path: &str, mode: u32) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(self.resolve(path))?;
        Ok(())
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        DirBuilder::new().mode(mode).create(self.resolve(path))?;
        Ok(())
    }

    /// Entry names of a directory, sorted.
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut names = fs::read_dir(self.resolve(path))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    /// Entry names with attributes, sorted by name. Entries removed while
    /// listing are skipped.
    pub fn list_dir_with_attrs(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            match fs::metadata(entry.path()) {
                Ok(meta) => entries.push(DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    attrs: FileAttributes::from_metadata(&meta),
                }),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        fs::remove_file(self.resolve(path))?;
        Ok(())
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        fs::remove_dir(self.resolve(path))?;
        Ok(())
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        (dir, storage)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize("a//./b").unwrap(), "a/b");
        assert_eq!(normalize("/").unwrap(), "");
        assert_eq!(normalize("").unwrap(), "");
        assert!(matches!(normalize("../etc/passwd"), Err(ShareError::InvalidPath(_))));
        assert!(normalize("a/../../b").is_err());
    }

    #[test]
    fn test_open_or_create_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/share");
        let storage = LocalStorage::open_or_create(&root).unwrap();
        assert!(storage.root().is_dir());
    }

    #[test]
    fn test_create_write_read() {
        let (_dir, storage) = storage();

        storage.create_truncate("f.txt", 0o644).unwrap();
        assert_eq!(storage.stat("f.txt").unwrap().unwrap().size, 0);

        assert_eq!(storage.write_at("f.txt", 0, b"hello world").unwrap(), 11);
        assert_eq!(storage.read_at("f.txt", 5, 6).unwrap().unwrap(), b"world");
        assert_eq!(storage.read_at("f.txt", 100, 0).unwrap().unwrap(), b"hello world");
        assert!(storage.read_at("f.txt", 10, 50).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_write_does_not_truncate() {
        let (_dir, storage) = storage();

        storage.write_at("f", 0, b"abcdef").unwrap();
        storage.write_at("f", 2, b"XY").unwrap();
        assert_eq!(storage.read_at("f", 64, 0).unwrap().unwrap(), b"abXYef");

        storage.create_truncate("f", 0o600).unwrap();
        assert!(storage.read_at("f", 64, 0).unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_missing_paths() {
        let (_dir, storage) = storage();

        assert!(storage.stat("nope").unwrap().is_none());
        assert!(storage.read_at("nope", 1, 0).unwrap().is_none());
        assert!(storage.unlink("nope").is_err());
        assert_eq!(
            storage.rmdir("nope").unwrap_err().to_errno(),
            libc::ENOENT
        );
    }

    #[test]
    fn test_directories() {
        let (_dir, storage) = storage();

        storage.mkdir("d", 0o755).unwrap();
        storage.write_at("d/b", 0, b"1").unwrap();
        storage.write_at("d/a", 0, b"2").unwrap();

        assert!(storage.stat("d").unwrap().unwrap().is_dir());
        assert_eq!(storage.list_dir("d").unwrap(), vec!["a", "b"]);
        assert_eq!(storage.list_dir("").unwrap(), vec!["d"]);

        let entries = storage.list_dir_with_attrs("").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "d");
        assert!(entries[0].attrs.is_dir());
        let entries = storage.list_dir_with_attrs("d").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(entries.iter().all(|e| e.attrs.is_file() && e.attrs.size == 1));

        assert_eq!(storage.rmdir("d").unwrap_err().to_errno(), libc::ENOTEMPTY);
        storage.unlink("d/a").unwrap();
        storage.unlink("d/b").unwrap();
        storage.rmdir("d").unwrap();
        assert!(storage.stat("d").unwrap().is_none());
    }

    #[test]
    fn test_rename() {
        let (_dir, storage) = storage();

        storage.write_at("old", 0, b"data").unwrap();
        storage.rename("old", "new").unwrap();
        assert!(storage.stat("old").unwrap().is_none());
        assert_eq!(storage.read_at("new", 4, 0).unwrap().unwrap(), b"data");
    }
}
