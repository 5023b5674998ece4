//! Inode number to share path table.
//!
//! The server addresses everything by path; the kernel addresses everything
//! by inode. Inodes are handed out on first sight of a path and stay stable
//! for the life of the mount. The root is inode 1 and the empty path.

use std::collections::HashMap;

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
pub struct InodeMap {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
    next_ino: u64,
}

impl InodeMap {
    pub fn new() -> Self {
        let mut map = Self {
            paths: HashMap::new(),
            inodes: HashMap::new(),
            next_ino: ROOT_INO + 1,
        };
        map.paths.insert(ROOT_INO, String::new());
        map.inodes.insert(String::new(), ROOT_INO);
        map
    }

    pub fn get_or_insert(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.inodes.get(path) {
            return ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.paths.insert(ino, path.to_string());
        self.inodes.insert(path.to_string(), ino);
        ino
    }

    pub fn get_path(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(String::as_str)
    }

    pub fn get_ino(&self, path: &str) -> Option<u64> {
        self.inodes.get(path).copied()
    }

    pub fn remove_path(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        if let Some(ino) = self.inodes.remove(path) {
            self.paths.remove(&ino);
        }
    }

    /// Move `old` and everything below it to `new`, keeping inode numbers.
    pub fn rename(&mut self, old: &str, new: &str) {
        self.remove_path(new);

        let prefix = format!("{}/", old);
        let moved: Vec<(String, u64)> = self
            .inodes
            .iter()
            .filter(|(path, _)| path.as_str() == old || path.starts_with(&prefix))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();

        for (path, ino) in moved {
            let renamed = format!("{}{}", new, &path[old.len()..]);
            self.inodes.remove(&path);
            self.inodes.insert(renamed.clone(), ino);
            self.paths.insert(ino, renamed);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for InodeMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Path of `name` inside the directory at `parent`.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Directory containing `path`. The root's parent is the root.
pub fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}
