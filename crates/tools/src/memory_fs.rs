//! In-memory filesystem for tests and dry runs.

use async_trait::async_trait;
use agentbus_core::error::FsError;
use agentbus_core::fs::{DirEntry, EntryKind, FileSystem};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::path::normalize;
use crate::workspace_fs::sort_entries;

#[derive(Default)]
struct Tree {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

impl Tree {
    fn is_dir(&self, key: &str) -> bool {
        key.is_empty()
            || self.dirs.contains(key)
            || self
                .files
                .keys()
                .chain(self.dirs.iter())
                .any(|k| k.starts_with(&format!("{key}/")))
    }

    fn add_parents(&mut self, key: &str) {
        let mut acc = String::new();
        let parts: Vec<&str> = key.split('/').collect();
        for part in &parts[..parts.len().saturating_sub(1)] {
            if !acc.is_empty() {
                acc.push('/');
            }
            acc.push_str(part);
            self.dirs.insert(acc.clone());
        }
    }
}

/// A filesystem held entirely in memory.
///
/// Like [`crate::WorkspaceFs`], it refuses every call while no root is open.
pub struct InMemoryFs {
    tree: Mutex<Option<Tree>>,
}

impl InMemoryFs {
    /// An empty filesystem with its root open.
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Some(Tree::default())),
        }
    }

    /// A filesystem with no root open.
    pub fn closed() -> Self {
        Self {
            tree: Mutex::new(None),
        }
    }

    /// Seed files (root open).
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let mut tree = Tree::default();
        for (path, content) in files {
            let path = path.into();
            if let Ok(parts) = normalize(&path) {
                let key = parts.join("/");
                tree.add_parents(&key);
                tree.files.insert(key, content.into());
            }
        }
        Self {
            tree: Mutex::new(Some(tree)),
        }
    }

    pub fn open(&self) {
        let mut guard = self.tree.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(Tree::default());
        }
    }

    pub fn close(&self) {
        *self.tree.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// All files and their contents, keyed by normalized path.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.tree
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| t.files.clone())
            .unwrap_or_default()
    }

    fn with_tree<T>(
        &self,
        path: &str,
        f: impl FnOnce(&mut Tree, String) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        let key = normalize(path)
            .map_err(|e| FsError::AccessDenied {
                path: path.into(),
                reason: e.to_string(),
            })?
            .join("/");
        let mut guard = self.tree.lock().unwrap_or_else(|e| e.into_inner());
        let tree = guard.as_mut().ok_or(FsError::NoRootOpen)?;
        f(tree, key)
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.with_tree(path, |tree, key| {
            tree.files
                .get(&key)
                .cloned()
                .ok_or_else(|| FsError::NotFound(path.into()))
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        self.with_tree(path, |tree, key| {
            if key.is_empty() || tree.is_dir(&key) {
                return Err(FsError::Io {
                    path: path.into(),
                    reason: "is a directory".into(),
                });
            }
            tree.add_parents(&key);
            tree.files.insert(key, content.to_string());
            Ok(())
        })
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let exists = self.with_tree(path, |tree, key| Ok(tree.files.contains_key(&key)))?;
        if exists {
            return Err(FsError::AlreadyExists(path.into()));
        }
        self.write_file(path, content).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        self.with_tree(path, |tree, key| {
            tree.files
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| FsError::NotFound(path.into()))
        })
    }

    async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        self.with_tree(path, |tree, key| {
            if !key.is_empty() {
                tree.add_parents(&key);
                tree.dirs.insert(key);
            }
            Ok(())
        })
    }

    async fn delete_directory(&self, path: &str) -> Result<(), FsError> {
        self.with_tree(path, |tree, key| {
            if key.is_empty() {
                return Err(FsError::AccessDenied {
                    path: path.into(),
                    reason: "the workspace root itself cannot be modified".into(),
                });
            }
            if !tree.is_dir(&key) {
                return Err(FsError::NotFound(path.into()));
            }
            let prefix = format!("{key}/");
            tree.files.retain(|k, _| !k.starts_with(&prefix));
            tree.dirs.retain(|k| k != &key && !k.starts_with(&prefix));
            Ok(())
        })
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        self.with_tree(path, |tree, key| {
            if !tree.is_dir(&key) {
                return Err(FsError::NotFound(path.into()));
            }
            let prefix = if key.is_empty() {
                String::new()
            } else {
                format!("{key}/")
            };

            let mut children: BTreeMap<String, EntryKind> = BTreeMap::new();
            for file in tree.files.keys() {
                if let Some(rest) = file.strip_prefix(&prefix) {
                    match rest.split_once('/') {
                        Some((dir, _)) => children.insert(dir.to_string(), EntryKind::Directory),
                        None => children.insert(rest.to_string(), EntryKind::File),
                    };
                }
            }
            for dir in &tree.dirs {
                if let Some(rest) = dir.strip_prefix(&prefix) {
                    let name = rest.split('/').next().unwrap_or(rest);
                    children.insert(name.to_string(), EntryKind::Directory);
                }
            }

            let mut entries: Vec<DirEntry> = children
                .into_iter()
                .map(|(name, kind)| DirEntry { name, kind })
                .collect();
            sort_entries(&mut entries);
            Ok(entries)
        })
    }
}
