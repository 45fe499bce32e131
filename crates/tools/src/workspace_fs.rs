//! Rooted filesystem over `tokio::fs`.
//!
//! Nothing is accessible until [`WorkspaceFs::open`] has been called with a
//! root directory. All paths are relative to that root and validated by
//! [`crate::path::resolve_in_root`].

use async_trait::async_trait;
use agentbus_core::error::FsError;
use agentbus_core::fs::{DirEntry, FileSystem};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::path::resolve_in_root;

pub struct WorkspaceFs {
    root: RwLock<Option<PathBuf>>,
    forbidden_paths: Vec<String>,
}

impl WorkspaceFs {
    /// A filesystem with no root open yet.
    pub fn new(forbidden_paths: Vec<String>) -> Self {
        Self {
            root: RwLock::new(None),
            forbidden_paths,
        }
    }

    pub fn from_config(config: &agentbus_config::WorkspaceConfig) -> Self {
        Self::new(config.forbidden_paths.clone())
    }

    /// Open `root` as the workspace. The directory must exist.
    ///
    /// Returns the canonical root path.
    pub async fn open(&self, root: impl AsRef<Path>) -> Result<PathBuf, FsError> {
        let root = root.as_ref();
        let display = root.display().to_string();
        let canonical = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| io_error(&display, e))?;

        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| io_error(&display, e))?;
        if !meta.is_dir() {
            return Err(FsError::Io {
                path: display,
                reason: "not a directory".into(),
            });
        }

        info!(root = %canonical.display(), "Workspace opened");
        *self.root.write().unwrap_or_else(|e| e.into_inner()) = Some(canonical.clone());
        Ok(canonical)
    }

    pub fn close(&self) {
        *self.root.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.root.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_open(&self) -> bool {
        self.root().is_some()
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let root = self.root().ok_or(FsError::NoRootOpen)?;
        resolve_in_root(&root, path, &self.forbidden_paths).map_err(|e| FsError::AccessDenied {
            path: path.into(),
            reason: e.to_string(),
        })
    }

    fn resolve_not_root(&self, path: &str) -> Result<PathBuf, FsError> {
        let resolved = self.resolve(path)?;
        if Some(&resolved) == self.root().as_ref() {
            return Err(FsError::AccessDenied {
                path: path.into(),
                reason: "the workspace root itself cannot be modified".into(),
            });
        }
        Ok(resolved)
    }
}

fn io_error(path: &str, err: std::io::Error) -> FsError {
    match err.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.into()),
        ErrorKind::AlreadyExists => FsError::AlreadyExists(path.into()),
        _ => FsError::Io {
            path: path.into(),
            reason: err.to_string(),
        },
    }
}

async fn ensure_parent(target: &Path, path: &str) -> Result<(), FsError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(path, e))?;
    }
    Ok(())
}

#[async_trait]
impl FileSystem for WorkspaceFs {
    async fn read_file(&self, path: &str) -> Result<String, FsError> {
        let target = self.resolve(path)?;
        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let target = self.resolve_not_root(path)?;
        ensure_parent(&target, path).await?;
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| io_error(path, e))?;
        debug!(path = %path, bytes = content.len(), "File written");
        Ok(())
    }

    async fn create_file(&self, path: &str, content: &str) -> Result<(), FsError> {
        let target = self.resolve_not_root(path)?;
        ensure_parent(&target, path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| io_error(path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_error(path, e))?;
        file.flush().await.map_err(|e| io_error(path, e))
    }

    async fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let target = self.resolve_not_root(path)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let target = self.resolve(path)?;
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn delete_directory(&self, path: &str) -> Result<(), FsError> {
        let target = self.resolve_not_root(path)?;
        tokio::fs::remove_dir_all(&target)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let target = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| io_error(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| io_error(path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().await.map_err(|e| io_error(path, e))?;
            if file_type.is_dir() {
                entries.push(DirEntry::directory(name));
            } else {
                entries.push(DirEntry::file(name));
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }
}

/// Directories first, then by name.
pub(crate) fn sort_entries(entries: &mut [DirEntry]) {
    use agentbus_core::fs::EntryKind;
    entries.sort_by(|a, b| {
        let rank = |e: &DirEntry| matches!(e.kind, EntryKind::File);
        rank(a).cmp(&rank(b)).then_with(|| a.name.cmp(&b.name))
    });
}
