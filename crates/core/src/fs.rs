//! Filesystem and command collaborators.
//!
//! The editor's real implementation sits on top of a browser directory handle;
//! here the bus only needs the operations below. Every call fails with
//! [`FsError::NoRootOpen`] until a root directory has been opened.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CommandError, FsError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<String, FsError>;

    /// Write a file, creating it (and missing parents) if needed.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), FsError>;

    /// Create a new file; fails if it already exists.
    async fn create_file(&self, path: &str, content: &str) -> Result<(), FsError>;

    async fn delete_file(&self, path: &str) -> Result<(), FsError>;

    async fn create_directory(&self, path: &str) -> Result<(), FsError>;

    /// Delete a directory and everything below it.
    async fn delete_directory(&self, path: &str) -> Result<(), FsError>;

    /// Entries sorted directories first, then by name.
    async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;
}

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout/stderr folded into one terminal-style string.
    pub fn render(&self) -> String {
        let text = if self.success() {
            if self.stderr.is_empty() {
                self.stdout.clone()
            } else {
                format!("{}\n[stderr]: {}", self.stdout, self.stderr)
            }
        } else {
            format!("[exit code: {}]\n{}\n{}", self.exit_code, self.stdout, self.stderr)
        };
        text.trim().to_string()
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_entry_serializes_type_field() {
        let json = serde_json::to_value(DirEntry::directory("src")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "src", "type": "directory"}));
    }

    #[test]
    fn render_failed_command() {
        let out = CommandOutput {
            stdout: "partial".into(),
            stderr: "boom".into(),
            exit_code: 2,
        };
        let text = out.render();
        assert!(text.starts_with("[exit code: 2]"));
        assert!(text.contains("boom"));
    }
}
