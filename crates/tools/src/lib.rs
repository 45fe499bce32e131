//! Collaborator implementations for AgentBus.
//!
//! The bus reaches the outside world through the `FileSystem` and
//! `CommandRunner` traits from `agentbus-core`:
//! - [`WorkspaceFs`]: a real directory, opened as the workspace root
//! - [`InMemoryFs`]: the same contract without touching disk
//! - [`ShellRunner`]: allowlisted shell commands with a timeout

pub mod memory_fs;
pub mod path;
pub mod shell;
pub mod workspace_fs;

pub use memory_fs::InMemoryFs;
pub use path::PathValidationError;
pub use shell::ShellRunner;
pub use workspace_fs::WorkspaceFs;
