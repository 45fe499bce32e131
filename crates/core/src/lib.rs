//! # AgentBus Core
//!
//! Domain types, traits, and error definitions for the AgentBus orchestration
//! layer. This crate has **no runtime dependencies** beyond `tokio::sync`;
//! it defines the model every other crate implements against.
//!
//! Collaborators that touch the outside world (LLM providers, the editor's
//! filesystem, the terminal) are traits here so the bus can be tested with
//! in-memory stand-ins.

pub mod action;
pub mod error;
pub mod fs;
pub mod language;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use action::Action;
pub use error::{BusError, CommandError, Error, FsError, ProviderError, Result};
pub use fs::{CommandOutput, CommandRunner, DirEntry, EntryKind, FileSystem};
pub use language::Language;
pub use message::{
    ActionName, AgentKind, Context, Message, MessageDraft, MessageKind, Payload, PlanId,
};
pub use provider::{CompletionProvider, CompletionRequest, CompletionResponse, StreamChunk};
