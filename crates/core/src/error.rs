//! Error types for the AgentBus domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

use crate::message::{ActionName, AgentKind};

/// The top-level error type for all AgentBus operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Bus errors ---
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Filesystem errors ---
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    // --- Command errors ---
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Handler input ---
    #[error("Invalid input for '{action}': {reason}")]
    InvalidInput { action: ActionName, reason: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("No agent registered for {0}")]
    UnknownAgent(AgentKind),

    #[error("{agent} has no handler for action '{action}'")]
    NoHandler { agent: AgentKind, action: ActionName },

    #[error("Mailbox of {0} is full")]
    MailboxFull(AgentKind),

    #[error("Mailbox of {0} is closed")]
    MailboxClosed(AgentKind),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Request was cancelled")]
    Cancelled,

    /// An `error` message arrived for the request; the text is the
    /// original handler error, unchanged.
    #[error("{0}")]
    Remote(String),

    #[error("Bus shut down before the request completed")]
    Closed,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("No root directory is open")]
    NoRootOpen,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Access denied for '{path}': {reason}")]
    AccessDenied { path: String, reason: String },

    #[error("I/O error on '{path}': {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command '{0}' not in allowlist")]
    NotAllowed(String),

    #[error("Command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Empty command")]
    Empty,
}
