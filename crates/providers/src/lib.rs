//! Completion provider implementations for AgentBus.
//!
//! All providers implement `agentbus_core::CompletionProvider`.
//! The router selects the correct provider based on configuration.

pub mod mock;
pub mod router;
pub mod scripted;

pub use mock::MockProvider;
pub use router::{ProviderRouter, build_from_config};
pub use scripted::ScriptedProvider;
