//! The AgentBus runtime: agents talking over a message bus.
//!
//! 1. **Dispatch**: the [`Orchestrator`] routes every [`Message`] to the
//!    target agent's mailbox and notifies observers.
//! 2. **Handle**: each agent drains its mailbox one message at a time and
//!    runs the handler registered for the message's action.
//! 3. **Reply**: handlers answer with a `response` (or `error`) message that
//!    echoes the request's context, which is all correlation needs.
//!
//! [`AgentSystem`] wires the bus, approval gate, activity store and all
//! agents together from configuration.
//!
//! [`Message`]: agentbus_core::Message

pub mod agents;
pub mod bus;
pub mod handler;
pub mod runtime;
pub mod store;
pub mod system;

pub use agents::{
    CodeExecutorAgent, ContextGathererAgent, GenerationSettings, GenerativeAgent,
    LanguageGeneratorAgent, TerminalExecutorAgent, ValidatorAgent,
};
pub use bus::{Agent, Delivery, Listener, Orchestrator, Outbox, RequestOptions, Subscription};
pub use handler::{Handler, HandlerRegistry, Invocation};
pub use runtime::AgentStatus;
pub use store::{ActivityStore, LogEntry};
pub use system::{AgentSystem, AgentSystemBuilder};
