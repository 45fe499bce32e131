//! The per-agent mailbox loop.
//!
//! Each registered agent gets one task draining its bounded mailbox, so the
//! agent handles exactly one message at a time, in arrival order.

use agentbus_core::error::{BusError, Error};
use agentbus_core::message::{AgentKind, Message, MessageDraft};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bus::Outbox;
use crate::handler::{HandlerRegistry, Invocation};

/// Observable state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    /// Blocked on a human (approval) or another collaborator.
    Waiting,
    Error,
    Success,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Error => "error",
            AgentStatus::Success => "success",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub(crate) struct StatusCell(Mutex<AgentStatus>);

impl StatusCell {
    pub(crate) fn new(status: AgentStatus) -> Self {
        Self(Mutex::new(status))
    }

    pub(crate) fn get(&self) -> AgentStatus {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set(&self, status: AgentStatus) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }
}

pub(crate) struct AgentRuntime {
    pub(crate) kind: AgentKind,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) status: Arc<StatusCell>,
    pub(crate) outbox: Outbox,
}

impl AgentRuntime {
    /// Drain the mailbox until every sender is gone.
    pub(crate) async fn run(self, mut mailbox: mpsc::Receiver<Arc<Message>>) {
        while let Some(message) = mailbox.recv().await {
            self.process(message).await;
        }
        debug!(agent = %self.kind, "Mailbox closed");
    }

    pub(crate) async fn process(&self, message: Arc<Message>) {
        let action = message.action();

        let Some(handler) = self.handlers.get(action) else {
            warn!(agent = %self.kind, action = %action, "No handler registered for action");
            let err = BusError::NoHandler {
                agent: self.kind,
                action,
            };
            self.report(&message, err.to_string());
            return;
        };

        let cancel = self.outbox.cancellation(&message.payload.context);
        if cancel.is_cancelled() {
            debug!(agent = %self.kind, action = %action, message_id = %message.id, "Plan already abandoned, skipping message");
            return;
        }

        self.status.set(AgentStatus::Working);
        let invocation = Invocation {
            message_id: message.id.clone(),
            action,
            from: message.from,
            data: message.payload.data.clone(),
            context: message.payload.context.clone(),
            outbox: self.outbox.clone(),
            cancel: cancel.clone(),
        };

        // A handler may panic while building its future, not only while running it.
        let result = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(invocation))) {
            Ok(future) => {
                tokio::select! {
                    biased;
                    result = AssertUnwindSafe(future).catch_unwind() => result,
                    _ = cancel.cancelled() => {
                        info!(agent = %self.kind, action = %action, message_id = %message.id, "Plan abandoned, handler stopped");
                        self.status.set(AgentStatus::Idle);
                        return;
                    }
                }
            }
            Err(panic) => Err(panic),
        };

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => Some(Error::Internal(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match failure {
            None => self.status.set(AgentStatus::Idle),
            Some(e) => {
                self.status.set(AgentStatus::Error);
                error!(agent = %self.kind, action = %action, message_id = %message.id, "Handler failed: {e}");
                self.report(&message, e.to_string());
            }
        }
    }

    /// Send an `error` message for `message` to the orchestrator.
    fn report(&self, message: &Message, error: String) {
        self.outbox.send(MessageDraft::error(
            AgentKind::Orchestrator,
            json!({ "error": error, "messageId": message.id }),
            message.payload.context.clone(),
        ));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
