//! Handler registration and the per-invocation view an agent works with.

use agentbus_core::error::{Error, Result};
use agentbus_core::message::{ActionName, AgentKind, Context, MessageDraft};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::{Delivery, Outbox};

pub type HandlerFuture = BoxFuture<'static, Result<()>>;

/// A registered action handler.
pub type Handler = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// Action handlers of one agent, keyed by typed action name.
///
/// Registering the same action twice replaces the earlier handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionName, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, action: ActionName, handler: F)
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |invocation| handler(invocation).boxed());
        if self.handlers.insert(action, handler).is_some() {
            debug!(action = %action, "Handler replaced");
        }
    }

    pub fn get(&self, action: ActionName) -> Option<Handler> {
        self.handlers.get(&action).cloned()
    }

    /// Registered actions, sorted.
    pub fn actions(&self) -> Vec<ActionName> {
        let mut actions: Vec<ActionName> = self.handlers.keys().copied().collect();
        actions.sort();
        actions
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Everything a handler receives for one message.
pub struct Invocation {
    pub message_id: String,
    pub action: ActionName,
    pub from: AgentKind,
    pub data: Value,
    pub context: Context,
    pub outbox: Outbox,
    /// Fires when the caller waiting on this message's plan gives up.
    pub cancel: CancellationToken,
}

impl Invocation {
    /// A required string field of `data`.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput {
                action: self.action,
                reason: format!("missing string field '{key}'"),
            })
    }

    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Reply to the sender with `task_completed`, echoing the context.
    pub fn complete(&self, data: Value) -> Delivery {
        self.outbox.send(MessageDraft::response(
            self.from,
            ActionName::TaskCompleted,
            data,
            self.context.clone(),
        ))
    }

    /// Tell the sender what the agent is doing.
    pub fn status_update(&self, status: impl Into<String>) -> Delivery {
        self.outbox.send(MessageDraft::notification(
            self.from,
            ActionName::StatusUpdate,
            json!({ "status": status.into() }),
            self.context.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_registration_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register(ActionName::ValidateCode, |_| async {
            Err(Error::Internal("first".into()))
        });
        registry.register(ActionName::ValidateCode, |_| async { Ok(()) });
        registry.register(ActionName::GatherContext, |_| async { Ok(()) });

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.actions(),
            vec![ActionName::ValidateCode, ActionName::GatherContext]
        );
        assert!(registry.get(ActionName::GenerateCode).is_none());
    }

    #[test]
    fn unknown_action_names_cannot_be_registered() {
        assert!("foo".parse::<ActionName>().is_err());
        assert_eq!(
            "validate_code".parse::<ActionName>().unwrap(),
            ActionName::ValidateCode
        );
    }
}
