//! Code executor agent: runs action batches handed to it directly.

use agentbus_actions::{ActionExecutor, parse_report, summarize};
use agentbus_core::Action;
use agentbus_core::error::{Error, Result};
use agentbus_core::message::{ActionName, AgentKind};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::bus::Agent;
use crate::handler::{HandlerRegistry, Invocation};
use crate::runtime::AgentStatus;

pub struct CodeExecutorAgent {
    executor: Arc<ActionExecutor>,
}

impl CodeExecutorAgent {
    pub fn new(executor: Arc<ActionExecutor>) -> Self {
        Self { executor }
    }

    async fn execute_actions(&self, invocation: Invocation) -> Result<()> {
        let (actions, skipped) = if let Some(text) = invocation.optional_str("text") {
            let report = parse_report(text);
            (report.actions, report.skipped)
        } else if let Some(list) = invocation.data.get("actions").and_then(Value::as_array) {
            (actions_from_list(invocation.action, list)?, Vec::new())
        } else {
            return Err(Error::InvalidInput {
                action: invocation.action,
                reason: "expected 'text' or an 'actions' array".into(),
            });
        };

        if actions.iter().any(Action::is_side_effecting) {
            invocation.outbox.set_status(AgentStatus::Waiting);
        }
        let outcomes = self.executor.execute_all(&actions).await;
        invocation.outbox.set_status(AgentStatus::Working);

        let result = if outcomes.is_empty() {
            "No actions to execute".to_string()
        } else {
            summarize(&outcomes)
        };
        invocation.complete(json!({
            "result": result,
            "actions": outcomes,
            "skipped": skipped,
        }));
        Ok(())
    }
}

/// `[{ "type": "write_file", "path": ..., "content": ... }, ...]`
fn actions_from_list(action: ActionName, list: &[Value]) -> Result<Vec<Action>> {
    list.iter()
        .enumerate()
        .map(|(i, item)| {
            let invalid = |reason: String| Error::InvalidInput {
                action,
                reason: format!("actions[{i}]: {reason}"),
            };
            let mut body = item
                .as_object()
                .cloned()
                .ok_or_else(|| invalid("not an object".into()))?;
            let verb = body
                .remove("type")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| invalid("missing 'type'".into()))?;
            Action::from_parts(&verb, Value::Object(body)).map_err(|e| invalid(e.to_string()))
        })
        .collect()
}

impl Agent for CodeExecutorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::CodeExecutor
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::ExecuteActions, move |invocation| {
            let agent = self.clone();
            async move { agent.execute_actions(invocation).await }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ask;
    use crate::bus::Orchestrator;
    use agentbus_core::message::MessageKind;
    use agentbus_tools::InMemoryFs;

    fn setup() -> (Orchestrator, Arc<InMemoryFs>) {
        let bus = Orchestrator::default();
        let fs = Arc::new(InMemoryFs::with_files([("README.md", "hello")]));
        let executor = Arc::new(ActionExecutor::new(fs.clone()));
        bus.register_agent(Arc::new(CodeExecutorAgent::new(executor)));
        (bus, fs)
    }

    #[tokio::test]
    async fn executes_fenced_text() {
        let (bus, fs) = setup();
        let text = "```action:write_file\n{\"path\":\"a.txt\",\"content\":\"A\"}\n```\n\
                    ```action:read_file\n{\"path\":\"README.md\"}\n```";

        let reply = ask(
            &bus,
            AgentKind::CodeExecutor,
            ActionName::ExecuteActions,
            json!({ "text": text }),
        )
        .await;

        assert_eq!(reply.kind, MessageKind::Response);
        assert_eq!(
            reply.data_str("result"),
            Some("[write_file ok] File written: a.txt\n[read_file ok] hello")
        );
        assert_eq!(fs.snapshot().get("a.txt").map(String::as_str), Some("A"));
    }

    #[tokio::test]
    async fn executes_structured_list() {
        let (bus, fs) = setup();

        let reply = ask(
            &bus,
            AgentKind::CodeExecutor,
            ActionName::ExecuteActions,
            json!({ "actions": [
                { "type": "delete_file", "path": "README.md" },
                { "type": "rename_file", "from": "a", "to": "b" },
            ]}),
        )
        .await;

        let outcomes = reply.payload.data["actions"].as_array().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0]["success"], true);
        assert_eq!(outcomes[1]["output"], "Unknown action: rename_file");
        assert!(fs.snapshot().is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_input() {
        let (bus, _) = setup();

        let reply = ask(
            &bus,
            AgentKind::CodeExecutor,
            ActionName::ExecuteActions,
            json!({ "actions": [{ "type": "write_file", "path": "x" }] }),
        )
        .await;
        assert_eq!(reply.kind, MessageKind::Error);
        assert!(reply.data_str("error").unwrap().contains("actions[0]"));

        let reply = ask(&bus, AgentKind::CodeExecutor, ActionName::ExecuteActions, json!({})).await;
        assert_eq!(reply.kind, MessageKind::Error);
    }
}
