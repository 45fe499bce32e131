//! Terminal executor agent: runs one shell command per request.

use agentbus_approval::{ApprovalGate, ApprovalKind, ApprovalOutcome};
use agentbus_core::error::Result;
use agentbus_core::fs::CommandRunner;
use agentbus_core::message::{ActionName, AgentKind};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::Agent;
use crate::handler::{HandlerRegistry, Invocation};
use crate::runtime::AgentStatus;

pub struct TerminalExecutorAgent {
    runner: Arc<dyn CommandRunner>,
    approvals: Option<Arc<ApprovalGate>>,
    cancel: CancellationToken,
}

impl TerminalExecutorAgent {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            approvals: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_approvals(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.approvals = Some(gate);
        self
    }

    /// Abandon a pending approval when `token` fires, whatever the plan.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn execute_command(&self, invocation: Invocation) -> Result<()> {
        let command = invocation.require_str("command")?.trim();

        if let Some(gate) = &self.approvals {
            invocation.outbox.set_status(AgentStatus::Waiting);
            let request = gate.request_approval_with(
                ApprovalKind::CommandExec,
                format!("Run `{command}`"),
                json!({ "command": command }),
                gate.default_timeout(),
                &invocation.cancel,
            );
            // Dropping the request on shutdown withdraws it.
            let outcome = tokio::select! {
                outcome = request => outcome,
                _ = self.cancel.cancelled() => ApprovalOutcome::Cancelled,
            };
            invocation.outbox.set_status(AgentStatus::Working);

            if !outcome.is_approved() {
                warn!(command = %command, ?outcome, "Command not approved");
                invocation.complete(json!({
                    "result": format!("Permission denied: Run `{command}` ({outcome:?})"),
                }));
                return Ok(());
            }
        }

        info!(command = %command, "Running command");
        let output = self.runner.run(command).await?;

        invocation.complete(json!({
            "result": output.render(),
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exitCode": output.exit_code,
        }));
        Ok(())
    }
}

impl Agent for TerminalExecutorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::TerminalExecutor
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::ExecuteCommand, move |invocation| {
            let agent = self.clone();
            async move { agent.execute_command(invocation).await }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ask;
    use crate::bus::Orchestrator;
    use agentbus_approval::ApprovalEvent;
    use agentbus_core::error::CommandError;
    use agentbus_core::fs::CommandOutput;
    use agentbus_core::message::MessageKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        ran: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str) -> std::result::Result<CommandOutput, CommandError> {
            if command.starts_with("rm") {
                return Err(CommandError::NotAllowed("rm".into()));
            }
            self.ran.lock().unwrap().push(command.to_string());
            Ok(CommandOutput {
                stdout: "3 passed".into(),
                stderr: String::new(),
                exit_code: if command.contains("fail") { 1 } else { 0 },
            })
        }
    }

    #[tokio::test]
    async fn runs_and_reports_output() {
        let bus = Orchestrator::default();
        let runner = Arc::new(RecordingRunner::default());
        bus.register_agent(Arc::new(TerminalExecutorAgent::new(runner.clone())));

        let reply = ask(
            &bus,
            AgentKind::TerminalExecutor,
            ActionName::ExecuteCommand,
            json!({ "command": " cargo test " }),
        )
        .await;

        assert_eq!(reply.data_str("result"), Some("3 passed"));
        assert_eq!(reply.payload.data["exitCode"], 0);
        assert_eq!(*runner.ran.lock().unwrap(), vec!["cargo test"]);

        let reply = ask(
            &bus,
            AgentKind::TerminalExecutor,
            ActionName::ExecuteCommand,
            json!({ "command": "make fail" }),
        )
        .await;
        assert_eq!(reply.payload.data["exitCode"], 1);
        assert!(reply.data_str("result").unwrap().starts_with("[exit code: 1]"));
    }

    #[tokio::test]
    async fn runner_error_becomes_error_message() {
        let bus = Orchestrator::default();
        bus.register_agent(Arc::new(TerminalExecutorAgent::new(Arc::new(
            RecordingRunner::default(),
        ))));

        let reply = ask(
            &bus,
            AgentKind::TerminalExecutor,
            ActionName::ExecuteCommand,
            json!({ "command": "rm -rf /" }),
        )
        .await;
        assert_eq!(reply.kind, MessageKind::Error);
        assert!(reply.data_str("error").unwrap().contains("not in allowlist"));
    }

    #[tokio::test]
    async fn rejected_command_never_runs() {
        let bus = Orchestrator::default();
        let runner = Arc::new(RecordingRunner::default());
        let gate = Arc::new(ApprovalGate::new(true));
        let mut events = gate.subscribe();
        bus.register_agent(Arc::new(
            TerminalExecutorAgent::new(runner.clone()).with_approvals(gate.clone()),
        ));

        let reply = {
            let bus = bus.clone();
            tokio::spawn(async move {
                ask(
                    &bus,
                    AgentKind::TerminalExecutor,
                    ActionName::ExecuteCommand,
                    json!({ "command": "npm publish" }),
                )
                .await
            })
        };

        let ApprovalEvent::Requested(request) = events.recv().await.unwrap() else {
            panic!("expected an approval request");
        };
        assert_eq!(request.kind, ApprovalKind::CommandExec);
        assert_eq!(
            bus.status(AgentKind::TerminalExecutor),
            Some(AgentStatus::Waiting)
        );
        gate.reject(&request.id);

        let reply = reply.await.unwrap();
        assert_eq!(
            reply.data_str("result"),
            Some("Permission denied: Run `npm publish` (Rejected)")
        );
        assert!(runner.ran.lock().unwrap().is_empty());
    }
}
