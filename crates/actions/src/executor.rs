//! Action executor: runs parsed actions against the workspace.
//!
//! Execution never fails as a whole. Every fault becomes a textual outcome so
//! one bad action cannot abort its siblings. Writes, deletes and commands go
//! through the approval gate first.

use agentbus_approval::{ApprovalGate, ApprovalKind, ApprovalOutcome};
use agentbus_core::Action;
use agentbus_core::fs::{CommandRunner, EntryKind, FileSystem};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub verb: String,
    pub success: bool,
    pub output: String,
}

impl ActionOutcome {
    fn ok(verb: &str, output: impl Into<String>) -> Self {
        Self {
            verb: verb.to_string(),
            success: true,
            output: output.into(),
        }
    }

    fn failed(verb: &str, output: impl Into<String>) -> Self {
        Self {
            verb: verb.to_string(),
            success: false,
            output: output.into(),
        }
    }
}

/// Render outcomes as the summary appended to a model reply.
pub fn summarize(outcomes: &[ActionOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| {
            let mark = if o.success { "ok" } else { "failed" };
            format!("[{} {mark}] {}", o.verb, o.output)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ActionExecutor {
    fs: Arc<dyn FileSystem>,
    commands: Option<Arc<dyn CommandRunner>>,
    approvals: Option<Arc<ApprovalGate>>,
    cancel: CancellationToken,
}

impl ActionExecutor {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            commands: None,
            approvals: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_commands(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Require approval for side-effecting actions.
    pub fn with_approvals(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.approvals = Some(gate);
        self
    }

    /// Abandon pending approvals when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run a batch in order. A failure never stops the rest.
    pub async fn execute_all(&self, actions: &[Action]) -> Vec<ActionOutcome> {
        self.execute_all_with(actions, &self.cancel).await
    }

    /// Run a batch in order, abandoning approvals when `cancel` fires.
    ///
    /// `cancel` is watched alongside the executor's own token. Once either
    /// has fired, the remaining actions are not run.
    pub async fn execute_all_with(
        &self,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            if cancel.is_cancelled() || self.cancel.is_cancelled() {
                outcomes.push(ActionOutcome::failed(action.verb(), "Cancelled before running"));
                continue;
            }
            outcomes.push(self.execute_with(action, cancel).await);
        }
        outcomes
    }

    pub async fn execute(&self, action: &Action) -> ActionOutcome {
        self.execute_with(action, &self.cancel).await
    }

    async fn execute_with(&self, action: &Action, cancel: &CancellationToken) -> ActionOutcome {
        let verb = action.verb();
        debug!(verb = %verb, "Executing action");

        if let Some(kind) = approval_kind(action) {
            let outcome = self.approve(kind, action, cancel).await;
            if !outcome.is_approved() {
                return ActionOutcome::failed(
                    verb,
                    format!("Permission denied: {} ({outcome:?})", action.describe()),
                );
            }
        }

        let outcome = match action {
            Action::WriteFile { path, content } => match self.fs.write_file(path, content).await {
                Ok(()) => ActionOutcome::ok(verb, format!("File written: {path}")),
                Err(e) => ActionOutcome::failed(verb, format!("Error writing {path}: {e}")),
            },
            Action::ReadFile { path } => match self.fs.read_file(path).await {
                Ok(content) => ActionOutcome::ok(verb, content),
                Err(e) => ActionOutcome::failed(verb, format!("Error reading {path}: {e}")),
            },
            Action::ListDir { path } => match self.fs.list_directory(path).await {
                Ok(entries) if entries.is_empty() => ActionOutcome::ok(verb, "(empty directory)"),
                Ok(entries) => {
                    let lines: Vec<String> = entries
                        .iter()
                        .map(|e| match e.kind {
                            EntryKind::Directory => format!("{}/", e.name),
                            EntryKind::File => e.name.clone(),
                        })
                        .collect();
                    ActionOutcome::ok(verb, lines.join("\n"))
                }
                Err(e) => ActionOutcome::failed(verb, format!("Error listing {path}: {e}")),
            },
            Action::DeleteFile { path } => match self.fs.delete_file(path).await {
                Ok(()) => ActionOutcome::ok(verb, format!("File deleted: {path}")),
                Err(e) => ActionOutcome::failed(verb, format!("Error deleting {path}: {e}")),
            },
            Action::ExecuteCommand { command } => match &self.commands {
                None => ActionOutcome::failed(verb, "Command execution is not available"),
                Some(runner) => match runner.run(command).await {
                    Ok(output) => ActionOutcome {
                        verb: verb.to_string(),
                        success: output.success(),
                        output: output.render(),
                    },
                    Err(e) => ActionOutcome::failed(verb, format!("Error running `{command}`: {e}")),
                },
            },
            Action::Unknown { verb, .. } => {
                ActionOutcome::failed(verb, format!("Unknown action: {verb}"))
            }
        };

        if !outcome.success {
            warn!(verb = %outcome.verb, output = %outcome.output, "Action failed");
        }
        outcome
    }

    async fn approve(
        &self,
        kind: ApprovalKind,
        action: &Action,
        cancel: &CancellationToken,
    ) -> ApprovalOutcome {
        let Some(gate) = &self.approvals else {
            return ApprovalOutcome::Approved;
        };
        let data = json!({ "verb": action.verb(), "body": action.body() });
        let request = gate.request_approval_with(
            kind,
            action.describe(),
            data,
            gate.default_timeout(),
            cancel,
        );
        tokio::select! {
            outcome = request => outcome,
            _ = self.cancel.cancelled() => ApprovalOutcome::Cancelled,
        }
    }
}

fn approval_kind(action: &Action) -> Option<ApprovalKind> {
    match action {
        Action::WriteFile { .. } => Some(ApprovalKind::FileWrite),
        Action::DeleteFile { .. } => Some(ApprovalKind::FileDelete),
        Action::ExecuteCommand { .. } => Some(ApprovalKind::CommandExec),
        _ => None,
    }
}
