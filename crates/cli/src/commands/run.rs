//! `agentbus run`: one request through the full agent bus.

use agentbus_agent::AgentSystem;
use agentbus_approval::{ApprovalEvent, ApprovalGate, ApprovalRequest};
use agentbus_core::message::{ActionName, MessageKind};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

pub struct RunOptions {
    pub workspace: Option<PathBuf>,
    pub yes: bool,
    pub timeout: Option<u64>,
}

pub async fn run(
    config_override: Option<&Path>,
    prompt: &str,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_override)?;

    if let Some(dir) = options.workspace {
        config.workspace.root = Some(dir);
    } else if config.workspace.root.is_none() {
        config.workspace.root = Some(std::env::current_dir()?);
    }
    if options.yes {
        config.approval.require_approval = false;
    }
    if let Some(secs) = options.timeout {
        config.bus.request_timeout_secs = secs;
    }

    debug!(
        require_approval = config.approval.require_approval,
        timeout_secs = config.bus.request_timeout_secs,
        "Starting agent system"
    );
    let system = AgentSystem::builder(config.clone())
        .build()
        .await
        .map_err(|e| format!("Failed to start agents: {e}"))?;

    if let Some(root) = &config.workspace.root {
        eprintln!("  Workspace: {}", root.display());
    }
    eprintln!(
        "  Provider:  {} / {}",
        config.default_provider, config.default_model
    );
    eprintln!();

    let progress = tokio::spawn(print_progress(system.orchestrator().events()));
    let prompter = system
        .approvals()
        .requires_approval()
        .then(|| tokio::spawn(prompt_for_approvals(system.approvals().clone())));

    let outcome = tokio::select! {
        result = system.process_request(prompt) => result.map_err(|e| format!("Request failed: {e}")),
        _ = tokio::signal::ctrl_c() => Err("Interrupted".to_string()),
    };

    system.shutdown();
    progress.abort();
    if let Some(prompter) = prompter {
        prompter.abort();
    }

    let result = outcome?;
    println!("{result}");
    Ok(())
}

/// Echo status updates and failures from the bus to stderr.
async fn print_progress(mut events: tokio::sync::broadcast::Receiver<Arc<agentbus_core::Message>>) {
    loop {
        match events.recv().await {
            Ok(message) => match message.kind {
                MessageKind::Notification if message.action() == ActionName::StatusUpdate => {
                    if let Some(status) = message.data_str("status") {
                        eprintln!("  [{}] {status}", message.from);
                    }
                }
                MessageKind::Error => {
                    if let Some(error) = message.data_str("error") {
                        eprintln!("  [{}] ❌ {error}", message.from);
                    }
                }
                _ => {}
            },
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
}

/// Ask on the terminal for every approval request, oldest first.
async fn prompt_for_approvals(gate: Arc<ApprovalGate>) {
    let mut events = gate.subscribe();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let request = match events.recv().await {
            Ok(ApprovalEvent::Requested(request)) => request,
            Ok(ApprovalEvent::Resolved { .. }) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        // Already expired or withdrawn while we were asking about another one.
        if !gate.pending().iter().any(|p| p.id == request.id) {
            continue;
        }

        debug!(id = %request.id, kind = %request.kind, "Prompting for approval");
        show_request(&request);
        let answer = match stdin.next_line().await {
            Ok(Some(line)) => line,
            _ => {
                gate.reject(&request.id);
                break;
            }
        };

        if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            gate.approve(&request.id);
            eprintln!("  ✅ Approved");
        } else {
            gate.reject(&request.id);
            eprintln!("  ⛔ Rejected");
        }
    }
}

fn show_request(request: &ApprovalRequest) {
    eprintln!();
    eprintln!("  🔐 Approval needed ({})", request.kind);
    eprintln!("     {}", request.description);
    if let Some(content) = request
        .data
        .get("body")
        .and_then(|b| b.get("content"))
        .and_then(|c| c.as_str())
    {
        for line in content.lines().take(20) {
            eprintln!("     │ {line}");
        }
        if content.lines().count() > 20 {
            eprintln!("     │ ...");
        }
    }
    eprint!("     Allow? [y/N] ");
    let _ = std::io::stderr().flush();
}
