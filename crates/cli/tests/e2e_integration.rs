//! End-to-end integration tests for the AgentBus runtime.
//!
//! These tests drive the fully wired system from a prompt to the files and
//! commands it touches, including approvals, correlation by plan id and
//! agent replacement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentbus_agent::{
    Agent, AgentStatus, AgentSystem, HandlerRegistry, Invocation, Orchestrator, RequestOptions,
};
use agentbus_approval::{ApprovalEvent, ApprovalGate};
use agentbus_config::{AppConfig, BusConfig};
use agentbus_core::error::{BusError, CommandError, Error, ProviderError};
use agentbus_core::fs::{CommandOutput, CommandRunner};
use agentbus_core::message::{
    ActionName, AgentKind, Context, Message, MessageDraft, MessageKind, PlanId,
};
use agentbus_providers::{MockProvider, ScriptedProvider};
use agentbus_tools::InMemoryFs;
use agentbus_workflow::{
    LlmStepExecutor, StepStatus, WorkflowEvent, WorkflowRunner, mobile_app_blueprint,
};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

// ── Helpers ──────────────────────────────────────────────────────────────

fn config(require_approval: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.approval.require_approval = require_approval;
    config.approval.timeout_secs = 0;
    config
}

async fn system_with(
    config: AppConfig,
    provider: Arc<dyn agentbus_core::CompletionProvider>,
    fs: Arc<InMemoryFs>,
) -> AgentSystem {
    AgentSystem::builder(config)
        .provider(provider)
        .filesystem(fs)
        .build()
        .await
        .unwrap()
}

/// Answer every approval request on `gate` with `approve`, counting them.
fn auto_answer(gate: &Arc<ApprovalGate>, approve: bool) -> Arc<AtomicUsize> {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut events = gate.subscribe();
    let gate = gate.clone();
    let counter = seen.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ApprovalEvent::Requested(request) = event {
                counter.fetch_add(1, Ordering::SeqCst);
                if approve {
                    gate.approve(&request.id);
                } else {
                    gate.reject(&request.id);
                }
            }
        }
    });
    seen
}

/// Send a request from the orchestrator to `to` and wait for its reply.
async fn ask(bus: &Orchestrator, to: AgentKind, action: ActionName, data: Value) -> Arc<Message> {
    let plan_id = PlanId::generate();
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let watched = plan_id.clone();
    let _subscription = bus.subscribe(move |message| {
        let is_reply = matches!(message.kind, MessageKind::Response | MessageKind::Error);
        if is_reply && message.from == to && message.payload.context.belongs_to(&watched) {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(message.clone());
            }
        }
    });

    bus.dispatch(
        MessageDraft::request(to, action, data, Context::for_plan(plan_id))
            .stamp(AgentKind::Orchestrator),
    )
    .into_result()
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("no reply within 5s")
        .unwrap()
}

/// A generative agent stand-in with a fixed handler.
struct StubGenerative<F> {
    handler: F,
}

impl<F, Fut> Agent for StubGenerative<F>
where
    F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = agentbus_core::Result<()>> + Send + 'static,
{
    fn kind(&self) -> AgentKind {
        AgentKind::GenerativeAi
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::GenerateCode, self.handler.clone());
    }
}

struct FakeShell {
    commands: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl CommandRunner for FakeShell {
    async fn run(&self, command: &str) -> Result<CommandOutput, CommandError> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(CommandOutput {
            stdout: format!("ran {command}"),
            stderr: String::new(),
            exit_code: 0,
        })
    }
}

// ── Full pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_prompt_writes_file_into_real_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(false);
    config.workspace.root = Some(dir.path().to_path_buf());

    let system = AgentSystem::builder(config).build().await.unwrap();
    let result = system.process_request("Login Form").await.unwrap();

    assert!(result.contains("```action:write_file"));
    assert!(result.contains("[write_file ok] File written: src/generated/login-form.ts"));
    let written = std::fs::read_to_string(dir.path().join("src/generated/login-form.ts")).unwrap();
    assert!(written.contains("Generated for: Login Form"));
}

#[tokio::test]
async fn e2e_approved_write_lands_after_human_decision() {
    let fs = Arc::new(InMemoryFs::new());
    let system = system_with(config(true), Arc::new(MockProvider::new()), fs.clone()).await;
    let asked = auto_answer(system.approvals(), true);

    let result = system.process_request("add a footer").await.unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert!(result.contains("[write_file ok]"));
    assert!(fs.snapshot().contains_key("src/generated/add-a-footer.ts"));
    assert!(system.approvals().pending().is_empty());
}

#[tokio::test]
async fn e2e_rejected_write_is_reported_in_the_result() {
    let fs = Arc::new(InMemoryFs::new());
    let system = system_with(config(true), Arc::new(MockProvider::new()), fs.clone()).await;
    auto_answer(system.approvals(), false);

    let result = system.process_request("add a footer").await.unwrap();

    assert!(result.contains("[write_file failed] Permission denied"));
    assert!(fs.snapshot().is_empty());
    assert_eq!(
        system.activity().status(AgentKind::GenerativeAi),
        AgentStatus::Success
    );
}

#[tokio::test]
async fn e2e_generation_uses_configured_model_and_prompt() {
    let mut config = config(false);
    config.default_model = "test-model".into();
    config.system_prompt = Some("Answer tersely.".into());
    let provider = Arc::new(ScriptedProvider::texts(["Nothing to change."]));
    let system = system_with(config, provider.clone(), Arc::new(InMemoryFs::new())).await;

    let result = system.process_request("review this").await.unwrap();

    assert_eq!(result, "Nothing to change.");
    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "test-model");
    assert_eq!(requests[0].prompt, "review this");
    assert_eq!(requests[0].system_prompt.as_deref(), Some("Answer tersely."));
}

#[tokio::test]
async fn e2e_provider_failure_rejects_the_request() {
    let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::RateLimited {
        retry_after_secs: 30,
    })]));
    let system = system_with(config(false), provider, Arc::new(InMemoryFs::new())).await;

    let err = system.process_request("anything").await.unwrap_err();

    match err {
        BusError::Remote(message) => assert!(message.contains("Rate limited")),
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(
        system.activity().status(AgentKind::GenerativeAi),
        AgentStatus::Error
    );
}

#[tokio::test]
async fn e2e_unanswered_approval_times_out() {
    let system = system_with(
        config(true),
        Arc::new(MockProvider::new()),
        Arc::new(InMemoryFs::new()),
    )
    .await;

    let options = RequestOptions::default().with_timeout(Duration::from_millis(100));
    let err = system
        .process_request_with("stuck", options)
        .await
        .unwrap_err();

    assert!(matches!(err, BusError::Timeout(_)));
    // The abandoned plan withdraws its approval once the handler is dropped.
    for _ in 0..50 {
        if system.approvals().pending().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(system.approvals().pending().is_empty());
    system.shutdown();
}

// ── Correlation and routing ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_reply_echoes_plan_id_to_orchestrator() {
    let system = system_with(
        config(false),
        Arc::new(MockProvider::new()),
        Arc::new(InMemoryFs::new()),
    )
    .await;
    let bus = system.orchestrator();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = bus.subscribe(move |message| {
        if message.kind == MessageKind::Response {
            let _ = tx.send(message.clone());
        }
    });

    let plan = PlanId("p1".into());
    bus.dispatch(
        MessageDraft::request(
            AgentKind::GenerativeAi,
            ActionName::GenerateCode,
            json!({ "prompt": "x" }),
            Context::for_plan(plan.clone()),
        )
        .stamp(AgentKind::Orchestrator),
    );

    let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.from, AgentKind::GenerativeAi);
    assert_eq!(reply.to, AgentKind::Orchestrator);
    assert_eq!(reply.action(), ActionName::TaskCompleted);
    assert_eq!(reply.plan_id(), Some(&plan));
    assert!(reply.data_str("result").unwrap().contains("src/generated/x.ts"));
}

#[tokio::test]
async fn e2e_handler_error_rejects_with_its_message() {
    let system = system_with(
        config(false),
        Arc::new(MockProvider::new()),
        Arc::new(InMemoryFs::new()),
    )
    .await;
    system.orchestrator().register_agent(Arc::new(StubGenerative {
        handler: |_invocation: Invocation| async {
            Err::<(), _>(Error::Internal("model exploded".into()))
        },
    }));

    let err = system.process_request("x").await.unwrap_err();

    match err {
        BusError::Remote(message) => assert!(message.contains("model exploded")),
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn e2e_replacement_agent_serves_later_requests() {
    let system = system_with(
        config(false),
        Arc::new(MockProvider::new()),
        Arc::new(InMemoryFs::new()),
    )
    .await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    system.orchestrator().register_agent(Arc::new(StubGenerative {
        handler: move |invocation: Invocation| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let prompt = invocation.require_str("prompt")?.to_uppercase();
                invocation.complete(json!({ "result": prompt }));
                Ok::<(), Error>(())
            }
        },
    }));

    assert_eq!(system.process_request("shout").await.unwrap(), "SHOUT");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn e2e_unregistered_target_is_dropped_but_observed() {
    let bus = Orchestrator::new(&BusConfig::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let _subscription = bus.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let delivery = bus.dispatch(
        MessageDraft::request(
            AgentKind::Validator,
            ActionName::ValidateCode,
            json!({ "code": "x" }),
            Context::default(),
        )
        .stamp(AgentKind::Orchestrator),
    );

    assert!(!delivery.is_delivered());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(bus.dead_letters(), 1);
}

// ── Specialized agents over the bus ──────────────────────────────────────

#[tokio::test]
async fn e2e_code_executor_skips_malformed_fence() {
    let fs = Arc::new(InMemoryFs::new());
    let system = system_with(config(false), Arc::new(MockProvider::new()), fs.clone()).await;
    let text = "```action:write_file\n{\"path\":\"a.ts\",\"content\":\"x\"}\n```\n```action:bogus\nnot json```";

    let reply = ask(
        system.orchestrator(),
        AgentKind::CodeExecutor,
        ActionName::ExecuteActions,
        json!({ "text": text }),
    )
    .await;

    assert_eq!(reply.kind, MessageKind::Response);
    assert_eq!(reply.payload.data["actions"].as_array().unwrap().len(), 1);
    assert_eq!(reply.payload.data["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(fs.snapshot().get("a.ts").map(String::as_str), Some("x"));
}

#[tokio::test]
async fn e2e_validator_reports_unclosed_brace() {
    let system = system_with(
        config(false),
        Arc::new(MockProvider::new()),
        Arc::new(InMemoryFs::new()),
    )
    .await;

    let reply = ask(
        system.orchestrator(),
        AgentKind::Validator,
        ActionName::ValidateCode,
        json!({ "code": "fn main() {\n    let s = \"}\";\n", "language": "rust" }),
    )
    .await;

    assert_eq!(reply.payload.data["valid"], json!(false));
    let issues = reply.payload.data["issues"].as_array().unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].as_str().unwrap().contains("never closed"));
}

#[tokio::test]
async fn e2e_terminal_runs_approved_command() {
    let shell = Arc::new(FakeShell {
        commands: Mutex::new(Vec::new()),
    });
    let system = AgentSystem::builder(config(true))
        .provider(Arc::new(MockProvider::new()))
        .filesystem(Arc::new(InMemoryFs::new()))
        .commands(shell.clone())
        .build()
        .await
        .unwrap();
    auto_answer(system.approvals(), true);

    let reply = ask(
        system.orchestrator(),
        AgentKind::TerminalExecutor,
        ActionName::ExecuteCommand,
        json!({ "command": "npm test" }),
    )
    .await;

    assert_eq!(reply.payload.data["exitCode"], json!(0));
    assert_eq!(reply.data_str("result"), Some("ran npm test"));
    assert_eq!(*shell.commands.lock().unwrap(), vec!["npm test".to_string()]);
}

#[tokio::test]
async fn e2e_terminal_denial_never_runs_command() {
    let shell = Arc::new(FakeShell {
        commands: Mutex::new(Vec::new()),
    });
    let system = AgentSystem::builder(config(true))
        .provider(Arc::new(MockProvider::new()))
        .filesystem(Arc::new(InMemoryFs::new()))
        .commands(shell.clone())
        .build()
        .await
        .unwrap();
    auto_answer(system.approvals(), false);

    let reply = ask(
        system.orchestrator(),
        AgentKind::TerminalExecutor,
        ActionName::ExecuteCommand,
        json!({ "command": "rm -rf build" }),
    )
    .await;

    assert!(reply.data_str("result").unwrap().starts_with("Permission denied"));
    assert!(shell.commands.lock().unwrap().is_empty());
}

#[tokio::test]
async fn e2e_context_gatherer_reads_workspace_files() {
    let fs = Arc::new(InMemoryFs::with_files([
        ("README.md", "# Demo"),
        ("src/main.ts", "console.log('hi');"),
    ]));
    let system = system_with(config(false), Arc::new(MockProvider::new()), fs).await;

    let reply = ask(
        system.orchestrator(),
        AgentKind::ContextGatherer,
        ActionName::GatherContext,
        json!({}),
    )
    .await;

    let digest = reply.data_str("result").unwrap();
    assert!(digest.starts_with("Directory: ."));
    assert!(digest.contains("  src/"));
    assert!(digest.contains("--- README.md ---\n# Demo"));
}

#[tokio::test]
async fn e2e_activity_log_follows_the_request() {
    let system = system_with(
        config(false),
        Arc::new(MockProvider::new()),
        Arc::new(InMemoryFs::new()),
    )
    .await;

    system.process_request("add a header").await.unwrap();

    let log = system.activity().log();
    let first = log.first().unwrap();
    assert_eq!(first.from, AgentKind::Orchestrator);
    assert_eq!(first.to, AgentKind::GenerativeAi);
    assert_eq!(first.summary, "add a header");
    assert!(
        log.iter()
            .any(|e| e.kind == MessageKind::Notification && e.action == ActionName::StatusUpdate)
    );
    let last = log.last().unwrap();
    assert_eq!(last.kind, MessageKind::Response);
    assert_eq!(last.action, ActionName::TaskCompleted);
}

// ── Workflow ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_mobile_workflow_runs_every_step() {
    let replies: Vec<String> = (1..=7).map(|i| format!("output {i}")).collect();
    let provider = Arc::new(ScriptedProvider::texts(replies));
    let executor = LlmStepExecutor::new(provider.clone(), "test-model");
    let mut workflow = mobile_app_blueprint("Notes", "Flutter");

    let (tx, mut rx) = mpsc::channel(256);
    let report = WorkflowRunner::new()
        .with_events(tx)
        .run(&mut workflow, &executor)
        .await;

    assert!(report.success());
    assert_eq!(report.completed, 7);
    assert!(workflow.steps.iter().all(|s| s.status == StepStatus::Completed));
    // Later steps see earlier outputs.
    let last_prompt = provider.requests().last().unwrap().clone();
    assert!(last_prompt.context.unwrap().contains("output 6"));

    let mut started = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, WorkflowEvent::StepStarted { .. }) {
            started += 1;
        }
    }
    assert_eq!(started, 7);
}

#[tokio::test]
async fn e2e_mobile_workflow_stops_at_first_failure() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("requirements".into()),
        Ok("architecture".into()),
        Err(ProviderError::Timeout("30s".into())),
    ]));
    let executor = LlmStepExecutor::new(provider.clone(), "test-model");
    let mut workflow = mobile_app_blueprint("Notes", "iOS");

    let report = WorkflowRunner::new().run(&mut workflow, &executor).await;

    assert!(!report.success());
    assert_eq!(report.completed, 2);
    assert_eq!(report.skipped, 4);
    assert_eq!(workflow.steps[2].status, StepStatus::Failed);
    assert_eq!(provider.call_count(), 3);
}
