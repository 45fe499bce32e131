//! `AgentSystem`: one fully wired bus.
//!
//! Built once from [`AppConfig`] plus the collaborators that touch the
//! outside world. Anything not supplied is created from config: the provider
//! router, a [`WorkspaceFs`] rooted at `workspace.root` and a [`ShellRunner`]
//! working in that root.

use agentbus_actions::ActionExecutor;
use agentbus_approval::ApprovalGate;
use agentbus_config::AppConfig;
use agentbus_core::error::{BusError, Error, Result};
use agentbus_core::fs::{CommandRunner, FileSystem};
use agentbus_core::provider::CompletionProvider;
use agentbus_providers::build_from_config;
use agentbus_tools::{ShellRunner, WorkspaceFs};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agents::{
    CodeExecutorAgent, ContextGathererAgent, GenerationSettings, GenerativeAgent,
    LanguageGeneratorAgent, TerminalExecutorAgent, ValidatorAgent,
};
use crate::bus::{Orchestrator, RequestOptions, Subscription};
use crate::store::ActivityStore;

pub struct AgentSystemBuilder {
    config: AppConfig,
    provider: Option<Arc<dyn CompletionProvider>>,
    fs: Option<Arc<dyn FileSystem>>,
    commands: Option<Arc<dyn CommandRunner>>,
    approvals: Option<Arc<ApprovalGate>>,
}

impl AgentSystemBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            provider: None,
            fs: None,
            commands: None,
            approvals: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn commands(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.commands = Some(runner);
        self
    }

    pub fn approvals(mut self, gate: Arc<ApprovalGate>) -> Self {
        self.approvals = Some(gate);
        self
    }

    /// Wire everything up and register the agents.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn build(self) -> Result<AgentSystem> {
        let config = self.config;
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(build_from_config(&config)));

        let (fs, root) = match self.fs {
            Some(fs) => (fs, None),
            None => {
                let workspace = WorkspaceFs::from_config(&config.workspace);
                let root = match &config.workspace.root {
                    Some(root) => Some(workspace.open(root).await?),
                    None => None,
                };
                (Arc::new(workspace) as Arc<dyn FileSystem>, root)
            }
        };

        let commands = self.commands.unwrap_or_else(|| {
            let mut runner = ShellRunner::from_config(&config.terminal);
            if let Some(root) = &root {
                runner = runner.with_working_dir(root);
            }
            Arc::new(runner)
        });

        let approvals = self
            .approvals
            .unwrap_or_else(|| Arc::new(ApprovalGate::from_config(&config.approval)));
        let cancel = CancellationToken::new();

        let orchestrator = Orchestrator::new(&config.bus);
        let activity = ActivityStore::new(config.activity.log_capacity);
        let activity_subscription = activity.attach(&orchestrator);

        let executor = Arc::new(
            ActionExecutor::new(fs.clone())
                .with_commands(commands.clone())
                .with_approvals(approvals.clone())
                .with_cancellation(cancel.clone()),
        );
        let settings = GenerationSettings::from_config(&config);

        orchestrator.register_agent(Arc::new(GenerativeAgent::new(
            provider.clone(),
            settings.clone(),
            executor.clone(),
        )));
        orchestrator.register_agent(Arc::new(ContextGathererAgent::new(fs.clone())));
        orchestrator.register_agent(Arc::new(CodeExecutorAgent::new(executor)));
        orchestrator.register_agent(Arc::new(ValidatorAgent::new()));
        orchestrator.register_agent(Arc::new(
            TerminalExecutorAgent::new(commands)
                .with_approvals(approvals.clone())
                .with_cancellation(cancel.clone()),
        ));
        for generator in LanguageGeneratorAgent::all(provider, &settings) {
            orchestrator.register_agent(generator);
        }

        info!(
            agents = orchestrator.agent_kinds().len(),
            provider = %settings.provider,
            model = %settings.model,
            approvals = approvals.requires_approval(),
            "Agent system ready"
        );

        Ok(AgentSystem {
            orchestrator,
            approvals,
            activity,
            _activity_subscription: activity_subscription,
            fs,
            cancel,
            request_timeout: config.bus.request_timeout(),
        })
    }
}

pub struct AgentSystem {
    orchestrator: Orchestrator,
    approvals: Arc<ApprovalGate>,
    activity: ActivityStore,
    _activity_subscription: Subscription,
    fs: Arc<dyn FileSystem>,
    cancel: CancellationToken,
    request_timeout: Option<Duration>,
}

impl AgentSystem {
    pub fn builder(config: AppConfig) -> AgentSystemBuilder {
        AgentSystemBuilder::new(config)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn approvals(&self) -> &Arc<ApprovalGate> {
        &self.approvals
    }

    pub fn activity(&self) -> &ActivityStore {
        &self.activity
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Run `prompt` through the generative agent with the configured deadline.
    pub async fn process_request(&self, prompt: impl Into<String>) -> std::result::Result<String, BusError> {
        let mut options = RequestOptions::default().with_cancel(self.cancel.child_token());
        options.timeout = self.request_timeout;
        self.orchestrator.process_request_with(prompt, options).await
    }

    pub async fn process_request_with(
        &self,
        prompt: impl Into<String>,
        options: RequestOptions,
    ) -> std::result::Result<String, BusError> {
        self.orchestrator.process_request_with(prompt, options).await
    }

    /// Cancel pending requests and approvals, then unregister every agent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.orchestrator.shutdown();
    }
}
