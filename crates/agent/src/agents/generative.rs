//! Generative agent: prompt in, model text plus executed actions out.

use agentbus_actions::{ActionExecutor, parse_report, summarize};
use agentbus_core::error::Result;
use agentbus_core::message::{ActionName, AgentKind};
use agentbus_core::provider::CompletionProvider;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DEFAULT_SYSTEM_PROMPT, GenerationSettings};
use crate::bus::Agent;
use crate::handler::{HandlerRegistry, Invocation};
use crate::runtime::AgentStatus;

pub struct GenerativeAgent {
    provider: Arc<dyn CompletionProvider>,
    settings: GenerationSettings,
    executor: Arc<ActionExecutor>,
}

impl GenerativeAgent {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        settings: GenerationSettings,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        Self {
            provider,
            settings,
            executor,
        }
    }

    async fn generate_code(&self, invocation: Invocation) -> Result<()> {
        let prompt = invocation.require_str("prompt")?;
        invocation.status_update("Generating code...");

        let mut request = self.settings.request(prompt);
        if request.system_prompt.is_none() {
            request.system_prompt = Some(DEFAULT_SYSTEM_PROMPT.to_string());
        }
        if let Some(context) = invocation.optional_str("context") {
            request = request.with_context(context);
        }

        debug!(provider = %request.provider, model = %request.model, "Requesting completion");
        let response = self.provider.complete(request).await?;

        let report = parse_report(&response.content);
        let outcomes = if report.actions.is_empty() {
            Vec::new()
        } else {
            info!(count = report.actions.len(), "Executing actions from model output");
            if report.actions.iter().any(|a| a.is_side_effecting()) {
                invocation.outbox.set_status(AgentStatus::Waiting);
            }
            let outcomes = self
                .executor
                .execute_all_with(&report.actions, &invocation.cancel)
                .await;
            invocation.outbox.set_status(AgentStatus::Working);
            outcomes
        };

        let mut result = response.content.clone();
        if !outcomes.is_empty() {
            result.push_str("\n\n---\nActions:\n");
            result.push_str(&summarize(&outcomes));
        }

        invocation.complete(json!({
            "result": result,
            "model": response.model,
            "actions": outcomes,
            "skipped": report.skipped,
        }));
        Ok(())
    }
}

impl Agent for GenerativeAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::GenerativeAi
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::GenerateCode, move |invocation| {
            let agent = self.clone();
            async move { agent.generate_code(invocation).await }
        });
    }
}
