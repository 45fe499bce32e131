//! Specialized agents.
//!
//! Each one registers a handler or two, calls into a collaborator, and
//! replies to the sender with a `task_completed` response whose
//! `data.result` is text. The request's context is always echoed.

pub mod context;
pub mod executor;
pub mod generative;
pub mod language;
pub mod terminal;
pub mod validator;

pub use context::ContextGathererAgent;
pub use executor::CodeExecutorAgent;
pub use generative::GenerativeAgent;
pub use language::LanguageGeneratorAgent;
pub use terminal::TerminalExecutorAgent;
pub use validator::ValidatorAgent;

use agentbus_config::AppConfig;
use agentbus_core::provider::CompletionRequest;

/// Provider parameters shared by the generating agents.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            provider: config.default_provider.clone(),
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// A completion request for `prompt` with these settings.
    pub fn request(&self, prompt: impl Into<String>) -> CompletionRequest {
        let mut request = CompletionRequest::new(&self.provider, &self.model, prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.system_prompt = self.system_prompt.clone();
        request
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The system prompt for the generative agent when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the code generation agent of an AI code editor. \
Answer with working code. To change the user's workspace, emit action blocks: \
a fence line ```action:<verb> followed by one JSON object and a closing fence. \
Verbs: write_file {path, content}, read_file {path}, list_dir {path}, \
delete_file {path}, execute_command {command}.";

#[cfg(test)]
pub(crate) mod test_support {
    use crate::bus::Orchestrator;
    use agentbus_core::message::{
        ActionName, AgentKind, Context, Message, MessageDraft, MessageKind, PlanId,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    /// Dispatch a request from the orchestrator and wait for the reply
    /// (response or error) carrying the same plan id.
    pub async fn ask(bus: &Orchestrator, to: AgentKind, action: ActionName, data: Value) -> Arc<Message> {
        let mut events: broadcast::Receiver<Arc<Message>> = bus.events();
        let plan = PlanId::generate();
        bus.dispatch(
            MessageDraft::request(to, action, data, Context::for_plan(plan.clone()))
                .stamp(AgentKind::Orchestrator),
        );
        loop {
            let message = events.recv().await.unwrap();
            let is_reply = matches!(message.kind, MessageKind::Response | MessageKind::Error);
            if is_reply && message.from == to && message.plan_id() == Some(&plan) {
                return message;
            }
        }
    }
}
