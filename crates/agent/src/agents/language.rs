//! Language generator agents: one per [`Language`], same code, different
//! system prompt. They answer with code only and never touch the workspace.

use agentbus_core::Language;
use agentbus_core::error::Result;
use agentbus_core::message::{ActionName, AgentKind};
use agentbus_core::provider::CompletionProvider;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::GenerationSettings;
use crate::bus::Agent;
use crate::handler::{HandlerRegistry, Invocation};

pub struct LanguageGeneratorAgent {
    language: Language,
    provider: Arc<dyn CompletionProvider>,
    settings: GenerationSettings,
}

impl LanguageGeneratorAgent {
    pub fn new(
        language: Language,
        provider: Arc<dyn CompletionProvider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            language,
            provider,
            settings,
        }
    }

    /// One generator for every supported language, sharing a provider.
    pub fn all(
        provider: Arc<dyn CompletionProvider>,
        settings: &GenerationSettings,
    ) -> Vec<Arc<LanguageGeneratorAgent>> {
        Language::ALL
            .into_iter()
            .map(|language| Arc::new(Self::new(language, provider.clone(), settings.clone())))
            .collect()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    async fn generate_code(&self, invocation: Invocation) -> Result<()> {
        let prompt = invocation.require_str("prompt")?;
        invocation.status_update(format!("Writing {} code...", self.language));

        let mut request = self
            .settings
            .request(prompt)
            .with_system_prompt(self.language.prompt_template());
        if let Some(context) = invocation.optional_str("context") {
            request = request.with_context(context);
        }

        debug!(language = %self.language, model = %request.model, "Requesting completion");
        let response = self.provider.complete(request).await?;

        invocation.complete(json!({
            "result": response.content,
            "language": self.language.code(),
            "model": response.model,
        }));
        Ok(())
    }
}

impl Agent for LanguageGeneratorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::LanguageGenerator(self.language)
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::GenerateCode, move |invocation| {
            let agent = self.clone();
            async move { agent.generate_code(invocation).await }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ask;
    use crate::bus::Orchestrator;
    use agentbus_providers::ScriptedProvider;

    #[tokio::test]
    async fn uses_language_prompt_and_skips_execution() {
        let bus = Orchestrator::default();
        let reply_text = "```action:write_file\n{\"path\":\"x.py\",\"content\":\"\"}\n```";
        let provider = Arc::new(ScriptedProvider::texts([reply_text]));
        bus.register_agent(Arc::new(LanguageGeneratorAgent::new(
            Language::Python,
            provider.clone(),
            GenerationSettings::default(),
        )));

        let reply = ask(
            &bus,
            AgentKind::LanguageGenerator(Language::Python),
            ActionName::GenerateCode,
            json!({ "prompt": "fizzbuzz" }),
        )
        .await;

        assert_eq!(reply.data_str("result"), Some(reply_text));
        assert_eq!(reply.data_str("language"), Some("PYTHON"));
        let sent = provider.requests();
        assert_eq!(
            sent[0].system_prompt.as_deref(),
            Some(Language::Python.prompt_template().as_str())
        );
    }

    #[test]
    fn one_generator_per_language() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::texts(["x"]));
        let all = LanguageGeneratorAgent::all(provider, &GenerationSettings::default());
        assert_eq!(all.len(), Language::ALL.len());
        assert_eq!(all[0].kind().wire_name(), "RUST_GENERATOR");
    }
}
