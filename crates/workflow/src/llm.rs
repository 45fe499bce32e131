//! Step executor backed by a completion provider.

use agentbus_config::AppConfig;
use agentbus_core::provider::{CompletionProvider, CompletionRequest};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::{Result, StepExecutor, WorkflowContext, WorkflowStep};

const SYSTEM_PROMPT: &str = "You are a senior engineer carrying out one step of a larger \
software project. Build on the results of the earlier steps and answer with the deliverable \
for the current step only.";

/// Prompts the provider once per step, streaming the answer into
/// [`crate::WorkflowEvent::StepOutput`] events.
pub struct LlmStepExecutor {
    provider: Arc<dyn CompletionProvider>,
    provider_id: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl LlmStepExecutor {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider_id: provider.name().to_string(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Use the configured default provider id, model and sampling settings.
    pub fn from_config(provider: Arc<dyn CompletionProvider>, config: &AppConfig) -> Self {
        Self {
            provider,
            provider_id: config.default_provider.clone(),
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        }
    }

    fn request(&self, step: &WorkflowStep, context: &WorkflowContext) -> CompletionRequest {
        let prompt = format!(
            "Project: {}\nStep {} of {}: {}\n\n{}",
            context.workflow_name, context.position, context.total, step.name, step.description
        );

        let mut request = CompletionRequest::new(&self.provider_id, &self.model, prompt)
            .with_system_prompt(SYSTEM_PROMPT);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        if !context.previous.is_empty() {
            let mut earlier = String::new();
            for result in &context.previous {
                let _ = write!(earlier, "## {}\n{}\n\n", result.name, result.output);
            }
            request = request.with_context(earlier.trim_end());
        }
        request
    }
}

#[async_trait]
impl StepExecutor for LlmStepExecutor {
    async fn execute(&self, step: &WorkflowStep, context: &WorkflowContext) -> Result<String> {
        let request = self.request(step, context);
        let mut forward = |chunk: &str| context.emit_output(chunk);
        let text = self.provider.stream_complete(request, &mut forward).await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StepStatus, Workflow, WorkflowEvent, WorkflowRunner};
    use agentbus_core::error::ProviderError;
    use agentbus_providers::{MockProvider, ScriptedProvider};
    use tokio::sync::mpsc;

    fn two_steps() -> Workflow {
        Workflow::new(
            "Todo",
            vec![
                WorkflowStep::new("plan", "Plan", "List the screens."),
                WorkflowStep::new("build", "Build", "Write the code."),
            ],
        )
    }

    #[tokio::test]
    async fn feeds_earlier_outputs_as_context() {
        let provider = Arc::new(ScriptedProvider::texts(["three screens", "the code"]));
        let executor = LlmStepExecutor::from_config(provider.clone(), &AppConfig::default());
        let mut wf = two_steps();

        let report = WorkflowRunner::new().run(&mut wf, &executor).await;
        assert!(report.success());

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].provider, "mock");
        assert!(requests[0].prompt.starts_with("Project: Todo\nStep 1 of 2: Plan"));
        assert!(requests[0].context.is_none());
        assert_eq!(requests[1].context.as_deref(), Some("## Plan\nthree screens"));
    }

    #[tokio::test]
    async fn streams_chunks_as_events() {
        let executor = LlmStepExecutor::new(Arc::new(MockProvider::new()), "mock-coder-1");
        let mut wf = two_steps();
        let (tx, mut rx) = mpsc::channel(1024);

        WorkflowRunner::new().with_events(tx).run(&mut wf, &executor).await;

        let mut streamed = String::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::StepOutput { step_id, chunk } = event
                && step_id == "plan"
            {
                streamed.push_str(&chunk);
            }
        }
        assert_eq!(Some(streamed.as_str()), wf.steps[0].output.as_deref());
    }

    #[tokio::test]
    async fn provider_error_fails_the_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ModelNotFound(
            "gpt-x".into(),
        ))]));
        let executor = LlmStepExecutor::new(provider, "gpt-x");
        let mut wf = two_steps();

        let report = WorkflowRunner::new().run(&mut wf, &executor).await;
        assert!(report.failure.unwrap().1.contains("Model not found"));
        assert_eq!(wf.steps[1].status, StepStatus::Skipped);
    }
}
