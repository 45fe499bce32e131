//! Scripted provider: replays a queue of canned replies.
//!
//! Used by tests and demos that need exact model output (including
//! failures) without a network.

use async_trait::async_trait;
use agentbus_core::error::ProviderError;
use agentbus_core::provider::{CompletionProvider, CompletionRequest, CompletionResponse};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Each call to `complete` pops the next scripted reply.
/// An exhausted script answers with `ProviderError::NotConfigured`.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A script of successful text replies.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())).collect())
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.clone();
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(Ok(content)) => Ok(CompletionResponse {
                content,
                model,
                usage: None,
            }),
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::NotConfigured(
                "scripted provider has no replies left".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_errors() {
        let provider = ScriptedProvider::new(vec![
            Ok("first".into()),
            Err(ProviderError::Timeout("slow".into())),
        ]);

        let first = provider
            .complete(CompletionRequest::new("scripted", "m", "a"))
            .await
            .unwrap();
        assert_eq!(first.content, "first");

        let second = provider
            .complete(CompletionRequest::new("scripted", "m", "b"))
            .await;
        assert!(matches!(second, Err(ProviderError::Timeout(_))));

        let third = provider
            .complete(CompletionRequest::new("scripted", "m", "c"))
            .await;
        assert!(matches!(third, Err(ProviderError::NotConfigured(_))));

        let prompts: Vec<_> = provider.requests().into_iter().map(|r| r.prompt).collect();
        assert_eq!(prompts, vec!["a", "b", "c"]);
    }
}
