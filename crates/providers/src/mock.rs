//! Mock provider: deterministic canned completions.
//!
//! The editor ships with this provider so the whole agent pipeline works
//! without any API key. Every reply contains one `write_file` action block,
//! which exercises parsing, approval, and the filesystem end to end.

use async_trait::async_trait;
use agentbus_core::error::ProviderError;
use agentbus_core::provider::{
    ChunkReceiver, CompletionProvider, CompletionRequest, CompletionResponse, StreamChunk, Usage,
};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub struct MockProvider {
    /// Delay between streamed chunks.
    chunk_delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            chunk_delay: Duration::ZERO,
        }
    }

    /// Simulate a slow model when streaming.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// The canned reply for a prompt.
    pub fn reply_for(prompt: &str) -> String {
        let slug = slugify(prompt);
        let path = format!("src/generated/{slug}.ts");
        let content = format!(
            "// Generated for: {}\nexport function {}(): string {{\n  return \"{}\";\n}}\n",
            prompt.lines().next().unwrap_or_default(),
            camel_case(&slug),
            slug
        );
        let body = json!({ "path": path, "content": content });

        format!(
            "Here is a starting point for your request.\n\n\
            ```action:write_file\n{body}\n```\n\n\
            The new module lives in `{path}`; wire it into your app where needed."
        )
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        debug!(model = %request.model, "Mock completion");
        let content = Self::reply_for(&request.prompt);
        let prompt_tokens = estimate_tokens(&request.prompt);
        let completion_tokens = estimate_tokens(&content);
        Ok(CompletionResponse {
            content,
            model: request.model,
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver, ProviderError> {
        let text = Self::reply_for(&request.prompt);
        let delay = self.chunk_delay;
        let (tx, rx) = tokio::sync::mpsc::channel(16);

        tokio::spawn(async move {
            for piece in text.split_inclusive(' ') {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let chunk = StreamChunk {
                    content: Some(piece.to_string()),
                    done: false,
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }
}

/// Rough token estimate: 4 chars ≈ 1 token.
fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}

fn slugify(prompt: &str) -> String {
    let words: Vec<String> = prompt
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(4)
        .map(|w| w.to_ascii_lowercase())
        .collect();
    if words.is_empty() {
        "snippet".into()
    } else {
        words.join("-")
    }
}

fn camel_case(slug: &str) -> String {
    let mut out = String::new();
    for (i, word) in slug.split('-').enumerate() {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.push(first);
            } else {
                out.push(first.to_ascii_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_and_identifier() {
        assert_eq!(slugify("Build a login form!"), "build-a-login-form");
        assert_eq!(slugify("???"), "snippet");
        assert_eq!(camel_case("build-a-login-form"), "buildALoginForm");
        assert_eq!(camel_case("3d-view"), "_3dView");
    }

    #[test]
    fn reply_contains_parsable_action_body() {
        let reply = MockProvider::reply_for("make a \"quoted\" button");
        let start = reply.find("```action:write_file\n").unwrap() + "```action:write_file\n".len();
        let end = start + reply[start..].find("\n```").unwrap();
        let body: serde_json::Value = serde_json::from_str(&reply[start..end]).unwrap();
        assert_eq!(body["path"], "src/generated/make-a-quoted-button.ts");
        assert!(body["content"].as_str().unwrap().contains("makeAQuotedButton"));
    }

    #[tokio::test]
    async fn complete_is_deterministic() {
        let provider = MockProvider::new();
        let a = provider
            .complete(CompletionRequest::new("mock", "m", "hello world"))
            .await
            .unwrap();
        let b = provider
            .complete(CompletionRequest::new("mock", "m", "hello world"))
            .await
            .unwrap();
        assert_eq!(a.content, b.content);
        assert!(a.usage.is_some());
    }

    #[tokio::test]
    async fn stream_reassembles_to_complete_text() {
        let provider = MockProvider::new();
        let mut chunks = 0usize;
        let text = provider
            .stream_complete(CompletionRequest::new("mock", "m", "hello world"), &mut |_| {
                chunks += 1
            })
            .await
            .unwrap();
        assert_eq!(text, MockProvider::reply_for("hello world"));
        assert!(chunks > 1);
    }
}
