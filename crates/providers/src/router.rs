//! Provider router: selects the correct completion provider per request.
//!
//! The router is itself a `CompletionProvider`: agents hold one router and
//! every request names the provider it wants in `request.provider`.

use async_trait::async_trait;
use agentbus_core::error::ProviderError;
use agentbus_core::provider::{
    ChunkReceiver, CompletionProvider, CompletionRequest, CompletionResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::mock::MockProvider;

/// Routes completion requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    credentials: HashMap<String, String>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            credentials: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn CompletionProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Store the credential for a provider id.
    pub fn set_credential(&mut self, name: impl Into<String>, credential: impl Into<String>) {
        self.credentials.insert(name.into(), credential.into());
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Resolve the provider for a request, checking its credential.
    ///
    /// An empty provider id means the default provider.
    pub fn resolve(&self, provider_id: &str) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
        let id = if provider_id.is_empty() {
            self.default_provider.as_str()
        } else {
            provider_id
        };

        let provider = self.get(id).ok_or_else(|| {
            ProviderError::NotConfigured(format!("no provider registered for '{id}'"))
        })?;

        let has_credential = self.credentials.get(id).is_some_and(|c| !c.is_empty());
        if provider.requires_credential() && !has_credential {
            return Err(ProviderError::NotConfigured(format!(
                "no API key configured for '{id}'"
            )));
        }

        Ok(provider)
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl CompletionProvider for ProviderRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn requires_credential(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let provider = self.resolve(&request.provider)?;
        debug!(provider = %provider.name(), model = %request.model, "Routing completion");
        provider.complete(request).await
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkReceiver, ProviderError> {
        let provider = self.resolve(&request.provider)?;
        provider.stream(request).await
    }
}

/// Build the router from configuration.
///
/// The mock provider is always available. Credentials are recorded for
/// every configured provider id, falling back to the global key.
pub fn build_from_config(config: &agentbus_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);
    router.register("mock", Arc::new(MockProvider::new()));

    let mut ids: Vec<&String> = config.providers.keys().collect();
    ids.push(&config.default_provider);
    for id in ids {
        if let Some(key) = config.credential_for(id) {
            router.set_credential(id.clone(), key);
        }
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedProvider;

    struct KeyedProvider;

    #[async_trait]
    impl CompletionProvider for KeyedProvider {
        fn name(&self) -> &str {
            "keyed"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: "ok".into(),
                model: request.model,
                usage: None,
            })
        }
    }

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("mock");
        router.register("mock", Arc::new(MockProvider::new()));
        assert!(router.get("mock").is_some());
        assert!(router.get("nonexistent").is_none());
        assert_eq!(router.list(), vec!["mock"]);
    }

    #[tokio::test]
    async fn empty_provider_id_uses_default() {
        let mut router = ProviderRouter::new("scripted");
        router.register("scripted", Arc::new(ScriptedProvider::texts(["hi"])));
        let response = router
            .complete(CompletionRequest::new("", "m", "x"))
            .await
            .unwrap();
        assert_eq!(response.content, "hi");
    }

    #[tokio::test]
    async fn missing_credential_is_rejected() {
        let mut router = ProviderRouter::new("keyed");
        router.register("keyed", Arc::new(KeyedProvider));

        let err = router
            .complete(CompletionRequest::new("keyed", "m", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));

        router.set_credential("keyed", "sk-test");
        let ok = router
            .complete(CompletionRequest::new("keyed", "m", "x"))
            .await
            .unwrap();
        assert_eq!(ok.content, "ok");
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let router = ProviderRouter::new("mock");
        let err = router
            .complete(CompletionRequest::new("nope", "m", "x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn build_from_default_config_serves_mock() {
        let config = agentbus_config::AppConfig::default();
        let router = build_from_config(&config);
        let response = router
            .complete(CompletionRequest::new("mock", "m", "hello"))
            .await
            .unwrap();
        assert!(response.content.contains("```action:write_file"));
    }
}
