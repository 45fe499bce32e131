//! Configuration loading, validation, and management for AgentBus.
//!
//! Loads configuration from `~/.agentbus/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.agentbus/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// System prompt for the generative agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Message bus settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Human-in-the-loop approval settings
    #[serde(default)]
    pub approval: ApprovalConfig,

    /// Workspace (opened root directory) settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Terminal executor settings
    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Activity log settings
    #[serde(default)]
    pub activity: ActivityConfig,
}

fn default_provider() -> String {
    "mock".into()
}
fn default_model() -> String {
    "mock-coder-1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("system_prompt", &self.system_prompt)
            .field("providers", &self.providers)
            .field("bus", &self.bus)
            .field("approval", &self.approval)
            .field("workspace", &self.workspace)
            .field("terminal", &self.terminal)
            .field("activity", &self.activity)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-agent mailbox capacity
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Deadline for `process_request`; 0 disables it
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Capacity of the broadcast tap for async observers
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_mailbox_capacity() -> usize {
    64
}
fn default_request_timeout() -> u64 {
    300
}
fn default_event_capacity() -> usize {
    256
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            request_timeout_secs: default_request_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl BusConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Ask a human before writing, deleting, or running anything
    #[serde(default = "default_true")]
    pub require_approval: bool,

    /// How long a pending approval may wait; 0 waits forever
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            require_approval: true,
            timeout_secs: 0,
        }
    }
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory opened at startup; none means the editor opens one later
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Path prefixes (relative to the root) that may never be touched
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
}

fn default_forbidden_paths() -> Vec<String> {
    vec![".git".into(), ".env".into(), "node_modules".into()]
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            forbidden_paths: default_forbidden_paths(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// If non-empty, only these base commands may run
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    #[serde(default = "default_terminal_timeout")]
    pub timeout_secs: u64,
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "echo", "pwd", "git", "npm", "npx", "node", "cargo", "python"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_terminal_timeout() -> u64 {
    60
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            timeout_secs: default_terminal_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Maximum log entries kept in memory
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_log_capacity() -> usize {
    1000
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentbus/config.toml),
    /// then apply environment overrides:
    /// - `AGENTBUS_API_KEY`
    /// - `AGENTBUS_PROVIDER`
    /// - `AGENTBUS_MODEL`
    /// - `AGENTBUS_REQUIRE_APPROVAL`
    /// - `AGENTBUS_WORKSPACE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("AGENTBUS_API_KEY");
        }

        if let Some(provider) = lookup("AGENTBUS_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("AGENTBUS_MODEL") {
            self.default_model = model;
        }

        if let Some(flag) = lookup("AGENTBUS_REQUIRE_APPROVAL") {
            self.approval.require_approval = parse_flag(&flag).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "AGENTBUS_REQUIRE_APPROVAL must be true/false/1/0, got '{flag}'"
                ))
            })?;
        }

        if let Some(root) = lookup("AGENTBUS_WORKSPACE") {
            self.workspace.root = Some(PathBuf::from(root));
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentbus")
    }

    /// Get the default workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.bus.mailbox_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "bus.mailbox_capacity must be at least 1".into(),
            ));
        }

        if self.bus.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "bus.event_capacity must be at least 1".into(),
            ));
        }

        if self.activity.log_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "activity.log_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// The credential for a provider: its own key, else the global one.
    pub fn credential_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            system_prompt: None,
            providers: HashMap::new(),
            bus: BusConfig::default(),
            approval: ApprovalConfig::default(),
            workspace: WorkspaceConfig::default(),
            terminal: TerminalConfig::default(),
            activity: ActivityConfig::default(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
