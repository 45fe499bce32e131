//! Message domain types.
//!
//! A [`Message`] is one hop on the bus:
//! Orchestrator sends a request → Agent handles it → Agent replies with a response or error.
//! Correlation works purely by echoing the request's [`Context`] back unchanged.

use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::language::Language;

/// Every actor that can appear in `from` / `to`.
///
/// Serialized as its wire name, e.g. `"GENERATIVE_AI"` or `"RUST_GENERATOR"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgentKind {
    Orchestrator,
    GenerativeAi,
    ContextGatherer,
    CodeExecutor,
    Validator,
    TerminalExecutor,
    LanguageGenerator(Language),
}

impl AgentKind {
    /// The non-generator agents, orchestrator excluded.
    pub const CORE: [AgentKind; 5] = [
        AgentKind::GenerativeAi,
        AgentKind::ContextGatherer,
        AgentKind::CodeExecutor,
        AgentKind::Validator,
        AgentKind::TerminalExecutor,
    ];

    pub fn wire_name(&self) -> String {
        match self {
            AgentKind::Orchestrator => "ORCHESTRATOR".into(),
            AgentKind::GenerativeAi => "GENERATIVE_AI".into(),
            AgentKind::ContextGatherer => "CONTEXT_GATHERER".into(),
            AgentKind::CodeExecutor => "CODE_EXECUTOR".into(),
            AgentKind::Validator => "VALIDATOR".into(),
            AgentKind::TerminalExecutor => "TERMINAL_EXECUTOR".into(),
            AgentKind::LanguageGenerator(lang) => format!("{}_GENERATOR", lang.code()),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.wire_name())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "ORCHESTRATOR" => AgentKind::Orchestrator,
            "GENERATIVE_AI" => AgentKind::GenerativeAi,
            "CONTEXT_GATHERER" => AgentKind::ContextGatherer,
            "CODE_EXECUTOR" => AgentKind::CodeExecutor,
            "VALIDATOR" => AgentKind::Validator,
            "TERMINAL_EXECUTOR" => AgentKind::TerminalExecutor,
            other => other
                .strip_suffix("_GENERATOR")
                .and_then(Language::from_code)
                .map(AgentKind::LanguageGenerator)
                .ok_or_else(|| format!("unknown agent kind: {other}"))?,
        };
        Ok(kind)
    }
}

impl TryFrom<String> for AgentKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentKind> for String {
    fn from(kind: AgentKind) -> Self {
        kind.wire_name()
    }
}

/// The four message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

/// Handler names. Anything outside this set fails to parse, so an agent can
/// only ever register handlers for actions the bus knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionName {
    GenerateCode,
    TaskCompleted,
    ExecuteActions,
    ValidateCode,
    ExecuteCommand,
    GatherContext,
    StatusUpdate,
    Error,
}

impl ActionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionName::GenerateCode => "generate_code",
            ActionName::TaskCompleted => "task_completed",
            ActionName::ExecuteActions => "execute_actions",
            ActionName::ValidateCode => "validate_code",
            ActionName::ExecuteCommand => "execute_command",
            ActionName::GatherContext => "gather_context",
            ActionName::StatusUpdate => "status_update",
            ActionName::Error => "error",
        }
    }
}

impl std::fmt::Display for ActionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown action: {s}"))
    }
}

/// Correlation token for one top-level request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl PlanId {
    /// A fresh 9-character lowercase alphanumeric id.
    pub fn generate() -> Self {
        Self(Alphanumeric.sample_string(&mut rand::rng(), 9).to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlanId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque correlation data, echoed back unchanged by every reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,

    /// Anything else the sender wants echoed.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Context {
    pub fn for_plan(plan_id: PlanId) -> Self {
        Self {
            plan_id: Some(plan_id),
            extra: serde_json::Map::new(),
        }
    }

    pub fn belongs_to(&self, plan_id: &PlanId) -> bool {
        self.plan_id.as_ref() == Some(plan_id)
    }
}

/// What the receiver should do, with what, and for whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub action: ActionName,

    #[serde(default)]
    pub data: Value,

    #[serde(default)]
    pub context: Context,
}

impl Payload {
    pub fn new(action: ActionName, data: Value) -> Self {
        Self {
            action,
            data,
            context: Context::default(),
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

/// A single hop on the bus. Built once and then shared as `Arc<Message>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    pub from: AgentKind,

    pub to: AgentKind,

    pub kind: MessageKind,

    pub payload: Payload,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(from: AgentKind, to: AgentKind, kind: MessageKind, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from,
            to,
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn action(&self) -> ActionName {
        self.payload.action
    }

    pub fn plan_id(&self) -> Option<&PlanId> {
        self.payload.context.plan_id.as_ref()
    }

    /// A string field of `payload.data`, if present.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.payload.data.get(key).and_then(Value::as_str)
    }
}

/// A message without sender, id, or timestamp. Agents build these and the
/// bus stamps the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub to: AgentKind,
    pub kind: MessageKind,
    pub payload: Payload,
}

impl MessageDraft {
    pub fn new(to: AgentKind, kind: MessageKind, payload: Payload) -> Self {
        Self { to, kind, payload }
    }

    pub fn request(to: AgentKind, action: ActionName, data: Value, context: Context) -> Self {
        Self::new(to, MessageKind::Request, Payload::new(action, data).with_context(context))
    }

    pub fn response(to: AgentKind, action: ActionName, data: Value, context: Context) -> Self {
        Self::new(to, MessageKind::Response, Payload::new(action, data).with_context(context))
    }

    pub fn notification(to: AgentKind, action: ActionName, data: Value, context: Context) -> Self {
        Self::new(
            to,
            MessageKind::Notification,
            Payload::new(action, data).with_context(context),
        )
    }

    pub fn error(to: AgentKind, data: Value, context: Context) -> Self {
        Self::new(
            to,
            MessageKind::Error,
            Payload::new(ActionName::Error, data).with_context(context),
        )
    }

    /// Fill in sender, id and timestamp.
    pub fn stamp(self, from: AgentKind) -> Message {
        Message::new(from, self.to, self.kind, self.payload)
    }
}
