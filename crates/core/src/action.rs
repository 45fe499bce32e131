//! Structured side effects requested by model output.
//!
//! An action travels inside LLM text as a fenced block
//! (```` ```action:write_file ```` + JSON body). Parsing and execution live in
//! `agentbus-actions`; this module only defines the shape.

use serde::Deserialize;
use serde_json::{Value, json};

/// One requested operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    WriteFile { path: String, content: String },
    ReadFile { path: String },
    ListDir { path: String },
    DeleteFile { path: String },
    ExecuteCommand { command: String },
    /// A well-formed block whose verb is not one of the above.
    Unknown { verb: String, body: Value },
}

#[derive(Deserialize)]
struct PathContent {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct PathOnly {
    path: String,
}

#[derive(Deserialize)]
struct CommandOnly {
    command: String,
}

impl Action {
    /// Build an action from a fence verb and its JSON body.
    ///
    /// Fails when the body does not have the fields the verb needs.
    pub fn from_parts(verb: &str, body: Value) -> Result<Self, serde_json::Error> {
        let action = match verb {
            "write_file" => {
                let b: PathContent = serde_json::from_value(body)?;
                Action::WriteFile {
                    path: b.path,
                    content: b.content,
                }
            }
            "read_file" => Action::ReadFile {
                path: serde_json::from_value::<PathOnly>(body)?.path,
            },
            "list_dir" => Action::ListDir {
                path: serde_json::from_value::<PathOnly>(body)?.path,
            },
            "delete_file" => Action::DeleteFile {
                path: serde_json::from_value::<PathOnly>(body)?.path,
            },
            "execute_command" => Action::ExecuteCommand {
                command: serde_json::from_value::<CommandOnly>(body)?.command,
            },
            other => Action::Unknown {
                verb: other.to_string(),
                body,
            },
        };
        Ok(action)
    }

    pub fn verb(&self) -> &str {
        match self {
            Action::WriteFile { .. } => "write_file",
            Action::ReadFile { .. } => "read_file",
            Action::ListDir { .. } => "list_dir",
            Action::DeleteFile { .. } => "delete_file",
            Action::ExecuteCommand { .. } => "execute_command",
            Action::Unknown { verb, .. } => verb,
        }
    }

    /// The JSON body as it appears inside the fence.
    pub fn body(&self) -> Value {
        match self {
            Action::WriteFile { path, content } => json!({ "path": path, "content": content }),
            Action::ReadFile { path } | Action::ListDir { path } | Action::DeleteFile { path } => {
                json!({ "path": path })
            }
            Action::ExecuteCommand { command } => json!({ "command": command }),
            Action::Unknown { body, .. } => body.clone(),
        }
    }

    /// Whether running this action changes the outside world.
    pub fn is_side_effecting(&self) -> bool {
        matches!(
            self,
            Action::WriteFile { .. } | Action::DeleteFile { .. } | Action::ExecuteCommand { .. }
        )
    }

    /// Short description for logs and approval prompts.
    pub fn describe(&self) -> String {
        match self {
            Action::WriteFile { path, content } => {
                format!("Write {} bytes to {path}", content.len())
            }
            Action::ReadFile { path } => format!("Read {path}"),
            Action::ListDir { path } => format!("List {path}"),
            Action::DeleteFile { path } => format!("Delete {path}"),
            Action::ExecuteCommand { command } => format!("Run `{command}`"),
            Action::Unknown { verb, .. } => format!("Unknown action {verb}"),
        }
    }
}
