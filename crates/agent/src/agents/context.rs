//! Context gatherer agent: a directory listing plus the first few files.

use agentbus_core::error::Result;
use agentbus_core::fs::{EntryKind, FileSystem};
use agentbus_core::message::{ActionName, AgentKind};
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::bus::Agent;
use crate::handler::{HandlerRegistry, Invocation};

/// Files read per request unless `maxFiles` says otherwise.
pub const DEFAULT_MAX_FILES: usize = 5;

/// Bytes kept per file.
pub const MAX_FILE_BYTES: usize = 16 * 1024;

pub struct ContextGathererAgent {
    fs: Arc<dyn FileSystem>,
}

impl ContextGathererAgent {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    async fn gather_context(&self, invocation: Invocation) -> Result<()> {
        let dir = invocation.optional_str("path").unwrap_or(".");
        let max_files = invocation
            .data
            .get("maxFiles")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_MAX_FILES, |n| usize::try_from(n).unwrap_or(usize::MAX));

        invocation.status_update(format!("Gathering context from {dir}"));
        let entries = self.fs.list_directory(dir).await?;

        let mut digest = format!("Directory: {dir}\n");
        for entry in &entries {
            match entry.kind {
                EntryKind::Directory => {
                    let _ = writeln!(digest, "  {}/", entry.name);
                }
                EntryKind::File => {
                    let _ = writeln!(digest, "  {}", entry.name);
                }
            }
        }

        let mut files = Vec::new();
        for entry in entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .take(max_files)
        {
            let path = join(dir, &entry.name);
            match self.fs.read_file(&path).await {
                Ok(content) => {
                    let (kept, truncated) = truncate(&content, MAX_FILE_BYTES);
                    let _ = write!(digest, "\n--- {path} ---\n{kept}\n");
                    if truncated {
                        let _ = writeln!(digest, "[truncated at {MAX_FILE_BYTES} bytes]");
                    }
                    files.push(json!({
                        "path": path,
                        "bytes": content.len(),
                        "truncated": truncated,
                    }));
                }
                Err(e) => {
                    warn!(path = %path, "Skipping unreadable file: {e}");
                    let _ = write!(digest, "\n--- {path} ---\n[unreadable: {e}]\n");
                }
            }
        }
        debug!(dir = %dir, files = files.len(), "Context gathered");

        invocation.complete(json!({
            "result": digest,
            "files": files,
        }));
        Ok(())
    }
}

impl Agent for ContextGathererAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::ContextGatherer
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::GatherContext, move |invocation| {
            let agent = self.clone();
            async move { agent.gather_context(invocation).await }
        });
    }
}

fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> (&str, bool) {
    if text.len() <= max {
        return (text, false);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ask;
    use crate::bus::Orchestrator;
    use agentbus_core::message::MessageKind;
    use agentbus_tools::InMemoryFs;

    fn bus_with(fs: InMemoryFs) -> Orchestrator {
        let bus = Orchestrator::default();
        bus.register_agent(Arc::new(ContextGathererAgent::new(Arc::new(fs))));
        bus
    }

    #[tokio::test]
    async fn lists_directory_and_reads_files() {
        let bus = bus_with(InMemoryFs::with_files([
            ("src/main.ts", "import './app';"),
            ("src/app.ts", "export {}"),
            ("src/lib/util.ts", "export const x = 1;"),
        ]));

        let reply = ask(
            &bus,
            AgentKind::ContextGatherer,
            ActionName::GatherContext,
            json!({ "path": "src" }),
        )
        .await;

        let digest = reply.data_str("result").unwrap();
        assert!(digest.starts_with("Directory: src\n  lib/\n  app.ts\n  main.ts\n"));
        assert!(digest.contains("--- src/main.ts ---\nimport './app';"));
        assert_eq!(reply.payload.data["files"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn respects_max_files_and_size_limit() {
        let big = "é".repeat(MAX_FILE_BYTES);
        let bus = bus_with(InMemoryFs::with_files([
            ("a.txt", big.as_str()),
            ("b.txt", "b"),
        ]));

        let reply = ask(
            &bus,
            AgentKind::ContextGatherer,
            ActionName::GatherContext,
            json!({ "maxFiles": 1 }),
        )
        .await;

        let files = reply.payload.data["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["path"], "a.txt");
        assert_eq!(files[0]["truncated"], true);
        assert!(!reply.data_str("result").unwrap().contains("--- b.txt"));
    }

    #[tokio::test]
    async fn closed_workspace_is_an_error() {
        let bus = bus_with(InMemoryFs::closed());
        let reply = ask(&bus, AgentKind::ContextGatherer, ActionName::GatherContext, json!({})).await;
        assert_eq!(reply.kind, MessageKind::Error);
        assert!(reply.data_str("error").unwrap().contains("No root directory is open"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let (kept, cut) = truncate("aé", 2);
        assert_eq!(kept, "a");
        assert!(cut);
        assert_eq!(truncate("abc", 3), ("abc", false));
    }
}
