//! Action block tokenizer.
//!
//! Grammar, as it appears inside free-form model output:
//!
//! ````text
//! ```action:<verb>          verb = [A-Za-z0-9_]+
//! <one JSON object>
//! ```
//! ````
//!
//! The body is consumed by `serde_json`'s streaming deserializer, so a
//! triple backtick inside a JSON string never ends the block early.
//! A malformed block is logged and skipped; scanning resumes at the next
//! fence and the remaining blocks are still returned.

use agentbus_core::Action;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

const FENCE: &str = "```";
const OPENER: &str = "```action:";

/// A block that looked like an action but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBlock {
    /// Byte offset of the opening fence.
    pub offset: usize,
    pub verb: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub actions: Vec<Action>,
    pub skipped: Vec<SkippedBlock>,
}

/// Extract every well-formed action block, in order of appearance.
pub fn parse_actions(text: &str) -> Vec<Action> {
    parse_report(text).actions
}

/// Like [`parse_actions`], but also reports what was skipped and why.
pub fn parse_report(text: &str) -> ParseReport {
    let mut report = ParseReport::default();
    let mut pos = 0;

    while let Some(found) = text[pos..].find(OPENER) {
        let start = pos + found;
        let verb_start = start + OPENER.len();
        let verb_len = text[verb_start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();

        if verb_len == 0 {
            pos = verb_start;
            continue;
        }

        let verb = &text[verb_start..verb_start + verb_len];
        let body_start = verb_start + verb_len;

        let (result, next) = match read_body(text, body_start) {
            Ok((body, end)) => (
                Action::from_parts(verb, body)
                    .map_err(|e| format!("invalid body for '{verb}': {e}")),
                end,
            ),
            Err(reason) => (Err(reason), resume_point(text, body_start)),
        };

        match result {
            Ok(action) => report.actions.push(action),
            Err(reason) => {
                warn!(offset = start, verb = %verb, reason = %reason, "Skipping malformed action block");
                report.skipped.push(SkippedBlock {
                    offset: start,
                    verb: verb.to_string(),
                    reason,
                });
            }
        }
        pos = next;
    }

    report
}

/// Render an action in the fence grammar.
pub fn serialize_action(action: &Action) -> String {
    format!("{OPENER}{}\n{}\n{FENCE}", action.verb(), action.body())
}

/// Parse the JSON body starting at `from` and the closing fence after it.
///
/// Returns the body and the offset just past the closing fence.
fn read_body(text: &str, from: usize) -> Result<(Value, usize), String> {
    let mut stream = serde_json::Deserializer::from_str(&text[from..]).into_iter::<Value>();

    let body = match stream.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(format!("invalid JSON: {e}")),
        None => return Err("missing JSON body".into()),
    };
    if !body.is_object() {
        return Err("body is not a JSON object".into());
    }

    let after_body = from + stream.byte_offset();
    let rest = &text[after_body..];
    let trimmed = rest.trim_start();
    if !trimmed.starts_with(FENCE) || trimmed.starts_with(OPENER) {
        return Err("missing closing fence".into());
    }

    let close = after_body + (rest.len() - trimmed.len());
    Ok((body, close + FENCE.len()))
}

/// Where to continue after a malformed block: past the next closing fence,
/// or at it when that fence opens another action block.
fn resume_point(text: &str, from: usize) -> usize {
    match text[from..].find(FENCE) {
        Some(i) if text[from + i..].starts_with(OPENER) => from + i,
        Some(i) => from + i + FENCE.len(),
        None => text.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_second_block_is_skipped() {
        let text = "```action:write_file\n{\"path\":\"a.ts\",\"content\":\"x\"}\n```\n```action:bogus\nnot json```";
        let report = parse_report(text);

        assert_eq!(
            report.actions,
            vec![Action::WriteFile {
                path: "a.ts".into(),
                content: "x".into()
            }]
        );
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].verb, "bogus");
        assert!(report.skipped[0].reason.contains("invalid JSON"));
    }

    #[test]
    fn round_trip_well_formed_shapes() {
        let actions = vec![
            Action::WriteFile {
                path: "src/app.ts".into(),
                content: "const s = \"```\";\nexport default s;\n".into(),
            },
            Action::ReadFile {
                path: "README.md".into(),
            },
            Action::ListDir { path: "src".into() },
        ];
        for action in actions {
            let text = serialize_action(&action);
            assert_eq!(parse_actions(&text), vec![action]);
        }
    }

    #[test]
    fn serialized_form_uses_fence_grammar() {
        let text = serialize_action(&Action::ReadFile { path: "a".into() });
        assert_eq!(text, "```action:read_file\n{\"path\":\"a\"}\n```");
    }

    #[test]
    fn backticks_inside_json_do_not_close_block() {
        let text = "Here you go:\n```action:write_file\n{\"path\": \"doc.md\", \"content\": \"```rust\\nfn main() {}\\n```\"}\n```\nDone.";
        let actions = parse_actions(text);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::WriteFile { content, .. } => assert!(content.contains("```rust")),
            other => panic!("Expected WriteFile, got {other:?}"),
        }
    }

    #[test]
    fn blocks_are_returned_in_order_with_prose_between() {
        let text = "First read:\n```action:read_file\n{\"path\":\"a\"}\n```\nThen run:\n\n```action:execute_command\n{\"command\":\"npm test\"}\n```\n";
        let verbs: Vec<String> = parse_actions(text)
            .iter()
            .map(|a| a.verb().to_string())
            .collect();
        assert_eq!(verbs, vec!["read_file", "execute_command"]);
    }

    #[test]
    fn wrong_shape_is_skipped() {
        let text = "```action:write_file\n{\"path\":\"a.ts\"}\n```\n```action:read_file\n{\"path\":\"b\"}\n```";
        let report = parse_report(text);
        assert_eq!(report.actions, vec![Action::ReadFile { path: "b".into() }]);
        assert!(report.skipped[0].reason.contains("write_file"));
    }

    #[test]
    fn missing_closing_fence_does_not_swallow_next_block() {
        let text = "```action:read_file\n{\"path\":\"a\"}\n```action:read_file\n{\"path\":\"b\"}\n```";
        let report = parse_report(text);
        assert_eq!(report.actions, vec![Action::ReadFile { path: "b".into() }]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].offset, 0);
    }

    #[test]
    fn unclosed_trailing_block_is_skipped() {
        let report = parse_report("```action:read_file\n{\"path\":\"a\"}");
        assert!(report.actions.is_empty());
        assert_eq!(report.skipped[0].reason, "missing closing fence");
    }

    #[test]
    fn unknown_verb_with_valid_body_is_kept() {
        let actions = parse_actions("```action:deploy\n{\"env\":\"prod\"}\n```");
        assert_eq!(
            actions,
            vec![Action::Unknown {
                verb: "deploy".into(),
                body: json!({"env": "prod"})
            }]
        );
    }

    #[test]
    fn crlf_and_plain_fences_are_tolerated() {
        let text = "```ts\nlet x = 1;\n```\r\n```action:list_dir\r\n{\"path\":\".\"}\r\n```";
        assert_eq!(parse_actions(text), vec![Action::ListDir { path: ".".into() }]);
    }

    #[test]
    fn non_object_body_is_skipped() {
        let report = parse_report("```action:read_file\n[1, 2]\n```");
        assert!(report.actions.is_empty());
        assert_eq!(report.skipped[0].reason, "body is not a JSON object");
    }

    #[test]
    fn no_blocks_in_plain_text() {
        assert!(parse_actions("Just prose, no actions.").is_empty());
        assert!(parse_actions("").is_empty());
    }
}
