//! Validator agent: cheap static checks on generated code.
//!
//! No parser per language, just a lexical pass that knows where strings and
//! comments start for the language at hand. Good enough to catch truncated
//! model output and botched merges.

use agentbus_core::Language;
use agentbus_core::error::Result;
use agentbus_core::message::{ActionName, AgentKind};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::bus::Agent;
use crate::handler::{HandlerRegistry, Invocation};

#[derive(Default)]
pub struct ValidatorAgent;

impl ValidatorAgent {
    pub fn new() -> Self {
        Self
    }

    async fn validate_code(&self, invocation: Invocation) -> Result<()> {
        let code = invocation.require_str("code")?;
        let language = invocation.optional_str("language").and_then(parse_language);

        let issues = validate(code, language);
        debug!(issues = issues.len(), ?language, "Validated code");

        let result = if issues.is_empty() {
            "No issues found".to_string()
        } else {
            let mut text = format!("Found {} issue(s):", issues.len());
            for issue in &issues {
                text.push_str("\n- ");
                text.push_str(issue);
            }
            text
        };

        invocation.complete(json!({
            "valid": issues.is_empty(),
            "issues": issues,
            "result": result,
        }));
        Ok(())
    }
}

impl Agent for ValidatorAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Validator
    }

    fn register(self: Arc<Self>, handlers: &mut HandlerRegistry) {
        handlers.register(ActionName::ValidateCode, move |invocation| {
            let agent = self.clone();
            async move { agent.validate_code(invocation).await }
        });
    }
}

/// Accepts `"rust"`, `"RUST"`, `"C#"` or an extension like `"rs"`.
fn parse_language(name: &str) -> Option<Language> {
    Language::ALL.into_iter().find(|l| {
        l.code().eq_ignore_ascii_case(name)
            || l.display_name().eq_ignore_ascii_case(name)
            || l.extension().eq_ignore_ascii_case(name)
    })
}

/// Every problem found in `code`, in source order per check.
pub fn validate(code: &str, language: Option<Language>) -> Vec<String> {
    if code.trim().is_empty() {
        return vec!["Code is empty".to_string()];
    }
    let mut issues = conflict_markers(code);
    issues.extend(unbalanced_brackets(code, &Syntax::for_language(language)));
    issues
}

fn conflict_markers(code: &str) -> Vec<String> {
    code.lines()
        .enumerate()
        .filter(|(_, line)| {
            line.starts_with("<<<<<<<") || line.starts_with(">>>>>>>") || line.trim_end() == "======="
        })
        .map(|(i, _)| format!("Line {}: leftover merge conflict marker", i + 1))
        .collect()
}

struct Syntax {
    line_comments: &'static [&'static str],
    block_comment: Option<(&'static str, &'static str)>,
    quotes: &'static [char],
    /// Quotes whose literals may span lines.
    multiline_quotes: &'static [char],
    /// `'x'` is a char literal even though `'` is not a quote (Rust lifetimes).
    char_literals: bool,
    brackets: &'static str,
}

impl Syntax {
    fn for_language(language: Option<Language>) -> Self {
        const C_STYLE: Syntax = Syntax {
            line_comments: &["//"],
            block_comment: Some(("/*", "*/")),
            quotes: &['"', '\''],
            multiline_quotes: &[],
            char_literals: false,
            brackets: "()[]{}",
        };
        match language {
            Some(Language::Rust) => Syntax {
                quotes: &['"'],
                multiline_quotes: &['"'],
                char_literals: true,
                ..C_STYLE
            },
            Some(Language::JavaScript | Language::TypeScript | Language::Go) | None => Syntax {
                quotes: &['"', '\'', '`'],
                multiline_quotes: &['`'],
                ..C_STYLE
            },
            Some(Language::Python | Language::Ruby | Language::Elixir) => Syntax {
                line_comments: &["#"],
                block_comment: None,
                ..C_STYLE
            },
            // `case` arms close parens they never opened.
            Some(Language::Shell) => Syntax {
                line_comments: &["#"],
                block_comment: None,
                quotes: &['"', '\'', '`'],
                brackets: "[]{}",
                ..C_STYLE
            },
            Some(Language::Php) => Syntax {
                line_comments: &["//", "#"],
                ..C_STYLE
            },
            Some(Language::Sql) => Syntax {
                line_comments: &["--"],
                ..C_STYLE
            },
            Some(Language::Lua) => Syntax {
                line_comments: &["--"],
                block_comment: None,
                ..C_STYLE
            },
            Some(Language::Haskell) => Syntax {
                line_comments: &["--"],
                block_comment: Some(("{-", "-}")),
                quotes: &['"'],
                char_literals: true,
                ..C_STYLE
            },
            Some(_) => C_STYLE,
        }
    }

    fn opener_for(&self, close: char) -> Option<char> {
        self.brackets
            .as_bytes()
            .chunks(2)
            .find(|pair| char::from(pair[1]) == close)
            .map(|pair| char::from(pair[0]))
    }

    fn is_opener(&self, c: char) -> bool {
        self.brackets.chars().step_by(2).any(|o| o == c)
    }
}

enum Scan {
    Code,
    LineComment,
    BlockComment(&'static str),
    Str(char),
}

fn unbalanced_brackets(code: &str, syntax: &Syntax) -> Vec<String> {
    let mut issues = Vec::new();
    let mut open: Vec<(char, usize)> = Vec::new();
    let mut state = Scan::Code;
    let mut line = 1;
    let mut i = 0;

    while let Some(c) = code[i..].chars().next() {
        let rest = &code[i..];
        let mut step = c.len_utf8();

        match state {
            Scan::Code => {
                if syntax.line_comments.iter().any(|p| rest.starts_with(p)) {
                    state = Scan::LineComment;
                } else if let Some((start, end)) = syntax.block_comment
                    && rest.starts_with(start)
                {
                    state = Scan::BlockComment(end);
                    step = start.len();
                } else if syntax.quotes.contains(&c) {
                    state = Scan::Str(c);
                } else if c == '\'' && syntax.char_literals {
                    step = char_literal_len(rest).unwrap_or(step);
                } else if syntax.is_opener(c) {
                    open.push((c, line));
                } else if let Some(expected) = syntax.opener_for(c) {
                    match open.pop() {
                        Some((o, _)) if o == expected => {}
                        Some((o, at)) => issues.push(format!(
                            "Line {line}: '{c}' does not match '{o}' opened on line {at}"
                        )),
                        None => issues.push(format!("Line {line}: unexpected '{c}'")),
                    }
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment(end) => {
                if rest.starts_with(end) {
                    state = Scan::Code;
                    step = end.len();
                }
            }
            Scan::Str(quote) => {
                if c == '\\' {
                    step += rest[1..].chars().next().map_or(0, char::len_utf8);
                } else if c == quote || (c == '\n' && !syntax.multiline_quotes.contains(&quote)) {
                    state = Scan::Code;
                }
            }
        }

        line += code[i..i + step].matches('\n').count();
        i += step;
    }

    issues.extend(
        open.into_iter()
            .map(|(o, at)| format!("Line {at}: '{o}' is never closed")),
    );
    issues
}

/// Byte length of a char literal at the start of `rest`, if there is one.
fn char_literal_len(rest: &str) -> Option<usize> {
    let mut chars = rest.char_indices().skip(1);
    let (_, first) = chars.next()?;
    if first == '\\' {
        // '\n', '\'', '\u{1F600}'
        let tail = rest.get(3..)?;
        let end = tail.find('\'')?;
        (end <= 8).then_some(end + 4)
    } else {
        let (at, close) = chars.next()?;
        (close == '\'').then_some(at + 1)
    }
}
