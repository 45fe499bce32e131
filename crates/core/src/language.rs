//! Languages served by the language generator agents.
//!
//! Every generator is the same agent with a different prompt template,
//! so the language is just data.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
    Java,
    Kotlin,
    Swift,
    CSharp,
    Cpp,
    C,
    Ruby,
    Php,
    Dart,
    Scala,
    Haskell,
    Elixir,
    Lua,
    Sql,
    Shell,
}

impl Language {
    pub const ALL: [Language; 20] = [
        Language::Rust,
        Language::Python,
        Language::TypeScript,
        Language::JavaScript,
        Language::Go,
        Language::Java,
        Language::Kotlin,
        Language::Swift,
        Language::CSharp,
        Language::Cpp,
        Language::C,
        Language::Ruby,
        Language::Php,
        Language::Dart,
        Language::Scala,
        Language::Haskell,
        Language::Elixir,
        Language::Lua,
        Language::Sql,
        Language::Shell,
    ];

    /// Upper-case token used in agent wire names (`RUST` in `RUST_GENERATOR`).
    pub fn code(&self) -> &'static str {
        match self {
            Language::Rust => "RUST",
            Language::Python => "PYTHON",
            Language::TypeScript => "TYPESCRIPT",
            Language::JavaScript => "JAVASCRIPT",
            Language::Go => "GO",
            Language::Java => "JAVA",
            Language::Kotlin => "KOTLIN",
            Language::Swift => "SWIFT",
            Language::CSharp => "CSHARP",
            Language::Cpp => "CPP",
            Language::C => "C",
            Language::Ruby => "RUBY",
            Language::Php => "PHP",
            Language::Dart => "DART",
            Language::Scala => "SCALA",
            Language::Haskell => "HASKELL",
            Language::Elixir => "ELIXIR",
            Language::Lua => "LUA",
            Language::Sql => "SQL",
            Language::Shell => "SHELL",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Rust => "Rust",
            Language::Python => "Python",
            Language::TypeScript => "TypeScript",
            Language::JavaScript => "JavaScript",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::Kotlin => "Kotlin",
            Language::Swift => "Swift",
            Language::CSharp => "C#",
            Language::Cpp => "C++",
            Language::C => "C",
            Language::Ruby => "Ruby",
            Language::Php => "PHP",
            Language::Dart => "Dart",
            Language::Scala => "Scala",
            Language::Haskell => "Haskell",
            Language::Elixir => "Elixir",
            Language::Lua => "Lua",
            Language::Sql => "SQL",
            Language::Shell => "Shell",
        }
    }

    /// Conventional source file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Language::Rust => "rs",
            Language::Python => "py",
            Language::TypeScript => "ts",
            Language::JavaScript => "js",
            Language::Go => "go",
            Language::Java => "java",
            Language::Kotlin => "kt",
            Language::Swift => "swift",
            Language::CSharp => "cs",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Ruby => "rb",
            Language::Php => "php",
            Language::Dart => "dart",
            Language::Scala => "scala",
            Language::Haskell => "hs",
            Language::Elixir => "ex",
            Language::Lua => "lua",
            Language::Sql => "sql",
            Language::Shell => "sh",
        }
    }

    /// Idioms the generator is told to follow, appended to the shared template.
    fn idioms(&self) -> &'static str {
        match self {
            Language::Rust => "Prefer Result-based error handling, avoid unwrap in library code, and keep ownership explicit.",
            Language::Python => "Follow PEP 8, use type hints, and prefer the standard library.",
            Language::TypeScript => "Use strict types, avoid `any`, and prefer interfaces for object shapes.",
            Language::JavaScript => "Use modern ES modules, const/let, and async/await.",
            Language::Go => "Return errors explicitly, keep packages small, and run gofmt style.",
            Language::Java => "Use records where suitable, Optional over null, and clear package structure.",
            Language::Kotlin => "Prefer data classes, null-safety, and coroutines for async work.",
            Language::Swift => "Use value types, optionals, and Swift concurrency.",
            Language::CSharp => "Follow .NET naming conventions, use async/await and nullable reference types.",
            Language::Cpp => "Use RAII, smart pointers, and the C++17 standard library.",
            Language::C => "Check every return value and document ownership of buffers.",
            Language::Ruby => "Follow the community style guide and keep methods short.",
            Language::Php => "Target PHP 8 with strict_types and PSR-12 formatting.",
            Language::Dart => "Use sound null safety and Flutter conventions where relevant.",
            Language::Scala => "Prefer immutable data and expressive pattern matching.",
            Language::Haskell => "Keep functions pure and push effects to the edges.",
            Language::Elixir => "Use pattern matching, pipelines, and OTP conventions.",
            Language::Lua => "Keep globals out, use local functions and tables as modules.",
            Language::Sql => "Write ANSI SQL with explicit column lists and parameter placeholders.",
            Language::Shell => "Target POSIX sh, quote variables, and `set -eu`.",
        }
    }

    /// The system prompt for this language's generator.
    pub fn prompt_template(&self) -> String {
        format!(
            "You are an expert {name} developer. Write complete, idiomatic {name} code \
            for the user's request. {idioms} Return the code in a single fenced \
            ```{ext} block followed by a short explanation.",
            name = self.display_name(),
            idioms = self.idioms(),
            ext = self.extension(),
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
