//! Tool invocations and their recorded results.
//!
//! A [`ToolInvocation`] is the `(name, args)` pair used for session-level
//! deduplication. Arguments are kept as a JSON object; `serde_json::Map` is
//! ordered by key, so the serialized form is canonical and two invocations
//! with the same arguments in a different order compare equal.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Tool name as requested by the model.
    pub name: String,
    /// Arguments object.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolInvocation {
    /// Creates an invocation from a name and an arguments object.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Builds an invocation from raw JSON argument text.
    ///
    /// Non-object or unparseable arguments are preserved under a `"raw"`
    /// key so that malformed calls still dedup against each other.
    #[must_use]
    pub fn from_raw(name: &str, arguments: &str) -> Self {
        let trimmed = arguments.trim();
        let args = if trimmed.is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    let mut map = Map::new();
                    map.insert("raw".to_string(), other);
                    map
                }
                Err(_) => {
                    let mut map = Map::new();
                    map.insert("raw".to_string(), Value::String(trimmed.to_string()));
                    map
                }
            }
        };
        Self::new(name, args)
    }

    /// Canonical key used for deduplication.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.name, Value::Object(self.args.clone()))
    }

    /// Human-readable `name(args)` label.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}({})", self.name, Value::Object(self.args.clone()))
    }
}

/// Output produced by a retrieval tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolOutput {
    /// Free text (full document, line range, abstract, condensed history).
    Text(String),
    /// `"<line>: <text>"` lines from a single document.
    Lines(Vec<String>),
    /// Per-document `"<line>: <text>"` lines.
    PerDocument(BTreeMap<String, Vec<String>>),
    /// Informational message that carries no evidence (e.g. no abstract).
    Missing(String),
    /// The call failed; the message is shown to the model.
    Error(String),
    /// Sentinel output of the `stop` tool.
    Stop,
}

impl ToolOutput {
    /// Renders the output as the text sent back to the provider.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) | Self::Missing(text) => text.clone(),
            Self::Lines(lines) => {
                if lines.is_empty() {
                    "No matches.".to_string()
                } else {
                    lines.join("\n")
                }
            }
            Self::PerDocument(map) => {
                if map.is_empty() {
                    return "No matches in any document.".to_string();
                }
                let mut out = String::new();
                for (document_id, lines) in map {
                    let _ = writeln!(out, "[{document_id}]");
                    for line in lines {
                        let _ = writeln!(out, "{line}");
                    }
                }
                out.trim_end().to_string()
            }
            Self::Error(message) => format!("ERROR: {message}"),
            Self::Stop => String::new(),
        }
    }

    /// Size of the rendered output in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.render().chars().count()
    }

    /// Returns `true` for error outputs.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// An executed tool call and its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The invocation that produced this result.
    #[serde(flatten)]
    pub call: ToolInvocation,
    /// What the tool returned.
    pub result: ToolOutput,
}

impl ToolCallResult {
    /// Renders `name(args)` followed by the output, as used in prompts.
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}\n{}", self.call.label(), self.result.render())
    }
}
