//! Output formatting for CLI commands.
//!
//! Every command renders either human-readable text or pretty JSON.

use std::fmt::Write;

use serde::Serialize;

use crate::core::{Citation, ToolCallResult, format_citations};
use crate::corpus::CorpusIndex;

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognized is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON with a trailing newline.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let mut out = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
            format!("{{\"error\": \"serialization failed: {e}\"}}")
        });
        out.push('\n');
        out
    }
}

/// Formats the corpus index.
#[must_use]
pub fn format_index(index: &CorpusIndex, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if index.is_empty() {
                return "No documents found.\n".to_string();
            }
            let mut out = format!("{} document(s):\n", index.len());
            for (id, descriptor) in index {
                let _ = writeln!(
                    out,
                    "  {id}  {}  ({} lines, {} chars)",
                    descriptor.title, descriptor.lines, descriptor.length
                );
                if !descriptor.authors.is_empty() {
                    let _ = writeln!(out, "      authors: {}", descriptor.authors.join(", "));
                }
                if !descriptor.keywords.is_empty() {
                    let _ = writeln!(out, "      keywords: {}", descriptor.keywords.join(", "));
                }
            }
            out
        }
        OutputFormat::Json => format.to_json(index),
    }
}

/// Formats the result of a single tool run.
#[must_use]
pub fn format_tool_result(result: &ToolCallResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = result.result.render();
            out.push('\n');
            out
        }
        OutputFormat::Json => format.to_json(result),
    }
}

#[derive(Serialize)]
struct CitedAnswer<'a> {
    content: &'a str,
    citations: &'a [Citation],
}

/// Formats answer prose and its citations.
#[must_use]
pub fn format_cited_answer(content: &str, citations: &[Citation], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = content.trim_end().to_string();
            out.push('\n');
            if !citations.is_empty() {
                out.push('\n');
                out.push_str(&format_citations(citations));
            }
            out
        }
        OutputFormat::Json => format.to_json(&CitedAnswer { content, citations }),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::corpus::{Document, DocumentStore, MemoryStore};

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_format_index_text_and_json() {
        let store: MemoryStore = [Document::new("a", "Alpha", "one\ntwo").with_authors(["Ada"])]
            .into_iter()
            .collect();
        let index = store.index().unwrap_or_else(|e| panic!("index: {e}"));

        let text = format_index(&index, OutputFormat::Text);
        assert!(text.contains("1 document(s)"));
        assert!(text.contains("a  Alpha  (2 lines"));
        assert!(text.contains("authors: Ada"));

        let json: serde_json::Value = serde_json::from_str(&format_index(&index, OutputFormat::Json))
            .unwrap_or_else(|e| panic!("json: {e}"));
        assert_eq!(json["a"]["title"], "Alpha");
    }

    #[test]
    fn test_format_cited_answer_text() {
        let citations = vec![Citation::new(1, "quote", Some("a".to_string()))];
        let out = format_cited_answer("Answer @cite[1|a].\n", &citations, OutputFormat::Text);
        assert!(out.starts_with("Answer @cite[1|a].\n\n---EVIDENCE---"));
        assert!(out.contains("\"quote\""));
    }
}
