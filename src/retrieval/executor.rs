//! Executes retrieval calls against a [`DocumentStore`].
//!
//! Every call is a pure read. Failures come back as [`ToolError`] from
//! [`ToolExecutor::run`]; [`ToolExecutor::execute`] folds them into an
//! error-string [`ToolOutput`] so a bad call never aborts gathering.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::RetrievalCall;
use crate::core::{ToolCallResult, ToolInvocation, ToolOutput};
use crate::corpus::{Document, DocumentStore};
use crate::error::ToolError;

/// Maximum matching lines returned by `search_file`.
pub const MAX_FILE_MATCHES: usize = 50;
/// Maximum matching lines per document returned by `search_all_files`.
pub const MAX_MATCHES_PER_DOCUMENT: usize = 20;
/// Maximum regex pattern length for `search_file`.
const MAX_REGEX_LEN: usize = 500;
/// Maximum compiled regex size (bytes).
const MAX_REGEX_DFA_SIZE: usize = 1_000_000;

/// Runs retrieval tools over a borrowed document store.
#[derive(Clone, Copy)]
pub struct ToolExecutor<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> ToolExecutor<'a> {
    /// Creates an executor over the given store.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Parses and runs an invocation, recording failures as error output.
    #[must_use]
    pub fn execute(&self, invocation: &ToolInvocation) -> ToolCallResult {
        let result = match RetrievalCall::parse(invocation).and_then(|call| self.run(&call)) {
            Ok(output) => output,
            Err(e) => {
                debug!(tool = %invocation.name, error = %e, "tool call failed");
                ToolOutput::Error(e.to_string())
            }
        };
        ToolCallResult {
            call: invocation.clone(),
            result,
        }
    }

    /// Runs a typed call.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for unknown documents, bad patterns, empty
    /// ranges, or store failures.
    pub fn run(&self, call: &RetrievalCall) -> Result<ToolOutput, ToolError> {
        match call {
            RetrievalCall::ReadFile { document_id } => {
                let doc = self.document(document_id)?;
                Ok(ToolOutput::Text(doc.content.clone()))
            }
            RetrievalCall::SearchFile {
                document_id,
                pattern,
            } => self.search_file(document_id, pattern),
            RetrievalCall::ViewFile {
                document_id,
                start,
                end,
            } => self.view_file(document_id, *start, *end),
            RetrievalCall::ReadAbstract { document_id } => {
                let doc = self.document(document_id)?;
                Ok(match doc.abstract_text.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => ToolOutput::Text(text.to_string()),
                    _ => ToolOutput::Missing(format!(
                        "No abstract found for document '{document_id}'."
                    )),
                })
            }
            RetrievalCall::SearchAllFiles { query } => self.search_all_files(query),
            RetrievalCall::Stop => Ok(ToolOutput::Stop),
        }
    }

    fn document(&self, document_id: &str) -> Result<Arc<Document>, ToolError> {
        self.store
            .document(document_id)?
            .ok_or_else(|| ToolError::UnknownDocument {
                document_id: document_id.to_string(),
            })
    }

    fn search_file(&self, document_id: &str, pattern: &str) -> Result<ToolOutput, ToolError> {
        if pattern.len() > MAX_REGEX_LEN {
            return Err(ToolError::InvalidPattern {
                message: format!(
                    "pattern too long ({} bytes, max {MAX_REGEX_LEN})",
                    pattern.len()
                ),
            });
        }
        let re = build_regex(pattern)?;
        let doc = self.document(document_id)?;
        Ok(ToolOutput::Lines(matching_lines(
            &doc.content,
            &re,
            MAX_FILE_MATCHES,
        )))
    }

    fn view_file(&self, document_id: &str, start: usize, end: usize) -> Result<ToolOutput, ToolError> {
        let doc = self.document(document_id)?;
        let lines: Vec<&str> = doc.content.lines().collect();
        let total = lines.len();
        let clamped_end = end.min(total + 1);

        if start == 0 || start >= clamped_end {
            return Err(ToolError::InvalidRange {
                document_id: document_id.to_string(),
                start,
                end,
                lines: total,
            });
        }

        let body = lines[start - 1..clamped_end - 1].join("\n");
        Ok(ToolOutput::Text(format!(
            "Lines {start}-{} of {total} in {document_id}:\n{body}",
            clamped_end - 1
        )))
    }

    fn search_all_files(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let re = build_regex(&regex::escape(query.trim()))?;
        let ids = self.store.document_ids();

        let per_document: Vec<(String, Vec<String>)> = ids
            .par_iter()
            .map(|id| {
                let doc = self.document(id)?;
                Ok((
                    id.clone(),
                    matching_lines(&doc.content, &re, MAX_MATCHES_PER_DOCUMENT),
                ))
            })
            .collect::<Result<_, ToolError>>()?;

        let map: BTreeMap<String, Vec<String>> = per_document
            .into_iter()
            .filter(|(_, lines)| !lines.is_empty())
            .collect();
        Ok(ToolOutput::PerDocument(map))
    }
}

fn build_regex(pattern: &str) -> Result<Regex, ToolError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(MAX_REGEX_DFA_SIZE)
        .build()
        .map_err(|e| ToolError::InvalidPattern {
            message: e.to_string(),
        })
}

/// Returns up to `limit` `"<line>: <text>"` strings, 1-based.
fn matching_lines(content: &str, re: &Regex, limit: usize) -> Vec<String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| re.is_match(line))
        .take(limit)
        .map(|(idx, line)| format!("{}: {line}", idx + 1))
        .collect()
}
