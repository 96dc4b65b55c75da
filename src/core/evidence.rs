//! Evidence gathered for one question-answering session.
//!
//! An [`EvidenceCollection`] is created per question, owned by the gathering
//! loop, lent mutably to the compaction engine, and dropped once the answer
//! has streamed. It is never persisted.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::tool_call::{ToolCallResult, ToolInvocation, ToolOutput};

/// Matches `"<line>: <text>"` lines emitted by the search tools.
static NUMBERED_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+):\s?(.*)$").ok());

/// Splits a `"<line>: <text>"` string into its line number and text.
#[must_use]
pub fn parse_numbered_line(line: &str) -> Option<(u32, &str)> {
    let re = NUMBERED_LINE.as_ref()?;
    let caps = re.captures(line)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    Some((number, caps.get(2)?.as_str()))
}

/// Everything gathered for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Document this evidence belongs to.
    pub document_id: String,
    /// Snippets in the order they were gathered.
    pub snippets: Vec<String>,
    /// Source line per snippet (parallel to `snippets`), when known.
    pub line_numbers: Vec<Option<u32>>,
}

impl Evidence {
    /// Creates empty evidence for a document.
    #[must_use]
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            snippets: Vec::new(),
            line_numbers: Vec::new(),
        }
    }

    /// Appends a snippet unless one with identical text is already held.
    ///
    /// The first occurrence keeps its line number. Returns `true` when the
    /// snippet was appended.
    pub fn push(&mut self, text: impl Into<String>, line: Option<u32>) -> bool {
        let text = text.into();
        if text.trim().is_empty() || self.snippets.contains(&text) {
            return false;
        }
        self.snippets.push(text);
        self.line_numbers.push(line);
        true
    }

    /// Replaces the whole snippet sequence (compaction only).
    pub fn replace(&mut self, snippets: Vec<(String, Option<u32>)>) {
        let (texts, lines) = snippets.into_iter().unzip();
        self.snippets = texts;
        self.line_numbers = lines;
    }

    /// Number of snippets.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.snippets.len()
    }

    /// Returns `true` when no snippets are held.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Total size of all snippets in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.snippets.iter().map(|s| s.chars().count()).sum()
    }
}

/// Aggregate of evidence and issued tool calls for one session.
#[derive(Debug, Clone, Default)]
pub struct EvidenceCollection {
    evidence: HashMap<String, Evidence>,
    issued: Vec<ToolCallResult>,
    issued_keys: HashSet<String>,
}

impl EvidenceCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this `(name, args)` pair was already executed.
    #[must_use]
    pub fn has_issued(&self, call: &ToolInvocation) -> bool {
        self.issued_keys.contains(&call.dedup_key())
    }

    /// Records an executed call and merges its output into the evidence.
    ///
    /// Returns `false` (and records nothing) if the call was already issued.
    pub fn record(&mut self, result: ToolCallResult) -> bool {
        if !self.issued_keys.insert(result.call.dedup_key()) {
            return false;
        }
        self.merge(&result.call, &result.result);
        self.issued.push(result);
        true
    }

    /// Merges a tool output into the per-document evidence.
    fn merge(&mut self, call: &ToolInvocation, output: &ToolOutput) {
        let document_id = call
            .args
            .get("document_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match output {
            ToolOutput::Text(text) => {
                if let Some(id) = document_id {
                    self.entry(&id).push(text.clone(), None);
                }
            }
            ToolOutput::Lines(lines) => {
                if let Some(id) = document_id {
                    self.merge_lines(&id, lines);
                }
            }
            ToolOutput::PerDocument(map) => {
                for (id, lines) in map {
                    self.merge_lines(id, lines);
                }
            }
            ToolOutput::Missing(_) | ToolOutput::Error(_) | ToolOutput::Stop => {}
        }
    }

    fn merge_lines(&mut self, document_id: &str, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let evidence = self.entry(document_id);
        for line in lines {
            match parse_numbered_line(line) {
                Some((number, text)) => evidence.push(text, Some(number)),
                None => evidence.push(line.clone(), None),
            };
        }
    }

    fn entry(&mut self, document_id: &str) -> &mut Evidence {
        self.evidence
            .entry(document_id.to_string())
            .or_insert_with(|| Evidence::new(document_id))
    }

    /// Adds a snippet directly (used by callers and tests).
    pub fn add_snippet(&mut self, document_id: &str, text: impl Into<String>, line: Option<u32>) {
        self.entry(document_id).push(text, line);
    }

    /// Evidence for one document.
    #[must_use]
    pub fn get(&self, document_id: &str) -> Option<&Evidence> {
        self.evidence.get(document_id)
    }

    /// Mutable evidence for one document.
    pub fn get_mut(&mut self, document_id: &str) -> Option<&mut Evidence> {
        self.evidence.get_mut(document_id)
    }

    /// Removes documents whose snippets were all dropped.
    pub fn prune_empty(&mut self) {
        self.evidence.retain(|_, e| !e.is_empty());
    }

    /// Document IDs with evidence, sorted for deterministic output.
    #[must_use]
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .evidence
            .iter()
            .filter(|(_, e)| !e.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Evidence entries sorted by document ID.
    #[must_use]
    pub fn evidence(&self) -> Vec<&Evidence> {
        let mut all: Vec<&Evidence> = self.evidence.values().filter(|e| !e.is_empty()).collect();
        all.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        all
    }

    /// Tool calls executed so far, in execution order.
    #[must_use]
    pub fn issued(&self) -> &[ToolCallResult] {
        &self.issued
    }

    /// Mutable access to issued results (history compaction only).
    pub(crate) fn issued_mut(&mut self) -> &mut [ToolCallResult] {
        &mut self.issued
    }

    /// Returns `true` when no document has any snippet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evidence.values().all(Evidence::is_empty)
    }

    /// Total number of snippets across documents.
    #[must_use]
    pub fn snippet_count(&self) -> usize {
        self.evidence.values().map(Evidence::len).sum()
    }

    /// Total evidence size in characters.
    #[must_use]
    pub fn evidence_chars(&self) -> usize {
        self.evidence.values().map(Evidence::char_len).sum()
    }

    /// Total rendered size of all tool results in characters.
    #[must_use]
    pub fn tool_result_chars(&self) -> usize {
        self.issued.iter().map(|r| r.result.char_len()).sum()
    }

    /// Renders the evidence as numbered snippets per document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for evidence in self.evidence() {
            let _ = writeln!(out, "<document id=\"{}\">", evidence.document_id);
            for (idx, (snippet, line)) in evidence
                .snippets
                .iter()
                .zip(&evidence.line_numbers)
                .enumerate()
            {
                match line {
                    Some(n) => {
                        let _ = writeln!(out, "[{idx}] (line {n}) {snippet}");
                    }
                    None => {
                        let _ = writeln!(out, "[{idx}] {snippet}");
                    }
                }
            }
            out.push_str("</document>\n");
        }
        out
    }
}
