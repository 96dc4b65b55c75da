//! Citation records and the `@cite[...]` marker syntax.
//!
//! The model ends its answer with an evidence block:
//!
//! ```text
//! ---EVIDENCE---
//! @cite[1]
//! "quoted supporting text"
//! @cite[2|paper-b]
//! "text from another document"
//! ---END-EVIDENCE---
//! ```
//!
//! Parsing is line-oriented and tolerant. Formatting is the inverse and uses
//! the same delimiter constants as the streaming parser.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opening delimiter of an evidence block.
pub const EVIDENCE_START: &str = "---EVIDENCE---";

/// Closing delimiter of an evidence block.
pub const EVIDENCE_END: &str = "---END-EVIDENCE---";

/// Prefix shared by every citation marker line.
const MARKER_PREFIX: &str = "@cite[";

/// `@cite[<key>]` or `@cite[<key>|<document_id>]`, optionally followed by text.
static MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^@cite\[(\d+)(?:\|([^\]|]+))?\]\s*(.*)$").ok());

/// A structured citation extracted from, or rendered into, an evidence block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Sequential key, starting at 1 per answer.
    pub key: u32,
    /// Supporting text.
    pub reference: String,
    /// Source document; mandatory when several documents are in scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

impl Citation {
    /// Creates a citation with its reference in canonical form.
    ///
    /// See [`canonical_reference`]. A blank document id becomes `None`.
    #[must_use]
    pub fn new(key: u32, reference: impl AsRef<str>, document_id: Option<String>) -> Self {
        Self {
            key,
            reference: canonical_reference(reference.as_ref()),
            document_id: document_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
        }
    }
}

/// Normalizes reference text to the single-line form an evidence block
/// carries.
///
/// Whitespace runs (newlines included) collapse to one space, the ends are
/// trimmed, and delimiter literals are defused so a reference can never
/// close or reopen the block it is rendered into.
#[must_use]
pub fn canonical_reference(text: &str) -> String {
    let mut out = text.split_whitespace().collect::<Vec<_>>().join(" ");
    // Each pass shortens the text, and defusing can expose a new delimiter.
    while out.contains(EVIDENCE_END) || out.contains(EVIDENCE_START) {
        out = out
            .replace(EVIDENCE_END, "--END-EVIDENCE--")
            .replace(EVIDENCE_START, "--EVIDENCE--");
    }
    out
}

/// Parses a single marker line into `(key, document_id, trailing_text)`.
fn parse_marker(line: &str) -> Option<(u32, Option<String>, &str)> {
    let re = MARKER.as_ref()?;
    let caps = re.captures(line)?;
    let key = caps.get(1)?.as_str().parse().ok()?;
    let document_id = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty());
    let trailing = caps.get(3).map_or("", |m| m.as_str());
    Some((key, document_id, trailing))
}

/// Strips one pair of surrounding straight or curly double quotes.
fn strip_quotes(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner;
        }
    }
    text
}

/// Accumulates text lines for the citation currently being parsed.
struct Pending {
    key: u32,
    document_id: Option<String>,
    lines: Vec<String>,
}

impl Pending {
    fn finish(self) -> Option<Citation> {
        if self.lines.is_empty() {
            return None;
        }
        let joined = self.lines.join(" ");
        let reference = strip_quotes(joined.trim());
        if reference.trim().is_empty() {
            return None;
        }
        Some(Citation::new(self.key, reference, self.document_id))
    }
}

/// Parses the body of an evidence block (delimiters excluded).
///
/// Blank lines are ignored, text before the first marker is ignored,
/// malformed `@cite[` lines are skipped, and a marker with no text is
/// dropped.
#[must_use]
pub fn parse_citations(raw: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut pending: Option<Pending> = None;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line == EVIDENCE_START || line == EVIDENCE_END {
            continue;
        }

        if line.starts_with(MARKER_PREFIX) {
            let Some((key, document_id, trailing)) = parse_marker(line) else {
                continue;
            };
            if let Some(done) = pending.take().and_then(Pending::finish) {
                citations.push(done);
            }
            let mut lines = Vec::new();
            if !trailing.trim().is_empty() {
                lines.push(trailing.trim().to_string());
            }
            pending = Some(Pending {
                key,
                document_id,
                lines,
            });
            continue;
        }

        if let Some(p) = pending.as_mut() {
            p.lines.push(line.to_string());
        }
    }

    if let Some(done) = pending.and_then(Pending::finish) {
        citations.push(done);
    }
    citations
}

/// Numbers user-supplied references sequentially from 1 in input order.
#[must_use]
pub fn number_references<I, S>(references: I) -> Vec<Citation>
where
    I: IntoIterator<Item = (Option<String>, S)>,
    S: AsRef<str>,
{
    references
        .into_iter()
        .zip(1u32..)
        .map(|((document_id, text), key)| Citation::new(key, text, document_id))
        .collect()
}

/// Renders citations as a delimited evidence block.
///
/// References are written in canonical form and wrapped in double quotes,
/// so [`parse_citations`] recovers any citation built with
/// [`Citation::new`] exactly. Citations with a blank reference are skipped.
#[must_use]
pub fn format_citations(citations: &[Citation]) -> String {
    let mut out = String::new();
    out.push_str(EVIDENCE_START);
    out.push('\n');
    for citation in citations {
        let reference = canonical_reference(&citation.reference);
        if reference.is_empty() {
            continue;
        }
        match &citation.document_id {
            Some(id) => {
                let _ = writeln!(out, "@cite[{}|{id}]", citation.key);
            }
            None => {
                let _ = writeln!(out, "@cite[{}]", citation.key);
            }
        }
        let _ = writeln!(out, "\"{reference}\"");
    }
    out.push_str(EVIDENCE_END);
    out.push('\n');
    out
}
