//! Incremental splitter for answer streams with an embedded evidence block.
//!
//! [`EvidenceStreamParser`] is fed text chunks exactly as the transport
//! delivers them and emits [`StreamEvent`]s. While outside an evidence block
//! it never flushes the last `EVIDENCE_START.len()` bytes of its buffer, so a
//! marker split across chunks is always seen whole. The concatenated content
//! and the parsed citations are therefore the same for every chunking of a
//! given input.

use serde::Serialize;
use tracing::warn;

use super::citation::{Citation, EVIDENCE_END, EVIDENCE_START, parse_citations};

/// Output of the stream parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Visible answer text.
    Content(String),
    /// Citations parsed from one complete evidence block.
    Citations(Vec<Citation>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    OutsideEvidence,
    InsideEvidence,
}

/// Streaming state machine separating prose from the evidence block.
#[derive(Debug)]
pub struct EvidenceStreamParser {
    state: State,
    buffer: String,
    evidence: String,
    strip_newline: bool,
}

impl Default for EvidenceStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceStreamParser {
    /// Creates a parser in the outside-evidence state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::OutsideEvidence,
            buffer: String::new(),
            evidence: String::new(),
            strip_newline: false,
        }
    }

    /// Returns `true` while an evidence block is open.
    #[must_use]
    pub fn in_evidence(&self) -> bool {
        self.state == State::InsideEvidence
    }

    /// Feeds one chunk and returns the events it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut chunk = chunk;

        if self.strip_newline && !chunk.is_empty() {
            // Drop the line break that follows an end marker.
            self.strip_newline = false;
            chunk = chunk.strip_prefix('\n').unwrap_or(chunk);
        }

        match self.state {
            State::OutsideEvidence => self.buffer.push_str(chunk),
            State::InsideEvidence => self.evidence.push_str(chunk),
        }
        self.drain(&mut events);
        events
    }

    /// Flushes whatever is buffered once the stream has ended.
    ///
    /// An evidence block that never closed is emitted as plain content.
    pub fn finish(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match self.state {
            State::OutsideEvidence => {
                if !self.buffer.is_empty() {
                    events.push(StreamEvent::Content(std::mem::take(&mut self.buffer)));
                }
            }
            State::InsideEvidence => {
                warn!(
                    buffered = self.evidence.len(),
                    "stream ended inside evidence block; flushing as content"
                );
                if !self.evidence.is_empty() {
                    events.push(StreamEvent::Content(std::mem::take(&mut self.evidence)));
                }
            }
        }
        events
    }

    fn drain(&mut self, events: &mut Vec<StreamEvent>) {
        loop {
            match self.state {
                State::OutsideEvidence => {
                    if let Some(pos) = self.buffer.find(EVIDENCE_START) {
                        if pos > 0 {
                            events.push(StreamEvent::Content(self.buffer[..pos].to_string()));
                        }
                        self.evidence = self.buffer[pos + EVIDENCE_START.len()..].to_string();
                        self.buffer.clear();
                        self.state = State::InsideEvidence;
                        continue;
                    }
                    self.flush_safe_prefix(events);
                    return;
                }
                State::InsideEvidence => {
                    let Some(pos) = self.evidence.find(EVIDENCE_END) else {
                        return;
                    };
                    let citations = parse_citations(&self.evidence[..pos]);
                    let rest = &self.evidence[pos + EVIDENCE_END.len()..];
                    let rest = if rest.is_empty() {
                        self.strip_newline = true;
                        String::new()
                    } else {
                        rest.strip_prefix('\n').unwrap_or(rest).to_string()
                    };
                    events.push(StreamEvent::Citations(citations));
                    self.evidence.clear();
                    self.buffer = rest;
                    self.state = State::OutsideEvidence;
                }
            }
        }
    }

    /// Emits everything except the tail that could still begin a marker.
    fn flush_safe_prefix(&mut self, events: &mut Vec<StreamEvent>) {
        if self.buffer.len() <= EVIDENCE_START.len() {
            return;
        }
        let mut cut = self.buffer.len() - EVIDENCE_START.len();
        while !self.buffer.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            return;
        }
        let tail = self.buffer.split_off(cut);
        events.push(StreamEvent::Content(std::mem::replace(
            &mut self.buffer,
            tail,
        )));
    }
}

/// Splits a complete answer text in one pass.
#[must_use]
pub fn split_answer(text: &str) -> (String, Vec<Citation>) {
    let mut parser = EvidenceStreamParser::new();
    let mut events = parser.push(text);
    events.extend(parser.finish());
    collect_events(events)
}

/// Folds events into concatenated content and the citation list.
#[must_use]
pub fn collect_events<I>(events: I) -> (String, Vec<Citation>)
where
    I: IntoIterator<Item = StreamEvent>,
{
    let mut content = String::new();
    let mut citations = Vec::new();
    for event in events {
        match event {
            StreamEvent::Content(text) => content.push_str(&text),
            StreamEvent::Citations(found) => citations.extend(found),
        }
    }
    (content, citations)
}
