//! Core data model shared by every layer.
//!
//! Nothing in here performs I/O or calls a provider: evidence accumulation,
//! tool-call records, the citation syntax and the streaming splitter are all
//! plain synchronous code.

pub mod citation;
pub mod evidence;
pub mod stream;
pub mod tool_call;

pub use citation::{
    Citation, EVIDENCE_END, EVIDENCE_START, format_citations, number_references, parse_citations,
};
pub use evidence::{Evidence, EvidenceCollection, parse_numbered_line};
pub use stream::{EvidenceStreamParser, StreamEvent, collect_events, split_answer};
pub use tool_call::{ToolCallResult, ToolInvocation, ToolOutput};
