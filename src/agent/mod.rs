//! Language-model pipeline for citeqa.
//!
//! Gathers evidence from a document corpus through a tool-calling loop,
//! compacts it to fit the context budget, and streams a cited answer. Uses
//! a pluggable provider abstraction backed by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! Question → Orchestrator
//!   ├── Gatherer (tool loop over the corpus)
//!   │   ├── GatherAgent → retrieval tool calls → EvidenceCollection
//!   │   ├── Compactor::compact_history when tool results grow too large
//!   │   └── KeywordAgent → search_all_files when nothing was found
//!   ├── Compactor::compact_evidence (short: keep/drop, long: drop/summarize)
//!   └── AnswerAgent → streamed prose + evidence block → citations
//! ```
//!
//! # Feature Gate
//!
//! This module requires the `agent` feature flag (enabled by default).

pub mod agentic_loop;
pub mod answer;
pub mod client;
pub mod compaction;
pub mod config;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
#[cfg(test)]
pub(crate) mod testing;
pub mod tool;
pub mod traits;

// Re-export key types
pub use agentic_loop::{GatherAgent, GatherOutcome, Gatherer, KeywordAgent, StopReason};
pub use answer::{AnswerAgent, AnswerOutcome};
pub use client::create_provider;
pub use compaction::{CompactionReport, Compactor, HistoryReport, Tier};
pub use config::AgentConfig;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{AskResult, MAX_QUESTION_LEN, Orchestrator};
pub use prompt::PromptSet;
pub use provider::{LlmProvider, TextStream};
pub use tool::{ToolCall, ToolDefinition, ToolSet};
pub use traits::{Agent, parse_json};
