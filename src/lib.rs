//! # citeqa
//!
//! Question answering over a private document corpus with verifiable
//! citations.
//!
//! A language model explores the corpus through a small set of retrieval
//! tools, the evidence it gathers is compacted to fit a context budget, and
//! the final answer is streamed with an embedded evidence block whose
//! citations point back at source documents.
//!
//! ## Modules
//!
//! - [`core`]: evidence, tool-call records, citations, and the streaming
//!   answer parser (pure, synchronous)
//! - [`corpus`]: the read-only document store and directory loader
//! - [`retrieval`]: the retrieval tools and their executor
//! - [`agent`]: the gathering loop, compaction, and answer streaming
//!   (feature `agent`)
//! - [`cli`]: command-line front end
//!
//! ## Example
//!
//! ```
//! use citeqa::core::split_answer;
//!
//! let (content, citations) = split_answer(
//!     "Yes @cite[1].\n---EVIDENCE---\n@cite[1]\n\"a quote\"\n---END-EVIDENCE---\n",
//! );
//! assert_eq!(content, "Yes @cite[1].\n");
//! assert_eq!(citations[0].reference, "a quote");
//! ```

#[cfg(feature = "agent")]
pub mod agent;
pub mod cli;
pub mod core;
pub mod corpus;
pub mod error;
pub mod retrieval;

pub use crate::core::{Citation, EvidenceCollection, EvidenceStreamParser, StreamEvent};
pub use crate::corpus::{Document, DocumentStore, MemoryStore};
pub use crate::error::{Error, Result};
