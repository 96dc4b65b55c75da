//! Error types for citeqa.
//!
//! Each layer owns its own `thiserror` enum. [`ToolError`] never aborts a
//! gathering session (it is rendered into the tool result instead), while
//! [`AgentError`] covers provider failures that are surfaced to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for top-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Corpus loading or lookup failure.
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// Retrieval tool failure.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Language-model or pipeline failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure outside corpus loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the document store collaborator.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// A document could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A metadata sidecar file was malformed.
    #[error("invalid metadata in {path}: {message}")]
    Metadata {
        /// Path of the sidecar file.
        path: PathBuf,
        /// Parse error detail.
        message: String,
    },

    /// The corpus directory does not exist or is not a directory.
    #[error("corpus directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Two files resolved to the same document ID.
    #[error("duplicate document id: {0}")]
    DuplicateDocument(String),
}

/// Errors raised while executing a retrieval tool call.
///
/// These are recorded as error-string results and gathering continues.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a tool that does not exist.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// Requested tool name.
        name: String,
    },

    /// Arguments were missing, mistyped, or not a JSON object.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// Tool name.
        tool: &'static str,
        /// Detail.
        message: String,
    },

    /// The raw argument payload exceeded the size limit.
    #[error("tool arguments too large ({size} bytes, max {max})")]
    ArgumentsTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Permitted maximum.
        max: usize,
    },

    /// The referenced document is not in the corpus.
    #[error("unknown document: {document_id}")]
    UnknownDocument {
        /// Requested document ID.
        document_id: String,
    },

    /// The search pattern did not compile.
    #[error("invalid regex: {message}")]
    InvalidPattern {
        /// Compiler message.
        message: String,
    },

    /// The requested line range is empty or out of bounds.
    #[error("invalid line range {start}..{end} for {document_id} ({lines} lines)")]
    InvalidRange {
        /// Document ID.
        document_id: String,
        /// Requested start line (1-based, inclusive).
        start: usize,
        /// Requested end line (1-based, exclusive).
        end: usize,
        /// Number of lines in the document.
        lines: usize,
    },

    /// The document store itself failed.
    #[error("document store error: {0}")]
    Store(#[from] CorpusError),
}

/// Errors raised by the agent layer (provider calls, configuration, streaming).
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured.
    #[error("API key missing: set OPENAI_API_KEY or CITEQA_API_KEY")]
    ApiKeyMissing,

    /// Invalid configuration values.
    #[error("invalid configuration: {message}")]
    Config {
        /// Detail.
        message: String,
    },

    /// The configured provider name is unknown.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name.
        name: String,
    },

    /// A provider API call failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Detail.
        message: String,
        /// HTTP status when known.
        status: Option<u16>,
    },

    /// The provider stream failed mid-flight.
    #[error("stream error: {message}")]
    Stream {
        /// Detail.
        message: String,
    },

    /// A provider response could not be parsed.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Detail.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// A compaction batch failed. Never escapes the compaction engine.
    #[error("compaction failed: {message}")]
    Compaction {
        /// Detail.
        message: String,
    },

    /// The question was rejected before any provider call.
    #[error("invalid question: {message}")]
    InvalidQuestion {
        /// Detail.
        message: String,
    },

    /// The cycle was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Generic execution failure.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Output serialization failure.
    #[error("output format error: {0}")]
    OutputFormat(String),

    /// A command argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
