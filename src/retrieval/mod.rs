//! Read-only retrieval tools over the document corpus.
//!
//! The tool set is closed: [`RetrievalTool`] names every tool kind, and a
//! [`ToolInvocation`] coming from the model is parsed into a typed
//! [`RetrievalCall`] before it reaches the [`ToolExecutor`]. Adding a tool is
//! a compile-time-checked change across parsing, execution and schemas.

pub mod executor;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::core::ToolInvocation;
use crate::error::ToolError;

pub use executor::ToolExecutor;

/// Maximum serialized size of a tool call's arguments, in bytes.
pub const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// Every tool the model may call during gathering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetrievalTool {
    /// Full text of one document.
    ReadFile,
    /// Regex search within one document.
    SearchFile,
    /// A line range of one document.
    ViewFile,
    /// The abstract of one document.
    ReadAbstract,
    /// Literal search across every document.
    SearchAllFiles,
    /// Sentinel ending the gathering loop.
    Stop,
}

impl RetrievalTool {
    /// All tools, in the order they are offered to the model.
    pub const ALL: [Self; 6] = [
        Self::ReadFile,
        Self::SearchFile,
        Self::ViewFile,
        Self::ReadAbstract,
        Self::SearchAllFiles,
        Self::Stop,
    ];

    /// Wire name of the tool.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::SearchFile => "search_file",
            Self::ViewFile => "view_file",
            Self::ReadAbstract => "read_abstract",
            Self::SearchAllFiles => "search_all_files",
            Self::Stop => "stop",
        }
    }

    /// One-line description shown to the model.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ReadFile => "Read the full text of one document. Prefer search_file or \
                               view_file for long documents.",
            Self::SearchFile => "Search one document with a case-insensitive regular \
                                 expression. Returns matching lines as '<line>: <text>'.",
            Self::ViewFile => "Read lines [start, end) of one document (1-based, end \
                               exclusive). Use after search_file to read around a match.",
            Self::ReadAbstract => "Read the abstract of one document, if it has one.",
            Self::SearchAllFiles => "Search every document for a literal phrase \
                                     (case-insensitive). Returns matching lines per document.",
            Self::Stop => "Call when the gathered evidence is sufficient to answer the \
                           question.",
        }
    }
}

impl fmt::Display for RetrievalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RetrievalTool {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.name() == s)
            .ok_or_else(|| ToolError::UnknownTool {
                name: s.to_string(),
            })
    }
}

/// A validated, typed retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalCall {
    /// `read_file`
    ReadFile {
        /// Target document.
        document_id: String,
    },
    /// `search_file`
    SearchFile {
        /// Target document.
        document_id: String,
        /// Regular expression, matched case-insensitively per line.
        pattern: String,
    },
    /// `view_file`
    ViewFile {
        /// Target document.
        document_id: String,
        /// First line, 1-based inclusive.
        start: usize,
        /// Last line, 1-based exclusive.
        end: usize,
    },
    /// `read_abstract`
    ReadAbstract {
        /// Target document.
        document_id: String,
    },
    /// `search_all_files`
    SearchAllFiles {
        /// Literal text to look for.
        query: String,
    },
    /// `stop`
    Stop,
}

impl RetrievalCall {
    /// Parses and validates a raw invocation.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] for names outside the tool set,
    /// [`ToolError::ArgumentsTooLarge`] for oversized payloads, and
    /// [`ToolError::InvalidArguments`] for missing or mistyped fields.
    pub fn parse(invocation: &ToolInvocation) -> Result<Self, ToolError> {
        let tool: RetrievalTool = invocation.name.parse()?;

        let args = Value::Object(invocation.args.clone());
        let size = args.to_string().len();
        if size > MAX_TOOL_ARGS_LEN {
            return Err(ToolError::ArgumentsTooLarge {
                size,
                max: MAX_TOOL_ARGS_LEN,
            });
        }

        match tool {
            RetrievalTool::ReadFile => {
                let a: DocumentArgs = decode(tool, args)?;
                Ok(Self::ReadFile {
                    document_id: a.document_id,
                })
            }
            RetrievalTool::SearchFile => {
                #[derive(Deserialize)]
                struct Args {
                    document_id: String,
                    pattern: String,
                }
                let a: Args = decode(tool, args)?;
                Ok(Self::SearchFile {
                    document_id: a.document_id,
                    pattern: a.pattern,
                })
            }
            RetrievalTool::ViewFile => {
                #[derive(Deserialize)]
                struct Args {
                    document_id: String,
                    start: usize,
                    end: usize,
                }
                let a: Args = decode(tool, args)?;
                Ok(Self::ViewFile {
                    document_id: a.document_id,
                    start: a.start,
                    end: a.end,
                })
            }
            RetrievalTool::ReadAbstract => {
                let a: DocumentArgs = decode(tool, args)?;
                Ok(Self::ReadAbstract {
                    document_id: a.document_id,
                })
            }
            RetrievalTool::SearchAllFiles => {
                #[derive(Deserialize)]
                struct Args {
                    query: String,
                }
                let a: Args = decode(tool, args)?;
                if a.query.trim().is_empty() {
                    return Err(ToolError::InvalidArguments {
                        tool: tool.name(),
                        message: "query must not be empty".to_string(),
                    });
                }
                Ok(Self::SearchAllFiles { query: a.query })
            }
            RetrievalTool::Stop => Ok(Self::Stop),
        }
    }

    /// The tool kind of this call.
    #[must_use]
    pub const fn tool(&self) -> RetrievalTool {
        match self {
            Self::ReadFile { .. } => RetrievalTool::ReadFile,
            Self::SearchFile { .. } => RetrievalTool::SearchFile,
            Self::ViewFile { .. } => RetrievalTool::ViewFile,
            Self::ReadAbstract { .. } => RetrievalTool::ReadAbstract,
            Self::SearchAllFiles { .. } => RetrievalTool::SearchAllFiles,
            Self::Stop => RetrievalTool::Stop,
        }
    }
}

#[derive(Deserialize)]
struct DocumentArgs {
    document_id: String,
}

fn decode<T: for<'de> Deserialize<'de>>(tool: RetrievalTool, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.name(),
        message: e.to_string(),
    })
}
