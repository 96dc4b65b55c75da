//! Tool definitions and calls for function-calling.
//!
//! Definitions are derived from the closed [`RetrievalTool`] set, so the
//! schemas offered to the model always match what the executor accepts.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::ToolInvocation;
use crate::retrieval::RetrievalTool;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match a [`RetrievalTool`] name).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl From<RetrievalTool> for ToolDefinition {
    fn from(tool: RetrievalTool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: parameters(tool),
        }
    }
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

impl ToolCall {
    /// Converts the raw call into a canonical invocation.
    #[must_use]
    pub fn invocation(&self) -> ToolInvocation {
        ToolInvocation::from_raw(&self.name, &self.arguments)
    }
}

/// A set of tool definitions offered in one request.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    definitions: Vec<ToolDefinition>,
}

impl ToolSet {
    /// Returns the tool definitions in this set.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns `true` if this set contains no tools.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns the number of tools in this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.definitions.len()
    }

    /// The gathering tool set: every retrieval tool plus `stop`.
    #[must_use]
    pub fn retrieval() -> Self {
        Self {
            definitions: RetrievalTool::ALL.into_iter().map(Into::into).collect(),
        }
    }

    /// Empty tool set (no tools available).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

fn parameters(tool: RetrievalTool) -> serde_json::Value {
    let document_id = json!({
        "type": "string",
        "description": "ID of the document, as listed in the corpus index."
    });
    match tool {
        RetrievalTool::ReadFile | RetrievalTool::ReadAbstract => json!({
            "type": "object",
            "properties": { "document_id": document_id },
            "required": ["document_id"],
            "additionalProperties": false
        }),
        RetrievalTool::SearchFile => json!({
            "type": "object",
            "properties": {
                "document_id": document_id,
                "pattern": {
                    "type": "string",
                    "description": "Regular expression, matched case-insensitively against each line."
                }
            },
            "required": ["document_id", "pattern"],
            "additionalProperties": false
        }),
        RetrievalTool::ViewFile => json!({
            "type": "object",
            "properties": {
                "document_id": document_id,
                "start": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "First line to show (1-based, inclusive)."
                },
                "end": {
                    "type": "integer",
                    "minimum": 2,
                    "description": "Line to stop before (1-based, exclusive)."
                }
            },
            "required": ["document_id", "start", "end"],
            "additionalProperties": false
        }),
        RetrievalTool::SearchAllFiles => json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Literal text to look for in every document."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
        RetrievalTool::Stop => json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_toolset() {
        let ts = ToolSet::retrieval();
        assert_eq!(ts.len(), 6);
        let names: Vec<&str> = ts.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "read_file",
                "search_file",
                "view_file",
                "read_abstract",
                "search_all_files",
                "stop"
            ]
        );
        assert!(ToolSet::none().is_empty());
    }

    #[test]
    fn test_all_definitions_have_valid_schemas() {
        for def in ToolSet::retrieval().definitions() {
            assert!(!def.description.is_empty());
            assert_eq!(def.parameters["type"], "object");
        }
    }

    #[test]
    fn test_tool_call_invocation_is_canonical() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "search_file".to_string(),
            arguments: r#"{"pattern":"x","document_id":"a"}"#.to_string(),
        };
        let inv = call.invocation();
        assert_eq!(inv.name, "search_file");
        assert_eq!(inv.args.len(), 2);
    }
}
