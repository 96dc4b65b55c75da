//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use citeqa::agent::prompt::{
    ANSWER_SYSTEM_PROMPT, FILTER_LONG_SYSTEM_PROMPT, FILTER_SHORT_SYSTEM_PROMPT,
    GATHER_SYSTEM_PROMPT, HISTORY_SYSTEM_PROMPT, KEYWORDS_SYSTEM_PROMPT,
};
use citeqa::agent::{AgentConfig, ChatRequest, ChatResponse, LlmProvider, TextStream, ToolCall};
use citeqa::corpus::{Document, MemoryStore};
use citeqa::error::AgentError;
use futures_util::stream;

/// Role that issued a request, recovered from its system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gather,
    FilterShort,
    FilterLong,
    History,
    Keywords,
    Answer,
    Other,
}

pub fn role(request: &ChatRequest) -> Role {
    let system = request.messages.first().map_or("", |m| m.content.as_str());
    if system == GATHER_SYSTEM_PROMPT {
        Role::Gather
    } else if system == FILTER_SHORT_SYSTEM_PROMPT {
        Role::FilterShort
    } else if system == FILTER_LONG_SYSTEM_PROMPT {
        Role::FilterLong
    } else if system == HISTORY_SYSTEM_PROMPT {
        Role::History
    } else if system == KEYWORDS_SYSTEM_PROMPT {
        Role::Keywords
    } else if system == ANSWER_SYSTEM_PROMPT {
        Role::Answer
    } else {
        Role::Other
    }
}

type Responder = Box<dyn Fn(&ChatRequest) -> Result<ChatResponse, AgentError> + Send + Sync>;

/// In-process provider driven by a closure, with a fixed answer stream.
pub struct ScriptedProvider {
    responder: Responder,
    chunks: Vec<String>,
    log: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<ChatResponse, AgentError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            chunks: Vec::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn streaming<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn calls(&self, which: Role) -> usize {
        self.requests().iter().filter(|r| role(r) == which).count()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }
        (self.responder)(request)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(request.clone());
        }
        let items: Vec<Result<String, AgentError>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

pub fn tool_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

pub fn config() -> citeqa::agent::config::AgentConfigBuilder {
    AgentConfig::builder().api_key("test-key")
}

pub fn papers() -> MemoryStore {
    [
        Document::new(
            "attention",
            "Attention Is All You Need",
            "Introduction\nWe propose the Transformer.\nSelf-attention relates all positions.\nTraining took 3.5 days on eight GPUs.",
        )
        .with_abstract("The Transformer relies entirely on attention."),
        Document::new(
            "lstm",
            "Long Short-Term Memory",
            "Recurrent networks struggle with long gaps.\nLSTM adds gated memory cells.\nAttention is not used.",
        ),
    ]
    .into_iter()
    .collect()
}
