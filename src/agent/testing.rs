//! Scripted provider for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use super::message::{ChatRequest, ChatResponse};
use super::prompt::{
    ANSWER_SYSTEM_PROMPT, FILTER_LONG_SYSTEM_PROMPT, FILTER_SHORT_SYSTEM_PROMPT,
    GATHER_SYSTEM_PROMPT, HISTORY_SYSTEM_PROMPT, KEYWORDS_SYSTEM_PROMPT,
};
use super::provider::{LlmProvider, TextStream};
use super::tool::ToolCall;
use crate::error::AgentError;

/// Which role produced a request, recovered from its system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Gather,
    FilterShort,
    FilterLong,
    History,
    Keywords,
    Answer,
    Unknown,
}

pub fn role_of(request: &ChatRequest) -> RoleKind {
    let system = request.messages.first().map_or("", |m| m.content.as_str());
    match system {
        s if s == GATHER_SYSTEM_PROMPT => RoleKind::Gather,
        s if s == FILTER_SHORT_SYSTEM_PROMPT => RoleKind::FilterShort,
        s if s == FILTER_LONG_SYSTEM_PROMPT => RoleKind::FilterLong,
        s if s == HISTORY_SYSTEM_PROMPT => RoleKind::History,
        s if s == KEYWORDS_SYSTEM_PROMPT => RoleKind::Keywords,
        s if s == ANSWER_SYSTEM_PROMPT => RoleKind::Answer,
        _ => RoleKind::Unknown,
    }
}

type Responder = Box<dyn Fn(&ChatRequest) -> Result<ChatResponse, AgentError> + Send + Sync>;

/// Provider answering `chat` through a closure and `chat_stream` from fixed chunks.
pub struct MockProvider {
    responder: Responder,
    chunks: Vec<Result<String, AgentError>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<ChatResponse, AgentError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            chunks: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks = chunks.into_iter().map(|c| Ok(c.into())).collect();
        self
    }

    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.chunks.push(Err(AgentError::Stream {
            message: message.to_string(),
        }));
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, role: RoleKind) -> usize {
        self.requests()
            .iter()
            .filter(|r| role_of(r) == role)
            .count()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.responder)(request)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let chunks: Vec<Result<String, AgentError>> = self
            .chunks
            .iter()
            .map(|c| match c {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(AgentError::Stream {
                    message: e.to_string(),
                }),
            })
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// A tool call with JSON arguments.
pub fn call(name: &str, arguments: &serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}
