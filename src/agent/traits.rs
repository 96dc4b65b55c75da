//! Agent trait definition.
//!
//! Every model role (gather, keyword, filter, history, answer) implements
//! this trait, which turns a user message into a [`ChatRequest`] with the
//! role's model, prompt and sampling settings.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::message::{ChatRequest, ChatResponse, system_message, user_message};
use super::provider::LlmProvider;
use super::tool::ToolDefinition;
use crate::error::AgentError;

/// Trait implemented by all model roles.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Role name for logging.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this role.
    fn model(&self) -> &str;

    /// System prompt that defines the role's behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Tool definitions offered with every request.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Builds the request for one user message.
    fn request(&self, user_msg: &str) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
            stream: false,
            tools: self.tools(),
        }
    }

    /// Executes the role with the given user message.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<ChatResponse, AgentError> {
        let request = self.request(user_msg);
        provider.chat(&request).await
    }
}

/// Parses a JSON response body, tolerating a surrounding markdown code fence.
///
/// # Errors
///
/// Returns [`AgentError::ResponseParse`] when the body is not valid JSON
/// for `T`.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T, AgentError> {
    let trimmed = content.trim();
    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str(json_str).map_err(|e| AgentError::ResponseParse {
        message: e.to_string(),
        content: content.to_string(),
    })
}
