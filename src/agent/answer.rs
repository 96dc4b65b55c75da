//! Streaming answer generation.
//!
//! The answer model streams prose followed by an evidence block of
//! citations. Chunks pass through an [`EvidenceStreamParser`] so that prose
//! reaches the caller as it arrives while citation lines are held back and
//! parsed.

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::AgentConfig;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::core::{Citation, EvidenceStreamParser, StreamEvent};
use crate::error::AgentError;

/// Model role that writes the final answer.
#[derive(Debug, Clone)]
pub struct AnswerAgent {
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

/// Result of one streamed answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    /// Prose with the evidence block removed.
    pub answer: String,
    /// Citations parsed from the evidence block.
    pub citations: Vec<Citation>,
    /// Whether the stream was cut short by cancellation.
    pub cancelled: bool,
    /// Chunks received from the provider.
    pub chunks: usize,
}

impl AnswerAgent {
    /// Creates the answer role from configuration.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            model: config.answer_model.clone(),
            system_prompt: prompts.answer.clone(),
            max_tokens: config.answer_max_tokens,
        }
    }

    /// Streams the answer, forwarding each parsed event to `on_event`.
    ///
    /// Cancellation during the stream stops forwarding and returns the
    /// partial answer with `cancelled` set.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if `cancel` fired before the
    /// request, or the provider error if the stream fails.
    pub async fn stream<F>(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<AnswerOutcome, AgentError>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let mut request = self.request(user_msg);
        request.stream = true;
        let mut stream = provider.chat_stream(&request).await?;

        let mut parser = EvidenceStreamParser::new();
        let mut outcome = AnswerOutcome::default();
        let mut dispatch = |event: StreamEvent, outcome: &mut AnswerOutcome| {
            match &event {
                StreamEvent::Content(text) => outcome.answer.push_str(text),
                StreamEvent::Citations(citations) => {
                    outcome.citations.extend(citations.iter().cloned());
                }
            }
            on_event(&event);
        };

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                item = stream.next() => item,
            };
            let Some(item) = next else {
                break;
            };
            let chunk = item?;
            outcome.chunks += 1;
            for event in parser.push(&chunk) {
                dispatch(event, &mut outcome);
            }
        }

        if outcome.cancelled {
            debug!(chunks = outcome.chunks, "answer stream cancelled");
        } else {
            for event in parser.finish() {
                dispatch(event, &mut outcome);
            }
        }

        info!(
            chunks = outcome.chunks,
            answer_chars = outcome.answer.chars().count(),
            citations = outcome.citations.len(),
            cancelled = outcome.cancelled,
            "answer streamed"
        );
        Ok(outcome)
    }
}

impl Agent for AnswerAgent {
    fn name(&self) -> &'static str {
        "answer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::message::ChatResponse;
    use crate::agent::testing::MockProvider;

    fn agent() -> AnswerAgent {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"));
        AnswerAgent::new(&config, &PromptSet::defaults())
    }

    #[tokio::test]
    async fn test_stream_splits_prose_and_citations() {
        let provider = MockProvider::new(|_| Ok(ChatResponse::default())).with_chunks([
            "Attention is global @cite[1].\n---EVI",
            "DENCE---\n@cite[1|alpha]\n\"The transformer uses att",
            "ention.\"\n---END-EVIDENCE---\n",
        ]);
        let mut forwarded = Vec::new();
        let outcome = agent()
            .stream(&provider, "q", &CancellationToken::new(), |event| {
                forwarded.push(event.clone());
            })
            .await
            .unwrap_or_else(|e| panic!("stream: {e}"));

        assert!(!outcome.cancelled);
        assert_eq!(outcome.chunks, 3);
        assert!(outcome.answer.contains("Attention is global @cite[1]."));
        assert!(!outcome.answer.contains("EVIDENCE"));
        assert_eq!(outcome.citations.len(), 1);
        assert_eq!(outcome.citations[0].document_id.as_deref(), Some("alpha"));
        assert!(
            forwarded
                .iter()
                .any(|e| matches!(e, StreamEvent::Citations(c) if c.len() == 1))
        );
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let provider = MockProvider::new(|_| Ok(ChatResponse::default()))
            .with_chunks(["partial"])
            .with_stream_error("connection reset");
        let result = agent()
            .stream(&provider, "q", &CancellationToken::new(), |_| {})
            .await;
        assert!(matches!(result, Err(AgentError::Stream { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let provider = MockProvider::new(|_| Ok(ChatResponse::default())).with_chunks(["x"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = agent().stream(&provider, "q", &cancel, |_| {}).await;
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_request_is_streaming() {
        let provider = MockProvider::new(|_| Ok(ChatResponse::default())).with_chunks(["ok"]);
        let outcome = agent()
            .stream(&provider, "q", &CancellationToken::new(), |_| {})
            .await
            .unwrap_or_else(|e| panic!("stream: {e}"));
        assert_eq!(outcome.answer, "ok");
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].stream);
    }
}
