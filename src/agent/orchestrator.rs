//! Question-answering pipeline.
//!
//! Coordinates the full flow for one question: gather evidence with the
//! tool loop, compact it if needed, then stream a cited answer.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::agentic_loop::{GatherOutcome, Gatherer, StopReason};
use super::answer::AnswerAgent;
use super::compaction::CompactionReport;
use super::config::AgentConfig;
use super::prompt::{PromptSet, build_answer_prompt};
use super::provider::LlmProvider;
use crate::core::{Citation, StreamEvent, number_references};
use crate::corpus::DocumentStore;
use crate::error::{AgentError, Result};

/// Maximum question length in bytes.
pub const MAX_QUESTION_LEN: usize = 10_000;

/// Result of one `ask` run.
#[derive(Debug, Clone, Serialize)]
pub struct AskResult {
    /// Answer prose with the evidence block removed.
    pub answer: String,
    /// Citations kept after scope filtering.
    pub citations: Vec<Citation>,
    /// Documents that contributed evidence.
    pub documents_consulted: Vec<String>,
    /// Snippets passed to the answer model.
    pub snippets: usize,
    /// Distinct tool calls executed.
    pub tool_calls: usize,
    /// Gathering iterations that called the provider.
    pub iterations: usize,
    /// Why the tool loop ended.
    pub stop_reason: StopReason,
    /// Keywords searched by the fallback, if it ran.
    pub fallback_keywords: Option<Vec<String>>,
    /// Evidence compaction statistics, if it ran.
    pub compaction: Option<CompactionReport>,
    /// Whether the answer stream was cancelled.
    pub cancelled: bool,
    /// Wall-clock duration.
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Orchestrates gathering and answering.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
    prompts: PromptSet,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates a new orchestrator with the given provider and configuration.
    ///
    /// Loads prompt templates from [`AgentConfig::prompt_dir`], falling back
    /// to compiled-in defaults.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            provider,
            config,
            prompts,
        }
    }

    /// Replaces the prompt set.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    /// Answers `question` from the documents in `store`.
    ///
    /// Answer text is forwarded to `on_event` as it streams; a single
    /// [`StreamEvent::Citations`] event with the filtered citations follows
    /// unless the stream was cancelled. When more than one document is in
    /// scope, citations without a document id are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidQuestion`] for an empty or oversized
    /// question, [`AgentError::Cancelled`] if `cancel` fires before the
    /// answer starts, and any corpus or provider error.
    pub async fn ask<F>(
        &self,
        store: &dyn DocumentStore,
        question: &str,
        references: &[String],
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<AskResult>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        validate_question(question)?;
        let start = Instant::now();

        let index = store.index()?;
        let gatherer = Gatherer::new(Arc::clone(&self.provider), &self.config, &self.prompts);
        let GatherOutcome {
            evidence,
            stop_reason,
            iterations,
            fallback_keywords,
            compaction,
            ..
        } = gatherer.gather(store, question, &index, cancel).await?;

        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }

        let multi_document = store.len() > 1;
        let references = number_references(references.iter().map(|r| (None, r.as_str())));
        let user_msg = build_answer_prompt(question, &evidence.render(), &references, multi_document);

        let answer_agent = AnswerAgent::new(&self.config, &self.prompts);
        let outcome = answer_agent
            .stream(&*self.provider, &user_msg, cancel, |event| {
                if matches!(event, StreamEvent::Content(_)) {
                    on_event(event);
                }
            })
            .await?;

        let citations = scope_citations(outcome.citations, multi_document);
        if !outcome.cancelled {
            on_event(&StreamEvent::Citations(citations.clone()));
        }

        let result = AskResult {
            answer: outcome.answer,
            citations,
            documents_consulted: evidence.document_ids(),
            snippets: evidence.snippet_count(),
            tool_calls: evidence.issued().len(),
            iterations,
            stop_reason,
            fallback_keywords,
            compaction,
            cancelled: outcome.cancelled,
            elapsed: start.elapsed(),
        };

        info!(
            documents = result.documents_consulted.len(),
            snippets = result.snippets,
            tool_calls = result.tool_calls,
            citations = result.citations.len(),
            cancelled = result.cancelled,
            elapsed_ms = result.elapsed.as_millis(),
            "question answered"
        );
        Ok(result)
    }
}

fn validate_question(question: &str) -> std::result::Result<(), AgentError> {
    if question.trim().is_empty() {
        return Err(AgentError::InvalidQuestion {
            message: "question cannot be empty".to_string(),
        });
    }
    if question.len() > MAX_QUESTION_LEN {
        return Err(AgentError::InvalidQuestion {
            message: format!(
                "question exceeds maximum length ({} bytes, max {MAX_QUESTION_LEN})",
                question.len()
            ),
        });
    }
    Ok(())
}

/// Drops citations lacking a document id when several documents are in scope.
fn scope_citations(citations: Vec<Citation>, multi_document: bool) -> Vec<Citation> {
    if !multi_document {
        return citations;
    }
    citations
        .into_iter()
        .filter(|citation| {
            if citation.document_id.is_some() {
                return true;
            }
            warn!(
                key = citation.key,
                "dropping citation without document id in multi-document scope"
            );
            false
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agent::message::ChatResponse;
    use crate::agent::testing::{MockProvider, RoleKind, call, role_of};
    use crate::corpus::{Document, MemoryStore};
    use crate::error::Error;

    fn orchestrator(provider: Arc<MockProvider>) -> Orchestrator {
        let config = AgentConfig::builder()
            .api_key("test")
            .max_iterations(2)
            .build()
            .unwrap_or_else(|e| panic!("config: {e}"));
        Orchestrator::new(provider, config).with_prompts(PromptSet::defaults())
    }

    fn two_documents() -> MemoryStore {
        [
            Document::new("alpha", "Alpha", "Attention is all you need."),
            Document::new("beta", "Beta", "Recurrence is slow."),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_ask_streams_answer_and_filters_citations() {
        let provider = Arc::new(
            MockProvider::new(|request| match role_of(request) {
                RoleKind::Gather if request.user_content().is_some_and(|u| u.contains("(no tool calls yet)")) => {
                    Ok(ChatResponse::with_tool_calls(vec![call(
                        "search_all_files",
                        &json!({"query": "attention"}),
                    )]))
                }
                _ => Ok(ChatResponse::default()),
            })
            .with_chunks([
                "Attention helps @cite[1].\n---EVIDENCE---\n@cite[1|alpha]\n\"Attention is all you need.\"\n",
                "@cite[2]\n\"orphan\"\n---END-EVIDENCE---\n",
            ]),
        );
        let orchestrator = orchestrator(Arc::clone(&provider));
        let mut events = Vec::new();

        let result = orchestrator
            .ask(
                &two_documents(),
                "What helps?",
                &[],
                &CancellationToken::new(),
                |event| events.push(event.clone()),
            )
            .await
            .unwrap_or_else(|e| panic!("ask: {e}"));

        assert_eq!(result.answer, "Attention helps @cite[1].\n");
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].document_id.as_deref(), Some("alpha"));
        assert_eq!(result.documents_consulted, vec!["alpha"]);
        assert_eq!(result.tool_calls, 1);
        assert_eq!(result.stop_reason, StopReason::NoToolCalls);
        assert!(!result.cancelled);

        let citation_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Citations(_)))
            .collect();
        assert_eq!(citation_events.len(), 1);
        assert!(matches!(events.last(), Some(StreamEvent::Citations(c)) if c.len() == 1));

        let answer_request = provider
            .requests()
            .into_iter()
            .find(|r| role_of(r) == RoleKind::Answer)
            .unwrap_or_else(|| panic!("no answer request"));
        let user = answer_request.user_content().unwrap_or_default();
        assert!(user.contains("@cite[n|document-id]"));
        assert!(user.contains("Attention is all you need."));
    }

    #[tokio::test]
    async fn test_single_document_keeps_unscoped_citations() {
        let provider = Arc::new(
            MockProvider::new(|_| Ok(ChatResponse::default())).with_chunks([
                "Yes @cite[1].\n---EVIDENCE---\n@cite[1]\n\"a quote\"\n---END-EVIDENCE---",
            ]),
        );
        let store: MemoryStore = [Document::new("only", "Only", "a quote\nmore text")]
            .into_iter()
            .collect();

        let result = orchestrator(provider)
            .ask(&store, "quote?", &["a quote".to_string()], &CancellationToken::new(), |_| {})
            .await
            .unwrap_or_else(|e| panic!("ask: {e}"));
        assert_eq!(result.citations.len(), 1);
        assert!(result.citations[0].document_id.is_none());
    }

    #[tokio::test]
    async fn test_rejects_invalid_questions() {
        let provider = Arc::new(MockProvider::new(|_| Ok(ChatResponse::default())));
        let orchestrator = orchestrator(Arc::clone(&provider));
        let store = two_documents();
        let cancel = CancellationToken::new();

        let empty = orchestrator.ask(&store, "  ", &[], &cancel, |_| {}).await;
        assert!(matches!(
            empty,
            Err(Error::Agent(AgentError::InvalidQuestion { .. }))
        ));

        let long = "x".repeat(MAX_QUESTION_LEN + 1);
        let oversized = orchestrator.ask(&store, &long, &[], &cancel, |_| {}).await;
        assert!(matches!(
            oversized,
            Err(Error::Agent(AgentError::InvalidQuestion { .. }))
        ));
        assert!(provider.requests().is_empty());
    }

    #[test]
    fn test_scope_citations() {
        let citations = vec![
            Citation::new(1, "a", Some("doc".to_string())),
            Citation::new(2, "b", None),
        ];
        assert_eq!(scope_citations(citations.clone(), false).len(), 2);
        let scoped = scope_citations(citations, true);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].key, 1);
    }
}
