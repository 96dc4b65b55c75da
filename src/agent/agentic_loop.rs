//! Evidence-gathering tool loop.
//!
//! Each iteration sends the question, the corpus index and the tool history
//! to the model, executes the retrieval calls it requests, and merges the
//! results into an [`EvidenceCollection`]. The loop ends when the model
//! calls `stop`, requests no tools, or the iteration cap is reached. If no
//! evidence was found, a single keyword search over the whole corpus is run
//! as a fallback.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::compaction::{CompactionReport, Compactor, HistoryReport};
use super::config::AgentConfig;
use super::message::TokenUsage;
use super::prompt::{PromptSet, build_gather_prompt, build_keywords_prompt};
use super::provider::LlmProvider;
use super::tool::{ToolDefinition, ToolSet};
use super::traits::{Agent, parse_json};
use crate::core::{EvidenceCollection, ToolInvocation};
use crate::corpus::{CorpusIndex, DocumentStore};
use crate::error::AgentError;
use crate::retrieval::{RetrievalTool, ToolExecutor};

/// Model role that decides which retrieval tools to call.
#[derive(Debug, Clone)]
pub struct GatherAgent {
    model: String,
    system_prompt: String,
    max_tokens: u32,
    tools: ToolSet,
}

impl GatherAgent {
    /// Creates the gathering role from configuration.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            model: config.gather_model.clone(),
            system_prompt: prompts.gather.clone(),
            max_tokens: config.gather_max_tokens,
            tools: ToolSet::retrieval(),
        }
    }
}

impl Agent for GatherAgent {
    fn name(&self) -> &'static str {
        "gather"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.definitions().to_vec()
    }
}

/// Model role that extracts fallback search keywords.
#[derive(Debug, Clone)]
pub struct KeywordAgent {
    model: String,
    system_prompt: String,
    max_keywords: usize,
}

impl KeywordAgent {
    /// Creates the keyword role from configuration.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            model: config.gather_model.clone(),
            system_prompt: prompts.keywords.clone(),
            max_keywords: config.max_keywords.max(1),
        }
    }
}

impl Agent for KeywordAgent {
    fn name(&self) -> &'static str {
        "keywords"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        256
    }
}

/// Why the tool loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model called `stop`.
    StopTool,
    /// The model requested no tool calls.
    NoToolCalls,
    /// The iteration cap was reached.
    MaxIterations,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopTool => f.write_str("stop tool"),
            Self::NoToolCalls => f.write_str("no tool calls"),
            Self::MaxIterations => f.write_str("max iterations"),
        }
    }
}

/// Result of a gathering run.
#[derive(Debug, Clone)]
pub struct GatherOutcome {
    /// Collected evidence and tool history.
    pub evidence: EvidenceCollection,
    /// Why the tool loop ended.
    pub stop_reason: StopReason,
    /// Iterations that called the provider.
    pub iterations: usize,
    /// Duplicate calls that were skipped.
    pub duplicates_skipped: usize,
    /// Keywords searched by the fallback, if it ran.
    pub fallback_keywords: Option<Vec<String>>,
    /// History compaction passes run mid-loop.
    pub history_compactions: Vec<HistoryReport>,
    /// Evidence compaction, if the final evidence exceeded the threshold.
    pub compaction: Option<CompactionReport>,
    /// Token usage of gathering and keyword calls.
    pub usage: TokenUsage,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordResponse {
    Object { keywords: Vec<String> },
    List(Vec<String>),
}

impl KeywordResponse {
    fn into_keywords(self) -> Vec<String> {
        match self {
            Self::Object { keywords } | Self::List(keywords) => keywords,
        }
    }
}

/// Drives the gathering loop for one question.
pub struct Gatherer {
    provider: Arc<dyn LlmProvider>,
    agent: GatherAgent,
    keywords: KeywordAgent,
    compactor: Compactor,
    max_iterations: usize,
    tool_result_threshold: usize,
    chat_threshold: usize,
}

impl fmt::Debug for Gatherer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gatherer")
            .field("provider", &self.provider.name())
            .field("max_iterations", &self.max_iterations)
            .field("tool_result_threshold", &self.tool_result_threshold)
            .field("chat_threshold", &self.chat_threshold)
            .finish_non_exhaustive()
    }
}

impl Gatherer {
    /// Creates a gatherer from configuration.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            compactor: Compactor::new(Arc::clone(&provider), config, prompts),
            provider,
            agent: GatherAgent::new(config, prompts),
            keywords: KeywordAgent::new(config, prompts),
            max_iterations: config.max_iterations.max(1),
            tool_result_threshold: config.tool_result_threshold,
            chat_threshold: config.chat_threshold,
        }
    }

    /// Overrides the iteration cap for this gatherer.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = if max_iterations == 0 { 1 } else { max_iterations };
        self
    }

    /// Returns the compactor used for history and evidence.
    #[must_use]
    pub const fn compactor(&self) -> &Compactor {
        &self.compactor
    }

    /// Gathers evidence for `question`.
    ///
    /// Runs the tool loop, the keyword fallback when nothing was found, and
    /// evidence compaction when the result exceeds the chat threshold.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Cancelled`] if `cancel` fires, or the provider
    /// error of a failed gathering or keyword call.
    pub async fn gather(
        &self,
        store: &dyn DocumentStore,
        question: &str,
        index: &CorpusIndex,
        cancel: &CancellationToken,
    ) -> Result<GatherOutcome, AgentError> {
        let mut outcome = GatherOutcome {
            evidence: EvidenceCollection::new(),
            stop_reason: StopReason::MaxIterations,
            iterations: 0,
            duplicates_skipped: 0,
            fallback_keywords: None,
            history_compactions: Vec::new(),
            compaction: None,
            usage: TokenUsage::default(),
        };

        self.run_loop(store, question, index, cancel, &mut outcome)
            .await?;

        if outcome.evidence.is_empty() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let keywords = self
                .keyword_fallback(store, question, &mut outcome)
                .await?;
            outcome.fallback_keywords = Some(keywords);
        }

        if outcome.evidence.evidence_chars() > self.chat_threshold {
            let report = self
                .compactor
                .compact_evidence(question, &mut outcome.evidence)
                .await;
            outcome.compaction = Some(report);
        }

        info!(
            iterations = outcome.iterations,
            stop_reason = %outcome.stop_reason,
            documents = outcome.evidence.document_ids().len(),
            snippets = outcome.evidence.snippet_count(),
            tool_calls = outcome.evidence.issued().len(),
            fallback = outcome.fallback_keywords.is_some(),
            "gathering complete"
        );
        Ok(outcome)
    }

    /// Runs the tool loop alone, without fallback or final compaction.
    ///
    /// # Errors
    ///
    /// Same as [`Gatherer::gather`].
    pub async fn run_loop(
        &self,
        store: &dyn DocumentStore,
        question: &str,
        index: &CorpusIndex,
        cancel: &CancellationToken,
        outcome: &mut GatherOutcome,
    ) -> Result<(), AgentError> {
        let executor = ToolExecutor::new(store);
        // History size after a pass that condensed nothing; retried only once
        // new results push past it.
        let mut stalled_at: Option<usize> = None;

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let history_chars = outcome.evidence.tool_result_chars();
            if history_chars > self.tool_result_threshold
                && stalled_at.is_none_or(|at| history_chars > at)
            {
                let report = self
                    .compactor
                    .compact_history(question, &mut outcome.evidence)
                    .await;
                stalled_at = (report.failed || report.condensed == 0)
                    .then(|| outcome.evidence.tool_result_chars());
                if stalled_at.is_some() {
                    debug!(iteration, history_chars, "history condensation made no progress");
                }
                outcome.history_compactions.push(report);
            } else if history_chars > self.tool_result_threshold {
                debug!(iteration, history_chars, "skipping stalled history condensation");
            }

            let user_msg = build_gather_prompt(
                question,
                index,
                iteration,
                self.max_iterations,
                outcome.evidence.issued(),
            );
            let response = self.agent.execute(&*self.provider, &user_msg).await?;
            outcome.iterations = iteration;
            outcome.usage.accumulate(response.usage);

            if response.tool_calls.is_empty() {
                debug!(iteration, "model requested no tools");
                outcome.stop_reason = StopReason::NoToolCalls;
                return Ok(());
            }

            let mut stop = false;
            let mut batch_keys = HashSet::new();
            let mut pending = Vec::with_capacity(response.tool_calls.len());
            for tool_call in &response.tool_calls {
                let invocation = tool_call.invocation();
                if invocation.name == RetrievalTool::Stop.name() {
                    stop = true;
                    continue;
                }
                if outcome.evidence.has_issued(&invocation)
                    || !batch_keys.insert(invocation.dedup_key())
                {
                    warn!(call = %invocation.label(), "skipping duplicate tool call");
                    outcome.duplicates_skipped += 1;
                    continue;
                }
                pending.push(invocation);
            }

            debug!(
                iteration,
                calls = pending.len(),
                stop,
                "executing tool calls"
            );
            let results: Vec<_> = pending
                .par_iter()
                .map(|invocation| executor.execute(invocation))
                .collect();
            for result in results {
                debug!(
                    call = %result.call.label(),
                    is_error = result.result.is_error(),
                    "tool execution complete"
                );
                outcome.evidence.record(result);
            }

            if stop {
                outcome.stop_reason = StopReason::StopTool;
                return Ok(());
            }
        }

        outcome.stop_reason = StopReason::MaxIterations;
        Ok(())
    }

    /// Asks the model for keywords and searches the whole corpus for each.
    ///
    /// An unparseable keyword response falls back to the question itself.
    /// Returns the keywords searched.
    ///
    /// # Errors
    ///
    /// Returns the provider error if the keyword call fails.
    pub async fn keyword_fallback(
        &self,
        store: &dyn DocumentStore,
        question: &str,
        outcome: &mut GatherOutcome,
    ) -> Result<Vec<String>, AgentError> {
        let user_msg = build_keywords_prompt(question, self.keywords.max_keywords);
        let response = self.keywords.execute(&*self.provider, &user_msg).await?;
        outcome.usage.accumulate(response.usage);

        let mut keywords = match parse_json::<KeywordResponse>(&response.content) {
            Ok(parsed) => clean_keywords(parsed.into_keywords(), self.keywords.max_keywords),
            Err(e) => {
                warn!(error = %e, "keyword response unparseable");
                Vec::new()
            }
        };
        if keywords.is_empty() {
            keywords.push(question.trim().to_string());
        }

        let invocations: Vec<ToolInvocation> = keywords
            .iter()
            .map(|keyword| {
                let mut args = Map::new();
                args.insert("query".to_string(), Value::String(keyword.clone()));
                ToolInvocation::new(RetrievalTool::SearchAllFiles.name(), args)
            })
            .filter(|invocation| !outcome.evidence.has_issued(invocation))
            .collect();

        let executor = ToolExecutor::new(store);
        let results: Vec<_> = invocations
            .par_iter()
            .map(|invocation| executor.execute(invocation))
            .collect();
        for result in results {
            outcome.evidence.record(result);
        }

        info!(
            keywords = ?keywords,
            snippets = outcome.evidence.snippet_count(),
            "keyword fallback complete"
        );
        Ok(keywords)
    }
}

/// Trims, deduplicates and caps keywords, preserving order.
fn clean_keywords(raw: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && seen.insert(k.to_lowercase()))
        .take(max)
        .collect()
}
