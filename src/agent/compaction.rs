//! Two-tier compaction of gathered evidence and tool-call history.
//!
//! Snippets shorter than the snippet threshold are filtered keep/drop and are
//! never rewritten. Longer snippets are dropped or summarized; a summary is
//! accepted only when it is strictly shorter than its source, otherwise a
//! marked truncation is used. Batches run concurrently under a semaphore,
//! and a batch whose provider call or response parsing fails leaves its
//! snippets untouched.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

use super::config::AgentConfig;
use super::prompt::{PromptSet, SnippetGroup, build_filter_prompt, build_history_prompt};
use super::provider::LlmProvider;
use super::traits::{Agent, parse_json};
use crate::core::{EvidenceCollection, ToolOutput};
use crate::error::AgentError;

/// Prefix marking a truncated stand-in for a summary.
pub const SUMMARY_MARKER: &str = "(summarized) ";
/// Suffix of a truncated stand-in for a summary.
const ELLIPSIS: &str = "\u{2026}";

/// Which strategy a snippet is compacted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Keep or drop, never rewritten.
    Short,
    /// Drop or summarize.
    Long,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => f.write_str("short"),
            Self::Long => f.write_str("long"),
        }
    }
}

/// Outcome for one snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Keep,
    Drop,
    Summarize(String),
    Truncate(String),
}

/// Statistics from one evidence compaction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    /// Batches sent to the provider.
    pub batches: usize,
    /// Batches that failed and were left unchanged.
    pub failed_batches: usize,
    /// Snippets kept verbatim.
    pub kept: usize,
    /// Snippets removed.
    pub dropped: usize,
    /// Snippets replaced by a model summary.
    pub summarized: usize,
    /// Snippets replaced by a marked truncation.
    pub truncated: usize,
    /// Evidence size before compaction (chars).
    pub chars_before: usize,
    /// Evidence size after compaction (chars).
    pub chars_after: usize,
}

/// Statistics from one history compaction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryReport {
    /// Results replaced by a condensed version.
    pub condensed: usize,
    /// Whether the provider call or parsing failed.
    pub failed: bool,
    /// Tool-result size before compaction (chars).
    pub chars_before: usize,
    /// Tool-result size after compaction (chars).
    pub chars_after: usize,
}

/// Model role for one compaction tier.
#[derive(Debug, Clone)]
pub struct FilterAgent {
    tier: Tier,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl FilterAgent {
    /// Creates the filter role for a tier.
    #[must_use]
    pub fn new(tier: Tier, config: &AgentConfig, prompts: &PromptSet) -> Self {
        let system_prompt = match tier {
            Tier::Short => prompts.filter_short.clone(),
            Tier::Long => prompts.filter_long.clone(),
        };
        Self {
            tier,
            model: config.compaction_model.clone(),
            system_prompt,
            max_tokens: config.compaction_max_tokens,
        }
    }
}

impl Agent for FilterAgent {
    fn name(&self) -> &'static str {
        match self.tier {
            Tier::Short => "filter_short",
            Tier::Long => "filter_long",
        }
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
        self.max_tokens
    }
}

/// Model role for tool-history compaction.
#[derive(Debug, Clone)]
pub struct HistoryAgent {
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl Agent for HistoryAgent {
    fn name(&self) -> &'static str {
        "history"
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
        self.max_tokens
    }
}

/// One document's snippets inside a batch, with their source indices.
#[derive(Debug, Clone)]
struct BatchDocument {
    document_id: String,
    snippets: Vec<(usize, String)>,
}

impl BatchDocument {
    fn char_len(&self) -> usize {
        self.snippets.iter().map(|(_, s)| s.chars().count()).sum()
    }
}

/// A unit of work sent to the provider in one request.
#[derive(Debug, Clone)]
struct Batch {
    tier: Tier,
    documents: Vec<BatchDocument>,
}

impl Batch {
    fn len(&self) -> usize {
        self.documents.iter().map(|d| d.snippets.len()).sum()
    }
}

/// Shrinks an [`EvidenceCollection`] to fit a size budget.
pub struct Compactor {
    provider: Arc<dyn LlmProvider>,
    short: FilterAgent,
    long: FilterAgent,
    history: HistoryAgent,
    snippet_threshold: usize,
    max_batch_chars: usize,
    summary_fallback_chars: usize,
    max_concurrency: usize,
}

impl fmt::Debug for Compactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compactor")
            .field("provider", &self.provider.name())
            .field("snippet_threshold", &self.snippet_threshold)
            .field("max_batch_chars", &self.max_batch_chars)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl Compactor {
    /// Creates a compactor from configuration.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            provider,
            short: FilterAgent::new(Tier::Short, config, prompts),
            long: FilterAgent::new(Tier::Long, config, prompts),
            history: HistoryAgent {
                model: config.compaction_model.clone(),
                system_prompt: prompts.history.clone(),
                max_tokens: config.compaction_max_tokens,
            },
            snippet_threshold: config.snippet_threshold,
            max_batch_chars: config.max_batch_chars.max(1),
            summary_fallback_chars: config.summary_fallback_chars,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Classifies a snippet by its length in characters.
    #[must_use]
    pub fn tier_of(&self, snippet: &str) -> Tier {
        if snippet.chars().count() < self.snippet_threshold {
            Tier::Short
        } else {
            Tier::Long
        }
    }

    /// Compacts the evidence in place.
    ///
    /// Never fails: a failing batch leaves its snippets unchanged and is
    /// counted in [`CompactionReport::failed_batches`].
    pub async fn compact_evidence(
        &self,
        question: &str,
        evidence: &mut EvidenceCollection,
    ) -> CompactionReport {
        let mut report = CompactionReport {
            chars_before: evidence.evidence_chars(),
            ..CompactionReport::default()
        };

        let batches = self.plan_batches(evidence);
        report.batches = batches.len();
        if batches.is_empty() {
            report.chars_after = report.chars_before;
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(batches.len());

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let provider = Arc::clone(&self.provider);
            let agent = match batch.tier {
                Tier::Short => self.short.clone(),
                Tier::Long => self.long.clone(),
            };
            let question = question.to_string();
            let fallback_chars = self.summary_fallback_chars;

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await.map_err(|e| AgentError::Compaction {
                    message: format!("semaphore acquire failed: {e}"),
                })?;
                debug!(
                    batch = batch_idx,
                    tier = %batch.tier,
                    snippets = batch.len(),
                    "compacting batch"
                );
                run_batch(&*provider, &agent, &question, &batch, fallback_chars).await
            });
            handles.push((batch_idx, handle));
        }

        let mut decisions: HashMap<(String, usize), Decision> = HashMap::new();
        for (batch_idx, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(AgentError::Compaction {
                    message: format!("batch task failed: {e}"),
                }),
            };
            match outcome {
                Ok(batch_decisions) => {
                    for (key, decision) in batch_decisions {
                        if decisions.contains_key(&key) {
                            warn!(document_id = %key.0, index = key.1, "snippet decided twice; keeping first decision");
                            continue;
                        }
                        decisions.insert(key, decision);
                    }
                }
                Err(e) => {
                    report.failed_batches += 1;
                    warn!(batch = batch_idx, error = %e, "compaction batch failed; keeping originals");
                }
            }
        }

        apply_decisions(evidence, &decisions, &mut report);
        report.chars_after = evidence.evidence_chars();

        info!(
            batches = report.batches,
            failed = report.failed_batches,
            kept = report.kept,
            dropped = report.dropped,
            summarized = report.summarized,
            truncated = report.truncated,
            before = report.chars_before,
            after = report.chars_after,
            "evidence compacted"
        );
        report
    }

    /// Condenses the stored tool results in one pass.
    ///
    /// A condensed result replaces its original only when it is non-empty
    /// and strictly shorter. On failure nothing changes.
    pub async fn compact_history(
        &self,
        question: &str,
        evidence: &mut EvidenceCollection,
    ) -> HistoryReport {
        let chars_before = evidence.tool_result_chars();
        let mut report = HistoryReport {
            chars_before,
            chars_after: chars_before,
            ..HistoryReport::default()
        };
        if evidence.issued().is_empty() {
            return report;
        }

        let user_msg = build_history_prompt(question, evidence.issued());
        let condensed = match self.history.execute(&*self.provider, &user_msg).await {
            Ok(response) => parse_json::<HashMap<String, Value>>(&response.content),
            Err(e) => Err(e),
        };
        let condensed = match condensed {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "history compaction failed; keeping originals");
                report.failed = true;
                return report;
            }
        };

        let results = evidence.issued_mut();
        for (key, value) in condensed {
            let Ok(idx) = key.trim().parse::<usize>() else {
                continue;
            };
            let (Some(result), Some(text)) = (results.get_mut(idx), value.as_str()) else {
                continue;
            };
            let text = text.trim();
            if text.is_empty() || text.chars().count() >= result.result.char_len() {
                continue;
            }
            result.result = ToolOutput::Text(text.to_string());
            report.condensed += 1;
        }

        report.chars_after = evidence.tool_result_chars();
        info!(
            condensed = report.condensed,
            before = report.chars_before,
            after = report.chars_after,
            "tool history compacted"
        );
        report
    }

    /// Groups snippets into batches, per tier, per document, greedily.
    fn plan_batches(&self, evidence: &EvidenceCollection) -> Vec<Batch> {
        let mut short_docs = Vec::new();
        let mut long_docs = Vec::new();

        for item in evidence.evidence() {
            let mut short = Vec::new();
            let mut long = Vec::new();
            for (idx, snippet) in item.snippets.iter().enumerate() {
                match self.tier_of(snippet) {
                    Tier::Short => short.push((idx, snippet.clone())),
                    Tier::Long => long.push((idx, snippet.clone())),
                }
            }
            if !short.is_empty() {
                short_docs.push(BatchDocument {
                    document_id: item.document_id.clone(),
                    snippets: short,
                });
            }
            if !long.is_empty() {
                long_docs.push(BatchDocument {
                    document_id: item.document_id.clone(),
                    snippets: long,
                });
            }
        }

        let mut batches = self.pack(Tier::Short, short_docs);
        batches.extend(self.pack(Tier::Long, long_docs));
        batches
    }

    /// Packs whole documents into batches bounded by `max_batch_chars`.
    ///
    /// A document larger than the bound gets a batch of its own.
    fn pack(&self, tier: Tier, documents: Vec<BatchDocument>) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current: Vec<BatchDocument> = Vec::new();
        let mut current_chars = 0;

        for doc in documents {
            let doc_chars = doc.char_len();
            if !current.is_empty() && current_chars + doc_chars > self.max_batch_chars {
                batches.push(Batch {
                    tier,
                    documents: std::mem::take(&mut current),
                });
                current_chars = 0;
            }
            current_chars += doc_chars;
            current.push(doc);
        }
        if !current.is_empty() {
            batches.push(Batch {
                tier,
                documents: current,
            });
        }
        batches
    }
}

/// Runs one batch and returns a decision for every snippet it holds.
async fn run_batch(
    provider: &dyn LlmProvider,
    agent: &FilterAgent,
    question: &str,
    batch: &Batch,
    fallback_chars: usize,
) -> Result<Vec<((String, usize), Decision)>, AgentError> {
    let groups: Vec<SnippetGroup<'_>> = batch
        .documents
        .iter()
        .map(|d| SnippetGroup {
            document_id: &d.document_id,
            snippets: d.snippets.iter().map(|(i, s)| (*i, s.as_str())).collect(),
        })
        .collect();
    let user_msg = build_filter_prompt(question, &groups);

    let response = agent.execute(provider, &user_msg).await?;
    let parsed: HashMap<String, HashMap<String, Value>> = parse_json(&response.content)?;

    let mut decisions = Vec::with_capacity(batch.len());
    for doc in &batch.documents {
        let doc_decisions = parsed.get(&doc.document_id);
        for (idx, snippet) in &doc.snippets {
            let raw = doc_decisions.and_then(|m| m.get(&idx.to_string()));
            let decision = match batch.tier {
                Tier::Short => short_decision(raw),
                Tier::Long => long_decision(raw, snippet, fallback_chars),
            };
            decisions.push(((doc.document_id.clone(), *idx), decision));
        }
    }
    Ok(decisions)
}

fn action_of(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.trim().to_ascii_lowercase()),
        Value::Object(map) => map
            .get("action")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase()),
        _ => None,
    }
}

/// Short snippets: only an explicit `drop` removes them.
fn short_decision(raw: Option<&Value>) -> Decision {
    match raw.and_then(action_of).as_deref() {
        Some("drop") => Decision::Drop,
        _ => Decision::Keep,
    }
}

/// Long snippets: `drop`, a valid strictly-shorter summary, or truncation.
fn long_decision(raw: Option<&Value>, original: &str, fallback_chars: usize) -> Decision {
    if let Some(value) = raw {
        match action_of(value).as_deref() {
            Some("drop") => return Decision::Drop,
            Some("summarize") => {
                let summary = value
                    .get("summary")
                    .and_then(Value::as_str)
                    .map_or("", str::trim);
                if !summary.is_empty() && summary.chars().count() < original.chars().count() {
                    return Decision::Summarize(summary.to_string());
                }
            }
            _ => {}
        }
    }
    truncate_summary(original, fallback_chars).map_or(Decision::Keep, Decision::Truncate)
}

/// Marked prefix of `original`, or `None` if it would not be shorter.
#[must_use]
pub fn truncate_summary(original: &str, max_chars: usize) -> Option<String> {
    let mut prefix = String::new();
    let mut count = 0;
    for grapheme in original.trim().graphemes(true) {
        let len = grapheme.chars().count();
        if count + len > max_chars {
            break;
        }
        prefix.push_str(grapheme);
        count += len;
    }
    let truncated = format!("{SUMMARY_MARKER}{}{ELLIPSIS}", prefix.trim_end());
    (truncated.chars().count() < original.chars().count()).then_some(truncated)
}

/// Rewrites each document's snippets in source order from the decisions.
fn apply_decisions(
    evidence: &mut EvidenceCollection,
    decisions: &HashMap<(String, usize), Decision>,
    report: &mut CompactionReport,
) {
    let mut processed: HashSet<(String, usize)> = HashSet::new();

    for document_id in evidence.document_ids() {
        let Some(item) = evidence.get_mut(&document_id) else {
            continue;
        };
        let mut rewritten = Vec::with_capacity(item.snippets.len());
        for (idx, (snippet, line)) in item
            .snippets
            .iter()
            .zip(item.line_numbers.iter())
            .enumerate()
        {
            let key = (document_id.clone(), idx);
            let decision = if processed.insert(key.clone()) {
                decisions.get(&key).unwrap_or(&Decision::Keep)
            } else {
                &Decision::Keep
            };
            match decision {
                Decision::Keep => {
                    report.kept += 1;
                    rewritten.push((snippet.clone(), *line));
                }
                Decision::Drop => report.dropped += 1,
                Decision::Summarize(summary) => {
                    report.summarized += 1;
                    rewritten.push((summary.clone(), *line));
                }
                Decision::Truncate(text) => {
                    report.truncated += 1;
                    rewritten.push((text.clone(), *line));
                }
            }
        }
        item.replace(rewritten);
    }
    evidence.prune_empty();
}
