//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;

use crate::error::AgentError;

/// Default gathering iterations.
const DEFAULT_MAX_ITERATIONS: usize = 5;
/// Accumulated tool-result size that triggers history compaction.
const DEFAULT_TOOL_RESULT_THRESHOLD: usize = 40_000;
/// Final evidence size that triggers evidence compaction.
const DEFAULT_CHAT_THRESHOLD: usize = 120_000;
/// Snippets shorter than this are filtered keep/drop; longer ones drop/summarize.
const DEFAULT_SNIPPET_THRESHOLD: usize = 1_000;
/// Maximum characters of snippet text per compaction batch.
const DEFAULT_MAX_BATCH_CHARS: usize = 24_000;
/// Length of the truncation used when a summary is missing or invalid.
const DEFAULT_SUMMARY_FALLBACK_CHARS: usize = 400;
/// Default maximum concurrent compaction requests.
const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Maximum keywords requested by the fallback search.
const DEFAULT_MAX_KEYWORDS: usize = 5;
/// Default gathering max tokens.
const DEFAULT_GATHER_MAX_TOKENS: u32 = 2048;
/// Default compaction max tokens.
const DEFAULT_COMPACTION_MAX_TOKENS: u32 = 4096;
/// Default answer max tokens.
const DEFAULT_ANSWER_MAX_TOKENS: u32 = 4096;

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model driving the tool-calling loop and keyword extraction.
    pub gather_model: String,
    /// Model used for compaction prompts.
    pub compaction_model: String,
    /// Model producing the streamed answer.
    pub answer_model: String,
    /// Maximum gathering iterations.
    pub max_iterations: usize,
    /// Tool-result size (chars) above which history is compacted mid-loop.
    pub tool_result_threshold: usize,
    /// Evidence size (chars) above which evidence is compacted before answering.
    pub chat_threshold: usize,
    /// Short/long snippet boundary (chars).
    pub snippet_threshold: usize,
    /// Maximum snippet characters per compaction batch.
    pub max_batch_chars: usize,
    /// Truncation length for summaries that fail validation.
    pub summary_fallback_chars: usize,
    /// Maximum concurrent compaction requests.
    pub max_concurrency: usize,
    /// Maximum keywords for the fallback search.
    pub max_keywords: usize,
    /// Maximum tokens for gathering responses.
    pub gather_max_tokens: u32,
    /// Maximum tokens for compaction responses.
    pub compaction_max_tokens: u32,
    /// Maximum tokens for the answer.
    pub answer_max_tokens: u32,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found, or
    /// [`AgentError::Config`] for inconsistent values.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    gather_model: Option<String>,
    compaction_model: Option<String>,
    answer_model: Option<String>,
    max_iterations: Option<usize>,
    tool_result_threshold: Option<usize>,
    chat_threshold: Option<usize>,
    snippet_threshold: Option<usize>,
    max_batch_chars: Option<usize>,
    summary_fallback_chars: Option<usize>,
    max_concurrency: Option<usize>,
    max_keywords: Option<usize>,
    gather_max_tokens: Option<u32>,
    compaction_max_tokens: Option<u32>,
    answer_max_tokens: Option<u32>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("CITEQA_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("CITEQA_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("CITEQA_BASE_URL"))
                .ok();
        }
        if self.gather_model.is_none() {
            self.gather_model = std::env::var("CITEQA_GATHER_MODEL").ok();
        }
        if self.compaction_model.is_none() {
            self.compaction_model = std::env::var("CITEQA_COMPACTION_MODEL").ok();
        }
        if self.answer_model.is_none() {
            self.answer_model = std::env::var("CITEQA_ANSWER_MODEL").ok();
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse("CITEQA_MAX_ITERATIONS");
        }
        if self.tool_result_threshold.is_none() {
            self.tool_result_threshold = env_parse("CITEQA_TOOL_RESULT_THRESHOLD");
        }
        if self.chat_threshold.is_none() {
            self.chat_threshold = env_parse("CITEQA_CHAT_THRESHOLD");
        }
        if self.max_batch_chars.is_none() {
            self.max_batch_chars = env_parse("CITEQA_MAX_BATCH_CHARS");
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("CITEQA_MAX_CONCURRENCY");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("CITEQA_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the gathering model.
    #[must_use]
    pub fn gather_model(mut self, model: impl Into<String>) -> Self {
        self.gather_model = Some(model.into());
        self
    }

    /// Sets the compaction model.
    #[must_use]
    pub fn compaction_model(mut self, model: impl Into<String>) -> Self {
        self.compaction_model = Some(model.into());
        self
    }

    /// Sets the answer model.
    #[must_use]
    pub fn answer_model(mut self, model: impl Into<String>) -> Self {
        self.answer_model = Some(model.into());
        self
    }

    /// Sets the maximum gathering iterations.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the tool-result compaction threshold.
    #[must_use]
    pub const fn tool_result_threshold(mut self, chars: usize) -> Self {
        self.tool_result_threshold = Some(chars);
        self
    }

    /// Sets the evidence compaction threshold.
    #[must_use]
    pub const fn chat_threshold(mut self, chars: usize) -> Self {
        self.chat_threshold = Some(chars);
        self
    }

    /// Sets the short/long snippet boundary.
    #[must_use]
    pub const fn snippet_threshold(mut self, chars: usize) -> Self {
        self.snippet_threshold = Some(chars);
        self
    }

    /// Sets the maximum characters per compaction batch.
    #[must_use]
    pub const fn max_batch_chars(mut self, chars: usize) -> Self {
        self.max_batch_chars = Some(chars);
        self
    }

    /// Sets the fallback truncation length for summaries.
    #[must_use]
    pub const fn summary_fallback_chars(mut self, chars: usize) -> Self {
        self.summary_fallback_chars = Some(chars);
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the maximum fallback keywords.
    #[must_use]
    pub const fn max_keywords(mut self, n: usize) -> Self {
        self.max_keywords = Some(n);
        self
    }

    /// Sets the gathering max tokens.
    #[must_use]
    pub const fn gather_max_tokens(mut self, n: u32) -> Self {
        self.gather_max_tokens = Some(n);
        self
    }

    /// Sets the compaction max tokens.
    #[must_use]
    pub const fn compaction_max_tokens(mut self, n: u32) -> Self {
        self.compaction_max_tokens = Some(n);
        self
    }

    /// Sets the answer max tokens.
    #[must_use]
    pub const fn answer_max_tokens(mut self, n: u32) -> Self {
        self.answer_max_tokens = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, and
    /// [`AgentError::Config`] if the chat threshold does not exceed the
    /// tool-result threshold or a count is zero.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        let config = AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            gather_model: self
                .gather_model
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            compaction_model: self
                .compaction_model
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            answer_model: self.answer_model.unwrap_or_else(|| "gpt-4o".to_string()),
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            tool_result_threshold: self
                .tool_result_threshold
                .unwrap_or(DEFAULT_TOOL_RESULT_THRESHOLD),
            chat_threshold: self.chat_threshold.unwrap_or(DEFAULT_CHAT_THRESHOLD),
            snippet_threshold: self.snippet_threshold.unwrap_or(DEFAULT_SNIPPET_THRESHOLD),
            max_batch_chars: self.max_batch_chars.unwrap_or(DEFAULT_MAX_BATCH_CHARS),
            summary_fallback_chars: self
                .summary_fallback_chars
                .unwrap_or(DEFAULT_SUMMARY_FALLBACK_CHARS),
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            max_keywords: self.max_keywords.unwrap_or(DEFAULT_MAX_KEYWORDS),
            gather_max_tokens: self.gather_max_tokens.unwrap_or(DEFAULT_GATHER_MAX_TOKENS),
            compaction_max_tokens: self
                .compaction_max_tokens
                .unwrap_or(DEFAULT_COMPACTION_MAX_TOKENS),
            answer_max_tokens: self.answer_max_tokens.unwrap_or(DEFAULT_ANSWER_MAX_TOKENS),
            prompt_dir: self.prompt_dir,
        };

        if config.chat_threshold <= config.tool_result_threshold {
            return Err(AgentError::Config {
                message: format!(
                    "chat_threshold ({}) must exceed tool_result_threshold ({})",
                    config.chat_threshold, config.tool_result_threshold
                ),
            });
        }
        if config.max_iterations == 0 {
            return Err(AgentError::Config {
                message: "max_iterations must be at least 1".to_string(),
            });
        }
        if config.max_concurrency == 0 {
            return Err(AgentError::Config {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.snippet_threshold, 1_000);
        assert_eq!(config.gather_model, "gpt-4o-mini");
        assert_eq!(config.answer_model, "gpt-4o");
        assert!(config.chat_threshold > config.tool_result_threshold);
    }

    #[test]
    fn test_builder_missing_api_key() {
        assert!(matches!(
            AgentConfig::builder().build(),
            Err(AgentError::ApiKeyMissing)
        ));
        assert!(matches!(
            AgentConfig::builder().api_key("  ").build(),
            Err(AgentError::ApiKeyMissing)
        ));
    }

    #[test]
    fn test_builder_rejects_inverted_thresholds() {
        let result = AgentConfig::builder()
            .api_key("k")
            .tool_result_threshold(500)
            .chat_threshold(500)
            .build();
        assert!(matches!(result, Err(AgentError::Config { .. })));
    }

    #[test]
    fn test_builder_rejects_zero_counts() {
        for builder in [
            AgentConfig::builder().api_key("k").max_iterations(0),
            AgentConfig::builder().api_key("k").max_concurrency(0),
        ] {
            assert!(matches!(builder.build(), Err(AgentError::Config { .. })));
        }
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("custom")
            .gather_model("small")
            .max_iterations(2)
            .max_batch_chars(100)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "custom");
        assert_eq!(config.gather_model, "small");
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.max_batch_chars, 100);
    }
}
