//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

use std::fmt::Write as FmtWrite;
use std::io::{self, Read};
use std::path::Path;

use serde_json::{Map, Value};

use crate::cli::output::{OutputFormat, format_cited_answer, format_index, format_tool_result};
use crate::cli::parser::{Cli, Commands};
use crate::core::{ToolCallResult, ToolInvocation, split_answer};
use crate::corpus::{DocumentStore, MemoryStore, load_dir};
use crate::error::{CommandError, Result};
use crate::retrieval::{RetrievalCall, RetrievalTool, ToolExecutor};

/// Parameters for the `ask` command.
#[cfg(feature = "agent")]
#[derive(Debug, Clone, Default)]
pub struct AskCommandParams<'a> {
    /// The question to answer.
    pub question: &'a str,
    /// User-supplied reference texts.
    pub references: &'a [String],
    /// Maximum gathering iterations.
    pub max_iterations: Option<usize>,
    /// Model for the gathering loop.
    pub gather_model: Option<&'a str>,
    /// Model for compaction.
    pub compaction_model: Option<&'a str>,
    /// Model for the answer.
    pub answer_model: Option<&'a str>,
    /// Maximum concurrent compaction requests.
    pub concurrency: Option<usize>,
    /// Directory containing prompt template files.
    pub prompt_dir: Option<&'a Path>,
}

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success. `ask` in text mode writes the
/// answer to stdout while it streams and returns only the trailer.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Index => cmd_index(&cli.docs, format),
        Commands::Tool { name, args } => cmd_tool(&cli.docs, name, args, format),
        Commands::Cite { file } => cmd_cite(file.as_deref(), format),
        #[cfg(feature = "agent")]
        Commands::Ask {
            question,
            references,
            max_iterations,
            gather_model,
            compaction_model,
            answer_model,
            concurrency,
            prompt_dir,
        } => {
            let params = AskCommandParams {
                question,
                references,
                max_iterations: *max_iterations,
                gather_model: gather_model.as_deref(),
                compaction_model: compaction_model.as_deref(),
                answer_model: answer_model.as_deref(),
                concurrency: *concurrency,
                prompt_dir: prompt_dir.as_deref(),
            };
            cmd_ask(&cli.docs, &params, format)
        }
        #[cfg(feature = "agent")]
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Loads the corpus, refusing an empty one.
fn open_corpus(docs: &Path) -> Result<MemoryStore> {
    let store = load_dir(docs)?;
    if store.is_empty() {
        return Err(CommandError::ExecutionFailed(format!(
            "no documents found in {}",
            docs.display()
        ))
        .into());
    }
    Ok(store)
}

fn cmd_index(docs: &Path, format: OutputFormat) -> Result<String> {
    let store = load_dir(docs)?;
    let index = store.index()?;
    Ok(format_index(&index, format))
}

fn cmd_tool(docs: &Path, name: &str, args: &str, format: OutputFormat) -> Result<String> {
    let tool: RetrievalTool = name.parse()?;
    if tool == RetrievalTool::Stop {
        return Err(CommandError::InvalidArgument(
            "stop only ends a gathering loop and cannot be run directly".to_string(),
        )
        .into());
    }

    let args: Map<String, Value> = serde_json::from_str(args).map_err(|e| {
        CommandError::InvalidArgument(format!("--args must be a JSON object: {e}"))
    })?;
    let invocation = ToolInvocation::new(tool.name(), args);
    let call = RetrievalCall::parse(&invocation)?;

    let store = open_corpus(docs)?;
    let result = ToolExecutor::new(&store).run(&call)?;

    Ok(format_tool_result(
        &ToolCallResult {
            call: invocation,
            result,
        },
        format,
    ))
}

fn cmd_cite(file: Option<&Path>, format: OutputFormat) -> Result<String> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            CommandError::ExecutionFailed(format!("failed to read {}: {e}", path.display()))
        })?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let (content, citations) = split_answer(&text);
    Ok(format_cited_answer(&content, &citations, format))
}

#[cfg(feature = "agent")]
fn cmd_ask(docs: &Path, params: &AskCommandParams<'_>, format: OutputFormat) -> Result<String> {
    use std::io::Write;

    use tokio_util::sync::CancellationToken;
    use tracing::warn;

    use crate::agent::{AgentConfig, Orchestrator, create_provider};
    use crate::core::{StreamEvent, format_citations};

    let store = open_corpus(docs)?;

    // Build agent configuration from env + CLI overrides
    let mut builder = AgentConfig::builder().from_env();
    if let Some(n) = params.max_iterations {
        builder = builder.max_iterations(n);
    }
    if let Some(n) = params.concurrency {
        builder = builder.max_concurrency(n);
    }
    if let Some(model) = params.gather_model {
        builder = builder.gather_model(model);
    }
    if let Some(model) = params.compaction_model {
        builder = builder.compaction_model(model);
    }
    if let Some(model) = params.answer_model {
        builder = builder.answer_model(model);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }

    let config = builder.build().map_err(|e| {
        CommandError::ExecutionFailed(format!("Agent configuration error: {e}"))
    })?;
    let provider = create_provider(&config)
        .map_err(|e| CommandError::ExecutionFailed(format!("Provider creation failed: {e}")))?;
    let orchestrator = Orchestrator::new(provider, config);

    // Create tokio runtime as sync/async bridge
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            signal_token.cancel();
        }
    });

    let stream_text = format == OutputFormat::Text;
    let mut stdout = io::stdout();
    let result = rt.block_on(orchestrator.ask(
        &store,
        params.question,
        params.references,
        &cancel,
        |event| {
            if let (true, StreamEvent::Content(text)) = (stream_text, event) {
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
        },
    ))?;

    match format {
        OutputFormat::Text => {
            let mut output = String::from("\n");
            if !result.citations.is_empty() {
                output.push('\n');
                output.push_str(&format_citations(&result.citations));
            }
            let fallback = result
                .fallback_keywords
                .as_ref()
                .map(|k| format!(" | Fallback keywords: {}", k.join(", ")))
                .unwrap_or_default();
            let cancelled = if result.cancelled { " | cancelled" } else { "" };
            let _ = write!(
                output,
                "\n---\nDocuments: {} | Snippets: {} | Tool calls: {} | Iterations: {} ({}){fallback} | Time: {:.1}s{cancelled}\n",
                result.documents_consulted.len(),
                result.snippets,
                result.tool_calls,
                result.iterations,
                result.stop_reason,
                result.elapsed.as_secs_f64()
            );
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&result)),
    }
}

#[cfg(feature = "agent")]
fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    use crate::agent::PromptSet;

    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                let _ = writeln!(
                    output,
                    "  {}",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                );
            }
            output.push_str("\nEdit these files to customize the prompts.\n");
            Ok(output)
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}
