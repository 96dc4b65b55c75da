//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// citeqa: answer questions over a document corpus with verifiable citations.
///
/// Gathers evidence through retrieval tools, compacts it, and streams an
/// answer whose citations can be checked against the source documents.
#[derive(Parser, Debug)]
#[command(name = "citeqa")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory containing the corpus (`.txt`/`.md` files with optional
    /// `.meta.json` sidecars).
    #[arg(short, long, env = "CITEQA_DOCS", default_value = ".", global = true)]
    pub docs: PathBuf,

    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the corpus index: IDs, titles, sizes and metadata.
    #[command(after_help = r"Examples:
  citeqa --docs ./papers index
  citeqa --docs ./papers --format json index | jq 'keys'
")]
    Index,

    /// Run one retrieval tool directly against the corpus.
    #[command(after_help = r#"Examples:
  citeqa tool read_abstract --args '{"document_id": "attention"}'
  citeqa tool search_file --args '{"document_id": "attention", "pattern": "softmax"}'
  citeqa tool view_file --args '{"document_id": "attention", "start": 10, "end": 20}'
  citeqa tool search_all_files --args '{"query": "layer norm"}'
"#)]
    Tool {
        /// Tool name (`read_file`, `search_file`, `view_file`,
        /// `read_abstract`, `search_all_files`).
        name: String,

        /// Tool arguments as a JSON object.
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Split a saved answer into prose and parsed citations.
    ///
    /// Reads from FILE, or stdin when omitted.
    #[command(after_help = r"Examples:
  citeqa cite answer.txt
  cat answer.txt | citeqa --format json cite
")]
    Cite {
        /// File holding the answer text.
        file: Option<PathBuf>,
    },

    /// Answer a question from the corpus with citations.
    ///
    /// Streams the answer to stdout as it arrives. Requires an
    /// OpenAI-compatible API key. Ctrl-C stops the answer early.
    #[cfg(feature = "agent")]
    #[command(after_help = r#"Examples:
  citeqa --docs ./papers ask "Why does attention scale quadratically?"
  citeqa ask "Summarize the method" --max-iterations 3
  citeqa ask "Is this claim supported?" --reference "The model has 65M parameters."
  OPENAI_API_KEY=sk-... citeqa --format json ask "What datasets were used?"
"#)]
    Ask {
        /// The question to answer.
        question: String,

        /// User-supplied reference text, numbered from 1 in order given.
        #[arg(short, long = "reference")]
        references: Vec<String>,

        /// Maximum gathering iterations.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Model for the gathering loop and keyword extraction.
        #[arg(long)]
        gather_model: Option<String>,

        /// Model for compaction prompts.
        #[arg(long)]
        compaction_model: Option<String>,

        /// Model for the final answer.
        #[arg(long)]
        answer_model: Option<String>,

        /// Maximum concurrent compaction requests.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,
    },

    /// Write the default prompt templates for customization.
    ///
    /// Existing files are never overwritten.
    #[cfg(feature = "agent")]
    #[command(after_help = r"Examples:
  citeqa init-prompts
  citeqa init-prompts --dir ./prompts
")]
    InitPrompts {
        /// Target directory (defaults to `~/.config/citeqa/prompts`).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
