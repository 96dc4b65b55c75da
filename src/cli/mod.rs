//! CLI layer for citeqa.
//!
//! Provides the command-line interface using clap, with commands for
//! inspecting the corpus, running retrieval tools, parsing cited answers,
//! and asking questions.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
