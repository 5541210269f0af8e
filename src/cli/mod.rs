//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragfuse",
    version,
    about = "Hybrid retrieval and rank-fusion pipeline for loan-support RAG",
    long_about = "Ragfuse retrieves supporting documents for a conversational loan-support \
                  assistant: keyword and vector channels run concurrently, results are merged \
                  with Reciprocal Rank Fusion, deduplicated, and optionally reordered by an \
                  external rerank service."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragfuse/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve supporting documents for a query from a JSONL corpus
    Search {
        /// Query text; may embed history between sentinel markers
        query: String,

        /// Corpus file, one JSON document per line ({"id", "text", "metadata"})
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Override the configured final Top-K
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the global config path)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
