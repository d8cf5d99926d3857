//! # CVE Knowledge Base CLI (`cvekb`)
//!
//! The `cvekb` binary drives the ingestion pipeline and the question
//! answering front ends.
//!
//! ## Usage
//!
//! ```bash
//! cvekb --config ./config/cvekb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cvekb normalize` | Filter raw feed files into normalized files |
//! | `cvekb build` | Normalize, load, build the graph and save it |
//! | `cvekb graph stats` | Node, edge and per-relation counts |
//! | `cvekb graph show <ID>` | One vulnerability and its edges |
//! | `cvekb graph diff <OTHER>` | Compare the graph with another graph file |
//! | `cvekb ask "<question>"` | Graph QA, before/after comparison |
//! | `cvekb rag "<question>"` | Vector RAG over a text corpus, before/after |
//!
//! ## Examples
//!
//! ```bash
//! # Build the graph from data/json
//! cvekb build --config ./config/cvekb.toml
//!
//! # Inspect one record
//! cvekb graph show CVE-2024-0001
//!
//! # Ask about a vulnerability with graph context
//! cvekb ask "What is the impact of CVE-2024-0001?"
//!
//! # Retrieval over a plain-text corpus, top 5 chunks
//! cvekb rag "how much do cats sleep" --corpus data/text/cat_facts.txt --top-n 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cve_kb::config::{self, Config};
use cve_kb::progress::ProgressMode;
use cve_kb::{ask_cmd, graph_cmd, pipeline};

/// CVE Knowledge Base: vulnerability feeds → knowledge graph → answers.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cvekb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cvekb",
    about = "Build a knowledge graph from CVE feeds and answer questions with retrieved context",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cvekb.toml`. When that default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Progress on stderr: `auto` (human when stderr is a TTY), `human`,
    /// `json`, or `off`.
    #[arg(long, global = true, default_value = "auto", value_parser = parse_progress)]
    progress: ProgressMode,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG: &str = "./config/cvekb.toml";

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Filter raw feed files into normalized files.
    ///
    /// Reads every matching file in `[feeds].input_dir` and writes
    /// `<output_prefix><name>` into `[feeds].output_dir`. Bad files are
    /// reported and skipped.
    Normalize,

    /// Run the full ingestion pipeline and save the graph.
    Build,

    /// Inspect the saved knowledge graph.
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Ask a question with and without knowledge-graph context.
    Ask {
        /// The question. Mentioned identifiers (CVE-YYYY-N) select the context.
        question: String,
    },

    /// Ask a question with and without chunks retrieved from a text corpus.
    Rag {
        question: String,

        /// Line-delimited corpus; defaults to `[retrieval].corpus`.
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Number of chunks to retrieve; defaults to `[retrieval].top_n`.
        #[arg(long)]
        top_n: Option<usize>,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Node, edge and per-relation counts.
    Stats,
    /// Metadata and edges of one vulnerability.
    Show {
        /// Vulnerability identifier, e.g. `CVE-2024-0001`.
        id: String,
    },
    /// Compare the configured graph with another graph file.
    Diff {
        other: PathBuf,
    },
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s)
        .ok_or_else(|| format!("invalid progress mode '{}': expected auto, human, json or off", s))
}

/// `--verbose` raises only this crate to debug; HTTP client internals stay at info.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,cve_kb=debug,cvekb=debug"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = if !cli.config.exists() && cli.config == PathBuf::from(DEFAULT_CONFIG) {
        tracing::debug!("no config file, using defaults");
        Config::minimal()
    } else {
        config::load_config(&cli.config)?
    };
    let progress = cli.progress.reporter();

    match cli.command {
        Commands::Normalize => {
            pipeline::run_normalize(&cfg, progress.as_ref())?;
        }
        Commands::Build => {
            pipeline::run_ingest(&cfg, progress.as_ref())?;
        }
        Commands::Graph { action } => match action {
            GraphAction::Stats => graph_cmd::run_stats(&cfg)?,
            GraphAction::Show { id } => graph_cmd::run_show(&cfg, &id)?,
            GraphAction::Diff { other } => graph_cmd::run_diff(&cfg, &other)?,
        },
        Commands::Ask { question } => {
            ask_cmd::run_ask(&cfg, &question).await?;
        }
        Commands::Rag {
            question,
            corpus,
            top_n,
        } => {
            ask_cmd::run_rag(&cfg, &question, corpus, top_n, progress.as_ref()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_filter_is_scoped_to_this_crate() {
        let verbose = default_log_filter(true);
        assert!(!verbose.split(',').any(|d| d == "debug"));
        assert!(verbose.contains("cve_kb=debug"));
        assert!(verbose.contains("cvekb=debug"));
        assert!(EnvFilter::try_new(verbose).is_ok());
        assert_eq!(default_log_filter(false), "info");
    }
}
