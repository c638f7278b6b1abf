//! # Consultant CLI (`consult`)
//!
//! ## Usage
//!
//! ```bash
//! consult --config ./config/consult.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `consult build` | Rebuild the vector index from the document folder |
//! | `consult ask "<question>"` | Answer one question with sources |
//! | `consult chat` | Interactive consultation on stdin |
//! | `consult serve` | Start the HTTP API |
//! | `consult stats` | Summarise the current index |
//!
//! ## Examples
//!
//! ```bash
//! # Count what would be indexed
//! consult build --dry-run
//!
//! # Build the index
//! consult build
//!
//! # Ask, showing the retrieved passages
//! GOOGLE_API_KEY=... consult ask "How long can raw milk be stored?" --show-context
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_consultant::{ask, chat, config, ingest, logging, server, stats};

/// Retrieval-augmented consultant over a local document corpus.
///
/// Settings are read from a TOML file (see `config/consult.example.toml`).
/// Without `--config`, `./config/consult.toml` is used if present,
/// otherwise built-in defaults.
#[derive(Parser)]
#[command(
    name = "consult",
    about = "Answer questions from a local document corpus, with sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from the document folder.
    ///
    /// Loads every matching document, splits it into overlapping chunks,
    /// embeds them and atomically replaces the index. A failure leaves
    /// the previous index untouched.
    Build {
        /// Load and chunk only; report counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (defaults to `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Print the retrieved passages after the answer.
        #[arg(long)]
        show_context: bool,
    },

    /// Ask questions interactively, one per line.
    Chat,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Summarise the current index.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { dry_run } => {
            ingest::run_build(&cfg, dry_run).await?;
        }
        Commands::Ask {
            question,
            k,
            show_context,
        } => {
            ask::run_ask(&cfg, &question, k, show_context).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
