//! # docvault CLI (`dv`)
//!
//! ## Usage
//!
//! ```bash
//! dv --config ./config/dv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dv init` | Create the local SQLite store |
//! | `dv store <path>` | Clean, chunk, embed and store a text file |
//! | `dv search "<query>"` | Ranked search over stored documents |
//! | `dv list` | List stored documents |
//! | `dv clear` | Remove stored documents |
//! | `dv serve` | Start the JSON HTTP API |
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `docvault=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docvault::{commands, config, server};

/// docvault: document storage and retrieval over a remote vector index
/// with a local keyword fallback.
#[derive(Parser)]
#[command(name = "dv", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local store. Idempotent.
    Init,

    /// Store a text file.
    Store {
        /// File to read. Its file name becomes the document name.
        path: PathBuf,

        /// Owner of the document.
        #[arg(long, default_value = "")]
        user: String,

        /// MIME type; guessed from the extension when omitted.
        #[arg(long)]
        file_type: Option<String>,
    },

    /// Search stored documents.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[retrieval].default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict results to one user.
        #[arg(long)]
        user: Option<String>,
    },

    /// List stored documents, one line per file name.
    List {
        #[arg(long)]
        user: Option<String>,
    },

    /// Clear stored documents. The local store is always emptied entirely.
    Clear {
        #[arg(long)]
        user: Option<String>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docvault=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Store {
            path,
            user,
            file_type,
        } => {
            commands::run_store(&cfg, &path, &user, file_type.as_deref()).await?;
        }
        Commands::Search { query, top_k, user } => {
            commands::run_search(&cfg, &query, top_k, user.as_deref()).await?;
        }
        Commands::List { user } => {
            commands::run_list(&cfg, user.as_deref()).await?;
        }
        Commands::Clear { user } => {
            commands::run_clear(&cfg, user.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
