//! # Paperchat CLI
//!
//! The `paperchat` binary runs the three halves of the service:
//!
//! | Command | Description |
//! |---------|-------------|
//! | `paperchat init` | Create the SQLite database and run schema migrations |
//! | `paperchat serve` | Start the HTTP API |
//! | `paperchat work` | Start the ingestion/purge worker loop |
//!
//! All commands accept a `--config` flag pointing to a TOML configuration
//! file. See `config/paperchat.example.toml` for a full example. Secrets
//! are read from the environment: `PAPERCHAT_AUTH_SECRET`,
//! `GEMINI_API_KEY`, `GROQ_API_KEY`, and optionally `QDRANT_API_KEY`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use paperchat::{config, db, ingest, migrate, server};

/// Paperchat — a PDF question-answering service with grounded citations.
#[derive(Parser)]
#[command(
    name = "paperchat",
    about = "Paperchat — upload PDFs, then ask questions answered from their contents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/paperchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, jobs, messages). Idempotent — safe to re-run.
    Init,

    /// Start the HTTP API.
    ///
    /// Binds to the address configured in `[server].bind`. Uploads are
    /// accepted here but ingested by a separate `work` process.
    Serve,

    /// Start the worker loop.
    ///
    /// Claims ingestion and purge jobs from the queue until interrupted.
    /// Run at least one worker alongside `serve`.
    Work,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Work => {
            ingest::run_worker(cfg).await?;
        }
    }

    Ok(())
}
