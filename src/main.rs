//! # askbase CLI
//!
//! ```bash
//! askbase --config ./config/askbase.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askbase init` | Create the SQLite database and run schema migrations |
//! | `askbase import <file>` | Seed organizations, articles, questions and links |
//! | `askbase ask "<question>" --session <id> --org <id>` | Answer one question |
//! | `askbase logs --org <id>` | Show recent audit entries |
//! | `askbase serve` | Start the HTTP server |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity. A `.env` file in
//! the working directory is loaded before anything else.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use askbase::{ask, audit, config, import, migrate, server};

/// askbase: grounded question answering over an organization's knowledge base.
#[derive(Parser)]
#[command(
    name = "askbase",
    about = "askbase: grounded, organization-scoped question answering over a curated knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askbase.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Import a TOML seed file of organizations, articles, questions and links.
    ///
    /// Question embeddings are computed during import.
    Import {
        /// Seed file path.
        file: PathBuf,

        /// Re-embed every question even when its text is unchanged.
        #[arg(long)]
        reembed: bool,
    },

    /// Ask one question and print the JSON result.
    Ask {
        /// The customer's question.
        question: String,

        /// Conversation session id.
        #[arg(long)]
        session: String,

        /// Organization id.
        #[arg(long)]
        org: i64,
    },

    /// Show the most recent audit log entries of an organization.
    Logs {
        /// Organization id.
        #[arg(long)]
        org: i64,

        /// Maximum number of entries.
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Print entries as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("askbase=info".parse()?)
                .add_directive("askbase_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let config_dir = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file, reembed } => {
            import::run_import(&cfg, &file, reembed).await?;
        }
        Commands::Ask {
            question,
            session,
            org,
        } => {
            ask::run_ask(&cfg, &config_dir, &question, &session, org).await?;
        }
        Commands::Logs { org, limit, json } => {
            audit::run_logs(&cfg, org, limit, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, &config_dir).await?;
        }
    }

    Ok(())
}
