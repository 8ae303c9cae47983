//! # Scriptorium CLI
//!
//! The `scriptorium` binary drives the scripture service. It provides
//! commands for database initialization, ad-hoc hybrid search, and
//! starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! scriptorium --config ./config/scriptorium.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scriptorium init` | Create the SQLite database and run schema migrations |
//! | `scriptorium search "<query>" --version KJV` | Hybrid verse search from the CLI |
//! | `scriptorium serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use scriptorium::{config, db, migrate, search_cmd, server};

/// Scriptorium — a scripture text service with hybrid verse search and
/// incremental content streaming.
#[derive(Parser)]
#[command(
    name = "scriptorium",
    about = "Scriptorium — a scripture text service with hybrid verse search",
    version,
    long_about = "Scriptorium serves versioned scripture text from SQLite: hybrid \
    (keyword + semantic) verse search fused with Reciprocal Rank Fusion, capability-gated \
    access per version, and incremental streaming of whole versions as SSE frames or raw \
    embedding bytes."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scriptorium.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (versions, books, chapters, verses, verse_vectors, verses_fts).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Search verses within one version.
    ///
    /// Runs the vector and keyword queries concurrently and prints the
    /// rank-fused results. Requires an embedding provider in config.
    Search {
        /// The search query string.
        query: String,

        /// Version code to search (e.g., `KJV`).
        #[arg(long)]
        version: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        top: i64,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// search, content streaming, and vector streaming endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scriptorium=info".parse()?)
                .add_directive("tower_http=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Search {
            query,
            version,
            top,
        } => {
            search_cmd::run_search(&cfg, &query, &version, top).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
