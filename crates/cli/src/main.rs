//! Kindred CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the gateway (HTTP + WebSocket) and the ingestion worker
//! - `migrate` — Create or update the database schemas and exit

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "kindred",
    about = "Kindred — AI companion chat backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API gateway and background ingestion worker
    Serve,

    /// Create or update the database schemas, then exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = kindred_config::AppConfig::load()?;

    match cli.command {
        Commands::Serve => {
            kindred_gateway::start(config).await?;
        }
        Commands::Migrate => {
            // Opening either store runs its migrations.
            kindred_storage::SqliteStore::new(&config.database_url).await?;
            kindred_retrieval::SqliteVectorIndex::new(&config.vector_database_url).await?;
            info!("Migrations complete");
        }
    }

    Ok(())
}
