//! # Eventdesk Entry Point

use anyhow::Context;
use clap::{Parser, Subcommand};
use eventdesk::config::ConfigLoader;
use eventdesk::db::{init_pool, run_migrations};
use eventdesk::server::run_server;
use eventdesk::telemetry::init_tracing;
use tracing::info;

#[derive(Parser)]
#[command(name = "eventdesk", version, about = "Multi-tenant event back office")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations, then serve the API (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("Failed to load configuration")?;
    init_tracing(&config).context("Failed to initialize tracing")?;

    if let Ok(redacted) = config.redacted_json() {
        info!(profile = %config.profile, config = %redacted, "Configuration loaded");
    }

    let db = init_pool(&config).await?;
    run_migrations(&db).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config, db).await,
        Command::Migrate => {
            info!("Migrations applied");
            Ok(())
        }
    }
}
