//! dataverse-cli entry point

mod api;
mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dataverse-cli",
    about = "A command-line bulk data toolkit for Microsoft Dataverse",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk data operations
    #[command(subcommand)]
    Bulk(cli::commands::bulk::BulkCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Bulk(command) => cli::commands::bulk::handler::handle_bulk_command(command).await,
    }
}
