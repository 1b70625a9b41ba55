mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Ingests NBA teams, players, stats and images into a local SQLite store")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed teams and ingest the active roster with stats and headshots
    Ingest {
        /// Season label, e.g. 2024-25 (defaults to NBA_SEASON)
        #[arg(short, long)]
        season: Option<String>,
        /// Only seed the 30 teams and their logos
        #[arg(long)]
        teams_only: bool,
    },
    /// Initialize the database
    InitDb,
    /// Check schema and referential integrity
    Verify,
    /// Show a team and its roster
    Team {
        #[arg(short, long)]
        abbr: String,
    },
    /// Search players by name
    Player {
        #[arg(short, long)]
        name: String,
    },
    /// Re-fetch one player's season averages
    RefreshStats {
        #[arg(short, long)]
        player_id: i64,
        #[arg(short, long)]
        season: Option<String>,
    },
    /// Write the player list as CSV
    Export {
        #[arg(short, long, default_value = "player_list.csv")]
        out: PathBuf,
    },
    /// Delete all stored data
    Clear,
    /// Copy the database to a backup file
    Backup {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Some(Commands::Ingest { season, teams_only }) => {
            let config = config.with_season(season);
            tracing::info!("Starting ingestion for season {}", config.season);
            cli::ingest(&config, teams_only).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            cli::init_db(&config).await?;
        }
        Some(Commands::Verify) => cli::verify(&config).await?,
        Some(Commands::Team { abbr }) => {
            tracing::info!("Querying team: {}", abbr);
            cli::query_team(&config, &abbr).await?;
        }
        Some(Commands::Player { name }) => cli::query_player(&config, &name).await?,
        Some(Commands::RefreshStats { player_id, season }) => {
            cli::refresh_stats(&config.with_season(season), player_id).await?;
        }
        Some(Commands::Export { out }) => cli::export_players(&config, &out).await?,
        Some(Commands::Clear) => cli::clear(&config).await?,
        Some(Commands::Backup { out }) => cli::backup(&config, out).await?,
        None => {
            // Default to a full ingestion run
            cli::ingest(&config, false).await?;
        }
    }

    Ok(())
}
