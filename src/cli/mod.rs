use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::db::{
    backup_database, check_integrity, clear_all_data, create_pool, default_backup_path, find_players_by_name,
    get_all_players, get_all_teams, get_free_agents, get_player_profile, get_player_stats, get_player_stats_for_season,
    get_team_by_abbreviation, get_team_roster, init_database, upsert_player_stats, verify_schema,
};
use crate::models::{IngestReport, PlayerStats};
use crate::services::{NbaHttpClient, RosterScraper, StatsFetcher};

async fn open_store(config: &Config) -> Result<SqlitePool> {
    let pool = create_pool(&config.database_url).await?;
    init_database(&pool).await?;
    Ok(pool)
}

fn print_stat_line(stats: &PlayerStats) {
    println!(
        "   {}: {} GP ({} GS) | {:.1} MIN | {:.1} PTS {:.1} REB {:.1} AST {:.1} STL {:.1} BLK",
        stats.season,
        stats.games_played,
        stats.games_started,
        stats.minutes_per_game,
        stats.points_per_game,
        stats.rebounds_per_game,
        stats.assists_per_game,
        stats.steals_per_game,
        stats.blocks_per_game,
    );
    println!(
        "   FG {:.1}% | 3P {:.1}% | FT {:.1}%",
        stats.field_goal_percentage * 100.0,
        stats.three_point_percentage * 100.0,
        stats.free_throw_percentage * 100.0,
    );
}

pub async fn ingest(config: &Config, teams_only: bool) -> Result<()> {
    let pool = open_store(config).await?;
    let http = Arc::new(NbaHttpClient::new(config)?);
    let scraper = RosterScraper::new(pool, http, config);

    println!("🏀 Ingesting NBA data for {}...", config.season);

    let report: IngestReport = if teams_only { scraper.run_teams_only().await? } else { scraper.run().await? };

    println!("✅ Data collection complete!");
    println!("   Teams seeded:          {}", report.teams_seeded);
    if !teams_only {
        println!("   Players in roster:     {}", report.players_seen);
        println!("   Inactive (filtered):   {}", report.players_inactive);
        println!("   Players persisted:     {}", report.players_persisted);
        println!("   Stats fetch failed:    {}", report.players_without_stats);
        println!("   Skipped after errors:  {}", report.players_skipped);
    }
    Ok(())
}

pub async fn init_db(config: &Config) -> Result<()> {
    open_store(config).await?;
    println!("✅ Database ready at {}", config.database_url);
    Ok(())
}

pub async fn verify(config: &Config) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    if !verify_schema(&pool).await? {
        bail!("Database is missing required tables; run `courtside init-db`");
    }

    let report = check_integrity(&pool).await?;
    println!("🔍 Store integrity:");
    println!("   Teams: {} (expected {})", report.teams, crate::models::IntegrityReport::EXPECTED_TEAMS);
    println!("   Players: {} | Stats rows: {}", report.players, report.stats_rows);
    println!("   Incomplete teams: {}", report.teams_incomplete);
    println!("   Players with dangling team: {}", report.dangling_player_teams);
    println!("   Stats with dangling player: {}", report.dangling_stats);
    println!("   Stats out of range: {}", report.stats_out_of_range);
    println!("   Missing logos: {} | Missing headshots: {}", report.missing_logos, report.missing_headshots);

    if !report.is_healthy() {
        bail!("Integrity check failed");
    }
    println!("✅ All checks passed");
    Ok(())
}

pub async fn query_team(config: &Config, abbreviation: &str) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    let Some(team) = get_team_by_abbreviation(&pool, abbreviation).await? else {
        println!("❌ No team with abbreviation '{}'", abbreviation);
        println!("\n💡 Available teams:");
        for team in get_all_teams(&pool).await? {
            println!("   • {} {} ({})", team.abbreviation, team.name, team.conference);
        }
        return Ok(());
    };

    let Some(roster) = get_team_roster(&pool, &team.id).await? else {
        return Ok(());
    };

    println!("📊 {} ({})", roster.team.name, roster.team.abbreviation);
    println!("   {} Conference, {} Division", roster.team.conference, roster.team.division);
    if let Some(logo) = &roster.team.logo_path {
        println!("   Logo: {}", logo);
    }

    println!("\n👥 Roster ({} players):", roster.players.len());
    for player in &roster.players {
        match get_player_stats(&pool, player.id).await? {
            Some(stats) => println!(
                "   {:<28} {:>5.1} PTS {:>5.1} REB {:>5.1} AST",
                player.full_name(),
                stats.points_per_game,
                stats.rebounds_per_game,
                stats.assists_per_game
            ),
            None => println!("   {:<28} (no stats)", player.full_name()),
        }
    }
    Ok(())
}

pub async fn query_player(config: &Config, name: &str) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    println!("🔍 Searching for player: {}", name);
    let players = find_players_by_name(&pool, name).await?;

    let Some(first) = players.first() else {
        println!("❌ No players found matching '{}'", name);
        return Ok(());
    };

    if players.len() > 1 {
        println!("📋 Found {} players matching '{}':", players.len(), name);
        for (i, player) in players.iter().enumerate() {
            println!("{}. {} (#{})", i + 1, player.full_name(), player.id);
        }
        println!("\n🔍 Showing details for first match:");
    }

    let Some(profile) = get_player_profile(&pool, first.id).await? else {
        return Ok(());
    };

    println!("👤 {} (#{})", profile.player.full_name(), profile.player.id);
    match &profile.team {
        Some(team) => println!("   Team: {} ({})", team.name, team.abbreviation),
        None => println!("   Team: Free Agent"),
    }
    if let Some(headshot) = &profile.player.headshot_path {
        println!("   Headshot: {}", headshot);
    }
    match &profile.stats {
        Some(stats) => print_stat_line(stats),
        None => println!("   No stats recorded"),
    }
    Ok(())
}

/// Re-fetch one player's season averages outside a full run.
pub async fn refresh_stats(config: &Config, player_id: i64) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    if get_player_profile(&pool, player_id).await?.is_none() {
        bail!("Player {} is not in the store; run an ingest first", player_id);
    }

    let http = Arc::new(NbaHttpClient::new(config)?);
    let stats = StatsFetcher::new(http, config).fetch(player_id, &config.season).await;
    upsert_player_stats(&pool, &stats).await?;

    if let Some(stored) = get_player_stats_for_season(&pool, player_id, &config.season).await? {
        println!("✅ Stats refreshed for player {}", player_id);
        print_stat_line(&stored);
    }
    Ok(())
}

#[derive(Serialize)]
struct PlayerCsvRow {
    id: i64,
    first_name: String,
    last_name: String,
    team: String,
    season: Option<String>,
    games_played: Option<i64>,
    points_per_game: Option<f64>,
    rebounds_per_game: Option<f64>,
    assists_per_game: Option<f64>,
    headshot_path: Option<String>,
}

pub async fn export_players(config: &Config, out: &Path) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    let teams = get_all_teams(&pool).await?;
    let players = get_all_players(&pool).await?;
    let mut writer = csv::Writer::from_path(out)?;

    for player in players {
        let team = player
            .team_id
            .as_ref()
            .and_then(|id| teams.iter().find(|t| &t.id == id))
            .map_or_else(|| "FA".to_string(), |t| t.abbreviation.clone());
        let stats = get_player_stats(&pool, player.id).await?;

        writer.serialize(PlayerCsvRow {
            id: player.id,
            first_name: player.first_name,
            last_name: player.last_name,
            team,
            season: stats.as_ref().map(|s| s.season.clone()),
            games_played: stats.as_ref().map(|s| s.games_played),
            points_per_game: stats.as_ref().map(|s| s.points_per_game),
            rebounds_per_game: stats.as_ref().map(|s| s.rebounds_per_game),
            assists_per_game: stats.as_ref().map(|s| s.assists_per_game),
            headshot_path: player.headshot_path,
        })?;
    }
    writer.flush()?;

    let free_agents = get_free_agents(&pool).await?.len();
    println!("✅ Player list written to {} ({} free agents)", out.display(), free_agents);
    Ok(())
}

pub async fn clear(config: &Config) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    clear_all_data(&pool).await?;
    println!("🧹 All teams, players and stats removed");
    Ok(())
}

pub async fn backup(config: &Config, out: Option<PathBuf>) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    let dest = out.unwrap_or_else(|| default_backup_path(&config.database_url));
    let written = backup_database(&pool, &dest).await?;
    println!("💾 Backup written to {}", written.display());
    Ok(())
}
