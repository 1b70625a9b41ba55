pub mod seed;
pub use seed::seed_teams;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::*;
use crate::utils::verify_image;

/// File behind a `sqlite:` URL, or `None` for in-memory databases.
pub fn database_file_path(database_url: &str) -> Option<PathBuf> {
    let file_path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let file_path = file_path.split('?').next().unwrap_or(file_path);

    if file_path.is_empty() || file_path.starts_with(":memory:") {
        None
    } else {
        Some(PathBuf::from(file_path))
    }
}

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    if let Some(parent) = database_file_path(database_url).as_deref().and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid DATABASE_URL '{}'", database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

pub async fn init_database(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            abbreviation TEXT NOT NULL,
            conference TEXT NOT NULL CHECK (conference IN ('Eastern', 'Western')),
            division TEXT NOT NULL,
            logo_path TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            team_id TEXT,
            headshot_path TEXT,
            jersey_number TEXT,
            position TEXT,
            height TEXT,
            weight TEXT,
            FOREIGN KEY (team_id) REFERENCES teams (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS player_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL,
            season TEXT NOT NULL,
            games_played INTEGER NOT NULL DEFAULT 0,
            games_started INTEGER NOT NULL DEFAULT 0,
            minutes_per_game REAL NOT NULL DEFAULT 0.0,
            field_goal_percentage REAL NOT NULL DEFAULT 0.0,
            three_point_percentage REAL NOT NULL DEFAULT 0.0,
            free_throw_percentage REAL NOT NULL DEFAULT 0.0,
            rebounds_per_game REAL NOT NULL DEFAULT 0.0,
            assists_per_game REAL NOT NULL DEFAULT 0.0,
            steals_per_game REAL NOT NULL DEFAULT 0.0,
            blocks_per_game REAL NOT NULL DEFAULT 0.0,
            points_per_game REAL NOT NULL DEFAULT 0.0,
            last_updated TEXT NOT NULL,
            UNIQUE (player_id, season),
            FOREIGN KEY (player_id) REFERENCES players (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_player_stats_player ON player_stats(player_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

/// True when all three tables exist.
pub async fn verify_schema(pool: &SqlitePool) -> Result<bool> {
    let found: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('teams', 'players', 'player_stats')",
    )
    .fetch_one(pool)
    .await?;
    Ok(found == 3)
}

pub async fn clear_all_data(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM player_stats").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM players").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM teams").execute(&mut *tx).await?;
    tx.commit().await?;
    tracing::info!("All data cleared");
    Ok(())
}

/// Snapshot the whole store into `dest` (which must not exist yet).
pub async fn backup_database(pool: &SqlitePool, dest: &Path) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    sqlx::query("VACUUM INTO ?")
        .bind(dest.to_string_lossy().into_owned())
        .execute(pool)
        .await
        .with_context(|| format!("Backup to {} failed", dest.display()))?;
    tracing::info!("Database backed up to {}", dest.display());
    Ok(dest.to_path_buf())
}

/// `nba_data_backup_YYYYMMDD_HHMMSS.db` next to the live database file.
pub fn default_backup_path(database_url: &str) -> PathBuf {
    let dir = database_file_path(database_url)
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("nba_data_backup_{}.db", Utc::now().format("%Y%m%d_%H%M%S")))
}

// Team operations

pub async fn upsert_team<'e, E>(executor: E, team: &Team) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO teams (id, name, abbreviation, conference, division, logo_path)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name         = excluded.name,
            abbreviation = excluded.abbreviation,
            conference   = excluded.conference,
            division     = excluded.division,
            logo_path    = excluded.logo_path
        "#,
    )
    .bind(&team.id)
    .bind(&team.name)
    .bind(&team.abbreviation)
    .bind(team.conference.as_str())
    .bind(&team.division)
    .bind(&team.logo_path)
    .execute(executor)
    .await?;

    Ok(())
}

fn team_from_row(row: &SqliteRow) -> Result<Team> {
    Ok(Team {
        id: row.get("id"),
        name: row.get("name"),
        abbreviation: row.get("abbreviation"),
        conference: row.get::<String, _>("conference").parse()?,
        division: row.get("division"),
        logo_path: row.get("logo_path"),
    })
}

pub async fn get_team_by_id(pool: &SqlitePool, team_id: &str) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
        .bind(team_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(team_from_row).transpose()
}

pub async fn get_team_by_abbreviation(pool: &SqlitePool, abbreviation: &str) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE UPPER(abbreviation) = UPPER(?)")
        .bind(abbreviation)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(team_from_row).transpose()
}

pub async fn get_all_teams(pool: &SqlitePool) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams ORDER BY conference, division, name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(team_from_row).collect()
}

// Player operations

/// Merge by primary key: every column is overwritten with the new record.
pub async fn upsert_player<'e, E>(executor: E, player: &Player) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO players
        (id, first_name, last_name, team_id, headshot_path, jersey_number, position, height, weight)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            first_name    = excluded.first_name,
            last_name     = excluded.last_name,
            team_id       = excluded.team_id,
            headshot_path = excluded.headshot_path,
            jersey_number = excluded.jersey_number,
            position      = excluded.position,
            height        = excluded.height,
            weight        = excluded.weight
        "#,
    )
    .bind(player.id)
    .bind(&player.first_name)
    .bind(&player.last_name)
    .bind(&player.team_id)
    .bind(&player.headshot_path)
    .bind(&player.jersey_number)
    .bind(&player.position)
    .bind(&player.height)
    .bind(&player.weight)
    .execute(executor)
    .await?;

    Ok(())
}

fn player_from_row(row: &SqliteRow) -> Player {
    Player {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        team_id: row.get("team_id"),
        headshot_path: row.get("headshot_path"),
        jersey_number: row.get("jersey_number"),
        position: row.get("position"),
        height: row.get("height"),
        weight: row.get("weight"),
    }
}

pub async fn get_player_by_id(pool: &SqlitePool, player_id: i64) -> Result<Option<Player>> {
    let row = sqlx::query("SELECT * FROM players WHERE id = ?")
        .bind(player_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(player_from_row))
}

pub async fn get_all_players(pool: &SqlitePool) -> Result<Vec<Player>> {
    let rows = sqlx::query("SELECT * FROM players ORDER BY last_name, first_name")
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(player_from_row).collect())
}

pub async fn get_players_by_team(pool: &SqlitePool, team_id: &str) -> Result<Vec<Player>> {
    let rows = sqlx::query("SELECT * FROM players WHERE team_id = ? ORDER BY last_name, first_name")
        .bind(team_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(player_from_row).collect())
}

pub async fn get_free_agents(pool: &SqlitePool) -> Result<Vec<Player>> {
    let rows = sqlx::query("SELECT * FROM players WHERE team_id IS NULL ORDER BY last_name, first_name")
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(player_from_row).collect())
}

/// Case-insensitive match on first, last or full name.
pub async fn find_players_by_name(pool: &SqlitePool, name: &str) -> Result<Vec<Player>> {
    let pattern = format!("%{}%", name.trim());
    let rows = sqlx::query(
        r#"SELECT * FROM players
           WHERE LOWER(first_name || ' ' || last_name) LIKE LOWER(?)
              OR LOWER(last_name) LIKE LOWER(?)
           ORDER BY last_name, first_name"#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(player_from_row).collect())
}

// Stats operations

/// One row per (player, season); a second write for the same season replaces the numbers.
pub async fn upsert_player_stats<'e, E>(executor: E, stats: &PlayerStats) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO player_stats
        (player_id, season, games_played, games_started, minutes_per_game,
         field_goal_percentage, three_point_percentage, free_throw_percentage,
         rebounds_per_game, assists_per_game, steals_per_game, blocks_per_game,
         points_per_game, last_updated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(player_id, season) DO UPDATE SET
            games_played           = excluded.games_played,
            games_started          = excluded.games_started,
            minutes_per_game       = excluded.minutes_per_game,
            field_goal_percentage  = excluded.field_goal_percentage,
            three_point_percentage = excluded.three_point_percentage,
            free_throw_percentage  = excluded.free_throw_percentage,
            rebounds_per_game      = excluded.rebounds_per_game,
            assists_per_game       = excluded.assists_per_game,
            steals_per_game        = excluded.steals_per_game,
            blocks_per_game        = excluded.blocks_per_game,
            points_per_game        = excluded.points_per_game,
            last_updated           = excluded.last_updated
        "#,
    )
    .bind(stats.player_id)
    .bind(&stats.season)
    .bind(stats.games_played)
    .bind(stats.games_started)
    .bind(stats.minutes_per_game)
    .bind(stats.field_goal_percentage)
    .bind(stats.three_point_percentage)
    .bind(stats.free_throw_percentage)
    .bind(stats.rebounds_per_game)
    .bind(stats.assists_per_game)
    .bind(stats.steals_per_game)
    .bind(stats.blocks_per_game)
    .bind(stats.points_per_game)
    .bind(stats.last_updated.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

fn stats_from_row(row: &SqliteRow) -> Result<PlayerStats> {
    Ok(PlayerStats {
        id: row.get("id"),
        player_id: row.get("player_id"),
        season: row.get("season"),
        games_played: row.get("games_played"),
        games_started: row.get("games_started"),
        minutes_per_game: row.get("minutes_per_game"),
        field_goal_percentage: row.get("field_goal_percentage"),
        three_point_percentage: row.get("three_point_percentage"),
        free_throw_percentage: row.get("free_throw_percentage"),
        rebounds_per_game: row.get("rebounds_per_game"),
        assists_per_game: row.get("assists_per_game"),
        steals_per_game: row.get("steals_per_game"),
        blocks_per_game: row.get("blocks_per_game"),
        points_per_game: row.get("points_per_game"),
        last_updated: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("last_updated"))?.with_timezone(&Utc),
    })
}

/// Most recent season's stats for a player.
pub async fn get_player_stats(pool: &SqlitePool, player_id: i64) -> Result<Option<PlayerStats>> {
    let row = sqlx::query("SELECT * FROM player_stats WHERE player_id = ? ORDER BY season DESC LIMIT 1")
        .bind(player_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(stats_from_row).transpose()
}

pub async fn get_player_stats_for_season(pool: &SqlitePool, player_id: i64, season: &str) -> Result<Option<PlayerStats>> {
    let row = sqlx::query("SELECT * FROM player_stats WHERE player_id = ? AND season = ?")
        .bind(player_id)
        .bind(season)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(stats_from_row).transpose()
}

// Relationship traversal

pub async fn get_team_roster(pool: &SqlitePool, team_id: &str) -> Result<Option<TeamRoster>> {
    let Some(team) = get_team_by_id(pool, team_id).await? else {
        return Ok(None);
    };
    let players = get_players_by_team(pool, &team.id).await?;
    Ok(Some(TeamRoster { team, players }))
}

pub async fn get_player_profile(pool: &SqlitePool, player_id: i64) -> Result<Option<PlayerProfile>> {
    let Some(player) = get_player_by_id(pool, player_id).await? else {
        return Ok(None);
    };
    let team = match &player.team_id {
        Some(team_id) => get_team_by_id(pool, team_id).await?,
        None => None,
    };
    let stats = get_player_stats(pool, player.id).await?;
    Ok(Some(PlayerProfile { player, team, stats }))
}

// Integrity checks

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn check_integrity(pool: &SqlitePool) -> Result<IntegrityReport> {
    let mut report = IntegrityReport {
        teams: count(pool, "SELECT COUNT(*) FROM teams").await?,
        players: count(pool, "SELECT COUNT(*) FROM players").await?,
        stats_rows: count(pool, "SELECT COUNT(*) FROM player_stats").await?,
        teams_incomplete: count(
            pool,
            "SELECT COUNT(*) FROM teams
             WHERE TRIM(name) = '' OR TRIM(abbreviation) = '' OR TRIM(division) = ''
                OR conference NOT IN ('Eastern', 'Western')",
        )
        .await?,
        dangling_player_teams: count(
            pool,
            "SELECT COUNT(*) FROM players p LEFT JOIN teams t ON p.team_id = t.id
             WHERE p.team_id IS NOT NULL AND t.id IS NULL",
        )
        .await?,
        dangling_stats: count(
            pool,
            "SELECT COUNT(*) FROM player_stats s LEFT JOIN players p ON s.player_id = p.id
             WHERE p.id IS NULL",
        )
        .await?,
        stats_out_of_range: count(
            pool,
            "SELECT COUNT(*) FROM player_stats
             WHERE field_goal_percentage NOT BETWEEN 0.0 AND 1.0
                OR three_point_percentage NOT BETWEEN 0.0 AND 1.0
                OR free_throw_percentage NOT BETWEEN 0.0 AND 1.0
                OR games_played < 0 OR games_started < 0",
        )
        .await?,
        ..Default::default()
    };

    for team in get_all_teams(pool).await? {
        if !team.logo_path.as_deref().is_some_and(|path| verify_image(path)) {
            report.missing_logos += 1;
        }
    }
    for player in get_all_players(pool).await? {
        if !player.headshot_path.as_deref().is_some_and(|path| verify_image(path)) {
            report.missing_headshots += 1;
        }
    }

    Ok(report)
}
