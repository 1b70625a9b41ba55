use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conference {
    Eastern,
    Western,
}

impl Conference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Conference::Eastern => "Eastern",
            Conference::Western => "Western",
        }
    }
}

impl fmt::Display for Conference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Conference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Eastern" => Ok(Conference::Eastern),
            "Western" => Ok(Conference::Western),
            other => Err(anyhow::anyhow!("Unknown conference '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String, // NBA team id, e.g. "1610612747"
    pub name: String,
    pub abbreviation: String,
    pub conference: Conference,
    pub division: String,
    pub logo_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub team_id: Option<String>, // None = free agent
    pub headshot_path: Option<String>,
    pub jersey_number: Option<String>,
    pub position: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
}

impl Player {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Per-game averages for one player and season. Percentages are fractions in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub id: Option<i64>, // assigned by the store
    pub player_id: i64,
    pub season: String,
    pub games_played: i64,
    pub games_started: i64,
    pub minutes_per_game: f64,
    pub field_goal_percentage: f64,
    pub three_point_percentage: f64,
    pub free_throw_percentage: f64,
    pub rebounds_per_game: f64,
    pub assists_per_game: f64,
    pub steals_per_game: f64,
    pub blocks_per_game: f64,
    pub points_per_game: f64,
    pub last_updated: DateTime<Utc>,
}

impl PlayerStats {
    /// The record used whenever a player has no usable numbers for the season.
    pub fn zeroed(player_id: i64, season: &str) -> Self {
        Self {
            id: None,
            player_id,
            season: season.to_string(),
            games_played: 0,
            games_started: 0,
            minutes_per_game: 0.0,
            field_goal_percentage: 0.0,
            three_point_percentage: 0.0,
            free_throw_percentage: 0.0,
            rebounds_per_game: 0.0,
            assists_per_game: 0.0,
            steals_per_game: 0.0,
            blocks_per_game: 0.0,
            points_per_game: 0.0,
            last_updated: Utc::now(),
        }
    }

    pub fn percentages(&self) -> [(&'static str, f64); 3] {
        [
            ("FG_PCT", self.field_goal_percentage),
            ("FG3_PCT", self.three_point_percentage),
            ("FT_PCT", self.free_throw_percentage),
        ]
    }
}

/// team -> players traversal
#[derive(Debug, Clone, Serialize)]
pub struct TeamRoster {
    pub team: Team,
    pub players: Vec<Player>,
}

/// player -> team and player -> stats traversal
#[derive(Debug, Clone, Serialize)]
pub struct PlayerProfile {
    pub player: Player,
    pub team: Option<Team>,
    pub stats: Option<PlayerStats>,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub season: String,
    pub teams_seeded: usize,
    pub players_seen: usize,
    pub players_inactive: usize,
    pub players_persisted: usize,
    pub players_without_stats: usize, // stats retries exhausted, zeroed row stored
    pub players_skipped: usize,
}

/// Result of the store-wide consistency checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub teams: i64,
    pub players: i64,
    pub stats_rows: i64,
    pub teams_incomplete: i64,
    pub dangling_player_teams: i64,
    pub dangling_stats: i64,
    pub stats_out_of_range: i64,
    pub missing_logos: usize,
    pub missing_headshots: usize,
}

impl IntegrityReport {
    pub const EXPECTED_TEAMS: i64 = 30;

    /// Missing images are reported but do not make the store unhealthy;
    /// the image fetcher treats them as non-fatal too.
    pub fn is_healthy(&self) -> bool {
        self.teams == Self::EXPECTED_TEAMS
            && self.teams_incomplete == 0
            && self.dangling_player_teams == 0
            && self.dangling_stats == 0
            && self.stats_out_of_range == 0
    }
}
