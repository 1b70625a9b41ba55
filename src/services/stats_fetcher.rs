use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::FetchError;
use crate::models::PlayerStats;
use crate::services::http::HttpSource;

// ── stats.nba.com structures ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResultSetResponse {
    #[serde(rename = "resultSets")]
    pub result_sets: Vec<ResultSet>,
}

/// Column headers plus positional rows, the shape every stats.nba.com endpoint uses.
#[derive(Debug, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(rename = "rowSet", default)]
    pub row_set: Vec<Vec<Value>>,
}

impl ResultSetResponse {
    /// Decodes a body and hands back its first result set.
    pub fn first_set(body: Value) -> Result<ResultSet, FetchError> {
        let response: ResultSetResponse = serde_json::from_value(body)?;
        response
            .result_sets
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Decode("response has no result sets".to_string()))
    }
}

/// Numeric view of a cell. `null`, text that is not a finite number and
/// anything else count as missing.
pub fn cell_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Map a header/row pair onto a stats record. Missing fields become zero.
pub fn stats_from_row(player_id: i64, season: &str, headers: &[String], row: &[Value]) -> PlayerStats {
    let table: HashMap<&str, &Value> = headers.iter().map(String::as_str).zip(row.iter()).collect();
    let float = |key: &str| cell_number(table.get(key).copied()).unwrap_or(0.0);
    let int = |key: &str| float(key) as i64;

    PlayerStats {
        id: None,
        player_id,
        season: season.to_string(),
        games_played: int("GP"),
        games_started: int("GS"),
        minutes_per_game: float("MIN"),
        field_goal_percentage: float("FG_PCT"),
        three_point_percentage: float("FG3_PCT"),
        free_throw_percentage: float("FT_PCT"),
        rebounds_per_game: float("REB"),
        assists_per_game: float("AST"),
        steals_per_game: float("STL"),
        blocks_per_game: float("BLK"),
        points_per_game: float("PTS"),
        last_updated: Utc::now(),
    }
}

fn validate(stats: &PlayerStats) -> Result<(), FetchError> {
    for (field, value) in stats.percentages() {
        if !(0.0..=1.0).contains(&value) {
            return Err(FetchError::Invalid(format!(
                "player {} {} = {} is not a fraction",
                stats.player_id, field, value
            )));
        }
    }
    if stats.games_played < 0 || stats.games_started < 0 {
        return Err(FetchError::Invalid(format!("player {} has negative game counts", stats.player_id)));
    }
    Ok(())
}

/// Per-game season averages from `playerprofilev2`.
pub struct StatsFetcher {
    http: Arc<dyn HttpSource>,
    base_url: String,
    league_id: String,
}

impl StatsFetcher {
    pub fn new(http: Arc<dyn HttpSource>, config: &Config) -> Self {
        Self {
            http,
            base_url: config.stats_base_url.clone(),
            league_id: config.league_id.clone(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/playerprofilev2", self.base_url)
    }

    /// Surfaces transport and shape failures so the caller can retry.
    /// An empty row set is not a failure: the player just has no numbers yet.
    pub async fn try_fetch(&self, player_id: i64, season: &str) -> Result<PlayerStats, FetchError> {
        let query = [
            ("PlayerID", player_id.to_string()),
            ("PerMode", "PerGame".to_string()),
            ("LeagueID", self.league_id.clone()),
        ];
        let body = self.http.get_json(&self.endpoint(), &query).await?;
        let set = ResultSetResponse::first_set(body)?;

        // rows are ordered by season, the last one is the current season
        let Some(row) = set.row_set.last() else {
            tracing::info!("No stats available for player {}, using defaults", player_id);
            return Ok(PlayerStats::zeroed(player_id, season));
        };

        let stats = stats_from_row(player_id, season, &set.headers, row);
        validate(&stats)?;
        Ok(stats)
    }

    /// Never fails: any error yields the zeroed record for the season.
    pub async fn fetch(&self, player_id: i64, season: &str) -> PlayerStats {
        match self.try_fetch(player_id, season).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("Error fetching stats for player {}: {}", player_id, e);
                PlayerStats::zeroed(player_id, season)
            }
        }
    }
}
