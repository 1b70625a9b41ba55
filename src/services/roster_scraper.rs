use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sqlx::{Connection, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::{seed_teams, upsert_player, upsert_player_stats};
use crate::error::FetchError;
use crate::models::{IngestReport, Player, PlayerStats, Team};
use crate::services::http::HttpSource;
use crate::services::image_fetcher::{EntityKind, ImageFetcher};
use crate::services::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::services::stats_fetcher::{cell_number, ResultSet, ResultSetResponse, StatsFetcher};
use crate::utils::names_from_roster;

// commonallplayers column positions
const COL_ID: usize = 0;
const COL_LAST_COMMA_FIRST: usize = 1;
const COL_FIRST_LAST: usize = 2;
const COL_ROSTER_STATUS: usize = 3;
const COL_TEAM_ID: usize = 8;

/// One row of the all-players listing, decoded by position.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub player_id: i64,
    pub last_comma_first: String,
    pub first_last: String,
    pub active: bool,
    pub team_id: Option<String>,
}

impl RosterEntry {
    pub fn from_row(row: &[Value]) -> Result<Self> {
        let player_id = cell_number(row.get(COL_ID))
            .map(|n| n as i64)
            .filter(|id| *id > 0)
            .ok_or_else(|| anyhow!("roster row without a usable player id: {:?}", row.get(COL_ID)))?;

        let text = |col: usize| row.get(col).and_then(Value::as_str).unwrap_or_default().trim().to_string();
        let last_comma_first = text(COL_LAST_COMMA_FIRST);
        let first_last = text(COL_FIRST_LAST);
        if last_comma_first.is_empty() && first_last.is_empty() {
            return Err(anyhow!("roster row for player {} has no name", player_id));
        }

        // team id 0 means unattached
        let team_id = cell_number(row.get(COL_TEAM_ID))
            .map(|n| n as i64)
            .filter(|id| *id != 0)
            .map(|id| id.to_string());

        Ok(Self {
            player_id,
            last_comma_first,
            first_last,
            active: cell_number(row.get(COL_ROSTER_STATUS)) == Some(1.0),
            team_id,
        })
    }
}

/// Drives a full ingestion run: teams, roster, then each player in API order.
pub struct RosterScraper {
    pool: SqlitePool,
    http: Arc<dyn HttpSource>,
    images: ImageFetcher,
    stats: StatsFetcher,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    player_delay: Duration,
    season: String,
    league_id: String,
    stats_base_url: String,
}

impl RosterScraper {
    pub fn new(pool: SqlitePool, http: Arc<dyn HttpSource>, config: &Config) -> Self {
        Self {
            pool,
            images: ImageFetcher::new(http.clone(), config),
            stats: StatsFetcher::new(http.clone(), config),
            http,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy { max_attempts: config.stats_max_attempts, base_delay: config.stats_retry_base },
            player_delay: config.player_delay,
            season: config.season.clone(),
            league_id: config.league_id.clone(),
            stats_base_url: config.stats_base_url.clone(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn roster_endpoint(&self) -> String {
        format!("{}/commonallplayers", self.stats_base_url)
    }

    /// Step 1 on its own: seed the fixed team table.
    pub async fn seed_teams(&self) -> Result<Vec<Team>> {
        seed_teams(&self.pool, &self.images).await.context("Team seeding failed")
    }

    pub async fn run_teams_only(&self) -> Result<IngestReport> {
        let teams = self.seed_teams().await?;
        Ok(IngestReport { season: self.season.clone(), teams_seeded: teams.len(), ..Default::default() })
    }

    /// Full run. Per-player failures are counted in the report; an `Err`
    /// means the player transaction was rolled back.
    pub async fn run(&self) -> Result<IngestReport> {
        let mut report = IngestReport { season: self.season.clone(), ..Default::default() };

        let teams = self.seed_teams().await?;
        report.teams_seeded = teams.len();
        let known_teams: HashSet<String> = teams.into_iter().map(|t| t.id).collect();

        let mut tx = self.pool.begin().await?;

        let roster = match self.fetch_roster().await {
            Ok(roster) => roster,
            Err(e) => {
                tracing::error!("Error fetching roster for {}: {}", self.season, e);
                tx.rollback().await?;
                return Err(anyhow!(e).context("Roster fetch failed"));
            }
        };
        tracing::info!(
            "{} for {} has {} rows",
            roster.name.as_deref().unwrap_or("Roster"),
            self.season,
            roster.row_set.len()
        );

        match self.ingest_roster(&mut tx, &roster, &known_teams, &mut report).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(
                    "Ingestion complete: {} persisted, {} with zeroed stats, {} skipped, {} inactive",
                    report.players_persisted,
                    report.players_without_stats,
                    report.players_skipped,
                    report.players_inactive
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Error scraping players, rolling back: {:#}", e);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn fetch_roster(&self) -> Result<ResultSet, FetchError> {
        let query = [
            ("LeagueID", self.league_id.clone()),
            ("Season", self.season.clone()),
            ("IsOnlyCurrentSeason", "1".to_string()),
        ];
        let body = self.http.get_json(&self.roster_endpoint(), &query).await?;
        ResultSetResponse::first_set(body)
    }

    async fn ingest_roster(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        roster: &ResultSet,
        known_teams: &HashSet<String>,
        report: &mut IngestReport,
    ) -> Result<()> {
        for row in &roster.row_set {
            report.players_seen += 1;

            let entry = match RosterEntry::from_row(row) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!("Error processing player: {:#}", e);
                    report.players_skipped += 1;
                    continue;
                }
            };
            if !entry.active {
                report.players_inactive += 1;
                continue;
            }

            // each player gets a savepoint so a failure leaves nothing behind
            let mut savepoint = Connection::begin(&mut **tx).await?;
            match self.ingest_player(&mut savepoint, &entry, known_teams).await {
                Ok(stats_fetched) => {
                    savepoint.commit().await?;
                    report.players_persisted += 1;
                    if !stats_fetched {
                        report.players_without_stats += 1;
                    }
                }
                Err(e) => {
                    tracing::error!("Error processing player {}: {:#}", entry.player_id, e);
                    savepoint.rollback().await?;
                    report.players_skipped += 1;
                }
            }

            if !self.player_delay.is_zero() {
                self.sleeper.sleep(self.player_delay).await;
            }
        }
        Ok(())
    }

    /// Headshot, then stats, then the store writes. Returns whether the stats
    /// came from the API; after exhausted retries a zeroed row is written instead.
    async fn ingest_player(
        &self,
        conn: &mut SqliteConnection,
        entry: &RosterEntry,
        known_teams: &HashSet<String>,
    ) -> Result<bool> {
        let (first_name, last_name) = names_from_roster(&entry.last_comma_first, &entry.first_last);
        tracing::info!("Processing player: {} {}", first_name, last_name);

        let team_id = match &entry.team_id {
            Some(id) if known_teams.contains(id) => Some(id.clone()),
            Some(id) => {
                tracing::warn!("Player {} lists unknown team {}, storing as free agent", entry.player_id, id);
                None
            }
            None => None,
        };

        let display_name = format!("{}_{}", first_name, last_name);
        let headshot_path = self
            .images
            .fetch(EntityKind::Player, &entry.player_id.to_string(), &display_name)
            .await
            .map(|p| p.to_string_lossy().into_owned());

        let label = format!("stats for {} {}", first_name, last_name);
        let (stats, fetched) = match self
            .retry
            .run(self.sleeper.as_ref(), &label, || self.stats.try_fetch(entry.player_id, &self.season))
            .await
        {
            Ok(stats) => (stats, true),
            Err(e) if e.is_retryable() => {
                tracing::warn!("Persisting {} {} with zeroed stats: {}", first_name, last_name, e);
                (PlayerStats::zeroed(entry.player_id, &self.season), false)
            }
            Err(e) => return Err(anyhow!(e).context(format!("stats for player {}", entry.player_id))),
        };

        let player = Player {
            id: entry.player_id,
            first_name,
            last_name,
            team_id,
            headshot_path,
            jersey_number: None,
            position: None,
            height: None,
            weight: None,
        };
        upsert_player(&mut *conn, &player).await?;
        upsert_player_stats(&mut *conn, &stats).await?;
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::temp_pool;
    use crate::db::{check_integrity, get_all_players, get_player_by_id, get_player_stats, get_player_stats_for_season};
    use crate::services::http::testing::{not_found, param, unavailable, RecordingSleeper, ScriptedHttp};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LAKERS: &str = "1610612747";
    const BUCKS: &str = "1610612749";

    fn roster_body(rows: Value) -> Value {
        json!({
            "resource": "commonallplayers",
            "resultSets": [{
                "name": "CommonAllPlayers",
                "headers": ["PERSON_ID", "DISPLAY_LAST_COMMA_FIRST", "DISPLAY_FIRST_LAST", "ROSTERSTATUS",
                            "FROM_YEAR", "TO_YEAR", "PLAYERCODE", "PLAYER_SLUG", "TEAM_ID"],
                "rowSet": rows
            }]
        })
    }

    fn roster_row(id: i64, comma: &str, plain: &str, active: i64, team: i64) -> Value {
        json!([id, comma, plain, active, "2003", "2024", "code", "slug", team])
    }

    fn stats_body(gp: i64, pts: f64) -> Value {
        json!({
            "resultSets": [{
                "name": "SeasonTotalsRegularSeason",
                "headers": ["GP", "GS", "MIN", "FG_PCT", "FG3_PCT", "FT_PCT", "REB", "AST", "STL", "BLK", "PTS"],
                "rowSet": [[gp, gp, 34.0, 0.5, 0.4, 0.8, 7.0, 8.0, 1.2, 0.6, pts]]
            }]
        })
    }

    fn is_roster(url: &str) -> bool {
        url.ends_with("/commonallplayers")
    }

    fn player_param(query: &[(&str, String)]) -> i64 {
        param(query, "PlayerID").and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    fn images_ok(http: ScriptedHttp) -> ScriptedHttp {
        http.on_bytes(|_| Ok(b"img".to_vec()))
    }

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            image_root: dir.to_path_buf(),
            player_delay: Duration::ZERO,
            stats_retry_base: Duration::from_secs(1),
            ..Config::default()
        }
    }

    fn scraper(pool: &SqlitePool, http: Arc<ScriptedHttp>, config: &Config, sleeper: Arc<RecordingSleeper>) -> RosterScraper {
        RosterScraper::new(pool.clone(), http, config).with_sleeper(sleeper)
    }

    #[test]
    fn test_roster_entry_from_row() {
        let entry = RosterEntry::from_row(roster_row(2544, "James, LeBron", "LeBron James", 1, 1610612747).as_array().unwrap()).unwrap();
        assert_eq!(entry.player_id, 2544);
        assert!(entry.active);
        assert_eq!(entry.team_id.as_deref(), Some(LAKERS));

        let free_agent = RosterEntry::from_row(roster_row(7, "Doe, John", "John Doe", 1, 0).as_array().unwrap()).unwrap();
        assert_eq!(free_agent.team_id, None);

        let retired = RosterEntry::from_row(roster_row(8, "Old, Timer", "Timer Old", 0, 0).as_array().unwrap()).unwrap();
        assert!(!retired.active);

        assert!(RosterEntry::from_row(&[json!(null), json!("X, Y")]).is_err());
        assert!(RosterEntry::from_row(&[json!(9)]).is_err());
    }

    #[tokio::test]
    async fn test_retry_then_success_persists_stats() {
        let (dir, pool) = temp_pool().await;
        let stats_calls = Arc::new(AtomicUsize::new(0));
        let counter = stats_calls.clone();
        let http = Arc::new(images_ok(ScriptedHttp::new()).on_json(move |url, _| {
            if is_roster(url) {
                return Ok(roster_body(json!([roster_row(2544, "James, LeBron", "LeBron James", 1, 1610612747)])));
            }
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable(url))
            } else {
                Ok(stats_body(70, 23.7))
            }
        }));
        let sleeper = Arc::new(RecordingSleeper::default());

        let report = scraper(&pool, http, &test_config(dir.path()), sleeper.clone()).run().await.unwrap();

        assert_eq!(stats_calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.durations(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(report.players_persisted, 1);
        assert_eq!(report.players_without_stats, 0);

        let stats = get_player_stats(&pool, 2544).await.unwrap().unwrap();
        assert_eq!(stats.games_played, 70);
        assert_eq!(stats.points_per_game, 23.7);
        let lebron = get_player_by_id(&pool, 2544).await.unwrap().unwrap();
        assert_eq!((lebron.first_name.as_str(), lebron.last_name.as_str()), ("LeBron", "James"));
        assert_eq!(lebron.team_id.as_deref(), Some(LAKERS));
        assert!(lebron.headshot_path.unwrap().ends_with("2544_lebron_james.png"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_persist_player_with_zeroed_stats() {
        let (dir, pool) = temp_pool().await;
        let http = Arc::new(images_ok(ScriptedHttp::new()).on_json(|url, _| {
            if is_roster(url) {
                Ok(roster_body(json!([roster_row(203507, "Antetokounmpo, Giannis", "Giannis Antetokounmpo", 1, 1610612749)])))
            } else {
                Err(unavailable(url))
            }
        }));
        let sleeper = Arc::new(RecordingSleeper::default());

        let report = scraper(&pool, http.clone(), &test_config(dir.path()), sleeper.clone()).run().await.unwrap();

        assert_eq!(http.calls_matching("playerprofilev2"), 3);
        assert_eq!(sleeper.durations(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(report.players_persisted, 1);
        assert_eq!(report.players_without_stats, 1);
        assert_eq!(get_player_by_id(&pool, 203507).await.unwrap().unwrap().team_id.as_deref(), Some(BUCKS));
        let stats = get_player_stats_for_season(&pool, 203507, "2024-25").await.unwrap().unwrap();
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.points_per_game, 0.0);
        assert!(stats.percentages().iter().all(|(_, v)| *v == 0.0));
    }

    #[tokio::test]
    async fn test_processing_error_skips_only_that_player() {
        let (dir, pool) = temp_pool().await;
        let http = Arc::new(images_ok(ScriptedHttp::new()).on_json(|url, query| {
            if is_roster(url) {
                return Ok(roster_body(json!([
                    roster_row(1, "Bad, Numbers", "Numbers Bad", 1, 1610612747),
                    [null, "Broken, Row"],
                    roster_row(2, "Good, Player", "Player Good", 1, 1610612747),
                ])));
            }
            match player_param(query) {
                // percentages reported as 0-100: rejected without retrying
                1 => Ok(json!({ "resultSets": [{ "headers": ["GP", "FG_PCT"], "rowSet": [[10, 48.5]] }] })),
                _ => Ok(stats_body(12, 9.5)),
            }
        }));
        let sleeper = Arc::new(RecordingSleeper::default());

        let report = scraper(&pool, http.clone(), &test_config(dir.path()), sleeper.clone()).run().await.unwrap();

        assert_eq!(report.players_seen, 3);
        assert_eq!(report.players_skipped, 2);
        assert_eq!(report.players_persisted, 1);
        assert!(sleeper.durations().is_empty());
        assert!(get_player_by_id(&pool, 1).await.unwrap().is_none());
        assert_eq!(get_player_stats(&pool, 2).await.unwrap().unwrap().games_played, 12);
        assert_eq!(http.calls_matching("PlayerID=1&"), 1);
    }

    #[tokio::test]
    async fn test_roster_failure_fails_the_run_but_keeps_teams() {
        let (dir, pool) = temp_pool().await;
        let http = Arc::new(images_ok(ScriptedHttp::new()).on_json(|url, _| Err(unavailable(url))));

        let result = scraper(&pool, http, &test_config(dir.path()), Arc::new(RecordingSleeper::default())).run().await;

        assert!(result.is_err());
        assert!(get_all_players(&pool).await.unwrap().is_empty());
        assert_eq!(check_integrity(&pool).await.unwrap().teams, 30);
    }

    #[tokio::test]
    async fn test_filters_inactive_and_keeps_referential_integrity() {
        let (dir, pool) = temp_pool().await;
        let http = Arc::new(
            ScriptedHttp::new()
                .on_bytes(|url| if url.contains("/headshots/") && url.ends_with("/3.png") { Err(not_found(url)) } else { Ok(b"img".to_vec()) })
                .on_json(|url, query| {
                    if is_roster(url) {
                        return Ok(roster_body(json!([
                            roster_row(1, "Active, Laker", "Laker Active", 1, 1610612747),
                            roster_row(2, "Retired, Guy", "Guy Retired", 0, 1610612747),
                            roster_row(3, "Free, Agent", "Agent Free", 1, 0),
                            roster_row(4, "Overseas, Team", "Team Overseas", 1, 1612709890),
                            roster_row(5, "Rookie", "Rookie", 1, 1610612749),
                        ])));
                    }
                    match player_param(query) {
                        5 => Ok(json!({ "resultSets": [{ "headers": ["GP", "PTS"], "rowSet": [] }] })),
                        _ => Ok(stats_body(40, 11.0)),
                    }
                }),
        );
        let mut config = test_config(dir.path());
        config.player_delay = Duration::from_millis(1500);
        let sleeper = Arc::new(RecordingSleeper::default());

        let report = scraper(&pool, http.clone(), &config, sleeper.clone()).run().await.unwrap();

        assert_eq!(report.teams_seeded, 30);
        assert_eq!(report.players_seen, 5);
        assert_eq!(report.players_inactive, 1);
        assert_eq!(report.players_persisted, 4);
        assert_eq!(http.calls_matching("PlayerID=2&"), 0);
        // one pause per active player, none for the inactive one
        assert_eq!(sleeper.durations(), vec![Duration::from_millis(1500); 4]);

        let players = get_all_players(&pool).await.unwrap();
        assert_eq!(players.len(), 4);
        assert!(get_player_by_id(&pool, 3).await.unwrap().unwrap().team_id.is_none());
        assert!(get_player_by_id(&pool, 3).await.unwrap().unwrap().headshot_path.is_none());
        assert!(get_player_by_id(&pool, 4).await.unwrap().unwrap().team_id.is_none());

        let rookie = get_player_by_id(&pool, 5).await.unwrap().unwrap();
        assert_eq!((rookie.first_name.as_str(), rookie.last_name.as_str()), ("Rookie", "Rookie"));
        let rookie_stats = get_player_stats_for_season(&pool, 5, "2024-25").await.unwrap().unwrap();
        assert_eq!(rookie_stats.games_played, 0);
        assert_eq!(rookie_stats.points_per_game, 0.0);

        let integrity = check_integrity(&pool).await.unwrap();
        assert_eq!(integrity.dangling_player_teams, 0);
        assert_eq!(integrity.dangling_stats, 0);
    }

    #[tokio::test]
    async fn test_rerun_upserts_instead_of_duplicating() {
        let (dir, pool) = temp_pool().await;
        let traded = Arc::new(AtomicUsize::new(0));
        let flag = traded.clone();
        let http = Arc::new(images_ok(ScriptedHttp::new()).on_json(move |url, _| {
            if is_roster(url) {
                let team = if flag.load(Ordering::SeqCst) == 0 { 1610612742 } else { 1610612747 };
                Ok(roster_body(json!([roster_row(1629029, "Doncic, Luka", "Luka Doncic", 1, team)])))
            } else {
                Ok(stats_body(50, 28.2))
            }
        }));
        let config = test_config(dir.path());
        let sleeper = Arc::new(RecordingSleeper::default());

        scraper(&pool, http.clone(), &config, sleeper.clone()).run().await.unwrap();
        traded.store(1, Ordering::SeqCst);
        scraper(&pool, http.clone(), &config, sleeper).run().await.unwrap();

        let players = get_all_players(&pool).await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].team_id.as_deref(), Some(LAKERS));
        assert_eq!(check_integrity(&pool).await.unwrap().stats_rows, 1);
        // second run hits the headshot cache
        assert_eq!(http.calls_matching("/headshots/"), 1);
    }

    #[tokio::test]
    async fn test_teams_only_run() {
        let (dir, pool) = temp_pool().await;
        let http = Arc::new(images_ok(ScriptedHttp::new()));

        let report = scraper(&pool, http.clone(), &test_config(dir.path()), Arc::new(RecordingSleeper::default()))
            .run_teams_only()
            .await
            .unwrap();

        assert_eq!(report.teams_seeded, 30);
        assert_eq!(http.calls_matching("commonallplayers"), 0);
    }
}
