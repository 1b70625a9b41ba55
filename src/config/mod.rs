use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:resources/data/nba_data.db";
pub const DEFAULT_SEASON: &str = "2024-25";
pub const DEFAULT_STATS_BASE_URL: &str = "https://stats.nba.com/stats";
pub const DEFAULT_HEADSHOT_URL: &str =
    "https://ak-static.cms.nba.com/wp-content/uploads/headshots/nba/latest/260x190/{id}.png";
pub const DEFAULT_LOGO_URL: &str = "https://cdn.nba.com/logos/nba/{id}/primary/L/logo.svg";

/// Runtime settings, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub image_root: PathBuf,
    pub season: String,
    pub league_id: String,
    pub stats_base_url: String,
    pub headshot_url_template: String,
    pub logo_url_template: String,
    pub http_timeout: Duration,
    pub stats_max_attempts: u32,
    pub stats_retry_base: Duration,
    pub player_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            image_root: PathBuf::from("resources"),
            season: DEFAULT_SEASON.to_string(),
            league_id: "00".to_string(),
            stats_base_url: DEFAULT_STATS_BASE_URL.to_string(),
            headshot_url_template: DEFAULT_HEADSHOT_URL.to_string(),
            logo_url_template: DEFAULT_LOGO_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            stats_max_attempts: 3,
            stats_retry_base: Duration::from_millis(1000),
            player_delay: Duration::from_millis(1500),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so tests don't have to
    /// mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        Self {
            database_url: text("DATABASE_URL", defaults.database_url),
            image_root: lookup("IMAGE_ROOT")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.image_root),
            season: text("NBA_SEASON", defaults.season),
            league_id: text("NBA_LEAGUE_ID", defaults.league_id),
            stats_base_url: text("NBA_STATS_BASE_URL", defaults.stats_base_url)
                .trim_end_matches('/')
                .to_string(),
            headshot_url_template: text("NBA_HEADSHOT_URL", defaults.headshot_url_template),
            logo_url_template: text("NBA_LOGO_URL", defaults.logo_url_template),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)),
            stats_max_attempts: parse_or(&lookup, "STATS_MAX_ATTEMPTS", 3u32).max(1),
            stats_retry_base: Duration::from_millis(parse_or(&lookup, "STATS_RETRY_BASE_MS", 1000)),
            player_delay: Duration::from_millis(parse_or(&lookup, "PLAYER_DELAY_MS", 1500)),
        }
    }

    pub fn with_season(mut self, season: Option<String>) -> Self {
        if let Some(season) = season {
            self.season = season;
        }
        self
    }

    pub fn player_images_dir(&self) -> PathBuf {
        self.image_root.join("player_images")
    }

    pub fn team_logos_dir(&self) -> PathBuf {
        self.image_root.join("team_logos")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed {}='{}', using {}", key, raw, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.season, "2024-25");
        assert_eq!(config.stats_max_attempts, 3);
        assert_eq!(config.stats_retry_base, Duration::from_secs(1));
        assert_eq!(config.player_delay, Duration::from_millis(1500));
        assert_eq!(config.player_images_dir(), PathBuf::from("resources/player_images"));
    }

    #[test]
    fn test_overrides_and_malformed_numbers() {
        let config = Config::from_lookup(lookup_from(&[
            ("NBA_SEASON", "2023-24"),
            ("NBA_STATS_BASE_URL", "http://localhost:9000/stats/"),
            ("STATS_RETRY_BASE_MS", "250"),
            ("PLAYER_DELAY_MS", "soon"),
            ("STATS_MAX_ATTEMPTS", "0"),
        ]));
        assert_eq!(config.season, "2023-24");
        assert_eq!(config.stats_base_url, "http://localhost:9000/stats");
        assert_eq!(config.stats_retry_base, Duration::from_millis(250));
        assert_eq!(config.player_delay, Duration::from_millis(1500));
        assert_eq!(config.stats_max_attempts, 1);
    }

    #[test]
    fn test_cli_season_overrides_environment() {
        let config = Config::default().with_season(Some("2022-23".into()));
        assert_eq!(config.season, "2022-23");
        let config = config.with_season(None);
        assert_eq!(config.season, "2022-23");
    }
}
