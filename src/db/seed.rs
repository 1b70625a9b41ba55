use anyhow::Result;
use sqlx::SqlitePool;

use crate::db::upsert_team;
use crate::models::Conference::{self, Eastern, Western};
use crate::models::Team;
use crate::services::image_fetcher::{EntityKind, ImageFetcher};

/// (id, name, abbreviation, conference, division)
pub const NBA_TEAMS: [(&str, &str, &str, Conference, &str); 30] = [
    ("1610612737", "Atlanta Hawks",          "ATL", Eastern, "Southeast"),
    ("1610612738", "Boston Celtics",         "BOS", Eastern, "Atlantic"),
    ("1610612751", "Brooklyn Nets",          "BKN", Eastern, "Atlantic"),
    ("1610612766", "Charlotte Hornets",      "CHA", Eastern, "Southeast"),
    ("1610612741", "Chicago Bulls",          "CHI", Eastern, "Central"),
    ("1610612739", "Cleveland Cavaliers",    "CLE", Eastern, "Central"),
    ("1610612742", "Dallas Mavericks",       "DAL", Western, "Southwest"),
    ("1610612743", "Denver Nuggets",         "DEN", Western, "Northwest"),
    ("1610612765", "Detroit Pistons",        "DET", Eastern, "Central"),
    ("1610612744", "Golden State Warriors",  "GSW", Western, "Pacific"),
    ("1610612745", "Houston Rockets",        "HOU", Western, "Southwest"),
    ("1610612754", "Indiana Pacers",         "IND", Eastern, "Central"),
    ("1610612746", "LA Clippers",            "LAC", Western, "Pacific"),
    ("1610612747", "Los Angeles Lakers",     "LAL", Western, "Pacific"),
    ("1610612763", "Memphis Grizzlies",      "MEM", Western, "Southwest"),
    ("1610612748", "Miami Heat",             "MIA", Eastern, "Southeast"),
    ("1610612749", "Milwaukee Bucks",        "MIL", Eastern, "Central"),
    ("1610612750", "Minnesota Timberwolves", "MIN", Western, "Northwest"),
    ("1610612740", "New Orleans Pelicans",   "NOP", Western, "Southwest"),
    ("1610612752", "New York Knicks",        "NYK", Eastern, "Atlantic"),
    ("1610612760", "Oklahoma City Thunder",  "OKC", Western, "Northwest"),
    ("1610612753", "Orlando Magic",          "ORL", Eastern, "Southeast"),
    ("1610612755", "Philadelphia 76ers",     "PHI", Eastern, "Atlantic"),
    ("1610612756", "Phoenix Suns",           "PHX", Western, "Pacific"),
    ("1610612757", "Portland Trail Blazers", "POR", Western, "Northwest"),
    ("1610612758", "Sacramento Kings",       "SAC", Western, "Pacific"),
    ("1610612759", "San Antonio Spurs",      "SAS", Western, "Southwest"),
    ("1610612761", "Toronto Raptors",        "TOR", Eastern, "Atlantic"),
    ("1610612762", "Utah Jazz",              "UTA", Western, "Northwest"),
    ("1610612764", "Washington Wizards",     "WAS", Eastern, "Southeast"),
];

/// Writes the 30 fixed teams in one transaction, fetching any logo that is
/// not cached yet. A missing logo leaves `logo_path` unset.
pub async fn seed_teams(pool: &SqlitePool, images: &ImageFetcher) -> Result<Vec<Team>> {
    tracing::info!("Seeding {} NBA teams...", NBA_TEAMS.len());

    let mut tx = pool.begin().await?;
    let mut teams = Vec::with_capacity(NBA_TEAMS.len());

    for (id, name, abbreviation, conference, division) in NBA_TEAMS {
        let logo_path = images
            .fetch(EntityKind::Team, id, name)
            .await
            .map(|p| p.to_string_lossy().into_owned());

        let team = Team {
            id: id.to_string(),
            name: name.to_string(),
            abbreviation: abbreviation.to_string(),
            conference,
            division: division.to_string(),
            logo_path,
        };
        upsert_team(&mut *tx, &team).await?;
        teams.push(team);
    }

    tx.commit().await?;
    tracing::info!("Teams seeded ({} logos available)", teams.iter().filter(|t| t.logo_path.is_some()).count());
    Ok(teams)
}
