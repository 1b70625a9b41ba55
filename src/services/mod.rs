pub mod http;
pub mod image_fetcher;
pub mod retry;
pub mod roster_scraper;
pub mod stats_fetcher;

pub use http::NbaHttpClient;
pub use roster_scraper::RosterScraper;
pub use stats_fetcher::StatsFetcher;
