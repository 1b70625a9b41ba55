use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::FetchError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Everything the pipeline needs from the network: one JSON GET and one raw GET.
#[async_trait]
pub trait HttpSource: Send + Sync {
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError>;

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed client carrying the headers stats.nba.com insists on.
pub struct NbaHttpClient {
    client: Client,
}

impl NbaHttpClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::REFERER, "https://www.nba.com".parse()?);
        headers.insert(reqwest::header::ACCEPT, "application/json, */*".parse()?);

        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSource for NbaHttpClient {
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let response = self.client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status { status: response.status().as_u16(), url: url.to_string() });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status { status: response.status().as_u16(), url: url.to_string() });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// In-process fakes for the network and clock seams.
#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::services::retry::Sleeper;
    use std::sync::Mutex;
    use std::time::Duration;

    type JsonHandler = Box<dyn Fn(&str, &[(&str, String)]) -> Result<Value, FetchError> + Send + Sync>;
    type BytesHandler = Box<dyn Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync>;

    /// Answers every request through a closure and records each URL it saw.
    pub struct ScriptedHttp {
        json: JsonHandler,
        bytes: BytesHandler,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedHttp {
        pub fn new() -> Self {
            Self {
                json: Box::new(|url, _| Err(not_found(url))),
                bytes: Box::new(|url| Err(not_found(url))),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn on_json<F>(mut self, handler: F) -> Self
        where
            F: Fn(&str, &[(&str, String)]) -> Result<Value, FetchError> + Send + Sync + 'static,
        {
            self.json = Box::new(handler);
            self
        }

        pub fn on_bytes<F>(mut self, handler: F) -> Self
        where
            F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync + 'static,
        {
            self.bytes = Box::new(handler);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls_matching(&self, needle: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| c.contains(needle)).count()
        }
    }

    pub fn not_found(url: &str) -> FetchError {
        FetchError::Status { status: 404, url: url.to_string() }
    }

    pub fn unavailable(url: &str) -> FetchError {
        FetchError::Status { status: 503, url: url.to_string() }
    }

    /// Look up one query parameter by name.
    pub fn param<'a>(query: &'a [(&str, String)], key: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[async_trait]
    impl HttpSource for ScriptedHttp {
        async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
            let rendered = query.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
            self.calls.lock().unwrap().push(format!("{url}?{rendered}"));
            (self.json)(url, query)
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            (self.bytes)(url)
        }
    }

    /// Records requested pauses instead of sleeping.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn durations(&self) -> Vec<Duration> {
            self.slept.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }
}
