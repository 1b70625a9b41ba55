use thiserror::Error;

/// Errors raised while talking to the NBA stats / CDN endpoints.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure: connect, timeout, TLS, body read
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    /// Body was not the JSON shape we expect
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Body decoded but the values break a data invariant
    #[error("Invalid record: {0}")]
    Invalid(String),
}

impl FetchError {
    /// Transport, status and shape failures are worth another attempt;
    /// an invalid record will not get better by asking again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Invalid(_))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}
