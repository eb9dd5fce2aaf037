use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use tracing::info;

use crate::error::FetchError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT_VALUE: &str =
    concat!("RSS2ICal/", env!("CARGO_PKG_VERSION"), " (Rust reqwest client)");

pub const ACCEPT_VALUE: &str = "application/rss+xml, application/xml, text/xml, */*";

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
    headers
}

/// Downloads feeds with a single GET and a bounded overall timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(build_headers())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    /// Returns the response body of a `200 OK`. No retries.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let target = parse_url(url)?;

        info!(url, "fetching feed");
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        info!(url, status = status.as_u16(), "feed fetch status");
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(body.to_vec())
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}
