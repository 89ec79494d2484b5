//! HTTP fetcher for story pages and images.
//!
//! The stories site rejects default client identifiers, so every request
//! carries a desktop browser User-Agent and browser-like `Accept` headers.
//! Each request is bounded by its own timeout; there is no retry.

use super::{FetchedBytes, PageSource};
use crate::config::HttpConfig;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL {0:?}")]
    InvalidUrl(String),
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Short failure class recorded in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Status { .. } => "http",
            FetchError::Timeout { .. } => "timeout",
            FetchError::Network { .. } => "network",
        }
    }

    /// HTTP status code for error responses.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout { url: url.to_string() }
        } else if let Some(status) = e.status() {
            FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

/// Check that `url` is an absolute `http`/`https` URL.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    match Url::parse(url.trim()) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(url.to_string())),
    }
}

/// [`PageSource`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    page_timeout: Duration,
    image_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            page_timeout: config.page_timeout(),
            image_timeout: config.image_timeout(),
        })
    }

    async fn get(&self, url: &str, accept: &'static str, timeout: Duration) -> Result<Response, FetchError> {
        let parsed = validate_url(url)?;
        let response = self
            .client
            .get(parsed)
            .header(ACCEPT, accept)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        response
            .error_for_status()
            .map_err(|e| FetchError::from_reqwest(url, e))
    }
}

/// Lowercased media type of a response, without parameters such as charset.
fn media_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

impl PageSource for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.get(url, ACCEPT_HTML, self.page_timeout).await?;
        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(bytes = html.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched page");
        Ok(html)
    }

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_bytes(&self, url: &str) -> Result<FetchedBytes, FetchError> {
        let response = self.get(url, ACCEPT_IMAGE, self.image_timeout).await?;
        let content_type = media_type(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(bytes = bytes.len(), ?content_type, "Fetched resource");
        Ok(FetchedBytes {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
