//! Blocking HTTP client behind the [`Fetch`] seam
//!
//! The installer only ever needs three requests: a streaming GET for the
//! archive, and HEAD / ranged GET probes for URL pre-checks. Tests swap in a
//! scripted [`Fetch`] implementation instead of touching the network.

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, RANGE};
use tracing::debug;

use super::DownloadError;

/// Connection timeout: time to establish TCP connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default per-request timeout for archive downloads
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for HEAD / ranged probes during URL pre-checks
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// A response whose body is streamed on demand
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// URL after redirects
    pub final_url: String,
    pub body: Box<dyn Read + Send>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("final_url", &self.final_url)
            .finish_non_exhaustive()
    }
}

/// Network access used by the downloader and URL checker
pub trait Fetch: Send + Sync {
    /// Streaming GET following redirects
    fn get(&self, url: &str) -> Result<FetchResponse, DownloadError>;

    /// HEAD following redirects; returns the final status code
    fn head(&self, url: &str) -> Result<u16, DownloadError>;

    /// GET of the first byte only (`Range: bytes=0-0`); returns the status
    fn probe_range(&self, url: &str) -> Result<u16, DownloadError>;
}

impl<T: Fetch + ?Sized> Fetch for &T {
    fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        (**self).get(url)
    }
    fn head(&self, url: &str) -> Result<u16, DownloadError> {
        (**self).head(url)
    }
    fn probe_range(&self, url: &str) -> Result<u16, DownloadError> {
        (**self).probe_range(url)
    }
}

impl<T: Fetch + ?Sized> Fetch for std::sync::Arc<T> {
    fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        (**self).get(url)
    }
    fn head(&self, url: &str) -> Result<u16, DownloadError> {
        (**self).head(url)
    }
    fn probe_range(&self, url: &str) -> Result<u16, DownloadError> {
        (**self).probe_range(url)
    }
}

/// reqwest-backed [`Fetch`]
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Client for archive downloads
    pub fn new() -> Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Client whose connect and body reads each give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("modlist-installer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Client for URL pre-checks
    pub fn for_probes() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("modlist-installer/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

impl Fetch for HttpClient {
    fn get(&self, url: &str) -> Result<FetchResponse, DownloadError> {
        debug!("GET {}", truncate_url(url));
        let response = self.client.get(url).send().map_err(|e| classify(url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();

        Ok(FetchResponse {
            status,
            content_type,
            final_url,
            body: Box::new(response),
        })
    }

    fn head(&self, url: &str) -> Result<u16, DownloadError> {
        let response = self.client.head(url).send().map_err(|e| classify(url, e))?;
        Ok(response.status().as_u16())
    }

    fn probe_range(&self, url: &str) -> Result<u16, DownloadError> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .map_err(|e| classify(url, e))?;
        Ok(response.status().as_u16())
    }
}

/// Map a reqwest error onto the download error taxonomy
fn classify(url: &str, err: reqwest::Error) -> DownloadError {
    let url = truncate_url(url);
    if err.is_timeout() {
        DownloadError::Timeout(url)
    } else if err.is_connect() || err.is_request() {
        DownloadError::Connection {
            url,
            reason: err.to_string(),
        }
    } else {
        DownloadError::Other(format!("{}: {}", url, err))
    }
}

/// Truncate URL for log and error messages
pub(crate) fn truncate_url(url: &str) -> String {
    truncate(url, 80)
}

/// Cut `text` to at most `max` characters, ending in `...` when cut
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
