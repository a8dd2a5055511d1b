//! Proxy crawler module for fetching candidate relay lists
//!
//! A relay source is a plain-text document with one `ip:port` candidate per
//! line. The crawler only splits the body; parsing and filtering happen
//! downstream so the candidate count reflects what the source served.

use crate::error::Error;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for proxy crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// URL serving the newline-delimited candidate list
    pub source_url: String,
    /// Timeout for HTTP requests
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_url(mut self, url: String) -> Self {
        self.source_url = url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Proxy crawler for fetching candidate lists from the configured source
pub struct ProxyCrawler {
    config: CrawlerConfig,
    client: Client,
}

impl ProxyCrawler {
    /// Create a new proxy crawler with custom configuration
    pub fn with_config(config: CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// Fetch the candidate list from the configured source.
    ///
    /// Transport failures come back as [`Error::SourceUnavailable`] and are
    /// not retried here.
    pub async fn fetch(&self) -> Result<Vec<String>> {
        self.fetch_url(&self.config.source_url).await
    }

    /// Fetch a candidate list from an explicit URL
    pub async fn fetch_url(&self, url: &str) -> Result<Vec<String>> {
        info!(url = %url, "fetching relay candidates");

        let unavailable = |e: reqwest::Error| Error::SourceUnavailable {
            url: url.to_string(),
            reason: describe_fetch_error(&e),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(unavailable)?;
        let content = response.text().await.map_err(unavailable)?;
        let lines = split_candidates(&content);

        debug!(url = %url, count = lines.len(), "relay candidates fetched");
        Ok(lines)
    }
}

/// Split a response body into candidate lines.
///
/// A trailing CR is stripped from every line; blank and malformed lines,
/// including the empty one after a final newline, are kept as-is.
pub fn split_candidates(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

fn describe_fetch_error(e: &reqwest::Error) -> String {
    if let Some(status) = e.status() {
        format!("HTTP status {}", status)
    } else if e.is_timeout() {
        format!("timeout: {}", e)
    } else if e.is_connect() {
        format!("connection error: {}", e)
    } else if e.is_decode() || e.is_body() {
        format!("decode error: {}", e)
    } else {
        e.to_string()
    }
}
