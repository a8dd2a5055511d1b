//! Proxy checker module for probing relays through a SOCKS5 tunnel

use crate::proxy::models::{Proxy, ProxyCheckResult};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Endpoint that reflects the caller's apparent address as JSON
const DEFAULT_ECHO_URL: &str = "http://httpbin.org/get?show_env=1";

/// Plain page fetched to confirm a relay can reach arbitrary sites
const DEFAULT_REACHABILITY_URL: &str = "http://www.iconspedia.com/";

/// Why a probe through a relay failed.
///
/// Carries the rendered original error so the cause survives into logs and
/// check results.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("connection error: {0}")]
    Connect(String),
    #[error("invalid response: {0}")]
    Protocol(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProbeError::Timeout(0)
        } else if e.is_connect() {
            ProbeError::Connect(e.to_string())
        } else if e.is_decode() || e.is_body() {
            ProbeError::Decode(e.to_string())
        } else if e.is_builder() {
            ProbeError::Client(e.to_string())
        } else {
            ProbeError::Protocol(e.to_string())
        }
    }
}

/// Body of the echo endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub origin: String,
}

impl EchoResponse {
    /// First address of the origin field.
    ///
    /// Some relays append their own hop, yielding `"a.b.c.d, e.f.g.h"`.
    pub fn origin_ip(&self) -> &str {
        self.origin.split(',').next().unwrap_or_default().trim()
    }
}

/// Network seam between the pool logic and the relays themselves
#[async_trait]
pub trait RelayProbe: Send + Sync {
    /// Validate a candidate: one echo request through the tunnel, timed.
    async fn check(&self, proxy: &Proxy) -> ProxyCheckResult;

    /// Re-confirm a pooled relay: the echo request followed by a request to
    /// the reachability URL. Returns what the echo endpoint reported.
    async fn live_check(&self, proxy: &Proxy) -> std::result::Result<EchoResponse, ProbeError>;
}

/// Configuration for proxy checker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Timeout for each proxy check
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// URL reflecting the caller's address
    pub echo_url: String,
    /// URL fetched during live checks
    pub reachability_url: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            echo_url: DEFAULT_ECHO_URL.to_string(),
            reachability_url: DEFAULT_REACHABILITY_URL.to_string(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_echo_url(mut self, url: String) -> Self {
        self.echo_url = url;
        self
    }

    pub fn with_reachability_url(mut self, url: String) -> Self {
        self.reachability_url = url;
        self
    }
}

/// Proxy checker backed by reqwest's SOCKS support
#[derive(Debug, Clone, Default)]
pub struct ProxyChecker {
    config: CheckerConfig,
}

impl ProxyChecker {
    /// Create a new proxy checker with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new proxy checker with custom configuration
    pub fn with_config(config: CheckerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Issue the echo request through `proxy` within the configured timeout
    async fn echo(&self, client: &Client) -> std::result::Result<EchoResponse, ProbeError> {
        let request = async {
            let response = client.get(&self.config.echo_url).send().await?;
            if !response.status().is_success() {
                return Err(ProbeError::Status(response.status().as_u16()));
            }
            Ok::<_, ProbeError>(response.json::<EchoResponse>().await?)
        };

        match tokio::time::timeout(self.config.timeout, request).await {
            Ok(result) => result.map_err(|e| self.with_elapsed(e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    async fn reach(&self, client: &Client) -> std::result::Result<(), ProbeError> {
        let request = async {
            client
                .get(&self.config.reachability_url)
                .send()
                .await?
                .bytes()
                .await?;
            Ok::<_, ProbeError>(())
        };

        match tokio::time::timeout(self.config.timeout, request).await {
            Ok(result) => result.map_err(|e| self.with_elapsed(e)),
            Err(_) => Err(self.timeout_error()),
        }
    }

    fn timeout_error(&self) -> ProbeError {
        ProbeError::Timeout(self.config.timeout.as_millis() as u64)
    }

    /// reqwest does not report how long it waited before timing out
    fn with_elapsed(&self, e: ProbeError) -> ProbeError {
        match e {
            ProbeError::Timeout(_) => self.timeout_error(),
            other => other,
        }
    }

    /// Create a reqwest client tunnelling through the proxy
    fn create_client(&self, proxy: &Proxy) -> Result<Client> {
        let client = Client::builder()
            .proxy(ReqwestProxy::all(proxy.url())?)
            .timeout(self.config.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(client)
    }
}

#[async_trait]
impl RelayProbe for ProxyChecker {
    async fn check(&self, proxy: &Proxy) -> ProxyCheckResult {
        let start = Instant::now();

        let client = match self.create_client(proxy) {
            Ok(client) => client,
            Err(e) => return ProxyCheckResult::failed(proxy.clone(), ProbeError::Client(e.to_string())),
        };

        match self.echo(&client).await {
            Ok(echo) => {
                let elapsed = start.elapsed().as_millis() as u64;
                ProxyCheckResult::working(proxy.clone(), elapsed).with_origin(echo.origin)
            }
            Err(e) => ProxyCheckResult::failed(proxy.clone(), e),
        }
    }

    async fn live_check(&self, proxy: &Proxy) -> std::result::Result<EchoResponse, ProbeError> {
        let client = self
            .create_client(proxy)
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        let echo = self.echo(&client).await?;
        self.reach(&client).await?;
        Ok(echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyType;
    use std::net::Ipv4Addr;

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.echo_url, DEFAULT_ECHO_URL);
        assert_eq!(config.reachability_url, DEFAULT_REACHABILITY_URL);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_echo_url("http://example.com/ip".to_string())
            .with_reachability_url("http://example.com/".to_string());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.echo_url, "http://example.com/ip");
        assert_eq!(config.reachability_url, "http://example.com/");
    }

    #[test]
    fn test_echo_origin_ip_takes_first_hop() {
        let echo: EchoResponse =
            serde_json::from_str(r#"{"args": {}, "origin": "198.51.100.9, 10.0.0.1"}"#).unwrap();
        assert_eq!(echo.origin_ip(), "198.51.100.9");

        let echo = EchoResponse {
            origin: "203.0.113.5".to_string(),
        };
        assert_eq!(echo.origin_ip(), "203.0.113.5");
    }

    #[test]
    fn test_echo_without_origin_fails_to_decode() {
        assert!(serde_json::from_str::<EchoResponse>(r#"{"args": {}}"#).is_err());
    }

    #[tokio::test]
    async fn test_check_dead_relay_fails() {
        let checker = ProxyChecker::with_config(
            CheckerConfig::new()
                .with_timeout(Duration::from_secs(2))
                .with_echo_url("http://127.0.0.1:1/get".to_string()),
        );
        let proxy = Proxy::new(Ipv4Addr::new(127, 0, 0, 1), 1, ProxyType::Socks5);

        let result = checker.check(&proxy).await;
        assert!(!result.is_working());
        assert!(result.latency_ms().is_none());
    }
}
