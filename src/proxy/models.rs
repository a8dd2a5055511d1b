//! Proxy data models

use crate::proxy::checker::ProbeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Latency stored for relays inserted without validation
pub const UNCHECKED_LATENCY: i64 = 0;

/// Proxy type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Https,
    Socks4,
    #[default]
    Socks5,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            _ => Err(format!(
                "Invalid proxy type: {}. Use: http, https, socks4, socks5",
                s
            )),
        }
    }
}

/// A relay endpoint, either a fresh candidate or one drawn from the pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proxy {
    pub host: Ipv4Addr,
    pub port: u16,
    pub proxy_type: ProxyType,
}

impl Proxy {
    pub fn new(host: Ipv4Addr, port: u16, proxy_type: ProxyType) -> Self {
        Self {
            host,
            port,
            proxy_type,
        }
    }

    /// Get the proxy URL string used to tunnel through this relay
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.proxy_type, self.host, self.port)
    }

    /// Get the proxy URL handed to downstream clients.
    ///
    /// Downstream clients are configured with a fixed scheme regardless of
    /// the tunnel type the relay was validated with.
    pub fn public_url(&self, scheme: ProxyType) -> String {
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Get the proxy string in IP:PORT format
    pub fn to_simple_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// A relay row as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    /// Row id assigned by the store
    pub id: i64,
    pub host: Ipv4Addr,
    pub port: u16,
    /// Probe latency in milliseconds, [`UNCHECKED_LATENCY`] when never probed
    pub latency_ms: i64,
}

impl Relay {
    /// The SOCKS5 endpoint for this relay
    pub fn proxy(&self) -> Proxy {
        Proxy::new(self.host, self.port, ProxyType::Socks5)
    }
}

/// Result of proxy check operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProxyCheckStatus {
    Working,
    Failed(ProbeError),
}

/// Detailed result of a proxy check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyCheckResult {
    pub proxy: Proxy,
    pub status: ProxyCheckStatus,
    pub response_time_ms: Option<u64>,
    /// Address the echo endpoint saw the request coming from
    pub origin: Option<String>,
}

impl ProxyCheckResult {
    pub fn working(proxy: Proxy, response_time_ms: u64) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Working,
            response_time_ms: Some(response_time_ms),
            origin: None,
        }
    }

    pub fn failed(proxy: Proxy, error: ProbeError) -> Self {
        Self {
            proxy,
            status: ProxyCheckStatus::Failed(error),
            response_time_ms: None,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: String) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn is_working(&self) -> bool {
        matches!(self.status, ProxyCheckStatus::Working)
    }

    /// Latency to persist for a working relay
    pub fn latency_ms(&self) -> Option<i64> {
        match self.status {
            ProxyCheckStatus::Working => self
                .response_time_ms
                .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
            ProxyCheckStatus::Failed(_) => None,
        }
    }
}

/// One row of the IP range reference table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoRange {
    /// Inclusive lower bound
    pub ip_low: u32,
    /// Inclusive upper bound
    pub ip_high: u32,
    /// ISO 3166-1 alpha-2 country code
    pub country_code: String,
    /// UTC offset in minutes
    pub timezone_offset: Option<i32>,
    /// Language tag such as "en-US"
    pub language: Option<String>,
}

impl GeoRange {
    pub fn contains(&self, value: u32) -> bool {
        self.ip_low <= value && value <= self.ip_high
    }
}

/// Locale metadata resolved for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub timezone_offset: i32,
    pub country_code: Option<String>,
    pub language: String,
}

/// A relay that passed the live check and the locale policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedRelay {
    /// URL to configure the downstream client with
    pub proxy_url: String,
    /// Public address observed through the relay
    pub origin_ip: String,
    pub timezone_offset: i32,
    pub country_code: Option<String>,
    pub language: String,
}
