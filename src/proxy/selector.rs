//! End-to-end selection of a working, policy-compliant relay
//!
//! Each attempt draws from the pool, confirms the relay still tunnels,
//! resolves the locale of the address it exits from and rejects relays
//! exiting in a denylisted country. Rejected relays stay in the pool and may
//! be drawn again later.

use crate::error::Error;
use crate::proxy::checker::{ProbeError, RelayProbe};
use crate::proxy::geo::GeoResolver;
use crate::proxy::models::{ProxyType, Relay, SelectedRelay};
use crate::proxy::pool::ProxyPool;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Countries whose exit addresses are never handed out
const DEFAULT_DENYLIST: &[&str] = &[
    "AZ", "AM", "BY", "KZ", "KG", "RU", "MD", "TJ", "TM", "UZ", "UA",
];

/// Configuration for the relay selector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// ISO 3166-1 alpha-2 codes rejected by policy
    pub denylist: Vec<String>,
    /// Give up after this many draws; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Scheme of the returned proxy URL
    pub public_scheme: ProxyType,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|c| c.to_string()).collect(),
            max_attempts: None,
            public_scheme: ProxyType::Http,
        }
    }
}

impl SelectorConfig {
    pub fn is_denied(&self, country_code: &str) -> bool {
        self.denylist
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(country_code))
    }
}

/// Why a drawn relay was not returned
#[derive(Debug)]
enum Rejection {
    /// The relay failed the live check
    Transient(ProbeError),
    /// The exit address could not be resolved
    Unresolvable(Error),
    /// The exit country is denylisted
    Policy { country: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Transient(e) => write!(f, "{}", e),
            Rejection::Unresolvable(e) => write!(f, "{}", e),
            Rejection::Policy { country } => write!(f, "exit country {} is denylisted", country),
        }
    }
}

pub struct RelaySelector<P: RelayProbe> {
    pool: ProxyPool,
    probe: P,
    resolver: GeoResolver,
    config: SelectorConfig,
}

impl<P: RelayProbe> RelaySelector<P> {
    pub fn new(pool: ProxyPool, probe: P, resolver: GeoResolver, config: SelectorConfig) -> Self {
        Self {
            pool,
            probe,
            resolver,
            config,
        }
    }

    pub fn pool(&self) -> &ProxyPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ProxyPool {
        &mut self.pool
    }

    pub fn resolver(&self) -> &GeoResolver {
        &self.resolver
    }

    /// Remove a relay the caller found dead from the cached pool
    pub fn evict(&mut self, relay: &Relay) -> bool {
        self.pool.evict(relay)
    }

    /// Draw relays until one passes the live check and the locale policy.
    ///
    /// Transient failures and policy rejections are logged and retried.
    /// Errors only come from the pool or from running out of
    /// `max_attempts`.
    pub async fn select(&mut self) -> Result<SelectedRelay> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let relay = self.pool.acquire().await?;

            match self.try_relay(&relay).await {
                Ok(selected) => {
                    info!(
                        proxy = %selected.proxy_url,
                        origin = %selected.origin_ip,
                        attempts,
                        "chosen proxy"
                    );
                    return Ok(selected);
                }
                Err(rejection @ Rejection::Policy { .. }) => {
                    debug!(proxy = %relay.proxy(), reason = %rejection, "bad proxy");
                }
                Err(rejection) => {
                    warn!(proxy = %relay.proxy(), reason = %rejection, "proxy check failed");
                }
            }

            if self.config.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::SelectionExhausted { attempts });
            }
        }
    }

    async fn try_relay(&self, relay: &Relay) -> std::result::Result<SelectedRelay, Rejection> {
        let proxy = relay.proxy();
        let echo = self
            .probe
            .live_check(&proxy)
            .await
            .map_err(Rejection::Transient)?;

        let origin_ip = echo.origin_ip().to_string();
        let info = self
            .resolver
            .resolve(&origin_ip)
            .await
            .map_err(Rejection::Unresolvable)?;

        if let Some(country) = info.country_code.as_deref() {
            if self.config.is_denied(country) {
                return Err(Rejection::Policy {
                    country: country.to_string(),
                });
            }
        }

        Ok(SelectedRelay {
            proxy_url: proxy.public_url(self.config.public_scheme),
            origin_ip,
            timezone_offset: info.timezone_offset,
            country_code: info.country_code,
            language: info.language,
        })
    }
}
