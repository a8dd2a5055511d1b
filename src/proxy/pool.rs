//! In-memory working set of verified relays
//!
//! The pool is a latency-ordered snapshot of the relay table. It is replaced
//! wholesale when it goes stale or runs empty, and it refuses to serve until
//! the table holds at least `min_size` relays. Selection ignores the ordering
//! and draws uniformly at random.

use crate::database::ProxyDatabase;
use crate::error::Error;
use crate::proxy::models::Relay;
use crate::Result;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Default maximum age of a loaded snapshot
const DEFAULT_STALENESS_SECS: u64 = 30 * 60;

/// Default minimum number of relays before the pool is usable
const DEFAULT_MIN_SIZE: usize = 1000;

/// Default wait between reload attempts while under-populated
const DEFAULT_BACKOFF_SECS: u64 = 60;

/// Configuration for the relay pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    #[serde(with = "humantime_serde")]
    pub staleness: Duration,
    pub min_size: usize,
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
    /// Give up after this many under-populated scans; `None` waits forever
    pub max_reload_attempts: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(DEFAULT_STALENESS_SECS),
            min_size: DEFAULT_MIN_SIZE,
            backoff: Duration::from_secs(DEFAULT_BACKOFF_SECS),
            max_reload_attempts: None,
        }
    }
}

/// Snapshot of the pool state for reporting
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// Process-local relay cache. Not synchronised: callers sharing a pool
/// across tasks must serialise access themselves.
pub struct ProxyPool {
    db: ProxyDatabase,
    config: PoolConfig,
    relays: Vec<Relay>,
    loaded_at: Option<Instant>,
    loaded_at_utc: Option<DateTime<Utc>>,
}

impl ProxyPool {
    pub fn new(db: ProxyDatabase, config: PoolConfig) -> Self {
        Self {
            db,
            config,
            relays: Vec::new(),
            loaded_at: None,
            loaded_at_utc: None,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// Whether the next [`acquire`](Self::acquire) will reload
    pub fn is_stale(&self) -> bool {
        match self.loaded_at {
            Some(loaded_at) => {
                self.relays.is_empty() || loaded_at.elapsed() > self.config.staleness
            }
            None => true,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.relays.len(),
            loaded_at: self.loaded_at_utc,
            stale: self.is_stale(),
        }
    }

    /// Replace the snapshot with a fresh ordered scan.
    ///
    /// Scans again after `backoff` while the table holds fewer than
    /// `min_size` relays, until `max_reload_attempts` is exhausted.
    pub async fn reload(&mut self) -> Result<usize> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let relays = self.db.scan_relays_ordered_by_latency().await?;
            info!(size = relays.len(), "load proxy complete");

            if relays.len() >= self.config.min_size {
                self.relays = relays;
                self.loaded_at = Some(Instant::now());
                self.loaded_at_utc = Some(Utc::now());
                return Ok(self.relays.len());
            }

            if self
                .config
                .max_reload_attempts
                .is_some_and(|max| attempts >= max)
            {
                return Err(Error::PoolUnderPopulated {
                    available: relays.len(),
                    required: self.config.min_size,
                    attempts,
                });
            }

            warn!(
                available = relays.len(),
                required = self.config.min_size,
                backoff = %humantime::format_duration(self.config.backoff),
                "relay pool under-populated, waiting"
            );
            tokio::time::sleep(self.config.backoff).await;
        }
    }

    /// Draw a relay uniformly at random, reloading first if stale or empty
    pub async fn acquire(&mut self) -> Result<Relay> {
        if self.is_stale() {
            self.reload().await?;
        }

        let relay = {
            let mut rng = rand::thread_rng();
            self.relays.choose(&mut rng).cloned()
        };

        relay.ok_or(Error::PoolUnderPopulated {
            available: 0,
            required: self.config.min_size,
            attempts: 1,
        })
    }

    /// Drop `relay` from the cached snapshot. The store is left untouched.
    pub fn evict(&mut self, relay: &Relay) -> bool {
        match self.relays.iter().position(|r| r == relay) {
            Some(index) => {
                self.relays.remove(index);
                true
            }
            None => false,
        }
    }
}
