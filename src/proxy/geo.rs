//! Geolocation module resolving an address to timezone, country and language
//!
//! Addresses are matched against the `ip_data` range table by their
//! big-endian integer value. Results, including fallbacks to the defaults,
//! are memoized per address string for the lifetime of the [`GeoCache`]; the
//! reference table is static so entries never expire.

use crate::database::ProxyDatabase;
use crate::error::Error;
use crate::proxy::models::GeoInfo;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Fallbacks used when no range matches or a range has gaps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// UTC offset in minutes
    pub default_timezone_offset: i32,
    pub default_language: String,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            default_timezone_offset: 0,
            default_language: "en".to_string(),
        }
    }
}

impl GeoConfig {
    fn fallback(&self) -> GeoInfo {
        GeoInfo {
            timezone_offset: self.default_timezone_offset,
            country_code: None,
            language: self.default_language.clone(),
        }
    }
}

/// Convert a dotted-quad address to its big-endian integer form.
///
/// `"127.0.0.1"` becomes `2130706433`.
pub fn convert_ip_address(value: &str) -> Result<u32> {
    let ip: Ipv4Addr = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidAddress(value.to_string()))?;
    Ok(u32::from(ip))
}

/// Inverse of [`convert_ip_address`]
pub fn int_to_ip_address(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

/// Address-keyed memo of resolved locales, shared between resolver clones
#[derive(Debug, Clone, Default)]
pub struct GeoCache {
    entries: Arc<RwLock<HashMap<String, GeoInfo>>>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, address: &str) -> Option<GeoInfo> {
        self.entries.read().await.get(address).cloned()
    }

    pub async fn insert(&self, address: String, info: GeoInfo) {
        self.entries.write().await.insert(address, info);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Resolves addresses against the range table, memoized through a [`GeoCache`]
#[derive(Debug, Clone)]
pub struct GeoResolver {
    db: ProxyDatabase,
    cache: GeoCache,
    config: GeoConfig,
}

impl GeoResolver {
    pub fn new(db: ProxyDatabase, config: GeoConfig) -> Self {
        Self::with_cache(db, config, GeoCache::new())
    }

    /// Build a resolver on top of an existing cache
    pub fn with_cache(db: ProxyDatabase, config: GeoConfig, cache: GeoCache) -> Self {
        Self { db, cache, config }
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    /// Resolve `address` to its locale.
    ///
    /// Unknown addresses resolve to the configured defaults. Only a malformed
    /// address or a store failure produces an error, and neither is cached.
    pub async fn resolve(&self, address: &str) -> Result<GeoInfo> {
        if let Some(info) = self.cache.get(address).await {
            return Ok(info);
        }

        let value = convert_ip_address(address)?;
        let info = match self.db.resolve_geo_range(value).await? {
            Some(range) => GeoInfo {
                timezone_offset: range
                    .timezone_offset
                    .unwrap_or(self.config.default_timezone_offset),
                country_code: Some(range.country_code),
                language: range
                    .language
                    .unwrap_or_else(|| self.config.default_language.clone()),
            },
            None => self.config.fallback(),
        };

        debug!(
            address = %address,
            timezone_offset = info.timezone_offset,
            country = info.country_code.as_deref().unwrap_or("-"),
            language = %info.language,
            "resolved address locale"
        );

        self.cache.insert(address.to_string(), info.clone()).await;
        Ok(info)
    }
}
