//! Proxy Pool - SOCKS5 relay harvester and geo-aware pool
//!
//! Fetches candidate relay lists, validates them concurrently through a
//! SOCKS5 tunnel, persists working relays with their latency and serves a
//! cached, periodically refreshed working set. Relays handed out by the
//! selector are re-checked live and enriched with timezone, country and
//! language resolved from an IP range table.

pub mod config;
pub mod database;
pub mod error;
pub mod proxy;

pub use config::Config;
pub use database::ProxyDatabase;
pub use error::Error;
pub use proxy::*;

/// Application result type
pub type Result<T> = std::result::Result<T, Error>;
