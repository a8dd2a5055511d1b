//! Proxy module for harvesting, validating and serving relays
//!
//! This module provides functionality for:
//! - Fetching candidate relay lists from a plain-text source
//! - Probing candidates through a SOCKS5 tunnel in bounded batches
//! - Bulk-importing unchecked candidates with parallel workers
//! - Caching a refreshed working set of verified relays
//! - Resolving exit addresses to timezone, country and language
//! - Selecting a live relay that satisfies the locale policy

pub mod checker;
pub mod crawler;
pub mod geo;
pub mod harvester;
pub mod importer;
pub mod models;
pub mod parser;
pub mod pool;
pub mod progress;
pub mod selector;
pub mod validator;

pub use checker::{CheckerConfig, EchoResponse, ProbeError, ProxyChecker, RelayProbe};
pub use crawler::{CrawlerConfig, ProxyCrawler};
pub use geo::{convert_ip_address, int_to_ip_address, GeoCache, GeoConfig, GeoResolver};
pub use harvester::{CrawlSummary, Harvester};
pub use importer::{BulkImporter, ImportReport, ImporterConfig};
pub use models::{
    GeoInfo, GeoRange, Proxy, ProxyCheckResult, ProxyCheckStatus, ProxyType, Relay,
    SelectedRelay, UNCHECKED_LATENCY,
};
pub use parser::ProxyParser;
pub use pool::{PoolConfig, PoolStats, ProxyPool};
pub use selector::{RelaySelector, SelectorConfig};
pub use validator::{BatchValidator, ValidationReport, ValidatorConfig};
