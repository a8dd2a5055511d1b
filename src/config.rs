//! Application configuration
//!
//! Loaded from a TOML file where every section and field is optional, then
//! overridden from `PROXY_POOL_*` environment variables and finally checked
//! with [`Config::validate`].

use crate::error::Error;
use crate::proxy::{
    CheckerConfig, CrawlerConfig, GeoConfig, ImporterConfig, PoolConfig, SelectorConfig,
    ValidatorConfig,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default database file path
const DEFAULT_DATABASE_URL: &str = "proxy.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file or URL
    pub database_url: String,
    /// Log level used when `RUST_LOG` is unset
    pub log_level: String,
    pub crawler: CrawlerConfig,
    pub checker: CheckerConfig,
    pub validator: ValidatorConfig,
    pub importer: ImporterConfig,
    pub pool: PoolConfig,
    pub selector: SelectorConfig,
    pub geo: GeoConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_level: "info".to_string(),
            crawler: CrawlerConfig::default(),
            checker: CheckerConfig::default(),
            validator: ValidatorConfig::default(),
            importer: ImporterConfig::default(),
            pool: PoolConfig::default(),
            selector: SelectorConfig::default(),
            geo: GeoConfig::default(),
        }
    }
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    /// Environment overrides are applied on top.
    ///
    /// Runs before logging is set up, so callers report the outcome.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PROXY_POOL_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PROXY_POOL_DATABASE_URL") {
            self.database_url = url;
        }

        if let Some(url) = lookup("PROXY_POOL_SOURCE_URL") {
            self.crawler.source_url = url;
        }

        if let Some(timeout) = lookup("PROXY_POOL_TIMEOUT") {
            self.checker.timeout = humantime::parse_duration(&timeout).map_err(|e| {
                Error::Config(format!("Invalid PROXY_POOL_TIMEOUT {:?}: {}", timeout, e))
            })?;
        }

        if let Some(level) = lookup("PROXY_POOL_LOG_LEVEL") {
            self.log_level = level;
        }

        Ok(())
    }

    /// Reject settings the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::Config("database_url must not be empty".to_string()));
        }
        if self.validator.batch_size == 0 {
            return Err(Error::Config("validator.batch_size must be positive".to_string()));
        }
        if self.importer.partition_size == 0 {
            return Err(Error::Config(
                "importer.partition_size must be positive".to_string(),
            ));
        }
        if self.pool.min_size == 0 {
            return Err(Error::Config("pool.min_size must be positive".to_string()));
        }
        if self.checker.timeout.is_zero() {
            return Err(Error::Config("checker.timeout must be positive".to_string()));
        }
        if self.checker.echo_url.trim().is_empty() {
            return Err(Error::Config("checker.echo_url must not be empty".to_string()));
        }
        if let Some(code) = self
            .selector
            .denylist
            .iter()
            .find(|code| code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(Error::Config(format!(
                "selector.denylist entry {:?} is not a two-letter country code",
                code
            )));
        }
        Ok(())
    }

    /// Validate settings needed for a crawl
    pub fn validate_for_crawl(&self) -> Result<()> {
        self.validate()?;
        if self.crawler.source_url.trim().is_empty() {
            return Err(Error::Config(
                "crawler.source_url is required to crawl".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyType;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.validator.batch_size, 100);
        assert_eq!(config.importer.partition_size, 10_000);
        assert_eq!(config.pool.min_size, 1000);
        assert_eq!(config.pool.staleness, Duration::from_secs(1800));
        assert_eq!(config.checker.timeout, Duration::from_secs(5));
        assert_eq!(config.geo.default_language, "en");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.pool.backoff, Duration::from_secs(60));
        assert!(config.selector.is_denied("RU"));
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml(
            r#"
database_url = "relays.db"

[crawler]
source_url = "http://example.com/socks5.txt"

[checker]
timeout = "10s"

[pool]
staleness = "5m"
min_size = 50
max_reload_attempts = 3

[selector]
denylist = ["CN"]
public_scheme = "socks5"
"#,
        )
        .unwrap();

        assert_eq!(config.database_url, "relays.db");
        assert_eq!(config.crawler.source_url, "http://example.com/socks5.txt");
        assert_eq!(config.checker.timeout, Duration::from_secs(10));
        assert_eq!(config.pool.staleness, Duration::from_secs(300));
        assert_eq!(config.pool.min_size, 50);
        assert_eq!(config.pool.max_reload_attempts, Some(3));
        assert!(config.selector.is_denied("cn"));
        assert!(!config.selector.is_denied("RU"));
        assert_eq!(config.selector.public_scheme, ProxyType::Socks5);
        assert!(config.validate_for_crawl().is_ok());
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            Config::from_toml("[pool]\nmin_size = \"lots\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PROXY_POOL_DATABASE_URL", "other.db"),
            ("PROXY_POOL_SOURCE_URL", "http://example.com/list"),
            ("PROXY_POOL_TIMEOUT", "2s"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_url, "other.db");
        assert_eq!(config.crawler.source_url, "http://example.com/list");
        assert_eq!(config.checker.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_env_invalid_timeout() {
        let mut config = Config::default();
        let result = config.apply_env(|key| {
            (key == "PROXY_POOL_TIMEOUT").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.validator.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pool.min_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.selector.denylist.push("RUS".to_string());
        assert!(config.validate().is_err());

        let config = Config::default();
        assert!(config.validate_for_crawl().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.validator.batch_size, 100);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[validator]\nbatch_size = 25").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.validator.batch_size, 25);
    }
}
