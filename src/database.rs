//! SQLite store for relays and IP range reference data

use crate::proxy::models::{GeoRange, Proxy, Relay};
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const CREATE_PROXY_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS proxy (
        proxy_id INTEGER PRIMARY KEY,
        ip_address TEXT NOT NULL,
        port INTEGER NOT NULL,
        delay INTEGER NOT NULL
    )
"#;

const CREATE_IP_DATA_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS ip_data (
        ip_from INTEGER NOT NULL,
        ip_to INTEGER NOT NULL,
        country_code TEXT NOT NULL,
        time_zone_offset INTEGER,
        language TEXT
    )
"#;

const CREATE_IP_DATA_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS ip_data_range_idx ON ip_data (ip_from, ip_to)";

const INSERT_PROXY: &str = "INSERT INTO proxy (ip_address, port, delay) VALUES (?, ?, ?)";

/// Handle to the relay store.
///
/// Cloning is cheap; every operation checks a connection out of the shared
/// pool for its own duration.
#[derive(Debug, Clone)]
pub struct ProxyDatabase {
    pool: SqlitePool,
}

impl ProxyDatabase {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// Accepts `sqlite://path`, a bare path or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        if url.contains(":memory:") {
            return Self::in_memory().await;
        }

        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            format!("sqlite://{}", url)
        };

        let options = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Private in-memory database, pinned to a single connection so every
    /// session sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_PROXY_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_IP_DATA_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_IP_DATA_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert one relay
    pub async fn insert_relay(&self, host: Ipv4Addr, port: u16, latency_ms: i64) -> Result<()> {
        sqlx::query(INSERT_PROXY)
            .bind(host.to_string())
            .bind(port)
            .bind(latency_ms)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert many relays with the same latency in a single transaction
    pub async fn bulk_insert_relays(&self, proxies: &[Proxy], latency_ms: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for proxy in proxies {
            sqlx::query(INSERT_PROXY)
                .bind(proxy.host.to_string())
                .bind(proxy.port)
                .bind(latency_ms)
                .execute(&mut *tx)
                .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Remove every relay
    pub async fn truncate_relays(&self) -> Result<()> {
        let removed = sqlx::query("DELETE FROM proxy")
            .execute(&self.pool)
            .await?
            .rows_affected();
        debug!(removed, "relay table truncated");
        Ok(())
    }

    /// All relays, fastest first
    pub async fn scan_relays_ordered_by_latency(&self) -> Result<Vec<Relay>> {
        let rows = sqlx::query(
            "SELECT proxy_id, ip_address, port, delay FROM proxy ORDER BY delay ASC, proxy_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut relays = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("proxy_id")?;
            let address: String = row.try_get("ip_address")?;
            let port: i64 = row.try_get("port")?;
            let latency_ms: i64 = row.try_get("delay")?;

            match (address.trim().parse::<Ipv4Addr>(), u16::try_from(port)) {
                (Ok(host), Ok(port)) => relays.push(Relay {
                    id,
                    host,
                    port,
                    latency_ms,
                }),
                _ => warn!(id, address = %address, port, "skipping malformed relay row"),
            }
        }

        Ok(relays)
    }

    /// Number of persisted relays
    pub async fn count_relays(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proxy")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// The range containing `value`, bounds inclusive
    pub async fn resolve_geo_range(&self, value: u32) -> Result<Option<GeoRange>> {
        let row = sqlx::query(
            "SELECT ip_from, ip_to, country_code, time_zone_offset, language FROM ip_data \
             WHERE ip_from <= ?1 AND ip_to >= ?1 LIMIT 1",
        )
        .bind(i64::from(value))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let ip_low: i64 = row.try_get("ip_from")?;
        let ip_high: i64 = row.try_get("ip_to")?;
        Ok(Some(GeoRange {
            ip_low: u32::try_from(ip_low).unwrap_or(u32::MIN),
            ip_high: u32::try_from(ip_high).unwrap_or(u32::MAX),
            country_code: row.try_get("country_code")?,
            timezone_offset: row.try_get("time_zone_offset")?,
            language: row.try_get("language")?,
        }))
    }

    /// Add one reference range
    pub async fn insert_geo_range(&self, range: &GeoRange) -> Result<()> {
        sqlx::query(
            "INSERT INTO ip_data (ip_from, ip_to, country_code, time_zone_offset, language) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(i64::from(range.ip_low))
        .bind(i64::from(range.ip_high))
        .bind(&range.country_code)
        .bind(range.timezone_offset)
        .bind(range.language.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove all reference ranges
    pub async fn clear_geo_ranges(&self) -> Result<()> {
        sqlx::query("DELETE FROM ip_data").execute(&self.pool).await?;
        Ok(())
    }
}
