//! One crawl cycle: fetch candidates, reset the relay table, then either
//! validate the candidates or bulk-import them unchecked.

use crate::database::ProxyDatabase;
use crate::proxy::checker::RelayProbe;
use crate::proxy::crawler::ProxyCrawler;
use crate::proxy::importer::{BulkImporter, ImportReport, ImporterConfig};
use crate::proxy::validator::{BatchValidator, ValidationReport, ValidatorConfig};
use crate::Result;
use std::time::Duration;
use tracing::{info, warn};

/// What a successful crawl did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlSummary {
    Validated(ValidationReport),
    Imported(ImportReport),
}

pub struct Harvester<P: RelayProbe> {
    db: ProxyDatabase,
    crawler: ProxyCrawler,
    probe: P,
    validator: ValidatorConfig,
    importer: ImporterConfig,
    show_progress: bool,
}

impl<P: RelayProbe> Harvester<P> {
    pub fn new(
        db: ProxyDatabase,
        crawler: ProxyCrawler,
        probe: P,
        validator: ValidatorConfig,
        importer: ImporterConfig,
    ) -> Self {
        Self {
            db,
            crawler,
            probe,
            validator,
            importer,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run one crawl cycle, reporting success as a flag.
    ///
    /// An unreachable source aborts the cycle and leaves the relay table as
    /// it was.
    pub async fn crawl(&self, no_check: bool) -> bool {
        match self.try_crawl(no_check).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "crawl aborted");
                false
            }
        }
    }

    /// Run one crawl cycle
    pub async fn try_crawl(&self, no_check: bool) -> Result<CrawlSummary> {
        let candidates = self.crawler.fetch().await?;
        info!(count = candidates.len(), "fetched relay candidates");

        self.db.truncate_relays().await?;

        if no_check {
            let report = BulkImporter::new(self.db.clone(), self.importer.clone())
                .with_progress(self.show_progress)
                .import_unchecked(candidates)
                .await?;
            return Ok(CrawlSummary::Imported(report));
        }

        let report = BatchValidator::new(&self.probe, &self.db, self.validator.clone())
            .with_progress(self.show_progress)
            .validate(&candidates)
            .await;
        Ok(CrawlSummary::Validated(report))
    }

    /// Crawl every `interval`, forever
    pub async fn run_forever(&self, no_check: bool, interval: Duration) {
        loop {
            self.crawl(no_check).await;
            info!(
                interval = %humantime::format_duration(interval),
                "crawl proxies complete, sleeping"
            );
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::checker::{EchoResponse, ProbeError};
    use crate::proxy::crawler::CrawlerConfig;
    use crate::proxy::models::{Proxy, ProxyCheckResult, UNCHECKED_LATENCY};
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct AlwaysUp;

    #[async_trait]
    impl RelayProbe for AlwaysUp {
        async fn check(&self, proxy: &Proxy) -> ProxyCheckResult {
            ProxyCheckResult::working(proxy.clone(), 42)
        }

        async fn live_check(&self, _proxy: &Proxy) -> std::result::Result<EchoResponse, ProbeError> {
            Ok(EchoResponse {
                origin: "203.0.113.5".to_string(),
            })
        }
    }

    /// Serve `body` to a single HTTP request and return the URL
    async fn serve_once(body: &'static str) -> String {
        serve_once_with_status("200 OK", body).await
    }

    async fn serve_once_with_status(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/socks.txt", addr)
    }

    fn harvester(db: &ProxyDatabase, url: String) -> Harvester<AlwaysUp> {
        let crawler = ProxyCrawler::with_config(
            CrawlerConfig::new()
                .with_source_url(url)
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap();
        Harvester::new(
            db.clone(),
            crawler,
            AlwaysUp,
            ValidatorConfig::default(),
            ImporterConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_crawl_validates_and_replaces_relays() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        db.insert_relay(Ipv4Addr::new(9, 9, 9, 9), 1080, 1).await.unwrap();

        let url = serve_once("1.2.3.4:1080\r\nbad-line\r\n5.6.7.8:1080\r\n").await;
        let summary = harvester(&db, url).try_crawl(false).await.unwrap();

        match summary {
            CrawlSummary::Validated(report) => {
                assert_eq!(report.candidates, 4);
                assert_eq!(report.malformed, 2);
                assert_eq!(report.persisted, 2);
            }
            other => panic!("expected validation, got {:?}", other),
        }

        let relays = db.scan_relays_ordered_by_latency().await.unwrap();
        assert_eq!(relays.len(), 2);
        assert!(relays.iter().all(|r| r.latency_ms == 42));
    }

    #[tokio::test]
    async fn test_crawl_without_check_imports_unchecked() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        let url = serve_once("1.2.3.4:1080\n5.6.7.8:1080\n").await;

        assert!(harvester(&db, url).crawl(true).await);

        let relays = db.scan_relays_ordered_by_latency().await.unwrap();
        assert_eq!(relays.len(), 2);
        assert!(relays.iter().all(|r| r.latency_ms == UNCHECKED_LATENCY));
    }

    #[tokio::test]
    async fn test_unavailable_source_keeps_existing_relays() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        db.insert_relay(Ipv4Addr::new(9, 9, 9, 9), 1080, 1).await.unwrap();

        let harvester = harvester(&db, "http://127.0.0.1:1/socks.txt".to_string());
        assert!(!harvester.crawl(false).await);
        assert_eq!(db.count_relays().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_error_status_keeps_existing_relays() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        db.insert_relay(Ipv4Addr::new(9, 9, 9, 9), 1080, 1).await.unwrap();

        let url = serve_once_with_status("503 Service Unavailable", "Service Unavailable").await;
        let harvester = harvester(&db, url);
        assert!(matches!(
            harvester.try_crawl(false).await,
            Err(crate::error::Error::SourceUnavailable { .. })
        ));
        assert_eq!(db.count_relays().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_error_status_crawl_reports_failure() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        db.insert_relay(Ipv4Addr::new(9, 9, 9, 9), 1080, 1).await.unwrap();

        let url = serve_once_with_status("503 Service Unavailable", "Service Unavailable").await;
        assert!(!harvester(&db, url).crawl(false).await);

        let relays = db.scan_relays_ordered_by_latency().await.unwrap();
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].host, Ipv4Addr::new(9, 9, 9, 9));
    }

    #[tokio::test]
    async fn test_crawl_only_stores_socks5_candidates() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        let url = serve_once("http://1.2.3.4:8080\nsocks4://5.6.7.8:1080\nsocks5://9.9.9.9:1080\n").await;

        match harvester(&db, url).try_crawl(false).await.unwrap() {
            CrawlSummary::Validated(report) => {
                assert_eq!(report.probed, 1);
                assert_eq!(report.persisted, 1);
            }
            other => panic!("expected validation, got {:?}", other),
        }

        let relays = db.scan_relays_ordered_by_latency().await.unwrap();
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].proxy().url(), "socks5://9.9.9.9:1080");
    }
}
