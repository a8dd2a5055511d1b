//! Bulk import of unchecked candidates
//!
//! Used when validation is switched off. The candidate list is cut into
//! partitions and each partition is inserted by its own spawned worker with
//! its own store session, so one slow partition never holds up the others.

use crate::database::ProxyDatabase;
use crate::error::Error;
use crate::proxy::models::UNCHECKED_LATENCY;
use crate::proxy::parser::ProxyParser;
use crate::proxy::progress::ProgressTracker;
use crate::Result;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Default number of candidates handed to one worker
const DEFAULT_PARTITION_SIZE: usize = 10_000;

/// Configuration for the bulk importer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub partition_size: usize,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            partition_size: DEFAULT_PARTITION_SIZE,
        }
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub workers: usize,
    pub inserted: u64,
    pub malformed: usize,
    /// Workers whose partition could not be written
    pub failed_workers: usize,
}

/// What a single worker did with its partition
struct PartitionOutcome {
    inserted: u64,
    malformed: usize,
}

pub struct BulkImporter {
    db: ProxyDatabase,
    config: ImporterConfig,
    show_progress: bool,
}

impl BulkImporter {
    pub fn new(db: ProxyDatabase, config: ImporterConfig) -> Self {
        Self {
            db,
            config,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Insert every parseable candidate with [`UNCHECKED_LATENCY`].
    ///
    /// Waits for all workers. A worker whose store write fails is counted in
    /// [`ImportReport::failed_workers`]; a panicking worker is an error.
    pub async fn import_unchecked(&self, candidates: Vec<String>) -> Result<ImportReport> {
        let partition_size = self.config.partition_size.max(1);
        let mut workers = JoinSet::new();

        for partition in candidates.chunks(partition_size) {
            let partition = partition.to_vec();
            let db = self.db.clone();

            workers.spawn(async move {
                let proxies = ProxyParser::parse_lines(&partition);
                let malformed = partition.len() - proxies.len();
                let inserted = db.bulk_insert_relays(&proxies, UNCHECKED_LATENCY).await?;
                Ok::<_, Error>(PartitionOutcome { inserted, malformed })
            });
        }

        let mut report = ImportReport {
            workers: workers.len(),
            ..Default::default()
        };
        info!(workers = report.workers, "import workers started");

        let mut progress = if self.show_progress {
            ProgressTracker::new(report.workers, "Importing relays")
        } else {
            ProgressTracker::hidden(report.workers)
        };

        let mut crashed = None;
        while let Some(joined) = workers.join_next().await {
            progress.advance(1);
            match joined {
                Ok(Ok(outcome)) => {
                    report.inserted += outcome.inserted;
                    report.malformed += outcome.malformed;
                }
                Ok(Err(e)) => {
                    report.failed_workers += 1;
                    warn!(error = %e, "import worker failed to write its partition");
                }
                Err(e) => crashed = Some(e.to_string()),
            }
        }

        progress.finish();
        if let Some(reason) = crashed {
            return Err(Error::Worker(reason));
        }

        info!(
            inserted = report.inserted,
            malformed = report.malformed,
            failed_workers = report.failed_workers,
            "unchecked relays saved"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_import_skips_malformed_lines() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        let importer = BulkImporter::new(db.clone(), ImporterConfig::default());

        let candidates = vec![
            "1.2.3.4:1080".to_string(),
            "bad-line".to_string(),
            "".to_string(),
            "5.6.7.8:1080".to_string(),
        ];
        let report = importer.import_unchecked(candidates).await.unwrap();

        assert_eq!(report.workers, 1);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.malformed, 2);

        let relays = db.scan_relays_ordered_by_latency().await.unwrap();
        assert_eq!(relays.len(), 2);
        assert!(relays.iter().all(|r| r.latency_ms == UNCHECKED_LATENCY));
    }

    #[tokio::test]
    async fn test_import_spawns_one_worker_per_partition() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        let importer = BulkImporter::new(db.clone(), ImporterConfig { partition_size: 4 });

        let candidates: Vec<String> = (1..=10).map(|i| format!("10.0.1.{}:1080", i)).collect();
        let report = importer.import_unchecked(candidates).await.unwrap();

        assert_eq!(report.workers, 3);
        assert_eq!(report.inserted, 10);
        assert_eq!(report.failed_workers, 0);
        assert_eq!(db.count_relays().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_import_empty_list() {
        let db = ProxyDatabase::in_memory().await.unwrap();
        let importer = BulkImporter::new(db, ImporterConfig::default());

        let report = importer.import_unchecked(Vec::new()).await.unwrap();
        assert_eq!(report, ImportReport::default());
    }
}
