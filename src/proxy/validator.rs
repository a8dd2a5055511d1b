//! Batch validation of fetched candidates
//!
//! Candidates are probed in consecutive fixed-size batches. Every probe of a
//! batch runs concurrently and the next batch only starts once all of them
//! have resolved, which caps the number of open tunnels at the batch size.

use crate::database::ProxyDatabase;
use crate::proxy::checker::RelayProbe;
use crate::proxy::parser::ProxyParser;
use crate::proxy::progress::ProgressTracker;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default number of candidates probed together
const DEFAULT_BATCH_SIZE: usize = 100;

/// Configuration for the batch validator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub batch_size: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Outcome of one validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Lines received
    pub candidates: usize,
    /// Lines that did not parse as `ip:port`
    pub malformed: usize,
    /// Probes that completed, successful or not
    pub probed: usize,
    /// Rows written to the store
    pub persisted: usize,
    /// Successful probes whose insert failed
    pub persist_failures: usize,
}

/// Probes candidates in batches and stores the ones that work
pub struct BatchValidator<'a, P: RelayProbe> {
    probe: &'a P,
    db: &'a ProxyDatabase,
    config: ValidatorConfig,
    show_progress: bool,
}

impl<'a, P: RelayProbe> BatchValidator<'a, P> {
    pub fn new(probe: &'a P, db: &'a ProxyDatabase, config: ValidatorConfig) -> Self {
        Self {
            probe,
            db,
            config,
            show_progress: false,
        }
    }

    /// Draw a progress bar on stderr while validating
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Validate `candidates`, persisting every relay that answers.
    ///
    /// A failed probe or a failed insert only affects its own candidate.
    pub async fn validate<S: AsRef<str>>(&self, candidates: &[S]) -> ValidationReport {
        let proxies = ProxyParser::parse_lines(candidates);
        let mut report = ValidationReport {
            candidates: candidates.len(),
            malformed: candidates.len() - proxies.len(),
            ..Default::default()
        };

        let mut progress = if self.show_progress {
            ProgressTracker::new(proxies.len(), "Checking relays")
        } else {
            ProgressTracker::hidden(proxies.len())
        };

        let batch_size = self.config.batch_size.max(1);
        for (index, batch) in proxies.chunks(batch_size).enumerate() {
            let mut results = stream::iter(batch)
                .map(|proxy| self.probe.check(proxy))
                .buffer_unordered(batch.len());

            while let Some(result) = results.next().await {
                report.probed += 1;
                if let Some(percent) = progress.advance(1) {
                    debug!(percent, probed = report.probed, "validation progress");
                }

                let Some(latency_ms) = result.latency_ms() else {
                    continue;
                };

                match self
                    .db
                    .insert_relay(result.proxy.host, result.proxy.port, latency_ms)
                    .await
                {
                    Ok(()) => report.persisted += 1,
                    Err(e) => {
                        report.persist_failures += 1;
                        warn!(proxy = %result.proxy, error = %e, "failed to persist relay");
                    }
                }
            }

            debug!(batch = index, persisted = report.persisted, "batch complete");
        }

        progress.finish();
        info!(
            persisted = report.persisted,
            candidates = report.candidates,
            malformed = report.malformed,
            "checked {}/{}",
            report.persisted,
            report.candidates
        );

        report
    }
}
