//! Identifier extraction and raw record fetching
//!
//! Every synchronized archive is scanned for identifiers; each identifier
//! whose raw record is absent or empty is fetched once. Records that already
//! reached a bucket are left alone.

use crate::archive::extract_identifiers;
use crate::config::IngestConfig;
use crate::error::Result;
use crate::layout::Layout;
use crate::progress::stage_progress;
use crate::remote::{RemoteSite, StatusPolicy};
use crate::report::FetchReport;
use crate::selector::{Extractor, LineSelector};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use haifu_common::types::{FileState, Identifier, PairState};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the fetch stage does for one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    SkipClassified,
    SkipPresent,
    Fetch,
}

impl FetchDecision {
    /// Classification is consulted first, then the raw record's state
    pub fn decide(pair: PairState, raw: FileState) -> Self {
        if pair.is_classified() {
            FetchDecision::SkipClassified
        } else if raw.is_present() {
            FetchDecision::SkipPresent
        } else {
            FetchDecision::Fetch
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Skipped(FetchDecision),
    Fetched { empty: bool },
    Failed,
}

pub struct RecordFetcher {
    remote: RemoteSite,
    layout: Layout,
    extractor: Arc<dyn Extractor>,
    archive_filter: Regex,
    workers: usize,
    progress: bool,
}

impl RecordFetcher {
    pub fn new(config: &IngestConfig, layout: Layout, remote: RemoteSite) -> Result<Self> {
        let selector = LineSelector::from_config(&config.selection)?;
        Ok(Self {
            remote,
            layout,
            extractor: Arc::new(selector),
            archive_filter: config.selection.archive_regex()?,
            workers: config.pipeline.workers.max(1),
            progress: false,
        })
    }

    /// Replace the line selector with another extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress(mut self, visible: bool) -> Self {
        self.progress = visible;
        self
    }

    /// Identifiers found across all selected archives, plus counts of
    /// archives scanned and archives that could not be read.
    pub async fn collect_identifiers(&self) -> (BTreeSet<Identifier>, usize, usize) {
        let archives: Vec<_> = self
            .layout
            .archives()
            .into_iter()
            .filter(|(name, _)| self.archive_filter.is_match(name))
            .collect();

        let mut ids = BTreeSet::new();
        let mut failed = 0;
        for (name, path) in &archives {
            let extractor = Arc::clone(&self.extractor);
            let scan_path = path.clone();
            let scanned = tokio::task::spawn_blocking(move || {
                extract_identifiers(&scan_path, extractor.as_ref())
            })
            .await;

            match scanned {
                Ok(Ok(found)) => {
                    debug!(archive = %name, identifiers = found.len(), "Extracted identifiers");
                    ids.extend(found);
                },
                Ok(Err(e)) => {
                    warn!(archive = %name, error = %e, "Skipping unreadable archive");
                    failed += 1;
                },
                Err(e) => {
                    warn!(archive = %name, error = %e, "Archive scan aborted");
                    failed += 1;
                },
            }
        }

        (ids, archives.len(), failed)
    }

    pub async fn run(&self) -> Result<FetchReport> {
        self.layout
            .ensure_dirs(&[&self.layout.index_dir, &self.layout.downloads_dir])?;

        let (ids, archives, archives_failed) = self.collect_identifiers().await;
        info!(archives, identifiers = ids.len(), "Collected identifiers");

        let mut report = FetchReport::new(archives);
        report.archives_failed = archives_failed;
        report.identifiers = ids.len();

        let pb = stage_progress(ids.len() as u64, "fetch", self.progress);
        let pb_ref = &pb;
        let outcomes: Vec<RecordOutcome> = stream::iter(ids.iter())
            .map(|id| async move {
                let outcome = self.fetch_record(id).await;
                pb_ref.inc(1);
                outcome
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;
        pb.finish_and_clear();

        for outcome in outcomes {
            match outcome {
                RecordOutcome::Skipped(FetchDecision::SkipClassified) => {
                    report.skipped_classified += 1
                },
                RecordOutcome::Skipped(_) => report.skipped_present += 1,
                RecordOutcome::Fetched { empty } => {
                    report.fetched += 1;
                    if empty {
                        report.empty += 1;
                    }
                },
                RecordOutcome::Failed => report.failed += 1,
            }
        }
        report.finished_at = Some(Utc::now());

        info!(
            fetched = report.fetched,
            empty = report.empty,
            failed = report.failed,
            "Raw records fetched"
        );
        Ok(report)
    }

    async fn fetch_record(&self, id: &Identifier) -> RecordOutcome {
        let raw = self.layout.raw_state(id);
        let decision = FetchDecision::decide(self.layout.pair_state(id), raw);
        if decision != FetchDecision::Fetch {
            debug!(id = %id, ?decision, "Skipping record");
            return RecordOutcome::Skipped(decision);
        }
        if raw == FileState::Empty {
            debug!(id = %id, "Re-fetching empty record");
        }

        let url = self.remote.record_url(id);
        let dest = self.layout.raw_path(id);
        match self.remote.download(&url, &dest, StatusPolicy::KeepBody).await {
            Ok(download) => {
                if !download.status.is_success() {
                    warn!(
                        id = %id,
                        status = %download.status,
                        bytes = download.bytes,
                        "Record endpoint returned an error status"
                    );
                }
                let empty = download.bytes == 0;
                if empty {
                    warn!(
                        id = %id,
                        status = %download.status,
                        "Empty record body; will retry next run"
                    );
                } else {
                    debug!(id = %id, bytes = download.bytes, "Fetched record");
                }
                RecordOutcome::Fetched { empty }
            },
            Err(e) => {
                warn!(id = %id, reason = e.kind(), error = %e, "Record fetch failed");
                RecordOutcome::Failed
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        use FetchDecision::*;
        assert_eq!(FetchDecision::decide(PairState::Trusted, FileState::Absent), SkipClassified);
        assert_eq!(
            FetchDecision::decide(PairState::Quarantined, FileState::Present(3)),
            SkipClassified
        );
        assert_eq!(
            FetchDecision::decide(PairState::Unclassified, FileState::Present(3)),
            SkipPresent
        );
        assert_eq!(FetchDecision::decide(PairState::Unclassified, FileState::Empty), Fetch);
        assert_eq!(FetchDecision::decide(PairState::Unclassified, FileState::Absent), Fetch);
    }
}
