//! Pair validation and classification
//!
//! For each raw record waiting in the downloads directory a fresh converted
//! artifact is requested through the shared [`RateGate`]. The pair is trusted
//! only when the conversion succeeded and both documents carry their format
//! marker; otherwise it is quarantined. Either way both files leave the
//! downloads directory, artifact first and raw record last.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result, CONVERTED_DOCUMENT, RAW_DOCUMENT};
use crate::layout::Layout;
use crate::progress::stage_progress;
use crate::rate_gate::RateGate;
use crate::remote::RemoteSite;
use crate::report::ValidateReport;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use haifu_common::types::{Bucket, FileState, Identifier};
use std::path::Path;
use tracing::{debug, info, warn};

/// Format markers both documents of a pair must contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub raw: String,
    pub converted: String,
}

impl Markers {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            raw: config.selection.raw_marker.clone(),
            converted: config.selection.converted_marker.clone(),
        }
    }
}

#[derive(Debug)]
pub enum Verdict {
    Trusted,
    /// Carries the first check that failed
    Quarantined(IngestError),
}

impl Verdict {
    pub fn bucket(&self) -> Bucket {
        match self {
            Verdict::Trusted => Bucket::Trusted,
            Verdict::Quarantined(_) => Bucket::Quarantined,
        }
    }
}

/// Decide a pair from the raw bytes and the outcome of the conversion fetch
pub fn classify(
    markers: &Markers,
    raw: &[u8],
    converted: std::result::Result<&[u8], IngestError>,
) -> Verdict {
    let converted = match converted {
        Ok(bytes) => bytes,
        Err(e) => return Verdict::Quarantined(e),
    };
    if !contains(raw, markers.raw.as_bytes()) {
        return Verdict::Quarantined(IngestError::FormatMismatch {
            document: RAW_DOCUMENT,
            marker: markers.raw.clone(),
        });
    }
    if !contains(converted, markers.converted.as_bytes()) {
        return Verdict::Quarantined(IngestError::FormatMismatch {
            document: CONVERTED_DOCUMENT,
            marker: markers.converted.clone(),
        });
    }
    Verdict::Trusted
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[derive(Debug)]
enum PairOutcome {
    Classified(Verdict),
    SkippedClassified,
    SkippedEmpty,
    Failed,
}

pub struct PairValidator {
    remote: RemoteSite,
    layout: Layout,
    markers: Markers,
    gate: RateGate,
    workers: usize,
    progress: bool,
}

impl PairValidator {
    pub fn new(config: &IngestConfig, layout: Layout, remote: RemoteSite) -> Self {
        Self {
            remote,
            layout,
            markers: Markers::from_config(config),
            gate: RateGate::new(config.pipeline.convert_interval()),
            workers: config.pipeline.workers.max(1),
            progress: false,
        }
    }

    pub fn with_progress(mut self, visible: bool) -> Self {
        self.progress = visible;
        self
    }

    pub async fn run(&self) -> Result<ValidateReport> {
        let layout = &self.layout;
        layout.ensure_dirs(&[
            &layout.downloads_dir,
            &layout.trusted_dir,
            &layout.quarantine_dir,
        ])?;

        let candidates = layout.identifiers_in(&layout.downloads_dir)?;
        let mut report = ValidateReport::new(candidates.len());
        info!(candidates = candidates.len(), "Validating pairs");

        let pb = stage_progress(candidates.len() as u64, "validate", self.progress);
        let pb_ref = &pb;
        let outcomes: Vec<PairOutcome> = stream::iter(candidates.iter())
            .map(|id| async move {
                let outcome = self.validate_pair(id).await;
                pb_ref.inc(1);
                outcome
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;
        pb.finish_and_clear();

        for outcome in outcomes {
            match outcome {
                PairOutcome::Classified(Verdict::Trusted) => report.trusted += 1,
                PairOutcome::Classified(Verdict::Quarantined(reason)) => {
                    report.quarantined += 1;
                    *report.reasons.entry(reason.kind().to_string()).or_default() += 1;
                },
                PairOutcome::SkippedClassified => report.skipped_classified += 1,
                PairOutcome::SkippedEmpty => report.skipped_empty += 1,
                PairOutcome::Failed => report.failed += 1,
            }
        }
        report.finished_at = Some(Utc::now());

        info!(
            trusted = report.trusted,
            quarantined = report.quarantined,
            failed = report.failed,
            "Pairs classified"
        );
        Ok(report)
    }

    async fn validate_pair(&self, id: &Identifier) -> PairOutcome {
        if let Some(bucket) = self.layout.pair_state(id).bucket() {
            warn!(id = %id, %bucket, "Already classified; leaving downloaded copy untouched");
            return PairOutcome::SkippedClassified;
        }
        if self.layout.raw_state(id) == FileState::Empty {
            debug!(id = %id, "Raw record is empty; left for the fetch stage");
            return PairOutcome::SkippedEmpty;
        }

        let raw_path = self.layout.raw_path(id);
        let raw = match tokio::fs::read(&raw_path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(id = %id, error = %e, "Cannot read raw record");
                return PairOutcome::Failed;
            },
        };

        // The pair is unclassified, so any artifact on disk belongs to an
        // interrupted run: one left in downloads, or one already moved into a
        // bucket before the raw record followed it.
        let converted_path = self.layout.converted_path(id);
        let stale = [
            converted_path.clone(),
            self.layout.bucket_converted_path(Bucket::Trusted, id),
            self.layout.bucket_converted_path(Bucket::Quarantined, id),
        ];
        for path in &stale {
            if let Err(e) = remove_if_exists(path).await {
                warn!(
                    id = %id,
                    path = %path.display(),
                    error = %e,
                    "Cannot clear stale converted artifact"
                );
                return PairOutcome::Failed;
            }
        }

        let url = self.remote.convert_url(id);
        self.gate.acquire().await;
        let body: Vec<u8>;
        let converted = match self.remote.fetch_bytes(&url).await {
            Ok(bytes) => {
                if let Err(e) = RemoteSite::persist(&bytes, &converted_path).await {
                    warn!(id = %id, error = %e, "Cannot store converted artifact");
                    return PairOutcome::Failed;
                }
                body = bytes;
                Ok(body.as_slice())
            },
            Err(e) => Err(e),
        };

        let verdict = classify(&self.markers, &raw, converted);
        let bucket = verdict.bucket();

        if let Err(e) = self.move_pair(id, bucket).await {
            warn!(id = %id, %bucket, error = %e, "Cannot move pair");
            return PairOutcome::Failed;
        }

        match &verdict {
            Verdict::Trusted => debug!(id = %id, "Pair trusted"),
            Verdict::Quarantined(reason) => {
                warn!(id = %id, reason = reason.kind(), error = %reason, "Pair quarantined")
            },
        }
        PairOutcome::Classified(verdict)
    }

    /// Move the artifact (if any) and then the raw record into `bucket`
    async fn move_pair(&self, id: &Identifier, bucket: Bucket) -> Result<()> {
        let converted = self.layout.converted_path(id);
        if tokio::fs::try_exists(&converted).await? {
            move_file(&converted, &self.layout.bucket_converted_path(bucket, id)).await?;
        }
        move_file(&self.layout.raw_path(id), &self.layout.bucket_raw_path(bucket, id)).await
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Rename, falling back to copy and remove across filesystems
pub async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(from = %from.display(), error = %rename_err, "Rename failed; copying");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await?;
            Ok(())
        },
    }
}
