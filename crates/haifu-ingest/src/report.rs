//! Per-stage summaries
//!
//! Items never fail a stage; they end up as a counter here instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Entries in the listing
    pub listed: usize,
    /// Entries passing the archive filter
    pub selected: usize,
    pub skipped: usize,
    pub fetched: usize,
    pub failed: usize,
    pub bytes_fetched: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn new(listed: usize, selected: usize) -> Self {
        Self {
            listed,
            selected,
            skipped: 0,
            fetched: 0,
            failed: 0,
            bytes_fetched: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sync: {} listed, {} selected, {} fetched ({}), {} up to date, {} failed",
            self.listed,
            self.selected,
            self.fetched,
            crate::progress::format_bytes(self.bytes_fetched),
            self.skipped,
            self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    pub archives: usize,
    /// Archives that could not be decoded; their identifiers are missed this run
    pub archives_failed: usize,
    pub identifiers: usize,
    pub skipped_present: usize,
    pub skipped_classified: usize,
    pub fetched: usize,
    /// Fetches that produced a zero-length body and will be retried
    pub empty: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FetchReport {
    pub fn new(archives: usize) -> Self {
        Self {
            archives,
            archives_failed: 0,
            identifiers: 0,
            skipped_present: 0,
            skipped_classified: 0,
            fetched: 0,
            empty: 0,
            failed: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl fmt::Display for FetchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            concat!(
                "fetch: {} archives ({} unreadable), {} identifiers, {} fetched, ",
                "{} empty, {} present, {} classified, {} failed"
            ),
            self.archives,
            self.archives_failed,
            self.identifiers,
            self.fetched,
            self.empty,
            self.skipped_present,
            self.skipped_classified,
            self.failed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateReport {
    /// Raw records found in the downloads directory
    pub candidates: usize,
    pub trusted: usize,
    pub quarantined: usize,
    /// Stray downloads of identifiers already in a bucket
    pub skipped_classified: usize,
    /// Zero-length raw records left for the fetch stage
    pub skipped_empty: usize,
    pub failed: usize,
    /// Quarantine count per first failing reason
    pub reasons: BTreeMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ValidateReport {
    pub fn new(candidates: usize) -> Self {
        Self {
            candidates,
            trusted: 0,
            quarantined: 0,
            skipped_classified: 0,
            skipped_empty: 0,
            failed: 0,
            reasons: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

impl fmt::Display for ValidateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validate: {} candidates, {} trusted, {} quarantined",
            self.candidates, self.trusted, self.quarantined
        )?;
        if !self.reasons.is_empty() {
            let reasons: Vec<String> = self
                .reasons
                .iter()
                .map(|(reason, n)| format!("{}={}", reason, n))
                .collect();
            write!(f, " ({})", reasons.join(", "))?;
        }
        write!(
            f,
            ", {} already classified, {} empty, {} failed",
            self.skipped_classified, self.skipped_empty, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_lists_reasons() {
        let mut report = ValidateReport::new(3);
        report.trusted = 1;
        report.quarantined = 2;
        report.reasons.insert("transport".into(), 1);
        report.reasons.insert("raw_marker_missing".into(), 1);

        let text = report.to_string();
        assert!(text.starts_with("validate: 3 candidates, 1 trusted, 2 quarantined"));
        assert!(text.contains("raw_marker_missing=1, transport=1"));
    }

    #[test]
    fn test_sync_display() {
        let mut report = SyncReport::new(5, 2);
        report.fetched = 1;
        report.bytes_fetched = 2048;
        assert!(report.to_string().contains("1 fetched (2.00 KB)"));
    }
}
