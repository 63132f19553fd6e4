//! Index synchronizer
//!
//! Mirrors the archives advertised by the remote listing into the index
//! directory. An archive counts as synchronized when a local file of exactly
//! the declared size exists; anything else is fetched again. There is no
//! re-verification after a fetch, the next run simply checks again.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::layout::{observe, Layout};
use crate::listing::ListingParser;
use crate::progress::{spinner, stage_progress};
use crate::remote::{RemoteSite, StatusPolicy};
use crate::report::SyncReport;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use haifu_common::types::RemoteEntry;
use regex::Regex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Skipped,
    Fetched(u64),
    Failed,
}

pub struct IndexSynchronizer {
    remote: RemoteSite,
    layout: Layout,
    parser: ListingParser,
    archive_filter: Regex,
    workers: usize,
    progress: bool,
}

impl IndexSynchronizer {
    pub fn new(config: &IngestConfig, layout: Layout, remote: RemoteSite) -> Result<Self> {
        Ok(Self {
            remote,
            layout,
            parser: ListingParser::new(&config.remote.listing_pattern)?,
            archive_filter: config.selection.archive_regex()?,
            workers: config.pipeline.workers.max(1),
            progress: false,
        })
    }

    pub fn with_progress(mut self, visible: bool) -> Self {
        self.progress = visible;
        self
    }

    /// Fetch the listing and synchronize every selected entry
    pub async fn run(&self) -> Result<SyncReport> {
        self.layout.ensure_dirs(&[&self.layout.index_dir])?;

        let pb = spinner("Fetching listing", self.progress);
        let body = self.remote.fetch_listing().await;
        pb.finish_and_clear();

        let entries = self.parser.parse(&body?);
        info!(entries = entries.len(), "Parsed remote listing");
        self.sync_entries(entries).await
    }

    /// Synchronize an already parsed listing
    pub async fn sync_entries(&self, entries: Vec<RemoteEntry>) -> Result<SyncReport> {
        self.layout.ensure_dirs(&[&self.layout.index_dir])?;

        let listed = entries.len();
        let selected: Vec<RemoteEntry> = entries
            .into_iter()
            .filter(|e| self.archive_filter.is_match(&e.name))
            .collect();
        let mut report = SyncReport::new(listed, selected.len());
        info!(listed, selected = selected.len(), "Synchronizing index");

        let pb = stage_progress(selected.len() as u64, "sync", self.progress);
        let pb_ref = &pb;
        let outcomes: Vec<EntryOutcome> = stream::iter(selected.iter())
            .map(|entry| async move {
                let outcome = self.sync_entry(entry).await;
                pb_ref.inc(1);
                outcome
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;
        pb.finish_and_clear();

        for outcome in outcomes {
            match outcome {
                EntryOutcome::Skipped => report.skipped += 1,
                EntryOutcome::Fetched(bytes) => {
                    report.fetched += 1;
                    report.bytes_fetched += bytes;
                },
                EntryOutcome::Failed => report.failed += 1,
            }
        }
        report.finished_at = Some(Utc::now());

        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            failed = report.failed,
            "Index synchronized"
        );
        Ok(report)
    }

    async fn sync_entry(&self, entry: &RemoteEntry) -> EntryOutcome {
        let relative = match entry.relative_path() {
            Ok(relative) => relative,
            Err(e) => {
                warn!(entry = %entry.name, error = %e, "Rejecting listing entry");
                return EntryOutcome::Failed;
            },
        };
        let path = self.layout.index_dir.join(relative);

        let local = observe(&path);
        if local.matches_size(entry.declared_size) {
            debug!(entry = %entry.name, bytes = entry.declared_size, "Archive up to date");
            return EntryOutcome::Skipped;
        }
        if local.exists {
            let mismatch = IngestError::SizeMismatch {
                name: entry.name.clone(),
                declared: entry.declared_size,
                actual: local.actual_size,
            };
            info!(entry = %entry.name, "{}; fetching again", mismatch);
        }

        let url = self.remote.archive_url(&entry.name);
        match self
            .remote
            .download(&url, &path, StatusPolicy::RequireSuccess)
            .await
        {
            Ok(download) => {
                if download.bytes != entry.declared_size {
                    let mismatch = IngestError::SizeMismatch {
                        name: entry.name.clone(),
                        declared: entry.declared_size,
                        actual: download.bytes,
                    };
                    warn!(entry = %entry.name, "{}; next run will retry", mismatch);
                }
                debug!(
                    entry = %entry.name,
                    status = %download.status,
                    bytes = download.bytes,
                    "Fetched archive"
                );
                EntryOutcome::Fetched(download.bytes)
            },
            Err(e) => {
                warn!(entry = %entry.name, reason = e.kind(), error = %e, "Archive fetch failed");
                EntryOutcome::Failed
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn synchronizer(server: &MockServer, root: &TempDir) -> IndexSynchronizer {
        let mut config = IngestConfig::default();
        config.remote.archive_base_url = format!("{}/dat", server.uri());
        config.remote.listing_url = format!("{}/list.cgi", server.uri());
        config.remote.listing_max_retries = 1;
        config.selection.archive_filter = r"\.gz$".into();
        let layout = Layout::new(root.path(), &config.layout);
        let remote = RemoteSite::new(&config.remote).unwrap();
        IndexSynchronizer::new(&config, layout, remote).unwrap()
    }

    async fn mount_archive(server: &MockServer, name: &str, size: usize, expected: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/dat/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; size]))
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_missing_archive_is_fetched() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount_archive(&server, "a.gz", 100, 1).await;

        let sync = synchronizer(&server, &root);
        let report = sync
            .sync_entries(vec![RemoteEntry::new("a.gz", 100)])
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(std::fs::metadata(root.path().join("index/a.gz")).unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_truncated_archive_is_refetched() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount_archive(&server, "a.gz", 100, 1).await;
        std::fs::create_dir_all(root.path().join("index")).unwrap();
        std::fs::write(root.path().join("index/a.gz"), vec![b'x'; 50]).unwrap();

        let report = synchronizer(&server, &root)
            .sync_entries(vec![RemoteEntry::new("a.gz", 100)])
            .await
            .unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(std::fs::metadata(root.path().join("index/a.gz")).unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_matching_archive_is_skipped() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount_archive(&server, "a.gz", 100, 0).await;
        std::fs::create_dir_all(root.path().join("index")).unwrap();
        std::fs::write(root.path().join("index/a.gz"), vec![b'x'; 100]).unwrap();

        let report = synchronizer(&server, &root)
            .sync_entries(vec![RemoteEntry::new("a.gz", 100)])
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test]
    async fn test_filter_and_hostile_names() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        mount_archive(&server, "2009/b.gz", 3, 1).await;

        let report = synchronizer(&server, &root)
            .sync_entries(vec![
                RemoteEntry::new("2009/b.gz", 3),
                RemoteEntry::new("readme.txt", 3),
                RemoteEntry::new("../escape.gz", 3),
            ])
            .await
            .unwrap();

        assert_eq!(report.listed, 3);
        assert_eq!(report.selected, 2);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.failed, 1);
        assert!(root.path().join("index/2009/b.gz").is_file());
        assert!(!root.path().join("escape.gz").exists());
    }

    #[tokio::test]
    async fn test_failed_fetch_writes_nothing() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let report = synchronizer(&server, &root)
            .sync_entries(vec![RemoteEntry::new("a.gz", 100)])
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert!(!root.path().join("index/a.gz").exists());
        assert!(!root.path().join("index/a.gz.part").exists());
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_fatal() {
        let server = MockServer::start().await;
        let root = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/list.cgi"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = synchronizer(&server, &root).run().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
