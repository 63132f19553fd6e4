//! On-disk layout and state derivation
//!
//! The filesystem is the only record of progress. Nothing here caches; every
//! call looks at the disk again.

use crate::config::LayoutConfig;
use crate::error::{IngestError, Result};
use haifu_common::types::{Bucket, FileState, Identifier, LocalFile, PairState};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Suffix of in-flight downloads; never counted as a finished file
pub const PART_SUFFIX: &str = "part";

/// Resolved directories for one root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub downloads_dir: PathBuf,
    pub trusted_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub raw_extension: String,
    pub converted_extension: String,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, config: &LayoutConfig) -> Self {
        let root = root.into();
        Self {
            index_dir: root.join(&config.index_dir),
            downloads_dir: root.join(&config.downloads_dir),
            trusted_dir: root.join(&config.trusted_dir),
            quarantine_dir: root.join(&config.quarantine_dir),
            raw_extension: config.raw_extension.clone(),
            converted_extension: config.converted_extension.clone(),
            root,
        }
    }

    pub fn raw_path(&self, id: &Identifier) -> PathBuf {
        self.downloads_dir.join(id.file_name(&self.raw_extension))
    }

    pub fn converted_path(&self, id: &Identifier) -> PathBuf {
        self.downloads_dir.join(id.file_name(&self.converted_extension))
    }

    pub fn bucket_dir(&self, bucket: Bucket) -> &Path {
        match bucket {
            Bucket::Trusted => &self.trusted_dir,
            Bucket::Quarantined => &self.quarantine_dir,
        }
    }

    pub fn bucket_raw_path(&self, bucket: Bucket, id: &Identifier) -> PathBuf {
        self.bucket_dir(bucket)
            .join(id.file_name(&self.raw_extension))
    }

    pub fn bucket_converted_path(&self, bucket: Bucket, id: &Identifier) -> PathBuf {
        self.bucket_dir(bucket)
            .join(id.file_name(&self.converted_extension))
    }

    /// Classification of `id`, derived from which bucket holds its raw record
    pub fn pair_state(&self, id: &Identifier) -> PairState {
        for bucket in [Bucket::Trusted, Bucket::Quarantined] {
            if self.bucket_raw_path(bucket, id).is_file() {
                return bucket.into();
            }
        }
        PairState::Unclassified
    }

    /// State of the raw record waiting in the downloads directory
    pub fn raw_state(&self, id: &Identifier) -> FileState {
        observe(&self.raw_path(id)).state()
    }

    /// Create directories a stage writes to. Failure is fatal for the stage.
    pub fn ensure_dirs(&self, dirs: &[&Path]) -> Result<()> {
        for dir in dirs {
            std::fs::create_dir_all(dir).map_err(|e| {
                IngestError::fatal(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Identifiers with a raw record in `dir`, sorted.
    ///
    /// Files whose stem is not a valid identifier are skipped.
    pub fn identifiers_in(&self, dir: &Path) -> Result<Vec<Identifier>> {
        let mut ids = Vec::new();
        if !dir.is_dir() {
            return Ok(ids);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || !has_extension(&path, &self.raw_extension) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Identifier::new(stem) {
                Ok(id) => ids.push(id),
                Err(e) => debug!(path = %path.display(), error = %e, "Ignoring file"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Archives under the index directory, as `/`-separated relative names
    pub fn archives(&self) -> Vec<(String, PathBuf)> {
        let mut archives = Vec::new();
        for entry in WalkDir::new(&self.index_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || has_extension(entry.path(), PART_SUFFIX) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.index_dir) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            archives.push((name, entry.path().to_path_buf()));
        }
        archives.sort();
        archives
    }
}

/// Observe a path. Missing files and directories both count as absent.
pub fn observe(path: &Path) -> LocalFile {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => LocalFile {
            path: path.to_path_buf(),
            actual_size: meta.len(),
            exists: true,
        },
        _ => LocalFile {
            path: path.to_path_buf(),
            actual_size: 0,
            exists: false,
        },
    }
}

/// Sibling path used while a download is in flight
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PART_SUFFIX);
    path.with_file_name(name)
}

/// Exact-case match, the same rule `raw_path` uses when building names
pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> (TempDir, Layout) {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path(), &LayoutConfig::default());
        (dir, layout)
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_paths() {
        let (_dir, layout) = layout();
        let id = id("2024010100gm-00a9-0000-1a2b3c4d");
        assert!(layout.raw_path(&id).ends_with("downloads/2024010100gm-00a9-0000-1a2b3c4d.xml"));
        assert!(layout
            .bucket_converted_path(Bucket::Quarantined, &id)
            .ends_with("quarantine/2024010100gm-00a9-0000-1a2b3c4d.json"));
    }

    #[test]
    fn test_observe_states() {
        let (dir, layout) = layout();
        let id = id("abc");
        assert_eq!(layout.raw_state(&id), FileState::Absent);

        std::fs::create_dir_all(&layout.downloads_dir).unwrap();
        std::fs::write(layout.raw_path(&id), b"").unwrap();
        assert_eq!(layout.raw_state(&id), FileState::Empty);

        std::fs::write(layout.raw_path(&id), b"<mjloggm").unwrap();
        assert_eq!(layout.raw_state(&id), FileState::Present(8));

        assert!(!observe(dir.path()).exists);
    }

    #[test]
    fn test_pair_state_follows_raw_record() {
        let (_dir, layout) = layout();
        let id = id("abc");
        assert_eq!(layout.pair_state(&id), PairState::Unclassified);

        std::fs::create_dir_all(&layout.quarantine_dir).unwrap();
        // A lone converted artifact does not classify the pair
        std::fs::write(layout.bucket_converted_path(Bucket::Quarantined, &id), b"{}").unwrap();
        assert_eq!(layout.pair_state(&id), PairState::Unclassified);

        std::fs::write(layout.bucket_raw_path(Bucket::Quarantined, &id), b"x").unwrap();
        assert_eq!(layout.pair_state(&id), PairState::Quarantined);
    }

    #[test]
    fn test_identifiers_in_skips_other_files() {
        let (_dir, layout) = layout();
        std::fs::create_dir_all(&layout.downloads_dir).unwrap();
        for name in ["b.xml", "a.xml", "a.json", "c.xml.part", "notes.txt"] {
            std::fs::write(layout.downloads_dir.join(name), b"x").unwrap();
        }

        let ids = layout.identifiers_in(&layout.downloads_dir).unwrap();
        assert_eq!(ids, vec![id("a"), id("b")]);
    }

    #[test]
    fn test_identifiers_in_matches_extension_case_exactly() {
        let (_dir, layout) = layout();
        std::fs::create_dir_all(&layout.downloads_dir).unwrap();
        std::fs::write(layout.downloads_dir.join("upper.XML"), b"x").unwrap();
        std::fs::write(layout.downloads_dir.join("lower.xml"), b"x").unwrap();

        let ids = layout.identifiers_in(&layout.downloads_dir).unwrap();
        assert_eq!(ids, vec![id("lower")]);
        assert!(ids.iter().all(|id| layout.raw_path(id).is_file()));
    }

    #[test]
    fn test_archives_are_relative_and_skip_parts() {
        let (_dir, layout) = layout();
        std::fs::create_dir_all(layout.index_dir.join("2009")).unwrap();
        std::fs::write(layout.index_dir.join("2009/scc2009010100.html.gz"), b"x").unwrap();
        std::fs::write(layout.index_dir.join("scc2024010100.html.gz"), b"x").unwrap();
        std::fs::write(layout.index_dir.join("scc2024010200.html.gz.part"), b"x").unwrap();

        let names: Vec<_> = layout.archives().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["2009/scc2009010100.html.gz", "scc2024010100.html.gz"]);
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/tmp/index/a.gz")),
            PathBuf::from("/tmp/index/a.gz.part")
        );
    }
}
