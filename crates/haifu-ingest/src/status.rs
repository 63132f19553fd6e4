//! Filesystem census for `haifu status`

use crate::error::Result;
use crate::layout::{has_extension, observe, Layout};
use crate::progress::format_bytes;
use haifu_common::types::{Bucket, FileState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub archives: usize,
    pub archive_bytes: u64,
    pub raw_present: usize,
    pub raw_empty: usize,
    /// Converted artifacts still sitting in the downloads directory
    pub converted_pending: usize,
    pub trusted: usize,
    pub quarantined: usize,
}

impl StatusReport {
    pub fn collect(layout: &Layout) -> Result<Self> {
        let mut report = StatusReport::default();

        for (_, path) in layout.archives() {
            report.archives += 1;
            report.archive_bytes += observe(&path).actual_size;
        }

        for id in layout.identifiers_in(&layout.downloads_dir)? {
            match layout.raw_state(&id) {
                FileState::Present(_) => report.raw_present += 1,
                FileState::Empty => report.raw_empty += 1,
                FileState::Absent => {},
            }
        }
        report.converted_pending =
            count_with_extension(&layout.downloads_dir, &layout.converted_extension)?;

        report.trusted = layout
            .identifiers_in(layout.bucket_dir(Bucket::Trusted))?
            .len();
        report.quarantined = layout
            .identifiers_in(layout.bucket_dir(Bucket::Quarantined))?
            .len();

        Ok(report)
    }

    pub fn classified(&self) -> usize {
        self.trusted + self.quarantined
    }
}

fn count_with_extension(dir: &Path, extension: &str) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if has_extension(&path, extension) && path.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Index:       {} archives ({})",
            self.archives,
            format_bytes(self.archive_bytes)
        )?;
        writeln!(f, "Downloads:   {} raw records, {} empty", self.raw_present, self.raw_empty)?;
        writeln!(f, "             {} converted artifacts pending", self.converted_pending)?;
        writeln!(f, "Trusted:     {}", self.trusted)?;
        write!(f, "Quarantined: {}", self.quarantined)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use tempfile::TempDir;

    #[test]
    fn test_empty_root() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path(), &LayoutConfig::default());
        assert_eq!(StatusReport::collect(&layout).unwrap(), StatusReport::default());
    }

    #[test]
    fn test_counts() {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path(), &LayoutConfig::default());
        let dirs = [
            &layout.index_dir,
            &layout.downloads_dir,
            &layout.trusted_dir,
            &layout.quarantine_dir,
        ];
        for d in dirs {
            std::fs::create_dir_all(d).unwrap();
        }
        std::fs::write(layout.index_dir.join("a.html.gz"), vec![0u8; 10]).unwrap();
        std::fs::write(layout.index_dir.join("b.html.gz.part"), vec![0u8; 10]).unwrap();
        std::fs::write(layout.downloads_dir.join("r1.xml"), b"x").unwrap();
        std::fs::write(layout.downloads_dir.join("r2.xml"), b"").unwrap();
        std::fs::write(layout.downloads_dir.join("r1.json"), b"{}").unwrap();
        std::fs::write(layout.downloads_dir.join("r3.XML"), b"x").unwrap();
        std::fs::write(layout.downloads_dir.join("r3.JSON"), b"{}").unwrap();
        std::fs::write(layout.trusted_dir.join("t.xml"), b"x").unwrap();
        std::fs::write(layout.trusted_dir.join("t.json"), b"x").unwrap();
        std::fs::write(layout.quarantine_dir.join("q.xml"), b"x").unwrap();

        let report = StatusReport::collect(&layout).unwrap();
        assert_eq!(report.archives, 1);
        assert_eq!(report.archive_bytes, 10);
        assert_eq!(report.raw_present, 1);
        assert_eq!(report.raw_empty, 1);
        assert_eq!(report.converted_pending, 1);
        assert_eq!(report.trusted, 1);
        assert_eq!(report.quarantined, 1);
        assert_eq!(report.classified(), 2);
    }
}
