//! Archive decoding and line scanning
//!
//! # Supported Formats
//!
//! - **Gzip** (`.gz`): multi-member streams via flate2
//! - **Zip** (`.zip`): each member decoded on its own, gzip members by name
//! - anything else is read as plain text
//!
//! Lines are decoded as lossy UTF-8 so one bad byte never hides the rest of
//! an archive.

use crate::error::Result;
use crate::selector::Extractor;
use flate2::read::MultiGzDecoder;
use haifu_common::types::Identifier;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Gzip,
    Zip,
    Plain,
}

impl ArchiveKind {
    /// Pick the decoder from the file name
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".gz") {
            ArchiveKind::Gzip
        } else if lower.ends_with(".zip") {
            ArchiveKind::Zip
        } else {
            ArchiveKind::Plain
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .map(|n| Self::from_name(&n.to_string_lossy()))
            .unwrap_or(ArchiveKind::Plain)
    }
}

/// Feed every line of the archive at `path` to `on_line`
pub fn scan_lines<F>(path: &Path, mut on_line: F) -> Result<()>
where
    F: FnMut(&str),
{
    let file = File::open(path)?;
    match ArchiveKind::from_path(path) {
        ArchiveKind::Gzip => read_lines(BufReader::new(MultiGzDecoder::new(file)), &mut on_line),
        ArchiveKind::Plain => read_lines(BufReader::new(file), &mut on_line),
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
            for i in 0..archive.len() {
                let member = archive.by_index(i)?;
                if member.is_dir() {
                    continue;
                }
                let kind = ArchiveKind::from_name(member.name());
                debug!(member = member.name(), "Scanning zip member");
                match kind {
                    ArchiveKind::Gzip => {
                        read_lines(BufReader::new(MultiGzDecoder::new(member)), &mut on_line)?
                    },
                    _ => read_lines(BufReader::new(member), &mut on_line)?,
                }
            }
            Ok(())
        },
    }
}

fn read_lines<R, F>(mut reader: BufReader<R>, on_line: &mut F) -> Result<()>
where
    R: Read,
    F: FnMut(&str),
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\r', '\n']));
    }
}

/// Every identifier the extractor finds in one archive, deduplicated
pub fn extract_identifiers(path: &Path, extractor: &dyn Extractor) -> Result<BTreeSet<Identifier>> {
    let mut ids = BTreeSet::new();
    let mut lines = 0usize;
    scan_lines(path, |line| {
        lines += 1;
        if let Some(id) = extractor.extract(line) {
            ids.insert(id);
        }
    })?;
    debug!(archive = %path.display(), lines, identifiers = ids.len(), "Scanned archive");
    Ok(ids)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::selector::LineSelector;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const CONTENT: &str = "keep id=a\r\ndrop id=b\nkeep id=c\nkeep id=a\nkeep nothing";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn selector() -> LineSelector {
        LineSelector::new("keep", r"id=(?P<id>\w+)").unwrap()
    }

    fn names(ids: BTreeSet<Identifier>) -> Vec<String> {
        ids.into_iter().map(String::from).collect()
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(ArchiveKind::from_name("scc2024010100.html.gz"), ArchiveKind::Gzip);
        assert_eq!(ArchiveKind::from_name("scraw2009.ZIP"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::from_name("scc.html"), ArchiveKind::Plain);
    }

    #[test]
    fn test_gzip_extraction_dedups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.html.gz");
        std::fs::write(&path, gzip(CONTENT.as_bytes())).unwrap();

        let ids = extract_identifiers(&path, &selector()).unwrap();
        assert_eq!(names(ids), vec!["a", "c"]);
    }

    #[test]
    fn test_plain_and_lossy_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.html");
        let mut data = b"keep id=x \xff\xfe\n".to_vec();
        data.extend_from_slice(b"keep id=y\n");
        std::fs::write(&path, data).unwrap();

        let ids = extract_identifiers(&path, &selector()).unwrap();
        assert_eq!(names(ids), vec!["x", "y"]);
    }

    #[test]
    fn test_zip_members() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("year.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        writer.add_directory("2009/", options).unwrap();
        writer.start_file("2009/scc1.html.gz", options).unwrap();
        writer.write_all(&gzip(b"keep id=g\n")).unwrap();
        writer.start_file("2009/scc2.html", options).unwrap();
        writer.write_all(b"keep id=p\ndrop id=q\n").unwrap();
        writer.finish().unwrap();

        let ids = extract_identifiers(&path, &selector()).unwrap();
        assert_eq!(names(ids), vec!["g", "p"]);
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.gz");
        std::fs::write(&path, b"not gzip at all").unwrap();
        assert!(extract_identifiers(&path, &selector()).is_err());
    }

    #[test]
    fn test_scan_strips_line_endings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one\r\ntwo\n").unwrap();

        let mut lines = Vec::new();
        scan_lines(&path, |l| lines.push(l.to_string())).unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }
}
