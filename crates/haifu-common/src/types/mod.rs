//! Domain types shared across haifu
//!
//! Everything here is pure data. Observing the filesystem and talking to the
//! remote site happens in `haifu-ingest`; these types only describe what was
//! observed.

use crate::error::{HaifuError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

// ============================================================================
// Remote Listing
// ============================================================================

/// One archive advertised by the remote listing.
///
/// Lives for a single synchronization pass and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Entry name as advertised, possibly containing `/` separated directories
    pub name: String,

    /// Size in bytes the listing claims the archive has
    pub declared_size: u64,
}

impl RemoteEntry {
    pub fn new(name: impl Into<String>, declared_size: u64) -> Self {
        Self {
            name: name.into(),
            declared_size,
        }
    }

    /// Relative path this entry maps to under the index directory.
    ///
    /// Rejects empty names, absolute paths and any `..` or `.` component so
    /// a hostile listing cannot write outside the index directory.
    pub fn relative_path(&self) -> Result<PathBuf> {
        let path = Path::new(&self.name);
        if self.name.is_empty() {
            return Err(HaifuError::InvalidEntryName(self.name.clone()));
        }

        let mut relative = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => relative.push(part),
                _ => return Err(HaifuError::InvalidEntryName(self.name.clone())),
            }
        }

        Ok(relative)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque key of one record, carved out of an archive line.
///
/// Identifiers double as file stems, so construction refuses anything that
/// could escape the directory it is joined onto.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let valid = !value.is_empty()
            && value != "."
            && value != ".."
            && !value.contains(['/', '\\', '\0'])
            && !value.chars().any(char::is_whitespace);

        if valid {
            Ok(Self(value))
        } else {
            Err(HaifuError::InvalidIdentifier(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for this identifier with the given extension
    pub fn file_name(&self, extension: &str) -> String {
        if extension.is_empty() {
            self.0.clone()
        } else {
            format!("{}.{}", self.0, extension)
        }
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = HaifuError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = HaifuError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

// ============================================================================
// Derived State
// ============================================================================

/// A file as observed on disk during the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub actual_size: u64,
    pub exists: bool,
}

impl LocalFile {
    pub fn state(&self) -> FileState {
        FileState::from_len(self.exists.then_some(self.actual_size))
    }

    /// True when the file exists with exactly `declared` bytes
    pub fn matches_size(&self, declared: u64) -> bool {
        self.exists && self.actual_size == declared
    }
}

/// State of a fetched document, derived from the filesystem on every read.
///
/// A zero-length file always means a failed or interrupted fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "size", rename_all = "lowercase")]
pub enum FileState {
    Absent,
    Empty,
    Present(u64),
}

impl FileState {
    /// Derive a state from an optional file length (`None` = no file)
    pub fn from_len(len: Option<u64>) -> Self {
        match len {
            None => FileState::Absent,
            Some(0) => FileState::Empty,
            Some(n) => FileState::Present(n),
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, FileState::Present(_))
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileState::Absent => write!(f, "absent"),
            FileState::Empty => write!(f, "empty"),
            FileState::Present(n) => write!(f, "present ({} bytes)", n),
        }
    }
}

/// Terminal destination of a validated pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Trusted,
    Quarantined,
}

impl Bucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Trusted => "trusted",
            Bucket::Quarantined => "quarantined",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an identifier's pair, derived from which bucket holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairState {
    Unclassified,
    Trusted,
    Quarantined,
}

impl PairState {
    pub fn bucket(self) -> Option<Bucket> {
        match self {
            PairState::Unclassified => None,
            PairState::Trusted => Some(Bucket::Trusted),
            PairState::Quarantined => Some(Bucket::Quarantined),
        }
    }

    pub fn is_classified(self) -> bool {
        self != PairState::Unclassified
    }
}

impl From<Bucket> for PairState {
    fn from(bucket: Bucket) -> Self {
        match bucket {
            Bucket::Trusted => PairState::Trusted,
            Bucket::Quarantined => PairState::Quarantined,
        }
    }
}
