//! Error taxonomy for the acquisition pipeline
//!
//! Only [`IngestError::FatalConfig`] (and I/O failures while preparing a
//! stage) ever abort a run. Everything else is scoped to a single item and
//! ends up either as a retry on the next run or as a quarantined pair.

use haifu_common::HaifuError;
use thiserror::Error;

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Timeout, refused connection, broken body stream or a rejected status
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Local archive size differs from what the listing declares
    #[error("Size mismatch for {name}: declared {declared} bytes, found {actual} bytes")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    /// A document lacks its format-version marker
    #[error("Format marker {marker:?} missing from {document}")]
    FormatMismatch {
        document: &'static str,
        marker: String,
    },

    /// Setup failure that makes the whole stage pointless
    #[error("Fatal configuration error: {0}")]
    FatalConfig(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] HaifuError),
}

impl IngestError {
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalConfig(msg.into())
    }

    /// Short machine-friendly tag used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Transport { .. } => "transport",
            IngestError::SizeMismatch { .. } => "size_mismatch",
            IngestError::FormatMismatch { document, .. } => {
                if *document == RAW_DOCUMENT {
                    "raw_marker_missing"
                } else {
                    "converted_marker_missing"
                }
            }
            IngestError::FatalConfig(_) => "fatal_config",
            IngestError::Archive(_) => "archive",
            IngestError::Io(_) => "io",
            IngestError::Common(_) => "common",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::FatalConfig(_))
    }
}

/// Document names used in [`IngestError::FormatMismatch`]
pub const RAW_DOCUMENT: &str = "raw record";
pub const CONVERTED_DOCUMENT: &str = "converted artifact";

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        IngestError::Transport {
            url,
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for IngestError {
    fn from(err: regex::Error) -> Self {
        IngestError::FatalConfig(format!("invalid pattern: {}", err))
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        let raw = IngestError::FormatMismatch {
            document: RAW_DOCUMENT,
            marker: "<mjloggm".into(),
        };
        let converted = IngestError::FormatMismatch {
            document: CONVERTED_DOCUMENT,
            marker: "{\"ver\"".into(),
        };
        assert_eq!(raw.kind(), "raw_marker_missing");
        assert_eq!(converted.kind(), "converted_marker_missing");
        assert_eq!(IngestError::transport("http://x", "boom").kind(), "transport");
    }

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(IngestError::fatal("no dir").is_fatal());
        assert!(!IngestError::transport("http://x", "timeout").is_fatal());
        assert!(!IngestError::Archive("truncated".into()).is_fatal());
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = IngestError::SizeMismatch {
            name: "a.gz".into(),
            declared: 100,
            actual: 50,
        };
        assert_eq!(
            err.to_string(),
            "Size mismatch for a.gz: declared 100 bytes, found 50 bytes"
        );
    }
}
