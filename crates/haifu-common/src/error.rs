//! Error types for haifu

use thiserror::Error;

/// Result type alias for haifu operations
pub type Result<T> = std::result::Result<T, HaifuError>;

/// Main error type shared by every haifu crate
#[derive(Error, Debug)]
pub enum HaifuError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid entry name: {0:?}")]
    InvalidEntryName(String),
}
