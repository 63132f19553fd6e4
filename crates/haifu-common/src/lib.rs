//! haifu Common Library
//!
//! Shared types, logging, and error handling for the haifu workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`HaifuError`] and the crate-wide [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: the mirror's domain vocabulary (remote entries, identifiers,
//!   derived file and pair states)
//!
//! # Example
//!
//! ```no_run
//! use haifu_common::types::{FileState, Identifier};
//!
//! fn describe(id: &str, len: Option<u64>) -> haifu_common::Result<String> {
//!     let id = Identifier::new(id)?;
//!     Ok(format!("{} is {}", id, FileState::from_len(len)))
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{HaifuError, Result};
