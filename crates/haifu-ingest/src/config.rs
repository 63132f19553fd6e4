//! Pipeline configuration
//!
//! Values are resolved in layers: built-in defaults, then an optional TOML
//! file, then `HAIFU_*` environment variables (a `.env` file is loaded first),
//! and finally whatever the CLI overrides. Every layer ends in [`IngestConfig::validate`].

use crate::error::{IngestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File picked up from the root directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "haifu.toml";

pub const DEFAULT_INDEX_DIR: &str = "index";
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_TRUSTED_DIR: &str = "trusted";
pub const DEFAULT_QUARANTINE_DIR: &str = "quarantine";
pub const DEFAULT_RAW_EXTENSION: &str = "xml";
pub const DEFAULT_CONVERTED_EXTENSION: &str = "json";

pub const DEFAULT_LISTING_URL: &str = "https://tenhou.net/sc/raw/list.cgi";
pub const DEFAULT_LISTING_PATTERN: &str =
    r"file:\s*'(?P<name>[^']+)'\s*,\s*size:\s*(?P<size>\d+)";
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://tenhou.net/sc/raw/dat";
pub const DEFAULT_RECORD_URL_TEMPLATE: &str = "https://tenhou.net/0/log/?{id}";
pub const DEFAULT_CONVERT_URL_TEMPLATE: &str = "https://tenhou.net/5/mjlog2json.cgi?{id}";
pub const DEFAULT_USER_AGENT: &str = concat!("haifu/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LISTING_MAX_RETRIES: u32 = 3;

pub const DEFAULT_ARCHIVE_FILTER: &str = r"(^|/)scc\d{10}\.html\.gz$";
pub const DEFAULT_CATEGORY_FILTER: &str = "四鳳南喰赤";
pub const DEFAULT_IDENTIFIER_PATTERN: &str =
    r"log=(?P<id>\d{10}gm-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{8})";
pub const DEFAULT_RAW_MARKER: &str = r#"<mjloggm ver="2.3">"#;
pub const DEFAULT_CONVERTED_MARKER: &str = r#"{"ver":2.3"#;

pub const DEFAULT_WORKERS: usize = 4;
/// Floor for the spacing between conversion requests
pub const MIN_CONVERT_INTERVAL_MS: u64 = 300;
pub const DEFAULT_CONVERT_INTERVAL_MS: u64 = MIN_CONVERT_INTERVAL_MS;

/// Placeholder substituted with the identifier in URL templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub layout: LayoutConfig,
    pub remote: RemoteConfig,
    pub selection: SelectionConfig,
    pub pipeline: PipelineConfig,
}

/// Directory names (relative to the root) and file extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub index_dir: String,
    pub downloads_dir: String,
    pub trusted_dir: String,
    pub quarantine_dir: String,
    pub raw_extension: String,
    pub converted_extension: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            index_dir: DEFAULT_INDEX_DIR.to_string(),
            downloads_dir: DEFAULT_DOWNLOADS_DIR.to_string(),
            trusted_dir: DEFAULT_TRUSTED_DIR.to_string(),
            quarantine_dir: DEFAULT_QUARANTINE_DIR.to_string(),
            raw_extension: DEFAULT_RAW_EXTENSION.to_string(),
            converted_extension: DEFAULT_CONVERTED_EXTENSION.to_string(),
        }
    }
}

/// Endpoints of the remote site and HTTP client behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub listing_url: String,
    /// Regex with named groups `name` and `size`
    pub listing_pattern: String,
    pub archive_base_url: String,
    pub record_url_template: String,
    pub convert_url_template: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub listing_max_retries: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            listing_pattern: DEFAULT_LISTING_PATTERN.to_string(),
            archive_base_url: DEFAULT_ARCHIVE_BASE_URL.to_string(),
            record_url_template: DEFAULT_RECORD_URL_TEMPLATE.to_string(),
            convert_url_template: DEFAULT_CONVERT_URL_TEMPLATE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            listing_max_retries: DEFAULT_LISTING_MAX_RETRIES,
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Patterns that pick archives, lines, identifiers and format markers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Regex matched against listing entry names
    pub archive_filter: String,
    /// Regex a line must match before an identifier is taken from it
    pub category_filter: String,
    /// Regex whose `id` group (or first group) is the identifier
    pub identifier_pattern: String,
    pub raw_marker: String,
    pub converted_marker: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            archive_filter: DEFAULT_ARCHIVE_FILTER.to_string(),
            category_filter: DEFAULT_CATEGORY_FILTER.to_string(),
            identifier_pattern: DEFAULT_IDENTIFIER_PATTERN.to_string(),
            raw_marker: DEFAULT_RAW_MARKER.to_string(),
            converted_marker: DEFAULT_CONVERTED_MARKER.to_string(),
        }
    }
}

impl SelectionConfig {
    pub fn archive_regex(&self) -> Result<Regex> {
        Ok(Regex::new(&self.archive_filter)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub convert_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            convert_interval_ms: DEFAULT_CONVERT_INTERVAL_MS,
        }
    }
}

impl PipelineConfig {
    pub fn convert_interval(&self) -> Duration {
        Duration::from_millis(self.convert_interval_ms)
    }
}

impl IngestConfig {
    /// Resolve the configuration for a root directory.
    ///
    /// `config_file` wins over `<root>/haifu.toml`; a missing explicit file
    /// is an error while a missing implicit one is not.
    pub fn load(root: &Path, config_file: Option<&Path>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) => Self::from_toml_file(path)?,
            None => {
                let implicit = root.join(CONFIG_FILE_NAME);
                if implicit.is_file() {
                    Self::from_toml_file(&implicit)?
                } else {
                    Self::default()
                }
            },
        };

        // Absent .env is the normal case
        let _ = dotenvy::dotenv();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::fatal(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| IngestError::fatal(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay `HAIFU_*` variables obtained through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let strings: [(&str, &mut String); 17] = [
            ("HAIFU_INDEX_DIR", &mut self.layout.index_dir),
            ("HAIFU_DOWNLOADS_DIR", &mut self.layout.downloads_dir),
            ("HAIFU_TRUSTED_DIR", &mut self.layout.trusted_dir),
            ("HAIFU_QUARANTINE_DIR", &mut self.layout.quarantine_dir),
            ("HAIFU_RAW_EXTENSION", &mut self.layout.raw_extension),
            ("HAIFU_CONVERTED_EXTENSION", &mut self.layout.converted_extension),
            ("HAIFU_LISTING_PATTERN", &mut self.remote.listing_pattern),
            ("HAIFU_LISTING_URL", &mut self.remote.listing_url),
            ("HAIFU_ARCHIVE_BASE_URL", &mut self.remote.archive_base_url),
            ("HAIFU_RECORD_URL", &mut self.remote.record_url_template),
            ("HAIFU_CONVERT_URL", &mut self.remote.convert_url_template),
            ("HAIFU_USER_AGENT", &mut self.remote.user_agent),
            ("HAIFU_ARCHIVE_FILTER", &mut self.selection.archive_filter),
            ("HAIFU_CATEGORY_FILTER", &mut self.selection.category_filter),
            ("HAIFU_IDENTIFIER_PATTERN", &mut self.selection.identifier_pattern),
            ("HAIFU_RAW_MARKER", &mut self.selection.raw_marker),
            ("HAIFU_CONVERTED_MARKER", &mut self.selection.converted_marker),
        ];
        for (key, slot) in strings {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        if let Some(value) = lookup("HAIFU_WORKERS") {
            self.pipeline.workers = parse_env("HAIFU_WORKERS", &value)?;
        }
        if let Some(value) = lookup("HAIFU_CONVERT_INTERVAL_MS") {
            self.pipeline.convert_interval_ms = parse_env("HAIFU_CONVERT_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("HAIFU_REQUEST_TIMEOUT_SECS") {
            self.remote.request_timeout_secs = parse_env("HAIFU_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("HAIFU_CONNECT_TIMEOUT_SECS") {
            self.remote.connect_timeout_secs = parse_env("HAIFU_CONNECT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("HAIFU_LISTING_MAX_RETRIES") {
            self.remote.listing_max_retries = parse_env("HAIFU_LISTING_MAX_RETRIES", &value)?;
        }

        Ok(())
    }

    /// Check every value that could otherwise fail halfway through a stage
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        let dirs = [
            &layout.index_dir,
            &layout.downloads_dir,
            &layout.trusted_dir,
            &layout.quarantine_dir,
        ];
        for (i, dir) in dirs.iter().enumerate() {
            if dir.is_empty() {
                return Err(IngestError::fatal("directory names cannot be empty"));
            }
            if dirs[..i].contains(dir) {
                return Err(IngestError::fatal(format!(
                    "directory {:?} is configured for more than one stage",
                    dir
                )));
            }
        }

        if layout.raw_extension.is_empty() || layout.converted_extension.is_empty() {
            return Err(IngestError::fatal("file extensions cannot be empty"));
        }
        if layout.raw_extension == layout.converted_extension {
            return Err(IngestError::fatal(
                "raw and converted extensions must differ",
            ));
        }

        let remote = &self.remote;
        for (name, template) in [
            ("record_url_template", &remote.record_url_template),
            ("convert_url_template", &remote.convert_url_template),
        ] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(IngestError::fatal(format!(
                    "{} must contain {}",
                    name, ID_PLACEHOLDER
                )));
            }
        }
        if remote.listing_url.is_empty() || remote.archive_base_url.is_empty() {
            return Err(IngestError::fatal("remote URLs cannot be empty"));
        }
        if remote.request_timeout_secs == 0 || remote.connect_timeout_secs == 0 {
            return Err(IngestError::fatal("timeouts must be greater than 0"));
        }
        if remote.listing_max_retries == 0 {
            return Err(IngestError::fatal("listing_max_retries must be at least 1"));
        }

        let listing = Regex::new(&remote.listing_pattern)?;
        let groups: Vec<_> = listing.capture_names().flatten().collect();
        if !groups.contains(&"name") || !groups.contains(&"size") {
            return Err(IngestError::fatal(
                "listing_pattern needs named groups `name` and `size`",
            ));
        }

        let selection = &self.selection;
        Regex::new(&selection.archive_filter)?;
        Regex::new(&selection.category_filter)?;
        let identifier = Regex::new(&selection.identifier_pattern)?;
        if identifier.captures_len() < 2 {
            return Err(IngestError::fatal(
                "identifier_pattern needs a capture group",
            ));
        }
        if selection.raw_marker.is_empty() || selection.converted_marker.is_empty() {
            return Err(IngestError::fatal("format markers cannot be empty"));
        }

        if self.pipeline.workers == 0 {
            return Err(IngestError::fatal("workers must be at least 1"));
        }
        if self.pipeline.convert_interval_ms < MIN_CONVERT_INTERVAL_MS {
            return Err(IngestError::fatal(format!(
                "convert_interval_ms must be at least {}",
                MIN_CONVERT_INTERVAL_MS
            )));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| IngestError::fatal(format!("{} has invalid value {:?}", key, value)))
}
