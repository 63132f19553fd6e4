//! Remote listing parser

use crate::error::Result;
use haifu_common::types::RemoteEntry;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::warn;

/// Carves [`RemoteEntry`] values out of a listing body with a regex that has
/// the named groups `name` and `size`.
#[derive(Debug, Clone)]
pub struct ListingParser {
    pattern: Regex,
}

impl ListingParser {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Entries in name order. A name listed twice keeps its last size.
    pub fn parse(&self, body: &str) -> Vec<RemoteEntry> {
        let mut entries = BTreeMap::new();

        for caps in self.pattern.captures_iter(body) {
            let (Some(name), Some(size)) = (caps.name("name"), caps.name("size")) else {
                continue;
            };
            match size.as_str().parse::<u64>() {
                Ok(size) => {
                    entries.insert(name.as_str().to_string(), size);
                },
                Err(e) => warn!(entry = name.as_str(), error = %e, "Unparseable size in listing"),
            }
        }

        entries
            .into_iter()
            .map(|(name, size)| RemoteEntry::new(name, size))
            .collect()
    }
}
