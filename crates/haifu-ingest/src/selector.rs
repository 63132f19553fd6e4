//! Line selection and identifier extraction
//!
//! The pipeline never looks at markup itself. It hands each archive line to
//! an [`Extractor`], which either yields one identifier or nothing.

use crate::config::SelectionConfig;
use crate::error::Result;
use haifu_common::types::Identifier;
use regex::Regex;
use tracing::debug;

/// Turns an archive line into at most one identifier
pub trait Extractor: Send + Sync {
    fn extract(&self, line: &str) -> Option<Identifier>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Option<Identifier> + Send + Sync,
{
    fn extract(&self, line: &str) -> Option<Identifier> {
        self(line)
    }
}

/// Regex-driven extractor: a category filter picks lines, an identifier
/// pattern pulls the key out of them.
#[derive(Debug, Clone)]
pub struct LineSelector {
    category: Regex,
    identifier: Regex,
}

impl LineSelector {
    pub fn new(category: &str, identifier: &str) -> Result<Self> {
        Ok(Self {
            category: Regex::new(category)?,
            identifier: Regex::new(identifier)?,
        })
    }

    pub fn from_config(config: &SelectionConfig) -> Result<Self> {
        Self::new(&config.category_filter, &config.identifier_pattern)
    }

    pub fn selects(&self, line: &str) -> bool {
        self.category.is_match(line)
    }
}

impl Extractor for LineSelector {
    fn extract(&self, line: &str) -> Option<Identifier> {
        if !self.selects(line) {
            return None;
        }

        let caps = self.identifier.captures(line)?;
        let matched = caps.name("id").or_else(|| caps.get(1))?;
        match Identifier::new(matched.as_str()) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(error = %e, "Discarding unusable identifier");
                None
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const LINE_HOUOU: &str = r#"00:05 | 20 | 四鳳南喰赤－ | <a href="http://tenhou.net/0/?log=2024010100gm-00a9-0000-1a2b3c4d">牌譜</a> | A(+50.0) B(+10.0) C(-20.0) D(-40.0)<br>"#;
    const LINE_TOKUJOU: &str = r#"00:07 | 21 | 四特南喰赤－ | <a href="http://tenhou.net/0/?log=2024010100gm-00a9-0000-deadbeef">牌譜</a> | A(+50.0)<br>"#;

    fn selector() -> LineSelector {
        LineSelector::from_config(&SelectionConfig::default()).unwrap()
    }

    #[test]
    fn test_selects_matching_category_only() {
        let selector = selector();
        assert_eq!(
            selector.extract(LINE_HOUOU).unwrap().as_str(),
            "2024010100gm-00a9-0000-1a2b3c4d"
        );
        assert!(selector.extract(LINE_TOKUJOU).is_none());
    }

    #[test]
    fn test_selected_line_without_identifier() {
        let selector = selector();
        assert!(selector.extract("四鳳南喰赤 but no link").is_none());
    }

    #[test]
    fn test_unnamed_group_is_used() {
        let selector = LineSelector::new("keep", r"id=(\w+)").unwrap();
        assert_eq!(selector.extract("keep id=abc").unwrap().as_str(), "abc");
        assert!(selector.extract("drop id=abc").is_none());
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |line: &str| line.strip_prefix("id:").and_then(|s| Identifier::new(s).ok());
        assert_eq!(extractor.extract("id:x").unwrap().as_str(), "x");
        assert!(extractor.extract("nope").is_none());
    }
}
