use std::collections::HashMap;

use anyhow::Result;
use data_model::{FeedCategory, ManifestRow};
use regex::Regex;
use strum::IntoEnumIterator;
use tracing::debug;

/// Feed files of one manifest split by whether their names fit their
/// category. Both lists keep manifest row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

/// Compiled file name pattern for every [`FeedCategory`].
pub struct PatternTable {
    patterns: HashMap<FeedCategory, Regex>,
}

impl PatternTable {
    pub fn new() -> Result<Self> {
        let mut patterns = HashMap::new();
        for category in FeedCategory::iter() {
            let pattern = format!(
                r"^[A-Za-z0-9_]*({})[A-Za-z0-9_]*(\.csv)$",
                regex::escape(category.token())
            );
            patterns.insert(category, Regex::new(&pattern)?);
        }
        Ok(Self { patterns })
    }

    pub fn pattern(&self, category: FeedCategory) -> Option<&Regex> {
        self.patterns.get(&category)
    }

    /// A file is valid only when its row names a known category and the
    /// name matches that category's pattern.
    pub fn is_valid(&self, row: &ManifestRow) -> bool {
        FeedCategory::from_key(&row.category)
            .and_then(|category| self.pattern(category))
            .is_some_and(|pattern| pattern.is_match(&row.file_name))
    }

    pub fn classify(&self, rows: &[ManifestRow]) -> Classification {
        let mut classification = Classification::default();
        for row in rows {
            if self.is_valid(row) {
                classification.valid.push(row.file_name.clone());
            } else {
                debug!(
                    category = %row.category,
                    file_name = %row.file_name,
                    "feed file does not match its category"
                );
                classification.invalid.push(row.file_name.clone());
            }
        }
        classification
    }
}
