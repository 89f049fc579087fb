// src/classify.rs
// Category classification driven entirely by per-source configuration.

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::model::CategoryMapping;

/// Maps origin-native category tokens (or titles) onto configured
/// [`CategoryMapping`]s. All mapping data comes from config, never code.
pub struct Classifier {
    mappings: Vec<CategoryMapping>,
    // Compiled alongside, same order as `mappings`; None where no pattern.
    title_patterns: Vec<Option<Regex>>,
    source: String,
}

impl Classifier {
    pub fn new(source: &str, mappings: Vec<CategoryMapping>) -> Result<Self> {
        let title_patterns = mappings
            .iter()
            .map(|m| {
                m.title_regex
                    .as_deref()
                    .map(|p| {
                        Regex::new(&format!("(?i){p}"))
                            .with_context(|| format!("{source}: bad title_regex {p:?}"))
                    })
                    .transpose()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mappings,
            title_patterns,
            source: source.to_string(),
        })
    }

    /// Exact (case-insensitive) lookup of a category token against each
    /// mapping's original ids. Unmapped tokens are logged and fall back to
    /// `other`; classification never blocks ingestion.
    pub fn classify(&self, category: &str) -> CategoryMapping {
        if category.is_empty() {
            return CategoryMapping::other();
        }

        let token = category.to_lowercase();
        for mapping in &self.mappings {
            if mapping
                .original_ids
                .iter()
                .any(|id| id.to_lowercase() == token)
            {
                return mapping.clone();
            }
        }

        debug!(source = %self.source, category, "unmapped category");
        CategoryMapping::other()
    }

    /// First mapping whose title pattern matches, if any. Checked before the
    /// token lookup so sources whose feed carries no usable category field
    /// can classify by title alone.
    pub fn classify_title(&self, title: &str) -> Option<CategoryMapping> {
        for (mapping, pattern) in self.mappings.iter().zip(&self.title_patterns) {
            if let Some(re) = pattern {
                if re.is_match(title) {
                    return Some(mapping.clone());
                }
            }
        }
        None
    }
}
