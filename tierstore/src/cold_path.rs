//! Deterministic cold-tier path layout: `{category}/{year}/{month}/{day}/{id}.{ext}`.

use crate::error::{TierError, TierResult};
use crate::types::validate_record_id;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdPathTemplate {
    /// Top-level partition, e.g. `billing`.
    pub category: String,
    /// File extension without the dot. Empty means no extension.
    pub extension: String,
}

impl Default for ColdPathTemplate {
    fn default() -> Self {
        Self {
            category: "billing".to_string(),
            extension: "json".to_string(),
        }
    }
}

impl ColdPathTemplate {
    pub fn new(category: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            extension: extension.into(),
        }
    }

    pub fn validate(&self) -> TierResult<()> {
        let category = self.category.trim_matches('/');
        if category.is_empty() {
            return Err(TierError::Config("cold path category is empty".to_string()));
        }
        if category
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(TierError::Config(format!(
                "cold path category '{}' has an invalid segment",
                self.category
            )));
        }
        if self.extension.contains('/') || self.extension.contains('.') {
            return Err(TierError::Config(format!(
                "cold path extension '{}' must be a bare extension",
                self.extension
            )));
        }
        Ok(())
    }

    /// Path for a record id created at `created_at` (already UTC). Same
    /// inputs always give the same path, which makes re-archival an
    /// overwrite.
    pub fn render(&self, id: &str, created_at: DateTime<Utc>) -> TierResult<String> {
        validate_record_id(id)?;
        let category = self.category.trim_matches('/');
        let file = if self.extension.is_empty() {
            id.to_string()
        } else {
            format!("{}.{}", id, self.extension)
        };
        Ok(format!(
            "{}/{:04}/{:02}/{:02}/{}",
            category,
            created_at.year(),
            created_at.month(),
            created_at.day(),
            file
        ))
    }

    /// Date-partition prefix for bulk operations on one day.
    pub fn day_prefix(&self, day: DateTime<Utc>) -> String {
        format!(
            "{}/{:04}/{:02}/{:02}/",
            self.category.trim_matches('/'),
            day.year(),
            day.month(),
            day.day()
        )
    }
}
