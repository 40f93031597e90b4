//! Filter criteria for long-term search
//!
//! Narrows similarity searches by creation time and metadata tags.
//! All fields are optional; when `None` that filter is not applied, and
//! multiple filters combine with AND logic.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::types::MemoryRecord;

/// Filter applied to search candidates before ranking.
///
/// The `since` bound translates to a SQL clause so the durable backend
/// can prune candidates early; tag matching is applied in-process by
/// both backends because metadata is stored as an opaque JSON column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Only match records created at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Metadata tags that must all be present with equal values
    pub tags: Option<HashMap<String, String>>,
}

impl RecordFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by creation time
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Require a metadata tag to equal `value`
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Build a SQL WHERE fragment for the clauses expressible in SQL.
    /// Returns `None` when nothing translates.
    pub fn to_sql_clause(&self) -> Option<String> {
        // created_at is stored as microseconds since epoch
        self.since
            .map(|since| format!("created_at >= {}", since.timestamp_micros()))
    }

    /// Full in-process check, including the tag clauses SQL cannot see.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(since) = self.since {
            if record.created_at < since {
                return false;
            }
        }

        if let Some(ref tags) = self.tags {
            for (key, value) in tags {
                if record.metadata.get(key) != Some(value) {
                    return false;
                }
            }
        }

        true
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.since.is_none() && self.tags.as_ref().is_none_or(|t| t.is_empty())
    }
}
