//! List filters and results.

use std::cmp::Ordering;

use crate::layout::is_partition_name;
use crate::record::GenerationRecord;
use crate::StoreError;

/// Optional filters for [`crate::RecordStore::list`]. Empty strings count
/// as "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub preset_id: Option<String>,
    pub date: Option<String>,
    pub keyword: Option<String>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(mut self, preset_id: impl Into<String>) -> Self {
        self.preset_id = Some(preset_id.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// The partition to restrict to, if any. Rejects anything that is not a
    /// `YYYY-MM-DD` date so the value can never escape the store root.
    pub fn partition(&self) -> Result<Option<&str>, StoreError> {
        match non_empty(&self.date) {
            None => Ok(None),
            Some(date) if is_partition_name(date) => Ok(Some(date)),
            Some(date) => Err(StoreError::InvalidFilter(format!(
                "date '{date}' is not a YYYY-MM-DD partition"
            ))),
        }
    }

    /// Preset (exact) and keyword (case-insensitive substring of the
    /// prompt) checks. The date is handled by partition selection.
    pub fn matches(&self, record: &GenerationRecord) -> bool {
        if let Some(preset_id) = non_empty(&self.preset_id) {
            if record.preset_id.as_deref() != Some(preset_id) {
                return false;
            }
        }
        if let Some(keyword) = non_empty(&self.keyword) {
            if !record
                .prompt
                .to_lowercase()
                .contains(&keyword.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Records matching a filter, newest first, plus how many sidecars could
/// not be read.
#[derive(Debug, Clone, Default)]
pub struct RecordListing {
    pub records: Vec<GenerationRecord>,
    pub skipped: usize,
}

impl RecordListing {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GenerationRecord> {
        self.records.iter()
    }
}

impl IntoIterator for RecordListing {
    type Item = GenerationRecord;
    type IntoIter = std::vec::IntoIter<GenerationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Descending by `(created_at, id)`.
pub fn newest_first(a: &GenerationRecord, b: &GenerationRecord) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}
