//! Aggregate counts over a set of records.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::store::record::{Category, EmailRecord, RecordStatus};

/// Per-status and per-category counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub total: usize,
    pub by_status: BTreeMap<RecordStatus, usize>,
    pub by_category: BTreeMap<Category, usize>,
    /// Records whose draft still awaits handling (status other than done).
    pub open_drafts: usize,
}

impl StoreSummary {
    pub fn from_records(records: &[EmailRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            by_status: RecordStatus::ALL.iter().map(|s| (*s, 0)).collect(),
            by_category: Category::ALL.iter().map(|c| (*c, 0)).collect(),
            open_drafts: 0,
        };

        for record in records {
            *summary.by_status.entry(record.status).or_default() += 1;
            *summary.by_category.entry(record.category).or_default() += 1;
            if record.status.is_open() && !record.draft_reply.trim().is_empty() {
                summary.open_drafts += 1;
            }
        }

        summary
    }

    pub fn status_count(&self, status: RecordStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or_default()
    }

    pub fn category_count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or_default()
    }
}
