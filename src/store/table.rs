//! In-memory working set shared by the store backends.

use uuid::Uuid;

use crate::error::StoreError;
use crate::store::record::{EmailRecord, RecordPatch};

/// Ordered records with unique IDs.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    records: Vec<EmailRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, rejecting repeated IDs.
    pub fn from_records(records: Vec<EmailRecord>) -> Result<Self, StoreError> {
        let mut table = Self::new();
        for record in records {
            table.append(record)?;
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmailRecord] {
        &self.records
    }

    pub fn get(&self, id: Uuid) -> Option<&EmailRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn position(&self, id: Uuid) -> Result<usize, StoreError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound { id })
    }

    /// Add a record at the end. Fails if the ID is taken.
    pub fn append(&mut self, record: EmailRecord) -> Result<(), StoreError> {
        if self.get(record.id).is_some() {
            return Err(StoreError::DuplicateId { id: record.id });
        }
        self.records.push(record);
        Ok(())
    }

    /// Apply a patch to the record with `id` and return the updated copy.
    pub fn update(&mut self, id: Uuid, patch: &RecordPatch) -> Result<EmailRecord, StoreError> {
        let index = self.position(id)?;
        let record = &mut self.records[index];
        patch.apply(record);
        Ok(record.clone())
    }

    /// Remove and return the record with `id`.
    pub fn remove(&mut self, id: Uuid) -> Result<EmailRecord, StoreError> {
        let index = self.position(id)?;
        Ok(self.records.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::record::{Category, ExtractedFields, RecordStatus};

    fn record(text: &str) -> EmailRecord {
        EmailRecord::new(text, Category::Other, ExtractedFields::new(), "Thanks.")
    }

    #[test]
    fn append_preserves_order() {
        let mut table = RecordTable::new();
        let a = record("a");
        let b = record("b");
        table.append(a.clone()).unwrap();
        table.append(b.clone()).unwrap();
        assert_eq!(table.records(), &[a, b]);
    }

    #[test]
    fn duplicate_append_leaves_table_unchanged() {
        let mut table = RecordTable::new();
        let a = record("a");
        table.append(a.clone()).unwrap();

        let mut clash = record("other text");
        clash.id = a.id;
        let err = table.append(clash).unwrap_err();

        assert!(matches!(err, StoreError::DuplicateId { id } if id == a.id));
        assert_eq!(table.records(), std::slice::from_ref(&a));
    }

    #[test]
    fn update_missing_id_fails() {
        let mut table = RecordTable::new();
        let err = table
            .update(Uuid::new_v4(), &RecordPatch::new().with_notes("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn update_applies_patch() {
        let mut table = RecordTable::new();
        let a = record("a");
        table.append(a.clone()).unwrap();

        let updated = table
            .update(a.id, &RecordPatch::new().with_status(RecordStatus::OnHold))
            .unwrap();
        assert_eq!(updated.status, RecordStatus::OnHold);
        assert_eq!(table.get(a.id), Some(&updated));
    }

    #[test]
    fn remove_returns_record() {
        let mut table = RecordTable::new();
        let a = record("a");
        table.append(a.clone()).unwrap();

        assert_eq!(table.remove(a.id).unwrap(), a);
        assert!(table.is_empty());
        assert!(matches!(
            table.remove(a.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn from_records_rejects_duplicates() {
        let a = record("a");
        assert!(RecordTable::from_records(vec![a.clone(), a]).is_err());
    }
}
