//! In-memory `RecordStore`, used by tests and as a substitute backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::record::{EmailRecord, RecordPatch};
use crate::store::table::RecordTable;
use crate::store::traits::RecordStore;

/// Record store whose "durable" table lives in memory.
///
/// `set_fail_saves(true)` makes every `save_all` fail with a persistence
/// error, for exercising commit failure paths.
#[derive(Default)]
pub struct MemoryRecordStore {
    committed: RwLock<Vec<EmailRecord>>,
    table: RwLock<RecordTable>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `records` already committed and loaded.
    pub fn with_records(records: Vec<EmailRecord>) -> Result<Self, StoreError> {
        let table = RecordTable::from_records(records.clone())?;
        Ok(Self {
            committed: RwLock::new(records),
            table: RwLock::new(table),
            ..Self::default()
        })
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Contents of the last successful save.
    pub async fn committed(&self) -> Vec<EmailRecord> {
        self.committed.read().await.clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load_all(&self) -> Result<Vec<EmailRecord>, StoreError> {
        let records = self.committed.read().await.clone();
        *self.table.write().await = RecordTable::from_records(records.clone())?;
        Ok(records)
    }

    async fn records(&self) -> Vec<EmailRecord> {
        self.table.read().await.records().to_vec()
    }

    async fn get(&self, id: Uuid) -> Option<EmailRecord> {
        self.table.read().await.get(id).cloned()
    }

    async fn append(&self, record: EmailRecord) -> Result<(), StoreError> {
        self.table.write().await.append(record)
    }

    async fn update(&self, id: Uuid, patch: &RecordPatch) -> Result<EmailRecord, StoreError> {
        self.table.write().await.update(id, patch)
    }

    async fn remove(&self, id: Uuid) -> Result<EmailRecord, StoreError> {
        self.table.write().await.remove(id)
    }

    async fn save_all(&self, records: &[EmailRecord]) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Persistence {
                path: "memory".into(),
                reason: "simulated write failure".to_string(),
            });
        }
        let table = RecordTable::from_records(records.to_vec())?;
        *self.committed.write().await = records.to_vec();
        *self.table.write().await = table;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
