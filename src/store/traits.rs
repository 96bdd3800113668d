//! `RecordStore` trait, the contract shared by the pipeline and any
//! presentation layer that reads or edits records.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::record::{EmailRecord, RecordPatch};

/// Backend-agnostic record store.
///
/// Implementations keep an in-memory working set. `append`, `update` and
/// `remove` change only the working set; `save_all` is the sole durable
/// write and replaces the stored table wholesale.
///
/// No locking spans `load_all`/`save_all`: concurrent writers must be
/// serialized by the caller.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the durable table and reset the working set to it.
    ///
    /// A missing or empty table yields an empty list.
    async fn load_all(&self) -> Result<Vec<EmailRecord>, StoreError>;

    /// Snapshot of the working set.
    async fn records(&self) -> Vec<EmailRecord>;

    /// Look up a record in the working set.
    async fn get(&self, id: Uuid) -> Option<EmailRecord>;

    /// Add a new record. Fails with `DuplicateId` if the ID exists.
    async fn append(&self, record: EmailRecord) -> Result<(), StoreError>;

    /// Apply a partial edit. Fails with `NotFound` for unknown IDs.
    async fn update(&self, id: Uuid, patch: &RecordPatch) -> Result<EmailRecord, StoreError>;

    /// Delete a record explicitly. Fails with `NotFound` for unknown IDs.
    async fn remove(&self, id: Uuid) -> Result<EmailRecord, StoreError>;

    /// Atomically replace the durable table with `records`.
    ///
    /// On success the working set becomes `records`; on failure both the
    /// durable table and the working set are left as they were.
    async fn save_all(&self, records: &[EmailRecord]) -> Result<(), StoreError>;

    /// Persist the current working set.
    async fn commit(&self) -> Result<(), StoreError> {
        let records = self.records().await;
        self.save_all(&records).await
    }
}
