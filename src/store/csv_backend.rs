//! CSV file backend for `RecordStore`.
//!
//! The whole file is rewritten on every save: records are encoded in
//! memory, written to a uniquely named temp file next to the target,
//! fsynced and renamed into place. A crash mid-write leaves the previous
//! file intact.
//!
//! The existing file is read before the working set is first touched, so
//! a commit never drops rows the store has not seen.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::codec;
use crate::store::record::{EmailRecord, RecordPatch};
use crate::store::table::RecordTable;
use crate::store::traits::RecordStore;

/// Record store persisted as a single CSV file.
pub struct CsvRecordStore {
    path: PathBuf,
    backup_path: Option<PathBuf>,
    table: RwLock<RecordTable>,
    loaded: OnceCell<()>,
}

impl CsvRecordStore {
    /// Create a store for `path` without touching the file.
    ///
    /// The file is read on first access to the working set.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_path: None,
            table: RwLock::new(RecordTable::new()),
            loaded: OnceCell::new(),
        }
    }

    /// Create a store and load the existing file, if any.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        let records = store.load_all().await?;
        info!(path = %store.path.display(), records = records.len(), "Record store opened");
        Ok(store)
    }

    /// Also mirror every successful save to `backup_path`.
    pub fn with_backup(mut self, backup_path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(backup_path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file into the working set unless that already happened.
    async fn ensure_loaded(&self) -> Result<(), StoreError> {
        self.loaded
            .get_or_try_init(|| async {
                let records = self.read_file().await?;
                *self.table.write().await = RecordTable::from_records(records)?;
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }

    async fn read_file(&self) -> Result<Vec<EmailRecord>, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store file absent, starting empty");
                Vec::new()
            }
            Err(e) => return Err(self.persistence_error("failed to read store file", e)),
        };

        codec::decode_records(&bytes).map_err(|reason| StoreError::Format {
            path: self.path.clone(),
            reason,
        })
    }

    fn persistence_error(&self, action: &str, error: impl std::fmt::Display) -> StoreError {
        StoreError::Persistence {
            path: self.path.clone(),
            reason: format!("{action}: {error}"),
        }
    }

    async fn write_atomic(&self, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence_error("failed to create store directory", e))?;
        }

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.path).await
        }
        .await;

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp_path).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                warn!(
                    path = %temp_path.display(),
                    error = %cleanup,
                    "Failed to remove temporary store file"
                );
            }
            return Err(self.persistence_error("failed to write store file", e));
        }

        Ok(())
    }

    async fn write_backup(&self, bytes: &[u8]) {
        let Some(backup_path) = self.backup_path.as_ref() else {
            return;
        };
        if let Err(e) = fs::write(backup_path, bytes).await {
            warn!(
                path = %backup_path.display(),
                error = %e,
                "Failed to write store backup"
            );
        }
    }
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    async fn load_all(&self) -> Result<Vec<EmailRecord>, StoreError> {
        let records = self.read_file().await?;

        // decode_records already drops repeated IDs.
        let table = RecordTable::from_records(records.clone())?;
        *self.table.write().await = table;
        let _ = self.loaded.set(());

        debug!(path = %self.path.display(), records = records.len(), "Store loaded");
        Ok(records)
    }

    async fn records(&self) -> Vec<EmailRecord> {
        if let Err(e) = self.ensure_loaded().await {
            warn!(path = %self.path.display(), error = %e, "Could not read store file");
        }
        self.table.read().await.records().to_vec()
    }

    async fn get(&self, id: Uuid) -> Option<EmailRecord> {
        if let Err(e) = self.ensure_loaded().await {
            warn!(path = %self.path.display(), error = %e, "Could not read store file");
        }
        self.table.read().await.get(id).cloned()
    }

    async fn append(&self, record: EmailRecord) -> Result<(), StoreError> {
        self.ensure_loaded().await?;
        self.table.write().await.append(record)
    }

    async fn update(&self, id: Uuid, patch: &RecordPatch) -> Result<EmailRecord, StoreError> {
        self.ensure_loaded().await?;
        self.table.write().await.update(id, patch)
    }

    async fn remove(&self, id: Uuid) -> Result<EmailRecord, StoreError> {
        self.ensure_loaded().await?;
        self.table.write().await.remove(id)
    }

    async fn save_all(&self, records: &[EmailRecord]) -> Result<(), StoreError> {
        let table = RecordTable::from_records(records.to_vec())?;
        let bytes = codec::encode_records(records)
            .map_err(|reason| self.persistence_error("failed to encode records", reason))?;

        self.write_atomic(&bytes).await?;
        *self.table.write().await = table;
        let _ = self.loaded.set(());
        self.write_backup(&bytes).await;

        debug!(path = %self.path.display(), records = records.len(), "Store saved");
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.ensure_loaded().await?;
        let records = self.table.read().await.records().to_vec();
        self.save_all(&records).await
    }
}
