//! Persistence layer: CSV-backed storage for processed-email records.

pub mod codec;
pub mod csv_backend;
pub mod memory;
pub mod record;
pub mod summary;
pub mod table;
pub mod traits;

pub use csv_backend::CsvRecordStore;
pub use memory::MemoryRecordStore;
pub use record::{Category, EmailRecord, ExtractedFields, Priority, RecordPatch, RecordStatus};
pub use summary::StoreSummary;
pub use traits::RecordStore;
