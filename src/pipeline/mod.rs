//! Email processing pipeline.
//!
//! Every submitted email flows through:
//! 1. `Classifier::classify()`: intent category + extracted fields
//! 2. `Drafter::draft()`: suggested reply
//! 3. `RecordStore`: append and commit as a new record
//!
//! Drafts are never sent anywhere; they wait in the store for a human.

pub mod classifier;
pub mod drafter;
pub mod extract;
pub mod processor;
pub mod types;

pub use classifier::{Classifier, LlmClassifier};
pub use drafter::{Drafter, DrafterConfig, LlmDrafter};
pub use processor::EmailPipeline;
pub use types::{Classification, SubmissionState};
