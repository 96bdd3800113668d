//! Shared types for the email processing pipeline.

use serde::{Deserialize, Serialize};

use crate::error::PipelineStage;
use crate::store::record::{Category, ExtractedFields};

/// Classifier output: the email's intent plus any structured fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub fields: ExtractedFields,
}

impl Classification {
    pub fn new(category: Category, fields: ExtractedFields) -> Self {
        Self { category, fields }
    }

    /// A classification with no extracted fields.
    pub fn bare(category: Category) -> Self {
        Self::new(category, ExtractedFields::new())
    }
}

// ── Submission lifecycle ────────────────────────────────────────────

/// Where a single submission is in the pipeline.
///
/// `Received → Classified → Drafted → Persisted`; any stage may fall
/// through to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Received,
    Classified,
    Drafted,
    Persisted,
    Failed(PipelineStage),
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Drafted => "drafted",
            Self::Persisted => "persisted",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Persisted | Self::Failed(_))
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(stage) => write!(f, "failed ({})", stage),
            other => f.write_str(other.as_str()),
        }
    }
}
