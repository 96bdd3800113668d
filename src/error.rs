//! Error types for Email Triage.

use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

/// Rejected pipeline input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid input: {reason}")]
pub struct InvalidInputError {
    pub reason: String,
}

impl InvalidInputError {
    pub fn empty_text() -> Self {
        Self {
            reason: "email text is empty".to_string(),
        }
    }
}

/// Classifier failures.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error("Classification backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("Malformed classification response: {reason}")]
    MalformedResponse { reason: String },
}

/// Drafter failures.
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error("Draft backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("Draft backend returned an empty reply")]
    EmptyDraft,
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record {id} already exists")]
    DuplicateId { id: Uuid },

    #[error("Record {id} not found")]
    NotFound { id: Uuid },

    #[error("Unknown record field: {field}")]
    UnknownField { field: String },

    #[error("Record field {field} cannot be edited")]
    ImmutableField { field: String },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    #[error("Store file {path} has an unexpected format: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Failed to persist {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

/// Stage of the processing pipeline at which a submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validation,
    Classification,
    Drafting,
    Persistence,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Classification => "classification",
            Self::Drafting => "drafting",
            Self::Persistence => "persistence",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by `EmailPipeline::process`.
///
/// The message always starts with the failed stage so callers can decide
/// whether resubmitting makes sense.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("drafting failed: {0}")]
    Drafting(#[from] DraftError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl PipelineError {
    /// The stage that produced this error.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::InvalidInput(_) => PipelineStage::Validation,
            Self::Classification(_) => PipelineStage::Classification,
            Self::Drafting(_) => PipelineStage::Drafting,
            Self::Persistence(_) => PipelineStage::Persistence,
        }
    }
}
