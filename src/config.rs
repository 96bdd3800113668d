//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default location of the record file.
pub const DEFAULT_STORE_PATH: &str = "./data/processed_emails.csv";

/// Pipeline configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// CSV file holding processed-email records.
    pub store_path: PathBuf,
    /// Optional mirror written after every successful save.
    pub backup_path: Option<PathBuf>,
    /// Which LLM backend to use.
    pub backend: LlmBackend,
    /// Model name for the selected backend.
    pub model: String,
    /// API key for the selected backend, if present.
    pub api_key: Option<SecretString>,
    /// Classifier results below this confidence are coerced to `other`.
    pub min_confidence: f32,
    /// Per-attempt timeout for LLM calls.
    pub llm_timeout: Duration,
    /// Retries on transient LLM failures.
    pub llm_retries: u32,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            backup_path: None,
            backend: LlmBackend::Anthropic,
            model: LlmBackend::Anthropic.default_model().to_string(),
            api_key: None,
            min_confidence: 0.5,
            llm_timeout: Duration::from_secs(30),
            llm_retries: 2,
        }
    }
}

impl TriageConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment, tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_path = lookup("EMAIL_TRIAGE_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.store_path);

        let backup_path = lookup("EMAIL_TRIAGE_BACKUP_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let backend = match lookup("EMAIL_TRIAGE_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>().map_err(|message| {
                ConfigError::InvalidValue {
                    key: "EMAIL_TRIAGE_BACKEND".to_string(),
                    message,
                }
            })?,
            None => defaults.backend,
        };

        let model = lookup("EMAIL_TRIAGE_MODEL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        let api_key = lookup(backend.api_key_var())
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from);

        let min_confidence: f32 = parse_var(&lookup, "EMAIL_TRIAGE_MIN_CONFIDENCE")?
            .unwrap_or(defaults.min_confidence);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_TRIAGE_MIN_CONFIDENCE".to_string(),
                message: format!("{min_confidence} is outside 0.0..=1.0"),
            });
        }

        let llm_timeout = parse_var::<u64, _>(&lookup, "EMAIL_TRIAGE_LLM_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.llm_timeout);

        let llm_retries =
            parse_var(&lookup, "EMAIL_TRIAGE_LLM_RETRIES")?.unwrap_or(defaults.llm_retries);

        Ok(Self {
            store_path,
            backup_path,
            backend,
            model,
            api_key,
            min_confidence,
            llm_timeout,
            llm_retries,
        })
    }

    /// LLM settings for the configured backend. Fails if no API key is set.
    pub fn llm_config(&self) -> Result<LlmConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar(self.backend.api_key_var().to_string()))?;

        Ok(LlmConfig {
            backend: self.backend,
            api_key,
            model: self.model.clone(),
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}
