//! Configuration validation
//!
//! Validates cardsync configuration for correctness:
//! - Base URL is http(s)
//! - Timeouts and fallback delays are non-zero
//! - Storage paths are set

use super::extractor_config::ExtractorConfig;
use crate::SyncError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a cardsync configuration, collecting every problem
pub fn validate_config(config: &ExtractorConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let base_url = config.source.base_url.trim();
    if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
        errors.push(ValidationError::new(
            "source.base_url",
            format!("Must be an http(s) URL, got '{}'", base_url),
        ));
    }

    if config.source.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "source.request_timeout_secs",
            "Must be greater than zero",
        ));
    }

    if config.rate_limit.default_delay_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.default_delay_secs",
            "Must be greater than zero",
        ));
    }

    if config.storage.state_db.as_os_str().is_empty() {
        errors.push(ValidationError::new("storage.state_db", "Path is empty"));
    }

    if config.storage.artifact_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("storage.artifact_dir", "Path is empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and fold all problems into one configuration error
pub fn validate_config_result(config: &ExtractorConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        SyncError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
