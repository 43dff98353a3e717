//! Configuration system
//!
//! Loads ~/.config/cardsync/config.yaml with support for:
//! - Source API base URL, page size and request timeout
//! - The fallback delay used when a rate-limited response carries no hint
//! - Locations of the state database and the artifact directory

mod extractor_config;
pub mod validation;

pub use extractor_config::{
    ExtractorConfig, PageSize, RateLimitSettings, SourceSettings, StorageSettings,
    BASE_URL_ENV, DEFAULT_BASE_URL,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
