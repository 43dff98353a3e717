//! Extractor configuration file

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default source API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.trello.com/1";

/// Environment variable that overrides the configured base URL
pub const BASE_URL_ENV: &str = "TRELLO_BASE_URL";

/// Positive number of items requested per page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct PageSize(u32);

impl PageSize {
    pub const DEFAULT: PageSize = PageSize(100);

    /// Non-positive values are a configuration error
    pub fn new(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(SyncError::Config(format!(
                "page size must be a positive integer, got {}",
                value
            )));
        }
        u32::try_from(value)
            .map(PageSize)
            .map_err(|_| SyncError::Config(format!("page size {} is too large", value)))
    }

    /// Parse a page size supplied as text (CLI flag, environment)
    pub fn parse(value: &str) -> Result<Self> {
        let parsed: i64 = value.trim().parse().map_err(|_| {
            SyncError::Config(format!("page size must be a positive integer, got '{}'", value))
        })?;
        Self::new(parsed)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for PageSize {
    type Error = SyncError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PageSize> for u32 {
    fn from(size: PageSize) -> u32 {
        size.0
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub page_size: PageSize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: PageSize::DEFAULT,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SourceSettings {
    /// Base URL with the environment override applied and no trailing slash
    pub fn effective_base_url(&self) -> String {
        let url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone());
        url.trim_end_matches('/').to_string()
    }
}

/// Rate limit handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Delay reported when the source sends no usable retry hint
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,
}

fn default_delay_secs() -> u64 {
    5
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay_secs(),
        }
    }
}

/// Local persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_state_db")]
    pub state_db: PathBuf,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

fn config_root() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("cardsync");
    path
}

fn default_state_db() -> PathBuf {
    config_root().join("state.db")
}

fn default_artifact_dir() -> PathBuf {
    config_root().join("artifacts")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_db: default_state_db(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub source: SourceSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading cardsync configuration");

        let content = fs::read_to_string(path)?;
        let config: ExtractorConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `path` (or the default location), falling back to defaults when absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving cardsync configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// ~/.config/cardsync/config.yaml
    pub fn default_path() -> PathBuf {
        config_root().join("config.yaml")
    }
}
