//! Configuration types for filevine-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for an export run
///
/// Every field has a default, so an empty JSON object (or a partial one) is a
/// valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API endpoints and HTTP behavior
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry configuration for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Download behavior (concurrency, dry-run, existing files)
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings that serde cannot check on its own
    pub fn validate(&self) -> Result<()> {
        if self.download.workers == 0 {
            return Err(Error::config(
                "download.workers",
                "worker count must be at least 1",
            ));
        }
        if self.api.page_size == 0 {
            return Err(Error::config("api.page_size", "page size must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry.max_attempts",
                "at least one attempt is required",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!("must be finite and at least 1, got {multiplier}"),
            ));
        }
        url::Url::parse(&self.api.api_root)
            .map_err(|e| Error::config("api.api_root", format!("invalid URL: {e}")))?;
        url::Url::parse(&self.api.identity_url)
            .map_err(|e| Error::config("api.identity_url", format!("invalid URL: {e}")))?;
        Ok(())
    }
}

/// Remote API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the v2 API (default: "https://api.filevineapp.com/fv-app/v2")
    #[serde(default = "default_api_root")]
    pub api_root: String,

    /// OAuth2 token endpoint (default: "https://identity.filevine.com/connect/token")
    #[serde(default = "default_identity_url")]
    pub identity_url: String,

    /// Scope requested during the token exchange
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Timeout for token, listing and locator calls (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for a whole content download (default: 600 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Items requested per listing page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Refresh the token when it expires within this margin (default: 60 seconds)
    #[serde(default = "default_refresh_margin", with = "duration_serde")]
    pub token_refresh_margin: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            identity_url: default_identity_url(),
            scope: default_scope(),
            request_timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
            page_size: default_page_size(),
            token_refresh_margin: default_refresh_margin(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Number of parallel download workers (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// List what would be downloaded without fetching or writing anything
    #[serde(default)]
    pub dry_run: bool,

    /// What to do when a destination file already exists
    #[serde(default)]
    pub existing_files: ExistingFileAction,

    /// Create every remote folder locally, even those without documents (default: true)
    #[serde(default = "default_true")]
    pub mirror_empty_folders: bool,

    /// Treat sibling names that differ only in case as colliding
    /// (default: true on Windows and macOS)
    #[serde(default = "default_case_insensitive")]
    pub case_insensitive_names: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            dry_run: false,
            existing_files: ExistingFileAction::default(),
            mirror_empty_folders: true,
            case_insensitive_names: default_case_insensitive(),
        }
    }
}

/// Handling of a destination file that already exists before the download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingFileAction {
    /// Replace the existing file (default)
    #[default]
    Overwrite,
    /// Keep the existing file and record the document as skipped
    Skip,
    /// Record the document as failed
    Error,
}

impl std::str::FromStr for ExistingFileAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown existing-file action '{other}' (expected overwrite, skip or error)"
            )),
        }
    }
}

fn default_api_root() -> String {
    "https://api.filevineapp.com/fv-app/v2".to_string()
}

fn default_identity_url() -> String {
    "https://identity.filevine.com/connect/token".to_string()
}

fn default_scope() -> String {
    "fv.api.gateway.access tenant filevine.v2.api.* openid email fv.auth.tenant.read".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_page_size() -> usize {
    100
}

fn default_refresh_margin() -> Duration {
    Duration::from_secs(60)
}

fn default_workers() -> usize {
    4
}

fn default_case_insensitive() -> bool {
    cfg!(any(windows, target_os = "macos"))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
