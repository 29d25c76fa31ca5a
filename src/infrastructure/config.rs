//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional config file (TOML/JSON/YAML, chosen by extension)
//! 3. Environment variables, e.g. `CATALOG_SCRAPER_FETCH__TIMEOUT_SECS=20`
//!
//! Command-line flags are applied on top by the CLI layer, after which
//! [`ScraperConfig::validate`] must pass before a run starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CATALOG_SCRAPER";

/// Environment variable holding the language-model API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete scraper configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub fetch: FetchConfig,
    pub extraction: ExtractionConfig,
    pub llm: LlmConfig,
    pub images: ImageConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
}

/// HTTP behaviour toward merchant sites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Total attempts for a retryable request
    pub max_retries: u32,

    /// First backoff step; doubles on each retry
    pub backoff_base_secs: u64,

    /// Politeness delay inserted before every request
    pub request_delay_secs: f64,

    /// Uniform jitter applied around `request_delay_secs`
    pub delay_variance_secs: f64,

    /// Lower bound for a jittered delay
    pub min_delay_secs: f64,

    /// Verify TLS certificates. Off by default for misconfigured merchant sites.
    pub verify_tls: bool,

    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_retries: defaults::MAX_RETRIES,
            backoff_base_secs: defaults::BACKOFF_BASE_SECS,
            request_delay_secs: defaults::REQUEST_DELAY_SECS,
            delay_variance_secs: defaults::DELAY_VARIANCE_SECS,
            min_delay_secs: defaults::MIN_DELAY_SECS,
            verify_tls: false,
            max_redirects: defaults::MAX_REDIRECTS,
        }
    }
}

/// Thresholds for classification and text acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub min_description_length: usize,
    pub max_description_length: usize,
    pub min_line_length: usize,

    /// More product-like elements than this marks a page as a listing
    pub listing_element_threshold: usize,

    /// Characters of page text sent to the language model
    pub llm_page_text_limit: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_description_length: defaults::MIN_DESCRIPTION_LENGTH,
            max_description_length: defaults::MAX_DESCRIPTION_LENGTH,
            min_line_length: defaults::MIN_LINE_LENGTH,
            listing_element_threshold: defaults::LISTING_ELEMENT_THRESHOLD,
            llm_page_text_limit: defaults::LLM_PAGE_TEXT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: defaults::LLM_MODEL.to_string(),
            base_url: defaults::LLM_BASE_URL.to_string(),
            temperature: defaults::LLM_TEMPERATURE,
            max_tokens: defaults::LLM_MAX_TOKENS,
            timeout_secs: defaults::LLM_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub download: bool,
    pub max_bytes: u64,
    pub max_candidates: usize,

    /// Media root; images land in `<media_dir>/<subdirectory>`
    pub media_dir: PathBuf,
    pub subdirectory: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            download: false,
            max_bytes: defaults::MAX_IMAGE_BYTES,
            max_candidates: defaults::MAX_IMAGE_CANDIDATES,
            media_dir: PathBuf::from(defaults::MEDIA_DIR),
            subdirectory: defaults::IMAGE_SUBDIRECTORY.to_string(),
        }
    }
}

/// Per-run selection and transaction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub limit: Option<u32>,

    /// Skip products whose description already passes the minimum length
    pub skip_existing: bool,

    /// Select every product, described or not
    pub force: bool,

    /// All-or-nothing transaction mode
    pub rollback_on_error: bool,

    /// Flush per-item writes every N updated items (0 = after each item)
    pub commit_interval: u32,

    pub dry_run: bool,

    pub ledger_dir: PathBuf,

    /// Audit log destination; a timestamped file under the log directory when unset
    pub audit_log: Option<PathBuf>,

    /// Minimum name similarity accepted by the description import
    pub name_similarity_threshold: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limit: None,
            skip_existing: false,
            force: false,
            rollback_on_error: false,
            commit_interval: 0,
            dry_run: false,
            ledger_dir: PathBuf::from(defaults::LEDGER_DIR),
            audit_log: None,
            name_similarity_threshold: defaults::NAME_SIMILARITY_THRESHOLD,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,

    /// Number of log files to keep (older files are deleted on startup)
    pub max_files: u32,

    pub auto_cleanup_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            max_files: defaults::MAX_LOG_FILES,
            auto_cleanup_logs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::DATABASE_URL.to_string(),
            max_connections: defaults::DB_MAX_CONNECTIONS,
        }
    }
}

impl ScraperConfig {
    /// Build the layered configuration: defaults, then `file`, then environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fetch = &self.fetch;
        if fetch.max_retries == 0 || fetch.max_retries > defaults::MAX_RETRIES_LIMIT {
            return Err(ConfigError::invalid(format!(
                "fetch.max_retries must be between 1 and {}, got {}",
                defaults::MAX_RETRIES_LIMIT,
                fetch.max_retries
            )));
        }
        if fetch.timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch.timeout_secs must be greater than 0"));
        }
        for (name, value) in [
            ("fetch.request_delay_secs", fetch.request_delay_secs),
            ("fetch.delay_variance_secs", fetch.delay_variance_secs),
            ("fetch.min_delay_secs", fetch.min_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let extraction = &self.extraction;
        if extraction.min_description_length > extraction.max_description_length {
            return Err(ConfigError::invalid(
                "extraction.min_description_length cannot be greater than max_description_length",
            ));
        }
        if extraction.max_description_length < 4 {
            return Err(ConfigError::invalid(
                "extraction.max_description_length must leave room for an ellipsis",
            ));
        }

        if self.images.max_bytes == 0 || self.images.max_candidates == 0 {
            return Err(ConfigError::invalid(
                "images.max_bytes and images.max_candidates must be greater than 0",
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::invalid("llm.model cannot be empty"));
        }

        let threshold = self.run.name_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::invalid(format!(
                "run.name_similarity_threshold must be within 0.0..=1.0, got {threshold}"
            )));
        }

        if self.run.force && self.run.skip_existing {
            return Err(ConfigError::invalid(
                "run.force and run.skip_existing cannot both be enabled",
            ));
        }

        Ok(())
    }

    /// API key for the language-model fallback, required only when it is enabled
    pub fn llm_api_key(&self) -> Result<Option<String>, ConfigError> {
        if !self.llm.enabled {
            return Ok(None);
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Some)
            .ok_or(ConfigError::MissingEnv(API_KEY_ENV))
    }
}

/// Default configuration values
pub mod defaults {
    /// Accepted descriptions are at least this many characters
    pub const MIN_DESCRIPTION_LENGTH: usize = 50;

    /// Longer descriptions are truncated with an ellipsis
    pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

    /// Shorter lines are dropped as navigation or metadata
    pub const MIN_LINE_LENGTH: usize = 20;

    pub const LISTING_ELEMENT_THRESHOLD: usize = 5;

    pub const LLM_PAGE_TEXT_LIMIT: usize = 8000;

    pub const MAX_RETRIES: u32 = 3;

    pub const MAX_RETRIES_LIMIT: u32 = 10;

    pub const BACKOFF_BASE_SECS: u64 = 2;

    pub const REQUEST_DELAY_SECS: f64 = 2.0;

    pub const DELAY_VARIANCE_SECS: f64 = 1.0;

    pub const MIN_DELAY_SECS: f64 = 0.5;

    pub const REQUEST_TIMEOUT_SECS: u64 = 10;

    pub const MAX_REDIRECTS: usize = 10;

    /// 5 MB
    pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

    pub const MAX_IMAGE_CANDIDATES: usize = 3;

    pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

    pub const LLM_MODEL: &str = "gpt-4o-mini";

    pub const LLM_BASE_URL: &str = "https://api.openai.com/v1";

    pub const LLM_TEMPERATURE: f32 = 0.3;

    pub const LLM_MAX_TOKENS: u32 = 500;

    pub const LLM_TIMEOUT_SECS: u64 = 60;

    pub const MEDIA_DIR: &str = "media";

    pub const IMAGE_SUBDIRECTORY: &str = "products";

    pub const LEDGER_DIR: &str = "ledgers";

    pub const LOG_DIR: &str = "logs";

    pub const LOG_LEVEL: &str = "info";

    pub const MAX_LOG_FILES: u32 = 10;

    pub const DATABASE_URL: &str = "sqlite://catalog.db";

    pub const DB_MAX_CONNECTIONS: u32 = 5;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ScraperConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.fetch.verify_tls);
        assert_eq!(config.extraction.min_description_length, 50);
        assert_eq!(config.images.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[fetch]\ntimeout_secs = 25\nverify_tls = true\n\n[extraction]\nlisting_element_threshold = 8"
        )
        .unwrap();

        let config = ScraperConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.fetch.timeout_secs, 25);
        assert!(config.fetch.verify_tls);
        assert_eq!(config.extraction.listing_element_threshold, 8);
        // untouched sections keep their defaults
        assert_eq!(config.fetch.max_retries, defaults::MAX_RETRIES);
        assert_eq!(config.images, ImageConfig::default());
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[fetch]\nmax_retries = 0").unwrap();

        let err = ScraperConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn validation_rules() {
        let mut config = ScraperConfig::default();
        config.fetch.max_retries = 40;
        assert!(config.validate().is_err());
        config.fetch.max_retries = defaults::MAX_RETRIES_LIMIT;
        assert!(config.validate().is_ok());

        let mut config = ScraperConfig::default();
        config.extraction.min_description_length = 3000;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.fetch.request_delay_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.run.force = true;
        config.run.skip_existing = true;
        assert!(config.validate().is_err());

        let mut config = ScraperConfig::default();
        config.run.name_similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_not_needed_when_llm_disabled() {
        let config = ScraperConfig::default();
        assert_eq!(config.llm_api_key().unwrap(), None);
    }
}
