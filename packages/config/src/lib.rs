#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Harvest configuration.
//!
//! A single TOML file describes both external services, the time-series
//! store, the run limits, and the tracked projects. It is parsed once into
//! an immutable [`HarvestConfig`] that the rest of the pipeline receives
//! explicitly. Secrets can be supplied through environment variables instead
//! of the file:
//!
//! | variable | overrides |
//! |---|---|
//! | `HARVEST_QUALITY_TOKEN` | `quality.token` |
//! | `HARVEST_BUILD_USER` | `build.user` |
//! | `HARVEST_BUILD_TOKEN` | `build.token` |
//! | `HARVEST_STORE_URL` | `store.url` |

pub mod auth;
pub mod registry;

use std::path::{Path, PathBuf};
use std::time::Duration;

use health_harvest_models::{FailurePolicy, ProjectSource};
use serde::Deserialize;

pub use auth::BasicAuth;
pub use registry::{ProjectEntry, enabled_projects};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HARVEST_CONFIG";

/// Config file used when neither `--config` nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_PATH: &str = "harvest.toml";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but a value is unusable.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Code-quality service settings.
#[derive(Debug, Clone)]
pub struct QualityServiceConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Metric names requested for every project.
    pub metric_keys: Vec<String>,
    /// Credential for every quality request.
    pub auth: BasicAuth,
}

impl QualityServiceConfig {
    /// Metric names joined the way the `metricKeys` query parameter wants them.
    #[must_use]
    pub fn metric_keys_csv(&self) -> String {
        self.metric_keys.join(",")
    }
}

/// Build service settings.
#[derive(Debug, Clone)]
pub struct BuildServiceConfig {
    /// Credential for every build request.
    pub auth: BasicAuth,
}

/// Time-series store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the store's HTTP API (e.g. `http://localhost:8086`).
    pub url: String,
    /// Target database.
    pub database: String,
    /// Timeout for the batch write call.
    pub timeout: Duration,
    /// Optional store user.
    pub username: Option<String>,
    /// Optional store password.
    pub password: Option<String>,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,
    /// Deadline for each individual HTTP request.
    pub request_timeout: Duration,
    /// Deadline for collecting every report of the run.
    pub run_timeout: Duration,
    /// What to do with a failed fetch.
    pub failure_policy: FailurePolicy,
    /// Code-quality service.
    pub quality: QualityServiceConfig,
    /// Build service.
    pub build: BuildServiceConfig,
    /// Time-series store.
    pub store: StoreConfig,
    /// Tracked projects in file order.
    pub projects: Vec<ProjectSource>,
}

// ── Raw file format ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_concurrency", alias = "chunks")]
    concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_run_timeout_secs")]
    run_timeout_secs: u64,
    #[serde(default)]
    on_fetch_failure: FailurePolicy,
    quality: RawQuality,
    #[serde(default)]
    build: RawBuild,
    store: RawStore,
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct RawQuality {
    base_url: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    metric_keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBuild {
    #[serde(default)]
    user: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct RawStore {
    url: String,
    database: String,
    #[serde(default = "default_store_timeout_secs")]
    timeout_secs: u64,
    username: Option<String>,
    password: Option<String>,
}

const fn default_concurrency() -> usize {
    16
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_run_timeout_secs() -> u64 {
    300
}

const fn default_store_timeout_secs() -> u64 {
    300
}

impl RawConfig {
    fn apply_env_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("HARVEST_QUALITY_TOKEN") {
            self.quality.token = token;
        }
        if let Some(user) = lookup("HARVEST_BUILD_USER") {
            self.build.user = user;
        }
        if let Some(token) = lookup("HARVEST_BUILD_TOKEN") {
            self.build.token = token;
        }
        if let Some(url) = lookup("HARVEST_STORE_URL") {
            self.store.url = url;
        }
    }

    fn resolve(self) -> Result<HarvestConfig, ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency must be at least 1"));
        }
        if self.request_timeout_secs == 0 || self.run_timeout_secs == 0 {
            return Err(ConfigError::invalid("timeouts must be at least 1 second"));
        }

        let base_url = self.quality.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConfigError::invalid("quality.base_url is empty"));
        }

        let metric_keys: Vec<String> = self
            .quality
            .metric_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if metric_keys.is_empty() {
            return Err(ConfigError::invalid("quality.metric_keys is empty"));
        }

        let store_url = self.store.url.trim().trim_end_matches('/').to_string();
        if store_url.is_empty() {
            return Err(ConfigError::invalid("store.url is empty"));
        }
        if self.store.database.trim().is_empty() {
            return Err(ConfigError::invalid("store.database is empty"));
        }

        if self.quality.token.is_empty() {
            log::warn!("No quality service token configured; requests will be anonymous");
        }
        if self.build.user.is_empty() {
            log::warn!("No build service user configured");
        }

        let projects = registry::resolve_projects(self.projects)?;

        Ok(HarvestConfig {
            concurrency: self.concurrency,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            failure_policy: self.on_fetch_failure,
            quality: QualityServiceConfig {
                base_url,
                metric_keys,
                auth: BasicAuth::token(&self.quality.token),
            },
            build: BuildServiceConfig {
                auth: BasicAuth::encode(&self.build.user, &self.build.token),
            },
            store: StoreConfig {
                url: store_url,
                database: self.store.database.trim().to_string(),
                timeout: Duration::from_secs(self.store.timeout_secs),
                username: self.store.username.filter(|u| !u.is_empty()),
                password: self.store.password,
            },
            projects,
        })
    }
}

impl HarvestConfig {
    /// Parses a config from TOML text, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or fails
    /// validation.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Self::from_toml_str_with_env(toml_str, |_| None)
    }

    /// Parses a config from TOML text, applying overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML or fails
    /// validation.
    pub fn from_toml_str_with_env(
        toml_str: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut raw: RawConfig = toml::de::from_str(toml_str)?;
        raw.apply_env_overrides(&lookup);
        raw.resolve()
    }

    /// Loads the config file at `path` and applies environment overrides
    /// from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str_with_env(&text, |key| {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        })?;

        log::debug!(
            "Loaded {} project(s) from {}",
            config.projects.len(),
            path.display()
        );

        Ok(config)
    }

    /// Returns a copy with the project list replaced.
    #[must_use]
    pub fn with_projects(mut self, projects: Vec<ProjectSource>) -> Self {
        self.projects = projects;
        self
    }
}

/// Resolves the config path from the CLI flag, then [`CONFIG_ENV`], then
/// [`DEFAULT_CONFIG_PATH`].
#[must_use]
pub fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
