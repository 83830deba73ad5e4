//! Service configuration.
//!
//! Loaded from TOML (`--config`, then `SNSDIAG_CONFIG`, then
//! `~/.config/snsdiag/config.toml`). A missing default file means
//! defaults. Selected values can be overridden from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use snsdiag_openai::DEFAULT_BASE_URL;

use crate::errors::DiagnosisError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for DiagnosisError {
    fn from(err: ConfigError) -> Self {
        DiagnosisError::Config(err.to_string())
    }
}

/// Execution mode. Development disables the IP throttle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

impl RunMode {
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "development" => Ok(Self::Development),
            other => Err(ConfigError::Invalid(format!("unknown mode `{other}`"))),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub mode: RunMode,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8080`
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Text-generation settings. Sampling values are fixed per deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Literal API key. Takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub organization: Option<String>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    800
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            organization: None,
        }
    }
}

impl GenerationConfig {
    /// Resolve the API key from the literal value or the named variable.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(ConfigError::Invalid(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite file path (`~/` is expanded)
    #[serde(default = "default_store_path")]
    pub path: String,

    #[serde(default = "default_diagnosis_collection")]
    pub diagnosis_collection: String,

    #[serde(default = "default_detail_collection")]
    pub detail_collection: String,
}

fn default_store_path() -> String {
    dirs::data_dir()
        .map(|d| {
            d.join("snsdiag")
                .join("documents.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "snsdiag-documents.db".to_string())
}

fn default_diagnosis_collection() -> String {
    "snsDiagnosisLogs".to_string()
}

fn default_detail_collection() -> String {
    "snsDetailedRequests".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            diagnosis_collection: default_diagnosis_collection(),
            detail_collection: default_detail_collection(),
        }
    }
}

impl StoreConfig {
    /// Store path with a leading `~/` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(stripped) = self.path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(&self.path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// One diagnosis per IP within this many minutes
    #[serde(default = "default_ip_window_minutes")]
    pub ip_window_minutes: u32,
}

fn default_ip_window_minutes() -> u32 {
    60
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            ip_window_minutes: default_ip_window_minutes(),
        }
    }
}

impl LimitsConfig {
    pub fn ip_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.ip_window_minutes))
    }
}

impl ServiceConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "SNSDIAG_CONFIG";

    pub const ENV_MODE: &'static str = "SNSDIAG_MODE";

    pub const ENV_LISTEN: &'static str = "SNSDIAG_LISTEN";

    pub const DEFAULT_CONFIG_FILENAME: &'static str = "config.toml";

    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `SNSDIAG_CONFIG`, then the
    /// per-user default file, falling back to defaults if neither exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = Self::resolve_config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let cfg: ServiceConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .map(|d| d.join("snsdiag").join(Self::DEFAULT_CONFIG_FILENAME))
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Apply `SNSDIAG_MODE` / `SNSDIAG_LISTEN` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(Self::ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(listen) = lookup(Self::ENV_LISTEN).filter(|l| !l.is_empty()) {
            self.server.listen = listen;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.ip_window_minutes == 0 {
            return Err(ConfigError::Invalid(
                "limits.ip_window_minutes must be at least 1".into(),
            ));
        }
        if !self.generation.temperature.is_finite() || self.generation.temperature < 0.0 {
            return Err(ConfigError::Invalid(
                "generation.temperature must be a non-negative number".into(),
            ));
        }
        if self.generation.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_tokens must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "store.path is required for the sqlite backend".into(),
            ));
        }
        if self.store.diagnosis_collection == self.store.detail_collection {
            tracing::warn!(
                collection = %self.store.diagnosis_collection,
                "diagnosis and detail requests share one collection"
            );
        }
        Ok(())
    }
}
