//! Configuration loading and validation for deepseek-proxy.
//!
//! Settings are resolved once at startup in three layers, lowest first:
//! built-in defaults, an optional TOML file, then `DEEPSEEK_*` environment
//! variables (a `.env` file is loaded into the environment beforehand).
//! The result is immutable and shared as `Arc<Config>`.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Environment variable holding the DeepSeek API key.
pub const ENV_API_KEY: &str = "DEEPSEEK_API_KEY";
/// Environment variable overriding the upstream base URL.
pub const ENV_BASE_URL: &str = "DEEPSEEK_API_BASE_URL";
/// Environment variable overriding the default model.
pub const ENV_MODEL: &str = "DEEPSEEK_MODEL";
/// Config file read by [`Config::load`] when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub deepseek: DeepSeekConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Public API surface settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Versioned prefix all chat routes are nested under
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Human-readable service name reported by `GET /`
    #[serde(default = "default_project_name")]
    pub project_name: String,
}

fn default_prefix() -> String {
    "/api/v1".to_string()
}

fn default_project_name() -> String {
    "DeepSeek Chat API".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            project_name: default_project_name(),
        }
    }
}

/// Cross-origin policy.
///
/// The default `["*"]` is an open policy: any origin, method and header.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_origins(),
        }
    }
}

impl CorsConfig {
    /// True when the wildcard origin is configured.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Upstream provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeepSeekConfig {
    /// Bearer token; absent means completion calls fail with a configuration error
    #[serde(default)]
    pub api_key: Option<ApiKey>,
    /// Base URL without the `/v1/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used when a request does not name one
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-v3".to_string()
}

impl Default for DeepSeekConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
        }
    }
}

impl DeepSeekConfig {
    /// Full URL of the chat completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// Only accessible via `.expose_secret()`, so every use is grep-auditable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' could not be expanded: {message}")]
    EnvVar { var: String, message: String },
}

impl Config {
    /// Load configuration from a TOML file, without environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the process configuration.
    ///
    /// Loads `.env` into the environment (missing file is fine), then reads
    /// the TOML file and applies `DEEPSEEK_*` overrides from the real
    /// environment. An explicit `path` must exist. Without one,
    /// [`DEFAULT_CONFIG_PATH`] is read when present and defaults are used
    /// otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(env_path) = dotenvy::dotenv() {
            tracing::debug!(path = %env_path.display(), "Loaded .env file");
        }

        let config = match path {
            Some(path) => {
                tracing::info!(config = %path.display(), "Loading configuration file");
                Self::from_file(path)?
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    tracing::info!(config = %default_path.display(), "Loading configuration file");
                    Self::from_file(default_path)?
                } else {
                    tracing::info!(
                        config = %default_path.display(),
                        "Configuration file not found, using defaults"
                    );
                    Self::default()
                }
            }
        };

        let config = config.with_env_overrides_from(|name| std::env::var(name).ok())?;
        if !config.api_key_configured() {
            tracing::warn!(
                "No DeepSeek API key configured - completion requests will be rejected"
            );
        }
        Ok(config)
    }

    /// Whether a DeepSeek API key is present.
    pub fn api_key_configured(&self) -> bool {
        self.deepseek.api_key.is_some()
    }

    /// Apply `${VAR}` expansion and `DEEPSEEK_*` overrides using a custom lookup.
    ///
    /// The closure-based design keeps this testable without touching global
    /// env state. Empty override values are treated as unset.
    pub fn with_env_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = self.deepseek.api_key.take() {
            let raw = key.expose_secret();
            let expanded = if raw.contains("${") {
                expand_env_vars_with(raw, &lookup)?
            } else {
                raw.to_string()
            };
            if !expanded.is_empty() {
                self.deepseek.api_key = Some(ApiKey::from(expanded));
            }
        }

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.deepseek.api_key = Some(ApiKey::from(key));
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.deepseek.base_url = url;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.deepseek.model = model;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.deepseek.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "deepseek.base_url must not be empty".to_string(),
            ));
        }
        if self.deepseek.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "deepseek.model must not be empty".to_string(),
            ));
        }
        if !self.api.prefix.starts_with('/') || self.api.prefix.len() < 2 {
            return Err(ConfigError::Validation(format!(
                "api.prefix must start with '/' and be non-root, got '{}'",
                self.api.prefix
            )));
        }
        if self.api.prefix.ends_with('/') {
            return Err(ConfigError::Validation(format!(
                "api.prefix must not end with '/', got '{}'",
                self.api.prefix
            )));
        }

        Ok(())
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple references in one string. Fails on the first missing
/// variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            message: "Unclosed '${' in config value".to_string(),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            message: "variable is not set".to_string(),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
