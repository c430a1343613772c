//! qgate Configuration Management
//!
//! Handles configuration from environment variables and TOML config
//! files with sensible defaults for development.

use crate::evaluator::InstanceScopePolicy;
use crate::key::{ApiKeyRecord, CollectionScope, KeyPolicy, Permissions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Label of the record created from `QGATE_ADMIN_KEY`
pub const ADMIN_KEY_NAME: &str = "admin";
/// Label of the record created from `QGATE_READ_ONLY_KEY`
pub const READ_ONLY_KEY_NAME: &str = "read-only";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Upstream vector database
    pub upstream: UpstreamConfig,

    /// API keys and authorization policy
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load the file if one is given, then apply environment overrides
    pub fn load(path: Option<impl Into<PathBuf>>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_override()
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = var("QGATE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("QGATE_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "QGATE_PORT".to_string(),
                value: port,
            })?;
        }

        // Upstream
        if let Some(url) = var("QGATE_UPSTREAM_URL") {
            self.upstream.url = url;
        }
        if let Some(key) = var("QGATE_UPSTREAM_API_KEY") {
            self.upstream.api_key = Some(key);
        }

        // Authorization
        if let Some(policy) = var("QGATE_INSTANCE_SCOPE") {
            self.auth.instance_scope = policy.parse().map_err(|value| ConfigError::InvalidValue {
                key: "QGATE_INSTANCE_SCOPE".to_string(),
                value,
            })?;
        }
        if let Some(key) = var("QGATE_ADMIN_KEY") {
            self.auth.keys.insert(
                ADMIN_KEY_NAME.to_string(),
                KeyConfig::new(key, Permissions::ADMIN),
            );
        }
        if let Some(key) = var("QGATE_READ_ONLY_KEY") {
            self.auth.keys.insert(
                READ_ONLY_KEY_NAME.to_string(),
                KeyConfig::new(key, Permissions::READ_ONLY),
            );
        }

        // Logging
        if let Some(level) = var("QGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = var("QGATE_LOG_JSON") {
            self.logging.json_format = parse_bool("QGATE_LOG_JSON", &json)?;
        }

        Ok(self)
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("upstream.url".to_string()));
        }
        if self.auth.keys.is_empty() {
            return Err(ConfigError::MissingRequired(
                "at least one [auth.keys.<name>] table or QGATE_ADMIN_KEY".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Upstream request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6335,
            request_timeout_secs: 60,
            max_body_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

/// Upstream vector database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Qdrant REST URL
    pub url: String,

    /// Key sent to the upstream instead of the caller's key
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
        }
    }
}

/// Authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Treatment of instance-level operations for collection-scoped keys
    pub instance_scope: InstanceScopePolicy,

    /// Configured keys, by label
    pub keys: BTreeMap<String, KeyConfig>,
}

/// One `[auth.keys.<name>]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyConfig {
    /// The secret key string
    #[serde(skip_serializing)]
    pub key: String,

    #[serde(default)]
    pub read: bool,

    #[serde(default)]
    pub write: bool,

    /// Allowed collections; absent or empty means all
    #[serde(default)]
    pub collections: Option<Vec<String>>,
}

impl KeyConfig {
    pub fn new(key: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            key: key.into(),
            read: permissions.read,
            write: permissions.write,
            collections: None,
        }
    }

    /// Convert into a typed record labelled `name`
    pub fn to_record(&self, name: &str) -> ApiKeyRecord {
        let policy = KeyPolicy::new(
            Permissions::new(self.read, self.write),
            CollectionScope::from_list(self.collections.clone()),
        )
        .with_name(name);

        ApiKeyRecord::new(self.key.clone(), policy)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
