//! Import configuration.
//!
//! Values come from three layers: built-in defaults, an optional TOML file,
//! and command-line overrides applied by the binary.

use crate::error::{ImportError, ImportResult};
use crate::store::firestore::{DEFAULT_DATABASE, DEFAULT_ENDPOINT, MAX_WRITES_PER_COMMIT};
use crate::store::FirestoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: default_log_level(),
        }
    }
}

/// Everything one import run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Service account key file
    pub credentials_path: PathBuf,
    /// JSON file holding the records
    pub data_path: PathBuf,
    /// Target collection
    pub collection: String,
    /// Top-level JSON key holding the record array; defaults to `collection`
    pub root_key: Option<String>,
    /// Record field used as the document id
    pub id_field: String,
    /// Maximum writes per commit
    pub batch_limit: usize,
    /// How many commits may be in flight at once
    pub max_concurrent_commits: usize,
    /// Overrides the project named in the key file
    pub project_id: Option<String>,
    pub database: String,
    pub endpoint: String,
    pub request_timeout_secs: u64,
    /// Stage and commit against an in-memory store instead of the remote one
    pub dry_run: bool,
    pub logging: LoggingConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("./service-account.json"),
            data_path: PathBuf::from("./users.json"),
            collection: "users".to_string(),
            root_key: None,
            id_field: "sid".to_string(),
            batch_limit: MAX_WRITES_PER_COMMIT,
            max_concurrent_commits: 1,
            project_id: None,
            database: DEFAULT_DATABASE.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 60,
            dry_run: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl ImportConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> ImportResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ImportError::InvalidConfig(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        let config: ImportConfig = toml::from_str(&content).map_err(|e| {
            ImportError::InvalidConfig(format!(
                "failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The JSON key holding the record array.
    pub fn root_key(&self) -> &str {
        self.root_key.as_deref().unwrap_or(&self.collection)
    }

    pub fn firestore_options(&self) -> FirestoreOptions {
        FirestoreOptions {
            endpoint: self.endpoint.clone(),
            project_id: self.project_id.clone(),
            database: self.database.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Validate all fields, reporting every problem at once.
    pub fn validate(&self) -> ImportResult<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.collection.trim().is_empty() {
            errors.push("collection must not be empty".to_string());
        }
        if self.collection.contains('/') {
            errors.push("collection must not contain '/'".to_string());
        }
        if self.root_key().is_empty() {
            errors.push("root_key must not be empty".to_string());
        }
        if self.id_field.is_empty() {
            errors.push("id_field must not be empty".to_string());
        }
        if self.batch_limit == 0 {
            errors.push("batch_limit must be positive".to_string());
        }
        if self.batch_limit > MAX_WRITES_PER_COMMIT {
            errors.push(format!("batch_limit must be <= {MAX_WRITES_PER_COMMIT}"));
        }
        if self.max_concurrent_commits == 0 {
            errors.push("max_concurrent_commits must be positive".to_string());
        }
        if self.database.trim().is_empty() {
            errors.push("database must not be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ImportError::InvalidConfig(errors.join("; ")))
        }
    }
}
