use std::path::PathBuf;
use thiserror::Error;

pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid service account credentials in {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },
    #[error("authentication with the document store failed: {0}")]
    Auth(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "JSON is not in the expected format: it must contain a top-level array with the key \"{0}\""
    )]
    MissingCollection(String),
    #[error("JSON key \"{key}\" must hold an array, found {found}")]
    NotAnArray { key: String, found: &'static str },
    #[error("item {index} is not a JSON object (found {found})")]
    NotAnObject { index: usize, found: &'static str },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("batch commit failed: {0}")]
    Commit(String),
}
