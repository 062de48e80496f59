use std::path::PathBuf;

use thiserror::Error;

/// Outcome of a session operation that did not apply. The session state is
/// left as it was, except that a rejected drop still ends the drag.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("{name} was rejected: expected {expected}, got {found}")]
    RejectedMimeType {
        name: String,
        found: String,
        expected: String,
    },
    #[error("page {requested} is outside 1..={total}")]
    PageOutOfRange { requested: usize, total: usize },
    #[error("no document loaded")]
    NoDocument,
    #[error("{0} text must not be empty")]
    EmptyText(&'static str),
    #[error("document is not encrypted")]
    NotEncrypted,
    #[error("failed to decrypt document: {0}")]
    DecryptFailed(String),
    #[error("failed to analyze {name}: {reason}")]
    AnalysisFailed { name: String, reason: String },
    #[error("fullscreen request failed: {0}")]
    Fullscreen(String),
    #[error("failed to export to {path:?}: {reason}")]
    ExportFailed { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
