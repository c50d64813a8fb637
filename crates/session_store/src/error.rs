use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record for key '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("persisted data under key '{key}' is malformed: {source}")]
    MalformedPersistedData {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid storage key '{key}': only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidKey { key: String },
}

impl SessionStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn serialize(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialize {
            key: key.into(),
            source,
        }
    }

    #[must_use]
    pub fn malformed(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::MalformedPersistedData {
            key: key.into(),
            source,
        }
    }

    /// True when the stored bytes exist but cannot be decoded.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPersistedData { .. })
    }
}
