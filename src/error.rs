//! Error types for notspam.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl Error {
    /// Whether this error was raised while validating the invocation,
    /// before any store session or engine process existed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Registry(_))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Message store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid search terms: {0}")]
    InvalidQuery(String),

    #[error("Cannot {operation}: store session is read-only")]
    ReadOnly { operation: String },

    #[error("Store is locked by another writer ({path})")]
    Locked { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by classification engines.
///
/// `Training` and `Classification` are the recoverable, per-message kinds:
/// the engine looked at the message and rejected it. Every other variant
/// aborts the batch.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Training(String),

    #[error("{0}")]
    Classification(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read message file {}: {source}", .path.display())]
    Payload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {status}")]
    Exited { program: String, status: String },
}

/// Engine registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown classifier '{name}' (available: {available})")]
    NotFound { name: String, available: String },

    #[error("Classifier '{name}' is already registered")]
    Duplicate { name: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_flagged() {
        let err: Error = ConfigError::MissingRequired {
            key: "search terms".into(),
            hint: "Pass at least one term.".into(),
        }
        .into();
        assert!(err.is_configuration());

        let err: Error = RegistryError::NotFound {
            name: "nope".into(),
            available: "null".into(),
        }
        .into();
        assert!(err.is_configuration());

        let err: Error = StoreError::Query("boom".into()).into();
        assert!(!err.is_configuration());
    }

    #[test]
    fn recoverable_engine_errors_display_reason_only() {
        let err = EngineError::Classification("unparseable output".into());
        assert_eq!(err.to_string(), "unparseable output");
    }

    #[test]
    fn payload_error_names_path() {
        let err = EngineError::Payload {
            path: PathBuf::from("/mail/cur/1"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/mail/cur/1"));
    }
}
