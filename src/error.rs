//! Error types for the annotation pipeline.
//!
//! All errors are strongly typed using thiserror, one enum per layer,
//! so callers can match on the exact failure and decide whether the
//! refresh cycle is worth retrying on the next trigger.

use thiserror::Error;

use crate::lookup::LookupError;
use crate::storage::StorageError;

/// Configuration errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    Io {
        path: String,
        message: String,
    },

    #[error("Failed to parse config: {message}")]
    Parse {
        message: String,
    },

    #[error("Config field '{field}' must be at least {min} (got {actual})")]
    BelowMinimum {
        field: String,
        min: u64,
        actual: u64,
    },
}

/// Errors raised by the refresh worker pool.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Refresh queue is full (capacity: {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Refresh worker disconnected")]
    Disconnected,

    #[error("Refresh cycle timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for the crate.
///
/// Any variant surfacing from a refresh cycle means the whole cycle failed:
/// nothing from it was committed and the history store was not touched.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AnnotationError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a lookup provider error.
    #[must_use]
    pub const fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the next refresh trigger may succeed where this one failed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Lookup(e) => matches!(
                e,
                LookupError::Failed { .. } | LookupError::Interrupted { .. }
            ),
            Self::Storage(e) => matches!(e, StorageError::Backend(_) | StorageError::Io(_)),
            Self::Execution(e) => !matches!(e, ExecutionError::Disconnected),
            Self::Config(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for annotation operations.
pub type AnnotationResult<T> = Result<T, AnnotationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_below_minimum() {
        let err = ConfigError::BelowMinimum {
            field: "history.max_rows".to_string(),
            min: 1,
            actual: 0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("history.max_rows"));
        assert!(msg.contains("got 0"));
    }

    #[test]
    fn test_execution_error_timeout() {
        let err = ExecutionError::Timeout { duration_ms: 5000 };
        let msg = format!("{err}");
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_annotation_error_from_lookup() {
        let err: AnnotationError = LookupError::Interrupted {
            source_name: "DirectoryLookup".to_string(),
        }
        .into();
        assert!(err.is_lookup());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_annotation_error_from_storage() {
        let err: AnnotationError = StorageError::Backend("disk full".to_string()).into();
        assert!(err.is_storage());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_annotation_error_internal() {
        let err = AnnotationError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }

    #[test]
    fn test_annotation_error_retryable() {
        let missing: AnnotationError = LookupError::MissingResult {
            source_name: "EmergencyLookup".to_string(),
            number: "xxxxxxxx01".to_string(),
        }
        .into();
        assert!(!missing.is_retryable());

        let full: AnnotationError = ExecutionError::QueueFull { capacity: 4 }.into();
        assert!(full.is_retryable());

        let gone: AnnotationError = ExecutionError::Disconnected.into();
        assert!(!gone.is_retryable());
    }
}
