//! Error types for preference operations.
//!
//! Two layers:
//! - [`PreferencesError`]: returned from fallible calls (`put_*`, saves, config).
//! - [`ErrorStatus`]: the sticky "last error" facility that background work
//!   (loads and saves nobody is awaiting) reports into.

use parking_lot::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use tracing::error;

/// Errors that can occur during preference operations.
#[derive(Debug, Error)]
pub enum PreferencesError {
    /// Key is empty or contains characters the storage format cannot hold.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// Value cannot be represented on a single line of the storage format.
    #[error("invalid value for {key:?}: {reason}")]
    InvalidValue { key: String, reason: &'static str },

    /// Storage backend failed for a reason other than I/O.
    #[error("storage error: {0}")]
    Storage(String),

    /// The background writer has shut down and can no longer accept saves.
    #[error("save worker stopped")]
    WorkerStopped,

    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for preference operations.
pub type Result<T> = std::result::Result<T, PreferencesError>;

impl PreferencesError {
    pub(crate) fn invalid_key(key: &str, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason,
        }
    }

    pub(crate) fn invalid_value(key: &str, reason: &'static str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason,
        }
    }

    /// Returns true if the failure came from the storage medium.
    pub fn is_storage(&self) -> bool {
        matches!(self, PreferencesError::Io(_) | PreferencesError::Storage(_))
    }
}

/// A failure recorded by [`ErrorStatus`].
#[derive(Debug, Clone)]
pub struct ReportedError {
    /// What was being attempted ("load", "save", ...).
    pub context: &'static str,
    /// Rendered error message.
    pub message: String,
    /// When the failure was reported.
    pub at: SystemTime,
}

/// Sticky error slot shared by the store and its background workers.
///
/// Reporting never fails and never panics; the most recent report wins.
#[derive(Debug, Default)]
pub struct ErrorStatus {
    last: Mutex<Option<ReportedError>>,
}

impl ErrorStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a failure.
    pub fn report(&self, context: &'static str, err: &PreferencesError) {
        error!(context, error = %err, "preferences failure");
        *self.last.lock() = Some(ReportedError {
            context,
            message: err.to_string(),
            at: SystemTime::now(),
        });
    }

    /// The most recently reported failure, if any.
    pub fn last(&self) -> Option<ReportedError> {
        self.last.lock().clone()
    }

    /// Forget the recorded failure.
    pub fn clear(&self) {
        self.last.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PreferencesError::invalid_key("bad key", "contains whitespace");
        assert!(err.to_string().contains("invalid key"));
        assert!(err.to_string().contains("bad key"));
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn test_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert!(PreferencesError::from(io).is_storage());
        assert!(PreferencesError::Storage("full".to_string()).is_storage());
        assert!(!PreferencesError::WorkerStopped.is_storage());
        assert!(!PreferencesError::invalid_value("k", "newline").is_storage());
    }

    #[test]
    fn test_status_keeps_latest_report() {
        let status = ErrorStatus::new();
        assert!(status.last().is_none());

        status.report("load", &PreferencesError::Storage("first".to_string()));
        status.report("save", &PreferencesError::Storage("second".to_string()));

        let last = status.last().unwrap();
        assert_eq!(last.context, "save");
        assert!(last.message.contains("second"));

        status.clear();
        assert!(status.last().is_none());
    }
}
