//! Error types for the NVR recorder.
//!
//! Two families live here: [`Error`] for framework-level failures that are
//! propagated with `?`, and [`CaptureError`] for failures scoped to a single
//! capture source. Capture errors are almost always logged and retried by
//! the supervisor rather than returned to the caller.

use crate::types::SourceId;
use thiserror::Error;

/// Result type alias for NVR operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for NVR operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A capture source was not found.
    #[error("Source not found: {source_id}")]
    SourceNotFound { source_id: SourceId },

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a source not found error.
    pub fn source_not_found(source_id: SourceId) -> Self {
        Self::SourceNotFound { source_id }
    }
}

// ==============================================================================
// Capture Errors
// ==============================================================================

/// Failures scoped to one capture source and its subprocess.
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("Capture spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Capture stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Capture output error: {id} - {reason}")]
    OutputError { id: String, reason: String },

    #[error("Capture state error: {id} - expected {expected}, got {actual}")]
    InvalidState {
        id: String,
        expected: String,
        actual: String,
    },
}

impl CaptureError {
    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn output_error(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutputError {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type for capture operations.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        fn open_missing() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/nonexistent/nvr/segment.mp4")?)
        }

        let err = open_missing().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }

    #[test]
    fn test_source_not_found() {
        let err = Error::source_not_found(SourceId::from("cam1"));

        match err {
            Error::SourceNotFound { source_id } => {
                assert_eq!(source_id.as_str(), "cam1");
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_capture_error_construction() {
        let error = CaptureError::spawn_failed("front-door", "No such file or directory");
        assert!(matches!(error, CaptureError::SpawnFailed { .. }));
        assert!(format!("{}", error).contains("spawn failed"));

        let error = CaptureError::output_error("garage", "disk full");
        assert_eq!(format!("{}", error), "Capture output error: garage - disk full");
    }
}
