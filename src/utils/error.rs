//! Error Handling Module
//!
//! Defines the error taxonomy for the diagnosis pipeline.
//! Uses thiserror for ergonomic error definitions.
//!
//! There is no blur variant: a blurry photo is a normal pipeline
//! outcome (see [`crate::diagnosis::DiagnosisOutcome`]), not a failure.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for diagnosis operations
#[derive(Error, Debug)]
pub enum DiagnosisError {
    /// Malformed or unsupported image bytes
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The decoded image does not have the expected number of color channels
    #[error("Expected {expected} color channels after alpha removal, got {found}")]
    ChannelMismatch { expected: usize, found: usize },

    /// Species key absent from the taxonomy
    #[error("Unknown species key: {0}")]
    UnknownSpecies(String),

    /// No class index is allowed for the requested species
    #[error("No valid class indices available for species: {0}")]
    EmptyValidSet(String),

    /// The taxonomy disagrees with itself or with the model output space
    #[error("Taxonomy inconsistency: {0}")]
    TaxonomyInconsistency(String),

    /// Model execution failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// The classifier model could not be loaded
    #[error("Failed to load model at '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Who is responsible for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Bad input from the caller; surfaced verbatim
    UserError,
    /// Configuration, data or runtime fault on our side
    SystemFault,
}

impl DiagnosisError {
    /// Classify the error for logging and for the caller-facing boundary
    pub fn kind(&self) -> FaultKind {
        match self {
            DiagnosisError::Decode(_)
            | DiagnosisError::ChannelMismatch { .. }
            | DiagnosisError::UnknownSpecies(_) => FaultKind::UserError,
            DiagnosisError::EmptyValidSet(_)
            | DiagnosisError::TaxonomyInconsistency(_)
            | DiagnosisError::Inference(_)
            | DiagnosisError::ModelLoad { .. }
            | DiagnosisError::Config(_)
            | DiagnosisError::Io(_) => FaultKind::SystemFault,
        }
    }

    /// Whether this is a caller-correctable error
    pub fn is_user_error(&self) -> bool {
        self.kind() == FaultKind::UserError
    }

    /// Emit the error through tracing at the level matching its fault kind
    pub fn log(&self) {
        match self.kind() {
            FaultKind::UserError => tracing::warn!(error = %self, "request rejected"),
            FaultKind::SystemFault => tracing::error!(error = %self, "system fault"),
        }
    }
}

impl From<image::ImageError> for DiagnosisError {
    fn from(err: image::ImageError) -> Self {
        DiagnosisError::Decode(err.to_string())
    }
}

/// Convenience Result type for diagnosis operations
pub type Result<T> = std::result::Result<T, DiagnosisError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| DiagnosisError::Config(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| DiagnosisError::Config(format!("{}: {}", f(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiagnosisError::UnknownSpecies("Banana".to_string());
        assert_eq!(format!("{}", err), "Unknown species key: Banana");

        let err = DiagnosisError::ChannelMismatch {
            expected: 3,
            found: 1,
        };
        assert!(err.to_string().contains("got 1"));
    }

    #[test]
    fn test_fault_kinds() {
        assert!(DiagnosisError::Decode("bad".into()).is_user_error());
        assert!(DiagnosisError::UnknownSpecies("x".into()).is_user_error());
        assert_eq!(
            DiagnosisError::EmptyValidSet("Apple".into()).kind(),
            FaultKind::SystemFault
        );
        assert_eq!(
            DiagnosisError::TaxonomyInconsistency("dup".into()).kind(),
            FaultKind::SystemFault
        );
        assert_eq!(
            DiagnosisError::Inference("shape".into()).kind(),
            FaultKind::SystemFault
        );
    }

    #[test]
    fn test_model_load_error() {
        let err = DiagnosisError::ModelLoad {
            path: PathBuf::from("/models/plant.mpk"),
            reason: "file not found".to_string(),
        };
        assert!(format!("{}", err).contains("plant.mpk"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read manifest");
        match with_context {
            Err(DiagnosisError::Config(msg)) => {
                assert_eq!(msg, "Failed to read manifest: file not found")
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
