//! Error Handling Module
//!
//! Defines the error type shared by every MixMatch / ReMixMatch component.
//! Uses thiserror for ergonomic error definitions.
//!
//! Three families matter to callers:
//! - configuration errors, raised eagerly and naming the offending parameter
//! - shape errors, raised where the mismatching tensors meet
//! - numerical divergence, raised for the step that produced a non-finite loss

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for semi-supervised training
#[derive(Error, Debug)]
pub enum SslError {
    /// Invalid or incompatible configuration
    #[error("Configuration error: `{param}` {reason}")]
    Config { param: String, reason: String },

    /// Two operands disagree on a dimension
    #[error("Shape mismatch in {what}: got {got}, expected {expected}")]
    ShapeMismatch {
        what: String,
        got: usize,
        expected: usize,
    },

    /// A running distribution was queried before anything was added
    #[error("Empty window: no {0} distribution recorded yet")]
    EmptyWindow(String),

    /// The loss became NaN or infinite
    #[error("Non-finite loss at step {step}: {value}")]
    NonFiniteLoss { step: usize, value: f64 },

    /// A metric sink refused a value
    #[error("Recorder error: {0}")]
    Recorder(String),

    /// Saving or loading a model failed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Dataset or loader misuse
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl SslError {
    /// Build a configuration error for `param`
    pub fn config(param: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            param: param.into(),
            reason: reason.into(),
        }
    }

    /// Build a shape error
    pub fn shape(what: impl Into<String>, got: usize, expected: usize) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            got,
            expected,
        }
    }

    /// Whether this error comes from a diverging loss
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::NonFiniteLoss { .. })
    }
}

impl From<serde_json::Error> for SslError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type for semi-supervised training
pub type Result<T> = std::result::Result<T, SslError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_parameter() {
        let err = SslError::config("temperature", "must be > 0, got 0");
        let msg = format!("{}", err);
        assert!(msg.contains("temperature"));
        assert!(msg.contains("must be > 0"));
    }

    #[test]
    fn test_shape_error_display() {
        let err = SslError::shape("mixup batch", 3, 4);
        assert_eq!(
            format!("{}", err),
            "Shape mismatch in mixup batch: got 3, expected 4"
        );
    }

    #[test]
    fn test_divergence_detection() {
        let err = SslError::NonFiniteLoss {
            step: 7,
            value: f64::NAN,
        };
        assert!(err.is_divergence());
        assert!(!SslError::Recorder("x".into()).is_divergence());
    }
}
