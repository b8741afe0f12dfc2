//! Error types for retina-inference crate.

use retina_models::ModelError;
use retina_types::TypesError;
use thiserror::Error;

/// Errors that can occur while preparing an image or running the model.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The upload contained no bytes.
    #[error("empty image upload")]
    EmptyInput,

    /// The bytes could not be decoded as an image.
    #[error("invalid image: {reason}")]
    InvalidImage {
        /// Decoder message.
        reason: String,
    },

    /// Model construction or weight loading failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The model produced an unusable distribution.
    #[error("invalid model output: {0}")]
    Output(#[from] TypesError),

    /// Tensor data could not be read back from the device.
    #[error("tensor readback failed: {0}")]
    Readback(String),

    /// The shared model lock was poisoned by a panicking request.
    #[error("model unavailable: {0}")]
    Unavailable(String),
}

impl InferenceError {
    /// Creates an invalid image error.
    #[must_use]
    pub fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    /// Creates a readback error.
    #[must_use]
    pub fn readback(reason: impl Into<String>) -> Self {
        Self::Readback(reason.into())
    }

    /// Creates a model unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Returns `true` if the failure was caused by the uploaded bytes.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::InvalidImage { .. })
    }
}

/// Result type for retina-inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_empty_input() {
        assert_eq!(InferenceError::EmptyInput.to_string(), "empty image upload");
        assert!(InferenceError::EmptyInput.is_client_error());
    }

    #[test]
    fn error_invalid_image() {
        let err = InferenceError::invalid_image("unsupported image format");
        assert!(err.to_string().contains("unsupported image format"));
        assert!(err.is_client_error());
    }

    #[test]
    fn error_from_model_error_is_transparent() {
        let err: InferenceError = ModelError::checkpoint_not_found("best_model.pth").into();
        assert_eq!(err.to_string(), "checkpoint not found: best_model.pth");
        assert!(!err.is_client_error());
    }

    #[test]
    fn error_from_types_error() {
        let err: InferenceError = TypesError::probability_count(5, 3).into();
        assert!(err.to_string().starts_with("invalid model output"));
    }

    #[test]
    fn error_readback_and_unavailable() {
        assert!(InferenceError::readback("dtype").to_string().contains("dtype"));
        assert!(InferenceError::unavailable("poisoned").to_string().contains("poisoned"));
    }
}
