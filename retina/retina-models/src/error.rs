//! Error types for retina-models crate.

use thiserror::Error;

/// Errors that can occur while building or loading models.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Failed to load checkpoint.
    #[error("failed to load checkpoint from {path}: {reason}")]
    LoadCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to save checkpoint.
    #[error("failed to save checkpoint to {path}: {reason}")]
    SaveCheckpoint {
        /// Path to the checkpoint file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid model configuration.
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    /// Checkpoint file not found.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Unsupported checkpoint format.
    #[error("unsupported checkpoint format: {0}")]
    UnsupportedFormat(String),

    /// Requested backend is not compiled in.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl ModelError {
    /// Creates a load checkpoint error.
    #[must_use]
    pub fn load_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a save checkpoint error.
    #[must_use]
    pub fn save_checkpoint(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SaveCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid config error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates a checkpoint not found error.
    #[must_use]
    pub fn checkpoint_not_found(path: impl Into<String>) -> Self {
        Self::CheckpointNotFound(path.into())
    }

    /// Creates an unsupported format error.
    #[must_use]
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Creates a backend unavailable error.
    #[must_use]
    pub fn backend_unavailable(name: impl Into<String>) -> Self {
        Self::BackendUnavailable(name.into())
    }
}

/// Result type for retina-models operations.
pub type Result<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_load_checkpoint() {
        let err = ModelError::load_checkpoint("best_model.pth", "missing key gat1.att");
        assert!(err.to_string().contains("best_model.pth"));
        assert!(err.to_string().contains("gat1.att"));
    }

    #[test]
    fn error_save_checkpoint() {
        let err = ModelError::save_checkpoint("out.bin", "disk full");
        assert!(err.to_string().contains("out.bin"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn error_invalid_config() {
        let err = ModelError::invalid_config("num_heads must be > 0");
        assert!(err.to_string().contains("num_heads must be > 0"));
    }

    #[test]
    fn error_checkpoint_not_found() {
        let err = ModelError::checkpoint_not_found("/weights/missing.pth");
        assert!(err.to_string().contains("/weights/missing.pth"));
    }

    #[test]
    fn error_unsupported_format() {
        let err = ModelError::unsupported_format("model.onnx");
        assert!(err.to_string().contains("model.onnx"));
    }

    #[test]
    fn error_backend_unavailable() {
        let err = ModelError::backend_unavailable("wgpu");
        assert!(err.to_string().contains("wgpu"));
    }
}
