//! Error types for retina-types crate.

use thiserror::Error;

/// Errors raised while building or validating domain types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    /// Probability vector has the wrong number of entries.
    #[error("expected {expected} class probabilities, got {actual}")]
    ProbabilityCount {
        /// Expected number of classes.
        expected: usize,
        /// Number of entries received.
        actual: usize,
    },

    /// A probability is negative or not finite.
    #[error("invalid probability {value} at index {index}")]
    InvalidProbability {
        /// Position in the vector.
        index: usize,
        /// The offending value.
        value: f32,
    },

    /// Class index outside the grade range.
    #[error("invalid class index {index}: expected < {max}")]
    InvalidClassIndex {
        /// The invalid index.
        index: usize,
        /// Number of valid classes.
        max: usize,
    },

    /// Unknown grade label.
    #[error("unknown grade label: {0}")]
    UnknownLabel(String),
}

impl TypesError {
    /// Creates a probability count error.
    #[must_use]
    pub const fn probability_count(expected: usize, actual: usize) -> Self {
        Self::ProbabilityCount { expected, actual }
    }

    /// Creates an invalid probability error.
    #[must_use]
    pub const fn invalid_probability(index: usize, value: f32) -> Self {
        Self::InvalidProbability { index, value }
    }

    /// Creates an invalid class index error.
    #[must_use]
    pub const fn invalid_class_index(index: usize, max: usize) -> Self {
        Self::InvalidClassIndex { index, max }
    }
}

/// Result type for retina-types operations.
pub type Result<T> = std::result::Result<T, TypesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_probability_count() {
        let err = TypesError::probability_count(5, 3);
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn error_invalid_probability() {
        let err = TypesError::invalid_probability(2, -0.5);
        assert!(err.to_string().contains("-0.5"));
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn error_unknown_label() {
        let err = TypesError::UnknownLabel("Extreme".to_string());
        assert!(err.to_string().contains("Extreme"));
    }
}
