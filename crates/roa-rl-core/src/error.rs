//! Error types for the ROA-RL core library

use thiserror::Error;

/// Core error type for policy iteration and rollout operations
#[derive(Error, Debug)]
pub enum RoaError {
    /// Malformed grid bounds or point counts
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Parameter collections or batches with inconsistent dimensions
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape description
        expected: String,
        /// Actual shape description
        actual: String,
    },

    /// Dynamics, reward or objective diverged to non-finite values
    #[error("Numeric overflow: {0}")]
    NumericOverflow(String),

    /// Non-positive horizon, tolerance, iteration count or learning rate
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// ndarray shape error
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoaError {
    /// Build a shape mismatch from any two debug-printable shapes
    pub fn shape_mismatch(expected: impl std::fmt::Debug, actual: impl std::fmt::Debug) -> Self {
        Self::ShapeMismatch {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

/// Result type alias for ROA-RL operations
pub type Result<T> = std::result::Result<T, RoaError>;

/// Fail with [`RoaError::ShapeMismatch`] unless a batch has the expected column count
pub fn ensure_columns<S, D>(batch: &ndarray::ArrayBase<S, D>, expected: usize, what: &str) -> Result<()>
where
    S: ndarray::Data,
    D: ndarray::Dimension,
{
    let shape = batch.shape();
    if shape.len() != 2 || shape[1] != expected {
        return Err(RoaError::ShapeMismatch {
            expected: format!("{what} batch with {expected} columns"),
            actual: format!("{shape:?}"),
        });
    }
    Ok(())
}
