// src/error.rs

use thiserror::Error;

/// Errors produced by attribution, PCA fitting and SHAP explanation.
#[derive(Error, Debug)]
pub enum ExplainError {
    /// A component (or sample) index does not exist.
    #[error("Index {index} is out of range for {len} entries.")]
    IndexOutOfRange { index: usize, len: usize },

    /// Two inputs that must agree in size do not.
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}.")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A label that is not of the form `PC<n>` with `n >= 1`, or names a missing component.
    #[error("Unknown principal component label '{0}'.")]
    UnknownComponentLabel(String),

    /// The model lacks a part required by the requested operation.
    #[error("Model is not fitted: {0} not set. Fit or load a model first.")]
    NotFitted(&'static str),

    #[error("Linear algebra failure: {0}")]
    Linalg(String),

    #[error("Failed to read or write model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize PCA model: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Failed to deserialize PCA model: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
