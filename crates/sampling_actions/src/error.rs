//! Error types for sampling action loading and validation.

use thiserror::Error;

/// Errors that can occur while loading or validating sampling actions.
#[derive(Debug, Error)]
pub enum Error {
    /// A manifest document could not be decoded.
    #[error("parse error in document {document}: {reason}")]
    Parse {
        /// Zero-based index of the document within its source.
        document: usize,
        /// Reason for the parse failure.
        reason: String,
    },

    /// A manifest is structurally valid but names an unsupported kind.
    #[error("unsupported resource kind '{0}'")]
    UnsupportedKind(String),

    /// Sampler configuration failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// A sampler configuration that fails its `validate()` contract.
///
/// Validation errors never abort compilation. They are carried into the
/// failing resource's status condition instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A ratio or percentage is outside `[0, 100]`.
    #[error("{field} must be between 0 and 100, got {value}")]
    RatioOutOfRange {
        /// Field that holds the ratio.
        field: &'static str,
        /// Offending value, as written.
        value: String,
    },

    /// A required field is empty or missing.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A condition operation is not allowed for its condition type.
    #[error("unsupported {condition_type} operation '{operation}'")]
    UnsupportedOperation {
        /// Condition type (`string`, `number`, `boolean`, `json`).
        condition_type: &'static str,
        /// The rejected operation.
        operation: String,
    },

    /// A condition operation requires a field that was not provided.
    #[error("{field} is required for {condition_type} operation '{operation}'")]
    MissingOperand {
        /// Condition type (`string`, `number`, `boolean`, `json`).
        condition_type: &'static str,
        /// Operation that needs the operand.
        operation: String,
        /// Missing field.
        field: &'static str,
    },

    /// Anything else that makes the configuration unusable.
    #[error("{0}")]
    Invalid(String),
}

/// Result type alias for sampling action operations.
pub type Result<T> = std::result::Result<T, Error>;
