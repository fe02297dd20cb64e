//! Error types for compiler operations.

use thiserror::Error;

/// Errors that can occur while compiling or converging a namespace.
///
/// Validation failures are not errors here: they exclude the offending
/// action and end up in its status condition.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested object does not exist.
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Namespace.
        namespace: String,
        /// Name.
        name: String,
    },

    /// An object with the same name already exists.
    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        /// Resource kind.
        kind: String,
        /// Namespace.
        namespace: String,
        /// Name.
        name: String,
    },

    /// The object is managed by another field manager.
    #[error("processor '{name}' is managed by '{owner}', refusing to apply as '{manager}'")]
    Conflict {
        /// Processor name.
        name: String,
        /// Current field manager.
        owner: String,
        /// Field manager of the rejected apply.
        manager: String,
    },

    /// Work for the namespace was cancelled.
    #[error("reconciliation of namespace '{0}' was cancelled")]
    Cancelled(String),

    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Configuration file could not be loaded.
    #[error("invalid compiler configuration: {0}")]
    Config(String),

    /// Resource model error.
    #[error(transparent)]
    Actions(#[from] sampling_actions::Error),

    /// YAML serialization error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if retrying the reconciliation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict { .. } | Self::Io(_))
    }
}

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, Error>;
