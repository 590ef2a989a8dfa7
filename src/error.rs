//! Error types for swm-node.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in swm-node.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested resource is missing, unreadable, or not addressable.
    #[error("content unavailable: {key}: {reason}")]
    ContentUnavailable {
        /// Resource key as supplied by the client.
        key: String,
        /// Why the content could not be read.
        reason: String,
    },

    /// Linking the resource into its staging directory failed.
    #[error("staging failed: {0}")]
    StagingFailed(String),

    /// Writing the envelope record to the ticket store failed.
    #[error("persist failed: {0}")]
    PersistFailed(String),

    /// A payment network failed to sign a ticket.
    #[error("signing error: {0}")]
    Signing(String),

    /// A payment network produced output that could not be interpreted.
    #[error("malformed payment observation: {0}")]
    MalformedObservation(String),

    /// Storage error outside the request path (publish, sweep).
    #[error("storage error: {0}")]
    Storage(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if the transport layer should answer "not found".
    ///
    /// Every other error on the request path is a server-side failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ContentUnavailable { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
