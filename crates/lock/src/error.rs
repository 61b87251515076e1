//! Error types for lock operations
use thiserror::Error;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for distributed lock backends.
#[derive(Error, Debug)]
pub enum Error {
    /// Lock options are inconsistent
    #[error("Lock configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The lock backend failed (connection lost, query failed, ...)
    #[error("Lock backend error for '{name}': {reason}")]
    Backend {
        /// The lock name involved
        name: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a backend error
    pub fn backend<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::Backend {
            name: name.into(),
            reason: reason.into(),
            source: None,
        }
    }
}
