//! Error types for the billing-project buffer
use thiserror::Error;

use crate::entry::{EntryStatus, PartitionKey};

/// Result type for buffer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for buffer operations.
///
/// Pool exhaustion and provisioner failures are deliberately distinct
/// variants: the former means "try again later", the latter may not be
/// retryable at all. Callers branch on [`Error::is_retryable`].
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No AVAILABLE entry exists in the requested partition
    #[error("Billing-project buffer for partition '{partition}' is empty")]
    EmptyPool {
        /// The partition whose pool was exhausted
        partition: PartitionKey,
    },

    /// A call to the external provisioner failed
    #[error("Provisioner {operation} failed for '{external_name}': {reason}")]
    Provisioner {
        /// The provisioner operation that failed (create / status / grant)
        operation: &'static str,
        /// The externally-provisioned resource involved
        external_name: String,
        /// The failure reason
        reason: String,
        /// Whether retrying the same call may succeed
        retryable: bool,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backing store failed
    #[error("Store {operation} failed: {reason}")]
    Store {
        /// The store operation that failed
        operation: &'static str,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A status edge not present in the entry state machine was attempted
    #[error("Invalid status transition for '{external_name}': {from} -> {to}")]
    InvalidTransition {
        /// The entry involved
        external_name: String,
        /// The current status
        from: EntryStatus,
        /// The attempted target status
        to: EntryStatus,
    },

    /// The cross-process assignment lock failed
    #[error(transparent)]
    Lock(#[from] cumulus_lock::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store<R: Into<String>>(operation: &'static str, reason: R) -> Self {
        Self::Store {
            operation,
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a provisioner error
    pub fn provisioner<N: Into<String>, R: Into<String>>(
        operation: &'static str,
        external_name: N,
        reason: R,
        retryable: bool,
    ) -> Self {
        Self::Provisioner {
            operation,
            external_name: external_name.into(),
            reason: reason.into(),
            retryable,
            source: None,
        }
    }

    /// Whether the failed request may succeed if retried by the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmptyPool { .. } => true,
            Self::Provisioner { retryable, .. } => *retryable,
            _ => false,
        }
    }
}
