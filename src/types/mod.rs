//! Shared identifiers, result and error types.

mod collection;

pub use collection::{Collection, RecordId};

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Every failure a store operation can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock or throttle permit was not granted within its timeout.
    #[error("{resource} not acquired within {waited:?}")]
    Busy {
        /// The resource that could not be acquired.
        resource: &'static str,
        /// How long the caller waited before giving up.
        waited: Duration,
    },
    /// A uniqueness invariant would be violated.
    #[error("{0}")]
    Conflict(String),
    /// The targeted record does not exist or is not in the required state.
    #[error("{0} not found")]
    NotFound(String),
    /// Credentials did not match any user.
    #[error("unauthorized")]
    Unauthorized,
    /// Required input was missing or malformed.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// A wait was cancelled before it completed.
    #[error("interrupted while waiting for {0}")]
    Interrupted(&'static str),
    /// The backing files could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StoreError::Invalid(message.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    /// Stable machine-readable code for the outer layer.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Busy { .. } => "busy",
            StoreError::Conflict(_) => "conflict",
            StoreError::NotFound(_) => "not_found",
            StoreError::Unauthorized => "unauthorized",
            StoreError::Invalid(_) => "invalid",
            StoreError::Interrupted(_) => "interrupted",
            StoreError::Io(_) => "io",
        }
    }

    /// Whether the caller may reasonably retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Busy { .. })
    }
}
