//! Storage error types and result alias.
//!
//! Every collaborator behind the gate (identity store, role catalog, identity
//! cache) maps its internal failures to [`StorageError`], so the pipeline can
//! classify them without knowing which backend produced them.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - The requested record does not exist
//! - [`StorageError::Conflict`] - The write collides with existing state
//! - [`StorageError::Connection`] - Network or connection-related failures
//! - [`StorageError::Serialization`] - Data encoding/decoding failures
//! - [`StorageError::Internal`] - Backend-specific internal errors
//! - [`StorageError::Timeout`] - A stage exceeded its deadline
//!
//! # Example
//!
//! ```
//! use gatehouse_storage::{StorageError, StorageResult};
//!
//! fn lookup(id: i64) -> StorageResult<String> {
//!     Err(StorageError::not_found("identity", id))
//! }
//! ```

use std::{fmt::Display, sync::Arc, time::Duration};

use thiserror::Error;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to a storage collaborator.
///
/// Errors preserve their source chain via the `#[source]` attribute, so
/// structured logging can print the full context while callers only see the
/// variant.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What kind of record was requested (`"identity"`, `"role"`, ...).
        kind: &'static str,
        /// The lookup key that missed.
        key: String,
    },

    /// The write conflicts with existing state (duplicate key or edge).
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// Connection or network error.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The operation exceeded its deadline.
    #[error("Operation timeout: {operation} exceeded {}ms", .after.as_millis())]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error for the given record kind and key.
    #[must_use]
    pub fn not_found(kind: &'static str, key: impl Display) -> Self {
        Self::NotFound { kind, key: key.to_string() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error for the named operation.
    #[must_use]
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Returns `true` when the record was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for failures that may succeed on retry
    /// (connection problems and timeouts).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Validation errors raised while building configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric or duration field is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// The offending field.
        field: &'static str,
        /// The rejected value, rendered for display.
        value: String,
        /// The minimum accepted value, rendered for display.
        min: String,
    },
}
