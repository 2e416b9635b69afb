//! Storage layer errors

use std::time::Duration;

use subs_domain::{Month, UserId};
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// A subscription with the same (service, user, start month) exists
    #[error("Subscription already exists: {service} for user {user_id} starting {start_date}")]
    AlreadyExists {
        /// Service name
        service: String,
        /// Owning user
        user_id: UserId,
        /// Start month
        start_date: Month,
    },

    /// Nothing matched or nothing was affected
    #[error("Subscription not found: {0}")]
    NotFound(String),

    /// A filter dimension required by the operation is missing
    #[error("Wrong params: {0}")]
    WrongParams(String),

    /// The operation did not finish within its deadline
    #[error("Store operation {operation} timed out after {limit:?}")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Deadline that was exceeded
        limit: Duration,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored row could not be turned back into a subscription
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Coarse classification of [`StoreError`] for callers mapping errors to
/// their own surface (e.g. HTTP status codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Uniqueness violation on create
    AlreadyExists,
    /// Zero rows matched or affected
    NotFound,
    /// Caller omitted a required filter dimension
    WrongParams,
    /// Any other persistence failure, timeouts included
    Store,
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a wrong params error
    pub fn wrong_params(message: impl Into<String>) -> Self {
        Self::WrongParams(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::WrongParams(_) => ErrorKind::WrongParams,
            Self::Timeout { .. }
            | Self::Database(_)
            | Self::Connection(_)
            | Self::Deserialization(_) => ErrorKind::Store,
        }
    }

    /// Whether this is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                StoreError::Connection(err.to_string())
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Deserialization(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
