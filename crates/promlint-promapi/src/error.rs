//! Query error taxonomy.

use thiserror::Error;

/// Errors returned by [`PrometheusClient`](crate::PrometheusClient)
/// implementations.
///
/// Checks catch these per query, translate them into problems, and keep
/// going; the class of the error decides the problem severity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The server could not be reached.
    #[error("connection refused: {message}")]
    ConnectionRefused {
        /// Transport-level detail.
        message: String,
    },

    /// The request exceeded its deadline.
    #[error("connection timeout: {message}")]
    Timeout {
        /// Transport-level detail.
        message: String,
    },

    /// The server rejected the query.
    #[error("bad_data: {message}")]
    BadData {
        /// Server-provided detail.
        message: String,
    },

    /// The caller cancelled the request.
    #[error("query cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{message}")]
    Unknown {
        /// Whatever detail is available.
        message: String,
    },
}

impl QueryError {
    /// Convenience constructor for [`QueryError::ConnectionRefused`].
    #[must_use]
    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`QueryError::Timeout`].
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`QueryError::BadData`].
    #[must_use]
    pub fn bad_data(message: impl Into<String>) -> Self {
        Self::BadData {
            message: message.into(),
        }
    }

    /// Convenience constructor for [`QueryError::Unknown`].
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }
}
