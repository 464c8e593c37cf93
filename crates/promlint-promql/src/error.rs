//! Error types for the promlint-promql crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A PromQL syntax error.
///
/// Stored on the owning expression rather than propagated: a rule with a
/// malformed query still parses as a rule, and checks decide individually
/// whether a broken expression is fatal for them.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("syntax error: {message}")]
pub struct SyntaxError {
    /// Parser message describing what went wrong.
    pub message: String,
}

impl SyntaxError {
    /// Creates a new syntax error from a parser message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
