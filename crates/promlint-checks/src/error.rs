//! Configuration validation errors.

use thiserror::Error;

/// A check was configured with values that can never work; reported at
/// startup, before any rule is looked at.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An `ignoreMetrics` pattern is not a valid regular expression.
    #[error("invalid ignoreMetrics regexp '{pattern}': {source}")]
    InvalidRegex {
        /// The rejected pattern.
        pattern: String,
        /// The regex engine's complaint.
        source: regex::Error,
    },

    /// A duration setting does not parse.
    #[error("invalid {field} duration: {source}")]
    InvalidDuration {
        /// Which setting was rejected.
        field: &'static str,
        /// The parse failure.
        source: promlint_promapi::DurationError,
    },

    /// A rule-name pattern is not a valid regular expression.
    #[error("invalid rule name regexp '{pattern}': {source}")]
    InvalidNameRegex {
        /// The rejected pattern.
        pattern: String,
        /// The regex engine's complaint.
        source: regex::Error,
    },
}
