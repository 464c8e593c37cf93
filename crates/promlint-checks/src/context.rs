//! Per-session context shared by all checks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use promlint_parser::Rule;
use promlint_promapi::{CancelToken, PrometheusClient, QueryError};

use crate::problem::Severity;

/// How a rule changed relative to the baseline being linted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Present and untouched.
    Noop,
    /// Newly added.
    Added,
    /// Modified in place.
    Modified,
    /// Moved between files or groups.
    Moved,
    /// Removed.
    Removed,
}

/// One rule together with where it came from and how it changed.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Path of the source file.
    pub path: String,
    /// The parsed rule.
    pub rule: Rule,
    /// Change classification.
    pub state: ChangeType,
}

impl Entry {
    /// An unchanged entry; the common case outside CI diffs.
    #[must_use]
    pub fn noop(path: impl Into<String>, rule: Rule) -> Self {
        Self {
            path: path.into(),
            rule,
            state: ChangeType::Noop,
        }
    }
}

/// Read-only context handed to every check invocation.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// The wall clock the whole session runs against; fixed once so every
    /// check sees the same "now".
    pub now: DateTime<Utc>,
    /// Cancellation handle; long-running queries must honor it.
    pub cancel: CancelToken,
    /// Every configured Prometheus server, used only for cross-server
    /// absence reporting.
    pub servers: Vec<Arc<dyn PrometheusClient>>,
}

impl CheckContext {
    /// A context anchored at the current time with no peer servers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            cancel: CancelToken::new(),
            servers: Vec::new(),
        }
    }

    /// Adds the ambient server list.
    #[must_use]
    pub fn with_servers(mut self, servers: Vec<Arc<dyn PrometheusClient>>) -> Self {
        self.servers = servers;
        self
    }
}

impl Default for CheckContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Problem text and severity for a failed query, shared by every online
/// check: an unreachable server is a warning, everything else is on the
/// rule author's side of the contract and defaults to a bug.
#[must_use]
pub fn query_error_text_and_severity(
    reporter: &str,
    prom_name: &str,
    uri: &str,
    err: &QueryError,
) -> (String, Severity) {
    match err {
        QueryError::ConnectionRefused { .. } => (
            format!(
                "couldn't run `{reporter}` checks due to `{prom_name}` Prometheus server at {uri} connection error: {err}."
            ),
            Severity::Warning,
        ),
        QueryError::Cancelled => (
            format!("`{reporter}` checks were cancelled while querying `{prom_name}` Prometheus server at {uri}."),
            Severity::Warning,
        ),
        QueryError::Timeout { .. } | QueryError::BadData { .. } | QueryError::Unknown { .. } => (
            format!("`{prom_name}` Prometheus server at {uri} failed with: {err}."),
            Severity::Bug,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_error_class() {
        let (_, s) = query_error_text_and_severity(
            "promql/series",
            "prom",
            "http://prom.example.com",
            &QueryError::connection_refused("no route"),
        );
        assert_eq!(s, Severity::Warning);

        let (_, s) = query_error_text_and_severity(
            "promql/series",
            "prom",
            "http://prom.example.com",
            &QueryError::timeout("deadline exceeded"),
        );
        assert_eq!(s, Severity::Bug);

        let (text, s) = query_error_text_and_severity(
            "promql/series",
            "prom",
            "http://prom.example.com",
            &QueryError::bad_data("bad input data"),
        );
        assert_eq!(s, Severity::Bug);
        assert!(text.contains("bad_data: bad input data"));
    }
}
