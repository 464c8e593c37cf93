//! The failover-group client contract.
//!
//! Checks hold a `&dyn PrometheusClient` and never learn which backend
//! executes queries, how failover between replicas works, or how identical
//! in-flight queries are collapsed; all of that lives behind this trait.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::series::{Labels, SeriesTimeRanges};

/// Cooperative cancellation handle passed to every query.
///
/// Cloning shares the underlying flag; a long-running range query is
/// expected to poll [`Self::is_cancelled`] and bail with
/// [`QueryError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Self::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The window of a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
    /// Resolution step.
    pub step: Duration,
}

impl TimeWindow {
    /// A window reaching `lookback` into the past from now.
    #[must_use]
    pub fn relative(lookback: Duration, step: Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end - lookback,
            end,
            step,
        }
    }

    /// The covered span.
    #[must_use]
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// One sample of an instant query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The series' labels.
    pub labels: Labels,
    /// Sample value.
    pub value: f64,
}

/// Server-side execution statistics for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Total wall time spent evaluating the query.
    pub eval_duration: Duration,
    /// Total number of samples loaded.
    pub total_samples: i64,
    /// Peak number of samples held in memory at once.
    pub peak_samples: i64,
}

/// Result of an instant query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// URI of the server that answered.
    pub uri: String,
    /// Response samples.
    pub samples: Vec<Sample>,
    /// Execution statistics, when the server provides them.
    pub stats: QueryStats,
}

impl QueryResult {
    /// Sum of all sample values, truncated to an integer count.
    ///
    /// The series check always wraps selectors in `count(...)`, so samples
    /// hold cardinalities.
    #[must_use]
    pub fn series_count(&self) -> i64 {
        self.samples.iter().map(|s| s.value as i64).sum()
    }
}

/// Result of a range query, reduced to presence ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQueryResult {
    /// URI of the server that answered.
    pub uri: String,
    /// Presence ranges over the queried window.
    pub series: SeriesTimeRanges,
}

/// The failover-group contract consumed by checks.
///
/// Implementations are expected to serialize identical concurrent queries
/// (single-flight) and to fail over between replicas internally; from the
/// caller's side there is exactly one logical server with a name, a public
/// URI, and an uptime metric to use as ground truth for gap detection.
pub trait PrometheusClient: Send + Sync {
    /// Server (failover group) name as configured.
    fn name(&self) -> &str;

    /// Public URI for problem texts and links.
    fn public_uri(&self) -> &str;

    /// Metric used as ground truth for "server was up at time t".
    fn uptime_metric(&self) -> &str {
        "up"
    }

    /// Executes an instant query.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] classifying the failure.
    fn query(&self, ctx: &CancelToken, expr: &str) -> Result<QueryResult, QueryError>;

    /// Executes a range query over `window`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] classifying the failure.
    fn range_query(
        &self,
        ctx: &CancelToken,
        expr: &str,
        window: &TimeWindow,
    ) -> Result<RangeQueryResult, QueryError>;
}

impl fmt::Debug for dyn PrometheusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusClient")
            .field("name", &self.name())
            .field("uri", &self.public_uri())
            .finish()
    }
}
