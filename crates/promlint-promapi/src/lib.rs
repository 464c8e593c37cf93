//! Prometheus API surface consumed by promlint checks.
//!
//! This crate holds everything a check needs to talk about a Prometheus
//! server without knowing how queries are executed:
//! - [`PrometheusClient`]: the failover-group contract (instant and range
//!   queries, server identity, uptime metric)
//! - [`SeriesTimeRanges`] and friends: time-range set algebra over series
//!   presence data (gaps, overlap, average life span)
//! - [`parse_duration`] / [`humanize_duration`]: Prometheus-style durations
//! - [`QueryError`]: the transport error taxonomy checks translate into
//!   diagnostics
//!
//! The HTTP pool that actually implements the contract lives outside this
//! workspace; tests substitute scripted clients.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod duration;
mod error;
mod series;

pub use client::{
    CancelToken, PrometheusClient, QueryResult, QueryStats, RangeQueryResult, Sample, TimeWindow,
};
pub use duration::{humanize_duration, parse_duration, DurationError};
pub use error::QueryError;
pub use series::{avg_life, newest, oldest, overlaps, Gap, Labels, MetricTimeRange, SeriesTimeRanges};
