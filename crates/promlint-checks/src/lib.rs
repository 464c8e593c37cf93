//! Rule checks and the framework that runs them.
//!
//! Checks implement the [`Check`] trait and are held by a [`Registry`],
//! which dispatches every rule through every applicable check, converts
//! parse failures into `yaml/parse` problems, applies comment-directive
//! suppression, and aggregates everything into a [`Summary`] for the
//! exit-code decision.
//!
//! Shipped checks:
//! - [`SeriesCheck`] (`promql/series`): are the queried metrics actually
//!   present on the server, and if not, why not
//! - [`SyntaxCheck`] (`promql/syntax`): does the expression parse
//! - [`AggregateCheck`] (`promql/aggregate`): label hygiene across
//!   aggregations
//! - [`CostCheck`] (`query/cost`): query cardinality and execution cost

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod aggregate;
mod check;
mod context;
mod cost;
mod error;
mod problem;
mod series;
mod syntax;
#[cfg(test)]
mod testutil;

pub use aggregate::{AggregateCheck, AGGREGATE_CHECK_NAME};
pub use check::{
    file_error_problem, Check, CheckMeta, Registry, Report, RuleFilter, Summary,
    COMMENT_REPORTER, YAML_PARSE_REPORTER,
};
pub use context::{query_error_text_and_severity, ChangeType, CheckContext, Entry};
pub use cost::{CostCheck, CostSettings, BYTES_PER_SAMPLE_QUERY, COST_CHECK_NAME};
pub use error::ConfigError;
pub use problem::{Anchor, Problem, Severity};
pub use series::{SeriesCheck, SeriesSettings, SERIES_CHECK_NAME};
pub use syntax::{SyntaxCheck, SYNTAX_CHECK_NAME};
