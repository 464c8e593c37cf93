//! Diagnostics produced by checks.

use serde::{Deserialize, Serialize};

use promlint_parser::LineRange;

/// How bad a problem is.
///
/// The order matters: the session's exit state is decided by comparing the
/// worst observed severity against a threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, requires no action.
    Information,
    /// Should be looked at.
    Warning,
    /// Almost certainly a mistake in the rule.
    Bug,
    /// The rule cannot be used at all.
    Fatal,
}

impl Severity {
    /// The severity name as printed in reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Bug => "bug",
            Self::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a problem anchors relative to its lines when rendered in a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// Attach after the lines (the default).
    #[default]
    After,
    /// Attach before the lines; used for problems about removed content.
    Before,
}

/// A single diagnostic attached to some rule lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Source lines the problem is about.
    pub lines: LineRange,
    /// Name of the check that found it, e.g. `promql/series`.
    pub reporter: String,
    /// One-line description.
    pub text: String,
    /// Optional longer explanation rendered under the text.
    pub details: Option<String>,
    /// How bad it is.
    pub severity: Severity,
    /// Rendering anchor.
    pub anchor: Anchor,
}

impl Problem {
    /// Creates a problem with no details and the default anchor.
    #[must_use]
    pub fn new(
        lines: LineRange,
        reporter: impl Into<String>,
        text: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            lines,
            reporter: reporter.into(),
            text: text.into(),
            details: None,
            severity,
            anchor: Anchor::default(),
        }
    }

    /// Attaches details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
