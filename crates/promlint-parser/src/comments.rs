//! Comment directive parsing.
//!
//! Rule files carry machine-readable instructions in comments:
//!
//! ```yaml
//! # promlint disable promql/series(foo)
//! # promlint snooze 2026-01-01T00:00:00Z promql/cost
//! # promlint rule-set promql/series min-age 12h
//! # promlint file/owner observability-team
//! ```
//!
//! Comments are parsed once into [`Directive`] values attached to each
//! rule; downstream consumers filter by variant instead of re-parsing
//! strings. Comments without the marker word, and marker comments with an
//! unrecognized directive keyword, are silently ignored so that files
//! written for newer versions keep linting.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The marker word opening every directive comment.
pub const DIRECTIVE_MARKER: &str = "promlint";

/// A parsed comment directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Suppress problems matching `matcher` on the carrying rule.
    Disable {
        /// Reporter name, optionally parameterized: `promql/series(foo)`.
        matcher: String,
    },
    /// As [`Directive::Disable`], but only until `until`.
    Snooze {
        /// Expiry; snoozes in the past do not suppress.
        until: DateTime<Utc>,
        /// Reporter name, optionally parameterized.
        matcher: String,
    },
    /// Free-form payload injected into rule context for checks to consume.
    RuleSet {
        /// The payload, e.g. `promql/series min-age 12h`.
        value: String,
    },
    /// Declares an owner for every rule in the file.
    FileOwner {
        /// Owner identifier.
        owner: String,
    },
    /// File-scoped [`Directive::Disable`]; attached to every rule.
    FileDisable {
        /// Reporter name, optionally parameterized.
        matcher: String,
    },
    /// File-scoped [`Directive::Snooze`]; attached to every rule.
    FileSnooze {
        /// Expiry.
        until: DateTime<Utc>,
        /// Reporter name, optionally parameterized.
        matcher: String,
    },
}

impl Directive {
    /// Returns true for `file/*` directives, which attach to every rule in
    /// the file instead of one rule's span.
    #[must_use]
    pub const fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            Self::FileOwner { .. } | Self::FileDisable { .. } | Self::FileSnooze { .. }
        )
    }
}

/// A directive with the line it was written on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// 1-based source line of the comment.
    pub line: usize,
    /// The parsed directive.
    pub directive: Directive,
}

/// A recognized directive whose payload did not parse.
///
/// Reported as a Warning on the carrying rule; it never aborts parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveError {
    /// 1-based source line of the comment.
    pub line: usize,
    /// What was wrong.
    pub error: String,
}

/// Outcome of parsing one comment's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedComment {
    /// Not a directive; plain commentary or an unknown keyword.
    Ignored,
    /// A well-formed directive.
    Directive(Directive),
    /// A recognized directive with a malformed payload.
    Invalid(String),
}

/// Parses the text content of a comment, marker included, `#` stripped.
#[must_use]
pub fn parse_comment(text: &str) -> ParsedComment {
    let text = text.trim();
    let Some(rest) = text.strip_prefix(DIRECTIVE_MARKER) else {
        return ParsedComment::Ignored;
    };
    if !rest.starts_with(char::is_whitespace) {
        return ParsedComment::Ignored;
    }
    let rest = rest.trim_start();
    let (keyword, payload) = match rest.split_once(char::is_whitespace) {
        Some((k, p)) => (k, p.trim()),
        None => (rest, ""),
    };
    match keyword {
        "disable" => match_payload(payload, |matcher| Directive::Disable { matcher }),
        "snooze" => snooze_payload(payload, |until, matcher| Directive::Snooze { until, matcher }),
        "rule-set" => {
            if payload.is_empty() {
                ParsedComment::Invalid("missing rule-set payload".to_string())
            } else {
                ParsedComment::Directive(Directive::RuleSet {
                    value: payload.to_string(),
                })
            }
        }
        "file/owner" => {
            if payload.is_empty() {
                ParsedComment::Invalid("missing file owner".to_string())
            } else {
                ParsedComment::Directive(Directive::FileOwner {
                    owner: payload.to_string(),
                })
            }
        }
        "file/disable" => match_payload(payload, |matcher| Directive::FileDisable { matcher }),
        "file/snooze" => snooze_payload(payload, |until, matcher| Directive::FileSnooze {
            until,
            matcher,
        }),
        _ => ParsedComment::Ignored,
    }
}

fn match_payload(payload: &str, build: impl FnOnce(String) -> Directive) -> ParsedComment {
    if payload.is_empty() {
        ParsedComment::Invalid("missing check name".to_string())
    } else {
        ParsedComment::Directive(build(payload.to_string()))
    }
}

fn snooze_payload(
    payload: &str,
    build: impl FnOnce(DateTime<Utc>, String) -> Directive,
) -> ParsedComment {
    let Some((ts, matcher)) = payload.split_once(char::is_whitespace) else {
        return ParsedComment::Invalid(format!("invalid snooze comment, missing check name: {payload}"));
    };
    let matcher = matcher.trim();
    if matcher.is_empty() {
        return ParsedComment::Invalid(format!("invalid snooze comment, missing check name: {payload}"));
    }
    let Some(until) = parse_timestamp(ts) else {
        return ParsedComment::Invalid(format!("invalid snooze timestamp: {ts}"));
    };
    ParsedComment::Directive(build(until, matcher.to_string()))
}

// RFC 3339, or a bare date taken as midnight UTC.
fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
