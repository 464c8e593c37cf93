//! Prometheus-style duration parsing and formatting.
//!
//! Prometheus durations are sequences of `<number><unit>` pairs with units
//! in strictly descending order: `1w`, `2h30m`, `1d12h`. This grammar is
//! shared by rule `for` fields, lookback settings, and `min-age` comment
//! directives.

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)(ms|s|m|h|d|w|y)").unwrap_or_else(|_| unreachable!()));

/// Error returned when a duration string does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration: {input}")]
pub struct DurationError {
    /// The rejected input.
    pub input: String,
}

const MILLIS_PER_UNIT: &[(&str, i64)] = &[
    ("y", 365 * 24 * 60 * 60 * 1000),
    ("w", 7 * 24 * 60 * 60 * 1000),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
    ("ms", 1),
];

fn unit_millis(unit: &str) -> i64 {
    MILLIS_PER_UNIT
        .iter()
        .find(|(u, _)| *u == unit)
        .map_or(0, |(_, ms)| *ms)
}

/// Parses a Prometheus duration string (`1w`, `2h30m`, `0`).
///
/// Units must appear at most once and in descending order, matching the
/// upstream grammar.
///
/// # Errors
///
/// Returns [`DurationError`] for empty input, unknown units, out-of-order
/// units, or trailing garbage.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let err = || DurationError {
        input: input.to_string(),
    };

    if input == "0" {
        return Ok(Duration::zero());
    }

    let mut rest = input;
    let mut total_ms: i64 = 0;
    let mut last_unit_ms = i64::MAX;
    while !rest.is_empty() {
        let caps = DURATION_PART.captures(rest).ok_or_else(err)?;
        let value: i64 = caps[1].parse().map_err(|_| err())?;
        let unit_ms = unit_millis(&caps[2]);
        if unit_ms >= last_unit_ms {
            return Err(err());
        }
        last_unit_ms = unit_ms;
        total_ms = total_ms
            .checked_add(value.checked_mul(unit_ms).ok_or_else(err)?)
            .ok_or_else(err)?;
        rest = &rest[caps[0].len()..];
    }
    if last_unit_ms == i64::MAX {
        return Err(err());
    }
    Ok(Duration::milliseconds(total_ms))
}

/// Formats a duration the way Prometheus prints them: `1w`, `2d3h`, `5m30s`.
///
/// Zero and negative durations render as `0s`.
#[must_use]
pub fn humanize_duration(d: Duration) -> String {
    let mut ms = d.num_milliseconds();
    if ms <= 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, unit_ms) in MILLIS_PER_UNIT {
        let count = ms / unit_ms;
        if count > 0 {
            out.push_str(&count.to_string());
            out.push_str(unit);
            ms -= count * unit_ms;
        }
    }
    out
}
