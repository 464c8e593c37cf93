//! Time-range set algebra over series presence data.
//!
//! A range query against `count(<selector>)` comes back as a set of
//! [`MetricTimeRange`] values: closed intervals during which the series
//! existed, aligned to the query step with each end landing one second
//! before the next step boundary. [`SeriesTimeRanges`] carries the full
//! response window plus the gaps computed against a server-uptime series.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::client::TimeWindow;

/// Label set attached to a series, ordered for stable output.
pub type Labels = BTreeMap<String, String>;

/// A closed interval during which one series was present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTimeRange {
    /// Fingerprint of the series' label set.
    pub fingerprint: u64,
    /// The series' labels.
    pub labels: Labels,
    /// First timestamp the series was seen at.
    pub start: DateTime<Utc>,
    /// Last covered timestamp, one second short of the next step boundary.
    pub end: DateTime<Utc>,
}

impl MetricTimeRange {
    /// Creates a range with no labels.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            fingerprint: 0,
            labels: Labels::new(),
            start,
            end,
        }
    }

    /// Returns true when `t` falls inside this closed interval.
    #[must_use]
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

/// An interval where uptime had coverage but the series did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// First missing timestamp.
    pub start: DateTime<Utc>,
    /// End of the missing interval, aligned like range ends.
    pub end: DateTime<Utc>,
}

/// Presence ranges for one range-query response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesTimeRanges {
    /// Window start.
    pub from: DateTime<Utc>,
    /// Window end.
    pub until: DateTime<Utc>,
    /// Query resolution step.
    pub step: Duration,
    /// Intervals with series present.
    pub ranges: Vec<MetricTimeRange>,
    /// Intervals with uptime but no series; filled by [`Self::find_gaps`].
    pub gaps: Vec<Gap>,
}

impl SeriesTimeRanges {
    /// An empty response for the given window.
    #[must_use]
    pub fn empty(window: &TimeWindow) -> Self {
        Self {
            from: window.start,
            until: window.end,
            step: window.step,
            ranges: Vec::new(),
            gaps: Vec::new(),
        }
    }

    /// A synthetic response with a single range covering the whole window.
    ///
    /// Used as the uptime stand-in when the uptime metric itself returns
    /// nothing.
    #[must_use]
    pub fn always_up(window: &TimeWindow) -> Self {
        Self {
            from: window.start,
            until: window.end,
            step: window.step,
            ranges: vec![MetricTimeRange::new(window.start, window.end)],
            gaps: Vec::new(),
        }
    }

    /// Returns true when any range covers `t`.
    #[must_use]
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.ranges.iter().any(|r| r.covers(t))
    }

    /// Computes the intervals inside `[from, until]` where `uptime` has
    /// coverage but `self` does not, storing them on `self.gaps`.
    ///
    /// The window is walked at `self.step` resolution; consecutive missing
    /// steps merge into one gap whose end is aligned one second short of
    /// the following step boundary.
    pub fn find_gaps(&mut self, uptime: &Self, from: DateTime<Utc>, until: DateTime<Utc>) {
        if self.step <= Duration::zero() {
            return;
        }
        let mut gaps = Vec::new();
        let mut current: Option<Gap> = None;
        let mut t = from;
        while t <= until {
            if uptime.covers(t) && !self.covers(t) {
                let end = t + self.step - Duration::seconds(1);
                match current.as_mut() {
                    Some(gap) => gap.end = end,
                    None => current = Some(Gap { start: t, end }),
                }
            } else if let Some(gap) = current.take() {
                gaps.push(gap);
            }
            t += self.step;
        }
        if let Some(gap) = current {
            gaps.push(gap);
        }
        self.gaps = gaps;
    }
}

/// Intersection of two ranges, treating them as closed modulo the step:
/// intervals separated by no more than one step still overlap, so a tie of
/// exactly one step counts as contact. Range ends sit one second before
/// the next step boundary, and the tolerance accounts for that second.
///
/// When the ranges merely touch within tolerance the returned intersection
/// can be empty (start past end); callers deciding overlap should test for
/// `Some` rather than inspect the bounds.
#[must_use]
pub fn overlaps(
    a: &MetricTimeRange,
    b: &MetricTimeRange,
    step: Duration,
) -> Option<MetricTimeRange> {
    let tolerance = step + Duration::seconds(1);
    if a.start <= b.end + tolerance && b.start <= a.end + tolerance {
        return Some(MetricTimeRange {
            fingerprint: a.fingerprint,
            labels: a.labels.clone(),
            start: a.start.max(b.start),
            end: a.end.min(b.end),
        });
    }
    None
}

/// Earliest start across `ranges`, if any.
#[must_use]
pub fn oldest(ranges: &[MetricTimeRange]) -> Option<DateTime<Utc>> {
    ranges.iter().map(|r| r.start).min()
}

/// Latest end across `ranges`, if any.
#[must_use]
pub fn newest(ranges: &[MetricTimeRange]) -> Option<DateTime<Utc>> {
    ranges.iter().map(|r| r.end).max()
}

/// Mean life span across `ranges`.
///
/// Range ends are aligned one second short of a step boundary, so that
/// second is added back per range. Empty input yields zero.
#[must_use]
pub fn avg_life(ranges: &[MetricTimeRange]) -> Duration {
    if ranges.is_empty() {
        return Duration::zero();
    }
    let total: i64 = ranges
        .iter()
        .map(|r| (r.end - r.start).num_seconds() + 1)
        .sum();
    Duration::seconds(total / ranges.len() as i64)
}
