//! Source line ranges.

use serde::{Deserialize, Serialize};

/// An inclusive range of 1-based source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    /// First covered line.
    pub first: usize,
    /// Last covered line, never smaller than `first`.
    pub last: usize,
}

impl LineRange {
    /// Creates a range covering a single line.
    #[must_use]
    pub const fn single(line: usize) -> Self {
        Self {
            first: line,
            last: line,
        }
    }

    /// Creates a range from bounds, swapping them if reversed.
    #[must_use]
    pub fn new(first: usize, last: usize) -> Self {
        if first <= last {
            Self { first, last }
        } else {
            Self {
                first: last,
                last: first,
            }
        }
    }

    /// The smallest range covering both `self` and `other`.
    #[must_use]
    pub fn cover(&self, other: Self) -> Self {
        Self {
            first: self.first.min(other.first),
            last: self.last.max(other.last),
        }
    }

    /// Returns true when `line` falls inside this range.
    #[must_use]
    pub const fn contains(&self, line: usize) -> bool {
        line >= self.first && line <= self.last
    }

    /// Every covered line in order.
    #[must_use]
    pub fn expand(&self) -> Vec<usize> {
        (self.first..=self.last).collect()
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{}-{}", self.first, self.last)
        }
    }
}
