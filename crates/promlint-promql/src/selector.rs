//! Normalized vector selectors and label matchers.
//!
//! Selectors extracted from a parsed expression are copied into this owned
//! model with any offset or @ modifier dropped, so checks can compare,
//! print, and rewrite them without keeping upstream AST nodes alive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{parse, NodeKind};
use crate::error::SyntaxError;

/// The reserved label carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Label matcher operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOp {
    /// `=` exact match.
    Equal,
    /// `!=` negated exact match.
    NotEqual,
    /// `=~` regular expression match.
    Regexp,
    /// `!~` negated regular expression match.
    NotRegexp,
}

impl MatchOp {
    /// Returns the PromQL operator token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Regexp => "=~",
            Self::NotRegexp => "!~",
        }
    }

    /// Returns true for the positive operators (`=` and `=~`).
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        matches!(self, Self::Equal | Self::Regexp)
    }
}

impl fmt::Display for MatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single label matcher inside a vector selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelMatcher {
    /// Label name.
    pub name: String,
    /// Matcher operator.
    pub op: MatchOp,
    /// Matcher value (raw, unescaped).
    pub value: String,
}

impl LabelMatcher {
    /// Creates a new label matcher.
    #[must_use]
    pub fn new(name: impl Into<String>, op: MatchOp, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op,
            value: value.into(),
        }
    }

    /// Returns true if this matcher selects the metric name.
    #[must_use]
    pub fn is_name_matcher(&self) -> bool {
        self.name == METRIC_NAME_LABEL
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}\"{}\"", self.name, self.op, escape(&self.value))
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// A normalized PromQL vector selector: metric name plus label matchers.
///
/// When the source expression names the metric directly (`foo{job="x"}`)
/// the equivalent `__name__` equality matcher is synthesized so matcher
/// based operations behave the same for both spellings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSelector {
    /// Metric name, empty when the selector only uses `__name__` matchers
    /// with non-equality operators.
    pub name: String,
    /// All label matchers, including any `__name__` matcher.
    pub matchers: Vec<LabelMatcher>,
}

impl VectorSelector {
    /// Creates a selector from a metric name, synthesizing the `__name__`
    /// equality matcher.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let matchers = vec![LabelMatcher::new(
            METRIC_NAME_LABEL,
            MatchOp::Equal,
            name.clone(),
        )];
        Self { name, matchers }
    }

    /// Returns a copy retaining only the metric-name matchers.
    ///
    /// The `name` field is re-derived from an equality `__name__` matcher
    /// when one is present. Applying this twice yields the same selector.
    #[must_use]
    pub fn strip_labels(&self) -> Self {
        let mut out = Self {
            name: String::new(),
            matchers: Vec::new(),
        };
        for lm in &self.matchers {
            if lm.is_name_matcher() {
                if lm.op == MatchOp::Equal {
                    out.name = lm.value.clone();
                }
                out.matchers.push(lm.clone());
            }
        }
        out
    }

    /// Copies `__name__` matchers from `outer` when this selector has
    /// neither a name nor a `__name__` matcher of its own.
    pub fn ensure_name_matcher(&mut self, outer: &[LabelMatcher]) {
        if !self.name.is_empty() || self.matchers.iter().any(LabelMatcher::is_name_matcher) {
            return;
        }
        for lm in outer {
            if lm.is_name_matcher() {
                self.matchers.push(lm.clone());
            }
        }
    }

    /// Label names used by positive (equality or regexp) matchers,
    /// excluding `__name__`, deduplicated in first-seen order.
    #[must_use]
    pub fn label_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for lm in &self.matchers {
            if lm.is_name_matcher() || !lm.op.is_positive() {
                continue;
            }
            if !names.contains(&lm.name.as_str()) {
                names.push(lm.name.as_str());
            }
        }
        names
    }

    /// Returns true if every matcher in `subset` has an identical matcher
    /// in this selector.
    #[must_use]
    pub fn contains_matchers(&self, subset: &[LabelMatcher]) -> bool {
        subset.iter().all(|l| self.matchers.contains(l))
    }

    /// First equality matcher on `label`, if any.
    #[must_use]
    pub fn equality_matcher(&self, label: &str) -> Option<&LabelMatcher> {
        self.matchers
            .iter()
            .find(|lm| lm.name == label && lm.op == MatchOp::Equal)
    }
}

impl fmt::Display for VectorSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: Vec<&LabelMatcher> = self
            .matchers
            .iter()
            .filter(|lm| {
                !(lm.is_name_matcher() && lm.op == MatchOp::Equal && lm.value == self.name)
            })
            .collect();
        f.write_str(&self.name)?;
        if !shown.is_empty() {
            f.write_str("{")?;
            for (i, lm) in shown.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{lm}")?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

/// Parses a bare metric-selector string (`foo{job="x"}`) into its matchers.
///
/// # Errors
///
/// Returns [`SyntaxError`] when the input is not a valid vector selector.
pub fn parse_selector(input: &str) -> Result<Vec<LabelMatcher>, SyntaxError> {
    let node = parse(input)?;
    match node.kind {
        NodeKind::Selector(vs) => Ok(vs.matchers),
        _ => Err(SyntaxError::new(format!(
            "expected a vector selector, got `{input}`"
        ))),
    }
}
