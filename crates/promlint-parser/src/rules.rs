//! The typed rule model.
//!
//! A [`Rule`] is a tagged union: alerting, recording, or invalid with the
//! parse errors that broke it. Examining the tag fully determines which
//! body is present; there are no half-filled variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use promlint_promql::{parse, PromQLNode, SyntaxError};

use crate::comments::{Comment, Directive, DirectiveError};
use crate::lines::LineRange;
use crate::nodes::{maps_identical, MapNode, Node};

/// A PromQL expression as written in a rule.
///
/// A syntax error is stored, not propagated: the rule still parses and
/// each check decides what a broken query means for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromQLExpr {
    /// The expression source, positioned to cover the `expr` key and value.
    pub value: Node,
    /// Set iff the expression failed to parse.
    pub syntax_error: Option<SyntaxError>,
    /// The parsed query; `None` iff `syntax_error` is set.
    pub query: Option<PromQLNode>,
}

impl PromQLExpr {
    /// Parses the expression carried by `value`.
    #[must_use]
    pub fn new(value: Node) -> Self {
        match parse(&value.value) {
            Ok(query) => Self {
                value,
                syntax_error: None,
                query: Some(query),
            },
            Err(err) => Self {
                value,
                syntax_error: Some(err),
                query: None,
            },
        }
    }

    /// Raw-text equality; positions and parse outcomes are ignored.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.value.value == other.value.value
    }
}

/// An alerting rule body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingRule {
    /// Alert name.
    pub alert: Node,
    /// The alerting expression.
    pub expr: PromQLExpr,
    /// Optional `for` clause.
    pub for_duration: Option<Node>,
    /// Optional `keep_firing_for` clause.
    pub keep_firing_for: Option<Node>,
    /// Optional labels.
    pub labels: Option<MapNode>,
    /// Optional annotations.
    pub annotations: Option<MapNode>,
}

impl AlertingRule {
    /// Structural equality ignoring positions.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.alert.is_identical(&other.alert)
            && self.expr.is_identical(&other.expr)
            && optional_identical(self.for_duration.as_ref(), other.for_duration.as_ref())
            && optional_identical(self.keep_firing_for.as_ref(), other.keep_firing_for.as_ref())
            && maps_identical(self.labels.as_ref(), other.labels.as_ref())
            && maps_identical(self.annotations.as_ref(), other.annotations.as_ref())
    }
}

/// A recording rule body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRule {
    /// The recorded metric name.
    pub record: Node,
    /// The recorded expression.
    pub expr: PromQLExpr,
    /// Optional labels.
    pub labels: Option<MapNode>,
}

impl RecordingRule {
    /// Structural equality ignoring positions.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.record.is_identical(&other.record)
            && self.expr.is_identical(&other.expr)
            && maps_identical(self.labels.as_ref(), other.labels.as_ref())
    }
}

fn optional_identical(a: Option<&Node>, b: Option<&Node>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.is_identical(b),
        _ => false,
    }
}

/// A failure that made a rule unusable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Line the failure is reported at.
    pub line: usize,
    /// The offending source fragment, when one can be named.
    pub fragment: Option<String>,
    /// What went wrong.
    pub error: String,
}

impl ParseError {
    /// Creates an error without a fragment.
    #[must_use]
    pub fn new(line: usize, error: impl Into<String>) -> Self {
        Self {
            line,
            fragment: None,
            error: error.into(),
        }
    }

    /// Creates an error naming the offending fragment.
    #[must_use]
    pub fn with_fragment(line: usize, fragment: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            line,
            fragment: Some(fragment.into()),
            error: error.into(),
        }
    }
}

/// Which body a rule carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuleKind {
    /// A well-formed alerting rule.
    Alerting(AlertingRule),
    /// A well-formed recording rule.
    Recording(RecordingRule),
    /// A rule mapping that failed validation; every error is kept so each
    /// one can surface as its own diagnostic.
    Invalid(Vec<ParseError>),
}

/// Discriminant of [`RuleKind`], used by check filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Alerting rule.
    Alerting,
    /// Recording rule.
    Recording,
    /// Invalid rule.
    Invalid,
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alerting => write!(f, "alerting"),
            Self::Recording => write!(f, "recording"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// One rule from a rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Lines spanned by the rule mapping.
    pub lines: LineRange,
    /// The rule body, or the errors that prevented one.
    pub kind: RuleKind,
    /// Directives from comments in or immediately above the rule's span,
    /// plus any file-scoped directives.
    pub comments: Vec<Comment>,
    /// Malformed directives found in the same scope; reported as warnings.
    pub comment_errors: Vec<DirectiveError>,
}

impl Rule {
    /// The rule's discriminant.
    #[must_use]
    pub fn rule_type(&self) -> RuleType {
        match &self.kind {
            RuleKind::Alerting(_) => RuleType::Alerting,
            RuleKind::Recording(_) => RuleType::Recording,
            RuleKind::Invalid(_) => RuleType::Invalid,
        }
    }

    /// The alerting body, when present.
    #[must_use]
    pub fn alerting(&self) -> Option<&AlertingRule> {
        match &self.kind {
            RuleKind::Alerting(rule) => Some(rule),
            _ => None,
        }
    }

    /// The recording body, when present.
    #[must_use]
    pub fn recording(&self) -> Option<&RecordingRule> {
        match &self.kind {
            RuleKind::Recording(rule) => Some(rule),
            _ => None,
        }
    }

    /// Parse errors; empty unless the rule is invalid.
    #[must_use]
    pub fn errors(&self) -> &[ParseError] {
        match &self.kind {
            RuleKind::Invalid(errors) => errors,
            _ => &[],
        }
    }

    /// The rule's name: `record` or `alert` value.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            RuleKind::Alerting(rule) => Some(&rule.alert.value),
            RuleKind::Recording(rule) => Some(&rule.record.value),
            RuleKind::Invalid(_) => None,
        }
    }

    /// The rule's expression, when the rule has a body.
    #[must_use]
    pub fn expr(&self) -> Option<&PromQLExpr> {
        match &self.kind {
            RuleKind::Alerting(rule) => Some(&rule.expr),
            RuleKind::Recording(rule) => Some(&rule.expr),
            RuleKind::Invalid(_) => None,
        }
    }

    /// Matchers of every `disable` directive plus every snooze directive
    /// that has not expired by `now`, file-scoped forms included.
    #[must_use]
    pub fn disable_matchers(&self, now: DateTime<Utc>) -> Vec<&str> {
        let mut matchers = Vec::new();
        for comment in &self.comments {
            match &comment.directive {
                Directive::Disable { matcher } | Directive::FileDisable { matcher } => {
                    matchers.push(matcher.as_str());
                }
                Directive::Snooze { until, matcher }
                | Directive::FileSnooze { until, matcher }
                    if *until > now =>
                {
                    matchers.push(matcher.as_str());
                }
                _ => {}
            }
        }
        matchers
    }

    /// Payloads of every `rule-set` directive on this rule.
    #[must_use]
    pub fn rule_set_values(&self) -> Vec<&str> {
        self.comments
            .iter()
            .filter_map(|c| match &c.directive {
                Directive::RuleSet { value } => Some(value.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Structural equality ignoring positions; comments compare as sorted
    /// multisets.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        let bodies = match (&self.kind, &other.kind) {
            (RuleKind::Alerting(a), RuleKind::Alerting(b)) => a.is_identical(b),
            (RuleKind::Recording(a), RuleKind::Recording(b)) => a.is_identical(b),
            (RuleKind::Invalid(a), RuleKind::Invalid(b)) => a == b,
            _ => false,
        };
        if !bodies {
            return false;
        }
        let mut a: Vec<String> = self.comments.iter().map(|c| format!("{:?}", c.directive)).collect();
        let mut b: Vec<String> = other.comments.iter().map(|c| format!("{:?}", c.directive)).collect();
        a.sort();
        b.sort();
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn node(value: &str, line: usize) -> Node {
        Node::new(value, LineRange::single(line))
    }

    fn recording(record: &str, expr: &str) -> Rule {
        Rule {
            lines: LineRange::new(1, 2),
            kind: RuleKind::Recording(RecordingRule {
                record: node(record, 1),
                expr: PromQLExpr::new(node(expr, 2)),
                labels: None,
            }),
            comments: Vec::new(),
            comment_errors: Vec::new(),
        }
    }

    #[test]
    fn expr_keeps_syntax_errors() {
        let expr = PromQLExpr::new(node("sum(foo) without(", 2));
        assert!(expr.syntax_error.is_some());
        assert!(expr.query.is_none());

        let ok = PromQLExpr::new(node("sum(foo)", 2));
        assert!(ok.syntax_error.is_none());
        assert!(ok.query.is_some());
    }

    #[test]
    fn rule_accessors_follow_the_tag() {
        let rule = recording("foo", "sum(bar)");
        assert_eq!(rule.rule_type(), RuleType::Recording);
        assert_eq!(rule.name(), Some("foo"));
        assert!(rule.expr().is_some());
        assert!(rule.alerting().is_none());
        assert!(rule.errors().is_empty());
    }

    #[test]
    fn invalid_rule_exposes_errors() {
        let rule = Rule {
            lines: LineRange::single(4),
            kind: RuleKind::Invalid(vec![ParseError::new(4, "incomplete rule")]),
            comments: Vec::new(),
            comment_errors: Vec::new(),
        };
        assert_eq!(rule.rule_type(), RuleType::Invalid);
        assert_eq!(rule.errors().len(), 1);
        assert!(rule.name().is_none());
        assert!(rule.expr().is_none());
    }

    #[test]
    fn expired_snooze_does_not_disable() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let past = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let future = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();
        let mut rule = recording("foo", "bar");
        rule.comments = vec![
            Comment {
                line: 1,
                directive: Directive::Snooze {
                    until: past,
                    matcher: "promql/series(expired)".to_string(),
                },
            },
            Comment {
                line: 1,
                directive: Directive::Snooze {
                    until: future,
                    matcher: "promql/series(active)".to_string(),
                },
            },
            Comment {
                line: 1,
                directive: Directive::Disable {
                    matcher: "promql/cost".to_string(),
                },
            },
        ];
        let matchers = rule.disable_matchers(now);
        assert!(matchers.contains(&"promql/series(active)"));
        assert!(matchers.contains(&"promql/cost"));
        assert!(!matchers.contains(&"promql/series(expired)"));
    }

    #[test]
    fn identical_rules_compare_equal() {
        let a = recording("foo", "sum(bar)");
        let b = recording("foo", "sum(bar)");
        assert!(a.is_identical(&b));
        let c = recording("foo", "sum(baz)");
        assert!(!a.is_identical(&c));
    }
}
