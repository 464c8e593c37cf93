//! `promql/aggregate`: label hygiene across aggregation operators.
//!
//! Configured with a rule-name pattern, a label, and an intent: `keep`
//! means every aggregation must preserve the label (so downstream joins
//! keep working), the opposite means the label must be aggregated away.

use regex::Regex;

use promlint_parser::Rule;
use promlint_promql::{Grouping, NodeKind, PromQLNode};

use crate::check::{Check, CheckMeta};
use crate::context::{CheckContext, Entry};
use crate::error::ConfigError;
use crate::problem::{Problem, Severity};

/// Reporter name of the aggregate check.
pub const AGGREGATE_CHECK_NAME: &str = "promql/aggregate";

// Parameterized aggregations pick samples rather than collapse label
// dimensions, so grouping rules don't apply to them.
const SKIPPED_OPS: &[&str] = &["topk", "bottomk", "count_values"];

/// Checks that aggregations preserve or strip one label.
#[derive(Debug, Clone)]
pub struct AggregateCheck {
    name_pattern: String,
    name_re: Regex,
    label: String,
    keep: bool,
    severity: Severity,
}

impl AggregateCheck {
    /// Creates a check for rules whose name matches `name_pattern`
    /// (anchored). `keep` decides whether `label` must survive
    /// aggregation or must be removed by it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidNameRegex`] for a broken pattern.
    pub fn new(
        name_pattern: &str,
        label: impl Into<String>,
        keep: bool,
        severity: Severity,
    ) -> Result<Self, ConfigError> {
        let anchored = format!("^{name_pattern}$");
        let name_re = Regex::new(&anchored).map_err(|source| ConfigError::InvalidNameRegex {
            pattern: name_pattern.to_string(),
            source,
        })?;
        Ok(Self {
            name_pattern: anchored,
            name_re,
            label: label.into(),
            keep,
            severity,
        })
    }

    fn visit(&self, node: &PromQLNode, problems: &mut Vec<String>) {
        if let NodeKind::Aggregation { op, grouping } = &node.kind {
            if !SKIPPED_OPS.contains(&op.as_str()) {
                let preserved = grouping.preserves(&self.label);
                if self.keep && !preserved {
                    problems.push(format!(
                        "`{}` label is required and should be preserved when aggregating `{}` rules, use `by({}, ...)`",
                        self.label, self.name_pattern, self.label
                    ));
                }
                if !self.keep && preserved {
                    let hint = match grouping {
                        Grouping::By(_) => format!("remove {} from `by()`", self.label),
                        Grouping::Without(_) => format!("use `without({}, ...)`", self.label),
                    };
                    problems.push(format!(
                        "`{}` label should be removed when aggregating `{}` rules, {}",
                        self.label, self.name_pattern, hint
                    ));
                }
            }
        }
        for child in &node.children {
            self.visit(child, problems);
        }
    }
}

impl Check for AggregateCheck {
    fn reporter(&self) -> &'static str {
        AGGREGATE_CHECK_NAME
    }

    fn instance(&self) -> String {
        format!("{}({}:{})", AGGREGATE_CHECK_NAME, self.name_pattern, self.label)
    }

    fn meta(&self) -> CheckMeta {
        CheckMeta::live_rules(false)
    }

    fn check(
        &self,
        _ctx: &CheckContext,
        _path: &str,
        rule: &Rule,
        _entries: &[Entry],
    ) -> Vec<Problem> {
        let Some(name) = rule.name() else {
            return Vec::new();
        };
        if !self.name_re.is_match(name) {
            return Vec::new();
        }
        let Some(expr) = rule.expr() else {
            return Vec::new();
        };
        let Some(query) = &expr.query else {
            return Vec::new();
        };
        let mut texts = Vec::new();
        self.visit(query, &mut texts);
        texts.dedup();
        texts
            .into_iter()
            .map(|text| Problem::new(expr.value.lines, AGGREGATE_CHECK_NAME, text, self.severity))
            .collect()
    }
}
