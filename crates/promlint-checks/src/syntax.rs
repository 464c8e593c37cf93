//! `promql/syntax`: rejects rules whose expression does not parse.

use promlint_parser::Rule;

use crate::check::{Check, CheckMeta};
use crate::context::{CheckContext, Entry};
use crate::problem::{Problem, Severity};

/// Reporter name of the syntax check.
pub const SYNTAX_CHECK_NAME: &str = "promql/syntax";

/// Flags expressions that fail to parse as PromQL.
///
/// Other PromQL-aware checks skip rules with broken expressions, so this
/// is the one place a syntax error turns into a diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxCheck;

impl Check for SyntaxCheck {
    fn reporter(&self) -> &'static str {
        SYNTAX_CHECK_NAME
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
        let Some(expr) = rule.expr() else {
            return Vec::new();
        };
        let Some(err) = &expr.syntax_error else {
            return Vec::new();
        };
        vec![Problem::new(
            expr.value.lines,
            SYNTAX_CHECK_NAME,
            err.to_string(),
            Severity::Fatal,
        )]
    }
}
