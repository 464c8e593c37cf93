//! The check framework: trait, registry, dispatch and suppression.

use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use promlint_parser::{LineRange, Rule, RuleType};

use crate::context::{ChangeType, CheckContext, Entry};
use crate::problem::{Problem, Severity};

/// Reporter used for parse failures surfaced as problems.
pub const YAML_PARSE_REPORTER: &str = "yaml/parse";

/// Reporter used for malformed directive comments.
pub const COMMENT_REPORTER: &str = "promlint/comment";

/// Static facts about a check.
#[derive(Debug, Clone, Copy)]
pub struct CheckMeta {
    /// Which change states the check runs for.
    pub states: &'static [ChangeType],
    /// True when the check talks to a Prometheus server.
    pub online: bool,
}

impl CheckMeta {
    /// Meta for checks that run on anything still present in the file.
    #[must_use]
    pub const fn live_rules(online: bool) -> Self {
        Self {
            states: &[
                ChangeType::Noop,
                ChangeType::Added,
                ChangeType::Modified,
                ChangeType::Moved,
            ],
            online,
        }
    }
}

/// One lint check.
///
/// Checks are held behind this trait by the registry and treated
/// uniformly; a check never learns which other checks exist.
pub trait Check: Send + Sync {
    /// The reporter name problems are filed under, e.g. `promql/series`.
    fn reporter(&self) -> &'static str;

    /// Parameterized display form used by `disable` comments that target
    /// one configured instance, e.g. `promql/series(prom-eu)`.
    fn instance(&self) -> String {
        self.reporter().to_string()
    }

    /// Static facts about this check.
    fn meta(&self) -> CheckMeta;

    /// Runs the check for one rule. `entries` holds every rule in scope so
    /// checks can cross-reference siblings.
    fn check(&self, ctx: &CheckContext, path: &str, rule: &Rule, entries: &[Entry])
        -> Vec<Problem>;
}

/// Restricts a check to a subset of rules, standing in for the config
/// loader's `match` blocks.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    /// Only rules of this type, when set.
    pub rule_type: Option<RuleType>,
    /// Only rules whose name matches, when set.
    pub name: Option<Regex>,
}

impl RuleFilter {
    /// Returns true when `rule` is in scope.
    #[must_use]
    pub fn matches(&self, rule: &Rule) -> bool {
        if let Some(rule_type) = self.rule_type {
            if rule.rule_type() != rule_type {
                return false;
            }
        }
        if let Some(name) = &self.name {
            match rule.name() {
                Some(rule_name) if name.is_match(rule_name) => {}
                _ => return false,
            }
        }
        true
    }
}

struct RegisteredCheck {
    check: Box<dyn Check>,
    filter: Option<RuleFilter>,
}

/// One problem tied to the file it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Source file path.
    pub path: String,
    /// The problem itself.
    pub problem: Problem,
}

/// Everything one linting session produced.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    /// All reports, ordered by path, line, reporter and text.
    pub reports: Vec<Report>,
}

impl Summary {
    /// The worst severity observed, if anything was reported.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.reports.iter().map(|r| r.problem.severity).max()
    }

    /// Exit-code contract: fail when anything fatal exists or any problem
    /// reaches the threshold.
    #[must_use]
    pub fn should_fail(&self, threshold: Severity) -> bool {
        self.reports
            .iter()
            .any(|r| r.problem.severity == Severity::Fatal || r.problem.severity >= threshold)
    }
}

/// Holds every configured check and dispatches rules through them.
#[derive(Default)]
pub struct Registry {
    checks: Vec<RegisteredCheck>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a check that runs for every rule its meta allows.
    pub fn register(&mut self, check: Box<dyn Check>) {
        self.checks.push(RegisteredCheck {
            check,
            filter: None,
        });
    }

    /// Registers a check restricted to rules matching `filter`.
    pub fn register_with_filter(&mut self, check: Box<dyn Check>, filter: RuleFilter) {
        self.checks.push(RegisteredCheck {
            check,
            filter: Some(filter),
        });
    }

    /// Runs all applicable checks for one entry.
    #[must_use]
    pub fn check_entry(&self, ctx: &CheckContext, entry: &Entry, entries: &[Entry]) -> Vec<Problem> {
        let mut problems = builtin_problems(&entry.rule);

        for registered in &self.checks {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let check = registered.check.as_ref();
            if !check.meta().states.contains(&entry.state) {
                continue;
            }
            if let Some(filter) = &registered.filter {
                if !filter.matches(&entry.rule) {
                    continue;
                }
            }
            if is_check_disabled(ctx, &entry.rule, check) {
                debug!(
                    reporter = check.reporter(),
                    path = entry.path.as_str(),
                    "check disabled by comment"
                );
                continue;
            }
            let found = check.check(ctx, &entry.path, &entry.rule, entries);
            problems.extend(found);
        }

        // Comment suppression is the final filter over everything a rule
        // produced, parse problems excluded.
        let matchers = entry.rule.disable_matchers(ctx.now);
        problems.retain(|p| {
            p.reporter == YAML_PARSE_REPORTER || !matchers.contains(&p.reporter.as_str())
        });
        problems
    }

    /// Runs every entry through every applicable check, fanning the work
    /// across up to `workers` threads. Sibling visibility spans the whole
    /// entry set so cross-file references keep working.
    #[must_use]
    pub fn check_all(&self, ctx: &CheckContext, entries: &[Entry], workers: usize) -> Summary {
        let reports: Mutex<Vec<Report>> = Mutex::new(Vec::new());
        let chunk_size = entries.len().div_ceil(workers.max(1)).max(1);
        std::thread::scope(|scope| {
            for chunk in entries.chunks(chunk_size) {
                let reports = &reports;
                scope.spawn(move || {
                    let mut local = Vec::new();
                    for entry in chunk {
                        for problem in self.check_entry(ctx, entry, entries) {
                            local.push(Report {
                                path: entry.path.clone(),
                                problem,
                            });
                        }
                    }
                    reports.lock().extend(local);
                });
            }
        });
        let mut reports = reports.into_inner();
        reports.sort_by(|a, b| {
            (
                &a.path,
                a.problem.lines.first,
                &a.problem.reporter,
                &a.problem.text,
            )
                .cmp(&(
                    &b.path,
                    b.problem.lines.first,
                    &b.problem.reporter,
                    &b.problem.text,
                ))
        });
        Summary { reports }
    }
}

// Parse errors and malformed directives surface as problems before any
// real check runs.
fn builtin_problems(rule: &Rule) -> Vec<Problem> {
    let mut problems = Vec::new();
    for err in rule.errors() {
        problems.push(Problem::new(
            LineRange::single(err.line),
            YAML_PARSE_REPORTER,
            err.error.clone(),
            Severity::Fatal,
        ));
    }
    for err in &rule.comment_errors {
        problems.push(Problem::new(
            LineRange::single(err.line),
            COMMENT_REPORTER,
            err.error.clone(),
            Severity::Warning,
        ));
    }
    problems
}

// A `disable` or unexpired `snooze` comment naming the check's reporter or
// its parameterized instance skips the whole check for this rule.
fn is_check_disabled(ctx: &CheckContext, rule: &Rule, check: &dyn Check) -> bool {
    let instance = check.instance();
    rule.disable_matchers(ctx.now)
        .iter()
        .any(|m| *m == check.reporter() || *m == instance)
}

/// Problems from a file-level parse failure; the file produced no rules.
#[must_use]
pub fn file_error_problem(error: &promlint_parser::ParseError) -> Problem {
    Problem::new(
        LineRange::single(error.line),
        YAML_PARSE_REPORTER,
        error.error.clone(),
        Severity::Fatal,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use promlint_parser::{Parser, ParserMode};

    struct StaticCheck {
        reporter: &'static str,
        severity: Severity,
    }

    impl Check for StaticCheck {
        fn reporter(&self) -> &'static str {
            self.reporter
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
            vec![Problem::new(
                rule.lines,
                self.reporter,
                "static finding",
                self.severity,
            )]
        }
    }

    fn entries_from(content: &str) -> Vec<Entry> {
        Parser::new(ParserMode::Relaxed)
            .parse(content.as_bytes())
            .rules
            .into_iter()
            .map(|rule| Entry::noop("rules.yml", rule))
            .collect()
    }

    #[test]
    fn invalid_rules_produce_fatal_parse_problems() {
        let entries = entries_from("- expr: up\n");
        let registry = Registry::new();
        let ctx = CheckContext::new();
        let problems = registry.check_entry(&ctx, &entries[0], &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].reporter, YAML_PARSE_REPORTER);
        assert_eq!(problems[0].severity, Severity::Fatal);
    }

    #[test]
    fn disable_comment_suppresses_matching_reporter() {
        let entries = entries_from(
            "# promlint disable some/check\n- record: foo\n  expr: up\n",
        );
        let mut registry = Registry::new();
        registry.register(Box::new(StaticCheck {
            reporter: "some/check",
            severity: Severity::Bug,
        }));
        registry.register(Box::new(StaticCheck {
            reporter: "other/check",
            severity: Severity::Bug,
        }));
        let ctx = CheckContext::new();
        let problems = registry.check_entry(&ctx, &entries[0], &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].reporter, "other/check");
    }

    #[test]
    fn suppression_is_idempotent() {
        let entries = entries_from(
            "# promlint disable some/check\n- record: foo\n  expr: up\n",
        );
        let mut registry = Registry::new();
        registry.register(Box::new(StaticCheck {
            reporter: "some/check",
            severity: Severity::Bug,
        }));
        let ctx = CheckContext::new();
        for _ in 0..3 {
            let problems = registry.check_entry(&ctx, &entries[0], &entries);
            assert!(problems.is_empty());
        }
    }

    #[test]
    fn rule_filter_restricts_by_type() {
        let entries = entries_from(
            "- record: foo\n  expr: up\n- alert: Down\n  expr: up == 0\n",
        );
        let mut registry = Registry::new();
        registry.register_with_filter(
            Box::new(StaticCheck {
                reporter: "filtered/check",
                severity: Severity::Warning,
            }),
            RuleFilter {
                rule_type: Some(RuleType::Recording),
                name: None,
            },
        );
        let ctx = CheckContext::new();
        assert_eq!(registry.check_entry(&ctx, &entries[0], &entries).len(), 1);
        assert!(registry.check_entry(&ctx, &entries[1], &entries).is_empty());
    }

    #[test]
    fn check_all_sorts_reports_deterministically() {
        let entries = entries_from(
            "- record: foo\n  expr: up\n- record: bar\n  expr: up\n",
        );
        let mut registry = Registry::new();
        registry.register(Box::new(StaticCheck {
            reporter: "some/check",
            severity: Severity::Warning,
        }));
        let ctx = CheckContext::new();
        let a = registry.check_all(&ctx, &entries, 4);
        let b = registry.check_all(&ctx, &entries, 1);
        assert_eq!(a.reports, b.reports);
        assert_eq!(a.reports.len(), 2);
    }

    #[test]
    fn summary_exit_contract() {
        let mut summary = Summary::default();
        assert!(!summary.should_fail(Severity::Bug));

        summary.reports.push(Report {
            path: "rules.yml".to_string(),
            problem: Problem::new(
                LineRange::single(1),
                "some/check",
                "warn",
                Severity::Warning,
            ),
        });
        assert!(!summary.should_fail(Severity::Bug));
        assert!(summary.should_fail(Severity::Warning));

        summary.reports.push(Report {
            path: "rules.yml".to_string(),
            problem: Problem::new(LineRange::single(1), "yaml/parse", "broken", Severity::Fatal),
        });
        // Fatal fails regardless of threshold.
        assert!(summary.should_fail(Severity::Fatal));
        assert!(summary.should_fail(Severity::Bug));
        assert_eq!(summary.worst_severity(), Some(Severity::Fatal));
    }

    #[test]
    fn cancelled_context_skips_checks() {
        let entries = entries_from("- record: foo\n  expr: up\n");
        let mut registry = Registry::new();
        registry.register(Box::new(StaticCheck {
            reporter: "some/check",
            severity: Severity::Bug,
        }));
        let ctx = CheckContext::new();
        ctx.cancel.cancel();
        assert!(registry.check_entry(&ctx, &entries[0], &entries).is_empty());
    }
}
