//! `query/cost`: reports how expensive a query is to run.
//!
//! Wraps the rule's expression in `count(...)`, reports the resulting
//! cardinality, and compares server-side execution statistics against the
//! configured limits. The memory estimate is measured, not configured: a
//! second query against the same server derives its current
//! bytes-per-sample ratio, and no estimate is attached when that probe
//! returns nothing.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use promlint_parser::Rule;
use promlint_promapi::{humanize_duration, PrometheusClient};

use crate::check::{Check, CheckMeta};
use crate::context::{query_error_text_and_severity, CheckContext, Entry};
use crate::problem::{Problem, Severity};

/// Reporter name of the cost check.
pub const COST_CHECK_NAME: &str = "query/cost";

/// Query used to measure the server's bytes-per-sample ratio: allocated
/// memory averaged over the number of series in the TSDB head.
pub const BYTES_PER_SAMPLE_QUERY: &str =
    "avg(avg_over_time(go_memstats_alloc_bytes[2h]) / avg_over_time(prometheus_tsdb_head_series[2h]))";

/// Limits for the cost check; unset limits are not enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostSettings {
    /// Maximum number of series the query may return.
    pub max_series: Option<i64>,
    /// Maximum total samples the server may touch.
    pub max_total_samples: Option<i64>,
    /// Maximum peak samples held in memory.
    pub max_peak_samples: Option<i64>,
    /// Maximum evaluation wall time.
    pub max_evaluation_duration: Option<Duration>,
}

/// Measures query cost against one Prometheus server.
pub struct CostCheck {
    prom: Arc<dyn PrometheusClient>,
    settings: CostSettings,
    severity: Severity,
}

impl CostCheck {
    /// Creates a cost check; `severity` is used for exceeded limits.
    #[must_use]
    pub fn new(prom: Arc<dyn PrometheusClient>, settings: CostSettings, severity: Severity) -> Self {
        Self {
            prom,
            settings,
            severity,
        }
    }

    fn prom_text(&self, uri: &str) -> String {
        format!("`{}` Prometheus server at {}", self.prom.name(), uri)
    }

    // Live bytes-per-sample probe; `None` when the server can't answer or
    // has no data for it.
    fn bytes_per_sample(&self, ctx: &CheckContext) -> Option<f64> {
        match self.prom.query(&ctx.cancel, BYTES_PER_SAMPLE_QUERY) {
            Ok(result) => result.samples.first().map(|s| s.value),
            Err(err) => {
                debug!(
                    check = COST_CHECK_NAME,
                    error = %err,
                    "cannot estimate memory usage, bytes-per-sample query failed"
                );
                None
            }
        }
    }
}

impl Check for CostCheck {
    fn reporter(&self) -> &'static str {
        COST_CHECK_NAME
    }

    fn instance(&self) -> String {
        format!("{}({})", COST_CHECK_NAME, self.prom.name())
    }

    fn meta(&self) -> CheckMeta {
        CheckMeta::live_rules(true)
    }

    fn check(
        &self,
        ctx: &CheckContext,
        _path: &str,
        rule: &Rule,
        _entries: &[Entry],
    ) -> Vec<Problem> {
        let Some(expr) = rule.expr() else {
            return Vec::new();
        };
        if expr.syntax_error.is_some() {
            return Vec::new();
        }

        let query = format!("count({})", expr.value.value);
        let result = match self.prom.query(&ctx.cancel, &query) {
            Ok(result) => result,
            Err(err) => {
                let (text, severity) = query_error_text_and_severity(
                    COST_CHECK_NAME,
                    self.prom.name(),
                    self.prom.public_uri(),
                    &err,
                );
                return vec![Problem::new(expr.value.lines, COST_CHECK_NAME, text, severity)];
            }
        };

        let mut problems = Vec::new();
        let series = result.series_count();
        let mut text = format!(
            "{} returned {} result(s)",
            self.prom_text(&result.uri),
            series
        );
        let mut severity = Severity::Information;
        if let Some(bps) = self.bytes_per_sample(ctx) {
            let estimate = (bps * series.max(0) as f64) as u64;
            text.push_str(&format!(
                " with {} estimated memory usage",
                humanize_bytes(estimate)
            ));
        }
        if let Some(max_series) = self.settings.max_series {
            if series > max_series {
                text.push_str(&format!(", maximum allowed series is {max_series}"));
                severity = self.severity;
            }
        }
        text.push('.');
        problems.push(Problem::new(expr.value.lines, COST_CHECK_NAME, text, severity));

        let stats = result.stats;
        if let Some(limit) = self.settings.max_evaluation_duration {
            if stats.eval_duration > limit {
                problems.push(Problem::new(
                    expr.value.lines,
                    COST_CHECK_NAME,
                    format!(
                        "{} took {} when executing this query, which is more than the configured limit of {}.",
                        self.prom_text(&result.uri),
                        humanize_duration(stats.eval_duration),
                        humanize_duration(limit),
                    ),
                    self.severity,
                ));
            }
        }
        if let Some(limit) = self.settings.max_total_samples {
            if stats.total_samples > limit {
                problems.push(Problem::new(
                    expr.value.lines,
                    COST_CHECK_NAME,
                    format!(
                        "{} queried {} samples in total when executing this query, which is more than the configured limit of {}.",
                        self.prom_text(&result.uri),
                        stats.total_samples,
                        limit,
                    ),
                    self.severity,
                ));
            }
        }
        if let Some(limit) = self.settings.max_peak_samples {
            if stats.peak_samples > limit {
                problems.push(Problem::new(
                    expr.value.lines,
                    COST_CHECK_NAME,
                    format!(
                        "{} queried {} peak samples when executing this query, which is more than the configured limit of {}.",
                        self.prom_text(&result.uri),
                        stats.peak_samples,
                        limit,
                    ),
                    self.severity,
                ));
            }
        }
        problems
    }
}

// Binary (IEC) byte formatting: 707B, 4.0KiB, 7.0MiB.
fn humanize_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{parse_entries, ScriptedProm};
    use promlint_promapi::QueryError;

    fn check_with(prom: ScriptedProm, settings: CostSettings) -> Vec<Problem> {
        let entries = parse_entries("- record: foo\n  expr: sum(foo)\n");
        let check = CostCheck::new(Arc::new(prom), settings, Severity::Bug);
        let ctx = CheckContext::new();
        check.check(&ctx, "rules.yml", &entries[0].rule, &entries)
    }

    #[test]
    fn reports_result_count_as_information() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant("count(sum(foo))", &[7.0]);
        prom.instant(BYTES_PER_SAMPLE_QUERY, &[]);
        let problems = check_with(prom, CostSettings::default());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Information);
        assert_eq!(
            problems[0].text,
            "`prom` Prometheus server at http://prom.example.com returned 7 result(s)."
        );
        assert_eq!(problems[0].lines.first, 2);
    }

    #[test]
    fn memory_estimate_comes_from_the_live_probe() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant("count(sum(foo))", &[7.0]);
        prom.instant(BYTES_PER_SAMPLE_QUERY, &[101.0]);
        let problems = check_with(prom, CostSettings::default());
        assert_eq!(
            problems[0].text,
            "`prom` Prometheus server at http://prom.example.com returned 7 result(s) with 707B estimated memory usage."
        );
    }

    #[test]
    fn memory_estimate_uses_binary_units() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant("count(sum(foo))", &[7.0]);
        prom.instant(BYTES_PER_SAMPLE_QUERY, &[1024.0 * 1024.0]);
        let problems = check_with(prom, CostSettings::default());
        assert!(problems[0]
            .text
            .contains("with 7.0MiB estimated memory usage"));
    }

    #[test]
    fn empty_bytes_per_sample_response_skips_the_estimate() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant("count(sum(foo))", &[1.0]);
        prom.instant(BYTES_PER_SAMPLE_QUERY, &[]);
        let problems = check_with(prom, CostSettings::default());
        assert!(!problems[0].text.contains("estimated memory usage"));
    }

    #[test]
    fn failed_bytes_per_sample_query_skips_the_estimate() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant("count(sum(foo))", &[7.0]);
        prom.fail_instant(
            BYTES_PER_SAMPLE_QUERY,
            QueryError::unknown("server_error: internal error"),
        );
        let problems = check_with(prom, CostSettings::default());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Information);
        assert!(!problems[0].text.contains("estimated memory usage"));
    }

    #[test]
    fn exceeding_max_series_escalates() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant("count(sum(foo))", &[7.0]);
        prom.instant(BYTES_PER_SAMPLE_QUERY, &[1024.0]);
        let settings = CostSettings {
            max_series: Some(1),
            ..CostSettings::default()
        };
        let problems = check_with(prom, settings);
        assert_eq!(problems[0].severity, Severity::Bug);
        assert_eq!(
            problems[0].text,
            "`prom` Prometheus server at http://prom.example.com returned 7 result(s) with 7.0KiB estimated memory usage, maximum allowed series is 1."
        );
    }

    #[test]
    fn stats_limits_produce_their_own_problems() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.instant_with_stats(
            "count(sum(foo))",
            &[1.0],
            Duration::seconds(8),
            200_000,
            40_000,
        );
        prom.instant(BYTES_PER_SAMPLE_QUERY, &[]);
        let settings = CostSettings {
            max_total_samples: Some(100_000),
            max_peak_samples: Some(30_000),
            max_evaluation_duration: Some(Duration::seconds(5)),
            ..CostSettings::default()
        };
        let problems = check_with(prom, settings);
        assert_eq!(problems.len(), 4);
        assert!(problems[1].text.contains("took 8s"));
        assert!(problems[2].text.contains("200000 samples in total"));
        assert!(problems[3].text.contains("40000 peak samples"));
    }

    #[test]
    fn query_errors_use_the_shared_severity_mapping() {
        let mut prom = ScriptedProm::new("prom", "http://prom.example.com");
        prom.fail_instant("count(sum(foo))", QueryError::timeout("deadline exceeded"));
        let problems = check_with(prom, CostSettings::default());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
    }

    #[test]
    fn syntax_errors_are_skipped() {
        let entries = parse_entries("- record: foo\n  expr: sum(foo) without(\n");
        let prom = ScriptedProm::new("prom", "http://prom.example.com");
        let check = CostCheck::new(Arc::new(prom), CostSettings::default(), Severity::Bug);
        let ctx = CheckContext::new();
        assert!(check
            .check(&ctx, "rules.yml", &entries[0].rule, &entries)
            .is_empty());
    }

    #[test]
    fn humanize_bytes_uses_iec_suffixes() {
        assert_eq!(humanize_bytes(707), "707B");
        assert_eq!(humanize_bytes(4096), "4.0KiB");
        assert_eq!(humanize_bytes(7 * 1024), "7.0KiB");
        assert_eq!(humanize_bytes(7 * 1024 * 1024), "7.0MiB");
        assert_eq!(humanize_bytes(1024 * 1024 * 1024), "1.0GiB");
    }
}
