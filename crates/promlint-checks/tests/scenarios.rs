//! End-to-end scenarios: file bytes in, reports out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use promlint_checks::{
    AggregateCheck, CheckContext, CostCheck, CostSettings, Entry, Registry, RuleFilter,
    SeriesCheck, SeriesSettings, Severity, SyntaxCheck,
};
use promlint_parser::{Parser, ParserMode, RuleType};
use promlint_promapi::{
    CancelToken, Labels, MetricTimeRange, PrometheusClient, QueryError, QueryResult, QueryStats,
    RangeQueryResult, Sample, SeriesTimeRanges, TimeWindow,
};

/// Canned-response server: queries it wasn't told about fail loudly.
#[derive(Default)]
struct StaticProm {
    name: String,
    uri: String,
    instant: HashMap<String, Vec<f64>>,
    range: HashMap<String, Vec<MetricTimeRange>>,
}

impl StaticProm {
    fn new(name: &str, uri: &str) -> Self {
        Self {
            name: name.to_string(),
            uri: uri.to_string(),
            ..Self::default()
        }
    }

    fn instant(mut self, query: &str, values: &[f64]) -> Self {
        self.instant.insert(query.to_string(), values.to_vec());
        self
    }

    fn range(mut self, query: &str, ranges: Vec<MetricTimeRange>) -> Self {
        self.range.insert(query.to_string(), ranges);
        self
    }
}

impl PrometheusClient for StaticProm {
    fn name(&self) -> &str {
        &self.name
    }

    fn public_uri(&self) -> &str {
        &self.uri
    }

    fn query(&self, _ctx: &CancelToken, expr: &str) -> Result<QueryResult, QueryError> {
        let values = self
            .instant
            .get(expr)
            .ok_or_else(|| QueryError::unknown(format!("unexpected instant query: {expr}")))?;
        Ok(QueryResult {
            uri: self.uri.clone(),
            samples: values
                .iter()
                .map(|v| Sample {
                    labels: Labels::new(),
                    value: *v,
                })
                .collect(),
            stats: QueryStats::default(),
        })
    }

    fn range_query(
        &self,
        _ctx: &CancelToken,
        expr: &str,
        window: &TimeWindow,
    ) -> Result<RangeQueryResult, QueryError> {
        let ranges = self
            .range
            .get(expr)
            .ok_or_else(|| QueryError::unknown(format!("unexpected range query: {expr}")))?;
        Ok(RangeQueryResult {
            uri: self.uri.clone(),
            series: SeriesTimeRanges {
                from: window.start,
                until: window.end,
                step: window.step,
                ranges: ranges.clone(),
                gaps: Vec::new(),
            },
        })
    }
}

fn entries(mode: ParserMode, content: &str) -> Vec<Entry> {
    let file = Parser::new(mode).parse(content.as_bytes());
    assert!(file.error.is_none(), "unexpected file error: {:?}", file.error);
    file.rules
        .into_iter()
        .map(|rule| Entry::noop("rules.yml", rule))
        .collect()
}

#[test]
fn invalid_recording_rule_reports_every_parse_error() {
    let content = "groups:\n\
                   - name: foo\n\
                   \x20 rules:\n\
                   \x20 - record: \"foo bar\"\n\
                   \x20   expr: \"0\"\n\
                   \x20   annotations:\n\
                   \x20     foo: bar\n";
    let entries = entries(ParserMode::Strict, content);
    let registry = Registry::new();
    let ctx = CheckContext::new();
    let summary = registry.check_all(&ctx, &entries, 2);

    assert_eq!(summary.reports.len(), 2);
    for report in &summary.reports {
        assert_eq!(report.problem.reporter, "yaml/parse");
        assert_eq!(report.problem.severity, Severity::Fatal);
        assert_eq!(report.problem.lines.first, 4);
        assert_eq!(report.problem.lines.last, 4);
    }
    let texts: Vec<&str> = summary
        .reports
        .iter()
        .map(|r| r.problem.text.as_str())
        .collect();
    assert!(texts.contains(&"invalid field 'annotations' in recording rule"));
    assert!(texts.contains(&"invalid recording rule name: foo bar"));
    assert!(summary.should_fail(Severity::Bug));
}

#[test]
fn aggregate_check_only_fires_for_matching_recording_rules() {
    let content = "- alert: default-for\n\
                   \x20 expr: foo > 1\n\
                   \x20 for: 1m\n\
                   - record: sum:job\n\
                   \x20 expr: sum(foo)\n\
                   - alert: no-comparison\n\
                   \x20 expr: foo\n";
    let entries = entries(ParserMode::Relaxed, content);

    let mut registry = Registry::new();
    registry.register_with_filter(
        Box::new(AggregateCheck::new(".+", "job", true, Severity::Warning).unwrap()),
        RuleFilter {
            rule_type: Some(RuleType::Recording),
            name: None,
        },
    );
    let ctx = CheckContext::new();
    let summary = registry.check_all(&ctx, &entries, 1);

    assert_eq!(summary.reports.len(), 1);
    let problem = &summary.reports[0].problem;
    assert_eq!(problem.reporter, "promql/aggregate");
    assert_eq!(problem.severity, Severity::Warning);
    assert_eq!(problem.lines.first, 5);
    assert_eq!(
        problem.text,
        "`job` label is required and should be preserved when aggregating `^.+$` rules, use `by(job, ...)`"
    );
}

#[test]
fn series_check_reports_missing_base_metric() {
    let content = "- record: agg\n  expr: sum(foo)\n";
    let entries = entries(ParserMode::Relaxed, content);
    let ctx = CheckContext::new();
    let window_start = ctx.now - Duration::days(7);
    let prom = StaticProm::new("prom", "http://prom.example.com")
        .instant("count(foo)", &[])
        .range(
            "count(up)",
            vec![MetricTimeRange::new(window_start, ctx.now)],
        )
        .range("count(foo)", vec![]);

    let mut registry = Registry::new();
    registry.register(Box::new(SeriesCheck::new(
        Arc::new(prom),
        SeriesSettings::default(),
    )));
    let summary = registry.check_all(&ctx, &entries, 1);

    assert_eq!(summary.reports.len(), 1);
    let problem = &summary.reports[0].problem;
    assert_eq!(problem.severity, Severity::Bug);
    assert!(problem
        .text
        .ends_with("didn't have any series for `foo` metric in the last 1w."));
}

#[test]
fn disable_comment_suppresses_one_selector_only() {
    let content = "# promlint disable promql/series(foo)\n\
                   - record: agg\n\
                   \x20 expr: foo + bar\n";
    let entries = entries(ParserMode::Relaxed, content);
    let ctx = CheckContext::new();
    let prom = StaticProm::new("prom", "http://prom.example.com")
        .instant("count(bar)", &[])
        .range("count(up)", vec![])
        .range("count(bar)", vec![]);

    let mut registry = Registry::new();
    registry.register(Box::new(SeriesCheck::new(
        Arc::new(prom),
        SeriesSettings::default(),
    )));
    let summary = registry.check_all(&ctx, &entries, 1);

    assert_eq!(summary.reports.len(), 1);
    assert!(summary.reports[0].problem.text.contains("`bar`"));
}

#[test]
fn full_registry_over_a_healthy_file_is_quiet() {
    let content = "groups:\n\
                   - name: node\n\
                   \x20 rules:\n\
                   \x20 - record: job:up:count\n\
                   \x20   expr: count(up) by(job)\n";
    let entries = entries(ParserMode::Strict, content);
    let ctx = CheckContext::new();
    let prom = Arc::new(
        StaticProm::new("prom", "http://prom.example.com")
            .instant("count(up)", &[12.0])
            .instant("count(count(up) by(job))", &[3.0]),
    );

    let mut registry = Registry::new();
    registry.register(Box::new(SyntaxCheck));
    registry.register(Box::new(SeriesCheck::new(
        prom.clone(),
        SeriesSettings::default(),
    )));
    registry.register(Box::new(CostCheck::new(
        prom,
        CostSettings::default(),
        Severity::Bug,
    )));
    let summary = registry.check_all(&ctx, &entries, 2);

    // query/cost always reports cardinality, at information level.
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].problem.severity, Severity::Information);
    assert!(!summary.should_fail(Severity::Bug));
    assert_eq!(summary.worst_severity(), Some(Severity::Information));
}

#[test]
fn identical_inputs_produce_identical_reports() {
    let content = "- record: a\n  expr: up\n- record: b\n  expr: up\n- alert: c\n  expr: up == 0\n";
    let run = || {
        let entries = entries(ParserMode::Relaxed, content);
        let ctx = CheckContext::new();
        let mut registry = Registry::new();
        registry.register(Box::new(SyntaxCheck));
        registry.register_with_filter(
            Box::new(AggregateCheck::new(".+", "job", true, Severity::Warning).unwrap()),
            RuleFilter::default(),
        );
        registry.check_all(&ctx, &entries, 3)
    };
    let a = run();
    let b = run();
    assert_eq!(a.reports, b.reports);
}
