//! `promql/series`: does every queried metric actually exist?
//!
//! For each vector selector in a rule's expression this check classifies
//! the metric's presence on the configured Prometheus server: never seen,
//! recently disappeared, missing one of the queried labels, missing a
//! specific label value, or only intermittently present. Historical
//! presence is read through range queries over a lookback window and
//! compared against the server's own uptime metric so that server
//! downtime is never mistaken for a missing series.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::{debug, warn};

use promlint_parser::{PromQLExpr, Rule};
use promlint_promapi::{
    avg_life, humanize_duration, newest, oldest, overlaps, parse_duration, MetricTimeRange,
    PrometheusClient, QueryError, SeriesTimeRanges, TimeWindow,
};
use promlint_promql::{
    parse_selector, selectors, LabelMatcher, MatchOp, VectorSelector, METRIC_NAME_LABEL,
};

use crate::check::{Check, CheckMeta};
use crate::context::{query_error_text_and_severity, CheckContext, Entry};
use crate::error::ConfigError;
use crate::problem::{Problem, Severity};

/// Reporter name of the series check.
pub const SERIES_CHECK_NAME: &str = "promql/series";

const RULE_PROVIDED_DETAILS: &str = "One of the rules in this set generates the metric \
this query needs. The series check is skipped here to avoid false positives, but that \
doesn't guarantee the query is correct; deploy the rules that generate the needed time \
series before the rules that consume them.";

const COMMON_PROBLEM_DETAILS: &str = "This could be caused by a typo in the metric name, \
a missing scrape job, a failing exporter, or a metric that was never present on this \
Prometheus server.";

const MIN_AGE_DETAILS: &str = "A rule-set comment configures how long a metric can be \
missing before this check reports it, but its duration doesn't parse.";

/// Settings of the series check.
#[derive(Debug, Clone)]
pub struct SeriesSettings {
    /// How far back presence history is inspected.
    pub lookback_range: Duration,
    /// Resolution of the history queries.
    pub lookback_step: Duration,
    /// Metric-name patterns whose problems are floored to warnings.
    pub ignore_metrics: Vec<String>,
    ignore_res: Vec<Regex>,
}

impl Default for SeriesSettings {
    fn default() -> Self {
        Self {
            lookback_range: Duration::days(7),
            lookback_step: Duration::minutes(5),
            ignore_metrics: Vec::new(),
            ignore_res: Vec::new(),
        }
    }
}

impl SeriesSettings {
    /// Creates validated settings; every ignore pattern is anchored and
    /// compiled here so bad patterns fail configuration, not checking.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable pattern.
    pub fn new(
        lookback_range: Duration,
        lookback_step: Duration,
        ignore_metrics: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let mut ignore_res = Vec::with_capacity(ignore_metrics.len());
        for pattern in &ignore_metrics {
            let re = Regex::new(&format!("^{pattern}$")).map_err(|source| {
                ConfigError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            ignore_res.push(re);
        }
        Ok(Self {
            lookback_range,
            lookback_step,
            ignore_metrics,
            ignore_res,
        })
    }

    /// Creates settings from raw configuration strings
    /// (`lookbackRange`, `lookbackStep`, `ignoreMetrics`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for bad durations or patterns.
    pub fn from_config(
        lookback_range: Option<&str>,
        lookback_step: Option<&str>,
        ignore_metrics: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let range = match lookback_range {
            Some(value) => {
                parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
                    field: "lookbackRange",
                    source,
                })?
            }
            None => Duration::days(7),
        };
        let step = match lookback_step {
            Some(value) => {
                parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
                    field: "lookbackStep",
                    source,
                })?
            }
            None => Duration::minutes(5),
        };
        Self::new(range, step, ignore_metrics)
    }
}

/// The series check bound to one Prometheus server.
pub struct SeriesCheck {
    prom: Arc<dyn PrometheusClient>,
    settings: SeriesSettings,
}

impl SeriesCheck {
    /// Creates the check.
    #[must_use]
    pub fn new(prom: Arc<dyn PrometheusClient>, settings: SeriesSettings) -> Self {
        Self { prom, settings }
    }

    fn prom_text(&self, uri: &str) -> String {
        format!("`{}` Prometheus server at {}", self.prom.name(), uri)
    }

    fn since_desc(&self, now: DateTime<Utc>, t: DateTime<Utc>) -> String {
        let elapsed = now - t;
        let rounded = if elapsed > Duration::hours(24) {
            round_duration(elapsed, Duration::hours(1))
        } else {
            round_duration(elapsed, Duration::minutes(1))
        };
        humanize_duration(rounded)
    }

    fn query_problem(&self, err: &QueryError, expr: &PromQLExpr) -> Problem {
        let (text, severity) = query_error_text_and_severity(
            SERIES_CHECK_NAME,
            self.prom.name(),
            self.prom.public_uri(),
            err,
        );
        Problem::new(expr.value.lines, SERIES_CHECK_NAME, text, severity)
    }

    fn instant_series_count(
        &self,
        ctx: &CheckContext,
        query: &str,
    ) -> Result<i64, QueryError> {
        let result = self.prom.query(&ctx.cancel, query)?;
        Ok(result.series_count())
    }

    // Applies the ignoreMetrics rewrite: matching metrics keep the text
    // annotated and the severity floored to Warning.
    fn text_and_severity(&self, name: &str, text: String, severity: Severity) -> (String, Severity) {
        for re in &self.settings.ignore_res {
            if !name.is_empty() && re.is_match(name) {
                debug!(
                    check = SERIES_CHECK_NAME,
                    metric = name,
                    regexp = re.as_str(),
                    "metric matches check ignore rules"
                );
                return (
                    format!(
                        "{text} Metric name `{name}` matches `{SERIES_CHECK_NAME}` check ignore regexp `{re}`."
                    ),
                    Severity::Warning,
                );
            }
        }
        (text, severity)
    }

    // `disable`/unexpired `snooze` comments can name a selector:
    // `promql/series(foo)` by full text, bare name, or matcher subset.
    fn is_disabled(&self, ctx: &CheckContext, rule: &Rule, selector: &VectorSelector) -> bool {
        let prefix = format!("{SERIES_CHECK_NAME}(");
        let selector_text = selector.to_string();
        for matcher in rule.disable_matchers(ctx.now) {
            let Some(inner) = matcher
                .strip_prefix(prefix.as_str())
                .and_then(|m| m.strip_suffix(')'))
            else {
                continue;
            };
            if inner == selector_text || inner == selector.name {
                return true;
            }
            if let Ok(matchers) = parse_selector(inner) {
                if selector.contains_matchers(&matchers) {
                    return true;
                }
            }
        }
        false
    }

    // The `min-age` override for disappeared-series problems; defaults to
    // two hours. A malformed duration is reported but never aborts.
    fn min_age(
        &self,
        rule: &Rule,
        selector: &VectorSelector,
        bare: &str,
    ) -> (Duration, Vec<Problem>) {
        let mut min_age = Duration::hours(2);
        let mut problems = Vec::new();
        let prefixes = [
            format!("{SERIES_CHECK_NAME} min-age "),
            format!("{SERIES_CHECK_NAME}({bare}) min-age "),
            format!("{SERIES_CHECK_NAME}({selector}) min-age "),
        ];
        for value in rule.rule_set_values() {
            for prefix in &prefixes {
                let Some(raw) = value.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                match parse_duration(raw.trim()) {
                    Ok(duration) => min_age = duration,
                    Err(err) => problems.push(
                        Problem::new(
                            rule.lines,
                            SERIES_CHECK_NAME,
                            format!("failed to parse min-age comment as duration: {err}"),
                            Severity::Warning,
                        )
                        .with_details(MIN_AGE_DETAILS),
                    ),
                }
            }
        }
        (min_age, problems)
    }

    fn is_label_value_ignored(
        &self,
        rule: &Rule,
        selector: &VectorSelector,
        bare: &str,
        label: &str,
    ) -> bool {
        let wanted = [
            format!("{SERIES_CHECK_NAME} ignore/label-value {label}"),
            format!("{SERIES_CHECK_NAME}({bare}) ignore/label-value {label}"),
            format!("{SERIES_CHECK_NAME}({selector}) ignore/label-value {label}"),
        ];
        rule.rule_set_values()
            .iter()
            .any(|value| wanted.iter().any(|w| w == value))
    }

    // Cross-server absence report: which other configured servers do have
    // the metric this one is missing.
    fn check_other_servers(&self, ctx: &CheckContext, query: &str) -> String {
        if ctx.servers.is_empty() {
            return COMMON_PROBLEM_DETAILS.to_string();
        }
        let mut out = format!("`{query}` was found on other Prometheus servers:\n\n");
        let mut matches = 0;
        for server in &ctx.servers {
            if server.name() == self.prom.name() {
                continue;
            }
            debug!(
                check = SERIES_CHECK_NAME,
                selector = query,
                server = server.name(),
                "checking if metric exists on other servers"
            );
            let Ok(result) = server.query(&ctx.cancel, &format!("count({query})")) else {
                continue;
            };
            if result.series_count() > 0 {
                matches += 1;
                out.push_str(&format!(
                    "- [{}]({}/graph?g0.expr={})\n",
                    server.name(),
                    server.public_uri(),
                    query
                ));
            }
        }
        if matches == 0 {
            return COMMON_PROBLEM_DETAILS.to_string();
        }
        out.push_str("\nYou might be trying to deploy this rule to the wrong Prometheus server instance.\n");
        out
    }

    fn uptime_series(&self, ctx: &CheckContext, window: &TimeWindow) -> SeriesTimeRanges {
        let query = format!("count({})", self.prom.uptime_metric());
        match self.prom.range_query(&ctx.cancel, &query, window) {
            Ok(result) if !result.series.ranges.is_empty() => result.series,
            Ok(_) => {
                warn!(
                    name = self.prom.name(),
                    metric = self.prom.uptime_metric(),
                    "no results for the uptime metric, using synthetic always-up ranges"
                );
                SeriesTimeRanges::always_up(window)
            }
            Err(err) => {
                warn!(
                    name = self.prom.name(),
                    error = %err,
                    "cannot detect Prometheus uptime gaps, using synthetic always-up ranges"
                );
                SeriesTimeRanges::always_up(window)
            }
        }
    }
}

impl Check for SeriesCheck {
    fn reporter(&self) -> &'static str {
        SERIES_CHECK_NAME
    }

    fn instance(&self) -> String {
        format!("{}({})", SERIES_CHECK_NAME, self.prom.name())
    }

    fn meta(&self) -> CheckMeta {
        CheckMeta::live_rules(true)
    }

    #[allow(clippy::too_many_lines)]
    fn check(
        &self,
        ctx: &CheckContext,
        _path: &str,
        rule: &Rule,
        entries: &[Entry],
    ) -> Vec<Problem> {
        let mut problems = Vec::new();
        let Some(expr) = rule.expr() else {
            return problems;
        };
        if expr.syntax_error.is_some() {
            return problems;
        }
        let Some(query) = &expr.query else {
            return problems;
        };

        let window = TimeWindow {
            start: ctx.now - self.settings.lookback_range,
            end: ctx.now,
            step: self.settings.lookback_step,
        };
        let step = self.settings.lookback_step;

        let mut done: HashSet<String> = HashSet::new();
        for selector in selectors(query) {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let selector_text = selector.to_string();
            if !done.insert(selector_text.clone()) {
                continue;
            }
            if self.is_disabled(ctx, rule, &selector) {
                continue;
            }

            let mut metric_name = selector.name.clone();
            if metric_name.is_empty() {
                if let Some(lm) = selector.equality_matcher(METRIC_NAME_LABEL) {
                    metric_name = lm.value.clone();
                }
            }

            // Step 0: ALERTS series come from alerting rules, not scrapes;
            // resolve the alertname against the rule set instead.
            if metric_name == "ALERTS" || metric_name == "ALERTS_FOR_STATE" {
                if let Some(alertname) = selector.equality_matcher("alertname") {
                    let known = entries.iter().any(|entry| {
                        entry
                            .rule
                            .alerting()
                            .is_some_and(|ar| ar.alert.value == alertname.value)
                    });
                    if known {
                        debug!(selector = selector_text.as_str(), "metric is provided by alerting rule");
                    } else {
                        problems.push(
                            Problem::new(
                                expr.value.lines,
                                SERIES_CHECK_NAME,
                                format!(
                                    "`{selector_text}` metric is generated by alerts but didn't found any rule named `{}`.",
                                    alertname.value
                                ),
                                Severity::Bug,
                            )
                            .with_details(COMMON_PROBLEM_DETAILS),
                        );
                    }
                }
                continue;
            }

            let label_names = selector.label_names();

            // Step 1: if the exact selector matches anything right now
            // there is nothing to report.
            debug!(check = SERIES_CHECK_NAME, selector = selector_text.as_str(), "checking if selector returns anything");
            match self.instant_series_count(ctx, &format!("count({selector_text})")) {
                Err(err) => {
                    problems.push(self.query_problem(&err, expr));
                    continue;
                }
                Ok(count) if count > 0 => {
                    debug!(
                        check = SERIES_CHECK_NAME,
                        selector = selector_text.as_str(),
                        "found series, skipping further checks"
                    );
                    continue;
                }
                Ok(_) => {}
            }

            // Step 2: uptime ranges are the ground truth for gap
            // detection; fall back to an always-up window when absent.
            let uptime = self.uptime_series(ctx, &window);

            let bare = selector.strip_labels();
            let bare_text = bare.to_string();

            // Step 3: was the base metric ever there?
            debug!(check = SERIES_CHECK_NAME, selector = bare_text.as_str(), "checking base metric history");
            let mut base = match self
                .prom
                .range_query(&ctx.cancel, &format!("count({bare_text})"), &window)
            {
                Ok(result) => result,
                Err(err) => {
                    problems.push(self.query_problem(&err, expr));
                    continue;
                }
            };
            let (from, until) = (base.series.from, base.series.until);
            base.series.find_gaps(&uptime, from, until);

            if base.series.ranges.is_empty() {
                let provider = entries.iter().find(|entry| {
                    entry
                        .rule
                        .recording()
                        .is_some_and(|rr| rr.record.value == bare_text)
                });
                if provider.is_some() {
                    debug!(selector = bare_text.as_str(), "metric is provided by recording rule");
                    problems.push(
                        Problem::new(
                            expr.value.lines,
                            SERIES_CHECK_NAME,
                            format!(
                                "{} didn't have any series for `{}` metric in the last {} but found recording rule that generates it, skipping further checks.",
                                self.prom_text(&base.uri),
                                bare_text,
                                self.since_desc(ctx.now, base.series.from),
                            ),
                            Severity::Information,
                        )
                        .with_details(RULE_PROVIDED_DETAILS),
                    );
                    continue;
                }

                let (text, severity) = self.text_and_severity(
                    &bare_text,
                    format!(
                        "{} didn't have any series for `{}` metric in the last {}.",
                        self.prom_text(&base.uri),
                        bare_text,
                        self.since_desc(ctx.now, base.series.from),
                    ),
                    Severity::Bug,
                );
                let details = self.check_other_servers(ctx, &selector_text);
                problems.push(
                    Problem::new(expr.value.lines, SERIES_CHECK_NAME, text, severity)
                        .with_details(details),
                );
                continue;
            }

            // Step 4: the metric exists but maybe never with one of the
            // labels the query filters on.
            let before_label_checks = problems.len();
            for name in &label_names {
                let mut probe = selector.strip_labels();
                probe
                    .matchers
                    .push(LabelMatcher::new((*name).to_string(), MatchOp::Regexp, ".+"));
                debug!(
                    check = SERIES_CHECK_NAME,
                    selector = %probe,
                    label = name,
                    "checking if base metric has series with required label"
                );
                let mut absent = match self.prom.range_query(
                    &ctx.cancel,
                    &format!("absent({probe})"),
                    &window,
                ) {
                    Ok(result) => result,
                    Err(err) => {
                        problems.push(self.query_problem(&err, expr));
                        continue;
                    }
                };
                absent.series.find_gaps(&uptime, from, until);

                let absent_inside_series_range = absent.series.ranges.iter().any(|lr| {
                    base.series
                        .ranges
                        .iter()
                        .any(|sr| overlaps(lr, sr, absent.series.step).is_some())
                });
                if !absent_inside_series_range {
                    continue;
                }

                if absent.series.ranges.len() == 1 && absent.series.gaps.is_empty() {
                    problems.push(
                        Problem::new(
                            expr.value.lines,
                            SERIES_CHECK_NAME,
                            format!(
                                "{} has `{}` metric but there are no series with `{}` label in the last {}.",
                                self.prom_text(&absent.uri),
                                bare_text,
                                name,
                                self.since_desc(ctx.now, absent.series.from),
                            ),
                            Severity::Bug,
                        )
                        .with_details(COMMON_PROBLEM_DETAILS),
                    );
                }
            }
            if problems.len() > before_label_checks {
                continue;
            }

            // Step 5: the metric was always there but disappeared long
            // enough ago to be past the configured min-age.
            if base.series.ranges.len() == 1 {
                if let (Some(first_seen), Some(last_seen)) =
                    (oldest(&base.series.ranges), newest(&base.series.ranges))
                {
                    if first_seen <= from + step && last_seen < until - step {
                        let (min_age, mut age_problems) = self.min_age(rule, &selector, &bare_text);
                        problems.append(&mut age_problems);

                        if last_seen >= until - min_age {
                            debug!(
                                check = SERIES_CHECK_NAME,
                                selector = selector_text.as_str(),
                                min_age = %humanize_duration(min_age),
                                "series disappeared for less than the configured min-age"
                            );
                            continue;
                        }

                        let (text, severity) = self.text_and_severity(
                            &bare_text,
                            format!(
                                "{} doesn't currently have `{}`, it was last present {} ago.",
                                self.prom_text(&base.uri),
                                bare_text,
                                self.since_desc(ctx.now, last_seen),
                            ),
                            Severity::Bug,
                        );
                        problems.push(
                            Problem::new(expr.value.lines, SERIES_CHECK_NAME, text, severity)
                                .with_details(COMMON_PROBLEM_DETAILS),
                        );
                        continue;
                    }
                }
            }

            // Step 6: the metric exists, so probe each label matcher the
            // query uses.
            let before_matcher_checks = problems.len();
            for lm in &selector.matchers {
                if lm.is_name_matcher() {
                    continue;
                }
                if !matches!(lm.op, MatchOp::Equal | MatchOp::Regexp) {
                    continue;
                }
                if self.is_label_value_ignored(rule, &selector, &bare_text, &lm.name) {
                    debug!(
                        selector = selector_text.as_str(),
                        label = lm.name.as_str(),
                        "label check disabled by comment"
                    );
                    continue;
                }
                let mut probe = VectorSelector {
                    name: metric_name.clone(),
                    matchers: vec![lm.clone()],
                };
                probe.ensure_name_matcher(&selector.matchers);
                debug!(
                    check = SERIES_CHECK_NAME,
                    selector = %probe,
                    matcher = %lm,
                    "checking if there are series matching the filter"
                );
                let mut labelled = match self.prom.range_query(
                    &ctx.cancel,
                    &format!("count({probe})"),
                    &window,
                ) {
                    Ok(result) => result,
                    Err(err) => {
                        problems.push(self.query_problem(&err, expr));
                        continue;
                    }
                };
                labelled.series.find_gaps(&uptime, from, until);

                // Step 6a: no series ever matched this matcher.
                if labelled.series.ranges.is_empty() {
                    let (text, severity) = self.text_and_severity(
                        &bare_text,
                        format!(
                            "{} has `{}` metric with `{}` label but there are no series matching `{{{}}}` in the last {}.",
                            self.prom_text(&labelled.uri),
                            bare_text,
                            lm.name,
                            lm,
                            self.since_desc(ctx.now, base.series.from),
                        ),
                        Severity::Bug,
                    );
                    problems.push(
                        Problem::new(expr.value.lines, SERIES_CHECK_NAME, text, severity)
                            .with_details(COMMON_PROBLEM_DETAILS),
                    );
                    continue;
                }

                // Step 6b: matching series used to be there but vanished,
                // and not just because the base metric itself had a gap.
                if labelled.series.ranges.len() == 1 {
                    if let (Some(first_seen), Some(last_seen)) = (
                        oldest(&labelled.series.ranges),
                        newest(&labelled.series.ranges),
                    ) {
                        if first_seen <= from + step && last_seen < until - step {
                            let gap_outside_base = labelled.series.gaps.iter().any(|lg| {
                                let gap_range = MetricTimeRange::new(lg.start, lg.end);
                                !base.series.gaps.iter().any(|bg| {
                                    let base_gap = MetricTimeRange::new(bg.start, bg.end);
                                    overlaps(&gap_range, &base_gap, base.series.step).is_some()
                                })
                            });
                            if !gap_outside_base {
                                continue;
                            }

                            let (min_age, mut age_problems) =
                                self.min_age(rule, &selector, &bare_text);
                            problems.append(&mut age_problems);

                            if last_seen >= until - min_age {
                                debug!(
                                    check = SERIES_CHECK_NAME,
                                    selector = selector_text.as_str(),
                                    matcher = %lm,
                                    "series disappeared for less than the configured min-age"
                                );
                                continue;
                            }

                            let (text, severity) = self.text_and_severity(
                                &bare_text,
                                format!(
                                    "{} has `{}` metric but doesn't currently have series matching `{{{}}}`, such series was last present {} ago.",
                                    self.prom_text(&base.uri),
                                    bare_text,
                                    lm,
                                    self.since_desc(ctx.now, last_seen),
                                ),
                                Severity::Bug,
                            );
                            problems.push(
                                Problem::new(expr.value.lines, SERIES_CHECK_NAME, text, severity)
                                    .with_details(COMMON_PROBLEM_DETAILS),
                            );
                            continue;
                        }
                    }
                }

                // Step 6c: matching series come and go.
                if labelled.series.ranges.len() > 1 && !labelled.series.gaps.is_empty() {
                    problems.push(
                        Problem::new(
                            expr.value.lines,
                            SERIES_CHECK_NAME,
                            format!(
                                "Metric `{}` with label `{{{}}}` is only sometimes present on {} with average life span of {}.",
                                bare_text,
                                lm,
                                self.prom_text(&base.uri),
                                humanize_duration(avg_life(&labelled.series.ranges)),
                            ),
                            Severity::Warning,
                        )
                        .with_details(COMMON_PROBLEM_DETAILS),
                    );
                }
            }
            if problems.len() > before_matcher_checks {
                continue;
            }

            // Step 7: nothing specific fired, but the base metric itself
            // is intermittent.
            if !base.series.ranges.is_empty() && !base.series.gaps.is_empty() {
                problems.push(
                    Problem::new(
                        expr.value.lines,
                        SERIES_CHECK_NAME,
                        format!(
                            "Metric `{}` is only sometimes present on {} with average life span of {} in the last {}.",
                            bare_text,
                            self.prom_text(&base.uri),
                            humanize_duration(avg_life(&base.series.ranges)),
                            self.since_desc(ctx.now, base.series.from),
                        ),
                        Severity::Warning,
                    )
                    .with_details(COMMON_PROBLEM_DETAILS),
                );
            }
        }

        problems
    }
}

fn round_duration(d: Duration, unit: Duration) -> Duration {
    let unit_secs = unit.num_seconds();
    if unit_secs <= 0 {
        return d;
    }
    let secs = d.num_seconds();
    let rounded = (secs + unit_secs / 2) / unit_secs * unit_secs;
    Duration::seconds(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{parse_entries, ScriptedProm};

    const URI: &str = "http://prom.example.com";

    fn run(prom: ScriptedProm, ctx: &CheckContext, entries: &[Entry]) -> Vec<Problem> {
        let check = SeriesCheck::new(Arc::new(prom), SeriesSettings::default());
        check.check(ctx, "rules.yml", &entries[0].rule, entries)
    }

    fn window_of(ctx: &CheckContext) -> TimeWindow {
        TimeWindow {
            start: ctx.now - Duration::days(7),
            end: ctx.now,
            step: Duration::minutes(5),
        }
    }

    fn full_range(window: &TimeWindow) -> MetricTimeRange {
        MetricTimeRange::new(window.start, window.end)
    }

    #[test]
    fn present_series_emit_nothing() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: sum(foo)\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[2.0]);
        assert!(run(prom, &ctx, &entries).is_empty());
    }

    #[test]
    fn never_present_metric_is_a_bug() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: sum(foo)\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range("count(foo)", vec![]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
        assert_eq!(
            problems[0].text,
            format!("`prom` Prometheus server at {URI} didn't have any series for `foo` metric in the last 1w.")
        );
        assert_eq!(problems[0].lines.first, 2);
    }

    #[test]
    fn recording_rule_provider_downgrades_to_information() {
        let ctx = CheckContext::new();
        let entries = parse_entries(
            "- record: agg\n  expr: sum(foo)\n- record: foo\n  expr: sum(bar)\n",
        );
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range("count(foo)", vec![]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Information);
        assert!(problems[0].text.contains("found recording rule that generates it"));
    }

    #[test]
    fn alerts_selector_without_matching_rule_is_a_bug() {
        let ctx = CheckContext::new();
        let entries = parse_entries(
            "- alert: Paging\n  expr: count(ALERTS{alertname=\"Missing\"}) > 0\n",
        );
        let prom = ScriptedProm::new("prom", URI);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
        assert_eq!(
            problems[0].text,
            "`ALERTS{alertname=\"Missing\"}` metric is generated by alerts but didn't found any rule named `Missing`."
        );
    }

    #[test]
    fn alerts_selector_with_matching_rule_passes() {
        let ctx = CheckContext::new();
        let entries = parse_entries(
            "- alert: Watcher\n  expr: count(ALERTS{alertname=\"Down\"}) > 0\n- alert: Down\n  expr: up == 0\n",
        );
        let prom = ScriptedProm::new("prom", URI);
        let problems = run(prom, &ctx, &entries);
        assert!(problems.is_empty());
    }

    #[test]
    fn disable_comment_skips_named_selector() {
        let ctx = CheckContext::new();
        let entries = parse_entries(
            "# promlint disable promql/series(foo)\n- record: agg\n  expr: foo + bar\n",
        );
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(bar)", &[]);
        prom.range("count(bar)", vec![]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].text.contains("`bar`"));
        assert!(!problems[0].text.contains("`foo`"));
    }

    #[test]
    fn disable_comment_matches_matcher_subsets() {
        let ctx = CheckContext::new();
        let entries = parse_entries(
            "# promlint disable promql/series(foo{job=\"x\"})\n- record: agg\n  expr: foo{job=\"x\", env=\"prod\"}\n",
        );
        let prom = ScriptedProm::new("prom", URI);
        // No queries scripted: if the selector weren't disabled the check
        // would report a query failure.
        assert!(run(prom, &ctx, &entries).is_empty());
    }

    #[test]
    fn missing_label_is_a_bug() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries("- record: agg\n  expr: foo{job=\"x\"}\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo{job=\"x\"})", &[]);
        prom.range("count(foo)", vec![full_range(&window)]);
        prom.range("absent(foo{job=~\".+\"})", vec![full_range(&window)]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
        assert_eq!(
            problems[0].text,
            format!("`prom` Prometheus server at {URI} has `foo` metric but there are no series with `job` label in the last 1w.")
        );
    }

    #[test]
    fn disappeared_metric_is_a_bug() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries("- record: agg\n  expr: foo\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range(
            "count(foo)",
            vec![MetricTimeRange::new(
                window.start,
                ctx.now - Duration::days(4),
            )],
        );
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
        assert_eq!(
            problems[0].text,
            format!("`prom` Prometheus server at {URI} doesn't currently have `foo`, it was last present 4d ago.")
        );
    }

    #[test]
    fn min_age_comment_raises_the_threshold() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries(
            "# promlint rule-set promql/series min-age 5d\n- record: agg\n  expr: foo\n",
        );
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range(
            "count(foo)",
            vec![MetricTimeRange::new(
                window.start,
                ctx.now - Duration::days(4),
            )],
        );
        assert!(run(prom, &ctx, &entries).is_empty());
    }

    #[test]
    fn malformed_min_age_comment_warns_and_continues() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries(
            "# promlint rule-set promql/series min-age shortly\n- record: agg\n  expr: foo\n",
        );
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range(
            "count(foo)",
            vec![MetricTimeRange::new(
                window.start,
                ctx.now - Duration::days(4),
            )],
        );
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].severity, Severity::Warning);
        assert!(problems[0]
            .text
            .contains("failed to parse min-age comment as duration"));
        assert_eq!(problems[1].severity, Severity::Bug);
    }

    #[test]
    fn label_value_never_present_is_a_bug() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries("- record: agg\n  expr: foo{job=\"x\"}\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo{job=\"x\"})", &[]);
        prom.range("count(foo)", vec![full_range(&window)]);
        prom.range("absent(foo{job=~\".+\"})", vec![]);
        prom.range("count(foo{job=\"x\"})", vec![]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
        assert_eq!(
            problems[0].text,
            format!("`prom` Prometheus server at {URI} has `foo` metric with `job` label but there are no series matching `{{job=\"x\"}}` in the last 1w.")
        );
    }

    #[test]
    fn label_value_ignore_comment_skips_the_probe() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries(
            "# promlint rule-set promql/series ignore/label-value job\n- record: agg\n  expr: foo{job=\"x\"}\n",
        );
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo{job=\"x\"})", &[]);
        prom.range("count(foo)", vec![full_range(&window)]);
        prom.range("absent(foo{job=~\".+\"})", vec![]);
        // No count(foo{job="x"}) range script: the probe must not run.
        assert!(run(prom, &ctx, &entries).is_empty());
    }

    #[test]
    fn label_value_sometimes_present_is_a_warning() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries("- record: agg\n  expr: foo{job=\"x\"}\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo{job=\"x\"})", &[]);
        prom.range("count(foo)", vec![full_range(&window)]);
        prom.range("absent(foo{job=~\".+\"})", vec![]);
        prom.range(
            "count(foo{job=\"x\"})",
            vec![
                MetricTimeRange::new(
                    window.start,
                    window.start + Duration::days(1) - Duration::seconds(1),
                ),
                MetricTimeRange::new(
                    window.start + Duration::days(3),
                    window.start + Duration::days(4) - Duration::seconds(1),
                ),
            ],
        );
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Warning);
        assert_eq!(
            problems[0].text,
            format!("Metric `foo` with label `{{job=\"x\"}}` is only sometimes present on `prom` Prometheus server at {URI} with average life span of 1d.")
        );
    }

    #[test]
    fn intermittent_base_metric_is_a_warning() {
        let ctx = CheckContext::new();
        let window = window_of(&ctx);
        let entries = parse_entries("- record: agg\n  expr: foo\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range(
            "count(foo)",
            vec![
                MetricTimeRange::new(
                    window.start,
                    window.start + Duration::days(1) - Duration::seconds(1),
                ),
                MetricTimeRange::new(
                    window.start + Duration::days(3),
                    window.start + Duration::days(4) - Duration::seconds(1),
                ),
            ],
        );
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Warning);
        assert_eq!(
            problems[0].text,
            format!("Metric `foo` is only sometimes present on `prom` Prometheus server at {URI} with average life span of 1d in the last 1w.")
        );
    }

    #[test]
    fn ignored_metrics_floor_to_warning() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: sum(foo)\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range("count(foo)", vec![]);
        let settings = SeriesSettings::new(
            Duration::days(7),
            Duration::minutes(5),
            vec!["foo".to_string()],
        )
        .unwrap();
        let check = SeriesCheck::new(Arc::new(prom), settings);
        let problems = check.check(&ctx, "rules.yml", &entries[0].rule, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Warning);
        assert!(problems[0]
            .text
            .contains("matches `promql/series` check ignore regexp `^foo$`"));
    }

    #[test]
    fn connection_refused_is_a_warning() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: foo\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.fail_instant("count(foo)", QueryError::connection_refused("no route"));
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Warning);
    }

    #[test]
    fn timeout_is_a_bug() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: foo\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.fail_instant("count(foo)", QueryError::timeout("deadline exceeded"));
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, Severity::Bug);
    }

    #[test]
    fn syntax_errors_skip_the_check() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: sum(foo) without(\n");
        let prom = ScriptedProm::new("prom", URI);
        assert!(run(prom, &ctx, &entries).is_empty());
    }

    #[test]
    fn duplicate_selectors_are_probed_once() {
        let ctx = CheckContext::new();
        let entries = parse_entries("- record: agg\n  expr: foo + foo\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range("count(foo)", vec![]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
    }

    #[test]
    fn other_servers_with_the_metric_show_up_in_details() {
        let mut other = ScriptedProm::new("prom2", "http://prom2.example.com");
        other.instant("count(foo)", &[3.0]);
        let ctx =
            CheckContext::new().with_servers(vec![Arc::new(other) as Arc<dyn PrometheusClient>]);
        let entries = parse_entries("- record: agg\n  expr: foo\n");
        let mut prom = ScriptedProm::new("prom", URI);
        prom.instant("count(foo)", &[]);
        prom.range("count(foo)", vec![]);
        let problems = run(prom, &ctx, &entries);
        assert_eq!(problems.len(), 1);
        let details = problems[0].details.as_ref().unwrap();
        assert!(details.contains("`foo` was found on other Prometheus servers"));
        assert!(details.contains("[prom2](http://prom2.example.com/graph?g0.expr=foo)"));
    }

    #[test]
    fn bad_ignore_pattern_is_a_config_error() {
        let err = SeriesSettings::new(
            Duration::days(7),
            Duration::minutes(5),
            vec!["[".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid ignoreMetrics regexp"));
    }

    #[test]
    fn settings_parse_from_config_strings() {
        let settings =
            SeriesSettings::from_config(Some("3d"), Some("1m"), Vec::new()).unwrap();
        assert_eq!(settings.lookback_range, Duration::days(3));
        assert_eq!(settings.lookback_step, Duration::minutes(1));
        assert!(SeriesSettings::from_config(Some("soon"), None, Vec::new()).is_err());
    }
}
