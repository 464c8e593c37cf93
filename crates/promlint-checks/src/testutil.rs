//! Scripted Prometheus client for check tests.
//!
//! Implements the failover-group contract by pattern-matching query
//! strings against canned responses; anything unscripted fails the query,
//! so tests notice when a check issues an unexpected request.

use std::collections::HashMap;

use chrono::Duration;

use promlint_parser::{Parser, ParserMode};
use promlint_promapi::{
    CancelToken, Labels, MetricTimeRange, PrometheusClient, QueryError, QueryResult, QueryStats,
    RangeQueryResult, Sample, SeriesTimeRanges, TimeWindow,
};

use crate::context::Entry;

pub(crate) fn parse_entries(content: &str) -> Vec<Entry> {
    Parser::new(ParserMode::Relaxed)
        .parse(content.as_bytes())
        .rules
        .into_iter()
        .map(|rule| Entry::noop("rules.yml", rule))
        .collect()
}

type InstantScript = Result<(Vec<f64>, QueryStats), QueryError>;
type RangeScript = Result<Vec<MetricTimeRange>, QueryError>;

pub(crate) struct ScriptedProm {
    name: String,
    uri: String,
    instant: HashMap<String, InstantScript>,
    range: HashMap<String, RangeScript>,
}

impl ScriptedProm {
    pub(crate) fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            instant: HashMap::new(),
            range: HashMap::new(),
        }
    }

    pub(crate) fn instant(&mut self, query: &str, values: &[f64]) {
        self.instant.insert(
            query.to_string(),
            Ok((values.to_vec(), QueryStats::default())),
        );
    }

    pub(crate) fn instant_with_stats(
        &mut self,
        query: &str,
        values: &[f64],
        eval_duration: Duration,
        total_samples: i64,
        peak_samples: i64,
    ) {
        self.instant.insert(
            query.to_string(),
            Ok((
                values.to_vec(),
                QueryStats {
                    eval_duration,
                    total_samples,
                    peak_samples,
                },
            )),
        );
    }

    pub(crate) fn fail_instant(&mut self, query: &str, err: QueryError) {
        self.instant.insert(query.to_string(), Err(err));
    }

    pub(crate) fn range(&mut self, query: &str, ranges: Vec<MetricTimeRange>) {
        self.range.insert(query.to_string(), Ok(ranges));
    }

    pub(crate) fn fail_range(&mut self, query: &str, err: QueryError) {
        self.range.insert(query.to_string(), Err(err));
    }
}

impl PrometheusClient for ScriptedProm {
    fn name(&self) -> &str {
        &self.name
    }

    fn public_uri(&self) -> &str {
        &self.uri
    }

    fn query(&self, _ctx: &CancelToken, expr: &str) -> Result<QueryResult, QueryError> {
        match self.instant.get(expr) {
            Some(Ok((values, stats))) => Ok(QueryResult {
                uri: self.uri.clone(),
                samples: values
                    .iter()
                    .map(|value| Sample {
                        labels: Labels::new(),
                        value: *value,
                    })
                    .collect(),
                stats: *stats,
            }),
            Some(Err(err)) => Err(err.clone()),
            None => Err(QueryError::unknown(format!(
                "no scripted response for instant query: {expr}"
            ))),
        }
    }

    fn range_query(
        &self,
        _ctx: &CancelToken,
        expr: &str,
        window: &TimeWindow,
    ) -> Result<RangeQueryResult, QueryError> {
        match self.range.get(expr) {
            Some(Ok(ranges)) => Ok(RangeQueryResult {
                uri: self.uri.clone(),
                series: SeriesTimeRanges {
                    from: window.start,
                    until: window.end,
                    step: window.step,
                    ranges: ranges.clone(),
                    gaps: Vec::new(),
                },
            }),
            Some(Err(err)) => Err(err.clone()),
            None => Err(QueryError::unknown(format!(
                "no scripted response for range query: {expr}"
            ))),
        }
    }
}
