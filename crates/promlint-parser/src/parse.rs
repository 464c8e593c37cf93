//! The two-mode rule parser.
//!
//! Strict mode expects the Prometheus file shape: a top-level mapping with
//! a `groups` sequence, each group naming a `rules` sequence. Relaxed mode
//! additionally accepts any sequence of rule-shaped mappings wherever it
//! sits in the document, which covers bare rule lists and rule blocks
//! embedded in other configuration formats.
//!
//! Rule-level failures become invalid [`Rule`] entries and never abort the
//! file; only a document that cannot be read at all produces a file-level
//! error.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::comments::{parse_comment, Comment, DirectiveError, ParsedComment};
use crate::document::{self, DocValue, FileComment, Mapping};
use crate::lines::LineRange;
use crate::nodes::{KeyValue, MapNode, Node};
use crate::rules::{AlertingRule, ParseError, PromQLExpr, RecordingRule, Rule, RuleKind};

/// Prometheus metric-name grammar; recording rule names must match it.
static METRIC_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").unwrap_or_else(|_| unreachable!()));

const RULE_KEYS: &[&str] = &[
    "record",
    "alert",
    "expr",
    "for",
    "keep_firing_for",
    "labels",
    "annotations",
];

const GROUP_KEYS: &[&str] = &["name", "rules", "interval", "query_offset", "limit", "labels"];

/// How forgiving the parser is about the document shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    /// Only the `groups`/`rules` nesting is accepted.
    #[default]
    Strict,
    /// The strict shape or any bare sequence of rule mappings.
    Relaxed,
}

/// Everything parsed out of one file.
#[derive(Debug, Clone, Default)]
pub struct FileContent {
    /// All rules in document order, invalid ones included.
    pub rules: Vec<Rule>,
    /// A file-level structural failure, when the document shape itself is
    /// broken.
    pub error: Option<ParseError>,
}

/// The rule file parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parser {
    mode: ParserMode,
    offset: usize,
}

impl Parser {
    /// Creates a parser for the given mode.
    #[must_use]
    pub fn new(mode: ParserMode) -> Self {
        Self { mode, offset: 0 }
    }

    /// Shifts every reported line by `offset`; used for rule blocks
    /// embedded inside larger documents.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Parses raw file bytes into rules.
    #[must_use]
    pub fn parse(&self, content: &[u8]) -> FileContent {
        let Ok(text) = std::str::from_utf8(content) else {
            return FileContent {
                rules: Vec::new(),
                error: Some(ParseError::new(1, "file content is not valid UTF-8")),
            };
        };
        let doc = match document::read(text, self.offset) {
            Ok(doc) => doc,
            Err(err) => {
                return FileContent {
                    rules: Vec::new(),
                    error: Some(ParseError::new(err.line, err.message)),
                };
            }
        };

        let mut out = FileContent::default();
        for root in &doc.roots {
            match self.mode {
                ParserMode::Strict => self.parse_strict_root(root, &mut out),
                ParserMode::Relaxed => self.parse_relaxed_root(root, &mut out),
            }
        }
        debug!(rules = out.rules.len(), mode = ?self.mode, "parsed rule file");
        attach_comments(&mut out.rules, &doc.comments);
        out
    }

    fn parse_strict_root(&self, root: &DocValue, out: &mut FileContent) {
        let DocValue::Mapping(top) = root else {
            set_error(
                out,
                ParseError::new(
                    root.lines().first,
                    "top level field must be a mapping with a groups key",
                ),
            );
            return;
        };
        for (key, value) in &top.entries {
            if key.value == "groups" {
                let DocValue::Sequence(groups) = value else {
                    set_error(
                        out,
                        ParseError::new(value.lines().first, "groups value must be a list"),
                    );
                    continue;
                };
                for group in &groups.items {
                    self.parse_group(group, out);
                }
            } else {
                set_error(
                    out,
                    ParseError::with_fragment(
                        key.lines.first,
                        key.value.clone(),
                        format!("invalid key(s) found: {}", key.value),
                    ),
                );
            }
        }
    }

    fn parse_group(&self, group: &DocValue, out: &mut FileContent) {
        let DocValue::Mapping(map) = group else {
            set_error(
                out,
                ParseError::new(group.lines().first, "group definition must be a mapping"),
            );
            return;
        };
        for (key, _) in &map.entries {
            if !GROUP_KEYS.contains(&key.value.as_str()) {
                set_error(
                    out,
                    ParseError::with_fragment(
                        key.lines.first,
                        key.value.clone(),
                        format!("invalid group key: {}", key.value),
                    ),
                );
            }
        }
        if !map.has("name") {
            set_error(
                out,
                ParseError::new(map.line, "incomplete group definition, name is required"),
            );
        }
        match map.get("rules") {
            Some(DocValue::Sequence(rules)) => {
                for item in &rules.items {
                    match item {
                        DocValue::Mapping(rule) => out.rules.push(self.parse_rule(rule)),
                        other => out.rules.push(invalid_rule(
                            other.lines(),
                            vec![ParseError::new(
                                other.lines().first,
                                "rule definition must be a mapping",
                            )],
                        )),
                    }
                }
            }
            Some(other) => set_error(
                out,
                ParseError::new(other.lines().first, "rules value must be a list"),
            ),
            None => {}
        }
    }

    fn parse_relaxed_root(&self, root: &DocValue, out: &mut FileContent) {
        if let DocValue::Mapping(top) = root {
            if top.has("groups") {
                self.parse_strict_root(root, out);
                return;
            }
        }
        self.scan_for_rules(root, out);
    }

    // Relaxed mode: any sequence item shaped like a rule becomes one;
    // everything else is somebody else's configuration and is skipped.
    fn scan_for_rules(&self, value: &DocValue, out: &mut FileContent) {
        match value {
            DocValue::Sequence(seq) => {
                for item in &seq.items {
                    match item {
                        DocValue::Mapping(map)
                            if map.has("record") || map.has("alert") || map.has("expr") =>
                        {
                            out.rules.push(self.parse_rule(map));
                        }
                        other => self.scan_for_rules(other, out),
                    }
                }
            }
            DocValue::Mapping(map) => {
                for (_, child) in &map.entries {
                    self.scan_for_rules(child, out);
                }
            }
            DocValue::Scalar(_) => {}
        }
    }

    fn parse_rule(&self, map: &Mapping) -> Rule {
        let lines = map.lines();
        let first_line = lines.first;
        let mut errors: Vec<ParseError> = Vec::new();

        let unknown: Vec<&str> = map
            .entries
            .iter()
            .map(|(key, _)| key.value.as_str())
            .filter(|key| !RULE_KEYS.contains(key))
            .collect();
        if !unknown.is_empty() {
            let keys = unknown.join(", ");
            errors.push(ParseError::with_fragment(
                first_line,
                keys.clone(),
                format!("invalid key(s) found: {keys}"),
            ));
        }

        let has_record = map.has("record");
        let has_alert = map.has("alert");
        if has_record && has_alert {
            errors.push(ParseError::new(
                first_line,
                "got both record and alert keys in a single rule",
            ));
            return invalid_rule(lines, errors);
        }
        if !has_record && !has_alert {
            errors.push(ParseError::new(
                first_line,
                "incomplete rule, no alert or record key",
            ));
            return invalid_rule(lines, errors);
        }

        let expr = self.expr_entry(map, first_line, &mut errors);

        if has_record {
            for field in ["annotations", "for", "keep_firing_for"] {
                if map.has(field) {
                    errors.push(ParseError::with_fragment(
                        first_line,
                        field.to_string(),
                        format!("invalid field '{field}' in recording rule"),
                    ));
                }
            }
            let record = self.scalar_entry(map, "record", first_line, true, &mut errors);
            if let Some(record) = &record {
                if !METRIC_NAME_RE.is_match(&record.value) {
                    errors.push(ParseError::with_fragment(
                        record.lines.first,
                        record.value.clone(),
                        format!("invalid recording rule name: {}", record.value),
                    ));
                }
            }
            let labels = self.map_entry(map, "labels", &mut errors);
            match (record, expr, errors.is_empty()) {
                (Some(record), Some(expr), true) => Rule {
                    lines,
                    kind: RuleKind::Recording(RecordingRule {
                        record,
                        expr,
                        labels,
                    }),
                    comments: Vec::new(),
                    comment_errors: Vec::new(),
                },
                _ => invalid_rule(lines, errors),
            }
        } else {
            let alert = self.scalar_entry(map, "alert", first_line, true, &mut errors);
            if let Some(alert) = &alert {
                if alert.value.trim().is_empty() {
                    errors.push(ParseError::with_fragment(
                        alert.lines.first,
                        alert.value.clone(),
                        "alerting rule name must not be empty".to_string(),
                    ));
                }
            }
            let for_duration = self.scalar_entry(map, "for", first_line, false, &mut errors);
            let keep_firing_for =
                self.scalar_entry(map, "keep_firing_for", first_line, false, &mut errors);
            let labels = self.map_entry(map, "labels", &mut errors);
            let annotations = self.map_entry(map, "annotations", &mut errors);
            match (alert, expr, errors.is_empty()) {
                (Some(alert), Some(expr), true) => Rule {
                    lines,
                    kind: RuleKind::Alerting(AlertingRule {
                        alert,
                        expr,
                        for_duration,
                        keep_firing_for,
                        labels,
                        annotations,
                    }),
                    comments: Vec::new(),
                    comment_errors: Vec::new(),
                },
                _ => invalid_rule(lines, errors),
            }
        }
    }

    // The expression node spans its key and value together; a PromQL
    // syntax error is stored on the expression, never raised here.
    fn expr_entry(
        &self,
        map: &Mapping,
        rule_line: usize,
        errors: &mut Vec<ParseError>,
    ) -> Option<PromQLExpr> {
        let Some((key, value)) = map.entries.iter().find(|(k, _)| k.value == "expr") else {
            errors.push(ParseError::new(rule_line, "missing expr key"));
            return None;
        };
        let DocValue::Scalar(scalar) = value else {
            errors.push(ParseError::new(
                value.lines().first,
                "expr value must be a string",
            ));
            return None;
        };
        let key_node = Node::new(key.value.clone(), key.lines);
        let value_node = Node::new(scalar.value.clone(), scalar.lines);
        Some(PromQLExpr::new(Node::with_key(&key_node, &value_node)))
    }

    fn scalar_entry(
        &self,
        map: &Mapping,
        key: &str,
        rule_line: usize,
        required: bool,
        errors: &mut Vec<ParseError>,
    ) -> Option<Node> {
        match map.get(key) {
            Some(DocValue::Scalar(scalar)) => {
                Some(Node::new(scalar.value.clone(), scalar.lines))
            }
            Some(other) => {
                errors.push(ParseError::new(
                    other.lines().first,
                    format!("{key} value must be a string"),
                ));
                None
            }
            None => {
                if required {
                    errors.push(ParseError::new(rule_line, format!("missing {key} key")));
                }
                None
            }
        }
    }

    fn map_entry(
        &self,
        map: &Mapping,
        key: &str,
        errors: &mut Vec<ParseError>,
    ) -> Option<MapNode> {
        let (key_scalar, value) = map.entries.iter().find(|(k, _)| k.value == key)?;
        let DocValue::Mapping(inner) = value else {
            errors.push(ParseError::new(
                value.lines().first,
                format!("{key} value must be a mapping"),
            ));
            return None;
        };
        let mut items = Vec::new();
        for (k, v) in &inner.entries {
            let DocValue::Scalar(scalar) = v else {
                errors.push(ParseError::new(
                    v.lines().first,
                    format!("{key} {} value must be a string", k.value),
                ));
                continue;
            };
            items.push(KeyValue {
                key: Node::new(k.value.clone(), k.lines),
                value: Node::new(scalar.value.clone(), scalar.lines),
            });
        }
        Some(MapNode::new(
            Node::new(key_scalar.value.clone(), key_scalar.lines),
            items,
        ))
    }
}

fn invalid_rule(lines: LineRange, errors: Vec<ParseError>) -> Rule {
    Rule {
        lines,
        kind: RuleKind::Invalid(errors),
        comments: Vec::new(),
        comment_errors: Vec::new(),
    }
}

fn set_error(out: &mut FileContent, error: ParseError) {
    if out.error.is_none() {
        out.error = Some(error);
    }
}

// Attaches directives to rules: file-scoped directives go to every rule,
// everything else to the rule whose span contains the comment line or
// starts right below a contiguous block of comment-only lines.
fn attach_comments(rules: &mut [Rule], comments: &[FileComment]) {
    let parsed: Vec<(usize, bool, ParsedComment)> = comments
        .iter()
        .map(|c| (c.line, c.own_line, parse_comment(&c.text)))
        .collect();

    let file_directives: Vec<Comment> = parsed
        .iter()
        .filter_map(|(line, _, outcome)| match outcome {
            ParsedComment::Directive(d) if d.is_file_scoped() => Some(Comment {
                line: *line,
                directive: d.clone(),
            }),
            _ => None,
        })
        .collect();

    for rule in rules {
        rule.comments.extend(file_directives.iter().cloned());

        // Contiguous comment-only lines directly above the rule.
        let mut head_first = rule.lines.first;
        while parsed
            .iter()
            .any(|(line, own_line, _)| *own_line && *line + 1 == head_first)
        {
            head_first -= 1;
        }

        for (line, _, outcome) in &parsed {
            if *line < head_first || *line > rule.lines.last {
                continue;
            }
            match outcome {
                ParsedComment::Directive(d) if !d.is_file_scoped() => {
                    rule.comments.push(Comment {
                        line: *line,
                        directive: d.clone(),
                    });
                }
                ParsedComment::Invalid(message) => {
                    rule.comment_errors.push(DirectiveError {
                        line: *line,
                        error: message.clone(),
                    });
                }
                _ => {}
            }
        }
    }
}
