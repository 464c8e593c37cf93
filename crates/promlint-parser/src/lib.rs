//! Rule file parser for promlint.
//!
//! Converts line-oriented rule documents into typed rules with exact
//! source positions:
//! - [`Parser`]: strict/relaxed parsing of whole files into [`FileContent`]
//! - [`Rule`]: the tagged alerting | recording | invalid union
//! - [`Node`], [`MapNode`], [`LineRange`]: the position-tracked value model
//! - [`Directive`]: typed comment directives (`disable`, `snooze`,
//!   `rule-set`, `file/*`)
//!
//! Rule-level problems are data, not failures: a rule that does not
//! validate is returned as [`RuleKind::Invalid`] carrying its parse
//! errors, and parsing always continues with the rest of the file.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod comments;
mod document;
mod lines;
mod nodes;
mod parse;
mod rules;

pub use comments::{
    parse_comment, Comment, Directive, DirectiveError, ParsedComment, DIRECTIVE_MARKER,
};
pub use lines::LineRange;
pub use nodes::{maps_identical, KeyValue, MapNode, Node};
pub use parse::{FileContent, Parser, ParserMode};
pub use rules::{
    AlertingRule, ParseError, PromQLExpr, RecordingRule, Rule, RuleKind, RuleType,
};
