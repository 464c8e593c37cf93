//! Owned PromQL AST wrapper.
//!
//! [`parse`] runs the upstream parser once and copies the result into
//! [`PromQLNode`] values. Everything downstream (selector extraction, the
//! aggregate check's grouping walk) works on this owned tree; upstream AST
//! types never leave this module.

use promql_parser::label::MatchOp as UpstreamOp;
use promql_parser::parser::{self, Expr, LabelModifier};
use serde::{Deserialize, Serialize};

use crate::error::SyntaxError;
use crate::selector::{LabelMatcher, MatchOp, VectorSelector, METRIC_NAME_LABEL};

/// Aggregation grouping clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grouping {
    /// `by (labels...)`; an aggregation with no clause is `By([])`.
    By(Vec<String>),
    /// `without (labels...)`.
    Without(Vec<String>),
}

impl Grouping {
    /// Returns true when `label` survives this grouping.
    #[must_use]
    pub fn preserves(&self, label: &str) -> bool {
        match self {
            Self::By(labels) => labels.iter().any(|l| l == label),
            Self::Without(labels) => !labels.iter().any(|l| l == label),
        }
    }
}

/// The typed operator form of a [`PromQLNode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// An instant vector selector.
    Selector(VectorSelector),
    /// A range selector; its inner vector selector is the only child.
    Matrix,
    /// An aggregation operator with its grouping clause.
    Aggregation {
        /// Operator name (`sum`, `min`, `topk`, ...).
        op: String,
        /// Grouping clause; `By([])` when none was written.
        grouping: Grouping,
    },
    /// A binary operation.
    Binary {
        /// Operator token (`+`, `and`, `unless`, ...).
        op: String,
    },
    /// A function call.
    Call {
        /// Function name.
        func: String,
    },
    /// Unary negation.
    Unary,
    /// Parenthesized expression.
    Paren,
    /// A subquery.
    Subquery,
    /// A number literal.
    NumberLiteral(f64),
    /// A string literal.
    StringLiteral(String),
}

/// One node of a parsed PromQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromQLNode {
    /// Canonical text of this subexpression.
    pub expr: String,
    /// Typed operator form.
    pub kind: NodeKind,
    /// Child expressions in source order.
    pub children: Vec<PromQLNode>,
}

/// Parses a PromQL expression into an owned node tree.
///
/// # Errors
///
/// Returns [`SyntaxError`] when the expression does not parse.
pub fn parse(input: &str) -> Result<PromQLNode, SyntaxError> {
    let expr = parser::parse(input).map_err(SyntaxError::new)?;
    Ok(convert_expr(&expr))
}

/// Pre-order extraction of every vector selector in the tree.
///
/// Selectors are normalized copies: offsets and @ modifiers are already
/// dropped by the conversion, and range selectors contribute their inner
/// vector selector.
#[must_use]
pub fn selectors(node: &PromQLNode) -> Vec<VectorSelector> {
    let mut out = Vec::new();
    collect_selectors(node, &mut out);
    out
}

fn collect_selectors(node: &PromQLNode, out: &mut Vec<VectorSelector>) {
    if let NodeKind::Selector(vs) = &node.kind {
        out.push(vs.clone());
    }
    for child in &node.children {
        collect_selectors(child, out);
    }
}

fn convert_expr(expr: &Expr) -> PromQLNode {
    let text = expr.to_string();
    match expr {
        Expr::VectorSelector(vs) => {
            let converted = convert_selector(vs);
            PromQLNode {
                expr: text,
                kind: NodeKind::Selector(converted),
                children: Vec::new(),
            }
        }
        Expr::MatrixSelector(ms) => {
            let converted = convert_selector(&ms.vs);
            let child = PromQLNode {
                expr: converted.to_string(),
                kind: NodeKind::Selector(converted),
                children: Vec::new(),
            };
            PromQLNode {
                expr: text,
                kind: NodeKind::Matrix,
                children: vec![child],
            }
        }
        Expr::Aggregate(agg) => {
            let grouping = match &agg.modifier {
                Some(LabelModifier::Include(labels)) => Grouping::By(labels.labels.clone()),
                Some(LabelModifier::Exclude(labels)) => Grouping::Without(labels.labels.clone()),
                None => Grouping::By(Vec::new()),
            };
            let mut children = Vec::new();
            if let Some(param) = &agg.param {
                children.push(convert_expr(param));
            }
            children.push(convert_expr(&agg.expr));
            PromQLNode {
                expr: text,
                kind: NodeKind::Aggregation {
                    op: agg.op.to_string(),
                    grouping,
                },
                children,
            }
        }
        Expr::Binary(bin) => PromQLNode {
            expr: text,
            kind: NodeKind::Binary {
                op: bin.op.to_string(),
            },
            children: vec![convert_expr(&bin.lhs), convert_expr(&bin.rhs)],
        },
        Expr::Call(call) => PromQLNode {
            expr: text,
            kind: NodeKind::Call {
                func: call.func.name.to_string(),
            },
            children: call.args.args.iter().map(|a| convert_expr(a)).collect(),
        },
        Expr::Unary(u) => PromQLNode {
            expr: text,
            kind: NodeKind::Unary,
            children: vec![convert_expr(&u.expr)],
        },
        Expr::Paren(p) => PromQLNode {
            expr: text,
            kind: NodeKind::Paren,
            children: vec![convert_expr(&p.expr)],
        },
        Expr::Subquery(sq) => PromQLNode {
            expr: text,
            kind: NodeKind::Subquery,
            children: vec![convert_expr(&sq.expr)],
        },
        Expr::NumberLiteral(n) => PromQLNode {
            expr: text,
            kind: NodeKind::NumberLiteral(n.val),
            children: Vec::new(),
        },
        Expr::StringLiteral(s) => PromQLNode {
            expr: text,
            kind: NodeKind::StringLiteral(s.val.clone()),
            children: Vec::new(),
        },
        Expr::Extension(_) => PromQLNode {
            expr: text,
            kind: NodeKind::StringLiteral(String::new()),
            children: Vec::new(),
        },
    }
}

fn convert_selector(vs: &parser::VectorSelector) -> VectorSelector {
    let name = vs.name.clone().unwrap_or_default();
    let mut matchers: Vec<LabelMatcher> = vs
        .matchers
        .matchers
        .iter()
        .map(|m| {
            let op = match &m.op {
                UpstreamOp::Equal => MatchOp::Equal,
                UpstreamOp::NotEqual => MatchOp::NotEqual,
                UpstreamOp::Re(_) => MatchOp::Regexp,
                UpstreamOp::NotRe(_) => MatchOp::NotRegexp,
            };
            LabelMatcher::new(m.name.clone(), op, m.value.clone())
        })
        .collect();
    if !name.is_empty() && !matchers.iter().any(LabelMatcher::is_name_matcher) {
        matchers.insert(
            0,
            LabelMatcher::new(METRIC_NAME_LABEL, MatchOp::Equal, name.clone()),
        );
    }
    VectorSelector { name, matchers }
}
