//! PromQL expression wrapper for promlint.
//!
//! This crate wraps the `promql-parser` crate behind an owned AST model so
//! the rest of the workspace never touches the upstream parser types:
//! - [`parse`]: parse an expression string into a [`PromQLNode`] tree
//! - [`PromQLNode`]: expression text, typed operator form, child nodes
//! - [`VectorSelector`]: a normalized vector selector with label matchers
//! - [`selectors`]: pre-order extraction of every vector selector in a tree

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ast;
mod error;
mod selector;

pub use ast::{parse, selectors, Grouping, NodeKind, PromQLNode};
pub use error::SyntaxError;
pub use selector::{parse_selector, LabelMatcher, MatchOp, VectorSelector, METRIC_NAME_LABEL};
