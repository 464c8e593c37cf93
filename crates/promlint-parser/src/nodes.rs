//! Position-tracked value nodes.
//!
//! Every scalar that survives parsing is carried as a [`Node`]: its string
//! value plus the source lines it occupied. Mappings keep their entries in
//! document order as [`KeyValue`] pairs inside a [`MapNode`].

use serde::{Deserialize, Serialize};

use crate::lines::LineRange;

/// A scalar value with its source position.
///
/// Aliases are dereferenced at construction: the value is the referent's,
/// the lines are those of the alias site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Scalar value.
    pub value: String,
    /// Source lines the value occupied.
    pub lines: LineRange,
}

impl Node {
    /// Creates a node.
    #[must_use]
    pub fn new(value: impl Into<String>, lines: LineRange) -> Self {
        Self {
            value: value.into(),
            lines,
        }
    }

    /// A value node whose range is widened to cover its key.
    #[must_use]
    pub fn with_key(key: &Node, value: &Node) -> Self {
        Self {
            value: value.value.clone(),
            lines: key.lines.cover(value.lines),
        }
    }

    /// Value-only comparison; positions are ignored.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// A key/value entry of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key node.
    pub key: Node,
    /// The value node.
    pub value: Node,
}

impl KeyValue {
    /// Lines spanned by key and value together.
    #[must_use]
    pub fn lines(&self) -> LineRange {
        self.key.lines.cover(self.value.lines)
    }
}

/// A mapping of scalar keys to scalar values (labels, annotations).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapNode {
    /// The key under which the mapping appeared (`labels`, `annotations`).
    pub key: Node,
    /// Entries in document order.
    pub items: Vec<KeyValue>,
    /// Lines spanned by the key and all entries.
    pub lines: LineRange,
}

impl MapNode {
    /// Builds a map node, computing the aggregate range from the key and
    /// every entry.
    #[must_use]
    pub fn new(key: Node, items: Vec<KeyValue>) -> Self {
        let mut lines = key.lines;
        for kv in &items {
            lines = lines.cover(kv.lines());
        }
        Self { key, items, lines }
    }

    /// Looks up an entry value by key string.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.items
            .iter()
            .find(|kv| kv.key.value == key)
            .map(|kv| &kv.value)
    }

    /// Order-insensitive equality over `{key: value}` pairs.
    #[must_use]
    pub fn is_identical(&self, other: &Self) -> bool {
        let mut a: Vec<String> = self
            .items
            .iter()
            .map(|kv| format!("{}: {}", kv.key.value, kv.value.value))
            .collect();
        let mut b: Vec<String> = other
            .items
            .iter()
            .map(|kv| format!("{}: {}", kv.key.value, kv.value.value))
            .collect();
        a.sort();
        b.sort();
        a == b
    }
}

/// Order-insensitive equality for optional mappings; two absent maps are
/// identical, an absent map never matches a present one.
#[must_use]
pub fn maps_identical(a: Option<&MapNode>, b: Option<&MapNode>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.is_identical(b),
        _ => false,
    }
}
