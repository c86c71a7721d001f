use arbor_types::{NodeId, Tree, Value};

use crate::ast::MatchKind;

/// One entry of a [`Match`].
///
/// `node` is the tree position the hit was taken from; it is `None` only for
/// the single hit of a `?count` match.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub node: Option<NodeId>,
    pub value: Value,
}

/// Ordered result set of an expression; every hit shares the match's kind.
///
/// - `node`: `value` is `Value::Node(id)` of the hit itself
/// - `value`: the node's value (possibly `Value::None`)
/// - `name`: the node's name as text
/// - `path`: the node's address as `Value::Path`
/// - `count`: exactly one integer hit
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    kind: MatchKind,
    hits: Vec<Hit>,
}

impl Match {
    pub fn new(kind: MatchKind, hits: Vec<Hit>) -> Self {
        Self { kind, hits }
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<Hit> {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    /// Tree positions of all hits, in order.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.hits.iter().filter_map(|h| h.node).collect()
    }

    /// For `?count` matches the counted number, otherwise the number of hits.
    pub fn count(&self) -> usize {
        match (self.kind, self.hits.first()) {
            (MatchKind::Count, Some(Hit {
                value: Value::Integer(n),
                ..
            })) => usize::try_from(*n).unwrap_or(0),
            _ => self.hits.len(),
        }
    }

    /// Collapse the match to one value.
    ///
    /// No hits yields `Value::None`, one hit its value, and several hits the
    /// concatenation of their text forms.
    pub fn single(&self, tree: &Tree) -> Value {
        match self.hits.as_slice() {
            [] => Value::None,
            [only] => only.value.clone(),
            many => Value::Text(
                many.iter()
                    .map(|hit| tree.stringify(&hit.value))
                    .collect::<String>(),
            ),
        }
    }
}

impl<'a> IntoIterator for &'a Match {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}
