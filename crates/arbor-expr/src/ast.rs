use std::fmt;
use std::str::FromStr;

use arbor_types::{ArborError, Value};
use regex::Regex;

/// Result type of an expression, selected by the `?kind` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Node,
    Value,
    Name,
    Count,
    Path,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Node => "node",
            MatchKind::Value => "value",
            MatchKind::Name => "name",
            MatchKind::Count => "count",
            MatchKind::Path => "path",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(MatchKind::Node),
            "value" => Ok(MatchKind::Value),
            "name" => Ok(MatchKind::Name),
            "count" => Ok(MatchKind::Count),
            "path" => Ok(MatchKind::Path),
            other => Err(ArborError::syntax(
                other,
                "unknown type declaration, expected node, value, name, count or path",
            )),
        }
    }
}

/// Boolean combination of iterator pipelines.
///
/// Every operand of a combinator starts from the same root set: the
/// enclosing group's input.
#[derive(Debug, Clone)]
pub enum Logic {
    Path(Vec<Step>),
    Or(Box<Logic>, Box<Logic>),
    Xor(Box<Logic>, Box<Logic>),
    And(Box<Logic>, Box<Logic>),
    /// `A!B`: hits of `A` that are not in `B`.
    Difference(Box<Logic>, Box<Logic>),
    /// `!A`: the root set minus the hits of `A`.
    Complement(Box<Logic>),
}

/// What a `/=` iterator compares child values with.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueLiteral {
    /// Compared with the stringified value.
    Text(String),
    /// `=:type:literal`, compared after coercion.
    Typed(Value),
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub regex: Regex,
    /// `d` flag: keep only the first node for each distinct matched string.
    pub distinct: bool,
}

/// One iterator in a pipeline. Each consumes the running node set and
/// produces the next one.
#[derive(Debug, Clone)]
pub enum Step {
    /// `..`: top of the tree containing each hit.
    Root,
    /// `..N`: the Nth ancestor.
    Ancestor(usize),
    /// `..name`: nearest ancestor with that name.
    NamedAncestor(String),
    /// `-`, `+`, `-N`, `+N`.
    Sibling(isize),
    /// `N`: the Nth child.
    Child(usize),
    /// `*`
    Children,
    /// `**`, pre-order.
    Descendants,
    /// `name`: children with that name.
    Named(String),
    /// `=literal`: children with that value.
    Valued(ValueLiteral),
    NameRegex(Pattern),
    ValueRegex(Pattern),
    /// `[start,end]`, end exclusive.
    Range {
        start: Option<usize>,
        end: Option<usize>,
    },
    /// `%N`, or `%N<` counting from the last element.
    Modulo { every: usize, from_end: bool },
    /// `#`: follow node references.
    Reference,
    /// `.`
    Parent,
    /// `<`: the node written on the line above each hit.
    ShiftLeft,
    /// `>`: the node written on the line below each hit.
    ShiftRight,
    /// `( ... )`, starting from the running set.
    Group(Box<Logic>),
}
