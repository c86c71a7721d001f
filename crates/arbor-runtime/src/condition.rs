//! Condition language shared by `if`, `else-if` and `while`.
//!
//! A condition lives in the statement node itself:
//! ```text
//! if:@/../_x?value          left operand (expression or constant)
//!   =:foo                   optional comparison against a right operand
//!   and:@/../_y?node        sub-conditions, each shaped like the statement
//!     !=:bar
//!   or:@/../_z?count
//! ```
//! Clauses combine left to right; `and` binds tighter than `or`. Without a
//! comparison a clause tests existence of its left operand.

use std::cmp::Ordering;

use arbor_expr::{evaluate_node, format_node, is_formatted, MatchKind};
use arbor_types::{ArborError, NodeId, Result, Tree, Value};

/// Comparison operator, written as the name of the child node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Comparison {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "=" => Some(Comparison::Equal),
            "!=" => Some(Comparison::NotEqual),
            "<" => Some(Comparison::Less),
            ">" => Some(Comparison::Greater),
            "<=" => Some(Comparison::LessOrEqual),
            ">=" => Some(Comparison::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::NotEqual => "!=",
            Comparison::Less => "<",
            Comparison::Greater => ">",
            Comparison::LessOrEqual => "<=",
            Comparison::GreaterOrEqual => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::Less => ordering == Ordering::Less,
            Comparison::Greater => ordering == Ordering::Greater,
            Comparison::LessOrEqual => ordering != Ordering::Greater,
            Comparison::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

/// `true` for children that belong to a condition rather than to a body.
pub fn is_condition_child(name: &str) -> bool {
    name == "and" || name == "or" || Comparison::from_name(name).is_some()
}

/// Evaluate the condition rooted at `statement`.
pub fn evaluate_condition(tree: &Tree, statement: NodeId) -> Result<bool> {
    // OR of AND-groups, evaluated lazily left to right.
    let mut group = clause(tree, statement)?;
    for &child in tree.children(statement)? {
        match tree.name(child)? {
            "and" => {
                if group {
                    group = evaluate_condition(tree, child)?;
                }
            }
            "or" => {
                if group {
                    return Ok(true);
                }
                group = evaluate_condition(tree, child)?;
            }
            _ => {}
        }
    }
    Ok(group)
}

/// The statement's own operand, optionally compared with its first named child.
fn clause(tree: &Tree, node: NodeId) -> Result<bool> {
    let comparison = first_named_child(tree, node)?
        .and_then(|child| Some((child, Comparison::from_name(tree.name(child).ok()?)?)));
    let left = Operand::of(tree, node)?;
    match comparison {
        None => left.exists(),
        Some((child, op)) => {
            let right = Operand::of(tree, child)?;
            compare(tree, node, op, &left, &right)
        }
    }
}

fn first_named_child(tree: &Tree, node: NodeId) -> Result<Option<NodeId>> {
    for &child in tree.children(node)? {
        if !tree.name(child)?.is_empty() {
            return Ok(Some(child));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Operands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Nodes(Vec<NodeId>),
    /// Number of hits that count as present, and the match's single value.
    Matched(usize, Value),
    Constant(Value),
}

impl Operand {
    fn of(tree: &Tree, node: NodeId) -> Result<Operand> {
        if let Some(matched) = evaluate_node(tree, node)? {
            return Ok(match matched.kind() {
                MatchKind::Node => Operand::Nodes(matched.nodes()),
                MatchKind::Count => {
                    Operand::Matched(matched.count(), Value::Integer(matched.count() as i64))
                }
                kind => {
                    // Existence looks at the first hit only.
                    let first = matched.hits().first().map(|h| h.value.clone());
                    let single = matched.single(tree);
                    let present = match (kind, first) {
                        (_, None) => 0,
                        (MatchKind::Name, Some(Value::Text(name))) if name.is_empty() => 0,
                        (MatchKind::Value, Some(Value::None)) => 0,
                        _ => matched.len(),
                    };
                    Operand::Matched(present, single)
                }
            });
        }
        if is_formatted(tree, node)? {
            return Ok(Operand::Constant(Value::Text(format_node(tree, node)?)));
        }
        Ok(Operand::Constant(tree.value(node)?.clone()))
    }

    fn exists(&self) -> Result<bool> {
        Ok(match self {
            Operand::Nodes(nodes) => !nodes.is_empty(),
            Operand::Matched(present, _) => *present > 0,
            Operand::Constant(value) => !matches!(value, Value::None | Value::Boolean(false)),
        })
    }

    fn value(&self) -> Value {
        match self {
            Operand::Nodes(nodes) if nodes.len() == 1 => Value::Node(nodes[0]),
            Operand::Nodes(_) => Value::None,
            Operand::Matched(_, value) | Operand::Constant(value) => value.clone(),
        }
    }
}

fn compare(
    tree: &Tree,
    statement: NodeId,
    op: Comparison,
    left: &Operand,
    right: &Operand,
) -> Result<bool> {
    if let (Operand::Nodes(a), Operand::Nodes(b)) = (left, right) {
        let mut ordering = Ordering::Equal;
        for (x, y) in a.iter().zip(b.iter()) {
            ordering = tree.compare(*x, *y)?;
            if ordering != Ordering::Equal {
                break;
            }
        }
        if ordering == Ordering::Equal {
            ordering = a.len().cmp(&b.len());
        }
        return Ok(op.holds(ordering));
    }

    let (a, b) = (left.value(), right.value());
    match a.compare(&b) {
        Some(ordering) => Ok(op.holds(ordering)),
        None if matches!(op, Comparison::Equal) => Ok(false),
        None if matches!(op, Comparison::NotEqual) => Ok(true),
        None => Err(ArborError::evaluation(
            tree.name(statement)?,
            format!(
                "cannot compare {} with {} using '{}'",
                a.type_name(),
                b.type_name(),
                op.as_str()
            ),
        )),
    }
}
