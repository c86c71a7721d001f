//! `set`, `add`, `append`, `insert-before` and `insert-after`.

use arbor_expr::{
    evaluate_node, expression_text, format_node, is_formatted, parse, Hit, Match, MatchKind,
};
use arbor_types::{Address, ArborError, NodeId, Result, Tree, Value};

use crate::context::Context;
use crate::handler::Invocation;

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

/// The match a statement's expression selects, or the statement itself as a
/// `?value` hit when it holds no expression.
fn destination(tree: &Tree, statement: NodeId) -> Result<Match> {
    if let Some(matched) = evaluate_node(tree, statement)? {
        return Ok(matched);
    }
    Ok(Match::new(
        MatchKind::Value,
        vec![Hit {
            node: Some(statement),
            value: tree.value(statement)?.clone(),
        }],
    ))
}

fn source_child(tree: &Tree, statement: NodeId) -> Result<Option<(NodeId, bool)>> {
    let mut found = None;
    for &child in tree.children(statement)? {
        let relative = match tree.name(child)? {
            "source" => false,
            "rel-source" => true,
            _ => continue,
        };
        if found.is_some() {
            return Err(ArborError::syntax(
                tree.name(statement)?,
                "only one [source] or [rel-source] is allowed",
            ));
        }
        found = Some((child, relative));
    }
    Ok(found)
}

/// Evaluate the expression held by `holder` relative to `origin`.
fn evaluate_from(tree: &Tree, holder: NodeId, origin: NodeId) -> Result<Option<Match>> {
    match expression_text(tree, holder)? {
        Some(text) => parse(&text)?.evaluate(tree, origin).map(Some),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

/// Overwrite the destination's value, name, node or position with a source.
pub fn set(_ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let tree = &mut *call.tree;
    let statement = call.args;
    let target = destination(tree, statement)?;
    let source = source_child(tree, statement)?;
    tracing::debug!(kind = %target.kind(), hits = target.len(), "set");

    match target.kind() {
        MatchKind::Count => Err(ArborError::syntax(
            tree.name(statement)?,
            "cannot set a ?count destination",
        )),
        MatchKind::Value | MatchKind::Name => set_values(tree, &target, source),
        MatchKind::Node => set_nodes(tree, statement, &target, source),
        MatchKind::Path => move_nodes(tree, statement, &target, source),
    }
}

/// Value a source yields for one destination.
fn source_value(tree: &Tree, source: NodeId, origin: NodeId) -> Result<Value> {
    if let Some(matched) = evaluate_from(tree, source, origin)? {
        return Ok(matched.single(tree));
    }
    if is_formatted(tree, source)? {
        return format_node(tree, source).map(Value::Text);
    }
    match tree.value(source)? {
        Value::Text(text) if text.starts_with('\\') => Ok(Value::Text(text[1..].to_string())),
        Value::None => match tree.children(source)? {
            [only] => Ok(Value::Node(*only)),
            _ => Ok(Value::None),
        },
        other => Ok(other.clone()),
    }
}

fn set_values(tree: &mut Tree, target: &Match, source: Option<(NodeId, bool)>) -> Result<()> {
    let fixed = match source {
        Some((node, false)) => Some(source_value(tree, node, node)?),
        _ => None,
    };
    for hit in target {
        let Some(node) = hit.node.filter(|&n| tree.contains(n)) else {
            continue;
        };
        let value = match source {
            None => Value::None,
            Some((src, true)) => source_value(tree, src, node)?,
            Some(_) => fixed.clone().unwrap_or_default(),
        };
        if target.kind() == MatchKind::Name {
            let name = tree.stringify(&value);
            tree.set_name(node, name)?;
        } else {
            tree.set_value(node, value)?;
        }
    }
    Ok(())
}

/// The single node a `?node` source supplies for `origin`.
fn source_node(tree: &Tree, statement: NodeId, source: NodeId, origin: NodeId) -> Result<NodeId> {
    let nodes = match evaluate_from(tree, source, origin)? {
        Some(matched) => node_hits(tree, statement, &matched)?,
        None => match tree.value(source)? {
            Value::Node(target) if tree.contains(*target) => vec![*target],
            _ => tree.children(source)?.to_vec(),
        },
    };
    match nodes.as_slice() {
        [only] => Ok(*only),
        other => Err(ArborError::syntax(
            tree.name(statement)?,
            format!("a ?node destination needs exactly one source node, got {}", other.len()),
        )),
    }
}

fn set_nodes(
    tree: &mut Tree,
    statement: NodeId,
    target: &Match,
    source: Option<(NodeId, bool)>,
) -> Result<()> {
    let destinations = target.nodes();
    let Some((source, relative)) = source else {
        for node in destinations {
            if !tree.contains(node) {
                continue;
            }
            if tree.parent(node)?.is_some() {
                tree.remove(node)?;
            } else {
                tree.clear_children(node)?;
                tree.set_value(node, Value::None)?;
            }
        }
        return Ok(());
    };

    // Clone a fixed source up front: replacing the first destination may
    // destroy the original.
    let template = if relative {
        None
    } else {
        let node = source_node(tree, statement, source, source)?;
        Some(tree.clone_subtree(node)?)
    };
    let result = replace_each(tree, statement, &destinations, source, template);
    if let Some(template) = template {
        tree.remove(template)?;
    }
    result
}

fn replace_each(
    tree: &mut Tree,
    statement: NodeId,
    destinations: &[NodeId],
    source: NodeId,
    template: Option<NodeId>,
) -> Result<()> {
    for &node in destinations {
        if !tree.contains(node) {
            continue;
        }
        let original = match template {
            Some(t) => t,
            None => source_node(tree, statement, source, node)?,
        };
        let copy = tree.clone_subtree(original)?;
        match tree.parent(node)? {
            Some(parent) => {
                let index = tree.index_in_parent(node)?.unwrap_or(0);
                tree.remove(node)?;
                tree.insert(parent, index, copy)?;
            }
            None => {
                let name = tree.name(copy)?.to_string();
                let value = tree.value(copy)?.clone();
                tree.set_name(node, name)?;
                tree.set_value(node, value)?;
                tree.clear_children(node)?;
                for child in tree.children(copy)?.to_vec() {
                    tree.detach(child)?;
                    tree.add(node, child)?;
                }
                tree.remove(copy)?;
            }
        }
    }
    Ok(())
}

fn target_address(tree: &Tree, statement: NodeId, value: &Value) -> Result<Address> {
    match value {
        Value::Path(address) => Ok(address.clone()),
        Value::Text(text) => text.parse(),
        Value::Node(id) => tree.path(*id),
        other => Err(ArborError::syntax(
            tree.name(statement)?,
            format!("cannot move a node to a {} value", other.type_name()),
        )),
    }
}

/// Relocate each destination to the address its source yields.
fn move_nodes(
    tree: &mut Tree,
    statement: NodeId,
    target: &Match,
    source: Option<(NodeId, bool)>,
) -> Result<()> {
    let Some((source, relative)) = source else {
        return Err(ArborError::syntax(
            tree.name(statement)?,
            "a ?path destination needs a [source]",
        ));
    };
    for node in target.nodes() {
        if !tree.contains(node) {
            continue;
        }
        let origin = if relative { node } else { source };
        let value = source_value(tree, source, origin)?;
        let address = target_address(tree, statement, &value)?;
        move_node(tree, node, &address)?;
    }
    Ok(())
}

/// Move `node` so it becomes child `index` of the node at the parent part of
/// `address`, resolved in the tree as it is before the move.
fn move_node(tree: &mut Tree, node: NodeId, address: &Address) -> Result<()> {
    let (Some(parent_address), Some(index)) = (address.parent(), address.last()) else {
        return Err(ArborError::address("cannot move a node to the top of its tree"));
    };
    let Some(old_parent) = tree.parent(node)? else {
        return Err(ArborError::address("cannot move the top of a tree"));
    };
    let top = tree.top(node)?;
    let new_parent = tree.resolve_from(top, &parent_address)?;
    if tree.is_ancestor_or_self(node, new_parent)? {
        return Err(ArborError::address(format!(
            "cannot move {} into its own subtree at {}",
            tree.path(node)?,
            address
        )));
    }
    let old_index = tree.index_in_parent(node)?.unwrap_or(0);

    tree.detach(node)?;
    if let Err(err) = tree.insert(new_parent, index, node) {
        tree.insert(old_parent, old_index, node)?;
        return Err(err);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// add / append / insert-before / insert-after
// ---------------------------------------------------------------------------

/// Where copies land relative to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    FirstChildren,
    LastChildren,
    Before,
    After,
}

/// Insert copies of the sources before the destination's existing children.
pub fn add(_ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    insert_copies(call.tree, call.args, Placement::FirstChildren)
}

/// Append copies of the sources after the destination's existing children.
pub fn append(_ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    insert_copies(call.tree, call.args, Placement::LastChildren)
}

/// Insert copies of the sources as siblings directly before each destination.
pub fn insert_before(_ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    insert_copies(call.tree, call.args, Placement::Before)
}

/// Insert copies of the sources as siblings directly after each destination.
pub fn insert_after(_ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    insert_copies(call.tree, call.args, Placement::After)
}

/// Nodes of a `?node` match, or the targets of a `?value` match's references.
pub(crate) fn node_hits(tree: &Tree, statement: NodeId, matched: &Match) -> Result<Vec<NodeId>> {
    match matched.kind() {
        MatchKind::Node => Ok(matched.nodes()),
        MatchKind::Value => matched
            .iter()
            .map(|hit| match hit.value {
                Value::Node(target) if tree.contains(target) => Ok(target),
                ref other => Err(ArborError::syntax(
                    tree.name(statement)?,
                    format!("expected a node reference, found a {} value", other.type_name()),
                )),
            })
            .collect(),
        kind => Err(ArborError::syntax(
            tree.name(statement)?,
            format!("?{} cannot be used where nodes are expected", kind),
        )),
    }
}

fn insert_copies(tree: &mut Tree, statement: NodeId, placement: Placement) -> Result<()> {
    let destinations = match evaluate_node(tree, statement)? {
        Some(matched) => node_hits(tree, statement, &matched)?,
        None if matches!(placement, Placement::Before | Placement::After) => {
            return Err(ArborError::syntax(
                tree.name(statement)?,
                "a destination expression is required",
            ))
        }
        None => vec![statement],
    };

    let mut sources = Vec::new();
    for &child in tree.children(statement)? {
        if tree.name(child)? != "source" {
            continue;
        }
        match evaluate_node(tree, child)? {
            Some(matched) => sources.extend(node_hits(tree, statement, &matched)?),
            None if tree.child_count(child)? > 0 => sources.extend_from_slice(tree.children(child)?),
            None => match tree.value(child)? {
                Value::None => {}
                Value::Node(target) if tree.contains(*target) => sources.push(*target),
                _ => {
                    return Err(ArborError::syntax(
                        tree.name(statement)?,
                        "a [source] must be an expression, a node reference or hold child nodes",
                    ))
                }
            },
        }
    }
    tracing::debug!(
        destinations = destinations.len(),
        sources = sources.len(),
        ?placement,
        "inserting copies"
    );

    let mut templates = Vec::with_capacity(sources.len());
    for source in sources {
        templates.push(tree.clone_subtree(source)?);
    }
    let result = insert_all(tree, statement, &destinations, &templates, placement);
    for template in templates {
        tree.remove(template)?;
    }
    result
}

fn insert_all(
    tree: &mut Tree,
    statement: NodeId,
    destinations: &[NodeId],
    templates: &[NodeId],
    placement: Placement,
) -> Result<()> {
    for &destination in destinations {
        if !tree.contains(destination) {
            continue;
        }
        let (parent, first) = match placement {
            Placement::FirstChildren => (destination, 0),
            Placement::LastChildren => (destination, tree.child_count(destination)?),
            Placement::Before | Placement::After => {
                let (Some(parent), Some(index)) =
                    (tree.parent(destination)?, tree.index_in_parent(destination)?)
                else {
                    return Err(ArborError::syntax(
                        tree.name(statement)?,
                        "cannot insert beside a node without a parent",
                    ));
                };
                (parent, if placement == Placement::After { index + 1 } else { index })
            }
        };
        for (offset, &template) in templates.iter().enumerate() {
            let copy = tree.clone_subtree(template)?;
            tree.insert(parent, first + offset, copy)?;
        }
    }
    Ok(())
}
