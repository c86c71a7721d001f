//! Evaluation of parsed expressions over a tree.

use std::cmp::Ordering;
use std::collections::HashSet;

use arbor_types::{ArborError, NodeId, Result, Tree, Value};

use crate::ast::{Logic, MatchKind, Pattern, Step, ValueLiteral};
use crate::format::{expression_text, is_expression_text};
use crate::matching::{Hit, Match};
use crate::parser::{parse, Expression};

/// Evaluate `expression` with `node` as its starting point.
pub fn evaluate(expression: &Expression, tree: &Tree, node: NodeId) -> Result<Match> {
    let nodes = eval_logic(tree, expression.body(), &[node])?;
    tracing::debug!(
        expression = expression.source(),
        start = %node,
        hits = nodes.len(),
        "evaluated expression"
    );
    let matched = build_match(tree, expression.kind(), &nodes)?;
    let matched = if expression.is_reference() {
        dereference(tree, expression.source(), matched)?
    } else {
        matched
    };
    match expression.cast() {
        Some(tag) => convert(tree, tag, matched),
        None => Ok(matched),
    }
}

/// Convert every hit value to the type named by `tag`. Empty values and
/// values already of that type are kept as they are.
fn convert(tree: &Tree, tag: &str, matched: Match) -> Result<Match> {
    let kind = matched.kind();
    let mut hits = matched.into_hits();
    for hit in &mut hits {
        if hit.value.is_none() || hit.value.type_name() == tag {
            continue;
        }
        hit.value = Value::from_typed(tag, &tree.stringify(&hit.value))?;
    }
    Ok(Match::new(kind, hits))
}

fn build_match(tree: &Tree, kind: MatchKind, nodes: &[NodeId]) -> Result<Match> {
    if kind == MatchKind::Count {
        let hit = Hit {
            node: None,
            value: Value::Integer(nodes.len() as i64),
        };
        return Ok(Match::new(kind, vec![hit]));
    }
    let mut hits = Vec::with_capacity(nodes.len());
    for &node in nodes {
        let value = match kind {
            MatchKind::Node => Value::Node(node),
            MatchKind::Value => tree.value(node)?.clone(),
            MatchKind::Name => Value::Text(tree.name(node)?.to_string()),
            MatchKind::Path => Value::Path(tree.path(node)?),
            MatchKind::Count => unreachable!("handled above"),
        };
        hits.push(Hit {
            node: Some(node),
            value,
        });
    }
    Ok(Match::new(kind, hits))
}

/// Resolve a `@@` match: hits holding expressions are replaced by the hits
/// of those expressions, evaluated relative to the hit's node.
fn dereference(tree: &Tree, source: &str, outer: Match) -> Result<Match> {
    let outer_kind = outer.kind();
    let mut inner_kind: Option<MatchKind> = None;
    let mut passed_through = false;
    let mut hits = Vec::new();
    for hit in outer.into_hits() {
        let text = match (&hit.value, hit.node) {
            (Value::Text(text), Some(node)) if is_expression_text(text) => {
                if outer_kind == MatchKind::Value {
                    expression_text(tree, node)?.unwrap_or_else(|| text.clone())
                } else {
                    text.clone()
                }
            }
            _ => {
                passed_through = true;
                hits.push(hit);
                continue;
            }
        };
        let Some(node) = hit.node else { continue };
        let inner = parse(&text)?.evaluate(tree, node)?;
        match inner_kind {
            None => inner_kind = Some(inner.kind()),
            Some(kind) if kind != inner.kind() => {
                return Err(ArborError::syntax(
                    source,
                    format!(
                        "referenced expressions yield different kinds ({} and {})",
                        kind,
                        inner.kind()
                    ),
                ))
            }
            Some(_) => {}
        }
        hits.extend(inner.into_hits());
    }
    let kind = inner_kind.unwrap_or(outer_kind);
    if passed_through && !matches!(kind, MatchKind::Value | MatchKind::Name) {
        return Err(ArborError::syntax(
            source,
            format!("cannot mix plain {outer_kind} hits with referenced {kind} hits"),
        ));
    }
    Ok(Match::new(kind, hits))
}

// ---------------------------------------------------------------------------
// Set combinators
// ---------------------------------------------------------------------------

fn eval_logic(tree: &Tree, logic: &Logic, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    match logic {
        Logic::Path(steps) => {
            let mut current = roots.to_vec();
            for step in steps {
                current = apply(tree, step, current)?;
                tracing::trace!(step = ?step, hits = current.len(), "applied iterator");
            }
            Ok(current)
        }
        Logic::Or(left, right) => {
            let mut out = eval_logic(tree, left, roots)?;
            out.extend(eval_logic(tree, right, roots)?);
            Ok(dedup(out))
        }
        Logic::And(left, right) => {
            let left = eval_logic(tree, left, roots)?;
            let right: HashSet<NodeId> = eval_logic(tree, right, roots)?.into_iter().collect();
            Ok(left.into_iter().filter(|n| right.contains(n)).collect())
        }
        Logic::Xor(left, right) => {
            let left = eval_logic(tree, left, roots)?;
            let right = eval_logic(tree, right, roots)?;
            let (in_left, in_right): (HashSet<NodeId>, HashSet<NodeId>) = (
                left.iter().copied().collect(),
                right.iter().copied().collect(),
            );
            let mut out: Vec<NodeId> = left.into_iter().filter(|n| !in_right.contains(n)).collect();
            out.extend(right.into_iter().filter(|n| !in_left.contains(n)));
            Ok(out)
        }
        Logic::Difference(left, right) => {
            let left = eval_logic(tree, left, roots)?;
            let right: HashSet<NodeId> = eval_logic(tree, right, roots)?.into_iter().collect();
            Ok(left.into_iter().filter(|n| !right.contains(n)).collect())
        }
        Logic::Complement(inner) => {
            let excluded: HashSet<NodeId> = eval_logic(tree, inner, roots)?.into_iter().collect();
            Ok(roots.iter().copied().filter(|n| !excluded.contains(n)).collect())
        }
    }
}

/// Keep the first occurrence of every node.
fn dedup(nodes: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::with_capacity(nodes.len());
    nodes.into_iter().filter(|n| seen.insert(*n)).collect()
}

// ---------------------------------------------------------------------------
// Iterators
// ---------------------------------------------------------------------------

fn apply(tree: &Tree, step: &Step, current: Vec<NodeId>) -> Result<Vec<NodeId>> {
    let out = match step {
        Step::Root => dedup(
            current
                .iter()
                .map(|&n| tree.top(n))
                .collect::<Result<Vec<_>>>()?,
        ),
        Step::Ancestor(levels) => {
            let mut out = Vec::with_capacity(current.len());
            for &node in &current {
                let mut at = node;
                for _ in 0..*levels {
                    at = tree.parent(at)?.ok_or_else(|| {
                        ArborError::address(format!(
                            "walking {} levels up from {} passes the top of the tree",
                            levels,
                            tree.path(node).map(|p| p.to_string()).unwrap_or_default()
                        ))
                    })?;
                }
                out.push(at);
            }
            dedup(out)
        }
        Step::NamedAncestor(name) => {
            let mut out = Vec::new();
            for &node in &current {
                let mut at = tree.parent(node)?;
                while let Some(candidate) = at {
                    if tree.name(candidate)? == name.as_str() {
                        out.push(candidate);
                        break;
                    }
                    at = tree.parent(candidate)?;
                }
            }
            dedup(out)
        }
        Step::Sibling(offset) => {
            let mut out = Vec::new();
            for &node in &current {
                if let Some(sibling) = tree.sibling(node, *offset)? {
                    out.push(sibling);
                }
            }
            dedup(out)
        }
        Step::Child(index) => {
            let mut out = Vec::new();
            for &node in &current {
                if let Some(child) = tree.child(node, *index)? {
                    out.push(child);
                }
            }
            out
        }
        Step::Children => {
            let mut out = Vec::new();
            for &node in &current {
                out.extend_from_slice(tree.children(node)?);
            }
            out
        }
        Step::Descendants => {
            let mut out = Vec::new();
            for &node in &current {
                out.extend(tree.descendants(node)?);
            }
            dedup(out)
        }
        Step::Named(name) => select_children(tree, &current, |child| {
            Ok(tree.name(child)? == name.as_str())
        })?,
        Step::Valued(literal) => select_children(tree, &current, |child| {
            value_matches(tree, tree.value(child)?, literal)
        })?,
        Step::NameRegex(pattern) => {
            let mut seen = HashSet::new();
            select_children(tree, &current, |child| {
                let name = tree.name(child)?;
                Ok(pattern_matches(pattern, name, &mut seen))
            })?
        }
        Step::ValueRegex(pattern) => {
            let mut seen = HashSet::new();
            select_children(tree, &current, |child| {
                let value = tree.value(child)?;
                if value.is_none() {
                    return Ok(false);
                }
                let text = tree.stringify(value);
                Ok(pattern_matches(pattern, &text, &mut seen))
            })?
        }
        Step::Range { start, end } => {
            let len = current.len();
            let from = start.unwrap_or(0).min(len);
            let to = end.unwrap_or(len).min(len);
            if from >= to {
                Vec::new()
            } else {
                current[from..to].to_vec()
            }
        }
        Step::Modulo { every, from_end } => {
            let len = current.len();
            current
                .into_iter()
                .enumerate()
                .filter(|(i, _)| {
                    let position = if *from_end { len - 1 - i } else { *i };
                    position % every == 0
                })
                .map(|(_, n)| n)
                .collect()
        }
        Step::Reference => {
            let mut out = Vec::new();
            for &node in &current {
                if let Value::Node(target) = tree.value(node)? {
                    if tree.contains(*target) {
                        out.push(*target);
                    }
                }
            }
            dedup(out)
        }
        Step::Parent => {
            let mut out = Vec::new();
            for &node in &current {
                if let Some(parent) = tree.parent(node)? {
                    out.push(parent);
                }
            }
            dedup(out)
        }
        Step::ShiftLeft => {
            let mut out = Vec::new();
            for &node in &current {
                out.extend(tree.previous_node(node)?);
            }
            dedup(out)
        }
        Step::ShiftRight => {
            let mut out = Vec::new();
            for &node in &current {
                out.extend(tree.next_node(node)?);
            }
            dedup(out)
        }
        Step::Group(logic) => eval_logic(tree, logic, &current)?,
    };
    Ok(out)
}

fn select_children(
    tree: &Tree,
    current: &[NodeId],
    mut keep: impl FnMut(NodeId) -> Result<bool>,
) -> Result<Vec<NodeId>> {
    let mut out = Vec::new();
    for &node in current {
        for &child in tree.children(node)? {
            if keep(child)? {
                out.push(child);
            }
        }
    }
    Ok(out)
}

fn value_matches(tree: &Tree, value: &Value, literal: &ValueLiteral) -> Result<bool> {
    if value.is_none() {
        return Ok(false);
    }
    Ok(match literal {
        ValueLiteral::Text(text) => tree.stringify(value) == *text,
        ValueLiteral::Typed(expected) => value.compare(expected) == Some(Ordering::Equal),
    })
}

fn pattern_matches(pattern: &Pattern, text: &str, seen: &mut HashSet<String>) -> bool {
    if !pattern.regex.is_match(text) {
        return false;
    }
    !pattern.distinct || seen.insert(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```text
    /// (root)
    ///   _data
    ///     a:1
    ///     b:2
    ///     c:3
    ///   _ref:node -> _data/b
    ///   exec
    /// ```
    fn sample() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.root();
        let data = tree.add_new(root, "_data", Value::None).unwrap();
        tree.add_new(data, "a", 1).unwrap();
        let b = tree.add_new(data, "b", 2).unwrap();
        tree.add_new(data, "c", 3).unwrap();
        tree.add_new(root, "_ref", Value::Node(b)).unwrap();
        let exec = tree.add_new(root, "exec", Value::None).unwrap();
        (tree, data, exec)
    }

    fn names(tree: &Tree, text: &str, at: NodeId) -> Vec<String> {
        let matched = parse(text).unwrap().evaluate(tree, at).unwrap();
        matched
            .nodes()
            .iter()
            .map(|&n| tree.name(n).unwrap().to_string())
            .collect()
    }

    #[test]
    fn root_children_and_named() {
        let (tree, _, exec) = sample();
        assert_eq!(names(&tree, "@/../*?node", exec), ["_data", "_ref", "exec"]);
        assert_eq!(names(&tree, "@/../_data/*?node", exec), ["a", "b", "c"]);
        assert_eq!(names(&tree, "@/../**?node", exec), ["_data", "a", "b", "c", "_ref", "exec"]);
    }

    #[test]
    fn siblings_parents_and_ancestors() {
        let (tree, data, exec) = sample();
        assert_eq!(names(&tree, "@/-?node", exec), ["_ref"]);
        assert_eq!(names(&tree, "@/-2?node", exec), ["_data"]);
        assert_eq!(names(&tree, "@/+?node", exec), Vec::<String>::new());
        assert_eq!(names(&tree, "@/*/.?node", data), ["_data"]);
        let a = tree.child(data, 0).unwrap().unwrap();
        assert_eq!(names(&tree, "@/..1?node", a), ["_data"]);
        assert_eq!(names(&tree, "@/.._data?node", a), ["_data"]);
        assert!(names(&tree, "@/..missing?node", a).is_empty());
        let err = parse("@/..5?node").unwrap().evaluate(&tree, a).unwrap_err();
        assert!(err.is_address(), "{err}");
    }

    #[test]
    fn extreme_sibling_offsets_select_nothing() {
        let (tree, data, _) = sample();
        let b = tree.child(data, 1).unwrap().unwrap();
        assert!(names(&tree, "@/+9223372036854775807?node", b).is_empty());
        assert!(names(&tree, "@/-9223372036854775807?node", b).is_empty());
    }

    #[test]
    fn shifts_walk_the_written_lines() {
        let (tree, data, exec) = sample();
        let root = tree.root();
        assert_eq!(names(&tree, "@/_data/>?node", root), ["a"]);
        assert_eq!(names(&tree, "@/_ref/<?node", root), ["c"]);
        assert_eq!(names(&tree, "@/0/<?node", data), ["_data"]);
        assert_eq!(names(&tree, "@/0/</<?node", data), [""]);
        assert!(names(&tree, "@/../<?node", exec).is_empty());
        assert_eq!(names(&tree, "@/*/>?node", data), ["b", "c", "_ref"]);
        assert!(names(&tree, "@/>?node", exec).is_empty());
    }

    #[test]
    fn conversion_suffix_converts_hit_values() {
        let (tree, data, exec) = sample();
        let values = |text: &str, at: NodeId| -> Vec<Value> {
            let matched = parse(text).unwrap().evaluate(&tree, at).unwrap();
            matched.iter().map(|hit| hit.value.clone()).collect()
        };
        assert_eq!(
            values("@/*?value.string", data),
            ["1", "2", "3"].map(|t| Value::Text(t.into()))
        );
        assert_eq!(values("@/*?value.float", data)[2], Value::Float(3.0));
        let path = values("@/../_ref?value.path", exec);
        assert!(matches!(&path[0], Value::Path(_)));
        assert_eq!(tree.stringify(&path[0]), "0-1");
        assert_eq!(values("@/../exec?value.int", exec), [Value::None]);

        let err = parse("@/*?name.int").unwrap().evaluate(&tree, data).unwrap_err();
        assert!(matches!(err, ArborError::InvalidLiteral { .. }), "{err}");
    }

    #[test]
    fn values_and_regex() {
        let (tree, data, _) = sample();
        assert_eq!(names(&tree, "@/=2?node", data), ["b"]);
        assert_eq!(names(&tree, "@/=:int:3?node", data), ["c"]);
        assert_eq!(names(&tree, r#"@/="/^[13]$/"?node"#, data), ["a", "c"]);
        assert_eq!(names(&tree, r#"@/"/^[ab]$/"?node"#, data), ["a", "b"]);
        let matched = parse("@/*?value").unwrap().evaluate(&tree, data).unwrap();
        assert_eq!(matched.single(&tree), Value::Text("123".into()));
    }

    #[test]
    fn distinct_regex_keeps_first_of_each_value() {
        let mut tree = Tree::new();
        let root = tree.root();
        for (name, value) in [("x", "1"), ("y", "1"), ("z", "2")] {
            tree.add_new(root, name, value).unwrap();
        }
        assert_eq!(names(&tree, r#"@/="/./d"?node"#, root), ["x", "z"]);
    }

    #[test]
    fn range_and_modulo() {
        let (tree, data, _) = sample();
        assert_eq!(names(&tree, "@/*/[1,]?node", data), ["b", "c"]);
        assert_eq!(names(&tree, "@/*/[,1]?node", data), ["a"]);
        assert_eq!(names(&tree, "@/*/[5,9]?node", data), Vec::<String>::new());
        assert_eq!(names(&tree, "@/*/%2?node", data), ["a", "c"]);
        assert_eq!(names(&tree, "@/*/[,2]/%2<?node", data), ["b"]);
    }

    #[test]
    fn reference_follows_node_values() {
        let (tree, _, exec) = sample();
        assert_eq!(names(&tree, "@/-/#?node", exec), ["b"]);
        assert_eq!(names(&tree, "@/-2/#?node", exec), Vec::<String>::new());
    }

    #[test]
    fn logical_combinators() {
        let (tree, data, _) = sample();
        assert_eq!(names(&tree, "@/a|/c|/a?node", data), ["a", "c"]);
        assert_eq!(names(&tree, "@/*&/b?node", data), ["b"]);
        assert_eq!(names(&tree, "@/*/[,2]^/*/[1,]?node", data), ["a", "c"]);
        assert_eq!(names(&tree, "@/*!/b?node", data), ["a", "c"]);
        assert_eq!(names(&tree, "@/(/a|/b)&/b?node", data), ["b"]);
        let c = tree.child(data, 2).unwrap().unwrap();
        assert_eq!(names(&tree, "@/.._data/(/a|/b)?node", c), ["a", "b"]);
        // complement is taken against the group's root set
        assert_eq!(names(&tree, "@/*/(!/-)?node", data), ["c"]);
        assert_eq!(names(&tree, "@/*/(!/+)?node", data), ["a"]);
    }

    #[test]
    fn set_algebra_properties() {
        let (tree, data, _) = sample();
        let count = |text: &str| parse(text).unwrap().evaluate(&tree, data).unwrap().count();
        let a = names(&tree, "@/*/[,2]?node", data);
        assert_eq!(names(&tree, "@/*/[,2]&/*/[,2]?node", data), a);
        assert!(count("@/*/[,2]|/*/[1,]?count") >= count("@/*/[,2]?count"));
        assert!(count("@/*/[,2]|/*/[1,]?count") >= count("@/*/[1,]?count"));
        assert_eq!(
            names(&tree, "@/*/(!(!/-))?node", data),
            names(&tree, "@/*/(/-)?node", data)
        );
    }

    #[test]
    fn kinds() {
        let (tree, data, _) = sample();
        let run = |text: &str| parse(text).unwrap().evaluate(&tree, data).unwrap();
        assert_eq!(run("@/*?count").count(), 3);
        assert_eq!(run("@/*?count").hits()[0].node, None);
        assert_eq!(run("@/b?name").hits()[0].value, Value::Text("b".into()));
        assert_eq!(run("@/b?path").hits()[0].value, Value::Path(vec![0, 1].into()));
        assert_eq!(run("@?value").hits()[0].value, Value::None);
        assert_eq!(run("@/b?node").hits()[0].value.as_node(), tree.child(data, 1).unwrap());
    }

    #[test]
    fn every_node_hit_resolves_back_to_itself() {
        let (tree, data, _) = sample();
        let matched = parse("@/../**?node").unwrap().evaluate(&tree, data).unwrap();
        for hit in &matched {
            let node = hit.node.unwrap();
            assert_eq!(tree.resolve(&tree.path(node).unwrap()).unwrap(), node);
        }
    }

    #[test]
    fn double_indirection() {
        let mut tree = Tree::new();
        let root = tree.root();
        let target = tree.add_new(root, "_target", "hello").unwrap();
        let pointer = tree.add_new(root, "_pointer", "@/../_target?value").unwrap();
        tree.add_new(root, "_plain", "literal").unwrap();

        let matched = parse("@@/../_pointer?value").unwrap().evaluate(&tree, pointer).unwrap();
        assert_eq!(matched.kind(), MatchKind::Value);
        assert_eq!(matched.hits()[0].node, Some(target));
        assert_eq!(matched.single(&tree), Value::Text("hello".into()));

        let mixed = parse("@@/../(/_pointer|/_plain)?value").unwrap().evaluate(&tree, root).unwrap();
        assert_eq!(mixed.single(&tree), Value::Text("helloliteral".into()));

        tree.add_new(root, "_nodes", "@/../_target?node").unwrap();
        let err = parse("@@/../(/_pointer|/_nodes)?value")
            .unwrap()
            .evaluate(&tree, root)
            .unwrap_err();
        assert!(err.is_syntax(), "{err}");
    }
}
