//! `while` and `for-each`.
//!
//! Both snapshot their own subtree before the first pass and restore it after
//! every pass, so a body that consumes or rewrites its own code still runs
//! unchanged next time.

use arbor_expr::{evaluate_node, MatchKind};
use arbor_types::{ArborError, NodeId, Result, Tree, Value};

use crate::condition::evaluate_condition;
use crate::context::Context;
use crate::handler::Invocation;
use crate::handlers::execute_body;

/// Name of the placeholder child that points at the current `for-each` item.
pub const CURRENT: &str = "_dp";

pub fn while_statement(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let tree = &mut *call.tree;
    let node = call.args;
    let template = tree.clone_subtree(node)?;

    let mut passes = 0usize;
    let result = (|| -> Result<()> {
        while tree.contains(node) && evaluate_condition(tree, node)? {
            let pass = execute_body(ctx, tree, node);
            restore(tree, node, template)?;
            pass?;
            passes += 1;
        }
        Ok(())
    })();
    tree.remove(template)?;
    tracing::debug!(passes, "while finished");
    result
}

pub fn for_each(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let tree = &mut *call.tree;
    let node = call.args;
    let items = match evaluate_node(tree, node)? {
        Some(matched) if matched.kind() == MatchKind::Node => matched.nodes(),
        Some(matched) => {
            return Err(ArborError::syntax(
                "for-each",
                format!("[for-each] needs a ?node expression, not ?{}", matched.kind()),
            ))
        }
        None => {
            return Err(ArborError::syntax(
                "for-each",
                "[for-each] needs a ?node expression",
            ))
        }
    };
    let template = tree.clone_subtree(node)?;

    let result = (|| -> Result<()> {
        for item in items {
            if !tree.contains(node) {
                break;
            }
            if !tree.contains(item) {
                continue;
            }
            let current = tree.create(CURRENT, Value::Node(item));
            tree.insert(node, 0, current)?;
            let pass = execute_body(ctx, tree, node);
            restore(tree, node, template)?;
            pass?;
        }
        Ok(())
    })();
    tree.remove(template)?;
    result
}

/// Replace the children of `node` with fresh copies of the template's.
fn restore(tree: &mut Tree, node: NodeId, template: NodeId) -> Result<()> {
    if !tree.contains(node) {
        return Ok(());
    }
    tree.clear_children(node)?;
    for child in tree.children(template)?.to_vec() {
        let copy = tree.clone_subtree(child)?;
        tree.add(node, copy)?;
    }
    Ok(())
}
