//! Built-in statements and the block executor they share.

pub mod branching;
pub mod dynamic;
pub mod exceptions;
pub mod lambda;
pub mod loops;
pub mod mutation;

pub use dynamic::LambdaEvent;

use std::collections::HashSet;

use arbor_types::{NodeId, Result, Tree};

use crate::condition::is_condition_child;
use crate::context::Context;

/// `true` for `lambda`, `lambda.copy`, `lambda.immutable` and other
/// `lambda.*` names.
pub fn is_lambda(name: &str) -> bool {
    name == "lambda" || name.starts_with("lambda.")
}

/// Data children (empty or `_`-prefixed names) are never raised.
pub fn is_data(name: &str) -> bool {
    name.is_empty() || name.starts_with('_')
}

/// Raise every statement child of `block` in order.
pub fn execute_block(ctx: &mut Context, tree: &mut Tree, block: NodeId) -> Result<()> {
    run_children(ctx, tree, block, |_, _| false)
}

/// Like [`execute_block`], but only raises children listed in `statements`.
pub(crate) fn execute_statements(
    ctx: &mut Context,
    tree: &mut Tree,
    block: NodeId,
    statements: &HashSet<NodeId>,
) -> Result<()> {
    run_children(ctx, tree, block, |id, _| !statements.contains(&id))
}

/// Run the body of a control statement.
///
/// Its `lambda*` children run in order; without any, the statement's own
/// children run in place, minus condition operators.
pub fn execute_body(ctx: &mut Context, tree: &mut Tree, statement: NodeId) -> Result<()> {
    let mut lambdas = Vec::new();
    for &child in tree.children(statement)? {
        if is_lambda(tree.name(child)?) {
            lambdas.push(child);
        }
    }
    if lambdas.is_empty() {
        return run_children(ctx, tree, statement, |_, name| is_condition_child(name));
    }
    for lambda in lambdas {
        if !tree.contains(lambda) {
            continue;
        }
        let name = tree.name(lambda)?.to_string();
        ctx.raise(&name, tree, lambda)?;
    }
    Ok(())
}

fn run_children(
    ctx: &mut Context,
    tree: &mut Tree,
    block: NodeId,
    skip: impl Fn(NodeId, &str) -> bool,
) -> Result<()> {
    ctx.push_branch_frame();
    let result = run_children_in_frame(ctx, tree, block, skip);
    ctx.pop_branch_frame();
    result
}

fn run_children_in_frame(
    ctx: &mut Context,
    tree: &mut Tree,
    block: NodeId,
    skip: impl Fn(NodeId, &str) -> bool,
) -> Result<()> {
    let mut index = 0;
    while tree.contains(block) {
        let Some(child) = tree.child(block, index)? else {
            break;
        };
        let name = tree.name(child)?.to_string();
        if is_data(&name) || skip(child, &name) {
            index += 1;
            continue;
        }
        ctx.raise(&name, tree, child)?;
        // A statement that removed itself leaves its successor at `index`.
        if tree.contains(child) && tree.parent(child)? == Some(block) {
            index = tree.index_in_parent(child)?.map_or(index, |p| p + 1);
        }
    }
    Ok(())
}
