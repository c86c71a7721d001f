//! `if`, `else-if` and `else`.
//!
//! While a block runs, the context remembers for each branch that is
//! directly followed by `else-if` or `else` whether its chain has matched by
//! that point; the follower reads and clears its predecessor's entry. The
//! entries are dropped with the block.

use arbor_types::{ArborError, NodeId, Result, Tree};

use crate::condition::evaluate_condition;
use crate::context::Context;
use crate::handler::Invocation;
use crate::handlers::execute_body;

pub fn if_statement(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let matched = evaluate_condition(call.tree, call.args)?;
    tracing::debug!(matched, "if");
    record_outcome(ctx, call.tree, call.args, matched)?;
    if matched {
        execute_body(ctx, call.tree, call.args)?;
    }
    Ok(())
}

pub fn else_if_statement(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let previous = preceding_branch(call.tree, call.args, "else-if")?;
    let already = ctx.branch_outcome(previous).unwrap_or(false);
    ctx.clear_branch_outcome(previous);
    if already {
        return record_outcome(ctx, call.tree, call.args, true);
    }
    let matched = evaluate_condition(call.tree, call.args)?;
    tracing::debug!(matched, "else-if");
    record_outcome(ctx, call.tree, call.args, matched)?;
    if matched {
        execute_body(ctx, call.tree, call.args)?;
    }
    Ok(())
}

pub fn else_statement(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let previous = preceding_branch(call.tree, call.args, "else")?;
    let already = ctx.branch_outcome(previous).unwrap_or(false);
    ctx.clear_branch_outcome(previous);
    if !already {
        execute_body(ctx, call.tree, call.args)?;
    }
    Ok(())
}

/// Keep `matched` for the `else-if`/`else` directly after `node`, if any.
fn record_outcome(ctx: &mut Context, tree: &Tree, node: NodeId, matched: bool) -> Result<()> {
    if let Some(next) = tree.sibling(node, 1)? {
        if matches!(tree.name(next)?, "else-if" | "else") {
            ctx.set_branch_outcome(node, matched);
        }
    }
    Ok(())
}

/// The `if`/`else-if` sibling directly before `node`.
fn preceding_branch(tree: &Tree, node: NodeId, statement: &str) -> Result<NodeId> {
    match tree.sibling(node, -1)? {
        Some(previous) if matches!(tree.name(previous)?, "if" | "else-if") => Ok(previous),
        _ => Err(ArborError::syntax(
            statement,
            format!("[{statement}] must directly follow [if] or [else-if]"),
        )),
    }
}
