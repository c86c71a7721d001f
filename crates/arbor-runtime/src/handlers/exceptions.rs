//! `try`, `catch` and `throw`.
//!
//! A failing `try` directly followed by `catch` swallows the error: the
//! message and category are written into the `catch` node as `_message` and
//! `_type`, and the outcome is kept in the enclosing block's frame the way
//! branch outcomes are. Without a `catch` the error propagates.

use arbor_types::{ArborError, NodeId, Result, Tree, Value};

use crate::context::Context;
use crate::handler::Invocation;
use crate::handlers::dynamic::argument_text;
use crate::handlers::execute_body;

pub fn try_statement(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let result = execute_body(ctx, call.tree, call.args);
    if !call.tree.contains(call.args) {
        return result;
    }
    let Some(catch) = following_catch(call.tree, call.args)? else {
        return result;
    };
    match result {
        Ok(()) => ctx.set_branch_outcome(call.args, true),
        Err(err) => {
            tracing::debug!(error = %err, category = err.category(), "caught");
            bind_error(call.tree, catch, &err)?;
            ctx.set_branch_outcome(call.args, false);
        }
    }
    Ok(())
}

pub fn catch_statement(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let previous = match call.tree.sibling(call.args, -1)? {
        Some(previous) if call.tree.name(previous)? == "try" => previous,
        _ => {
            return Err(ArborError::syntax(
                "catch",
                "[catch] must directly follow [try]",
            ))
        }
    };
    let failed = ctx.branch_outcome(previous) == Some(false);
    ctx.clear_branch_outcome(previous);
    if failed {
        execute_body(ctx, call.tree, call.args)?;
    }
    Ok(())
}

/// Fail with the statement's value, evaluated when it is an expression.
pub fn throw(_ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let message = argument_text(call.tree, call.args)?.unwrap_or_else(|| "no message".into());
    Err(ArborError::thrown(message))
}

fn following_catch(tree: &Tree, node: NodeId) -> Result<Option<NodeId>> {
    match tree.sibling(node, 1)? {
        Some(next) if tree.name(next)? == "catch" => Ok(Some(next)),
        _ => Ok(None),
    }
}

/// Set `_message` and `_type` on `catch`, replacing those of an earlier error.
fn bind_error(tree: &mut Tree, catch: NodeId, err: &ArborError) -> Result<()> {
    let fields = [
        ("_message", err.to_string()),
        ("_type", err.category().to_string()),
    ];
    for (index, (name, text)) in fields.into_iter().enumerate() {
        match tree.find_child(catch, name)? {
            Some(existing) => tree.set_value(existing, Value::Text(text))?,
            None => {
                let node = tree.create(name, Value::Text(text));
                tree.insert(catch, index, node)?;
            }
        }
    }
    Ok(())
}
