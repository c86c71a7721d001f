//! Lambda-defined events and dynamic overrides.
//!
//! ```text
//! event:greet
//!   overrides:hello          optional; value or one child per base
//!   lambda
//!     ...
//! delete-event:greet
//! override:hello
//!   with:greet
//! delete-override:hello
//!   with:greet
//! call-base                  only meaningful inside an overriding event
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use arbor_expr::evaluate_node;
use arbor_types::{ArborError, NodeId, Result, Tree};

use crate::context::Context;
use crate::handler::{EventHandler, Invocation};
use crate::handlers::execute_statements;

/// Scope that owns everything one `event:NAME` statement registered.
pub fn event_scope(name: &str) -> String {
    format!("event:{name}")
}

// ---------------------------------------------------------------------------
// LambdaEvent
// ---------------------------------------------------------------------------

/// Handler whose body is a program tree.
///
/// Each invocation grafts a fresh copy of the body into the caller's tree,
/// appends copies of the argument node's children, runs it, and writes the
/// copy's value and trailing children back onto the argument node.
pub struct LambdaEvent {
    body: Arc<Tree>,
}

impl LambdaEvent {
    pub fn new(body: Tree) -> Self {
        Self {
            body: Arc::new(body),
        }
    }
}

impl EventHandler for LambdaEvent {
    fn handle(&self, ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
        let tree = &mut *call.tree;
        let args = call.args;
        let copy = tree.graft(&self.body, self.body.root())?;
        let statements: HashSet<NodeId> = tree.children(copy)?.iter().copied().collect();
        for child in tree.children(args)?.to_vec() {
            let arg = tree.clone_subtree(child)?;
            tree.add(copy, arg)?;
        }
        tree.set_name(copy, call.name)?;
        let value = tree.value(args)?.clone();
        tree.set_value(copy, value)?;

        ctx.push_base(call.base.clone());
        let result = execute_statements(ctx, tree, copy, &statements);
        ctx.pop_base();

        let result = result.and_then(|()| write_back(tree, copy, args, &statements));
        tree.remove(copy)?;
        result
    }
}

/// Replace the caller's value and children with what the run left behind.
fn write_back(tree: &mut Tree, copy: NodeId, args: NodeId, body: &HashSet<NodeId>) -> Result<()> {
    if !tree.contains(args) {
        return Ok(());
    }
    let value = tree.value(copy)?.clone();
    tree.set_value(args, value)?;
    tree.clear_children(args)?;
    let results: Vec<NodeId> = tree
        .children(copy)?
        .iter()
        .copied()
        .filter(|child| !body.contains(child))
        .collect();
    for child in results {
        tree.detach(child)?;
        tree.add(args, child)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Text of a statement's value, evaluating it first when it is an expression.
pub(crate) fn argument_text(tree: &Tree, node: NodeId) -> Result<Option<String>> {
    let text = match evaluate_node(tree, node)? {
        Some(matched) => tree.stringify(&matched.single(tree)),
        None => tree.stringify(tree.value(node)?),
    };
    Ok(Some(text).filter(|t| !t.is_empty()))
}

fn required_name(tree: &Tree, node: NodeId, statement: &str) -> Result<String> {
    argument_text(tree, node)?
        .ok_or_else(|| ArborError::syntax(statement, format!("[{statement}] needs a name")))
}

/// Names listed by the child called `list`: its value, or its children's names.
fn listed_names(tree: &Tree, statement: NodeId, list: &str) -> Result<Vec<String>> {
    let Some(child) = tree.find_child(statement, list)? else {
        return Ok(Vec::new());
    };
    if let Some(name) = argument_text(tree, child)? {
        return Ok(vec![name]);
    }
    tree.children(child)?
        .iter()
        .map(|&c| tree.name(c).map(str::to_string))
        .collect()
}

/// `event:NAME` with a `lambda` child.
pub fn event(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let tree = &*call.tree;
    let node = call.args;
    let name = required_name(tree, node, "event")?;
    let Some(body) = tree.find_child(node, "lambda")? else {
        return Err(ArborError::syntax(
            "event",
            format!("[event:{name}] needs a [lambda] child"),
        ));
    };
    let bases = listed_names(tree, node, "overrides")?;
    let scope = event_scope(&name);

    ctx.unregister(&scope);
    ctx.register(name.clone(), scope.clone(), LambdaEvent::new(tree.extract(body)?));
    for base in bases {
        ctx.declare_override(base, name.clone(), Some(scope.clone()));
    }
    tracing::debug!(event = %name, "defined lambda event");
    Ok(())
}

pub fn delete_event(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let name = required_name(call.tree, call.args, "delete-event")?;
    ctx.unregister(&event_scope(&name));
    Ok(())
}

pub fn override_event(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let base = required_name(call.tree, call.args, "override")?;
    let names = listed_names(call.tree, call.args, "with")?;
    if names.is_empty() {
        return Err(ArborError::syntax("override", "[override] needs a [with] child"));
    }
    for name in names {
        ctx.override_event(base.clone(), name);
    }
    Ok(())
}

pub fn delete_override(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let base = required_name(call.tree, call.args, "delete-override")?;
    for name in listed_names(call.tree, call.args, "with")? {
        ctx.remove_override(&base, &name);
    }
    Ok(())
}

/// Raise the base of the overriding lambda event that is running, with the
/// `call-base` node as argument.
pub fn call_base(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    match ctx.base_frame() {
        Some(frame) => ctx.raise_base(&frame, call.tree, call.args),
        None => {
            tracing::debug!("call-base outside an override");
            Ok(())
        }
    }
}
