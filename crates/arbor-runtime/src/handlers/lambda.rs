//! `lambda`, `lambda.copy` and `lambda.immutable`.
//!
//! | statement          | runs against                     | writes survive |
//! |--------------------|----------------------------------|----------------|
//! | `lambda`           | the live tree                    | yes            |
//! | `lambda.immutable` | the live tree, restored after    | no             |
//! | `lambda.copy`      | a separate tree of its own body  | no             |
//!
//! A lambda whose value is a `?node` expression runs each referenced node
//! instead of its own children, with copies of its children appended as
//! arguments for the duration of the run.

use arbor_expr::evaluate_node;
use arbor_types::{NodeId, Result, Tree};

use crate::context::Context;
use crate::handler::Invocation;
use crate::handlers::execute_block;
use crate::handlers::mutation::node_hits;

pub fn lambda(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    run(ctx, call.tree, call.args)
}

pub fn lambda_immutable(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let snapshot = call.tree.clone();
    let result = run(ctx, call.tree, call.args);
    *call.tree = snapshot;
    result
}

pub fn lambda_copy(ctx: &mut Context, call: &mut Invocation<'_>) -> Result<()> {
    let tree = &*call.tree;
    let node = call.args;
    let targets = match evaluate_node(tree, node)? {
        Some(matched) => node_hits(tree, node, &matched)?,
        None => return run_detached(ctx, tree, node, None),
    };
    for target in targets {
        run_detached(ctx, tree, target, Some(node))?;
    }
    Ok(())
}

/// Run `body` (or every node its expression references) in place.
fn run(ctx: &mut Context, tree: &mut Tree, node: NodeId) -> Result<()> {
    let Some(matched) = evaluate_node(tree, node)? else {
        return execute_block(ctx, tree, node);
    };
    for target in node_hits(tree, node, &matched)? {
        if tree.contains(target) {
            run_with_arguments(ctx, tree, target, node)?;
        }
    }
    Ok(())
}

fn run_with_arguments(ctx: &mut Context, tree: &mut Tree, target: NodeId, args: NodeId) -> Result<()> {
    let mut appended = Vec::new();
    for child in tree.children(args)?.to_vec() {
        let copy = tree.clone_subtree(child)?;
        tree.add(target, copy)?;
        appended.push(copy);
    }
    let result = execute_block(ctx, tree, target);
    for copy in appended {
        if tree.contains(copy) {
            tree.remove(copy)?;
        }
    }
    result
}

/// Run a copy of `body` as the root of its own tree; nothing it does is
/// visible to `tree`.
fn run_detached(ctx: &mut Context, tree: &Tree, body: NodeId, args: Option<NodeId>) -> Result<()> {
    let mut copy = tree.extract(body)?;
    let root = copy.root();
    if let Some(args) = args {
        for &child in tree.children(args)? {
            let arg = copy.graft(tree, child)?;
            copy.add(root, arg)?;
        }
    }
    tracing::debug!(nodes = copy.len(), "running detached copy");
    execute_block(ctx, &mut copy, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::default_loader;
    use arbor_types::Value;
    use std::sync::Arc;

    fn context() -> Context {
        Context::new(Arc::new(default_loader())).unwrap()
    }

    /// `_x:5` next to a lambda of kind `name` that sets `_x` to 6 through
    /// an ancestor-relative expression.
    fn program(name: &str) -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.root();
        let x = tree.add_new(root, "_x", 5).unwrap();
        let lambda = tree.add_new(root, name, Value::None).unwrap();
        let set = tree.add_new(lambda, "set", "@/../_x?value").unwrap();
        tree.add_new(set, "source", 6).unwrap();
        (tree, x, lambda)
    }

    #[test]
    fn plain_lambda_mutates_the_surrounding_tree() {
        let mut ctx = context();
        let (mut tree, x, lambda) = program("lambda");
        ctx.raise("lambda", &mut tree, lambda).unwrap();
        assert_eq!(tree.value(x).unwrap(), &Value::Integer(6));
    }

    #[test]
    fn lambda_copy_cannot_see_its_surroundings() {
        let mut ctx = context();
        let (mut tree, x, lambda) = program("lambda.copy");
        ctx.raise("lambda.copy", &mut tree, lambda).unwrap();
        assert_eq!(tree.value(x).unwrap(), &Value::Integer(5));
    }

    #[test]
    fn lambda_immutable_reads_but_does_not_keep_writes() {
        let mut ctx = context();
        let (mut tree, x, lambda) = program("lambda.immutable");
        // The body also copies _x into a sibling, proving it could read outer nodes.
        let root = tree.root();
        let seen = tree.add_new(root, "_seen", Value::None).unwrap();
        let peek = tree.add_new(lambda, "set", "@/../_seen?value").unwrap();
        tree.add_new(peek, "source", "@/../_x?value").unwrap();
        let peek_again = tree.add_new(lambda, "if", "@/../_seen?value").unwrap();
        tree.add_new(peek_again, "=", 6).unwrap();
        let mark = tree.add_new(peek_again, "set", "@/../_x?name").unwrap();
        tree.add_new(mark, "source", "_read").unwrap();

        let before = tree.len();
        ctx.raise("lambda.immutable", &mut tree, lambda).unwrap();
        assert_eq!(tree.value(x).unwrap(), &Value::Integer(5));
        assert_eq!(tree.name(x).unwrap(), "_x");
        assert_eq!(tree.value(seen).unwrap(), &Value::None);
        assert_eq!(tree.len(), before);
    }

    #[test]
    fn expression_lambda_runs_referenced_code_with_arguments() {
        let mut ctx = context();
        let mut tree = Tree::new();
        let root = tree.root();
        let out = tree.add_new(root, "_out", Value::None).unwrap();
        let code = tree.add_new(root, "_code", Value::None).unwrap();
        let set = tree.add_new(code, "set", "@/../_out?value").unwrap();
        tree.add_new(set, "source", "@/././_arg?value").unwrap();
        let call = tree.add_new(root, "lambda", "@/../_code?node").unwrap();
        tree.add_new(call, "_arg", "hello").unwrap();

        ctx.raise("lambda", &mut tree, call).unwrap();
        assert_eq!(tree.value(out).unwrap(), &Value::Text("hello".into()));
        assert_eq!(tree.child_count(code).unwrap(), 1, "arguments removed again");
    }

    #[test]
    fn expression_lambda_copy_gets_arguments_in_its_own_tree() {
        let mut ctx = context();
        let mut tree = Tree::new();
        let root = tree.root();
        let code = tree.add_new(root, "_code", Value::None).unwrap();
        let set = tree.add_new(code, "set", "@/../_arg?value").unwrap();
        tree.add_new(set, "source", "changed").unwrap();
        let call = tree.add_new(root, "lambda.copy", "@/../_code?node").unwrap();
        let arg = tree.add_new(call, "_arg", "original").unwrap();

        ctx.raise("lambda.copy", &mut tree, call).unwrap();
        assert_eq!(tree.value(arg).unwrap(), &Value::Text("original".into()));
        assert_eq!(tree.child_count(code).unwrap(), 1);
    }
}
