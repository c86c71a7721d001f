//! Expression detection and `{N}` formatting.
//!
//! A node whose text value contains `{0}`, `{1}`, ... placeholders and that has
//! children with empty names is *formatted*: each empty-named child supplies
//! one positional argument.

use arbor_types::{ArborError, NodeId, Result, Tree, Value};

use crate::matching::Match;
use crate::parser::parse;

/// A text value is an expression iff it starts with `@` and contains `?`.
pub fn is_expression_text(text: &str) -> bool {
    text.starts_with('@') && text.contains('?')
}

pub fn is_expression(value: &Value) -> bool {
    value.as_text().is_some_and(is_expression_text)
}

/// `true` if `node` has a text value and at least one empty-named child.
pub fn is_formatted(tree: &Tree, node: NodeId) -> Result<bool> {
    if tree.value(node)?.as_text().is_none() {
        return Ok(false);
    }
    for &child in tree.children(node)? {
        if tree.name(child)?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Substitute the placeholders of `node`'s value with its arguments.
pub fn format_node(tree: &Tree, node: NodeId) -> Result<String> {
    let template = tree.value(node)?.as_text().unwrap_or_default().to_string();
    let mut args = Vec::new();
    for &child in tree.children(node)? {
        if tree.name(child)?.is_empty() {
            args.push(format_argument(tree, child)?);
        }
    }
    substitute(&template, &args)
}

fn format_argument(tree: &Tree, node: NodeId) -> Result<String> {
    if let Some(matched) = evaluate_node(tree, node)? {
        return Ok(tree.stringify(&matched.single(tree)));
    }
    if is_formatted(tree, node)? {
        return format_node(tree, node);
    }
    Ok(tree.stringify(tree.value(node)?))
}

/// Replace `{N}` with `args[N]`; `{{` and `}}` are literal braces.
pub fn substitute(template: &str, args: &[String]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let rest = &template[pos + 1..];
                let close = rest
                    .find('}')
                    .ok_or_else(|| ArborError::syntax(template, "unclosed '{' in formatted value"))?;
                let index: usize = rest[..close].trim().parse().map_err(|_| {
                    ArborError::syntax(template, format!("'{{{}}}' is not a placeholder", &rest[..close]))
                })?;
                let arg = args.get(index).ok_or_else(|| {
                    ArborError::syntax(
                        template,
                        format!("placeholder {{{index}}} has no argument ({} given)", args.len()),
                    )
                })?;
                out.push_str(arg);
                for _ in 0..=close {
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Expression text held by `node`, formatted when it has arguments.
///
/// `None` when the node's value is not an expression.
pub fn expression_text(tree: &Tree, node: NodeId) -> Result<Option<String>> {
    let Some(text) = tree.value(node)?.as_text() else {
        return Ok(None);
    };
    if !is_expression_text(text) {
        return Ok(None);
    }
    if is_formatted(tree, node)? {
        return format_node(tree, node).map(Some);
    }
    Ok(Some(text.to_string()))
}

/// Evaluate the expression held by `node`, relative to `node`.
///
/// Returns `None` when the node's value is not an expression.
pub fn evaluate_node(tree: &Tree, node: NodeId) -> Result<Option<Match>> {
    match expression_text(tree, node)? {
        Some(text) => parse(&text)?.evaluate(tree, node).map(Some),
        None => Ok(None),
    }
}
