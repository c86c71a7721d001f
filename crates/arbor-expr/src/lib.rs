//! Path-query expressions over Arbor node trees.
//!
//! An expression such as `@/../_data/*?value` is a `/`-separated pipeline of
//! iterators ending in a type declaration. Each iterator consumes the running
//! node set and produces the next; pipelines combine with `|` (union), `^`
//! (symmetric difference), `&` (intersection) and `!` (difference/complement),
//! grouped with parentheses. Evaluation never mutates the tree.
//!
//! Entry points:
//! - [`parse`]: text to [`Expression`]
//! - [`Expression::evaluate`] / [`evaluate`]: expression and start node to [`Match`]
//! - [`evaluate_node`]: evaluate the (possibly formatted) expression a node holds

mod ast;
mod eval;
mod format;
mod matching;
mod parser;
mod token;

pub use ast::{Logic, MatchKind, Pattern, Step, ValueLiteral};
pub use eval::evaluate;
pub use format::{
    evaluate_node, expression_text, format_node, is_expression, is_expression_text, is_formatted,
    substitute,
};
pub use matching::{Hit, Match};
pub use parser::{parse, Expression};
pub use token::{tokenize, Token, Tokenized};
