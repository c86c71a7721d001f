//! Recursive-descent parser from tokens to an iterator-pipeline AST.
//!
//! ```text
//! expression ::= '@' ['@'] logic '?' kind ['.' type]
//! logic      ::= xor ( '|' xor )*
//! xor        ::= and ( '^' and )*
//! and        ::= diff ( '&' diff )*
//! diff       ::= unary ( '!' unary )*
//! unary      ::= '!' unary | path
//! path       ::= ( '/' | iterator | '(' logic ')' )*
//! ```

use arbor_types::{ArborError, Result, Tree, Value, TYPE_TAGS};
use regex::RegexBuilder;

use crate::ast::{Logic, MatchKind, Pattern, Step, ValueLiteral};
use crate::matching::Match;
use crate::token::{tokenize, Token};

/// A parsed expression, ready to be evaluated any number of times.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    reference: bool,
    body: Logic,
    kind: MatchKind,
    cast: Option<String>,
}

impl Expression {
    /// The text this expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Type tag hit values are converted to, from a `?kind.type` suffix.
    pub fn cast(&self) -> Option<&str> {
        self.cast.as_deref()
    }

    /// `true` for `@@` expressions.
    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn body(&self) -> &Logic {
        &self.body
    }

    /// Evaluate relative to `node`. Never mutates the tree.
    pub fn evaluate(&self, tree: &Tree, node: arbor_types::NodeId) -> Result<Match> {
        crate::eval::evaluate(self, tree, node)
    }
}

/// Parse expression text.
pub fn parse(text: &str) -> Result<Expression> {
    let tokenized = tokenize(text)?;
    let mut parser = Parser {
        source: text,
        tokens: tokenized.tokens,
        pos: 0,
    };
    let body = parser.logic()?;
    match parser.next() {
        Some(Token::Question) => {}
        Some(Token::Close) => {
            return Err(ArborError::syntax(
                text,
                "missing opening parenthesis, or too many closing parentheses",
            ))
        }
        Some(other) => {
            return Err(ArborError::syntax(
                other.describe(),
                format!("unexpected token in '{text}'"),
            ))
        }
        None => {
            return Err(ArborError::syntax(
                text,
                "missing '?' type declaration at end of expression",
            ))
        }
    }
    let (kind, cast) = match parser.next() {
        Some(Token::Word(word)) => type_declaration(&word)?,
        Some(other) => {
            return Err(ArborError::syntax(
                other.describe(),
                "expected a type declaration after '?'",
            ))
        }
        None => return Err(ArborError::syntax(text, "empty type declaration")),
    };
    if let Some(extra) = parser.next() {
        return Err(ArborError::syntax(
            extra.describe(),
            "unexpected token after type declaration",
        ));
    }
    if tokenized.reference && !matches!(kind, MatchKind::Value | MatchKind::Name) {
        return Err(ArborError::syntax(
            text,
            "only 'value' and 'name' expressions can be reference expressions",
        ));
    }
    tracing::trace!(expression = text, kind = %kind, "parsed expression");
    Ok(Expression {
        source: text.to_string(),
        reference: tokenized.reference,
        body,
        kind,
        cast,
    })
}

/// Split `kind[.type]` and check the cast applies to the kind.
fn type_declaration(word: &str) -> Result<(MatchKind, Option<String>)> {
    let Some((kind, tag)) = word.split_once('.') else {
        return Ok((word.parse()?, None));
    };
    let kind: MatchKind = kind.parse()?;
    if !matches!(kind, MatchKind::Value | MatchKind::Name | MatchKind::Path) {
        return Err(ArborError::syntax(
            word,
            format!("'{kind}' expressions cannot be converted"),
        ));
    }
    if tag == "node" || !TYPE_TAGS.contains(&tag) {
        return Err(ArborError::syntax(
            word,
            format!("cannot convert to '{tag}'"),
        ));
    }
    Ok((kind, Some(tag.to_string())))
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn logic(&mut self) -> Result<Logic> {
        let mut left = self.xor()?;
        while self.eat(&Token::Or) {
            let right = self.xor()?;
            left = Logic::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn xor(&mut self) -> Result<Logic> {
        let mut left = self.and()?;
        while self.eat(&Token::Xor) {
            let right = self.and()?;
            left = Logic::Xor(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Logic> {
        let mut left = self.difference()?;
        while self.eat(&Token::And) {
            let right = self.difference()?;
            left = Logic::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn difference(&mut self) -> Result<Logic> {
        let mut left = self.unary()?;
        while self.eat(&Token::Not) {
            let right = self.unary()?;
            left = Logic::Difference(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Logic> {
        if self.eat(&Token::Not) {
            let inner = self.unary()?;
            return Ok(Logic::Complement(Box::new(inner)));
        }
        self.path()
    }

    fn path(&mut self) -> Result<Logic> {
        let mut steps = Vec::new();
        let mut after_slash = false;
        loop {
            let step = match self.peek() {
                Some(Token::Slash) => {
                    self.pos += 1;
                    if after_slash {
                        // `//` selects children with an empty name
                        steps.push(Step::Named(String::new()));
                    }
                    after_slash = true;
                    continue;
                }
                Some(Token::Open) => {
                    self.pos += 1;
                    let inner = self.logic()?;
                    if !self.eat(&Token::Close) {
                        return Err(ArborError::syntax(
                            self.source,
                            "expression contains an unclosed group",
                        ));
                    }
                    Step::Group(Box::new(inner))
                }
                Some(Token::Word(word)) => {
                    let word = word.clone();
                    self.pos += 1;
                    word_step(&word)?
                }
                Some(Token::Quoted(text)) => {
                    let text = text.clone();
                    self.pos += 1;
                    quoted_step(&text)?
                }
                Some(Token::QuotedValue(text)) => {
                    let text = text.clone();
                    self.pos += 1;
                    match split_regex(&text)? {
                        Some(pattern) => Step::ValueRegex(pattern),
                        None => Step::Valued(ValueLiteral::Text(text)),
                    }
                }
                _ => break,
            };
            steps.push(step);
            after_slash = false;
        }
        Ok(Logic::Path(steps))
    }
}

fn is_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn number(text: &str, token: &str) -> Result<usize> {
    if !is_number(text) {
        return Err(ArborError::syntax(token, "expected an integer"));
    }
    text.parse()
        .map_err(|_| ArborError::syntax(token, "integer out of range"))
}

fn word_step(word: &str) -> Result<Step> {
    let step = match word {
        "*" => Step::Children,
        "**" => Step::Descendants,
        "." => Step::Parent,
        ".." => Step::Root,
        "#" => Step::Reference,
        "<" => Step::ShiftLeft,
        ">" => Step::ShiftRight,
        _ if word.starts_with('=') => Step::Valued(value_literal(&word[1..], word)?),
        _ if word.starts_with('[') => range_step(word)?,
        _ if word.starts_with("..") => {
            let rest = &word[2..];
            if is_number(rest) {
                Step::Ancestor(number(rest, word)?)
            } else {
                Step::NamedAncestor(rest.to_string())
            }
        }
        _ if word.starts_with('%') => modulo_step(word)?,
        _ if word.starts_with('-') || word.starts_with('+') => {
            let rest = &word[1..];
            let magnitude = if rest.is_empty() {
                1
            } else {
                isize::try_from(number(rest, word)?)
                    .map_err(|_| ArborError::syntax(word, "sibling offset out of range"))?
            };
            Step::Sibling(if word.starts_with('-') {
                -magnitude
            } else {
                magnitude
            })
        }
        _ if is_number(word) => Step::Child(number(word, word)?),
        _ => Step::Named(word.to_string()),
    };
    Ok(step)
}

fn quoted_step(text: &str) -> Result<Step> {
    if let Some(pattern) = split_regex(text)? {
        return Ok(Step::NameRegex(pattern));
    }
    if let Some(name) = text.strip_prefix("..") {
        if !name.is_empty() {
            return Ok(Step::NamedAncestor(name.to_string()));
        }
    }
    Ok(Step::Named(text.to_string()))
}

fn value_literal(literal: &str, token: &str) -> Result<ValueLiteral> {
    if let Some(escaped) = literal.strip_prefix('\\') {
        return Ok(ValueLiteral::Text(escaped.to_string()));
    }
    if let Some(typed) = literal.strip_prefix(':') {
        let (tag, rest) = typed.split_once(':').ok_or_else(|| {
            ArborError::syntax(token, "typed value needs the form '=:type:literal'")
        })?;
        let value = Value::from_typed(tag, rest)
            .map_err(|err| ArborError::syntax(token, err.to_string()))?;
        return Ok(ValueLiteral::Typed(value));
    }
    Ok(ValueLiteral::Text(literal.to_string()))
}

/// Split `/pattern/flags`; `None` when the text has no slash delimiters.
fn split_regex(text: &str) -> Result<Option<Pattern>> {
    let Some(body) = text.strip_prefix('/') else {
        return Ok(None);
    };
    let Some(close) = body.rfind('/') else {
        return Ok(None);
    };
    let (pattern, flags) = (&body[..close], &body[close + 1..]);
    let mut builder = RegexBuilder::new(pattern);
    let mut distinct = false;
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'd' => distinct = true,
            other => {
                return Err(ArborError::syntax(
                    text,
                    format!("unknown regular expression flag '{other}'"),
                ))
            }
        }
    }
    let regex = builder
        .build()
        .map_err(|err| ArborError::syntax(text, err.to_string()))?;
    Ok(Some(Pattern { regex, distinct }))
}

fn range_step(token: &str) -> Result<Step> {
    let inner = token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| ArborError::syntax(token, "range must end with ']'"))?;
    let (start, end) = inner
        .split_once(',')
        .ok_or_else(|| ArborError::syntax(token, "expected two values separated by ','"))?;
    let bound = |part: &str| -> Result<Option<usize>> {
        let part = part.trim();
        if part.is_empty() {
            Ok(None)
        } else {
            number(part, token).map(Some)
        }
    };
    let (start, end) = (bound(start)?, bound(end)?);
    if let (Some(s), Some(e)) = (start, end) {
        if e <= s {
            return Err(ArborError::syntax(token, "end must be larger than start"));
        }
    }
    Ok(Step::Range { start, end })
}

fn modulo_step(token: &str) -> Result<Step> {
    let body = &token[1..];
    let (digits, from_end) = match body.strip_suffix('<') {
        Some(digits) => (digits.trim_end(), true),
        None => (body, false),
    };
    let every = number(digits, token)?;
    if every == 0 {
        return Err(ArborError::syntax(token, "modulo must be at least 1"));
    }
    Ok(Step::Modulo { every, from_end })
}
