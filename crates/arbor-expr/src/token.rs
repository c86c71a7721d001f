//! Tokenizer for expression text.
//!
//! Single-character tokens are `/ | & ^ ! ( ) ?`; everything between them is a
//! word, trimmed of surrounding whitespace so long expressions may span lines.
//! Quoted literals (`"..."`, or multi-line `@"..."`) let a word contain the
//! delimiter characters.

use arbor_types::{ArborError, Result};

/// One lexical unit of an expression body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Slash,
    Or,
    And,
    Xor,
    Not,
    Open,
    Close,
    Question,
    /// Unquoted iterator text.
    Word(String),
    /// Content of a quoted literal.
    Quoted(String),
    /// `=` immediately followed by a quoted literal.
    QuotedValue(String),
}

impl Token {
    /// Text used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Slash => "/".into(),
            Token::Or => "|".into(),
            Token::And => "&".into(),
            Token::Xor => "^".into(),
            Token::Not => "!".into(),
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Question => "?".into(),
            Token::Word(w) => w.clone(),
            Token::Quoted(q) => format!("\"{q}\""),
            Token::QuotedValue(q) => format!("=\"{q}\""),
        }
    }
}

/// Output of [`tokenize`]: the tokens after the leading `@` (or `@@`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenized {
    /// `true` for a `@@` expression, whose hits are themselves expressions.
    pub reference: bool,
    pub tokens: Vec<Token>,
}

const DELIMITERS: &[char] = &['/', '|', '&', '^', '!', '(', ')', '?'];

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.src[self.pos..].starts_with(prefix)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.bump();
        }
    }

    /// Read `"..."` with backslash escapes; the opening quote is next.
    fn single_line(&mut self) -> Result<String> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        return Err(ArborError::syntax(
                            &self.src[start..self.pos],
                            format!("unknown escape '\\{other}' in string literal"),
                        ))
                    }
                    None => break,
                },
                Some('\n') => {
                    return Err(ArborError::syntax(
                        &self.src[start..self.pos],
                        "line break inside a single-line string literal; use @\"...\"",
                    ))
                }
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(ArborError::syntax(
            &self.src[start..],
            "unterminated string literal",
        ))
    }

    /// Read `@"..."` where `""` stands for one quote; `@"` is next.
    fn multi_line(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 2;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') if self.peek() == Some('"') => {
                    self.bump();
                    out.push('"');
                }
                Some('"') => return Ok(out),
                Some(c) => out.push(c),
                None => {
                    return Err(ArborError::syntax(
                        &self.src[start..],
                        "unterminated multi-line string literal",
                    ))
                }
            }
        }
    }

    fn literal(&mut self) -> Result<String> {
        if self.starts_with("@\"") {
            self.multi_line()
        } else {
            self.single_line()
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_whitespace();
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let single = match c {
            '/' => Some(Token::Slash),
            '|' => Some(Token::Or),
            '&' => Some(Token::And),
            '^' => Some(Token::Xor),
            '!' => Some(Token::Not),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            '?' => Some(Token::Question),
            _ => None,
        };
        if let Some(token) = single {
            self.bump();
            return Ok(Some(token));
        }
        if c == '"' || self.starts_with("@\"") {
            return Ok(Some(Token::Quoted(self.literal()?)));
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if DELIMITERS.contains(&c) {
                break;
            }
            if self.pos == start + 1
                && &self.src[start..self.pos] == "="
                && (c == '"' || self.starts_with("@\""))
            {
                return Ok(Some(Token::QuotedValue(self.literal()?)));
            }
            self.bump();
        }
        let word = self.src[start..self.pos].trim_end();
        Ok(Some(Token::Word(word.to_string())))
    }
}

/// Split an expression into tokens.
///
/// The text must start with `@`; a second `@` marks a reference expression.
pub fn tokenize(expression: &str) -> Result<Tokenized> {
    let body = expression.strip_prefix('@').ok_or_else(|| {
        ArborError::syntax(expression, "expressions must start with '@'")
    })?;
    let (reference, body) = match body.strip_prefix('@') {
        Some(rest) if !body.starts_with("@\"") => {
            if rest.starts_with('@') && !rest.starts_with("@\"") {
                return Err(ArborError::syntax(
                    expression,
                    "too many '@' characters at start of expression",
                ));
            }
            (true, rest)
        }
        _ => (false, body),
    };

    let mut scanner = Scanner { src: body, pos: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = scanner.next_token()? {
        tokens.push(token);
    }
    Ok(Tokenized { reference, tokens })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(expr: &str) -> Vec<Token> {
        tokenize(expr).unwrap().tokens
    }

    #[test]
    fn splits_on_delimiters() {
        assert_eq!(
            words("@/../*/_data?value"),
            vec![
                Token::Slash,
                Token::Word("..".into()),
                Token::Slash,
                Token::Word("*".into()),
                Token::Slash,
                Token::Word("_data".into()),
                Token::Question,
                Token::Word("value".into()),
            ]
        );
    }

    #[test]
    fn words_are_trimmed_across_lines() {
        assert_eq!(
            words("@/  foo \n  /bar\n?node"),
            vec![
                Token::Slash,
                Token::Word("foo".into()),
                Token::Slash,
                Token::Word("bar".into()),
                Token::Question,
                Token::Word("node".into()),
            ]
        );
    }

    #[test]
    fn quoted_literals_keep_delimiters() {
        assert_eq!(
            words(r#"@/"a/b|c"?name"#),
            vec![
                Token::Slash,
                Token::Quoted("a/b|c".into()),
                Token::Question,
                Token::Word("name".into()),
            ]
        );
        assert_eq!(
            words("@/@\"two\nlines \"\"q\"\"\"?name")[1],
            Token::Quoted("two\nlines \"q\"".into())
        );
    }

    #[test]
    fn equals_followed_by_quote_is_a_quoted_value() {
        assert_eq!(
            words(r#"@/*/="/^x+$/i"?node"#)[3],
            Token::QuotedValue("/^x+$/i".into())
        );
        assert_eq!(words("@/*/=abc?node")[3], Token::Word("=abc".into()));
    }

    #[test]
    fn double_at_marks_reference() {
        let t = tokenize("@@/_x?value").unwrap();
        assert!(t.reference);
        assert_eq!(t.tokens[1], Token::Word("_x".into()));
        assert!(!tokenize("@/_x?value").unwrap().reference);
        assert!(tokenize("@@@/_x?value").unwrap_err().is_syntax());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(tokenize("/_x?value").unwrap_err().is_syntax());
        assert!(tokenize("@/\"open?value").unwrap_err().is_syntax());
        assert!(tokenize("@/\"bad\\q\"?value").unwrap_err().is_syntax());
    }
}
