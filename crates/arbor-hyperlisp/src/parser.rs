use winnow::ascii::line_ending;
use winnow::combinator::{alt, eof, opt, preceded};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{take_till, take_while};
use winnow::{ModalResult, Parser};

use arbor_types::{Address, ArborError, NodeId, Result, Tree, Value, TYPE_TAGS};

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Blank out comment lines: `//` or `/* ... */` starting a line (after indentation).
///
/// Newlines are preserved so line numbers stay correct, and quoted literals
/// (including multi-line `@"..."` ones) are copied verbatim.
pub(crate) fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut i = 0;
    let mut at_line_start = true;

    while i < len {
        let c = chars[i];
        if at_line_start && (c == ' ' || c == '\t') {
            out.push(c);
            i += 1;
            continue;
        }
        if at_line_start && c == '/' && i + 1 < len && chars[i + 1] == '/' {
            // line comment, dropped up to the newline
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if at_line_start && c == '/' && i + 1 < len && chars[i + 1] == '*' {
            i += 2;
            while i + 1 < len && !(chars[i] == '*' && chars[i + 1] == '/') {
                if chars[i] == '\n' {
                    out.push('\n');
                }
                i += 1;
            }
            i = (i + 2).min(len);
            continue;
        }
        at_line_start = false;
        if c == '"' {
            out.push('"');
            i += 1;
            while i < len {
                if chars[i] == '\\' && i + 1 < len {
                    out.push(chars[i]);
                    out.push(chars[i + 1]);
                    i += 2;
                } else if chars[i] == '"' {
                    out.push('"');
                    i += 1;
                    break;
                } else {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            continue;
        }
        if c == '\n' {
            at_line_start = true;
        }
        out.push(c);
        i += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Line grammar
// ---------------------------------------------------------------------------

/// Value part of a line as written, before typing.
#[derive(Debug, Clone, PartialEq)]
enum RawValue {
    /// `name:"quoted"` or `name:@"multi"`
    Quoted(String),
    /// `name:tag:literal`
    Typed(String, String),
    /// `name:rest of line`
    Bare(String),
}

#[derive(Debug)]
struct Line {
    indent: usize,
    offset: usize,
    name: String,
    value: Option<RawValue>,
}

/// Parse a double-quoted string with escape support.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let _ = '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = winnow::token::any
            .parse_next(input)
            .map_err(|_: ErrMode<ContextError>| make_cut_error("closing quote"))?;
        match c {
            '"' => break,
            '\\' => {
                let esc = winnow::token::any.parse_next(input)?;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    '\\' => s.push('\\'),
                    '"' => s.push('"'),
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            other => s.push(other),
        }
    }
    Ok(s)
}

/// Parse a multi-line `@"..."` string, where `""` stands for one quote.
fn multiline_string(input: &mut &str) -> ModalResult<String> {
    let _ = "@\"".parse_next(input)?;
    let mut s = String::new();
    loop {
        let c = winnow::token::any
            .parse_next(input)
            .map_err(|_: ErrMode<ContextError>| make_cut_error("closing quote of @\"...\" string"))?;
        if c == '"' {
            if input.starts_with('"') {
                let _ = '"'.parse_next(input)?;
                s.push('"');
            } else {
                break;
            }
        } else {
            s.push(c);
        }
    }
    Ok(s)
}

fn string_literal(input: &mut &str) -> ModalResult<String> {
    alt((quoted_string, multiline_string)).parse_next(input)
}

fn rest_of_line<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_till(0.., ['\r', '\n'])
        .map(str::trim_end)
        .parse_next(input)
}

fn bare_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_till(0.., [':', '\r', '\n'])
        .map(str::trim_end)
        .parse_next(input)
}

fn type_tag<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| c.is_ascii_alphabetic())
        .verify(|tag: &str| TYPE_TAGS.contains(&tag))
        .parse_next(input)
}

fn typed_value(input: &mut &str) -> ModalResult<RawValue> {
    let tag = type_tag.parse_next(input)?;
    let _ = ':'.parse_next(input)?;
    let literal = alt((string_literal, rest_of_line.map(String::from))).parse_next(input)?;
    Ok(RawValue::Typed(tag.to_string(), literal))
}

fn value_part(input: &mut &str) -> ModalResult<RawValue> {
    alt((
        string_literal.map(RawValue::Quoted),
        typed_value,
        rest_of_line.map(|s| RawValue::Bare(s.to_string())),
    ))
    .parse_next(input)
}

fn name_part(input: &mut &str) -> ModalResult<String> {
    alt((string_literal, bare_name.map(String::from))).parse_next(input)
}

fn line_end(input: &mut &str) -> ModalResult<()> {
    let _ = take_while(0.., [' ', '\t']).parse_next(input)?;
    alt((line_ending.void(), eof.void()))
        .context(StrContext::Expected(StrContextValue::Description("end of line")))
        .parse_next(input)
}

/// Parse one non-blank line after its indentation.
fn entry(input: &mut &str) -> ModalResult<(String, Option<RawValue>)> {
    let name = name_part.parse_next(input)?;
    let value = opt(preceded(':', value_part)).parse_next(input)?;
    line_end.parse_next(input)?;
    Ok((name, value))
}

fn blank_line(input: &mut &str) -> ModalResult<()> {
    (take_while(0.., [' ', '\t']), line_ending).void().parse_next(input)
}

fn offset_to_line_col(text: &str, offset: usize) -> (usize, usize) {
    let prefix = &text[..offset.min(text.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => offset - pos,
        None => offset + 1,
    };
    (line, col)
}

fn parse_error(text: &str, offset: usize, message: impl Into<String>) -> ArborError {
    let (line, col) = offset_to_line_col(text, offset);
    let snippet: String = text[offset.min(text.len())..]
        .chars()
        .take_while(|&c| c != '\n')
        .take(40)
        .collect();
    ArborError::Parse {
        line,
        col,
        message: message.into(),
        source_snippet: if snippet.is_empty() { None } else { Some(snippet) },
    }
}

fn lines(text: &str) -> Result<Vec<Line>> {
    let total = text.len();
    let mut remaining = text;
    let mut out = Vec::new();

    while !remaining.is_empty() {
        let blank = opt(blank_line)
            .parse_next(&mut remaining)
            .map_err(|e: ErrMode<ContextError>| parse_error(text, total - remaining.len(), e.to_string()))?;
        if blank.is_some() {
            continue;
        }
        let line_start = total - remaining.len();
        let indent: &str = take_while(0.., [' ', '\t'])
            .parse_next(&mut remaining)
            .map_err(|e: ErrMode<ContextError>| parse_error(text, line_start, e.to_string()))?;
        if indent.contains('\t') {
            return Err(parse_error(text, line_start, "tabs are not allowed in indentation"));
        }
        if remaining.is_empty() {
            break;
        }
        let offset = total - remaining.len();
        let (name, value) = entry.parse_next(&mut remaining).map_err(|e| {
            let at = total - remaining.len();
            parse_error(text, at, e.to_string())
        })?;
        out.push(Line {
            indent: indent.len(),
            offset,
            name,
            value,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

fn typed(text: &str, line: &Line, raw: Option<RawValue>) -> Result<(Value, Option<Address>)> {
    let Some(raw) = raw else {
        return Ok((Value::None, None));
    };
    match raw {
        RawValue::Quoted(s) | RawValue::Bare(s) => Ok((Value::Text(s), None)),
        RawValue::Typed(tag, literal) if tag == "node" => {
            let addr = literal
                .parse::<Address>()
                .map_err(|e| parse_error(text, line.offset, e.to_string()))?;
            Ok((Value::None, Some(addr)))
        }
        RawValue::Typed(tag, literal) => Value::from_typed(&tag, &literal)
            .map(|v| (v, None))
            .map_err(|e| parse_error(text, line.offset, e.to_string())),
    }
}

/// Parse hyperlisp text into a tree; the top-level lines become children of
/// an empty-named root.
pub fn parse(input: &str) -> Result<Tree> {
    let text = strip_comments(input);
    let parsed = lines(&text)?;

    let mut tree = Tree::new();
    // (level, node); the root sits at level -1
    let mut stack: Vec<(isize, NodeId)> = vec![(-1, tree.root())];
    let mut references: Vec<(NodeId, Address, usize)> = Vec::new();

    for line in parsed {
        if line.indent % 2 != 0 {
            return Err(parse_error(
                &text,
                line.offset,
                format!("odd indentation of {} spaces", line.indent),
            ));
        }
        let level = (line.indent / 2) as isize;
        let top_level = stack.last().map(|(l, _)| *l).unwrap_or(-1);
        if level > top_level + 1 {
            return Err(parse_error(
                &text,
                line.offset,
                "indentation jumps more than one level",
            ));
        }
        while stack.last().is_some_and(|(l, _)| *l >= level) {
            stack.pop();
        }
        let parent = stack.last().map(|(_, id)| *id).unwrap_or_else(|| tree.root());

        let offset = line.offset;
        let (value, reference) = typed(&text, &line, line.value.clone())?;
        let node = tree.add_new(parent, line.name.clone(), value)?;
        if let Some(addr) = reference {
            references.push((node, addr, offset));
        }
        stack.push((level, node));
    }

    for (node, addr, offset) in references {
        let target = tree
            .resolve(&addr)
            .map_err(|e| parse_error(&text, offset, e.to_string()))?;
        tree.set_value(node, Value::Node(target))?;
    }

    tracing::debug!(nodes = tree.len(), "parsed hyperlisp document");
    Ok(tree)
}
