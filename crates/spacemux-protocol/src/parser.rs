//! Recursive-descent parser for the wire grammar.
//!
//! ```text
//! value  := list | string | atom
//! list   := '(' value* ')'
//! string := '"' (char | '\t' | '\n' | '\r' | '\"' | '\\')* '"'
//! atom   := any run of characters up to whitespace, '(' or ')'
//! ```
//!
//! Whitespace is space, tab, CR, and LF. All delimiters are ASCII, so the
//! parser scans bytes and only slices the input at ASCII positions.
//!
//! Lists nest at most [`MAX_DEPTH`] levels deep.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::{ProtocolError, Value};

/// Deepest list nesting accepted in one value. Deeper input is a
/// [`ProtocolError::MalformedList`].
pub const MAX_DEPTH: usize = 128;

/// A value decoded from the input plus the byte range it occupied.
///
/// `range.start` is the first non-whitespace byte at or after the
/// requested offset; `range.end` is one past the last consumed byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub range: Range<usize>,
}

/// Decodes one value from `text` starting at byte `offset`.
///
/// Returns `Ok(None)` when nothing but whitespace remains (or `offset` is
/// past the end or not on a character boundary).
///
/// # Errors
/// - [`ProtocolError::MalformedList`]: unterminated list, a stray `)`, or
///   lists nested deeper than [`MAX_DEPTH`]
/// - [`ProtocolError::MalformedString`]: unterminated string or unknown escape
pub fn decode(text: &str, offset: usize) -> Result<Option<Decoded>, ProtocolError> {
    if offset > text.len() || !text.is_char_boundary(offset) {
        return Ok(None);
    }
    let mut parser = Parser {
        src: text,
        pos: offset,
        depth: 0,
    };
    parser.skip_space();
    if parser.at_end() {
        return Ok(None);
    }
    let begin = parser.pos;
    let value = parser.value()?;
    Ok(Some(Decoded {
        value,
        range: begin..parser.pos,
    }))
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    /// Lists currently open.
    depth: usize,
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_delimiter(b: u8) -> bool {
    is_space(b) || b == b'(' || b == b')'
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Value, ProtocolError> {
        match self.peek() {
            Some(b'(') => self.list(),
            Some(b'"') => self.string(),
            Some(b')') => Err(ProtocolError::MalformedList { offset: self.pos }),
            Some(_) => Ok(self.atom()),
            // Callers check `at_end` first.
            None => Err(ProtocolError::MalformedList { offset: self.pos }),
        }
    }

    fn list(&mut self) -> Result<Value, ProtocolError> {
        let start = self.pos;
        if self.depth >= MAX_DEPTH {
            return Err(ProtocolError::MalformedList { offset: start });
        }
        self.depth += 1;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_space();
            match self.peek() {
                None => return Err(ProtocolError::MalformedList { offset: start }),
                Some(b')') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(fold_dict(items));
                }
                Some(_) => items.push(self.value()?),
            }
        }
    }

    fn string(&mut self) -> Result<Value, ProtocolError> {
        let start = self.pos;
        self.pos += 1;
        let bytes = self.src.as_bytes();
        let mut out = String::new();
        loop {
            let rest = &self.src[self.pos..];
            let Some(i) = rest.find(&['"', '\\'][..]) else {
                return Err(ProtocolError::MalformedString { offset: start });
            };
            out.push_str(&rest[..i]);
            self.pos += i;
            if bytes[self.pos] == b'"' {
                self.pos += 1;
                return Ok(Value::Str(out));
            }
            let unescaped = match bytes.get(self.pos + 1) {
                Some(b't') => '\t',
                Some(b'n') => '\n',
                Some(b'r') => '\r',
                Some(b'"') => '"',
                Some(b'\\') => '\\',
                Some(_) => return Err(ProtocolError::MalformedString { offset: self.pos }),
                None => return Err(ProtocolError::MalformedString { offset: start }),
            };
            out.push(unescaped);
            self.pos += 2;
        }
    }

    fn atom(&mut self) -> Value {
        let start = self.pos;
        while self.peek().is_some_and(|b| !is_delimiter(b)) {
            self.pos += 1;
        }
        classify_atom(&self.src[start..self.pos])
    }
}

/// `undefined` → absent, `true`/`false` → bool, a full finite float parse
/// → number, anything else stays a string. Numbers are tried last so
/// identifiers like `req-1` or `42x` survive as strings.
fn classify_atom(token: &str) -> Value {
    match token {
        "undefined" => Value::Undefined,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match token.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Str(token.to_owned()),
        },
    }
}

/// Folds a list into a dictionary iff every element is a `(key "." value)`
/// triple with a scalar key. The empty list stays a list.
fn fold_dict(items: Vec<Value>) -> Value {
    if items.is_empty() || !items.iter().all(is_dict_triple) {
        return Value::List(items);
    }
    let mut map = BTreeMap::new();
    for item in items {
        let Value::List(triple) = item else { continue };
        let mut parts = triple.into_iter();
        let (Some(key), Some(_dot), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if let Some(key) = key.to_text() {
            map.insert(key.into_owned(), value);
        }
    }
    Value::Dict(map)
}

fn is_dict_triple(item: &Value) -> bool {
    match item.as_list() {
        Some([key, dot, _]) => dot.as_str() == Some(".") && key.to_text().is_some(),
        _ => false,
    }
}
