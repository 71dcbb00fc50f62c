//! The decoded form of the wire grammar.
//!
//! Every frame on the wire is one S-expression. Atoms are classified at
//! parse time, so by the time a [`Value`] exists there is no "untyped token"
//! left: it is a number, a boolean, `undefined`, or a string.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A single decoded wire value.
///
/// `Dict` never comes from its own grammar production. The parser folds a
/// list into a dictionary only when *every* element has the shape
/// `(key "." value)`; see [`crate::decode`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The `undefined` atom.
    #[default]
    Undefined,
    /// The `true` / `false` atoms.
    Bool(bool),
    /// Any atom that parses in full as a finite float.
    Number(f64),
    /// A quoted string, or an atom that is none of the above.
    Str(String),
    /// `( ... )`
    List(Vec<Value>),
    /// A list of `(key . value)` triples, folded into a map.
    Dict(BTreeMap<String, Value>),
}

impl Value {
    /// Short type name, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up `key` if this value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|map| map.get(key))
    }

    /// Textual form of a scalar: strings as-is, numbers in canonical
    /// decimal form, booleans as `true`/`false`.
    ///
    /// Returns `None` for `undefined`, lists, and dictionaries.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Str(s) => Some(Cow::Borrowed(s)),
            Self::Number(n) => Some(Cow::Owned(format_number(*n))),
            Self::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            _ => None,
        }
    }

    /// Renders the value in wire syntax.
    ///
    /// Dictionaries render as a list of `("key" . value)` triples, so a
    /// decoded dictionary decodes back to the same dictionary.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        self.write_wire(&mut out);
        out
    }

    pub(crate) fn write_wire(&self, out: &mut String) {
        match self {
            Self::Undefined => out.push_str("undefined"),
            Self::Bool(true) => out.push_str("true"),
            Self::Bool(false) => out.push_str("false"),
            Self::Number(n) => out.push_str(&format_number(*n)),
            Self::Str(s) => write_quoted(out, s),
            Self::List(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.write_wire(out);
                }
                out.push(')');
            }
            Self::Dict(map) => {
                out.push('(');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push('(');
                    write_quoted(out, key);
                    out.push_str(" . ");
                    value.write_wire(out);
                    out.push(')');
                }
                out.push(')');
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Dict(map)
    }
}

// ---------------------------------------------------------------------------
// Serialize
// ---------------------------------------------------------------------------

/// Lets the UI layer hand decoded payloads straight to JSON consumers.
/// `undefined` becomes `null`; integral numbers serialize as integers.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => {
                if is_integral(*n) {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

fn is_integral(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15
}

/// Canonical decimal form: `42`, `-3.5`, `0.1`. Never uses an exponent.
pub(crate) fn format_number(n: f64) -> String {
    if is_integral(n) {
        // `-0.0` prints as "0" here, which parses back to an equal value.
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Writes `s` as a quoted string using exactly the five escapes the
/// parser accepts.
pub(crate) fn write_quoted(out: &mut String, s: &str) {
    out.reserve(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => {
                let _ = out.write_char(other);
            }
        }
    }
    out.push('"');
}
