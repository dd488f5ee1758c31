//! The dynamic value domain shared by the constant pool, register file, and
//! VM operand stack (spec component C1/§3).
//!
//! Every stack slot and register slot holds one of these variants. `Template`
//! and `AttrExpr` only ever appear inside the constant pool - they are never
//! produced by evaluating user input, only interned by the compiler.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::attr::AttrExpr;
use crate::template::Template;
use crate::uri::Uri;

/// A map value. Order is preserved so that header/property iteration order
/// in endpoint assembly matches the order the ruleset declared them in.
pub type ValueMap = IndexMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(OrderedFloat<f64>),
    String(Rc<str>),
    List(Rc<Vec<Value>>),
    Map(Rc<ValueMap>),
    Uri(Rc<Uri>),
    Template(Rc<Template>),
    Attr(Rc<AttrExpr>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn map(entries: ValueMap) -> Value {
        Value::Map(Rc::new(entries))
    }

    /// "Truthy" per §3: neither `null` nor `Bool(false)`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_uri(&self) -> Option<&Uri> {
        match self {
            Value::Uri(u) => Some(u),
            _ => None,
        }
    }

    /// Canonical printable form used by the string-template resolver (§4.5):
    /// booleans as `true`/`false`, null as the literal `null`, numbers in a
    /// locale-independent decimal form.
    pub fn display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.0.to_string(),
            Value::String(s) => s.to_string(),
            other => format!("{other}"),
        }
    }

    /// Converts a plain JSON document into this crate's value domain - the
    /// shape request parameters and endpoint properties take at a host's
    /// JSON boundary (test fixtures, an HTTP handler's request body). `Uri`/
    /// `Template`/`Attr` have no JSON form; they never arrive from a JSON
    /// document, only from the compiler's own constant pool (§3).
    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(OrderedFloat(n.as_f64().unwrap_or(0.0))),
            },
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => {
                let mut map = ValueMap::new();
                for (k, v) in fields {
                    map.insert(k, Value::from_json(v));
                }
                Value::map(map)
            }
        }
    }

    /// The inverse of [`Value::from_json`]. `Uri`/`Template`/`Attr` - which
    /// never flow from user input - serialize as their canonical display
    /// string rather than failing the conversion.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Double(d) => serde_json::Number::from_f64(d.0)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(m) => serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

/// Structural equality over the value domain; cross-type comparisons are
/// always false (§3). `Template`/`AttrExpr` compare by their canonical form.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            // Cross-numeric comparison intentionally excluded: Int64 and
            // Double are distinct tags in the value domain (§3).
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Uri(a), Value::Uri(b)) => a == b,
            (Value::Template(a), Value::Template(b)) => a.canonical() == b.canonical(),
            (Value::Attr(a), Value::Attr(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{}", d.0),
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Uri(u) => write!(f, "{u}"),
            Value::Template(t) => write!(f, "{}", t.canonical()),
            Value::Attr(a) => write!(f, "{a}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::string(s)
    }
}
