//! Attribute (path) expressions: `foo.bar[0]` applied to an opaque value
//! (spec component C4, §4.4).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrExpr {
    /// On a map, `map[key]` or null; on a parsed Uri, a known property; on
    /// anything else, null.
    Key(String),
    /// On a list, the element at that index if in bounds, else null;
    /// otherwise null.
    Index(u8),
    /// Evaluates `left`; if null, returns null; else applies `right` to
    /// left's result. Null-propagation on the left operand only.
    AndThen(Box<AttrExpr>, Box<AttrExpr>),
    /// A pure display wrapper: evaluation delegates to `inner`, but the
    /// canonical dotted form used for interning/round-tripping is `canonical`.
    ToString(String, Box<AttrExpr>),
}

impl AttrExpr {
    /// Build the left-leaning chain that a parsed path (`foo`, `foo[3]`,
    /// `foo.bar[2].baz`) compiles to: a single part yields a bare
    /// `ToString`; multiple parts build a left-leaning `AndThen` chain with
    /// the full canonical dotted form as the display string.
    pub fn from_path(parts: &[PathPart]) -> AttrExpr {
        assert!(!parts.is_empty(), "attribute path must have at least one part");
        let canonical = canonical_path(parts);
        if parts.len() == 1 {
            return AttrExpr::ToString(canonical, Box::new(parts[0].clone().into_expr()));
        }
        let mut chain = parts[0].clone().into_expr();
        for part in &parts[1..] {
            chain = AttrExpr::AndThen(Box::new(chain), Box::new(part.clone().into_expr()));
        }
        AttrExpr::ToString(canonical, Box::new(chain))
    }

    /// Parse a canonical dotted string: `foo`, `foo[3]`, `foo.bar[2].baz`.
    pub fn parse(s: &str) -> Option<AttrExpr> {
        let parts = parse_path(s)?;
        Some(AttrExpr::from_path(&parts))
    }

    pub fn eval(&self, target: &Value) -> Value {
        match self {
            AttrExpr::Key(key) => match target {
                Value::Map(m) => m.get(key).cloned().unwrap_or(Value::Null),
                Value::Uri(uri) => uri.property(key),
                _ => Value::Null,
            },
            AttrExpr::Index(idx) => match target {
                Value::List(items) => items.get(*idx as usize).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            AttrExpr::AndThen(left, right) => {
                let left_val = left.eval(target);
                if left_val.is_null() {
                    Value::Null
                } else {
                    right.eval(&left_val)
                }
            }
            AttrExpr::ToString(_, inner) => inner.eval(target),
        }
    }

    /// Single-level form used by the compiler's `GET_PROPERTY_REG` /
    /// `GET_INDEX_REG` fusion (§4.7): `Some(Key)` / `Some(Index)` only when
    /// this is exactly one part.
    pub fn as_single_part(&self) -> Option<&AttrExpr> {
        match self {
            AttrExpr::ToString(_, inner) => match inner.as_ref() {
                k @ AttrExpr::Key(_) | k @ AttrExpr::Index(_) => Some(k),
                _ => None,
            },
            _ => None,
        }
    }

    /// The parts of a multi-level path in application order, unwrapping the
    /// outer `ToString`/`AndThen` structure. Used by the general
    /// `getAttr(e, path...)` lowering rule.
    pub fn parts(&self) -> Vec<&AttrExpr> {
        fn walk<'a>(expr: &'a AttrExpr, out: &mut Vec<&'a AttrExpr>) {
            match expr {
                AttrExpr::ToString(_, inner) => walk(inner, out),
                AttrExpr::AndThen(left, right) => {
                    walk(left, out);
                    walk(right, out);
                }
                other => out.push(other),
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

impl fmt::Display for AttrExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrExpr::ToString(canonical, _) => write!(f, "{canonical}"),
            AttrExpr::Key(k) => write!(f, "{k}"),
            AttrExpr::Index(i) => write!(f, "[{i}]"),
            AttrExpr::AndThen(left, right) => write!(f, "{left}.{right}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathPart {
    Key(String),
    Index(u8),
}

impl PathPart {
    fn into_expr(self) -> AttrExpr {
        match self {
            PathPart::Key(k) => AttrExpr::Key(k),
            PathPart::Index(i) => AttrExpr::Index(i),
        }
    }
}

fn canonical_path(parts: &[PathPart]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        match part {
            PathPart::Key(k) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathPart::Index(idx) => {
                out.push('[');
                out.push_str(&idx.to_string());
                out.push(']');
            }
        }
    }
    out
}

fn parse_path(s: &str) -> Option<Vec<PathPart>> {
    let mut parts = Vec::new();
    for segment in s.split('.') {
        let mut rest = segment;
        let key_end = rest.find('[').unwrap_or(rest.len());
        if key_end > 0 {
            parts.push(PathPart::Key(rest[..key_end].to_string()));
        }
        rest = &rest[key_end..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            let idx: u8 = stripped[..close].parse().ok()?;
            parts.push(PathPart::Index(idx));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}
