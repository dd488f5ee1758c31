//! Pre-parsed string-interpolation templates (spec component C5, §4.5).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    Slot,
}

/// An ordered sequence of literal segments and interpolation slots. The
/// template only remembers its skeleton (segment order); the values filling
/// its slots arrive as VM stack arguments at `RESOLVE_TEMPLATE` time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    segments: Vec<Segment>,
    canonical: String,
}

impl Template {
    pub fn new(segments: Vec<Segment>, canonical: impl Into<String>) -> Template {
        Template {
            segments,
            canonical: canonical.into(),
        }
    }

    /// Number of interpolation slots - the VM pops exactly this many values
    /// from the top of the stack at `RESOLVE_TEMPLATE` (§4.5, §4.8).
    pub fn expression_count(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Slot)).count()
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Concatenates `args` (in stack order: first-pushed argument first)
    /// with the literal segments into the resolved string.
    pub fn resolve(&self, args: &[Value]) -> String {
        let mut out = String::new();
        let mut arg_iter = args.iter();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Slot => {
                    if let Some(v) = arg_iter.next() {
                        out.push_str(&v.display_string());
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_literal_and_dynamic_segments() {
        let t = Template::new(
            vec![
                Segment::Literal("https://".to_string()),
                Segment::Slot,
                Segment::Literal(".example.com".to_string()),
            ],
            "https://{Region}.example.com",
        );
        assert_eq!(t.expression_count(), 1);
        assert_eq!(t.resolve(&[Value::string("us-east-1")]), "https://us-east-1.example.com");
    }

    #[test]
    fn non_string_values_use_canonical_form() {
        let t = Template::new(vec![Segment::Slot], "{x}");
        assert_eq!(t.resolve(&[Value::Bool(true)]), "true");
        assert_eq!(t.resolve(&[Value::Null]), "null");
        assert_eq!(t.resolve(&[Value::Int(7)]), "7");
    }
}
