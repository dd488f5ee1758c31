//! The ruleset contract the compiler ingests (§4.7): a list of conditions
//! (boolean expressions with optional result bindings) and a list of
//! results (endpoint, error, or no-match). The high-level parser that
//! produces this structure from ruleset source text is outside this
//! crate's scope (§1).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::attr::PathPart;
use crate::value::Value;

/// One segment of a string-literal expression: a fixed literal run, or an
/// interpolated sub-expression (§4.5, §4.7 "String literal with N segments").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TemplateSegment {
    Literal(String),
    Dynamic(Expr),
}

/// A boolean- or value-typed expression, as produced by the (out-of-scope)
/// ruleset parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    /// A named parameter or temporary reference.
    Reference(String),
    Literal(Value),
    Not(Box<Expr>),
    IsSet(Box<Expr>),
    BooleanEquals(Box<Expr>, Box<Expr>),
    StringEquals(Box<Expr>, Box<Expr>),
    /// Structural equality of two values of unknown/mixed static type.
    Equals(Box<Expr>, Box<Expr>),
    Substring {
        string: Box<Expr>,
        start: u8,
        end: u8,
        reverse: bool,
    },
    IsValidHostLabel {
        string: Box<Expr>,
        allow_dots: Box<Expr>,
    },
    ParseUrl(Box<Expr>),
    UriEncode(Box<Expr>),
    Split {
        string: Box<Expr>,
        delimiter: Box<Expr>,
        limit: Box<Expr>,
    },
    /// A call to a library function resolved against the host's
    /// `FunctionRegistry` by name.
    FunctionCall { name: String, args: Vec<Expr> },
    GetAttr { target: Box<Expr>, path: Vec<PathPart> },
    StringTemplate(Vec<TemplateSegment>),
    Tuple(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    /// Null-coalescing: evaluate `left`; if non-null, use it; else evaluate
    /// `right`. Lowers to `JNN_OR_POP` (§9 Design Notes).
    Coalesce(Box<Expr>, Box<Expr>),
}

/// A condition: a boolean expression with an optional name that later
/// expressions may reference (the condition's result is stored in a
/// temporary register under that name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub expr: Expr,
    pub bind: Option<String>,
}

impl Condition {
    pub fn new(expr: Expr) -> Condition {
        Condition { expr, bind: None }
    }

    pub fn bound(expr: Expr, name: impl Into<String>) -> Condition {
        Condition {
            expr,
            bind: Some(name.into()),
        }
    }
}

/// A declared ruleset parameter (§4.9 register filling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub builtin: Option<String>,
}

impl Parameter {
    pub fn required(name: impl Into<String>) -> Parameter {
        Parameter {
            name: name.into(),
            required: true,
            default: None,
            builtin: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Option<Value>) -> Parameter {
        Parameter {
            name: name.into(),
            required: false,
            default,
            builtin: None,
        }
    }

    pub fn builtin(name: impl Into<String>, builtin: impl Into<String>) -> Parameter {
        Parameter {
            name: name.into(),
            required: false,
            default: None,
            builtin: Some(builtin.into()),
        }
    }
}

/// One result: an endpoint rule, an error rule, or no-match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Result {
    Endpoint {
        url: Expr,
        headers: IndexMap<String, Vec<Expr>>,
        properties: IndexMap<String, Expr>,
    },
    Error(Expr),
    NoMatch,
}

/// The complete compiler input: declared parameters, the list of
/// conditions, and the list of results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ruleset {
    pub parameters: Vec<Parameter>,
    pub conditions: Vec<Condition>,
    pub results: Vec<Result>,
}

impl Ruleset {
    pub fn new() -> Ruleset {
        Ruleset::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A ruleset loaded from a JSON fixture (the shape a test harness would
    /// read from disk) round-trips through `serde_json` intact.
    #[test]
    fn ruleset_round_trips_through_json() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Region"));
        ruleset
            .conditions
            .push(Condition::bound(Expr::IsSet(Box::new(Expr::Reference("Region".to_string()))), "regionSet"));
        ruleset.results.push(Result::NoMatch);

        let json = serde_json::to_string(&ruleset).unwrap();
        let restored: Ruleset = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.parameters.len(), 1);
        assert_eq!(restored.parameters[0].name, "Region");
        assert!(matches!(restored.results[0], Result::NoMatch));
    }
}
