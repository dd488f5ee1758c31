//! A bytecode compiler and stack-based virtual machine for endpoint-resolution
//! rulesets.
//!
//! Given a declarative ruleset ([`rules::Ruleset`]) describing how to compute
//! a service endpoint from a set of input parameters, [`compiler::compile`]
//! lowers it into a compact [`bytecode::Bytecode`] program, and
//! [`vm::Evaluator`] executes that program against concrete parameter
//! bindings on the request hot path.
//!
//! The parser that produces a [`rules::Ruleset`] from source text, and the
//! surrounding client plumbing that selects [`endpoint::Extension`]s and
//! wires up a [`endpoint::RegisterFiller`], are outside the scope of this
//! crate.

mod attr;
mod bytecode;
mod compiler;
mod endpoint;
mod error;
mod functions;
mod registers;
mod rules;
mod template;
mod uri;
mod value;
mod vm;

pub use attr::{AttrExpr, PathPart};
pub use bytecode::{Bytecode, BytecodeWriter, Opcode, RegisterDef};
pub use compiler::compile;
pub use endpoint::{
    BuiltinProvider, Context, DefaultRegisterFiller, Endpoint, Extension, RegisterFiller, SdkEndpointBuiltin,
};
pub use error::{CompileError, RulesEvaluationError};
pub use functions::{FunctionRegistry, FunctionTable, HostFunction};
pub use registers::RegisterAllocator;
pub use rules::{Condition, Expr, Parameter, Result as RuleResult, Ruleset, TemplateSegment};
pub use template::{Segment, Template};
pub use uri::{Uri, UriCache};
pub use value::{Value, ValueMap};
pub use vm::Evaluator;
