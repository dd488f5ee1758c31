//! Expression lowering: the pattern-matching heart of the compiler (§4.7).
//!
//! Patterns are tried in a fixed priority order - the first match wins. Most
//! rows exist to replace a generic `compile sub-expr; OP` sequence with a
//! fused opcode when the sub-expression has a shape the VM can address
//! directly (a bare register, a boolean literal).

use std::rc::Rc;

use crate::attr::PathPart;
use crate::bytecode::BytecodeWriter;
use crate::error::CompileError;
use crate::functions::FunctionRegistry;
use crate::registers::RegisterAllocator;
use crate::rules::{Expr, TemplateSegment};
use crate::template::{Segment, Template};
use crate::value::Value;

fn as_reference(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Reference(name) => Some(name),
        _ => None,
    }
}

fn as_bool_literal(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

/// Compile `expr`, leaving exactly one value on the stack.
pub fn compile_expr(
    writer: &mut BytecodeWriter,
    registers: &mut RegisterAllocator,
    functions: &FunctionRegistry,
    expr: &Expr,
) -> Result<(), CompileError> {
    match expr {
        Expr::Literal(value) => {
            writer.emit_load_const(value.clone())?;
        }

        Expr::Reference(name) => {
            let r = registers.get_register(name)?;
            writer.emit_load_register(r);
        }

        Expr::Not(inner) => {
            if let Expr::IsSet(target) = inner.as_ref() {
                if let Some(name) = as_reference(target) {
                    let r = registers.get_register(name)?;
                    writer.emit_test_register_not_set(r);
                    return Ok(());
                }
            }
            compile_expr(writer, registers, functions, inner)?;
            writer.emit_not();
        }

        Expr::IsSet(inner) => {
            if let Some(name) = as_reference(inner) {
                let r = registers.get_register(name)?;
                writer.emit_test_register_isset(r);
                return Ok(());
            }
            compile_expr(writer, registers, functions, inner)?;
            writer.emit_isset();
        }

        Expr::BooleanEquals(a, b) => {
            let (lit, other) = match (as_bool_literal(a), as_bool_literal(b)) {
                (Some(l), _) => (Some(l), b.as_ref()),
                (None, Some(l)) => (Some(l), a.as_ref()),
                (None, None) => (None, a.as_ref()),
            };
            if let Some(l) = lit {
                if let Some(name) = as_reference(other) {
                    let r = registers.get_register(name)?;
                    if l {
                        writer.emit_test_register_is_true(r);
                    } else {
                        writer.emit_test_register_is_false(r);
                    }
                    return Ok(());
                }
                compile_expr(writer, registers, functions, other)?;
                writer.emit_is_true();
                if !l {
                    writer.emit_not();
                }
                return Ok(());
            }
            compile_expr(writer, registers, functions, a)?;
            compile_expr(writer, registers, functions, b)?;
            writer.emit_boolean_equals();
        }

        Expr::StringEquals(a, b) => {
            compile_expr(writer, registers, functions, a)?;
            compile_expr(writer, registers, functions, b)?;
            writer.emit_string_equals();
        }

        Expr::Equals(a, b) => {
            compile_expr(writer, registers, functions, a)?;
            compile_expr(writer, registers, functions, b)?;
            writer.emit_equals();
        }

        Expr::Substring { string, start, end, reverse } => {
            compile_expr(writer, registers, functions, string)?;
            writer.emit_substring(*start, *end, *reverse);
        }

        Expr::IsValidHostLabel { string, allow_dots } => {
            compile_expr(writer, registers, functions, string)?;
            compile_expr(writer, registers, functions, allow_dots)?;
            writer.emit_is_valid_host_label();
        }

        Expr::ParseUrl(s) => {
            compile_expr(writer, registers, functions, s)?;
            writer.emit_parse_url();
        }

        Expr::UriEncode(s) => {
            compile_expr(writer, registers, functions, s)?;
            writer.emit_uri_encode();
        }

        Expr::Split { string, delimiter, limit } => {
            compile_expr(writer, registers, functions, string)?;
            compile_expr(writer, registers, functions, delimiter)?;
            compile_expr(writer, registers, functions, limit)?;
            writer.emit_split();
        }

        Expr::FunctionCall { name, args } => {
            let info = functions
                .lookup(name)
                .ok_or_else(|| CompileError::UnknownFunction(name.clone()))?
                .clone();
            for arg in args {
                compile_expr(writer, registers, functions, arg)?;
            }
            let index = writer.intern_function(&info);
            writer.emit_call(index, args.len() as u8);
        }

        Expr::GetAttr { target, path } => {
            if path.is_empty() {
                return Err(CompileError::InvalidGetAttrPath);
            }
            if path.len() == 1 {
                if let Some(name) = as_reference(target) {
                    let r = registers.get_register(name)?;
                    match &path[0] {
                        PathPart::Key(key) => {
                            let idx = writer.get_constant_index(Value::string(key.clone()))?;
                            writer.emit_get_property_reg(r, idx)?;
                        }
                        PathPart::Index(i) => writer.emit_get_index_reg(r, *i),
                    }
                    return Ok(());
                }
            }
            compile_expr(writer, registers, functions, target)?;
            for part in path {
                match part {
                    PathPart::Key(key) => {
                        let idx = writer.get_constant_index(Value::string(key.clone()))?;
                        writer.emit_get_property(idx)?;
                    }
                    PathPart::Index(i) => writer.emit_get_index(*i),
                }
            }
        }

        Expr::StringTemplate(segments) => {
            compile_template(writer, registers, functions, segments)?;
        }

        Expr::Tuple(items) => {
            for item in items {
                compile_expr(writer, registers, functions, item)?;
            }
            writer.emit_list(items.len())?;
        }

        Expr::Record(fields) => {
            for (key, value) in fields {
                compile_expr(writer, registers, functions, value)?;
                writer.emit_load_const(Value::string(key.clone()))?;
            }
            writer.emit_map(fields.len())?;
        }

        Expr::Coalesce(left, right) => {
            compile_expr(writer, registers, functions, left)?;
            let patch = writer.emit_jnn_or_pop();
            compile_expr(writer, registers, functions, right)?;
            writer.patch_jump(patch)?;
        }
    }
    Ok(())
}

/// A string literal with one segment skips template machinery entirely: a
/// bare literal becomes a constant, a bare dynamic segment compiles to just
/// its inner expression (§4.7 "degenerate template").
fn compile_template(
    writer: &mut BytecodeWriter,
    registers: &mut RegisterAllocator,
    functions: &FunctionRegistry,
    segments: &[TemplateSegment],
) -> Result<(), CompileError> {
    if segments.len() == 1 {
        return match &segments[0] {
            TemplateSegment::Literal(s) => writer.emit_load_const(Value::string(s.clone())),
            TemplateSegment::Dynamic(e) => compile_expr(writer, registers, functions, e),
        };
    }

    let mut skeleton = Vec::with_capacity(segments.len());
    let mut canonical = String::new();
    let mut arg_count: u8 = 0;
    for segment in segments {
        match segment {
            TemplateSegment::Literal(s) => {
                skeleton.push(Segment::Literal(s.clone()));
                canonical.push_str(s);
            }
            TemplateSegment::Dynamic(e) => {
                compile_expr(writer, registers, functions, e)?;
                skeleton.push(Segment::Slot);
                canonical.push_str("{}");
                arg_count += 1;
            }
        }
    }
    let template = Template::new(skeleton, canonical);
    let index = writer.get_constant_index(Value::Template(Rc::new(template)))?;
    writer.emit_resolve_template(arg_count, index)
}
