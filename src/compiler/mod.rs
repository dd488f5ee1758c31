//! Lowers a ruleset into bytecode (spec component C7, §4.7).

mod expr;

use std::rc::Rc;

use crate::bytecode::{Bytecode, BytecodeWriter};
use crate::endpoint::Extension;
use crate::error::CompileError;
use crate::functions::FunctionRegistry;
use crate::registers::RegisterAllocator;
use crate::rules::{Result as RuleResult, Ruleset};
use crate::value::Value;

use expr::compile_expr;

/// Lower `ruleset` into an immutable [`Bytecode`] program.
///
/// `extensions` is accepted for API parity with the runtime
/// (`Evaluator::new`) but the compiler itself does not need to inspect
/// registered extensions - property/header lifting happens at
/// `RETURN_ENDPOINT` time in the VM, not at compile time.
pub fn compile(
    ruleset: &Ruleset,
    functions: &FunctionRegistry,
    _extensions: &[Rc<dyn Extension>],
) -> Result<Bytecode, CompileError> {
    let mut registers = RegisterAllocator::new();
    for param in &ruleset.parameters {
        registers.declare_parameter(
            &param.name,
            param.required,
            param.default.clone(),
            param.builtin.clone(),
        )?;
    }

    let mut writer = BytecodeWriter::new();

    for condition in &ruleset.conditions {
        writer.mark_condition_start();
        compile_expr(&mut writer, &mut registers, functions, &condition.expr)?;
        if let Some(name) = &condition.bind {
            let r = registers.declare_temp(name)?;
            writer.emit_set_register(r);
        }
        writer.emit_return_value();
    }

    for result in &ruleset.results {
        writer.mark_result_start();
        match result {
            RuleResult::Endpoint { url, headers, properties } => {
                compile_endpoint_result(&mut writer, &mut registers, functions, url, headers, properties)?;
            }
            RuleResult::Error(message) => {
                compile_expr(&mut writer, &mut registers, functions, message)?;
                writer.emit_return_error();
            }
            RuleResult::NoMatch => {
                writer.emit_load_const(Value::Null)?;
                writer.emit_return_value();
            }
        }
    }

    Ok(writer.build(registers.into_defs()))
}

/// Endpoint result lowering (§4.7): push headers, then properties, then the
/// url, finishing with `RETURN_ENDPOINT flags` - `flags = hasHeaders(1) |
/// hasProperties(2)`, matching the pop order documented on
/// [`crate::bytecode::Opcode::ReturnEndpoint`].
fn compile_endpoint_result(
    writer: &mut BytecodeWriter,
    registers: &mut RegisterAllocator,
    functions: &FunctionRegistry,
    url: &crate::rules::Expr,
    headers: &indexmap::IndexMap<String, Vec<crate::rules::Expr>>,
    properties: &indexmap::IndexMap<String, crate::rules::Expr>,
) -> Result<(), CompileError> {
    let mut flags = 0u8;

    if !headers.is_empty() {
        for (name, values) in headers {
            for value in values {
                compile_expr(writer, registers, functions, value)?;
            }
            writer.emit_list(values.len())?;
            writer.emit_load_const(Value::string(name.clone()))?;
        }
        writer.emit_map(headers.len())?;
        flags |= 0b01;
    }

    if !properties.is_empty() {
        for (name, value) in properties {
            compile_expr(writer, registers, functions, value)?;
            writer.emit_load_const(Value::string(name.clone()))?;
        }
        writer.emit_map(properties.len())?;
        flags |= 0b10;
    }

    compile_expr(writer, registers, functions, url)?;
    writer.emit_return_endpoint(flags);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Condition, Expr, Parameter};

    #[test]
    fn minimal_region_ruleset_compiles() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Region"));
        ruleset.conditions.push(Condition::new(Expr::IsSet(Box::new(Expr::Reference("Region".to_string())))));
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::StringTemplate(vec![
                crate::rules::TemplateSegment::Literal("https://example.".to_string()),
                crate::rules::TemplateSegment::Dynamic(Expr::Reference("Region".to_string())),
                crate::rules::TemplateSegment::Literal(".amazonaws.com".to_string()),
            ]),
            headers: indexmap::IndexMap::new(),
            properties: indexmap::IndexMap::new(),
        });

        let bytecode = compile(&ruleset, &FunctionRegistry::new(), &[]).unwrap();
        assert_eq!(bytecode.condition_offsets.len(), 1);
        assert_eq!(bytecode.result_offsets.len(), 1);
        assert_eq!(bytecode.register_definitions.len(), 1);
    }

    #[test]
    fn unknown_function_is_compile_error() {
        let mut ruleset = Ruleset::new();
        ruleset.results.push(RuleResult::Error(Expr::FunctionCall {
            name: "doesNotExist".to_string(),
            args: vec![],
        }));
        let err = compile(&ruleset, &FunctionRegistry::new(), &[]).unwrap_err();
        assert!(matches!(err, CompileError::UnknownFunction(_)));
    }

    #[test]
    fn no_match_result_loads_null() {
        let mut ruleset = Ruleset::new();
        ruleset.results.push(RuleResult::NoMatch);
        let bytecode = compile(&ruleset, &FunctionRegistry::new(), &[]).unwrap();
        assert_eq!(bytecode.constant_pool, vec![Value::Null]);
    }

    /// Compiling the same ruleset twice produces the same instruction stream
    /// and the same constant pool contents, in the same insertion order
    /// (§8 property 6).
    #[test]
    fn compile_is_deterministic() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Region"));
        ruleset.conditions.push(Condition::new(Expr::IsSet(Box::new(Expr::Reference("Region".to_string())))));
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::StringTemplate(vec![
                crate::rules::TemplateSegment::Literal("https://example.".to_string()),
                crate::rules::TemplateSegment::Dynamic(Expr::Reference("Region".to_string())),
                crate::rules::TemplateSegment::Literal(".amazonaws.com".to_string()),
            ]),
            headers: indexmap::IndexMap::new(),
            properties: indexmap::IndexMap::new(),
        });

        let first = compile(&ruleset, &FunctionRegistry::new(), &[]).unwrap();
        let second = compile(&ruleset, &FunctionRegistry::new(), &[]).unwrap();
        assert_eq!(first.instructions, second.instructions);
        assert_eq!(first.constant_pool, second.constant_pool);
        assert_eq!(first.condition_offsets, second.condition_offsets);
        assert_eq!(first.result_offsets, second.result_offsets);
    }
}
