//! The stack-based bytecode evaluator (spec component C8, §4.8).

use std::rc::Rc;

use crate::bytecode::{Bytecode, Opcode};
use crate::endpoint::{Context, Endpoint, Extension, RegisterFiller};
use crate::error::RulesEvaluationError;
use crate::uri::UriCache;
use crate::value::{Value, ValueMap};

/// What a `run` call terminated with: a plain value (`RETURN_VALUE`) or a
/// fully assembled endpoint (`RETURN_ENDPOINT`). `RETURN_ERROR` does not
/// appear here - it surfaces directly as an `Err`.
enum Termination {
    Value(Value),
    Endpoint(Endpoint),
}

/// Executes one compiled [`Bytecode`] program against concrete parameter
/// bindings. Not thread-safe - one evaluator per executing thread, pooled
/// and `reset` between requests (§5).
pub struct Evaluator {
    bytecode: Rc<Bytecode>,
    extensions: Vec<Rc<dyn Extension>>,
    filler: Rc<dyn RegisterFiller>,
    registers: Vec<Value>,
    stack: Vec<Value>,
    uri_cache: UriCache,
    context: Context,
}

impl Evaluator {
    pub fn new(
        bytecode: Rc<Bytecode>,
        extensions: Vec<Rc<dyn Extension>>,
        filler: Rc<dyn RegisterFiller>,
    ) -> Evaluator {
        Evaluator {
            bytecode,
            extensions,
            filler,
            registers: Vec::new(),
            stack: Vec::new(),
            uri_cache: UriCache::default(),
            context: Context::new(),
        }
    }

    /// Refill the register file from `context`/`parameters` and clear the
    /// operand stack. The URI cache persists across resets (§4.6: it is
    /// per-evaluator, not per-request).
    pub fn reset(&mut self, context: Context, parameters: &ValueMap) -> Result<(), RulesEvaluationError> {
        self.registers = self.filler.fill(&self.bytecode.register_definitions, &context, parameters)?;
        self.context = context;
        self.stack.clear();
        Ok(())
    }

    /// Evaluate the condition at `condition_index`; truthy iff the result is
    /// neither `null` nor `false` (§6).
    pub fn test(&mut self, condition_index: usize) -> Result<bool, RulesEvaluationError> {
        let offset = self
            .bytecode
            .condition_offset(condition_index)
            .ok_or(RulesEvaluationError::MalformedBytecode { pc: 0 })?;
        match self.run(offset as usize)? {
            Termination::Value(v) => Ok(v.is_truthy()),
            Termination::Endpoint(_) => Err(RulesEvaluationError::MalformedBytecode { pc: offset as usize }),
        }
    }

    /// Resolve the result at `result_index`. A negative index is the legal
    /// "no-match" sentinel: returns `Ok(None)` without running any bytecode
    /// (§6, property 10).
    pub fn resolve_result(&mut self, result_index: i32) -> Result<Option<Endpoint>, RulesEvaluationError> {
        if result_index < 0 {
            return Ok(None);
        }
        let offset = self
            .bytecode
            .result_offset(result_index as usize)
            .ok_or(RulesEvaluationError::MalformedBytecode { pc: 0 })?;
        match self.run(offset as usize)? {
            Termination::Value(Value::Null) => Ok(None),
            Termination::Value(_) => Err(RulesEvaluationError::MalformedBytecode { pc: offset as usize }),
            Termination::Endpoint(endpoint) => Ok(Some(endpoint)),
        }
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self, pc: usize) -> Result<Value, RulesEvaluationError> {
        self.stack.pop().ok_or(RulesEvaluationError::MalformedBytecode { pc })
    }

    fn pop_n(&mut self, n: usize, pc: usize) -> Result<Vec<Value>, RulesEvaluationError> {
        if self.stack.len() < n {
            return Err(RulesEvaluationError::MalformedBytecode { pc });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn constant(&self, index: usize, pc: usize) -> Result<Value, RulesEvaluationError> {
        self.bytecode
            .constant_pool
            .get(index)
            .cloned()
            .ok_or(RulesEvaluationError::MalformedBytecode { pc })
    }

    fn register(&self, r: u8, pc: usize) -> Result<Value, RulesEvaluationError> {
        self.registers
            .get(r as usize)
            .cloned()
            .ok_or(RulesEvaluationError::MalformedBytecode { pc })
    }

    fn expect_string(&self, v: Value, pc: usize) -> Result<Rc<str>, RulesEvaluationError> {
        match v {
            Value::String(s) => Ok(s),
            _ => Err(RulesEvaluationError::UnexpectedValueType { pc }),
        }
    }

    /// The main dispatch loop: runs opcodes starting at `start` until a
    /// `RETURN_*` opcode (§4.8).
    fn run(&mut self, start: usize) -> Result<Termination, RulesEvaluationError> {
        let code = Rc::clone(&self.bytecode);
        let instructions = &code.instructions;
        let mut pc = start;

        loop {
            let op_pc = pc;
            let byte = *instructions
                .get(pc)
                .ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
            pc += 1;
            let op = Opcode::try_from_u8(byte)
                .ok_or(RulesEvaluationError::UnknownInstruction { pc: op_pc, op: byte })?;

            match op {
                Opcode::LoadConst => {
                    let idx = read_u8(instructions, &mut pc, op_pc)?;
                    self.push(self.constant(idx as usize, op_pc)?);
                }
                Opcode::LoadConstW => {
                    let idx = read_u16(instructions, &mut pc, op_pc)?;
                    self.push(self.constant(idx as usize, op_pc)?);
                }
                Opcode::LoadRegister => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    self.push(self.register(r, op_pc)?);
                }
                Opcode::SetRegister => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
                    if (r as usize) >= self.registers.len() {
                        return Err(RulesEvaluationError::MalformedBytecode { pc: op_pc });
                    }
                    self.registers[r as usize] = top;
                }

                Opcode::Not => {
                    let v = self.pop(op_pc)?;
                    self.push(Value::Bool(v == Value::Bool(false)));
                }
                Opcode::IsSet => {
                    let v = self.pop(op_pc)?;
                    self.push(Value::Bool(!v.is_null()));
                }
                Opcode::IsTrue => {
                    let v = self.pop(op_pc)?;
                    self.push(Value::Bool(v == Value::Bool(true)));
                }
                Opcode::Equals => {
                    let b = self.pop(op_pc)?;
                    let a = self.pop(op_pc)?;
                    self.push(Value::Bool(a == b));
                }
                Opcode::StringEquals => {
                    let b = self.pop(op_pc)?;
                    let a = self.pop(op_pc)?;
                    let result = matches!((&a, &b), (Value::String(_), Value::String(_))) && a == b;
                    self.push(Value::Bool(result));
                }
                Opcode::BooleanEquals => {
                    let b = self.pop(op_pc)?;
                    let a = self.pop(op_pc)?;
                    let result = matches!((&a, &b), (Value::Bool(_), Value::Bool(_))) && a == b;
                    self.push(Value::Bool(result));
                }
                Opcode::TestRegisterIsSet => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    self.push(Value::Bool(!self.register(r, op_pc)?.is_null()));
                }
                Opcode::TestRegisterNotSet => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    self.push(Value::Bool(self.register(r, op_pc)?.is_null()));
                }
                Opcode::TestRegisterIsTrue => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    self.push(Value::Bool(self.register(r, op_pc)? == Value::Bool(true)));
                }
                Opcode::TestRegisterIsFalse => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    self.push(Value::Bool(self.register(r, op_pc)? == Value::Bool(false)));
                }

                Opcode::List0 => self.push(Value::list(Vec::new())),
                Opcode::List1 => {
                    let v = self.pop(op_pc)?;
                    self.push(Value::list(vec![v]));
                }
                Opcode::List2 => {
                    let v2 = self.pop(op_pc)?;
                    let v1 = self.pop(op_pc)?;
                    self.push(Value::list(vec![v1, v2]));
                }
                Opcode::ListN => {
                    let n = read_u8(instructions, &mut pc, op_pc)? as usize;
                    let items = self.pop_n(n, op_pc)?;
                    self.push(Value::list(items));
                }

                Opcode::Map0 => self.push(Value::map(ValueMap::new())),
                Opcode::Map1 | Opcode::Map2 | Opcode::Map3 | Opcode::Map4 => {
                    let n = match op {
                        Opcode::Map1 => 1,
                        Opcode::Map2 => 2,
                        Opcode::Map3 => 3,
                        _ => 4,
                    };
                    let pairs = self.pop_n(n * 2, op_pc)?;
                    self.push(Value::map(build_map(&pairs, op_pc)?));
                }
                Opcode::MapN => {
                    let n = read_u8(instructions, &mut pc, op_pc)? as usize;
                    let pairs = self.pop_n(n * 2, op_pc)?;
                    self.push(Value::map(build_map(&pairs, op_pc)?));
                }

                Opcode::ResolveTemplate => {
                    let arg_count = read_u8(instructions, &mut pc, op_pc)? as usize;
                    let template_index = read_u16(instructions, &mut pc, op_pc)? as usize;
                    let template = match self.constant(template_index, op_pc)? {
                        Value::Template(t) => t,
                        _ => return Err(RulesEvaluationError::UnexpectedValueType { pc: op_pc }),
                    };
                    let args = self.pop_n(arg_count, op_pc)?;
                    self.push(Value::string(template.resolve(&args)));
                }

                Opcode::Fn0 | Opcode::Fn1 | Opcode::Fn2 | Opcode::Fn3 | Opcode::Fn => {
                    let f = read_u16(instructions, &mut pc, op_pc)? as usize;
                    let info = code
                        .function_table
                        .get(f as u16)
                        .ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
                    let arity = match op {
                        Opcode::Fn0 => 0,
                        Opcode::Fn1 => 1,
                        Opcode::Fn2 => 2,
                        Opcode::Fn3 => 3,
                        _ => info.arity as usize,
                    };
                    let args = self.pop_n(arity, op_pc)?;
                    self.push((info.func)(&args));
                }

                Opcode::Substring => {
                    let start = read_u8(instructions, &mut pc, op_pc)? as usize;
                    let end = read_u8(instructions, &mut pc, op_pc)? as usize;
                    let reverse = read_u8(instructions, &mut pc, op_pc)? != 0;
                    let v = self.pop(op_pc)?;
                    let s = self.expect_string(v, op_pc)?;
                    self.push(substring(&s, start, end, reverse));
                }
                Opcode::IsValidHostLabel => {
                    let allow_dots = self.pop(op_pc)?;
                    let s = self.pop(op_pc)?;
                    let allow_dots = allow_dots.as_bool().unwrap_or(false);
                    let s = self.expect_string(s, op_pc)?;
                    self.push(Value::Bool(is_valid_host_label(&s, allow_dots)));
                }
                Opcode::ParseUrl => {
                    let v = self.pop(op_pc)?;
                    let s = self.expect_string(v, op_pc)?;
                    match self.uri_cache.get_or_parse(&s) {
                        Some(uri) => self.push(Value::Uri(Rc::new(uri))),
                        None => self.push(Value::Null),
                    }
                }
                Opcode::UriEncode => {
                    let v = self.pop(op_pc)?;
                    let s = self.expect_string(v, op_pc)?;
                    self.push(Value::string(uri_encode(&s)));
                }
                Opcode::Split => {
                    let limit = self.pop(op_pc)?;
                    let delimiter = self.pop(op_pc)?;
                    let string = self.pop(op_pc)?;
                    let string = self.expect_string(string, op_pc)?;
                    let delimiter = self.expect_string(delimiter, op_pc)?;
                    let limit = match limit {
                        Value::Int(n) if n > 0 => n as usize,
                        _ => usize::MAX,
                    };
                    let parts: Vec<Value> = string
                        .splitn(limit, delimiter.as_ref())
                        .map(Value::string)
                        .collect();
                    self.push(Value::list(parts));
                }

                Opcode::GetProperty => {
                    let name_idx = read_u16(instructions, &mut pc, op_pc)? as usize;
                    let name = self.expect_string(self.constant(name_idx, op_pc)?, op_pc)?;
                    let target = self.pop(op_pc)?;
                    self.push(get_property(&target, &name));
                }
                Opcode::GetIndex => {
                    let idx = read_u8(instructions, &mut pc, op_pc)?;
                    let target = self.pop(op_pc)?;
                    self.push(get_index(&target, idx));
                }
                Opcode::GetPropertyReg => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    let name_idx = read_u16(instructions, &mut pc, op_pc)? as usize;
                    let name = self.expect_string(self.constant(name_idx, op_pc)?, op_pc)?;
                    let target = self.register(r, op_pc)?;
                    self.push(get_property(&target, &name));
                }
                Opcode::GetIndexReg => {
                    let r = read_u8(instructions, &mut pc, op_pc)?;
                    let idx = read_u8(instructions, &mut pc, op_pc)?;
                    let target = self.register(r, op_pc)?;
                    self.push(get_index(&target, idx));
                }

                Opcode::ReturnError => {
                    let v = self.pop(op_pc)?;
                    let message = self.expect_string(v, op_pc)?;
                    return Err(RulesEvaluationError::ModeledRuleError {
                        message: message.to_string(),
                        pc: op_pc,
                    });
                }
                Opcode::ReturnValue => {
                    let v = self.pop(op_pc)?;
                    return Ok(Termination::Value(v));
                }
                Opcode::JnnOrPop => {
                    let offset = read_u16(instructions, &mut pc, op_pc)?;
                    let top = self
                        .stack
                        .last()
                        .ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
                    if !top.is_null() {
                        pc += offset as usize;
                    } else {
                        self.stack.pop();
                    }
                }
                Opcode::ReturnEndpoint => {
                    let flags = read_u8(instructions, &mut pc, op_pc)?;
                    let endpoint = self.build_endpoint(flags, op_pc)?;
                    return Ok(Termination::Endpoint(endpoint));
                }
            }
        }
    }

    fn build_endpoint(&mut self, flags: u8, pc: usize) -> Result<Endpoint, RulesEvaluationError> {
        let url = self.pop(pc)?;
        let url = self.expect_string(url, pc)?;

        let properties = if flags & 0b10 != 0 {
            match self.pop(pc)? {
                Value::Map(m) => (*m).clone(),
                _ => return Err(RulesEvaluationError::UnexpectedValueType { pc }),
            }
        } else {
            ValueMap::new()
        };

        let headers = if flags & 0b01 != 0 {
            match self.pop(pc)? {
                Value::Map(m) => (*m).clone(),
                _ => return Err(RulesEvaluationError::UnexpectedValueType { pc }),
            }
        } else {
            ValueMap::new()
        };

        let uri = self
            .uri_cache
            .get_or_parse(&url)
            .ok_or_else(|| RulesEvaluationError::UriParseFailure(url.to_string()))?;

        let mut endpoint = Endpoint {
            uri: uri.as_str().to_string(),
            properties: properties.clone(),
        };
        if !headers.is_empty() {
            endpoint.properties.insert("headers".to_string(), Value::map(headers.clone()));
        }

        for extension in &self.extensions {
            extension.extract_endpoint_properties(&mut endpoint, &self.context, &properties, &headers);
        }

        Ok(endpoint)
    }
}

/// MAP1..4/MAPN stack contract, normalised to the regular alternating form
/// (§9 "Open question - MAP3 layout"): each pair is pushed as `(value, key)`,
/// so within the popped-and-reordered region pair `i` is
/// `(pairs[2i], pairs[2i+1])`.
fn build_map(pairs: &[Value], pc: usize) -> Result<ValueMap, RulesEvaluationError> {
    if pairs.len() % 2 != 0 {
        return Err(RulesEvaluationError::MalformedBytecode { pc });
    }
    let mut map = ValueMap::new();
    for chunk in pairs.chunks(2) {
        let value = chunk[0].clone();
        let key = match &chunk[1] {
            Value::String(s) => s.to_string(),
            _ => return Err(RulesEvaluationError::UnexpectedValueType { pc }),
        };
        map.insert(key, value);
    }
    Ok(map)
}

fn get_property(target: &Value, name: &str) -> Value {
    match target {
        Value::Map(m) => m.get(name).cloned().unwrap_or(Value::Null),
        Value::Uri(uri) => uri.property(name),
        _ => Value::Null,
    }
}

fn get_index(target: &Value, index: u8) -> Value {
    match target {
        Value::List(items) => items.get(index as usize).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Code-point (not UTF-16/byte) slicing; `reverse` indexes from the end
/// (§4.8).
fn substring(s: &str, start: usize, end: usize, reverse: bool) -> Value {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let (lo, hi) = if reverse {
        (len.checked_sub(end), len.checked_sub(start))
    } else {
        (Some(start), Some(end))
    };
    match (lo, hi) {
        (Some(lo), Some(hi)) if lo <= hi && hi <= len => {
            Value::string(chars[lo..hi].iter().collect::<String>())
        }
        _ => Value::Null,
    }
}

fn is_valid_host_label(s: &str, allow_dots: bool) -> bool {
    if s.is_empty() || s.len() > 255 {
        return false;
    }
    let labels: Vec<&str> = if allow_dots { s.split('.').collect() } else { vec![s] };
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        let c = b as char;
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~') {
            out.push(c);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn read_u8(code: &[u8], pc: &mut usize, op_pc: usize) -> Result<u8, RulesEvaluationError> {
    let b = *code.get(*pc).ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
    *pc += 1;
    Ok(b)
}

fn read_u16(code: &[u8], pc: &mut usize, op_pc: usize) -> Result<u16, RulesEvaluationError> {
    let b0 = *code.get(*pc).ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
    let b1 = *code.get(*pc + 1).ok_or(RulesEvaluationError::MalformedBytecode { pc: op_pc })?;
    *pc += 2;
    Ok(u16::from_le_bytes([b0, b1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::PathPart;
    use crate::endpoint::DefaultRegisterFiller;
    use crate::functions::FunctionRegistry;
    use crate::rules::{Condition, Expr, Parameter, Result as RuleResult, Ruleset, TemplateSegment};

    fn eval(ruleset: &Ruleset) -> Evaluator {
        let bytecode = crate::compiler::compile(ruleset, &FunctionRegistry::new(), &[]).unwrap();
        Evaluator::new(Rc::new(bytecode), vec![], Rc::new(DefaultRegisterFiller::default()))
    }

    #[test]
    fn scenario_a_minimal_region() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Region"));
        ruleset
            .conditions
            .push(Condition::new(Expr::IsSet(Box::new(Expr::Reference("Region".to_string())))));
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::StringTemplate(vec![
                TemplateSegment::Literal("https://example.".to_string()),
                TemplateSegment::Dynamic(Expr::Reference("Region".to_string())),
                TemplateSegment::Literal(".amazonaws.com".to_string()),
            ]),
            headers: indexmap::IndexMap::new(),
            properties: indexmap::IndexMap::new(),
        });

        let mut evaluator = eval(&ruleset);
        let mut params = ValueMap::new();
        params.insert("Region".to_string(), Value::string("us-east-1"));
        evaluator.reset(Context::new(), &params).unwrap();
        assert!(evaluator.test(0).unwrap());
        let endpoint = evaluator.resolve_result(0).unwrap().unwrap();
        assert_eq!(endpoint.uri, "https://example.us-east-1.amazonaws.com");
    }

    #[test]
    fn negative_result_index_is_no_bytecode_no_match() {
        let ruleset = Ruleset::new();
        let mut evaluator = eval(&ruleset);
        evaluator.reset(Context::new(), &ValueMap::new()).unwrap();
        assert_eq!(evaluator.resolve_result(-1).unwrap(), None);
    }

    #[test]
    fn mapn_matches_natural_map_for_each_arity() {
        for n in 1..=4usize {
            let mut ruleset = Ruleset::new();
            let mut fields = indexmap::IndexMap::new();
            for i in 0..n {
                fields.insert(format!("k{i}"), Expr::Literal(Value::Int(i as i64)));
            }
            ruleset.results.push(RuleResult::Endpoint {
                url: Expr::Literal(Value::string("https://h")),
                headers: indexmap::IndexMap::new(),
                properties: fields,
            });
            let mut evaluator = eval(&ruleset);
            evaluator.reset(Context::new(), &ValueMap::new()).unwrap();
            let endpoint = evaluator.resolve_result(0).unwrap().unwrap();
            for i in 0..n {
                assert_eq!(endpoint.properties.get(&format!("k{i}")), Some(&Value::Int(i as i64)));
            }
        }
    }

    #[test]
    fn error_result_is_modeled_rule_error() {
        let mut ruleset = Ruleset::new();
        ruleset
            .results
            .push(RuleResult::Error(Expr::Literal(Value::string("Region is required"))));
        let mut evaluator = eval(&ruleset);
        evaluator.reset(Context::new(), &ValueMap::new()).unwrap();
        let err = evaluator.resolve_result(0).unwrap_err();
        assert!(matches!(err, RulesEvaluationError::ModeledRuleError { .. }));
    }

    #[test]
    fn get_index_at_len_is_null_not_error() {
        assert_eq!(get_index(&Value::list(vec![Value::Int(1)]), 1), Value::Null);
    }

    #[test]
    fn substring_operates_on_code_points() {
        assert_eq!(substring("héllo", 0, 2, false), Value::string("hé"));
        assert_eq!(substring("abc", 0, 10, false), Value::Null);
    }

    /// FIPS toggle: an optional parameter defaulting to `false`, two mutually
    /// exclusive `booleanEquals` conditions gating two endpoint results
    /// (§4.9 default-value fill, §4.7 `booleanEquals` fusion, §8 Scenario B).
    #[test]
    fn scenario_b_fips_toggle_with_default() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Region"));
        ruleset.parameters.push(Parameter::optional("UseFIPS", Some(Value::Bool(false))));
        ruleset.conditions.push(Condition::new(Expr::BooleanEquals(
            Box::new(Expr::Reference("UseFIPS".to_string())),
            Box::new(Expr::Literal(Value::Bool(true))),
        )));
        ruleset.conditions.push(Condition::new(Expr::BooleanEquals(
            Box::new(Expr::Reference("UseFIPS".to_string())),
            Box::new(Expr::Literal(Value::Bool(false))),
        )));
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::StringTemplate(vec![
                TemplateSegment::Literal("https://fips.".to_string()),
                TemplateSegment::Dynamic(Expr::Reference("Region".to_string())),
                TemplateSegment::Literal(".amazonaws.com".to_string()),
            ]),
            headers: indexmap::IndexMap::new(),
            properties: indexmap::IndexMap::new(),
        });
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::StringTemplate(vec![
                TemplateSegment::Literal("https://".to_string()),
                TemplateSegment::Dynamic(Expr::Reference("Region".to_string())),
                TemplateSegment::Literal(".amazonaws.com".to_string()),
            ]),
            headers: indexmap::IndexMap::new(),
            properties: indexmap::IndexMap::new(),
        });

        let mut evaluator = eval(&ruleset);
        let mut params = ValueMap::new();
        params.insert("Region".to_string(), Value::string("us-west-2"));
        params.insert("UseFIPS".to_string(), Value::Bool(true));
        evaluator.reset(Context::new(), &params).unwrap();
        assert!(evaluator.test(0).unwrap());
        assert!(!evaluator.test(1).unwrap());
        let endpoint = evaluator.resolve_result(0).unwrap().unwrap();
        assert_eq!(endpoint.uri, "https://fips.us-west-2.amazonaws.com");

        let mut params = ValueMap::new();
        params.insert("Region".to_string(), Value::string("us-west-2"));
        evaluator.reset(Context::new(), &params).unwrap();
        assert!(!evaluator.test(0).unwrap());
        assert!(evaluator.test(1).unwrap());
        let endpoint = evaluator.resolve_result(1).unwrap().unwrap();
        assert_eq!(endpoint.uri, "https://us-west-2.amazonaws.com");
    }

    /// A parameter with no caller value and no default falls through to its
    /// named builtin, resolved from the caller's [`Context`] (§4.9 Scenario C).
    #[test]
    fn scenario_c_custom_endpoint_via_builtin() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::builtin("Endpoint", "SDK::Endpoint"));
        ruleset
            .conditions
            .push(Condition::bound(Expr::IsSet(Box::new(Expr::Reference("Endpoint".to_string()))), "hasEndpoint"));
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::Reference("Endpoint".to_string()),
            headers: indexmap::IndexMap::new(),
            properties: indexmap::IndexMap::new(),
        });

        let mut evaluator = eval(&ruleset);
        let context = Context::new().with("SDK::Endpoint", Value::string("https://override.example.com"));
        evaluator.reset(context, &ValueMap::new()).unwrap();
        assert!(evaluator.test(0).unwrap());
        let endpoint = evaluator.resolve_result(0).unwrap().unwrap();
        assert_eq!(endpoint.uri, "https://override.example.com");
    }

    /// `parseURL` binds the parsed `Uri` itself, not a boolean - the
    /// condition is truthy iff parsing succeeded (§4.6, §4.8 `PARSE_URL`).
    /// A later attribute access reads properties off that bound register.
    #[test]
    fn scenario_d_parse_url_and_attribute_access() {
        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Endpoint"));
        ruleset.conditions.push(Condition::bound(
            Expr::ParseUrl(Box::new(Expr::Reference("Endpoint".to_string()))),
            "parsed",
        ));
        let mut properties = indexmap::IndexMap::new();
        properties.insert(
            "authority".to_string(),
            Expr::GetAttr {
                target: Box::new(Expr::Reference("parsed".to_string())),
                path: vec![PathPart::Key("authority".to_string())],
            },
        );
        properties.insert(
            "isIp".to_string(),
            Expr::GetAttr {
                target: Box::new(Expr::Reference("parsed".to_string())),
                path: vec![PathPart::Key("isIp".to_string())],
            },
        );
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::Reference("Endpoint".to_string()),
            headers: indexmap::IndexMap::new(),
            properties,
        });

        let mut evaluator = eval(&ruleset);
        let mut params = ValueMap::new();
        params.insert("Endpoint".to_string(), Value::string("https://example.com:443/path"));
        evaluator.reset(Context::new(), &params).unwrap();
        assert!(evaluator.test(0).unwrap());
        let endpoint = evaluator.resolve_result(0).unwrap().unwrap();
        assert_eq!(endpoint.properties.get("authority"), Some(&Value::string("example.com:443")));
        assert_eq!(endpoint.properties.get("isIp"), Some(&Value::Bool(false)));

        params.insert("Endpoint".to_string(), Value::string("not a url"));
        evaluator.reset(Context::new(), &params).unwrap();
        assert!(!evaluator.test(0).unwrap());
    }

    /// Headers land under the well-known `"headers"` property before
    /// extensions run, and extensions run in registration order, reading the
    /// free-form property/header bags to derive their own fields (§9
    /// "Extension dispatch").
    #[test]
    fn scenario_f_headers_and_extension_dispatch() {
        struct UppercaseRegion;
        impl Extension for UppercaseRegion {
            fn extract_endpoint_properties(
                &self,
                endpoint: &mut Endpoint,
                _context: &Context,
                properties: &ValueMap,
                _headers: &ValueMap,
            ) {
                if let Some(region) = properties.get("region").and_then(Value::as_str) {
                    endpoint.properties.insert("regionUpper".to_string(), Value::string(region.to_uppercase()));
                }
            }
        }

        let mut ruleset = Ruleset::new();
        ruleset.parameters.push(Parameter::required("Region"));
        let mut headers = indexmap::IndexMap::new();
        headers.insert("x-amz-region".to_string(), vec![Expr::Reference("Region".to_string())]);
        let mut properties = indexmap::IndexMap::new();
        properties.insert("region".to_string(), Expr::Reference("Region".to_string()));
        ruleset.results.push(RuleResult::Endpoint {
            url: Expr::Literal(Value::string("https://example.com")),
            headers,
            properties,
        });

        let bytecode = crate::compiler::compile(&ruleset, &FunctionRegistry::new(), &[]).unwrap();
        let mut evaluator = Evaluator::new(
            Rc::new(bytecode),
            vec![Rc::new(UppercaseRegion)],
            Rc::new(DefaultRegisterFiller::default()),
        );
        let mut params = ValueMap::new();
        params.insert("Region".to_string(), Value::string("us-east-1"));
        evaluator.reset(Context::new(), &params).unwrap();
        let endpoint = evaluator.resolve_result(0).unwrap().unwrap();

        assert_eq!(endpoint.properties.get("region"), Some(&Value::string("us-east-1")));
        assert_eq!(endpoint.properties.get("regionUpper"), Some(&Value::string("US-EAST-1")));
        match endpoint.properties.get("headers") {
            Some(Value::Map(m)) => {
                assert_eq!(m.get("x-amz-region"), Some(&Value::list(vec![Value::string("us-east-1")])));
            }
            other => panic!("expected headers map, got {other:?}"),
        }
    }
}
