//! Endpoint assembly: the result object built by `RETURN_ENDPOINT`, the
//! caller-supplied context and register-filling strategy, and the extension
//! dispatch that lifts free-form properties into typed fields (spec
//! component C9, §4.8 "Endpoint assembly", §4.9, §9 "Extension dispatch").

use std::fmt;

use crate::error::RulesEvaluationError;
use crate::registers::RegisterDef;
use crate::value::{Value, ValueMap};

/// Caller-supplied evaluation context: request-scoped data available to
/// builtin providers and to extensions, but never to the bytecode itself.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: ValueMap,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Context {
        self.values.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// The result of a successful `RETURN_ENDPOINT`: a URI plus a property bag.
/// Headers, if present, are installed under the well-known `"headers"` key
/// (§4.8) before extensions run.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub uri: String,
    pub properties: ValueMap,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// A host-provided capability that lifts protocol-specific fields out of an
/// endpoint's free-form `properties`/`headers` maps (§9 "Extension
/// dispatch"). Extensions run in registration order and mutate the endpoint
/// in place.
pub trait Extension {
    fn extract_endpoint_properties(
        &self,
        endpoint: &mut Endpoint,
        context: &Context,
        properties: &ValueMap,
        headers: &ValueMap,
    );
}

/// Resolves a named builtin (e.g. `SDK::Endpoint`) against the evaluation
/// context, for parameters declared with a `builtin` name (§4.9).
pub trait BuiltinProvider {
    fn resolve(&self, name: &str, context: &Context) -> Option<Value>;
}

/// The standard builtin: surfaces a caller-supplied custom endpoint string
/// from the context under the same key as the builtin name (§4.9, Scenario
/// C).
#[derive(Debug, Clone, Default)]
pub struct SdkEndpointBuiltin;

impl BuiltinProvider for SdkEndpointBuiltin {
    fn resolve(&self, name: &str, context: &Context) -> Option<Value> {
        if name == "SDK::Endpoint" {
            context.get("SDK::Endpoint").cloned()
        } else {
            None
        }
    }
}

/// Fills the register file from `(context, parameters)` per the algorithm in
/// §4.9. Implementations own the choice of builtin provider.
pub trait RegisterFiller {
    fn fill(
        &self,
        defs: &[RegisterDef],
        context: &Context,
        parameters: &ValueMap,
    ) -> Result<Vec<Value>, RulesEvaluationError>;
}

/// The standard filler: parameter value, then default, then builtin, then
/// required-failure, then null; temp registers are always left null.
pub struct DefaultRegisterFiller<B: BuiltinProvider> {
    builtins: B,
}

impl<B: BuiltinProvider> DefaultRegisterFiller<B> {
    pub fn new(builtins: B) -> DefaultRegisterFiller<B> {
        DefaultRegisterFiller { builtins }
    }
}

impl Default for DefaultRegisterFiller<SdkEndpointBuiltin> {
    fn default() -> Self {
        DefaultRegisterFiller::new(SdkEndpointBuiltin)
    }
}

impl<B: BuiltinProvider> RegisterFiller for DefaultRegisterFiller<B> {
    fn fill(
        &self,
        defs: &[RegisterDef],
        context: &Context,
        parameters: &ValueMap,
    ) -> Result<Vec<Value>, RulesEvaluationError> {
        let mut registers = Vec::with_capacity(defs.len());
        for def in defs {
            if def.temp {
                registers.push(Value::Null);
                continue;
            }
            let filled = match parameters.get(&def.name) {
                Some(v) if !v.is_null() => v.clone(),
                _ => match &def.default_value {
                    Some(v) => v.clone(),
                    None => match &def.builtin {
                        Some(name) => match self.builtins.resolve(name, context) {
                            Some(v) => v,
                            None if def.required => {
                                return Err(RulesEvaluationError::MissingRequiredParameter(def.name.clone()));
                            }
                            None => Value::Null,
                        },
                        None if def.required => {
                            return Err(RulesEvaluationError::MissingRequiredParameter(def.name.clone()));
                        }
                        None => Value::Null,
                    },
                },
            };
            registers.push(filled);
        }
        Ok(registers)
    }
}
