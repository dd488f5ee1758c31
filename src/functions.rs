//! Host-provided function table (§3, §4.1 `FN*` opcodes).
//!
//! Functions beyond the built-in fast paths (`substring`, `isValidHostLabel`,
//! `parseURL`, `uriEncode`, `split`) are resolved by name against a
//! [`FunctionRegistry`] supplied by the host at compile time, then invoked at
//! their interned function-table index by the VM.

use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// A pure, synchronous host callable with a fixed arity (§5: function-table
/// calls must not block on I/O).
pub type HostFunction = Rc<dyn Fn(&[Value]) -> Value>;

#[derive(Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub arity: u8,
    pub func: HostFunction,
}

impl std::fmt::Debug for FunctionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Host-supplied catalogue of callable functions, keyed by the name a
/// ruleset expression references (`f(args...)`).
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: Vec<FunctionInfo>,
    by_name: HashMap<String, usize>,
}

impl FunctionRegistry {
    pub fn new() -> FunctionRegistry {
        FunctionRegistry::default()
    }

    pub fn register(&mut self, name: impl Into<String>, arity: u8, func: HostFunction) {
        let name = name.into();
        let idx = self.functions.len();
        self.functions.push(FunctionInfo {
            name: name.clone(),
            arity,
            func,
        });
        self.by_name.insert(name, idx);
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionInfo> {
        self.by_name.get(name).map(|&i| &self.functions[i])
    }
}

/// The function table interned into a compiled [`crate::Bytecode`]: the
/// subset of the registry actually referenced by this ruleset, in
/// first-use order.
#[derive(Default, Clone)]
pub struct FunctionTable {
    entries: Vec<FunctionInfo>,
    by_name: HashMap<String, u16>,
}

impl FunctionTable {
    pub fn new() -> FunctionTable {
        FunctionTable::default()
    }

    /// Intern `info`, returning its function-table index. Repeated interning
    /// of the same name returns the same index.
    pub fn intern(&mut self, info: &FunctionInfo) -> u16 {
        if let Some(&idx) = self.by_name.get(&info.name) {
            return idx;
        }
        let idx = self.entries.len() as u16;
        self.entries.push(info.clone());
        self.by_name.insert(info.name.clone(), idx);
        idx
    }

    pub fn get(&self, index: u16) -> Option<&FunctionInfo> {
        self.entries.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
