//! The compiled, immutable bytecode artifact (§3) plus its writer (C2) and
//! opcode set (C1).

mod opcode;
mod writer;

pub use opcode::Opcode;
pub use writer::{BytecodeWriter, JumpPatch};

pub use crate::registers::RegisterDef;
use crate::functions::FunctionTable;
use crate::value::Value;

/// Produced once per ruleset by [`crate::compiler::compile`] and read-only
/// thereafter. May be shared across evaluators without synchronization (§5).
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constant_pool: Vec<Value>,
    pub function_table: FunctionTable,
    pub register_definitions: Vec<RegisterDef>,
    /// One per condition: byte offset into `instructions` of its first opcode.
    pub condition_offsets: Vec<u32>,
    /// One per result: byte offset into `instructions` of its first opcode.
    pub result_offsets: Vec<u32>,
}

impl Bytecode {
    pub fn condition_offset(&self, index: usize) -> Option<u32> {
        self.condition_offsets.get(index).copied()
    }

    pub fn result_offset(&self, index: usize) -> Option<u32> {
        self.result_offsets.get(index).copied()
    }
}
