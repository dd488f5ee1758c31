//! Error taxonomy (§7): `CompileError` from the compiler, `RulesEvaluationError`
//! from the VM.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("constant pool overflow: more than 65536 distinct constants")]
    ConstantPoolOverflow,

    #[error("too many registers: more than 256 parameters/temporaries")]
    TooManyRegisters,

    #[error("jump too far: offset exceeds 65535 bytes")]
    JumpTooFar,

    #[error("unsupported literal: {0}")]
    UnsupportedLiteral(String),

    #[error("invalid getAttr path")]
    InvalidGetAttrPath,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RulesEvaluationError {
    #[error("missing required parameter: {0}")]
    MissingRequiredParameter(String),

    #[error("unknown instruction {op} at pc={pc}")]
    UnknownInstruction { pc: usize, op: u8 },

    #[error("malformed bytecode at pc={pc}")]
    MalformedBytecode { pc: usize },

    #[error("unexpected value type at pc={pc}")]
    UnexpectedValueType { pc: usize },

    #[error("unexpected null at pc={pc}")]
    UnexpectedNull { pc: usize },

    #[error("{message} (pc={pc})")]
    ModeledRuleError { message: String, pc: usize },

    #[error("failed to parse URI: {0}")]
    UriParseFailure(String),
}
