//! Compile errors raised by the code generator.

use std::fmt;
use thiserror::Error;

/// Identifies the function a limit error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionName {
    Main,
    /// A nested function, by the line where it was defined.
    DefinedAt(u32),
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionName::Main => write!(f, "main function"),
            FunctionName::DefinedAt(line) => write!(f, "function at line {line}"),
        }
    }
}

/// The kind of compilation error
#[derive(Error, Clone, Debug, PartialEq)]
pub enum CompileErrorKind {
    #[error("{function} has more than {limit} local variables")]
    TooManyLocals { function: FunctionName, limit: u32 },

    #[error("{function} has more than {limit} upvalues")]
    TooManyUpvalues { function: FunctionName, limit: u32 },

    #[error("{function} has more than {limit} constants")]
    TooManyConstants { function: FunctionName, limit: u32 },

    #[error("{function} has more than {limit} instructions")]
    TooManyInstructions { function: FunctionName, limit: u32 },

    /// Register stack exhausted
    #[error("function or expression too complex")]
    TooComplex,

    /// Jump offset does not fit in sBx
    #[error("control structure too long")]
    ControlStructureTooLong,

    #[error("no loop to break")]
    NoLoopToBreak,

    #[error("cannot use '...' outside a vararg function")]
    VarargOutsideVarargFunction,

    #[error("syntax error: cannot assign to this expression")]
    InvalidAssignTarget,

    /// Raised by the driving parser.
    #[error("{0}")]
    Syntax(String),
}

/// A compile error with the source line active when it was raised.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("{line}: {kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub line: u32,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, line: u32) -> Self {
        Self { kind, line }
    }
}

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;
