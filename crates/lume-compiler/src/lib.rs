//! Lume compiler: single-pass register bytecode generator for Lua 5.1.

pub mod compiler;
pub mod disasm;
pub mod error;
pub mod limits;
pub mod opcode;
pub mod proto;

pub use compiler::expr::{BinOp, ExprDesc, ExprKind, UnOp};
pub use compiler::{Compiler, FuncState};
pub use error::{CompileError, CompileErrorKind, CompileResult};
pub use limits::Limits;
pub use proto::{Constant, Proto};
