//! Hard limits enforced while generating code.

use crate::opcode::{MAX_A, MAX_BX, MAX_C};
use serde::{Deserialize, Serialize};

/// Compile-time resource limits for a single function.
///
/// Every limit is checked the moment it would be exceeded; nothing is
/// truncated silently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of active local variables per function.
    pub max_vars: u32,
    /// Maximum number of upvalues per function.
    pub max_upvalues: u32,
    /// Maximum number of registers per function.
    pub max_stack: u32,
    /// Maximum number of instructions per function.
    pub max_instructions: u32,
    /// Number of list items accumulated before a SETLIST flush.
    pub fields_per_flush: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_vars: 200,
            max_upvalues: 60,
            max_stack: 250,
            max_instructions: i32::MAX as u32,
            fields_per_flush: 50,
        }
    }
}

impl Limits {
    /// Clamp every limit into the range the instruction encoding can express.
    pub fn clamped(mut self) -> Self {
        // registers are addressed by A; NO_REG (255) must stay free
        self.max_stack = self.max_stack.clamp(2, MAX_A - 1);
        self.max_vars = self.max_vars.min(self.max_stack);
        // upvalue indices travel in B of GETUPVAL/SETUPVAL
        self.max_upvalues = self.max_upvalues.min(MAX_A);
        self.max_instructions = self.max_instructions.clamp(1, i32::MAX as u32);
        self.fields_per_flush = self.fields_per_flush.clamp(1, MAX_C);
        self
    }

    /// Largest constant index a function may allocate.
    pub fn max_constants(&self) -> u32 {
        MAX_BX
    }
}
