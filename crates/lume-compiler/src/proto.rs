/// Function prototype: holds compiled bytecode, constants, and debug info.
use crate::opcode::Instruction;
use lume_core::string::StringId;

/// A constant value in the constant pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Number(f64),
    String(StringId),
}

/// Where a closure finds an upvalue when it is instantiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpvalKind {
    /// A register of the immediately enclosing function.
    InStack(u32),
    /// An upvalue of the immediately enclosing function.
    Upvalue(u32),
}

/// Description of an upvalue.
#[derive(Clone, Debug, PartialEq)]
pub struct UpvalDesc {
    /// Name of the upvalue (for debug info).
    pub name: StringId,
    pub kind: UpvalKind,
}

/// A local variable debug entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    pub name: StringId,
    /// First PC where the variable is active.
    pub start_pc: u32,
    /// First PC where the variable is dead.
    pub end_pc: u32,
}

/// A compiled function prototype.
#[derive(Clone, Debug)]
pub struct Proto {
    /// Bytecode instructions.
    pub code: Vec<Instruction>,
    /// Source line of each instruction, parallel to `code`.
    pub line_info: Vec<u32>,
    /// Constant pool.
    pub constants: Vec<Constant>,
    /// Nested function prototypes.
    pub protos: Vec<Proto>,
    /// Upvalue descriptors.
    pub upvalues: Vec<UpvalDesc>,
    /// Local variable debug info.
    pub local_vars: Vec<LocalVar>,
    /// Number of fixed parameters.
    pub num_params: u32,
    /// Whether this function accepts varargs.
    pub is_vararg: bool,
    /// Maximum stack size needed.
    pub max_stack_size: u32,
    /// Source name (for error messages).
    pub source: Option<StringId>,
    pub line_defined: u32,
    pub last_line_defined: u32,
}

impl Proto {
    /// Create a new empty prototype.
    pub fn new() -> Self {
        Proto {
            code: Vec::new(),
            line_info: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            local_vars: Vec::new(),
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2, // minimum
            source: None,
            line_defined: 0,
            last_line_defined: 0,
        }
    }

    /// Emit an instruction at the given source line.
    pub fn emit(&mut self, inst: Instruction, line: u32) -> usize {
        let pc = self.code.len();
        self.code.push(inst);
        self.line_info.push(line);
        pc
    }

    /// Remove the last instruction and its line.
    pub fn pop(&mut self) -> Option<Instruction> {
        self.line_info.pop();
        self.code.pop()
    }

    /// Get the line number for a given PC, or 0 if out of range.
    pub fn get_line(&self, pc: usize) -> u32 {
        self.line_info.get(pc).copied().unwrap_or(0)
    }

    /// Get the number of instructions.
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Count instructions in this prototype and every nested one.
    pub fn total_code_len(&self) -> usize {
        self.code.len() + self.protos.iter().map(Proto::total_code_len).sum::<usize>()
    }
}

impl Default for Proto {
    fn default() -> Self {
        Self::new()
    }
}
