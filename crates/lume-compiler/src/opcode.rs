/// Lua 5.1 opcodes and instruction encoding.
///
/// Instruction format (32 bits):
/// - Bits 0-5: OpCode (6 bits)
/// - Bits 6-13: A (8 bits)
/// - For iABC format:
///   - Bits 14-22: C (9 bits)
///   - Bits 23-31: B (9 bits)
/// - For iABx: Bx = bits 14-31 (unsigned 18 bits)
/// - For iAsBx: sBx = Bx - MAX_SBX (signed interpretation)
///
/// B and C may be RK operands: bit 8 set means "constant index", clear means
/// "register".
use std::fmt;

const SIZE_OP: u32 = 6;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 9;
const SIZE_C: u32 = 9;
const SIZE_BX: u32 = SIZE_B + SIZE_C; // 18

const POS_OP: u32 = 0;
const POS_A: u32 = POS_OP + SIZE_OP; // 6
const POS_C: u32 = POS_A + SIZE_A; // 14
const POS_B: u32 = POS_C + SIZE_C; // 23
const POS_BX: u32 = POS_C;

const fn mask(n: u32) -> u32 {
    (1 << n) - 1
}

pub const MAX_A: u32 = mask(SIZE_A); // 255
pub const MAX_B: u32 = mask(SIZE_B); // 511
pub const MAX_C: u32 = mask(SIZE_C); // 511
pub const MAX_BX: u32 = mask(SIZE_BX); // 262143
pub const MAX_SBX: i32 = (MAX_BX >> 1) as i32; // 131071

/// Marks an RK operand as a constant index.
pub const BIT_RK: u32 = 1 << (SIZE_B - 1); // 256
/// Largest constant index that fits in an RK operand.
pub const MAX_INDEX_RK: u32 = BIT_RK - 1; // 255
/// "No register" marker for TESTSET targets.
pub const NO_REG: u32 = MAX_A;

/// Returns true if the RK operand names a constant.
pub fn is_k(rk: u32) -> bool {
    rk & BIT_RK != 0
}

/// Encode a constant index as an RK operand.
pub fn rk_as_k(idx: u32) -> u32 {
    idx | BIT_RK
}

/// Constant index of an RK operand.
pub fn index_k(rk: u32) -> u32 {
    rk & !BIT_RK
}

/// All 38 Lua 5.1 opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK,
    LoadBool,
    LoadNil,
    GetUpval,
    GetGlobal,
    GetTable,
    SetGlobal,
    SetUpval,
    SetTable,
    NewTable,
    Self_,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Not,
    Len,
    Concat,
    Jmp,
    Eq,
    Lt,
    Le,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    ForLoop,
    ForPrep,
    TForLoop,
    SetList,
    Close,
    Closure,
    VarArg,
}

impl OpCode {
    /// Number of opcodes.
    pub const COUNT: usize = 38;

    const ALL: [OpCode; OpCode::COUNT] = {
        use OpCode::*;
        [
            Move, LoadK, LoadBool, LoadNil, GetUpval, GetGlobal, GetTable, SetGlobal, SetUpval,
            SetTable, NewTable, Self_, Add, Sub, Mul, Div, Mod, Pow, Unm, Not, Len, Concat, Jmp,
            Eq, Lt, Le, Test, TestSet, Call, TailCall, Return, ForLoop, ForPrep, TForLoop,
            SetList, Close, Closure, VarArg,
        ]
    };

    /// Get the opcode from a u8 value.
    pub fn from_u8(val: u8) -> Option<OpCode> {
        Self::ALL.get(val as usize).copied()
    }

    /// Get the instruction format for this opcode.
    pub fn format(&self) -> InstructionFormat {
        use InstructionFormat::*;
        use OpCode::*;
        match self {
            LoadK | GetGlobal | SetGlobal | Closure => IABx,
            Jmp | ForLoop | ForPrep => IAsBx,
            _ => IABC,
        }
    }

    /// Get the luac mnemonic of this opcode.
    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadK => "LOADK",
            LoadBool => "LOADBOOL",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            GetGlobal => "GETGLOBAL",
            GetTable => "GETTABLE",
            SetGlobal => "SETGLOBAL",
            SetUpval => "SETUPVAL",
            SetTable => "SETTABLE",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Pow => "POW",
            Unm => "UNM",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Close => "CLOSE",
            Closure => "CLOSURE",
            VarArg => "VARARG",
        }
    }

    /// Returns true if this opcode is a test: it conditionally skips the
    /// following instruction, which is always a JMP.
    pub fn is_test(&self) -> bool {
        use OpCode::*;
        matches!(self, Eq | Lt | Le | Test | TestSet | TForLoop)
    }

    /// Returns true if B and C are RK operands.
    pub fn uses_rk(&self) -> bool {
        use OpCode::*;
        matches!(
            self,
            GetTable | SetTable | Self_ | Add | Sub | Mul | Div | Mod | Pow | Eq | Lt | Le
        )
    }
}

/// Instruction format types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionFormat {
    IABC,
    IABx,
    IAsBx,
}

/// A 32-bit Lua 5.1 bytecode instruction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    // ---- Constructors ----

    /// Create an iABC instruction.
    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        debug_assert_eq!(op.format(), InstructionFormat::IABC, "{} is not iABC", op.name());
        debug_assert!(a <= MAX_A && b <= MAX_B && c <= MAX_C);
        Instruction(((op as u32) << POS_OP) | (a << POS_A) | (b << POS_B) | (c << POS_C))
    }

    /// Create an iABx instruction.
    pub fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        debug_assert_ne!(op.format(), InstructionFormat::IABC, "{} is iABC", op.name());
        debug_assert!(a <= MAX_A && bx <= MAX_BX, "Bx out of range: {bx}");
        Instruction(((op as u32) << POS_OP) | (a << POS_A) | (bx << POS_BX))
    }

    /// Create an iAsBx instruction (signed Bx).
    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        debug_assert!((-MAX_SBX..=MAX_SBX).contains(&sbx), "sBx out of range: {sbx}");
        Self::abx(op, a, (sbx + MAX_SBX) as u32)
    }

    // ---- Decoders ----

    /// Get the opcode.
    ///
    /// Raw words (the SETLIST batch extension) decode as MOVE.
    pub fn opcode(&self) -> OpCode {
        let val = (self.0 >> POS_OP) & mask(SIZE_OP);
        OpCode::from_u8(val as u8).unwrap_or(OpCode::Move)
    }

    pub fn a(&self) -> u32 {
        (self.0 >> POS_A) & mask(SIZE_A)
    }

    pub fn b(&self) -> u32 {
        (self.0 >> POS_B) & mask(SIZE_B)
    }

    pub fn c(&self) -> u32 {
        (self.0 >> POS_C) & mask(SIZE_C)
    }

    /// Get field Bx (unsigned).
    pub fn bx(&self) -> u32 {
        (self.0 >> POS_BX) & mask(SIZE_BX)
    }

    /// Get field sBx (signed).
    pub fn sbx(&self) -> i32 {
        self.bx() as i32 - MAX_SBX
    }

    // ---- Mutators (for backpatching) ----

    pub fn set_a(&mut self, a: u32) {
        debug_assert!(a <= MAX_A);
        self.0 = (self.0 & !(mask(SIZE_A) << POS_A)) | (a << POS_A);
    }

    pub fn set_b(&mut self, b: u32) {
        debug_assert!(b <= MAX_B);
        self.0 = (self.0 & !(mask(SIZE_B) << POS_B)) | (b << POS_B);
    }

    pub fn set_c(&mut self, c: u32) {
        debug_assert!(c <= MAX_C);
        self.0 = (self.0 & !(mask(SIZE_C) << POS_C)) | (c << POS_C);
    }

    /// Set field sBx.
    pub fn set_sbx(&mut self, sbx: i32) {
        debug_assert!((-MAX_SBX..=MAX_SBX).contains(&sbx));
        let bx = (sbx + MAX_SBX) as u32;
        self.0 = (self.0 & !(mask(SIZE_BX) << POS_BX)) | (bx << POS_BX);
    }

    /// Replace the opcode, keeping every operand.
    pub fn set_opcode(&mut self, op: OpCode) {
        self.0 = (self.0 & !(mask(SIZE_OP) << POS_OP)) | ((op as u32) << POS_OP);
    }
}

/// Whether `code[pc]` is the raw batch word carried by the SETLIST before
/// it rather than an instruction.
pub fn is_batch_word(code: &[Instruction], pc: usize) -> bool {
    pc >= 1 && {
        let prev = code[pc - 1];
        prev.opcode() == OpCode::SetList && prev.c() == 0
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        write!(f, "{}", op.name())?;
        match op.format() {
            InstructionFormat::IABC => write!(f, " A={} B={} C={}", self.a(), self.b(), self.c()),
            InstructionFormat::IABx => write!(f, " A={} Bx={}", self.a(), self.bx()),
            InstructionFormat::IAsBx => write!(f, " A={} sBx={}", self.a(), self.sbx()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
