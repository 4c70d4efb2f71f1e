/// Expression descriptors and operators.
use super::jump::JumpList;

/// Describes where an expression's value currently lives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExprKind {
    /// No value (empty expression list).
    Void,
    /// Nil literal.
    Nil,
    /// True literal.
    True,
    /// False literal.
    False,
    /// Numeric literal, not yet in the constant pool.
    Number(f64),
    /// Constant at the given pool index.
    Constant(u32),
    /// Local variable in a register.
    Local(u32),
    /// Upvalue at the given index.
    Upvalue(u32),
    /// Global variable; the payload is the constant index of its name.
    Global(u32),
    /// Table in a register indexed by an RK key.
    Indexed { table: u32, key: u32 },
    /// Instruction at pc whose destination register is not yet set.
    Relocatable(usize),
    /// Value in a fixed register.
    NonReloc(u32),
    /// Open function call: CALL instruction at pc.
    Call(usize),
    /// Vararg expression: VARARG instruction at pc.
    Vararg(usize),
    /// Comparison result: the JMP following the test at pc.
    Jump(usize),
}

/// An expression plus its pending short-circuit exits.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprDesc {
    pub kind: ExprKind,
    /// Jumps taken when the expression is true.
    pub t: JumpList,
    /// Jumps taken when the expression is false.
    pub f: JumpList,
}

impl ExprDesc {
    pub fn new(kind: ExprKind) -> Self {
        ExprDesc {
            kind,
            t: JumpList::new(),
            f: JumpList::new(),
        }
    }

    pub fn void() -> Self {
        Self::new(ExprKind::Void)
    }

    pub fn nil() -> Self {
        Self::new(ExprKind::Nil)
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(if b { ExprKind::True } else { ExprKind::False })
    }

    pub fn number(n: f64) -> Self {
        Self::new(ExprKind::Number(n))
    }

    pub fn constant(idx: u32) -> Self {
        Self::new(ExprKind::Constant(idx))
    }

    pub fn local(reg: u32) -> Self {
        Self::new(ExprKind::Local(reg))
    }

    /// Returns true if either exit list is pending.
    pub fn has_jumps(&self) -> bool {
        !self.t.is_empty() || !self.f.is_empty()
    }

    /// Returns true for open calls and varargs, which can yield any number
    /// of values.
    pub fn has_multret(&self) -> bool {
        matches!(self.kind, ExprKind::Call(_) | ExprKind::Vararg(_))
    }

    /// The numeric value, if this is a plain numeric literal with no jumps.
    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            ExprKind::Number(n) if !self.has_jumps() => Some(n),
            _ => None,
        }
    }
}

/// Binary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Unary operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}

impl BinOp {
    /// Operators that fold and compile to an arithmetic instruction.
    pub fn is_arith(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow
        )
    }
}
