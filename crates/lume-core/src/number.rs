//! Number semantics with Lua 5.1 rules: every number is an IEEE double.
//!
//! These functions define what a constant-folding compiler is allowed to
//! precompute; a VM must use the same definitions so folded and unfolded code
//! agree bit for bit.

/// Arithmetic operators that have a compile-time meaning on numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    /// Unary minus; the second operand is ignored.
    Unm,
}

/// Apply `op` to two numbers.
pub fn arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => fmod(a, b),
        ArithOp::Pow => a.powf(b),
        ArithOp::Unm => -a,
    }
}

/// Lua 5.1 modulo: `a - floor(a / b) * b`.
///
/// The result takes the sign of the divisor. A zero or infinite divisor gives
/// NaN, which is why folding checks for NaN instead of special-casing zero.
pub fn fmod(a: f64, b: f64) -> f64 {
    a - (a / b).floor() * b
}

/// Returns the value as an `i32` when it is integral and in range.
///
/// `-0.0` maps to `0`, so both zeros share one constant slot.
pub fn as_exact_i32(n: f64) -> Option<i32> {
    let i = n as i32;
    if i as f64 == n {
        Some(i)
    } else {
        None
    }
}
