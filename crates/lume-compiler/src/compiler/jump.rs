//! Pending jump lists and backpatching.
//!
//! A jump list is kept out-of-band as the set of pcs of unresolved JMP
//! instructions. An unresolved JMP carries the placeholder offset
//! [`NO_JUMP`] until it is patched; that value is never read back as a
//! link, so a jump's offset field is only ever a real offset or the
//! placeholder.

use crate::error::CompileErrorKind;
use crate::opcode::{is_batch_word, Instruction, OpCode, MAX_SBX, NO_REG};

/// Offset stored in a JMP that has not been patched yet.
pub const NO_JUMP: i32 = -1;

/// Unresolved jumps that will all receive the same target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JumpList(Vec<usize>);

impl JumpList {
    pub fn new() -> Self {
        JumpList(Vec::new())
    }

    /// A list holding one pending jump.
    pub fn single(pc: usize) -> Self {
        JumpList(vec![pc])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Concatenate `other` onto this list.
    pub fn append(&mut self, mut other: JumpList) {
        self.0.append(&mut other.0);
    }

    /// Move the contents out, leaving this list empty.
    pub fn take(&mut self) -> JumpList {
        std::mem::take(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<usize>> for JumpList {
    fn from(pcs: Vec<usize>) -> Self {
        JumpList(pcs)
    }
}

impl IntoIterator for JumpList {
    type Item = usize;
    type IntoIter = std::vec::IntoIter<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The instruction that decides whether the jump at `pc` is taken: the
/// preceding test instruction if there is one, else the jump itself. A
/// SETLIST batch word is data, never a test.
pub fn jump_control(code: &[Instruction], pc: usize) -> usize {
    if pc >= 1 && !is_batch_word(code, pc - 1) && code[pc - 1].opcode().is_test() {
        pc - 1
    } else {
        pc
    }
}

/// Point the jump at `pc` to `dest`.
pub fn fix_jump(code: &mut [Instruction], pc: usize, dest: usize) -> Result<(), CompileErrorKind> {
    debug_assert_eq!(code[pc].opcode(), OpCode::Jmp);
    let offset = dest as i64 - (pc as i64 + 1);
    if offset.abs() > MAX_SBX as i64 {
        return Err(CompileErrorKind::ControlStructureTooLong);
    }
    code[pc].set_sbx(offset as i32);
    Ok(())
}

/// Whether any jump in the list is controlled by something other than a
/// TESTSET, i.e. produces no value of its own.
pub fn need_value(code: &[Instruction], list: &JumpList) -> bool {
    list.iter()
        .any(|pc| code[jump_control(code, pc)].opcode() != OpCode::TestSet)
}

/// Retarget the TESTSET controlling `node` to store into `reg`, or turn it
/// into a plain TEST when no value is wanted. Returns false if the jump is
/// not controlled by a TESTSET.
pub fn patch_test_reg(code: &mut [Instruction], node: usize, reg: Option<u32>) -> bool {
    let ctl = jump_control(code, node);
    let inst = code[ctl];
    if inst.opcode() != OpCode::TestSet {
        return false;
    }
    match reg {
        Some(reg) if reg != NO_REG && reg != inst.b() => code[ctl].set_a(reg),
        _ => code[ctl] = Instruction::abc(OpCode::Test, inst.b(), 0, inst.c()),
    }
    true
}

/// Drop the value-producing side of every TESTSET in the list.
pub fn remove_values(code: &mut [Instruction], list: &JumpList) {
    for pc in list.iter() {
        patch_test_reg(code, pc, None);
    }
}

/// Resolve every jump in `list`: value-producing tests go to `vtarget`
/// storing into `reg`, everything else goes to `dtarget`.
pub fn patch_list_aux(
    code: &mut [Instruction],
    list: JumpList,
    vtarget: usize,
    reg: Option<u32>,
    dtarget: usize,
) -> Result<(), CompileErrorKind> {
    for pc in list {
        if patch_test_reg(code, pc, reg) {
            fix_jump(code, pc, vtarget)?;
        } else {
            fix_jump(code, pc, dtarget)?;
        }
    }
    Ok(())
}
