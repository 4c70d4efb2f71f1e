//! Table constructors.
//!
//! Array items are collected in consecutive registers above the table and
//! stored in batches with SETLIST; record fields are stored one by one with
//! SETTABLE.

use super::expr::{ExprDesc, ExprKind};
use super::FuncState;
use crate::error::CompileResult;
use crate::opcode::{Instruction, OpCode, MAX_C};

/// Encode `x` as a "floating point byte" (`eeeeexxx`), rounding up.
pub fn int2fb(mut x: u32) -> u32 {
    let mut e = 0;
    while x >= 16 {
        x = (x + 1) >> 1;
        e += 1;
    }
    if x < 8 {
        x
    } else {
        ((e + 1) << 3) | (x - 8)
    }
}

/// Decode a "floating point byte".
pub fn fb2int(x: u32) -> u32 {
    let e = (x >> 3) & 31;
    if e == 0 {
        x
    } else {
        ((x & 7) + 8) << (e - 1)
    }
}

/// State of a table constructor being compiled.
#[derive(Debug)]
pub struct TableConstructor {
    /// Register holding the table.
    table: u32,
    /// The NEWTABLE instruction, patched with size hints at the end.
    pc: usize,
    /// Last list item, not yet stored in a register.
    pending: ExprDesc,
    /// Register level to restore after a record field.
    field_base: u32,
    num_array: u32,
    num_hash: u32,
    to_store: u32,
}

impl FuncState {
    /// Emit NEWTABLE into the next register and start a constructor.
    pub fn open_table(&mut self) -> CompileResult<TableConstructor> {
        let pc = self.code_abc(OpCode::NewTable, 0, 0, 0)?;
        let mut t = ExprDesc::new(ExprKind::Relocatable(pc));
        self.exp_to_next_reg(&mut t)?;
        let table = self.scope.free_reg - 1;
        Ok(TableConstructor {
            table,
            pc,
            pending: ExprDesc::void(),
            field_base: self.scope.free_reg,
            num_array: 0,
            num_hash: 0,
            to_store: 0,
        })
    }

    /// Close the previous list item. Must be called before each field is
    /// parsed.
    pub fn begin_field(&mut self, cc: &mut TableConstructor) -> CompileResult<()> {
        if cc.pending.kind != ExprKind::Void {
            let mut v = std::mem::replace(&mut cc.pending, ExprDesc::void());
            self.exp_to_next_reg(&mut v)?;
            if cc.to_store == self.limits.fields_per_flush {
                self.set_list(cc.table, cc.num_array, Some(cc.to_store))?;
                cc.to_store = 0;
            }
        }
        cc.field_base = self.scope.free_reg;
        Ok(())
    }

    /// A positional item.
    pub fn list_field(&mut self, cc: &mut TableConstructor, value: ExprDesc) {
        cc.pending = value;
        cc.num_array += 1;
        cc.to_store += 1;
    }

    /// The key of a `[k] = v` or `name = v` item. Returns the RK operand
    /// to pass to [`Self::rec_field_value`].
    pub fn rec_field_key(&mut self, cc: &mut TableConstructor, mut key: ExprDesc) -> CompileResult<u32> {
        cc.num_hash += 1;
        self.exp_to_rk(&mut key)
    }

    /// Store the value of a record item under `key`.
    pub fn rec_field_value(
        &mut self,
        cc: &mut TableConstructor,
        key: u32,
        mut value: ExprDesc,
    ) -> CompileResult<()> {
        let v = self.exp_to_rk(&mut value)?;
        self.code_abc(OpCode::SetTable, cc.table, key, v)?;
        self.scope.free_reg = cc.field_base;
        Ok(())
    }

    /// Flush the remaining items, fill in the size hints and return the
    /// table as an expression.
    pub fn close_table(&mut self, mut cc: TableConstructor) -> CompileResult<ExprDesc> {
        if cc.to_store > 0 {
            if cc.pending.has_multret() {
                let mut v = std::mem::replace(&mut cc.pending, ExprDesc::void());
                self.set_mult_ret(&mut v)?;
                self.set_list(cc.table, cc.num_array, None)?;
                // the open item's count is unknown
                cc.num_array -= 1;
            } else {
                if cc.pending.kind != ExprKind::Void {
                    let mut v = std::mem::replace(&mut cc.pending, ExprDesc::void());
                    self.exp_to_next_reg(&mut v)?;
                }
                self.set_list(cc.table, cc.num_array, Some(cc.to_store))?;
            }
        }
        let inst = &mut self.proto.code[cc.pc];
        inst.set_b(int2fb(cc.num_array));
        inst.set_c(int2fb(cc.num_hash));
        Ok(ExprDesc::new(ExprKind::NonReloc(cc.table)))
    }

    /// Store `to_store` registers above `base` into the table at `base`;
    /// `None` stores up to the stack top. `nelems` counts every item so far
    /// and selects the batch.
    fn set_list(&mut self, base: u32, nelems: u32, to_store: Option<u32>) -> CompileResult<()> {
        let batch = (nelems - 1) / self.limits.fields_per_flush + 1;
        let b = to_store.unwrap_or(0);
        if batch <= MAX_C {
            self.code_abc(OpCode::SetList, base, b, batch)?;
        } else {
            // batch index travels in the next word
            self.code_abc(OpCode::SetList, base, b, 0)?;
            self.code(Instruction(batch))?;
        }
        self.scope.free_reg = base + 1;
        Ok(())
    }
}
