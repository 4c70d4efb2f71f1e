//! Instruction emission and expression code generation.
//!
//! Every operation here works on the innermost [`FuncState`] and is called by
//! the parser in source order. Expressions are described by [`ExprDesc`]
//! values that are only materialised into registers when a consumer needs
//! them.

use super::expr::{BinOp, ExprDesc, ExprKind, UnOp};
use super::jump::{self, JumpList, NO_JUMP};
use super::FuncState;
use crate::error::{CompileErrorKind, CompileResult};
use crate::opcode::{is_batch_word, rk_as_k, Instruction, OpCode, MAX_INDEX_RK, NO_REG};
use crate::proto::Constant;
use lume_core::number::{arith, ArithOp};
use tracing::trace;

impl FuncState {
    // ---- Emission ----

    /// Append an instruction at the current line. Jumps pending to this pc
    /// are resolved first.
    pub fn code(&mut self, inst: Instruction) -> CompileResult<usize> {
        self.discharge_jpc()?;
        if self.proto.code_len() as u64 >= self.limits.max_instructions as u64 {
            return Err(self.error(CompileErrorKind::TooManyInstructions {
                function: self.function_name(),
                limit: self.limits.max_instructions,
            }));
        }
        let pc = self.proto.emit(inst, self.line);
        trace!(pc, ?inst, line = self.line, "emit");
        Ok(pc)
    }

    pub fn code_abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> CompileResult<usize> {
        self.code(Instruction::abc(op, a, b, c))
    }

    pub fn code_abx(&mut self, op: OpCode, a: u32, bx: u32) -> CompileResult<usize> {
        self.code(Instruction::abx(op, a, bx))
    }

    pub fn code_asbx(&mut self, op: OpCode, a: u32, sbx: i32) -> CompileResult<usize> {
        self.code(Instruction::asbx(op, a, sbx))
    }

    /// Rewrite the line of the last emitted instruction.
    pub fn fix_line(&mut self, line: u32) {
        if let Some(last) = self.proto.line_info.last_mut() {
            *last = line;
        }
    }

    /// Set registers `from..from + n` to nil, extending the previous LOADNIL
    /// when it covers an adjacent range and nothing jumps here.
    pub fn nil(&mut self, from: u32, n: u32) -> CompileResult<()> {
        if n == 0 {
            return Ok(());
        }
        let pc = self.pc();
        if self.last_target.map_or(true, |target| pc > target) {
            if pc == 0 {
                // a fresh frame is already nil above the locals
                if from >= self.scope.num_active() {
                    return Ok(());
                }
            } else if !is_batch_word(&self.proto.code, pc - 1) {
                let prev = self.proto.code[pc - 1];
                if prev.opcode() == OpCode::LoadNil {
                    let (pfrom, pto) = (prev.a(), prev.b());
                    if pfrom <= from && from <= pto + 1 {
                        if from + n - 1 > pto {
                            self.proto.code[pc - 1].set_b(from + n - 1);
                        }
                        return Ok(());
                    }
                }
            }
        }
        self.code_abc(OpCode::LoadNil, from, from + n - 1, 0)?;
        Ok(())
    }

    /// `RETURN first nret`; `None` returns everything up to the stack top.
    pub fn ret(&mut self, first: u32, nret: Option<u32>) -> CompileResult<()> {
        self.code_abc(OpCode::Return, first, nret.map_or(0, |n| n + 1), 0)?;
        Ok(())
    }

    // ---- Jumps ----

    /// Index of the next instruction.
    pub fn pc(&self) -> usize {
        self.proto.code_len()
    }

    /// Mark the current pc as a jump target and return it.
    pub fn get_label(&mut self) -> usize {
        let pc = self.pc();
        self.last_target = Some(pc);
        pc
    }

    /// Emit an unconditional jump. Jumps pending to this pc ride along on
    /// the returned list instead of being resolved to the jump itself.
    pub fn jump(&mut self) -> CompileResult<JumpList> {
        let pending = self.jpc.take();
        let pc = self.code_asbx(OpCode::Jmp, 0, NO_JUMP)?;
        let mut list = JumpList::single(pc);
        list.append(pending);
        Ok(list)
    }

    /// Emit a test followed by its jump, returning the jump's pc.
    fn cond_jump(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> CompileResult<usize> {
        self.code_abc(op, a, b, c)?;
        self.code_asbx(OpCode::Jmp, 0, NO_JUMP)
    }

    /// Resolve `list` to `target`, which must not be in the future.
    pub fn patch_list(&mut self, list: JumpList, target: usize) -> CompileResult<()> {
        if target == self.pc() {
            self.patch_to_here(list);
            Ok(())
        } else {
            debug_assert!(target < self.pc());
            let result = jump::patch_list_aux(&mut self.proto.code, list, target, None, target);
            self.attach(result)
        }
    }

    /// Resolve `list` to whatever instruction is emitted next.
    pub fn patch_to_here(&mut self, list: JumpList) {
        self.get_label();
        self.jpc.append(list);
    }

    fn discharge_jpc(&mut self) -> CompileResult<()> {
        if self.jpc.is_empty() {
            return Ok(());
        }
        let pc = self.pc();
        let list = self.jpc.take();
        let result = jump::patch_list_aux(&mut self.proto.code, list, pc, None, pc);
        self.attach(result)
    }

    fn patch_list_aux(
        &mut self,
        list: JumpList,
        vtarget: usize,
        reg: u32,
        dtarget: usize,
    ) -> CompileResult<()> {
        let result = jump::patch_list_aux(&mut self.proto.code, list, vtarget, Some(reg), dtarget);
        self.attach(result)
    }

    // ---- Registers ----

    pub fn reserve_regs(&mut self, n: u32) -> CompileResult<()> {
        let result = self.scope.reserve(n, self.limits.max_stack);
        self.attach(result)
    }

    pub fn free_reg(&mut self, reg: u32) {
        self.scope.free(reg);
    }

    fn free_exp(&mut self, e: &ExprDesc) {
        if let ExprKind::NonReloc(reg) = e.kind {
            self.free_reg(reg);
        }
    }

    // ---- Constants ----

    pub fn add_constant(&mut self, k: Constant) -> CompileResult<u32> {
        let max = self.limits.max_constants();
        match self.constants.add(k, max) {
            Some(idx) => Ok(idx),
            None => Err(self.error(CompileErrorKind::TooManyConstants {
                function: self.function_name(),
                limit: max,
            })),
        }
    }

    pub fn number_k(&mut self, n: f64) -> CompileResult<u32> {
        self.add_constant(Constant::Number(n))
    }

    // ---- Multiple results ----

    /// Fix the number of results of an open call or vararg; `None` keeps
    /// all of them.
    pub fn set_returns(&mut self, e: &mut ExprDesc, nresults: Option<u32>) -> CompileResult<()> {
        let field = nresults.map_or(0, |n| n + 1);
        match e.kind {
            ExprKind::Call(pc) => self.proto.code[pc].set_c(field),
            ExprKind::Vararg(pc) => {
                let free_reg = self.scope.free_reg;
                let inst = &mut self.proto.code[pc];
                inst.set_b(field);
                inst.set_a(free_reg);
                self.reserve_regs(1)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub fn set_mult_ret(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        self.set_returns(e, None)
    }

    /// Adjust an open call or vararg to a single result.
    pub fn set_one_ret(&mut self, e: &mut ExprDesc) {
        match e.kind {
            ExprKind::Call(pc) => e.kind = ExprKind::NonReloc(self.proto.code[pc].a()),
            ExprKind::Vararg(pc) => {
                self.proto.code[pc].set_b(2);
                e.kind = ExprKind::Relocatable(pc);
            }
            _ => {}
        }
    }

    // ---- Materialisation ----

    /// Emit the read of a variable, leaving the value relocatable or fixed.
    pub fn discharge_vars(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        match e.kind {
            ExprKind::Local(reg) => e.kind = ExprKind::NonReloc(reg),
            ExprKind::Upvalue(idx) => {
                let pc = self.code_abc(OpCode::GetUpval, 0, idx, 0)?;
                e.kind = ExprKind::Relocatable(pc);
            }
            ExprKind::Global(k) => {
                let pc = self.code_abx(OpCode::GetGlobal, 0, k)?;
                e.kind = ExprKind::Relocatable(pc);
            }
            ExprKind::Indexed { table, key } => {
                self.free_reg(key);
                self.free_reg(table);
                let pc = self.code_abc(OpCode::GetTable, 0, table, key)?;
                e.kind = ExprKind::Relocatable(pc);
            }
            ExprKind::Call(_) | ExprKind::Vararg(_) => self.set_one_ret(e),
            _ => {}
        }
        Ok(())
    }

    fn code_label(&mut self, a: u32, b: u32, jump: u32) -> CompileResult<usize> {
        self.get_label();
        self.code_abc(OpCode::LoadBool, a, b, jump)
    }

    fn discharge_to_reg(&mut self, e: &mut ExprDesc, reg: u32) -> CompileResult<()> {
        self.discharge_vars(e)?;
        match e.kind {
            ExprKind::Nil => self.nil(reg, 1)?,
            ExprKind::True | ExprKind::False => {
                let b = u32::from(e.kind == ExprKind::True);
                self.code_abc(OpCode::LoadBool, reg, b, 0)?;
            }
            ExprKind::Constant(k) => {
                self.code_abx(OpCode::LoadK, reg, k)?;
            }
            ExprKind::Number(n) => {
                let k = self.number_k(n)?;
                self.code_abx(OpCode::LoadK, reg, k)?;
            }
            ExprKind::Relocatable(pc) => self.proto.code[pc].set_a(reg),
            ExprKind::NonReloc(src) => {
                if src != reg {
                    self.code_abc(OpCode::Move, reg, src, 0)?;
                }
            }
            // void or a pending comparison: nothing to load yet
            _ => return Ok(()),
        }
        e.kind = ExprKind::NonReloc(reg);
        Ok(())
    }

    fn discharge_to_any_reg(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        if !matches!(e.kind, ExprKind::NonReloc(_)) {
            self.reserve_regs(1)?;
            let reg = self.scope.free_reg - 1;
            self.discharge_to_reg(e, reg)?;
        }
        Ok(())
    }

    /// Materialise `e` into `reg`, resolving its pending exits. Exits that
    /// need a boolean get a LOADBOOL pair.
    fn exp_to_reg(&mut self, e: &mut ExprDesc, reg: u32) -> CompileResult<()> {
        self.discharge_to_reg(e, reg)?;
        if let ExprKind::Jump(pc) = e.kind {
            e.t.append(JumpList::single(pc));
        }
        if e.has_jumps() {
            let mut p_f = None;
            let mut p_t = None;
            if jump::need_value(&self.proto.code, &e.t) || jump::need_value(&self.proto.code, &e.f)
            {
                let fj = if matches!(e.kind, ExprKind::Jump(_)) {
                    JumpList::new()
                } else {
                    self.jump()?
                };
                p_f = Some(self.code_label(reg, 0, 1)?);
                p_t = Some(self.code_label(reg, 1, 0)?);
                self.patch_to_here(fj);
            }
            let end = self.get_label();
            let f = e.f.take();
            let t = e.t.take();
            self.patch_list_aux(f, end, reg, p_f.unwrap_or(end))?;
            self.patch_list_aux(t, end, reg, p_t.unwrap_or(end))?;
        }
        e.t = JumpList::new();
        e.f = JumpList::new();
        e.kind = ExprKind::NonReloc(reg);
        Ok(())
    }

    /// Materialise `e` into a fresh register on top of the stack.
    pub fn exp_to_next_reg(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        self.discharge_vars(e)?;
        self.free_exp(e);
        self.reserve_regs(1)?;
        let reg = self.scope.free_reg - 1;
        self.exp_to_reg(e, reg)
    }

    /// Materialise `e` into some register, reusing the one it already
    /// occupies when possible.
    pub fn exp_to_any_reg(&mut self, e: &mut ExprDesc) -> CompileResult<u32> {
        self.discharge_vars(e)?;
        if let ExprKind::NonReloc(reg) = e.kind {
            if !e.has_jumps() {
                return Ok(reg);
            }
            if reg >= self.scope.num_active() {
                self.exp_to_reg(e, reg)?;
                return Ok(reg);
            }
        }
        self.exp_to_next_reg(e)?;
        match e.kind {
            ExprKind::NonReloc(reg) => Ok(reg),
            _ => unreachable!("exp_to_next_reg leaves a fixed register"),
        }
    }

    /// Make `e` a single value: a register when exits are pending, else
    /// just discharged.
    pub fn exp_to_val(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        if e.has_jumps() {
            self.exp_to_any_reg(e)?;
            Ok(())
        } else {
            self.discharge_vars(e)
        }
    }

    /// Encode `e` as an RK operand: a constant index when it fits, else a
    /// register.
    pub fn exp_to_rk(&mut self, e: &mut ExprDesc) -> CompileResult<u32> {
        self.exp_to_val(e)?;
        match e.kind {
            ExprKind::Number(_) | ExprKind::True | ExprKind::False | ExprKind::Nil => {
                if self.constants.len() as u32 <= MAX_INDEX_RK {
                    let k = match e.kind {
                        ExprKind::Nil => self.add_constant(Constant::Nil)?,
                        ExprKind::Number(n) => self.number_k(n)?,
                        kind => self.add_constant(Constant::Boolean(kind == ExprKind::True))?,
                    };
                    e.kind = ExprKind::Constant(k);
                    return Ok(rk_as_k(k));
                }
            }
            ExprKind::Constant(k) if k <= MAX_INDEX_RK => return Ok(rk_as_k(k)),
            _ => {}
        }
        self.exp_to_any_reg(e)
    }

    // ---- Stores and indexing ----

    /// Assign `ex` to the variable described by `var`.
    pub fn store_var(&mut self, var: &ExprDesc, mut ex: ExprDesc) -> CompileResult<()> {
        match var.kind {
            ExprKind::Local(reg) => {
                self.free_exp(&ex);
                return self.exp_to_reg(&mut ex, reg);
            }
            ExprKind::Upvalue(idx) => {
                let e = self.exp_to_any_reg(&mut ex)?;
                self.code_abc(OpCode::SetUpval, e, idx, 0)?;
            }
            ExprKind::Global(k) => {
                let e = self.exp_to_any_reg(&mut ex)?;
                self.code_abx(OpCode::SetGlobal, e, k)?;
            }
            ExprKind::Indexed { table, key } => {
                let e = self.exp_to_rk(&mut ex)?;
                self.code_abc(OpCode::SetTable, table, key, e)?;
            }
            _ => return Err(self.error(CompileErrorKind::InvalidAssignTarget)),
        }
        self.free_exp(&ex);
        Ok(())
    }

    /// Turn `t` into `t[k]`. The table is moved to a register first if the
    /// parser has not done so.
    pub fn indexed(&mut self, t: &mut ExprDesc, mut k: ExprDesc) -> CompileResult<()> {
        let table = match t.kind {
            ExprKind::NonReloc(reg) | ExprKind::Local(reg) if !t.has_jumps() => reg,
            _ => self.exp_to_any_reg(t)?,
        };
        let key = self.exp_to_rk(&mut k)?;
        t.kind = ExprKind::Indexed { table, key };
        Ok(())
    }

    /// `obj:key` as a call prefix: SELF leaves the method and the object in
    /// two consecutive registers.
    pub fn self_(&mut self, e: &mut ExprDesc, mut key: ExprDesc) -> CompileResult<()> {
        let obj = self.exp_to_any_reg(e)?;
        self.free_exp(e);
        let func = self.scope.free_reg;
        self.reserve_regs(2)?;
        let rk = self.exp_to_rk(&mut key)?;
        self.code_abc(OpCode::Self_, func, obj, rk)?;
        self.free_exp(&key);
        e.kind = ExprKind::NonReloc(func);
        Ok(())
    }

    // ---- Conditionals ----

    fn invert_jump(&mut self, pc: usize) {
        let ctl = jump::jump_control(&self.proto.code, pc);
        let inst = &mut self.proto.code[ctl];
        debug_assert!(
            inst.opcode().is_test() && !matches!(inst.opcode(), OpCode::Test | OpCode::TestSet)
        );
        let a = inst.a();
        inst.set_a(u32::from(a == 0));
    }

    fn jump_on_cond(&mut self, e: &mut ExprDesc, cond: bool) -> CompileResult<usize> {
        if let ExprKind::Relocatable(pc) = e.kind {
            let inst = self.proto.code[pc];
            if inst.opcode() == OpCode::Not && pc + 1 == self.pc() {
                // test the operand of the NOT with the opposite polarity
                self.proto.pop();
                return self.cond_jump(OpCode::Test, inst.b(), 0, u32::from(!cond));
            }
        }
        self.discharge_to_any_reg(e)?;
        self.free_exp(e);
        let reg = match e.kind {
            ExprKind::NonReloc(reg) => reg,
            _ => unreachable!("discharged to a register"),
        };
        self.cond_jump(OpCode::TestSet, NO_REG, reg, u32::from(cond))
    }

    /// Fall through when `e` is true; its false exits stay pending.
    pub fn go_if_true(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        self.discharge_vars(e)?;
        let list = match e.kind {
            ExprKind::Constant(_) | ExprKind::Number(_) | ExprKind::True => JumpList::new(),
            ExprKind::False => self.jump()?,
            ExprKind::Jump(pc) => {
                self.invert_jump(pc);
                JumpList::single(pc)
            }
            _ => JumpList::single(self.jump_on_cond(e, false)?),
        };
        e.f.append(list);
        let t = e.t.take();
        self.patch_to_here(t);
        Ok(())
    }

    /// Fall through when `e` is false; its true exits stay pending.
    pub fn go_if_false(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        self.discharge_vars(e)?;
        let list = match e.kind {
            ExprKind::Nil | ExprKind::False => JumpList::new(),
            ExprKind::True => self.jump()?,
            ExprKind::Jump(pc) => JumpList::single(pc),
            _ => JumpList::single(self.jump_on_cond(e, true)?),
        };
        e.t.append(list);
        let f = e.f.take();
        self.patch_to_here(f);
        Ok(())
    }

    fn code_not(&mut self, e: &mut ExprDesc) -> CompileResult<()> {
        self.discharge_vars(e)?;
        match e.kind {
            ExprKind::Nil | ExprKind::False => e.kind = ExprKind::True,
            ExprKind::Constant(_) | ExprKind::Number(_) | ExprKind::True => {
                e.kind = ExprKind::False
            }
            ExprKind::Jump(pc) => self.invert_jump(pc),
            ExprKind::Relocatable(_) | ExprKind::NonReloc(_) => {
                self.discharge_to_any_reg(e)?;
                self.free_exp(e);
                let src = match e.kind {
                    ExprKind::NonReloc(reg) => reg,
                    _ => unreachable!("discharged to a register"),
                };
                let pc = self.code_abc(OpCode::Not, 0, src, 0)?;
                e.kind = ExprKind::Relocatable(pc);
            }
            _ => unreachable!("cannot negate {:?}", e.kind),
        }
        std::mem::swap(&mut e.t, &mut e.f);
        jump::remove_values(&mut self.proto.code, &e.f);
        jump::remove_values(&mut self.proto.code, &e.t);
        Ok(())
    }

    // ---- Operators ----

    fn const_folding(op: OpCode, e1: &mut ExprDesc, e2: &ExprDesc) -> bool {
        let (Some(v1), Some(v2)) = (e1.as_number(), e2.as_number()) else {
            return false;
        };
        let aop = match op {
            OpCode::Add => ArithOp::Add,
            OpCode::Sub => ArithOp::Sub,
            OpCode::Mul => ArithOp::Mul,
            OpCode::Div => ArithOp::Div,
            OpCode::Mod => ArithOp::Mod,
            OpCode::Pow => ArithOp::Pow,
            OpCode::Unm => ArithOp::Unm,
            // length is never folded
            _ => return false,
        };
        let r = arith(aop, v1, v2);
        if r.is_nan() {
            return false;
        }
        e1.kind = ExprKind::Number(r);
        true
    }

    fn code_arith(&mut self, op: OpCode, e1: &mut ExprDesc, e2: &mut ExprDesc) -> CompileResult<()> {
        if Self::const_folding(op, e1, e2) {
            return Ok(());
        }
        let o2 = if matches!(op, OpCode::Unm | OpCode::Len) {
            0
        } else {
            self.exp_to_rk(e2)?
        };
        let o1 = self.exp_to_rk(e1)?;
        // release the higher register first
        if o1 > o2 {
            self.free_exp(e1);
            self.free_exp(e2);
        } else {
            self.free_exp(e2);
            self.free_exp(e1);
        }
        let pc = self.code_abc(op, 0, o1, o2)?;
        e1.kind = ExprKind::Relocatable(pc);
        Ok(())
    }

    fn code_comp(
        &mut self,
        op: OpCode,
        mut cond: bool,
        e1: &mut ExprDesc,
        e2: &mut ExprDesc,
    ) -> CompileResult<()> {
        let mut o1 = self.exp_to_rk(e1)?;
        let mut o2 = self.exp_to_rk(e2)?;
        self.free_exp(e2);
        self.free_exp(e1);
        if !cond && op != OpCode::Eq {
            // a > b is b < a
            std::mem::swap(&mut o1, &mut o2);
            cond = true;
        }
        let pc = self.cond_jump(op, u32::from(cond), o1, o2)?;
        e1.kind = ExprKind::Jump(pc);
        Ok(())
    }

    /// Apply a unary operator to `e`.
    pub fn prefix(&mut self, op: UnOp, e: &mut ExprDesc) -> CompileResult<()> {
        let mut dummy = ExprDesc::number(0.0);
        match op {
            UnOp::Neg => {
                // UNM takes a register, only numerals are folded
                if e.as_number().is_none() {
                    self.exp_to_any_reg(e)?;
                }
                self.code_arith(OpCode::Unm, e, &mut dummy)
            }
            UnOp::Not => self.code_not(e),
            UnOp::Len => {
                self.exp_to_any_reg(e)?;
                self.code_arith(OpCode::Len, e, &mut dummy)
            }
        }
    }

    /// Prepare the left operand of `op` before the right one is parsed.
    pub fn infix(&mut self, op: BinOp, v: &mut ExprDesc) -> CompileResult<()> {
        match op {
            BinOp::And => self.go_if_true(v),
            BinOp::Or => self.go_if_false(v),
            // concat operands must be consecutive on the stack
            BinOp::Concat => self.exp_to_next_reg(v),
            _ if op.is_arith() => {
                // keep numerals as they are for folding
                if v.as_number().is_none() {
                    self.exp_to_rk(v)?;
                }
                Ok(())
            }
            _ => {
                self.exp_to_rk(v)?;
                Ok(())
            }
        }
    }

    /// Combine `e1 op e2` into `e1`.
    pub fn posfix(&mut self, op: BinOp, e1: &mut ExprDesc, mut e2: ExprDesc) -> CompileResult<()> {
        match op {
            BinOp::And => {
                debug_assert!(e1.t.is_empty(), "true list must be closed");
                self.discharge_vars(&mut e2)?;
                e2.f.append(e1.f.take());
                *e1 = e2;
            }
            BinOp::Or => {
                debug_assert!(e1.f.is_empty(), "false list must be closed");
                self.discharge_vars(&mut e2)?;
                e2.t.append(e1.t.take());
                *e1 = e2;
            }
            BinOp::Concat => {
                self.exp_to_val(&mut e2)?;
                match e2.kind {
                    ExprKind::Relocatable(pc) if self.proto.code[pc].opcode() == OpCode::Concat => {
                        // extend the right operand's CONCAT down to e1
                        let reg = match e1.kind {
                            ExprKind::NonReloc(reg) => reg,
                            _ => unreachable!("concat operand must be on the stack"),
                        };
                        debug_assert_eq!(reg + 1, self.proto.code[pc].b());
                        self.free_exp(e1);
                        self.proto.code[pc].set_b(reg);
                        e1.kind = ExprKind::Relocatable(pc);
                    }
                    _ => {
                        self.exp_to_next_reg(&mut e2)?;
                        self.code_arith(OpCode::Concat, e1, &mut e2)?;
                    }
                }
            }
            BinOp::Add => self.code_arith(OpCode::Add, e1, &mut e2)?,
            BinOp::Sub => self.code_arith(OpCode::Sub, e1, &mut e2)?,
            BinOp::Mul => self.code_arith(OpCode::Mul, e1, &mut e2)?,
            BinOp::Div => self.code_arith(OpCode::Div, e1, &mut e2)?,
            BinOp::Mod => self.code_arith(OpCode::Mod, e1, &mut e2)?,
            BinOp::Pow => self.code_arith(OpCode::Pow, e1, &mut e2)?,
            BinOp::Eq => self.code_comp(OpCode::Eq, true, e1, &mut e2)?,
            BinOp::NotEq => self.code_comp(OpCode::Eq, false, e1, &mut e2)?,
            BinOp::Lt => self.code_comp(OpCode::Lt, true, e1, &mut e2)?,
            BinOp::LtEq => self.code_comp(OpCode::Le, true, e1, &mut e2)?,
            BinOp::Gt => self.code_comp(OpCode::Lt, false, e1, &mut e2)?,
            BinOp::GtEq => self.code_comp(OpCode::Le, false, e1, &mut e2)?,
        }
        Ok(())
    }

    // ---- Calls, varargs and returns ----

    /// Emit a call of `func` (already on the stack) with `args` as the last
    /// argument; earlier arguments must already sit in the registers after
    /// `func`. Leaves `func` as an open call.
    pub fn call(&mut self, func: &mut ExprDesc, mut args: ExprDesc, line: u32) -> CompileResult<()> {
        let base = match func.kind {
            ExprKind::NonReloc(reg) => reg,
            _ => {
                return Err(self.error(CompileErrorKind::Syntax(
                    "call target must be on the stack".into(),
                )))
            }
        };
        let nparams = if args.has_multret() {
            self.set_mult_ret(&mut args)?;
            None
        } else {
            if args.kind != ExprKind::Void {
                self.exp_to_next_reg(&mut args)?;
            }
            Some(self.scope.free_reg - (base + 1))
        };
        let pc = self.code_abc(OpCode::Call, base, nparams.map_or(0, |n| n + 1), 2)?;
        self.fix_line(line);
        // the call consumes its arguments and leaves one result by default
        self.scope.free_reg = base + 1;
        func.kind = ExprKind::Call(pc);
        Ok(())
    }

    /// `...` as an expression.
    pub fn vararg(&mut self) -> CompileResult<ExprDesc> {
        if !self.proto.is_vararg {
            return Err(self.error(CompileErrorKind::VarargOutsideVarargFunction));
        }
        let pc = self.code_abc(OpCode::VarArg, 0, 1, 0)?;
        Ok(ExprDesc::new(ExprKind::Vararg(pc)))
    }

    /// Make `nvars` targets receive values from `nexps` expressions, where
    /// `last` is the final expression still to be closed.
    pub fn adjust_assign(&mut self, nvars: u32, nexps: u32, last: &mut ExprDesc) -> CompileResult<()> {
        let mut extra = nvars as i64 - nexps as i64;
        if last.has_multret() {
            // the call itself supplies one of the values
            extra = (extra + 1).max(0);
            self.set_returns(last, Some(extra as u32))?;
            if extra > 1 {
                self.reserve_regs(extra as u32 - 1)?;
            }
        } else {
            if last.kind != ExprKind::Void {
                self.exp_to_next_reg(last)?;
            }
            if extra > 0 {
                let reg = self.scope.free_reg;
                self.reserve_regs(extra as u32)?;
                self.nil(reg, extra as u32)?;
            }
        }
        Ok(())
    }

    /// `return e1, ..., en` where `last` is the final expression and the
    /// earlier ones are already on the stack. A sole open call becomes a
    /// tail call.
    pub fn return_stat(&mut self, last: Option<ExprDesc>, nret: u32) -> CompileResult<()> {
        let Some(mut e) = last else {
            return self.ret(0, Some(0));
        };
        let (first, count) = if e.has_multret() {
            self.set_mult_ret(&mut e)?;
            if let ExprKind::Call(pc) = e.kind {
                if nret == 1 {
                    self.proto.code[pc].set_opcode(OpCode::TailCall);
                    debug_assert_eq!(self.proto.code[pc].a(), self.scope.num_active());
                }
            }
            (self.scope.num_active(), None)
        } else if nret == 1 {
            (self.exp_to_any_reg(&mut e)?, Some(1))
        } else {
            self.exp_to_next_reg(&mut e)?;
            let first = self.scope.num_active();
            debug_assert_eq!(nret, self.scope.free_reg - first);
            (first, Some(nret))
        };
        self.ret(first, count)
    }
}
