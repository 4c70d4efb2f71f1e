/// Scope, local variable and register management for the compiler.
use super::jump::JumpList;
use crate::error::CompileErrorKind;
use crate::opcode::is_k;
use crate::proto::LocalVar;
use lume_core::string::StringId;

/// Block scope tracking.
#[derive(Clone, Debug)]
pub struct BlockScope {
    /// Number of active locals when this block started.
    pub num_active_on_entry: u32,
    /// Whether `break` may target this block.
    pub is_breakable: bool,
    /// Whether some local of this block is captured by a closure.
    pub has_upval: bool,
    /// Pending jumps out of this block.
    pub break_list: JumpList,
}

/// The innermost breakable block as seen from a `break`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakTarget {
    /// Index of the breakable block.
    pub block: usize,
    /// Its active-local watermark.
    pub num_active_on_entry: u32,
    /// Whether a block between the break and the target captured a local.
    pub needs_close: bool,
}

/// Manages locals, registers and blocks for a single function.
///
/// Locals occupy the low registers in declaration order; temporaries are
/// allocated above them. `free_reg` never drops below the number of active
/// locals.
pub struct ScopeManager {
    /// Debug records of every local declared in the function.
    pub local_vars: Vec<LocalVar>,
    /// Index into `local_vars` for each declared local, by register.
    /// Entries past `num_active` are declared but not yet active.
    actvar: Vec<usize>,
    num_active: u32,
    /// Block scope stack.
    pub blocks: Vec<BlockScope>,
    /// Next available register.
    pub free_reg: u32,
    /// High-water mark for register usage.
    pub max_stack: u32,
}

impl ScopeManager {
    pub fn new() -> Self {
        ScopeManager {
            local_vars: Vec::new(),
            actvar: Vec::new(),
            num_active: 0,
            blocks: Vec::new(),
            free_reg: 0,
            max_stack: 2,
        }
    }

    /// Number of active local variables.
    pub fn num_active(&self) -> u32 {
        self.num_active
    }

    /// Number of locals declared but not yet activated.
    pub fn num_pending(&self) -> u32 {
        (self.actvar.len() - self.num_active as usize) as u32
    }

    // ---- Registers ----

    /// Make sure `n` more registers fit, growing the high-water mark.
    pub fn check_stack(&mut self, n: u32, max_stack: u32) -> Result<(), CompileErrorKind> {
        let new_stack = self.free_reg + n;
        if new_stack > self.max_stack {
            if new_stack >= max_stack {
                return Err(CompileErrorKind::TooComplex);
            }
            self.max_stack = new_stack;
        }
        Ok(())
    }

    /// Allocate `n` consecutive registers.
    pub fn reserve(&mut self, n: u32, max_stack: u32) -> Result<(), CompileErrorKind> {
        self.check_stack(n, max_stack)?;
        self.free_reg += n;
        Ok(())
    }

    /// Release `reg` if it is the topmost temporary. Locals and RK
    /// constants are ignored.
    pub fn free(&mut self, reg: u32) {
        if !is_k(reg) && reg >= self.num_active {
            self.free_reg -= 1;
            debug_assert_eq!(reg, self.free_reg, "registers must be freed in stack order");
        }
    }

    // ---- Locals ----

    /// Declare a local; it stays invisible until [`Self::activate`].
    pub fn declare(&mut self, name: StringId) {
        self.local_vars.push(LocalVar {
            name,
            start_pc: 0,
            end_pc: 0,
        });
        self.actvar.push(self.local_vars.len() - 1);
    }

    /// Activate the next `n` declared locals starting at `pc`.
    pub fn activate(&mut self, n: u32, pc: usize) {
        debug_assert!(n <= self.num_pending());
        for _ in 0..n {
            let idx = self.actvar[self.num_active as usize];
            self.local_vars[idx].start_pc = pc as u32;
            self.num_active += 1;
        }
    }

    /// Deactivate locals down to `level`, stamping their end pc.
    pub fn remove_to(&mut self, level: u32, pc: usize) {
        while self.num_active > level {
            self.num_active -= 1;
            let idx = self.actvar[self.num_active as usize];
            self.local_vars[idx].end_pc = pc as u32;
        }
        self.actvar.truncate(level as usize);
    }

    /// Register of the innermost active local called `name`.
    pub fn resolve_local(&self, name: StringId) -> Option<u32> {
        self.actvar[..self.num_active as usize]
            .iter()
            .rposition(|&idx| self.local_vars[idx].name == name)
            .map(|reg| reg as u32)
    }

    /// Mark the block owning the local in `reg` as captured.
    pub fn mark_upval(&mut self, reg: u32) {
        if let Some(block) = self
            .blocks
            .iter_mut()
            .rev()
            .find(|b| b.num_active_on_entry <= reg)
        {
            block.has_upval = true;
        }
    }

    // ---- Blocks ----

    /// Enter a new block scope.
    pub fn enter_block(&mut self, is_breakable: bool) {
        debug_assert_eq!(self.free_reg, self.num_active, "block entered with live temporaries");
        self.blocks.push(BlockScope {
            num_active_on_entry: self.num_active,
            is_breakable,
            has_upval: false,
            break_list: JumpList::new(),
        });
    }

    /// Leave the current block: deactivate its locals and free their
    /// registers. Returns the popped block so the caller can close
    /// upvalues and patch its breaks.
    pub fn leave_block(&mut self, pc: usize) -> Option<BlockScope> {
        let block = self.blocks.pop()?;
        self.remove_to(block.num_active_on_entry, pc);
        self.free_reg = self.num_active;
        Some(block)
    }

    /// Find the innermost breakable block.
    pub fn break_target(&self) -> Option<BreakTarget> {
        let mut needs_close = false;
        for (i, block) in self.blocks.iter().enumerate().rev() {
            if block.is_breakable {
                return Some(BreakTarget {
                    block: i,
                    num_active_on_entry: block.num_active_on_entry,
                    needs_close,
                });
            }
            needs_close |= block.has_upval;
        }
        None
    }
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}
