//! Single-pass code generator.
//!
//! The parser drives a [`Compiler`] through a procedural API, one call per
//! syntactic event. The compiler keeps a stack of [`FuncState`]s, one per
//! function being compiled; a nested function refers to its enclosing
//! function by stack index.

pub mod code;
pub mod constants;
pub mod expr;
pub mod jump;
pub mod scope;
pub mod table;

use crate::error::{CompileError, CompileErrorKind, CompileResult, FunctionName};
use crate::limits::Limits;
use crate::opcode::{OpCode, MAX_BX};
use crate::proto::{Constant, Proto, UpvalDesc, UpvalKind};
use constants::ConstantPool;
use expr::{ExprDesc, ExprKind};
use jump::JumpList;
use lume_core::string::{StringId, StringInterner};
use scope::ScopeManager;
use tracing::{debug, trace};

/// State for a single function being compiled.
pub struct FuncState {
    proto: Proto,
    constants: ConstantPool,
    scope: ScopeManager,
    /// Index of the enclosing function in the compiler's stack.
    parent: Option<usize>,
    /// Jumps waiting for the next emitted instruction.
    jpc: JumpList,
    /// Last pc marked as a jump target.
    last_target: Option<usize>,
    /// Source line attached to emitted instructions.
    line: u32,
    limits: Limits,
}

impl FuncState {
    fn new(parent: Option<usize>, line_defined: u32, is_vararg: bool, limits: Limits) -> Self {
        let mut proto = Proto::new();
        proto.line_defined = line_defined;
        proto.is_vararg = is_vararg;
        FuncState {
            proto,
            constants: ConstantPool::new(),
            scope: ScopeManager::new(),
            parent,
            jpc: JumpList::new(),
            last_target: None,
            line: line_defined,
            limits,
        }
    }

    /// The prototype under construction.
    pub fn proto(&self) -> &Proto {
        &self.proto
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn num_active_locals(&self) -> u32 {
        self.scope.num_active()
    }

    /// First free register.
    pub fn free_reg_level(&self) -> u32 {
        self.scope.free_reg
    }

    fn function_name(&self) -> FunctionName {
        match self.parent {
            None => FunctionName::Main,
            Some(_) => FunctionName::DefinedAt(self.proto.line_defined),
        }
    }

    fn error(&self, kind: CompileErrorKind) -> CompileError {
        CompileError::new(kind, self.line)
    }

    fn attach<T>(&self, result: Result<T, CompileErrorKind>) -> CompileResult<T> {
        result.map_err(|kind| self.error(kind))
    }

    // ---- Locals ----

    /// Declare a local; it becomes visible after [`Self::activate_locals`].
    pub fn new_local(&mut self, name: StringId) -> CompileResult<()> {
        let wanted = self.scope.num_active() + self.scope.num_pending() + 1;
        if wanted > self.limits.max_vars {
            return Err(self.error(CompileErrorKind::TooManyLocals {
                function: self.function_name(),
                limit: self.limits.max_vars,
            }));
        }
        self.scope.declare(name);
        Ok(())
    }

    /// Make the next `n` declared locals visible from the current pc.
    pub fn activate_locals(&mut self, n: u32) {
        let pc = self.pc();
        self.scope.activate(n, pc);
    }

    /// Release the temporaries of the statement just compiled.
    pub fn end_statement(&mut self) {
        debug_assert!(self.scope.max_stack >= self.scope.free_reg);
        debug_assert!(self.scope.free_reg >= self.scope.num_active());
        self.scope.free_reg = self.scope.num_active();
    }

    // ---- Blocks ----

    pub fn enter_block(&mut self, is_breakable: bool) {
        trace!(depth = self.scope.blocks.len(), is_breakable, "enter block");
        self.scope.enter_block(is_breakable);
    }

    /// Leave the innermost block, closing captured locals. Its breaks land
    /// on the CLOSE, so both exits close the same upvalues.
    pub fn leave_block(&mut self) -> CompileResult<()> {
        let pc = self.pc();
        let Some(block) = self.scope.leave_block(pc) else {
            return Err(self.error(CompileErrorKind::Syntax("no block to leave".into())));
        };
        trace!(depth = self.scope.blocks.len(), has_upval = block.has_upval, "leave block");
        self.patch_to_here(block.break_list);
        if block.has_upval {
            self.code_abc(OpCode::Close, block.num_active_on_entry, 0, 0)?;
        }
        Ok(())
    }

    /// Jump out of the innermost breakable block.
    pub fn break_stat(&mut self) -> CompileResult<()> {
        let Some(target) = self.scope.break_target() else {
            return Err(self.error(CompileErrorKind::NoLoopToBreak));
        };
        if target.needs_close {
            self.code_abc(OpCode::Close, target.num_active_on_entry, 0, 0)?;
        }
        let j = self.jump()?;
        self.scope.blocks[target.block].break_list.append(j);
        Ok(())
    }

    // ---- Upvalues ----

    /// Index of the upvalue referring to `kind`, creating it if needed.
    fn index_upvalue(&mut self, name: StringId, kind: UpvalKind) -> CompileResult<u32> {
        if let Some(idx) = self.proto.upvalues.iter().position(|u| u.kind == kind) {
            return Ok(idx as u32);
        }
        let idx = self.proto.upvalues.len() as u32;
        if idx + 1 > self.limits.max_upvalues {
            return Err(self.error(CompileErrorKind::TooManyUpvalues {
                function: self.function_name(),
                limit: self.limits.max_upvalues,
            }));
        }
        trace!(idx, ?kind, "new upvalue");
        self.proto.upvalues.push(UpvalDesc { name, kind });
        Ok(idx)
    }

    // ---- Closures ----

    /// Append a finished nested prototype and emit its CLOSURE, followed by
    /// one pseudo-instruction per upvalue telling the VM where to find it.
    fn push_closure(&mut self, child: Proto) -> CompileResult<ExprDesc> {
        if self.proto.protos.len() as u32 >= MAX_BX {
            return Err(self.error(CompileErrorKind::TooManyConstants {
                function: self.function_name(),
                limit: MAX_BX,
            }));
        }
        let idx = self.proto.protos.len() as u32;
        let captures: Vec<UpvalKind> = child.upvalues.iter().map(|u| u.kind).collect();
        self.proto.protos.push(child);
        let pc = self.code_abx(OpCode::Closure, 0, idx)?;
        for kind in captures {
            match kind {
                UpvalKind::InStack(reg) => self.code_abc(OpCode::Move, 0, reg, 0)?,
                UpvalKind::Upvalue(up) => self.code_abc(OpCode::GetUpval, 0, up, 0)?,
            };
        }
        Ok(ExprDesc::new(ExprKind::Relocatable(pc)))
    }

    /// Close every open block, emit the final return and freeze the
    /// prototype.
    fn finish(mut self) -> CompileResult<Proto> {
        while !self.scope.blocks.is_empty() {
            self.leave_block()?;
        }
        let pc = self.pc();
        self.scope.remove_to(0, pc);
        self.ret(0, Some(0))?;
        self.proto.max_stack_size = self.scope.max_stack;
        self.proto.local_vars = std::mem::take(&mut self.scope.local_vars);
        self.proto.constants = self.constants.into_constants();
        if self.parent.is_some() {
            self.proto.last_line_defined = self.line;
        }
        Ok(self.proto)
    }
}

/// How a name resolved in one function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VarKind {
    Local(u32),
    Upvalue(u32),
    Global,
}

/// The compiler: holds the string interner and the function state stack.
pub struct Compiler {
    /// Stack of function states (nested functions). Never empty.
    func_stack: Vec<FuncState>,
    strings: StringInterner,
    limits: Limits,
}

impl Compiler {
    /// Start compiling a chunk named `source` with the default limits.
    pub fn new(source: &str) -> Self {
        Self::with_limits(source, Limits::default())
    }

    pub fn with_limits(source: &str, limits: Limits) -> Self {
        let limits = limits.clamped();
        let mut strings = StringInterner::new();
        // the main chunk always accepts varargs
        let mut main = FuncState::new(None, 0, true, limits.clone());
        main.proto.source = Some(strings.intern(source.as_bytes()));
        main.scope.enter_block(false);
        debug!(source, ?limits, "compiling chunk");
        Compiler {
            func_stack: vec![main],
            strings,
            limits,
        }
    }

    pub fn fs(&self) -> &FuncState {
        self.func_stack.last().expect("main function is always open")
    }

    pub fn fs_mut(&mut self) -> &mut FuncState {
        self.func_stack.last_mut().expect("main function is always open")
    }

    pub fn strings(&self) -> &StringInterner {
        &self.strings
    }

    pub fn intern(&mut self, name: &str) -> StringId {
        self.strings.intern(name.as_bytes())
    }

    pub fn line(&self) -> u32 {
        self.fs().line
    }

    /// Set the line attached to the next emitted instructions.
    pub fn set_line(&mut self, line: u32) {
        self.fs_mut().line = line;
    }

    /// A parser error at the current line.
    pub fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Syntax(msg.into()), self.line())
    }

    pub fn error_at(&self, line: u32, msg: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Syntax(msg.into()), line)
    }

    // ---- Functions ----

    /// Start a nested function defined at `line`.
    pub fn open_function(&mut self, line: u32) {
        let parent = self.func_stack.len() - 1;
        let mut fs = FuncState::new(Some(parent), line, false, self.limits.clone());
        fs.proto.source = self.fs().proto.source;
        fs.scope.enter_block(false);
        debug!(depth = self.func_stack.len(), line, "open function");
        self.func_stack.push(fs);
    }

    /// Declare the parameters of the current function.
    pub fn parameters(&mut self, names: &[&str], is_vararg: bool) -> CompileResult<()> {
        for name in names {
            self.new_local(name)?;
        }
        let fs = self.fs_mut();
        fs.activate_locals(names.len() as u32);
        let nparams = fs.scope.num_active();
        fs.proto.num_params = nparams;
        fs.proto.is_vararg = is_vararg;
        fs.reserve_regs(nparams)
    }

    /// Finish the current nested function and return its closure as an
    /// expression of the enclosing function.
    pub fn close_function(&mut self) -> CompileResult<ExprDesc> {
        if self.func_stack.len() == 1 {
            return Err(self.error("no nested function to close"));
        }
        let child = self.func_stack.pop().expect("nested function is open");
        let line = child.line;
        let proto = child.finish()?;
        debug!(
            depth = self.func_stack.len(),
            instructions = proto.code.len(),
            constants = proto.constants.len(),
            upvalues = proto.upvalues.len(),
            "close function"
        );
        let parent = self.fs_mut();
        parent.line = line;
        parent.push_closure(proto)
    }

    /// Finish the main chunk.
    pub fn finish(mut self) -> CompileResult<(Proto, StringInterner)> {
        if self.func_stack.len() != 1 {
            return Err(self.error("unfinished nested function"));
        }
        let main = self.func_stack.pop().expect("main function is open");
        let proto = main.finish()?;
        debug!(
            instructions = proto.total_code_len(),
            constants = proto.constants.len(),
            functions = proto.protos.len(),
            "finished chunk"
        );
        Ok((proto, self.strings))
    }

    // ---- Locals and blocks ----

    pub fn new_local(&mut self, name: &str) -> CompileResult<()> {
        let id = self.intern(name);
        self.fs_mut().new_local(id)
    }

    pub fn activate_locals(&mut self, n: u32) {
        self.fs_mut().activate_locals(n);
    }

    pub fn end_statement(&mut self) {
        self.fs_mut().end_statement();
    }

    pub fn enter_block(&mut self, is_breakable: bool) {
        self.fs_mut().enter_block(is_breakable);
    }

    pub fn leave_block(&mut self) -> CompileResult<()> {
        self.fs_mut().leave_block()
    }

    pub fn break_stat(&mut self) -> CompileResult<()> {
        self.fs_mut().break_stat()
    }

    // ---- Names ----

    /// A string literal as a constant expression.
    pub fn string_constant(&mut self, s: &str) -> CompileResult<ExprDesc> {
        let id = self.intern(s);
        let k = self.fs_mut().add_constant(Constant::String(id))?;
        Ok(ExprDesc::constant(k))
    }

    /// Resolve `name` as a local, an upvalue or a global of the current
    /// function.
    pub fn resolve_variable(&mut self, name: &str) -> CompileResult<ExprDesc> {
        let id = self.intern(name);
        let line = self.line();
        let top = self.func_stack.len() - 1;
        let resolved = self.resolve_in(top, id, true).map_err(|mut e| {
            e.line = line;
            e
        })?;
        let e = match resolved {
            VarKind::Local(reg) => ExprDesc::local(reg),
            VarKind::Upvalue(idx) => ExprDesc::new(ExprKind::Upvalue(idx)),
            VarKind::Global => {
                let k = self.fs_mut().add_constant(Constant::String(id))?;
                ExprDesc::new(ExprKind::Global(k))
            }
        };
        Ok(e)
    }

    /// Look `name` up in the function at `level`. A local found on behalf of
    /// a nested function (`base == false`) marks its block as captured.
    fn resolve_in(&mut self, level: usize, name: StringId, base: bool) -> CompileResult<VarKind> {
        let fs = &mut self.func_stack[level];
        if let Some(reg) = fs.scope.resolve_local(name) {
            if !base {
                fs.scope.mark_upval(reg);
            }
            return Ok(VarKind::Local(reg));
        }
        let Some(parent) = fs.parent else {
            return Ok(VarKind::Global);
        };
        let kind = match self.resolve_in(parent, name, false)? {
            VarKind::Global => return Ok(VarKind::Global),
            VarKind::Local(reg) => UpvalKind::InStack(reg),
            VarKind::Upvalue(idx) => UpvalKind::Upvalue(idx),
        };
        let idx = self.func_stack[level].index_upvalue(name, kind)?;
        Ok(VarKind::Upvalue(idx))
    }
}
