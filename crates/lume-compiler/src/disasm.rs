/// Bytecode disassembler (luac -l style output).
use crate::opcode::{index_k, is_k, Instruction, InstructionFormat, OpCode};
use crate::proto::{Constant, Proto, UpvalKind};
use lume_core::number::as_exact_i32;
use lume_core::string::StringInterner;
use std::fmt::{self, Write};

/// Disassemble a complete Proto into a human-readable string.
pub fn disassemble(proto: &Proto, strings: &StringInterner) -> String {
    let mut out = String::new();
    disassemble_proto(&mut out, proto, strings, 0).expect("writing to a String cannot fail");
    out
}

fn disassemble_proto(
    out: &mut String,
    proto: &Proto,
    strings: &StringInterner,
    level: usize,
) -> fmt::Result {
    let indent = "  ".repeat(level);

    // Header
    let source = proto
        .source
        .map(|id| strings.display(id))
        .unwrap_or_else(|| "?".to_string());
    let kind = if level == 0 { "main" } else { "function" };
    writeln!(
        out,
        "{indent}{kind} <{source}:{},{}> ({} instructions)",
        proto.line_defined,
        proto.last_line_defined,
        proto.code.len()
    )?;
    let vararg = if proto.is_vararg { "+" } else { "" };
    writeln!(
        out,
        "{indent}{}{vararg} params, {} slots, {} upvalues, {} locals, {} constants, {} functions",
        proto.num_params,
        proto.max_stack_size,
        proto.upvalues.len(),
        proto.local_vars.len(),
        proto.constants.len(),
        proto.protos.len(),
    )?;

    // Instructions
    let mut pc = 0;
    while pc < proto.code.len() {
        let inst = &proto.code[pc];
        let line = proto.get_line(pc);
        let line_str = if line > 0 {
            format!("[{line}]")
        } else {
            "[-]".to_string()
        };
        write!(out, "{indent}\t{}\t{:>5}\t", pc + 1, line_str)?;
        disasm_instruction(out, pc, inst, proto, strings)?;
        writeln!(out)?;
        // a SETLIST with C = 0 carries its batch in the next word
        if inst.opcode() == OpCode::SetList && inst.c() == 0 && pc + 1 < proto.code.len() {
            pc += 1;
            writeln!(out, "{indent}\t{}\t{:>5}\t{}", pc + 1, "", proto.code[pc].0)?;
        }
        pc += 1;
    }

    // Constants
    writeln!(out, "{indent}constants ({}):", proto.constants.len())?;
    for (i, k) in proto.constants.iter().enumerate() {
        write!(out, "{indent}\t{}\t", i + 1)?;
        format_constant(out, k, strings)?;
        writeln!(out)?;
    }

    // Locals
    writeln!(out, "{indent}locals ({}):", proto.local_vars.len())?;
    for (i, local) in proto.local_vars.iter().enumerate() {
        writeln!(
            out,
            "{indent}\t{}\t{}\t{}\t{}",
            i,
            strings.display(local.name),
            local.start_pc + 1,
            local.end_pc + 1
        )?;
    }

    // Upvalues
    writeln!(out, "{indent}upvalues ({}):", proto.upvalues.len())?;
    for (i, up) in proto.upvalues.iter().enumerate() {
        let (in_stack, index) = match up.kind {
            UpvalKind::InStack(reg) => (1, reg),
            UpvalKind::Upvalue(idx) => (0, idx),
        };
        writeln!(
            out,
            "{indent}\t{}\t{}\t{}\t{}",
            i,
            strings.display(up.name),
            in_stack,
            index
        )?;
    }

    // Nested protos
    for p in &proto.protos {
        writeln!(out)?;
        disassemble_proto(out, p, strings, level + 1)?;
    }
    Ok(())
}

/// luac prints constant operands as negative numbers.
fn rk_operand(x: u32) -> i64 {
    if is_k(x) {
        -1 - index_k(x) as i64
    } else {
        x as i64
    }
}

/// Disassemble a single instruction into the output string.
pub fn disasm_instruction(
    out: &mut String,
    pc: usize,
    inst: &Instruction,
    proto: &Proto,
    strings: &StringInterner,
) -> fmt::Result {
    let op = inst.opcode();
    write!(out, "{:<9}\t", op.name())?;

    match op.format() {
        InstructionFormat::IABC if op.uses_rk() => {
            write!(out, "{} {} {}", inst.a(), rk_operand(inst.b()), rk_operand(inst.c()))?;
            let ks: Vec<u32> = [inst.b(), inst.c()].into_iter().filter(|&x| is_k(x)).collect();
            if !ks.is_empty() {
                write!(out, "\t;")?;
                for x in ks {
                    write!(out, " ")?;
                    constant_at(out, index_k(x), proto, strings)?;
                }
            }
        }
        InstructionFormat::IABC => {
            write!(out, "{} {} {}", inst.a(), inst.b(), inst.c())?;
            if matches!(op, OpCode::GetUpval | OpCode::SetUpval) {
                if let Some(up) = proto.upvalues.get(inst.b() as usize) {
                    write!(out, "\t; {}", strings.display(up.name))?;
                }
            }
        }
        InstructionFormat::IABx => {
            write!(out, "{} {}", inst.a(), inst.bx())?;
            match op {
                OpCode::LoadK | OpCode::GetGlobal | OpCode::SetGlobal => {
                    write!(out, "\t; ")?;
                    constant_at(out, inst.bx(), proto, strings)?;
                }
                OpCode::Closure => write!(out, "\t; function [{}]", inst.bx())?,
                _ => {}
            }
        }
        InstructionFormat::IAsBx => {
            let target = pc as i64 + 2 + inst.sbx() as i64;
            if op == OpCode::Jmp {
                write!(out, "{}", inst.sbx())?;
            } else {
                write!(out, "{} {}", inst.a(), inst.sbx())?;
            }
            write!(out, "\t; to {target}")?;
        }
    }
    Ok(())
}

fn constant_at(out: &mut String, idx: u32, proto: &Proto, strings: &StringInterner) -> fmt::Result {
    match proto.constants.get(idx as usize) {
        Some(k) => format_constant(out, k, strings),
        None => write!(out, "K{idx}?"),
    }
}

fn format_constant(out: &mut String, k: &Constant, strings: &StringInterner) -> fmt::Result {
    match k {
        Constant::Nil => write!(out, "nil"),
        Constant::Boolean(b) => write!(out, "{b}"),
        Constant::Number(n) => match as_exact_i32(*n) {
            Some(i) => write!(out, "{i}"),
            None => write!(out, "{n}"),
        },
        Constant::String(id) => {
            let bytes = strings.get_bytes(*id);
            if let Ok(s) = std::str::from_utf8(bytes) {
                write!(out, "\"{s}\"")
            } else {
                write!(out, "<binary>")
            }
        }
    }
}
