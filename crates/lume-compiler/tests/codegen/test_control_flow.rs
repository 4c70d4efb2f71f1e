use super::helpers::*;
use lume_compiler::compiler::expr::{BinOp, UnOp};
use lume_compiler::opcode::OpCode;

#[test]
fn test_if_else_with_returns() {
    let (proto, _) = compile(|c| {
        if_stat(
            c,
            var("a"),
            |c| ret(c, vec![num(1.0)]),
            Some(Box::new(|c| ret(c, vec![num(2.0)]))),
        )
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::GetGlobal,
            OpCode::Test,
            OpCode::Jmp,
            OpCode::LoadK,
            OpCode::Return,
            OpCode::Jmp,
            OpCode::LoadK,
            OpCode::Return,
            OpCode::Return,
        ]
    );
    assert_eq!(count_op(&proto, OpCode::Test), 1);
    assert_eq!(count_op(&proto, OpCode::Jmp), 2);
    // false exit lands on the else branch, the escape on what follows it
    assert_eq!(jump_target(&proto, 2), 6);
    assert_eq!(jump_target(&proto, 5), 8);
    let (r1, r2) = (proto.code[4], proto.code[7]);
    assert_eq!((r1.a(), r1.b()), (0, 2));
    assert_eq!((r2.a(), r2.b()), (0, 2));
}

#[test]
fn test_if_without_else() {
    let (proto, _) = compile(|c| {
        if_stat(c, var("a"), |c| call_stat(c, call(var("f"), vec![])), None)
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::GetGlobal,
            OpCode::Test,
            OpCode::Jmp,
            OpCode::GetGlobal,
            OpCode::Call,
            OpCode::Return
        ]
    );
    assert_eq!(jump_target(&proto, 2), 5);
}

#[test]
fn test_if_not_elides_not() {
    let (proto, _) = compile(|c| {
        if_stat(
            c,
            un(UnOp::Not, var("a")),
            |c| call_stat(c, call(var("f"), vec![])),
            None,
        )
    });
    assert!(!has_op(&proto, OpCode::Not));
    let test = proto.code[1];
    assert_eq!(test.opcode(), OpCode::Test);
    assert_eq!((test.a(), test.c()), (0, 1));
}

#[test]
fn test_if_comparison_inverts_in_place() {
    let (proto, _) = compile(|c| {
        if_stat(
            c,
            bin(BinOp::Lt, var("a"), var("b")),
            |c| call_stat(c, call(var("f"), vec![])),
            None,
        )
    });
    let lt = proto.code[2];
    assert_eq!(lt.opcode(), OpCode::Lt);
    assert_eq!((lt.a(), lt.b(), lt.c()), (0, 0, 1));
    assert_eq!(proto.code[3].opcode(), OpCode::Jmp);
    assert_eq!(jump_target(&proto, 3), 6);
}

#[test]
fn test_if_true_has_no_test() {
    let (proto, _) = compile(|c| {
        if_stat(c, boolean(true), |c| call_stat(c, call(var("f"), vec![])), None)
    });
    assert_eq!(ops(&proto), vec![OpCode::GetGlobal, OpCode::Call, OpCode::Return]);
}

#[test]
fn test_if_nil_always_skips() {
    let (proto, _) = compile(|c| {
        if_stat(c, nil(), |c| call_stat(c, call(var("f"), vec![])), None)
    });
    assert_eq!(proto.code[0].opcode(), OpCode::Jmp);
    assert_eq!(jump_target(&proto, 0), 3);
}

#[test]
fn test_while_loop() {
    let (proto, _) = compile(|c| {
        while_stat(c, var("a"), |c| call_stat(c, call(var("f"), vec![])))
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::GetGlobal,
            OpCode::Test,
            OpCode::Jmp,
            OpCode::GetGlobal,
            OpCode::Call,
            OpCode::Jmp,
            OpCode::Return
        ]
    );
    assert_eq!(jump_target(&proto, 2), 6);
    assert_eq!(jump_target(&proto, 5), 0);
}

#[test]
fn test_break_leaves_loop() {
    let (proto, _) = compile(|c| while_stat(c, boolean(true), |c| c.break_stat()));
    assert_eq!(ops(&proto), vec![OpCode::Jmp, OpCode::Jmp, OpCode::Return]);
    assert_eq!(jump_target(&proto, 0), 2);
    assert_eq!(jump_target(&proto, 1), 0);
}

#[test]
fn test_break_closes_captured_locals() {
    let (proto, _) = compile(|c| {
        while_stat(c, boolean(true), |c| {
            local(c, &["y"], vec![])?;
            assign(
                c,
                vec![var("g")],
                vec![function(3, &[], false, |c| ret(c, vec![var("y")]))],
            )?;
            c.break_stat()
        })
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::LoadNil,
            OpCode::Closure,
            OpCode::Move,
            OpCode::SetGlobal,
            OpCode::Close,
            OpCode::Jmp,
            OpCode::Close,
            OpCode::Jmp,
            OpCode::Return
        ]
    );
    // the loop start is a jump target, so the nil cannot be elided
    assert_eq!(proto.code[4].a(), 0);
    assert_eq!(jump_target(&proto, 5), 8);
    assert_eq!(jump_target(&proto, 7), 0);
}

#[test]
fn test_break_lands_on_close_of_breakable_block() {
    let (proto, _) = compile(|c| {
        c.enter_block(true);
        local(c, &["x"], vec![num(1.0)])?;
        local(
            c,
            &["f"],
            vec![function(2, &[], false, |c| ret(c, vec![var("x")]))],
        )?;
        c.break_stat()?;
        c.leave_block()
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::LoadK,
            OpCode::Closure,
            OpCode::Move,
            OpCode::Jmp,
            OpCode::Close,
            OpCode::Return
        ]
    );
    assert_eq!(jump_target(&proto, 3), 4);
    assert_eq!(proto.code[4].a(), 0);
}

#[test]
fn test_nested_loops_break_innermost() {
    let (proto, _) = compile(|c| {
        while_stat(c, var("a"), |c| {
            while_stat(c, var("b"), |c| c.break_stat())?;
            call_stat(c, call(var("f"), vec![]))
        })
    });
    // 0 GETGLOBAL a, 1 TEST, 2 JMP, 3 GETGLOBAL b, 4 TEST, 5 JMP, 6 JMP (break),
    // 7 JMP (inner back edge), 8 GETGLOBAL f, ...
    assert_eq!(jump_target(&proto, 6), 8);
    assert_eq!(jump_target(&proto, 7), 3);
    assert_eq!(jump_target(&proto, 5), 8);
}

#[test]
fn test_do_block_scopes_locals() {
    let (proto, _) = compile(|c| {
        block(c, |c| local(c, &["a"], vec![num(1.0)]))?;
        local(c, &["b"], vec![num(2.0)])
    });
    // b reuses the register freed by the block
    assert_eq!(proto.code[1].opcode(), OpCode::LoadK);
    assert_eq!(proto.code[1].a(), 0);
    assert_eq!(proto.max_stack_size, 2);
}
