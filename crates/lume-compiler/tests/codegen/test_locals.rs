use super::helpers::*;
use lume_compiler::compiler::Compiler;
use lume_compiler::opcode::OpCode;

#[test]
fn test_consecutive_nil_locals_merge() {
    let (proto, _) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        local(c, &["b"], vec![])?;
        local(c, &["c"], vec![])
    });
    assert_eq!(ops(&proto), vec![OpCode::LoadK, OpCode::LoadNil, OpCode::Return]);
    assert_eq!(count_op(&proto, OpCode::LoadNil), 1);
    let loadnil = proto.code[1];
    assert_eq!((loadnil.a(), loadnil.b()), (1, 2));
}

#[test]
fn test_explicit_nils_merge() {
    let (proto, _) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        local(c, &["x", "y", "z"], vec![nil(), nil(), nil()])
    });
    assert_eq!(count_op(&proto, OpCode::LoadNil), 1);
    let loadnil = proto.code[1];
    assert_eq!((loadnil.a(), loadnil.b()), (1, 3));
}

#[test]
fn test_nil_locals_at_function_start_are_free() {
    let (proto, _) = compile(|c| local(c, &["a", "b", "c"], vec![]));
    assert_eq!(ops(&proto), vec![OpCode::Return]);
    assert_eq!(proto.max_stack_size, 3);
}

#[test]
fn test_jump_target_blocks_nil_merge() {
    let (proto, _) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        local(c, &["b"], vec![])?;
        c.fs_mut().get_label();
        local(c, &["c"], vec![])
    });
    assert_eq!(
        ops(&proto),
        vec![OpCode::LoadK, OpCode::LoadNil, OpCode::LoadNil, OpCode::Return]
    );
    assert_eq!((proto.code[1].a(), proto.code[1].b()), (1, 1));
    assert_eq!((proto.code[2].a(), proto.code[2].b()), (2, 2));
}

#[test]
fn test_gap_between_nils_is_not_merged() {
    let (proto, _) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        local(c, &["b"], vec![])?;
        local(c, &["c"], vec![num(2.0)])?;
        local(c, &["d"], vec![])
    });
    assert_eq!(count_op(&proto, OpCode::LoadNil), 2);
}

#[test]
fn test_local_debug_ranges() {
    let (proto, strings) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        block(c, |c| local(c, &["b"], vec![num(2.0)]))?;
        local(c, &["c"], vec![num(3.0)])
    });
    let ranges: Vec<(String, u32, u32)> = proto
        .local_vars
        .iter()
        .map(|l| (strings.display(l.name), l.start_pc, l.end_pc))
        .collect();
    assert_eq!(
        ranges,
        vec![
            ("a".to_string(), 1, 3),
            ("b".to_string(), 2, 2),
            ("c".to_string(), 3, 3),
        ]
    );
}

#[test]
fn test_shadowing_resolves_innermost() {
    let (proto, _) = compile(|c| {
        local(c, &["x"], vec![num(1.0)])?;
        local(c, &["x"], vec![num(2.0)])?;
        ret(c, vec![var("x")])
    });
    let r = proto.code[2];
    assert_eq!((r.opcode(), r.a(), r.b()), (OpCode::Return, 1, 2));
}

#[test]
fn test_local_not_visible_in_own_initializer() {
    let (proto, strings) = compile(|c| local(c, &["x"], vec![var("x")]));
    // `local x = x` reads the global
    assert_eq!(proto.code[0].opcode(), OpCode::GetGlobal);
    assert_eq!(constant_str(&proto, &strings, 0), b"x");
}

#[test]
fn test_parameters_occupy_first_registers() {
    let (proto, strings) = compile(|c| {
        local_function(c, "f", 1, &["a", "b"], |c| ret(c, vec![var("b")]))
    });
    let f = &proto.protos[0];
    assert_eq!(f.num_params, 2);
    assert!(!f.is_vararg);
    assert_eq!(f.code[0].opcode(), OpCode::Return);
    assert_eq!((f.code[0].a(), f.code[0].b()), (1, 2));
    let names: Vec<String> = f.local_vars.iter().map(|l| strings.display(l.name)).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_free_registers_after_statement() {
    let mut c = Compiler::new("=test");
    local(&mut c, &["a"], vec![num(1.0)]).unwrap();
    call_stat(&mut c, call(var("f"), vec![num(1.0), num(2.0)])).unwrap();
    assert_eq!(c.fs().free_reg_level(), 1);
    assert_eq!(c.fs().num_active_locals(), 1);
}
