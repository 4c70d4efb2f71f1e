use super::helpers::*;
use lume_compiler::compiler::table::{fb2int, int2fb};
use lume_compiler::limits::Limits;
use lume_compiler::opcode::OpCode;

fn items<'a>(n: usize) -> Vec<Field<'a>> {
    (0..n).map(|i| Field::List(num(i as f64))).collect()
}

#[test]
fn test_mixed_constructor() {
    let (proto, _) = compile(|c| {
        local(
            c,
            &["t"],
            vec![table(vec![
                Field::List(num(1.0)),
                Field::List(num(2.0)),
                Field::Rec(string("x"), num(3.0)),
            ])],
        )
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::NewTable,
            OpCode::LoadK,
            OpCode::LoadK,
            OpCode::SetTable,
            OpCode::SetList,
            OpCode::Return
        ]
    );
    let nt = proto.code[0];
    assert_eq!((nt.a(), nt.b(), nt.c()), (0, 2, 1));
    let st = proto.code[3];
    assert_eq!((st.a(), st.b(), st.c()), (0, 256 + 2, 256 + 3));
    let sl = proto.code[4];
    assert_eq!((sl.a(), sl.b(), sl.c()), (0, 2, 1));
}

#[test]
fn test_computed_key() {
    let (proto, _) = compile(|c| {
        local(c, &["t"], vec![table(vec![Field::Rec(var("k"), var("v"))])])
    });
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::NewTable,
            OpCode::GetGlobal,
            OpCode::GetGlobal,
            OpCode::SetTable,
            OpCode::Return
        ]
    );
    let st = proto.code[3];
    assert_eq!((st.a(), st.b(), st.c()), (0, 1, 2));
    assert_eq!((proto.code[0].b(), proto.code[0].c()), (0, 1));
}

#[test]
fn test_flush_every_batch() {
    let limits = Limits {
        fields_per_flush: 2,
        ..Limits::default()
    };
    let (proto, _) = try_compile(limits, |c| local(c, &["t"], vec![table(items(3))])).unwrap();
    assert_eq!(
        ops(&proto),
        vec![
            OpCode::NewTable,
            OpCode::LoadK,
            OpCode::LoadK,
            OpCode::SetList,
            OpCode::LoadK,
            OpCode::SetList,
            OpCode::Return
        ]
    );
    let (first, second) = (proto.code[3], proto.code[5]);
    assert_eq!((first.b(), first.c()), (2, 1));
    assert_eq!((second.b(), second.c()), (1, 2));
    // the flushed registers are reused by the next batch
    assert_eq!(proto.code[4].a(), 1);
}

#[test]
fn test_default_flush_size() {
    let (proto, _) = compile(|c| local(c, &["t"], vec![table(items(60))]));
    let setlists: Vec<(u32, u32)> = proto
        .code
        .iter()
        .filter(|i| i.opcode() == OpCode::SetList)
        .map(|i| (i.b(), i.c()))
        .collect();
    assert_eq!(setlists, vec![(50, 1), (10, 2)]);
    let nt = proto.code[0];
    assert_eq!(nt.b(), int2fb(60));
    assert!(fb2int(nt.b()) >= 60);
    assert_eq!(proto.max_stack_size, 51);
}

#[test]
fn test_open_call_fills_rest() {
    let (proto, _) = compile(|c| {
        local(
            c,
            &["t"],
            vec![table(vec![Field::List(num(1.0)), Field::List(call(var("f"), vec![]))])],
        )
    });
    let call = proto.code[3];
    assert_eq!((call.opcode(), call.c()), (OpCode::Call, 0));
    let sl = proto.code[4];
    assert_eq!((sl.opcode(), sl.a(), sl.b(), sl.c()), (OpCode::SetList, 0, 0, 1));
    // only the fixed item counts toward the size hint
    assert_eq!(proto.code[0].b(), 1);
}

#[test]
fn test_vararg_fills_rest() {
    let (proto, _) = compile(|c| local(c, &["t"], vec![table(vec![Field::List(vararg())])]));
    let va = proto.code[1];
    assert_eq!((va.opcode(), va.a(), va.b()), (OpCode::VarArg, 1, 0));
    let sl = proto.code[2];
    assert_eq!((sl.opcode(), sl.b(), sl.c()), (OpCode::SetList, 0, 1));
    assert_eq!(proto.code[0].b(), 0);
}

#[test]
fn test_large_batch_uses_extra_word() {
    let limits = Limits {
        fields_per_flush: 1,
        ..Limits::default()
    };
    let (proto, _) = try_compile(limits, |c| local(c, &["t"], vec![table(items(512))])).unwrap();
    let n = proto.code.len();
    let sl = proto.code[n - 3];
    assert_eq!(sl.opcode(), OpCode::SetList);
    assert_eq!((sl.b(), sl.c()), (1, 0));
    assert_eq!(proto.code[n - 2].0, 512);
    assert_eq!(proto.code[n - 1].opcode(), OpCode::Return);
}

#[test]
fn test_jump_after_extra_word_keeps_batch() {
    let limits = Limits {
        fields_per_flush: 1,
        ..Limits::default()
    };
    // 539 has the bit pattern of a TESTSET
    let (proto, _) = try_compile(limits, |c| {
        local(c, &["a"], vec![])?;
        if_stat(
            c,
            var("a"),
            |c| local(c, &["t"], vec![table(items(539))]),
            Some(Box::new(|c| ret(c, vec![]))),
        )
    })
    .unwrap();
    let sl = proto
        .code
        .iter()
        .rposition(|i| i.opcode() == OpCode::SetList)
        .unwrap();
    assert_eq!(proto.code[sl].c(), 0);
    assert_eq!(proto.code[sl + 1].0, 539);
    assert_eq!(proto.code[sl + 2].opcode(), OpCode::Jmp);
    assert_eq!(jump_target(&proto, sl + 2), sl + 4);
    assert_eq!(proto.code[sl + 3].opcode(), OpCode::Return);
    assert_eq!(proto.code[sl + 4].opcode(), OpCode::Return);
}

#[test]
fn test_nested_tables() {
    let (proto, _) = compile(|c| {
        local(
            c,
            &["t"],
            vec![table(vec![
                Field::List(table(vec![Field::List(num(1.0))])),
                Field::List(table(vec![])),
            ])],
        )
    });
    let news: Vec<u32> = proto
        .code
        .iter()
        .filter(|i| i.opcode() == OpCode::NewTable)
        .map(|i| i.a())
        .collect();
    assert_eq!(news, vec![0, 1, 2]);
    let outer = proto.code[proto.code.len() - 2];
    assert_eq!((outer.opcode(), outer.a(), outer.b()), (OpCode::SetList, 0, 2));
}
