use super::helpers::*;
use lume_compiler::compiler::expr::{BinOp, UnOp};
use lume_compiler::opcode::OpCode;
use lume_compiler::proto::Constant;
use proptest::prelude::*;

const ARITH: [OpCode; 6] = [
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::Pow,
];

fn no_arith(ops: &[OpCode]) -> bool {
    ops.iter().all(|op| !ARITH.contains(op) && *op != OpCode::Unm)
}

#[test]
fn test_local_one_plus_two() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![bin(BinOp::Add, num(1.0), num(2.0))]));
    assert_eq!(ops(&proto), vec![OpCode::LoadK, OpCode::Return]);
    assert_eq!(proto.constants, vec![Constant::Number(3.0)]);
    assert_eq!(proto.code[0].a(), 0);
    assert_eq!(proto.code[0].bx(), 0);
}

#[test]
fn test_nested_folding() {
    // (2 * 3) - 10 / 4
    let (proto, _) = compile(|c| {
        local(
            c,
            &["x"],
            vec![bin(
                BinOp::Sub,
                bin(BinOp::Mul, num(2.0), num(3.0)),
                bin(BinOp::Div, num(10.0), num(4.0)),
            )],
        )
    });
    assert!(no_arith(&ops(&proto)));
    assert_eq!(number_constants(&proto), vec![3.5]);
}

#[test]
fn test_unary_minus_folds() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![un(UnOp::Neg, num(5.0))]));
    assert!(no_arith(&ops(&proto)));
    assert_eq!(number_constants(&proto), vec![-5.0]);
}

#[test]
fn test_modulo_follows_divisor_sign() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![bin(BinOp::Mod, num(-7.0), num(3.0))]));
    assert_eq!(number_constants(&proto), vec![2.0]);
}

#[test]
fn test_nan_is_not_folded() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![bin(BinOp::Div, num(0.0), num(0.0))]));
    assert_eq!(count_op(&proto, OpCode::Div), 1);
    let div = proto.code[0];
    assert_eq!(div.opcode(), OpCode::Div);
    // both operands come from the constant pool
    assert!(div.b() >= 256 && div.c() >= 256);
}

#[test]
fn test_infinity_is_folded() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![bin(BinOp::Div, num(1.0), num(0.0))]));
    assert!(no_arith(&ops(&proto)));
    assert_eq!(number_constants(&proto), vec![f64::INFINITY]);
}

#[test]
fn test_length_is_never_folded() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![un(UnOp::Len, string("abc"))]));
    assert_eq!(ops(&proto), vec![OpCode::LoadK, OpCode::Len, OpCode::Return]);
}

#[test]
fn test_negated_string_is_not_folded() {
    let (proto, _) = compile(|c| local(c, &["x"], vec![un(UnOp::Neg, string("10"))]));
    assert_eq!(ops(&proto), vec![OpCode::LoadK, OpCode::Unm, OpCode::Return]);
}

#[test]
fn test_variable_operand_is_not_folded() {
    let (proto, _) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        local(c, &["b"], vec![bin(BinOp::Add, var("a"), num(2.0))])
    });
    assert_eq!(ops(&proto), vec![OpCode::LoadK, OpCode::Add, OpCode::Return]);
    let add = proto.code[1];
    assert_eq!((add.a(), add.b()), (1, 0));
    assert_eq!(add.c(), 256 + 1);
}

#[test]
fn test_one_and_one_point_zero_share_a_slot() {
    let (proto, _) = compile(|c| {
        local(c, &["a"], vec![num(1.0)])?;
        local(c, &["b"], vec![bin(BinOp::Div, num(2.0), num(2.0))])
    });
    assert_eq!(proto.constants.len(), 1);
    assert_eq!(proto.code[0].bx(), proto.code[1].bx());
}

proptest! {
    #[test]
    fn prop_literal_pairs_fold(
        a in -1.0e6f64..1.0e6,
        b in -1.0e6f64..1.0e6,
        which in 0usize..5,
    ) {
        let op = [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod][which];
        let expected = lume_core::number::arith(
            [
                lume_core::number::ArithOp::Add,
                lume_core::number::ArithOp::Sub,
                lume_core::number::ArithOp::Mul,
                lume_core::number::ArithOp::Div,
                lume_core::number::ArithOp::Mod,
            ][which],
            a,
            b,
        );
        prop_assume!(expected.is_finite());
        let (proto, _) = compile(|c| local(c, &["x"], vec![bin(op, num(a), num(b))]));
        prop_assert!(no_arith(&ops(&proto)));
        prop_assert_eq!(ops(&proto), vec![OpCode::LoadK, OpCode::Return]);
        let folded = number_constants(&proto);
        prop_assert_eq!(folded.len(), 1);
        prop_assert_eq!(folded[0], lume_compiler::compiler::constants::normalize_number(expected));
    }
}
