//! Algebraic simplification of instructions before they are committed
//!
//! [`simplify`] either returns an existing or freshly folded value that
//! replaces the instruction, rewrites the instruction in place (a branch on
//! a constant becomes `Jmp` or `Nop`, a branch on a query op becomes the
//! fused branch), or leaves it alone.

use super::TraceBuilder;
use crate::ir::{Instruction, IrFactory, Opcode, TmpId, Type};
use tracing::trace;

/// Replaces every source produced by a `Mov` with the value it copies.
pub fn copy_prop(factory: &IrFactory, inst: &mut Instruction) {
    for i in 0..inst.num_srcs() {
        let mut src = inst.src(i);
        while factory.producer(src).op() == Opcode::Mov {
            src = factory.producer(src).src(0);
        }
        if src != inst.src(i) {
            inst.set_src(i, src);
        }
    }
}

pub(crate) fn simplify(tb: &mut TraceBuilder, inst: &mut Instruction) -> Option<TmpId> {
    let result = match inst.op() {
        Opcode::Mov => Some(inst.src(0)),
        Opcode::OpAdd | Opcode::OpSub | Opcode::OpMul => simplify_arith(tb, inst),
        Opcode::OpAnd | Opcode::OpOr | Opcode::OpXor => simplify_bitwise(tb, inst),
        Opcode::Conv => simplify_conv(tb, inst),
        Opcode::OpGt
        | Opcode::OpGte
        | Opcode::OpLt
        | Opcode::OpLte
        | Opcode::OpEq
        | Opcode::OpNeq
        | Opcode::OpSame
        | Opcode::OpNSame => simplify_cmp(tb, inst),
        Opcode::IsType | Opcode::IsNType => simplify_is_type(tb, inst),
        Opcode::JmpZero | Opcode::JmpNZero => {
            simplify_cond_jmp(tb.factory(), inst);
            None
        }
        Opcode::Unbox => {
            let src = inst.src(0);
            tb.factory().ty(src).not_boxed().then_some(src)
        }
        Opcode::IncRef => {
            let src = inst.src(0);
            tb.factory().ty(src).not_counted().then_some(src)
        }
        Opcode::DecRef | Opcode::DecRefNZ => {
            if tb.factory().ty(inst.src(0)).not_counted() {
                inst.convert_to_nop();
            }
            None
        }
        Opcode::GuardType => {
            let src = inst.src(0);
            tb.factory().ty(src).subtype_of(inst.type_param()).then_some(src)
        }
        _ => None,
    };
    if let Some(tmp) = result {
        trace!(target: "hhir::simplifier", op = %inst.op(), tmp = %tmp, "simplified");
    }
    result
}

/// A constant operand usable in integer arithmetic: an Int or Bool constant.
fn int_operand(factory: &IrFactory, tmp: TmpId) -> Option<i64> {
    factory.int_val(tmp)
}

fn num_operand(factory: &IrFactory, tmp: TmpId) -> Option<f64> {
    factory.dbl_val(tmp).or_else(|| factory.int_val(tmp).map(|v| v as f64))
}

fn is_int(factory: &IrFactory, tmp: TmpId) -> bool {
    factory.ty(tmp).subtype_of(Type::INT)
}

fn simplify_arith(tb: &mut TraceBuilder, inst: &Instruction) -> Option<TmpId> {
    let op = inst.op();
    let (src1, src2) = (inst.src(0), inst.src(1));
    let factory = tb.factory();

    if inst.type_param() == Type::INT {
        if let (Some(a), Some(b)) = (int_operand(factory, src1), int_operand(factory, src2)) {
            let folded = match op {
                Opcode::OpAdd => a.wrapping_add(b),
                Opcode::OpSub => a.wrapping_sub(b),
                _ => a.wrapping_mul(b),
            };
            return Some(tb.gen_def_const(folded));
        }
        // x + 0, 0 + x, x - 0, x * 1, 1 * x
        let identity = if op == Opcode::OpMul { 1 } else { 0 };
        if int_operand(factory, src2) == Some(identity) && is_int(factory, src1) {
            return Some(src1);
        }
        if op != Opcode::OpSub && int_operand(factory, src1) == Some(identity) && is_int(factory, src2) {
            return Some(src2);
        }
        return None;
    }

    if inst.type_param() == Type::DBL {
        if let (Some(a), Some(b)) = (num_operand(factory, src1), num_operand(factory, src2)) {
            let folded = match op {
                Opcode::OpAdd => a + b,
                Opcode::OpSub => a - b,
                _ => a * b,
            };
            return Some(tb.gen_def_const(folded));
        }
    }
    None
}

fn simplify_bitwise(tb: &mut TraceBuilder, inst: &Instruction) -> Option<TmpId> {
    let (src1, src2) = (inst.src(0), inst.src(1));
    let factory = tb.factory();
    if let (Some(a), Some(b)) = (int_operand(factory, src1), int_operand(factory, src2)) {
        let folded = match inst.op() {
            Opcode::OpAnd => a & b,
            Opcode::OpOr => a | b,
            _ => a ^ b,
        };
        return Some(tb.gen_def_const(folded));
    }
    // x | 0, x ^ 0
    if inst.op() != Opcode::OpAnd && int_operand(factory, src2) == Some(0) && is_int(factory, src1) {
        return Some(src1);
    }
    None
}

fn simplify_conv(tb: &mut TraceBuilder, inst: &Instruction) -> Option<TmpId> {
    let src = inst.src(0);
    let to = inst.type_param();
    let factory = tb.factory();
    if factory.ty(src).subtype_of(to) {
        return Some(src);
    }
    if to == Type::BOOL {
        if let Some(v) = int_operand(factory, src) {
            return Some(tb.gen_def_const(v != 0));
        }
        if let Some(v) = factory.dbl_val(src) {
            return Some(tb.gen_def_const(v != 0.0));
        }
    } else if to == Type::INT {
        if let Some(v) = int_operand(factory, src) {
            return Some(tb.gen_def_const(v));
        }
        if let Some(v) = factory.dbl_val(src) {
            return Some(tb.gen_def_const(v as i64));
        }
    } else if to == Type::DBL {
        if let Some(v) = int_operand(factory, src) {
            return Some(tb.gen_def_const(v as f64));
        }
    }
    None
}

fn simplify_cmp(tb: &mut TraceBuilder, inst: &Instruction) -> Option<TmpId> {
    let (src1, src2) = (inst.src(0), inst.src(1));
    let factory = tb.factory();
    if !is_int(factory, src1) || !is_int(factory, src2) {
        return None;
    }
    let (Some(a), Some(b)) = (factory.int_val(src1), factory.int_val(src2)) else {
        return None;
    };
    let folded = match inst.op() {
        Opcode::OpGt => a > b,
        Opcode::OpGte => a >= b,
        Opcode::OpLt => a < b,
        Opcode::OpLte => a <= b,
        Opcode::OpEq | Opcode::OpSame => a == b,
        _ => a != b,
    };
    Some(tb.gen_def_const(folded))
}

fn simplify_is_type(tb: &mut TraceBuilder, inst: &Instruction) -> Option<TmpId> {
    let src_ty = tb.factory().ty(inst.src(0));
    let tested = inst.type_param();
    let known = if src_ty.subtype_of(tested) {
        true
    } else if !src_ty.maybe(tested) {
        false
    } else {
        return None;
    };
    let negate = inst.op() == Opcode::IsNType;
    Some(tb.gen_def_const(known != negate))
}

/// Folds a branch on a constant into `Jmp` or `Nop`, and fuses a branch on
/// a query op into the matching compare-and-branch.
fn simplify_cond_jmp(factory: &IrFactory, inst: &mut Instruction) {
    let src = inst.src(0);
    let jmp_if_zero = inst.op() == Opcode::JmpZero;

    if let Some(v) = factory.int_val(src) {
        if (v == 0) == jmp_if_zero {
            inst.set_op(Opcode::Jmp);
            inst.set_srcs(Vec::new());
        } else {
            inst.convert_to_nop();
        }
        return;
    }

    let producer = factory.producer(src);
    let query = producer.op();
    if !query.is_query_op() || query.disable_branch_fusion() {
        return;
    }
    let query = if jmp_if_zero { query.negate_query_op() } else { query };
    inst.set_op(query.query_to_jmp_op());
    inst.set_type_param(producer.type_param());
    inst.set_srcs(producer.srcs().to_vec());
}
