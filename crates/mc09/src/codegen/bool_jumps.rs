//! Boolean contexts compiled straight into branches.
//!
//! The condition of an `if`, `while` or `for` never materializes a 0
//! or 1: [`emit_bool_jumps`] walks through `!`, `&&`, `||` and the
//! comma operator, emitting comparisons that branch directly to the
//! success or failure label. A `!` swaps the two labels; `&&` and `||`
//! chain through an intermediate label.

use crate::asm::AsmText;
use crate::codegen::binary;
use crate::codegen::{emit_code, emit_for_side_effects, EmitCtx};
use crate::diag::EmitError;
use crate::sema::tree;
use lang_mc::ast::{NodeId, NodeKind};
use lang_mc::ops::{BinaryOp, UnaryOp};

pub fn emit_bool_jumps(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    condition: NodeId,
    success_label: &str,
    failure_label: &str,
) -> Result<(), EmitError> {
    // The boolean negation of something: evaluate that thing directly
    // and reverse the target labels.
    if let NodeKind::Unary {
        op: UnaryOp::BooleanNeg,
        expr: Some(sub),
        ..
    } = ctx.arena.kind(condition)
    {
        let sub = *sub;
        return emit_bool_jumps(ctx, out, sub, failure_label, success_label);
    }

    if let NodeKind::Binary { op, left, right } = ctx.arena.kind(condition) {
        let (op, left, right) = (*op, *left, *right);

        if op == BinaryOp::LogicalOr {
            let or_failure = ctx.new_label();
            emit_bool_jumps(ctx, out, left, success_label, &or_failure)?;
            out.emit_label(&or_failure, "");
            return emit_bool_jumps(ctx, out, right, success_label, failure_label);
        }
        if op == BinaryOp::LogicalAnd {
            let and_success = ctx.new_label();
            emit_bool_jumps(ctx, out, left, &and_success, failure_label)?;
            out.emit_label(&and_success, "");
            return emit_bool_jumps(ctx, out, right, success_label, failure_label);
        }
        if op.is_relational() {
            let compares_with_zero = matches!(op, BinaryOp::Equality | BinaryOp::Inequality)
                && tree::is_expression_always_false(ctx.arena, ctx.types, right);
            if compares_with_zero {
                // "x == 0" / "x != 0": test x directly.
                emit_zero_test(ctx, out, left)?;
            } else {
                binary::emit_comparison(ctx, out, condition, false, "")?;
            }

            let signed = binary::is_signed_comparison(ctx, left, right);
            let opcode = binary::branch_opcode(op, signed)
                .ok_or_else(|| ctx.internal(condition, "no branch for operator"))?;
            out.ins(opcode, success_label, "");
            out.ins("LBRA", failure_label, "");
            return Ok(());
        }
    }

    // A comma expression: evaluate everything but the last
    // sub-expression for its effects, then branch on the last one.
    if let NodeKind::Comma { exprs } = ctx.arena.kind(condition) {
        let exprs = exprs.clone();
        if let Some((&last, rest)) = exprs.split_last() {
            for &sub in rest {
                emit_for_side_effects(ctx, out, sub)?;
            }
            return emit_bool_jumps(ctx, out, last, success_label, failure_label);
        }
    }

    // Anything else is tested against zero.
    emit_zero_test(ctx, out, condition)?;
    out.ins("LBNE", success_label, "");
    out.ins("LBRA", failure_label, "");
    Ok(())
}

/// Sets the condition codes from the value of `id`. A real or long is
/// tested through its zero-test helper; a byte with CMPB #0 (TSTB
/// would not set C, which the unsigned branches need); a word with
/// CMPD.
fn emit_zero_test(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    if ctx.is_real_or_long(id) {
        emit_code(ctx, out, id, true)?; // address of number in X
        let helper = if ctx.desc(id).is_long() {
            "isDWordZero"
        } else if ctx.desc(id).is_single() {
            "isSingleZero"
        } else {
            "isDoubleZero"
        };
        ctx.call_utility(out, helper, "");
        return Ok(());
    }
    emit_code(ctx, out, id, false)?;
    if ctx.is_byte(id) {
        out.ins("CMPB", "#0", "TSTB does not affect C");
    } else {
        out.emit_cmpd_immediate(0, "");
    }
    Ok(())
}
