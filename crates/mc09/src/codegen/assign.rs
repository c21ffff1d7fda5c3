//! The assignment family.
//!
//! Plain assignment picks one of five strategies, cheapest first:
//! store to a constant address, store to a variable's slot, store
//! through a pointer variable with indirect indexed addressing, a
//! general compute-address-then-store, and the copy/convert paths for
//! struct, real and long targets. Compound assignments re-express the
//! operation as load-compute-store for the narrow types and call the
//! three-address runtime helpers for the wide ones.

use crate::asm::{hex16, AsmText};
use crate::codegen::binary;
use crate::codegen::{emit_code, emit_word_rvalue, EmitCtx};
use crate::diag::EmitError;
use crate::sema::tree;
use crate::types::BasicType;
use lang_mc::ast::{NodeId, NodeKind};
use lang_mc::ops::{BinaryOp, UnaryOp};

pub fn emit(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (op, left, right) = match ctx.arena.kind(id) {
        NodeKind::Binary { op, left, right } => (*op, *left, *right),
        _ => unreachable!("assignment emitter on non-binary node"),
    };
    match op {
        BinaryOp::Assignment => emit_simple_assignment(ctx, out, id, left, right, l_value),
        BinaryOp::LeftAssign => {
            binary::emit_shift(ctx, out, id, left, right, l_value, true, true)
        }
        BinaryOp::RightAssign => {
            binary::emit_shift(ctx, out, id, left, right, l_value, false, true)
        }
        _ => emit_compound_assignment(ctx, out, id, op, left, right, l_value),
    }
}

// ----- plain assignment -----

fn emit_simple_assignment(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let ld = ctx.desc(left).clone();

    if ld.base == BasicType::Class {
        return emit_wide_assignment(ctx, out, id, left, right);
    }

    // Strategy 1: store to a constant address, e.g. *(int *)0xFF02.
    if !l_value {
        if let Some(addr) = constant_target_address(ctx, left) {
            emit_narrow_rhs(ctx, out, left, right)?;
            out.ins(
                tree::store_ins(ctx.arena, ctx.types, left),
                &hex16(addr),
                "store at constant address",
            );
            return Ok(());
        }

        // Strategy 2: the target is a declared variable.
        if let Some(did) = tree::as_variable(ctx.arena, left) {
            emit_narrow_rhs(ctx, out, left, right)?;
            let d = ctx.decl(did);
            let comment = format!("assign to {}", d.id);
            out.ins(
                tree::store_ins(ctx.arena, ctx.types, left),
                &ctx.var_arg(did, 0),
                &comment,
            );
            return Ok(());
        }

        // Strategy 3: store through a pointer variable, indirect
        // indexed.
        if let Some(did) = pointer_variable_target(ctx, left) {
            emit_narrow_rhs(ctx, out, left, right)?;
            let arg = format!("[{}]", ctx.var_arg(did, 0));
            out.ins(
                tree::store_ins(ctx.arena, ctx.types, left),
                &arg,
                "store through pointer variable",
            );
            return Ok(());
        }
    }

    // Strategy 4: general case. Evaluate the right side, save it,
    // compute the target address, store.
    emit_narrow_rhs(ctx, out, left, right)?;
    let byte = ctx.is_byte(left);
    out.ins("PSHS", if byte { "B" } else { "B,A" }, "right side of assignment");
    emit_code(ctx, out, left, true)?; // address of target in X
    out.ins("PULS", if byte { "B" } else { "A,B" }, "right side of assignment");
    out.ins(tree::store_ins(ctx.arena, ctx.types, left), ",X", "");
    Ok(())
}

/// `*(T *) <constant>` as an assignment target.
fn constant_target_address(ctx: &EmitCtx<'_>, left: NodeId) -> Option<u16> {
    match ctx.arena.kind(left) {
        NodeKind::Unary {
            op: UnaryOp::Indirection,
            expr: Some(sub),
            ..
        } => ctx.eval_const(*sub),
        _ => None,
    }
}

/// `*p` where `p` is a declared pointer variable.
fn pointer_variable_target(ctx: &EmitCtx<'_>, left: NodeId) -> Option<lang_mc::ast::DeclId> {
    match ctx.arena.kind(left) {
        NodeKind::Unary {
            op: UnaryOp::Indirection,
            expr: Some(sub),
            ..
        } => {
            let did = tree::as_variable(ctx.arena, *sub)?;
            if ctx.desc(*sub).base == BasicType::Pointer && !ctx.options.null_pointer_checking {
                Some(did)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Emits the right side of a narrow assignment, converted to the
/// left side's width: B for a byte target, D for a word target.
fn emit_narrow_rhs(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    left: NodeId,
    right: NodeId,
) -> Result<(), EmitError> {
    let rd = ctx.desc(right).clone();
    if rd.is_real_or_long() {
        // Narrow from wide: convert through a stack slot.
        emit_code(ctx, out, right, true)?; // address of number in X
        out.ins("TFR", "X,D", "address of source number");
        let target_byte = ctx.is_byte(left);
        let size = if target_byte { 1 } else { 2 };
        out.ins("LEAS", &format!("-{},S", size), "conversion result");
        out.ins("LEAX", ",S", "");
        let name = format!(
            "init{}{}From{}",
            if rd.is_long() {
                ""
            } else if tree::is_signed(ctx.arena, ctx.types, left) {
                "Signed"
            } else {
                "Unsigned"
            },
            if target_byte { "Byte" } else { "Word" },
            if rd.is_long() {
                "DWord"
            } else if rd.is_single() {
                "Single"
            } else {
                "Double"
            }
        );
        ctx.call_utility(out, &name, "");
        out.ins("PULS", if size == 1 { "B" } else { "A,B" }, "conversion result");
        return Ok(());
    }
    if ctx.is_byte(left) {
        emit_code(ctx, out, right, false)?;
        return Ok(());
    }
    emit_word_rvalue(ctx, out, right)
}

/// Assignment to a struct, union, real or long target. Delivers the
/// address of the target in X, which satisfies both the r-value and
/// l-value contracts for these types.
fn emit_wide_assignment(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
) -> Result<(), EmitError> {
    let ld = ctx.desc(left).clone();
    let rd = ctx.desc(right).clone();

    // Same representation: block copy.
    if (ld.is_struct() && rd.is_struct())
        || (ld.is_long() && rd.is_long())
        || (ld.is_real() && rd.is_real())
    {
        let size = ctx
            .types
            .size_of(ctx.ty(left))
            .ok_or_else(|| ctx.internal(id, "assignment to incomplete type"))?;
        return match size {
            4 => {
                emit_code(ctx, out, right, true)?; // source address in X
                out.ins("PSHS", "X", "source of copy");
                emit_code(ctx, out, left, true)?; // target address in X
                out.ins("PULS", "A,B", "source of copy");
                ctx.call_utility(out, "copyDWord", "copies from address in D to address in X");
                Ok(())
            }
            5 => {
                emit_code(ctx, out, right, true)?;
                out.ins("PSHS", "X", "source of copy");
                emit_code(ctx, out, left, true)?;
                out.ins("PULS", "A,B", "source of copy");
                ctx.call_utility(out, "copySingle", "copies from address in D to address in X");
                Ok(())
            }
            _ => {
                // General struct copy through memcpy(dest, src, n).
                out.ins("LDD", &format!("#{}", size), "byte count");
                out.ins("PSHS", "B,A", "");
                emit_code(ctx, out, right, true)?;
                out.ins("PSHS", "X", "source");
                emit_code(ctx, out, left, true)?;
                out.ins("PSHS", "X", "destination");
                ctx.call_utility(out, "_memcpy", "");
                out.ins("PULS", "X", "destination");
                out.ins("LEAS", "4,S", "");
                Ok(())
            }
        };
    }

    // long <- real and real <- long.
    if (ld.is_long() && rd.is_real()) || (ld.is_real() && rd.is_long()) {
        emit_code(ctx, out, right, true)?; // source address in X
        out.ins("PSHS", "X", "source of conversion");
        emit_code(ctx, out, left, true)?; // target address in X
        out.ins("PULS", "A,B", "source of conversion");
        if (ld.is_long() && ld.is_signed) || (ld.is_real() && rd.is_signed) {
            out.ins("ORCC", "#$01", "C=1 means signed");
        } else {
            out.ins("ANDCC", "#$FE", "C=0 means unsigned");
        }
        let name = if ld.is_long() {
            format!(
                "initDWordFrom{}",
                if rd.is_single() { "Single" } else { "Double" }
            )
        } else {
            format!(
                "init{}FromDWord",
                if ld.is_single() { "Single" } else { "Double" }
            )
        };
        ctx.call_utility(out, &name, "");
        return Ok(());
    }

    // Wide from a byte or word.
    if ld.is_real_or_long() && rd.is_byte_or_word() {
        emit_word_rvalue(ctx, out, right)?;
        out.ins("PSHS", "B,A", "word to widen");
        emit_code(ctx, out, left, true)?; // target address in X
        out.ins("PULS", "A,B", "word to widen");
        let name = format!(
            "init{}From{}Word",
            if ld.is_long() {
                "DWord"
            } else if ld.is_single() {
                "Single"
            } else {
                "Double"
            },
            if tree::is_signed(ctx.arena, ctx.types, right) {
                "Signed"
            } else {
                "Unsigned"
            }
        );
        ctx.call_utility(out, &name, "");
        return Ok(());
    }

    // Struct from integral and the remaining mixes are rejected by the
    // checker; reaching here is a bug.
    Err(ctx.internal(id, "unsupported wide assignment"))
}

// ----- compound assignments -----

#[allow(clippy::too_many_arguments)]
fn emit_compound_assignment(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    op: BinaryOp,
    left: NodeId,
    right: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let ld = ctx.desc(left).clone();

    if ld.is_real_or_long() {
        return emit_wide_compound(ctx, out, id, op, left, right);
    }

    let operation = op
        .compound_operation()
        .ok_or_else(|| ctx.internal(id, "not a compound assignment"))?;

    // A pointer steps in element units.
    let scale = if ld.base == BasicType::Pointer
        && matches!(operation, BinaryOp::Add | BinaryOp::Sub)
    {
        let pointee = ld.pointed.expect("pointer without pointee");
        ctx.types.size_of(pointee).unwrap_or(1)
    } else {
        1
    };

    let byte = ctx.is_byte(left);

    // Right side first (it may clobber X), scaled if need be.
    emit_word_rvalue(ctx, out, right)?;
    if scale > 1 {
        if scale.is_power_of_two() {
            let mut n = scale;
            while n > 1 {
                out.ins("LSLB", "", "");
                out.ins("ROLA", "", "scale by pointed type size");
                n /= 2;
            }
        } else {
            out.ins("TFR", "D,X", "");
            out.ins("LDD", &format!("#{}", scale), "pointed type size");
            ctx.call_utility(out, "MUL16", "");
        }
    }
    out.ins("PSHS", "B,A", "right side of compound assignment");

    emit_code(ctx, out, left, true)?; // address of target in X

    match operation {
        BinaryOp::Add | BinaryOp::Sub => {
            if byte {
                out.ins("LDB", ",X", "");
                out.ins(
                    if operation == BinaryOp::Add { "ADDB" } else { "SUBB" },
                    "1,S",
                    "low byte of right side",
                );
                out.ins("STB", ",X", "");
            } else {
                out.ins("LDD", ",X", "");
                out.ins(
                    if operation == BinaryOp::Add { "ADDD" } else { "SUBD" },
                    ",S",
                    "",
                );
                out.ins("STD", ",X", "");
            }
        }
        BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr | BinaryOp::BitwiseXor => {
            let (ins_a, ins_b) = match operation {
                BinaryOp::BitwiseAnd => ("ANDA", "ANDB"),
                BinaryOp::BitwiseOr => ("ORA", "ORB"),
                _ => ("EORA", "EORB"),
            };
            if byte {
                out.ins("LDB", ",X", "");
                out.ins(ins_b, "1,S", "");
                out.ins("STB", ",X", "");
            } else {
                out.ins("LDD", ",X", "");
                out.ins(ins_a, ",S", "");
                out.ins(ins_b, "1,S", "");
                out.ins("STD", ",X", "");
            }
        }
        BinaryOp::Mul => {
            if byte {
                out.ins("LDB", ",X", "");
                out.ins("LDA", "1,S", "low byte of right side");
                out.ins("PSHS", "X", "preserve target address");
                out.ins("MUL", "", "");
                out.ins("PULS", "X", "");
                out.ins("STB", ",X", "");
            } else {
                out.ins("PSHS", "X", "preserve target address");
                out.ins("LDX", "[0,S]", "current value of target");
                out.ins("LDD", "2,S", "right side");
                ctx.call_utility(out, "MUL16", "");
                out.ins("PULS", "X", "");
                out.ins("STD", ",X", "");
            }
        }
        BinaryOp::Div | BinaryOp::Mod => {
            let signed = tree::is_signed(ctx.arena, ctx.types, left)
                && tree::is_signed(ctx.arena, ctx.types, right);
            out.ins("PSHS", "X", "preserve target address");
            if byte {
                out.ins("LDB", ",X", "");
                out.ins(
                    tree::conv_to_word_ins(ctx.arena, ctx.types, left),
                    "",
                    "promote to word",
                );
                out.ins("TFR", "D,X", "dividend");
            } else {
                out.ins("LDX", "[0,S]", "dividend: current value of target");
            }
            out.ins("LDD", "2,S", "divisor");
            ctx.call_utility(
                out,
                if signed { "SDIV16" } else { "DIV16" },
                "quotient in X, remainder in D",
            );
            if operation == BinaryOp::Div {
                out.ins("TFR", "X,D", "quotient");
            }
            out.ins("PULS", "X", "");
            out.ins(if byte { "STB" } else { "STD" }, ",X", "");
        }
        _ => return Err(ctx.internal(id, "unexpected compound operation")),
    }

    out.ins("LEAS", "2,S", "drop right side");
    if !l_value {
        // Deliver the stored value.
        out.ins(if byte { "LDB" } else { "LDD" }, ",X", "value of assignment");
    }
    Ok(())
}

/// Compound assignment on a real or long left side: the matching
/// three-address helper computes in place, or into the hidden
/// temporary when the operand widths differ, in which case the result
/// is copied back to the left side.
fn emit_wide_compound(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    op: BinaryOp,
    left: NodeId,
    right: NodeId,
) -> Result<(), EmitError> {
    let ld = ctx.desc(left).clone();

    // Bitwise compound on longs goes through the and/or/xor helpers.
    if matches!(
        op,
        BinaryOp::AndAssign | BinaryOp::OrAssign | BinaryOp::XorAssign
    ) {
        let name = match op {
            BinaryOp::AndAssign => "and",
            BinaryOp::OrAssign => "or",
            _ => "xor",
        };
        return binary::emit_long_bitwise(ctx, out, id, name, left, right, true);
    }

    let op_name = match op {
        BinaryOp::IncAssign => "add",
        BinaryOp::DecAssign => "sub",
        BinaryOp::MulAssign => "mul",
        BinaryOp::DivAssign => "div",
        BinaryOp::ModAssign => "mod",
        _ => return Err(ctx.internal(id, "unexpected wide compound operator")),
    };

    binary::emit_real_or_long_op(ctx, out, id, op_name, left, right, true)?;

    let temp = ctx.arena.get(id).temp;
    if temp.is_some() {
        // Result went to the temporary; copy it back into the left
        // side. X still addresses the temporary.
        out.ins("TFR", "X,D", "address of result");
        out.ins("PULS", "X", "address of left side");
        let variant = if ld.is_long() {
            "DWord"
        } else if ld.is_single() {
            "Single"
        } else {
            "Double"
        };
        ctx.call_utility(out, &format!("copy{}", variant), "preserves X");
    } else {
        out.ins("PULS", "X", "address of left side");
    }
    Ok(())
}
