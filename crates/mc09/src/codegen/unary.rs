//! Unary operators.

use crate::asm::{hex16, hex8, AsmText};
use crate::codegen::{emit_code, EmitCtx};
use crate::diag::EmitError;
use crate::sema::tree;
use crate::types::BasicType;
use lang_mc::ast::{NodeId, NodeKind};
use lang_mc::ops::UnaryOp;

pub fn emit(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (op, sub, sizeof_type) = match ctx.arena.kind(id) {
        NodeKind::Unary {
            op,
            expr,
            sizeof_type,
        } => (*op, *expr, *sizeof_type),
        _ => unreachable!("unary emitter on non-unary node"),
    };

    // A constant unary expression folds to a single load.
    if !l_value && op != UnaryOp::SizeOf {
        if let Some(mut value) = ctx.eval_const(id) {
            if ctx.is_byte(id) {
                value &= 0xFF;
                out.ins(
                    "LDB",
                    &format!("#{}", hex8(value as u8)),
                    &format!("constant expression: {} decimal", value),
                );
            } else {
                out.ins(
                    "LDD",
                    &format!("#{}", hex16(value)),
                    &format!("constant expression: {} decimal", value),
                );
            }
            return Ok(());
        }
    }

    let wide_variant = sub.map(|s| {
        let d = ctx.desc(s);
        if d.is_long() {
            "DWord"
        } else if d.is_single() {
            "Single"
        } else {
            "Double"
        }
    });

    match op {
        UnaryOp::Identity => {
            let sub = sub.expect("unary plus without operand");
            emit_code(ctx, out, sub, l_value)
        }

        UnaryOp::Neg => {
            let sub = sub.expect("negation without operand");
            if l_value || ctx.is_real_or_long(id) {
                if !ctx.is_real_or_long(sub) {
                    return Err(ctx.internal(id, "l-value negation of a narrow type"));
                }
                emit_code(ctx, out, sub, true)?; // address of operand in X
                let temp = ctx
                    .arena
                    .get(id)
                    .temp
                    .ok_or_else(|| ctx.internal(id, "wide negation without temporary"))?;
                let variant = wide_variant.unwrap();
                out.ins("TFR", "X,D", "operand");
                out.ins("LEAX", &ctx.var_arg(temp, 0), "address of result of operator");
                ctx.call_utility(out, &format!("copy{}", variant), "preserves X");
                ctx.call_utility(out, &format!("negate{}", variant), "preserves X");
                return Ok(());
            }
            emit_code(ctx, out, sub, false)?;
            if ctx.is_byte(id) {
                out.ins("NEGB", "", "");
            } else {
                out.ins("COMA", "", "");
                out.ins("COMB", "", "");
                out.ins("ADDD", "#1", "");
            }
            Ok(())
        }

        UnaryOp::BitwiseNot => {
            let sub = sub.expect("bitwise not without operand");
            if l_value || ctx.is_real_or_long(id) {
                if !ctx.desc(sub).is_long() {
                    return Err(ctx.internal(id, "l-value complement of a narrow type"));
                }
                emit_code(ctx, out, sub, true)?;
                let temp = ctx
                    .arena
                    .get(id)
                    .temp
                    .ok_or_else(|| ctx.internal(id, "wide complement without temporary"))?;
                out.ins("TFR", "X,D", "operand");
                out.ins("LEAX", &ctx.var_arg(temp, 0), "address of result of operator");
                ctx.call_utility(out, "copyDWord", "preserves X");
                out.ins("COM", ",X", "negate 32 bits at X");
                out.ins("COM", "1,X", "");
                out.ins("COM", "2,X", "");
                out.ins("COM", "3,X", "");
                return Ok(());
            }
            emit_code(ctx, out, sub, false)?;
            if !ctx.is_byte(id) {
                out.ins("COMA", "", "");
            }
            out.ins("COMB", "", "");
            Ok(())
        }

        UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
            emit_inc_dec(ctx, out, id, sub.expect("inc/dec without operand"), op, l_value)
        }

        UnaryOp::AddressOf => {
            let sub = sub.expect("address-of without operand");
            // &function is the function's address; the identifier
            // emitter already yields it.
            if matches!(
                ctx.arena.kind(sub),
                NodeKind::Identifier {
                    resolved: Some(lang_mc::ast::Resolved::FunctionAddress(_)),
                    ..
                }
            ) {
                return emit_code(ctx, out, sub, l_value);
            }
            emit_code(ctx, out, sub, true)?; // address in X
            if !l_value {
                out.ins("TFR", "X,D", "address-of");
            }
            Ok(())
        }

        UnaryOp::Indirection => {
            let sub = sub.expect("indirection without operand");
            // The pointer's value is the address of the result.
            if ctx.desc(sub).base == BasicType::Array {
                emit_code(ctx, out, sub, true)?;
            } else {
                emit_code(ctx, out, sub, false)?;
                out.ins("TFR", "D,X", "pointer");
            }
            if ctx.options.null_pointer_checking {
                ctx.call_utility(out, "check_null_ptr_x", "");
            }
            if l_value {
                return Ok(());
            }
            match ctx.desc(id).base {
                BasicType::Byte => out.ins("LDB", ",X", "indirection"),
                BasicType::Word | BasicType::Pointer => out.ins("LDD", ",X", "indirection"),
                BasicType::Function => out.ins("TFR", "X,D", ""),
                // Wide and aggregate values are delivered by address.
                _ => {}
            }
            Ok(())
        }

        UnaryOp::BooleanNeg => {
            let sub = sub.expect("boolean negation without operand");
            debug_assert!(ctx.is_byte(id));
            if l_value {
                return Err(ctx.internal(id, "boolean negation has no address"));
            }
            if ctx.is_real_or_long(sub) {
                emit_code(ctx, out, sub, true)?; // point to real/long with X
                let helper = format!("is{}Zero", wide_variant.unwrap());
                ctx.call_utility(out, &helper, "");
            } else {
                emit_code(ctx, out, sub, false)?;
                if ctx.is_byte(sub) {
                    out.ins("TSTB", "", "boolean negation: get Z flag");
                } else {
                    out.emit_cmpd_immediate(0, "boolean negation: get Z flag");
                }
            }
            out.ins("TFR", "CC,B", "");
            out.ins("ANDB", "#4", "keep Z flag");
            out.ins("LSRB", "", "shift Z flag to bit 0 of B");
            out.ins("LSRB", "", "");
            Ok(())
        }

        UnaryOp::SizeOf => {
            if l_value {
                return Err(ctx.internal(id, "sizeof has no address"));
            }
            let measured = match sizeof_type {
                Some(t) => ctx.types.size_of(t),
                None => sub.and_then(|s| tree::type_size(ctx.arena, ctx.types, s)),
            };
            let size = measured.unwrap_or(0); // diagnosed by the checker
            out.ins("LDD", &format!("#{}", size), "sizeof");
            Ok(())
        }
    }
}

/// Pre/post increment and decrement across all the widths. The
/// post-forms deliver the original value, whatever the type.
fn emit_inc_dec(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    sub: NodeId,
    op: UnaryOp,
    l_value: bool,
) -> Result<(), EmitError> {
    emit_code(ctx, out, sub, true)?; // address of operand in X

    let is_inc = matches!(op, UnaryOp::PreInc | UnaryOp::PostInc);
    let is_pre = matches!(op, UnaryOp::PreInc | UnaryOp::PreDec);

    if ctx.is_real_or_long(id) {
        let variant = if ctx.desc(sub).is_long() {
            "DWord"
        } else if ctx.desc(sub).is_single() {
            "Single"
        } else {
            "Double"
        };
        if !is_pre {
            let temp = ctx
                .arena
                .get(id)
                .temp
                .ok_or_else(|| ctx.internal(id, "wide post-inc/dec without temporary"))?;
            out.ins("PSHS", "X", "preserve address of number to inc/dec");
            out.ins("TFR", "X,D", "");
            out.ins(
                "LEAX",
                &ctx.var_arg(temp, 0),
                "temporary that receives init value of inc/dec",
            );
            ctx.call_utility(out, &format!("copy{}", variant), "");
            out.ins("PULS", "X", "point to number to inc/dec");
        }
        let helper = format!("{}{}", if is_inc { "increment" } else { "decrement" }, variant);
        ctx.call_utility(out, &helper, "inc/dec number at X");
        if !is_pre {
            let temp = ctx.arena.get(id).temp.expect("checked above");
            out.ins(
                "LEAX",
                &ctx.var_arg(temp, 0),
                "result of inc/dec is preserved original number",
            );
        }
        return Ok(());
    }

    if ctx.is_byte(id) {
        let instr = if is_inc { "INC" } else { "DEC" };
        if is_pre {
            out.ins(instr, ",X", "");
        }
        if !l_value {
            out.ins("LDB", ",X", "");
        } else if is_pre {
            return Ok(()); // address already in X
        }
        if !is_pre {
            out.ins(instr, ",X", "");
        }
        return Ok(());
    }

    // Word or pointer: a pointer steps by the size of what it points
    // to.
    let step = if ctx.desc(sub).base == BasicType::Pointer {
        let pointee = ctx.desc(sub).pointed.expect("pointer without pointee");
        ctx.types.size_of(pointee).unwrap_or(1)
    } else {
        1
    };
    let imm = format!("#{}", step);
    out.ins("LDD", ",X", "");
    out.ins(if is_inc { "ADDD" } else { "SUBD" }, &imm, "");
    out.ins("STD", ",X", "");
    if !is_pre && !l_value {
        out.ins(
            if is_inc { "SUBD" } else { "ADDD" },
            &imm,
            "post increment yields initial value",
        );
    }
    Ok(())
}
