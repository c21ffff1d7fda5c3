//! Leaf and glue expressions: constants, variable references, member
//! access, casts, the conditional operator and the comma sequence.

use crate::asm::{hex16, hex8, AsmText};
use crate::codegen::{bool_jumps, emit_code, emit_for_side_effects, EmitCtx};
use crate::diag::EmitError;
use crate::sema::tree;
use crate::types::BasicType;
use lang_mc::ast::{NodeId, NodeKind, Resolved};
use lang_mc::ops::StorageClass;

pub fn emit(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    match ctx.arena.kind(id) {
        NodeKind::WordConstant { value, .. } => {
            let value = *value;
            if l_value {
                return Err(ctx.internal(id, "constant has no address"));
            }
            if ctx.is_byte(id) {
                out.ins(
                    "LDB",
                    &format!("#{}", hex8(value as u8)),
                    &format!("decimal {}", value as u8),
                );
            } else {
                out.ins(
                    "LDD",
                    &format!("#{}", hex16(value)),
                    &format!("decimal {}", value),
                );
            }
            Ok(())
        }

        NodeKind::DWordConstant { value, .. } => {
            let value = *value;
            if !l_value {
                // does not fit in D
                return Err(ctx.internal(id, "cannot emit a 32-bit number as an r-value"));
            }
            let label = ctx.dword_label(value);
            out.ins(
                "LEAX",
                &format!("{},PCR", label),
                &format!("32-bit constant: {}", value),
            );
            Ok(())
        }

        NodeKind::RealConstant { value, .. } => {
            let value = *value;
            if !l_value {
                return Err(ctx.internal(id, "cannot emit a real number as an r-value"));
            }
            let label = ctx.real_label(value);
            out.ins(
                "LEAX",
                &format!("{},PCR", label),
                &format!("real constant: {}", value),
            );
            Ok(())
        }

        NodeKind::StringLiteral { value } => {
            let value = value.clone();
            let label = ctx.string_label(&value);
            out.ins("LEAX", &format!("{},PCR", label), "string literal");
            if !l_value {
                out.ins("TFR", "X,D", "");
            }
            Ok(())
        }

        NodeKind::Identifier { name, resolved } => {
            let name = name.clone();
            let resolved = resolved.clone();
            emit_identifier(ctx, out, id, &name, resolved, l_value)
        }

        NodeKind::ObjectMember { .. } => emit_object_member(ctx, out, id, l_value),

        NodeKind::Cast { .. } => emit_cast(ctx, out, id, l_value),

        NodeKind::Conditional { .. } => emit_conditional(ctx, out, id, l_value),

        NodeKind::Comma { exprs } => {
            let exprs = exprs.clone();
            // All sub-expressions run left to right; only the last one
            // produces the value.
            let (last, rest) = match exprs.split_last() {
                Some(x) => x,
                None => return Err(ctx.internal(id, "empty comma expression")),
            };
            for &sub in rest {
                emit_for_side_effects(ctx, out, sub)?;
            }
            emit_code(ctx, out, *last, l_value)
        }

        _ => Err(ctx.internal(id, "not an expression")),
    }
}

fn emit_identifier(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    name: &str,
    resolved: Option<Resolved>,
    l_value: bool,
) -> Result<(), EmitError> {
    match resolved {
        Some(Resolved::Variable(did)) => {
            let desc = ctx.desc(id).clone();
            let comment = name.to_string();
            if l_value || desc.base == BasicType::Array || desc.is_real_or_long()
                || desc.is_struct()
            {
                emit_variable_address(ctx, out, did, &comment);
                if !l_value && desc.base == BasicType::Array {
                    out.ins("TFR", "X,D", "address of array is its value");
                }
            } else if desc.base == BasicType::Byte {
                out.ins("LDB", &ctx.var_arg(did, 0), &comment);
            } else {
                out.ins("LDD", &ctx.var_arg(did, 0), &comment);
            }
            Ok(())
        }
        Some(Resolved::FunctionAddress(func)) => {
            let label = match ctx.functions.get(&func) {
                Some(info) => info.label.clone(),
                None => return Err(ctx.internal(id, "unknown function address")),
            };
            out.ins(
                "LEAX",
                &format!("{},PCR", label),
                &format!("address of {}()", func),
            );
            if !l_value {
                out.ins("TFR", "X,D", "");
            }
            Ok(())
        }
        Some(Resolved::FunctionName) => {
            let value = ctx.current_function.clone();
            let label = ctx.string_label(&value);
            out.ins("LEAX", &format!("{},PCR", label), "__FUNCTION__");
            if !l_value {
                out.ins("TFR", "X,D", "");
            }
            Ok(())
        }
        None => {
            // An enumerated name: its value is known at compile time.
            let value = ctx
                .types
                .enumerator_value(name)
                .ok_or_else(|| ctx.internal(id, "unresolved identifier in emission"))?;
            if l_value {
                return Err(ctx.internal(id, "enumerated name has no address"));
            }
            if ctx.is_byte(id) {
                out.ins("LDB", &format!("#{}", hex8(value as u8)), name);
            } else {
                out.ins("LDD", &format!("#{}", hex16(value)), name);
            }
            Ok(())
        }
    }
}

/// Leaves the address of a declared variable in X.
pub fn emit_variable_address(ctx: &EmitCtx<'_>, out: &mut AsmText, did: lang_mc::DeclId, comment: &str) {
    let d = ctx.decl(did);
    if d.storage == StorageClass::Auto {
        out.ins("LEAX", &d.frame_displacement_arg(0), comment);
    } else {
        let label = d.label.clone().unwrap_or_else(|| d.id.clone());
        out.ins("LEAX", &format!("{},PCR", label), comment);
    }
}

fn emit_object_member(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (object, member, direct) = match ctx.arena.kind(id) {
        NodeKind::ObjectMember {
            object,
            member,
            direct,
        } => (*object, member.clone(), *direct),
        _ => unreachable!(),
    };

    let class_name = if direct {
        ctx.desc(object).class_name.clone()
    } else {
        let p = ctx
            .desc(object)
            .pointed
            .ok_or_else(|| ctx.internal(id, "arrow on non-pointer"))?;
        ctx.types.get(p).class_name.clone()
    };
    let offset = ctx
        .types
        .member_offset(&class_name, &member)
        .ok_or_else(|| ctx.internal(id, "member offset on incomplete struct"))?;

    if direct {
        emit_code(ctx, out, object, true)?; // struct address in X
    } else {
        emit_code(ctx, out, object, false)?; // pointer value in D
        out.ins("TFR", "D,X", "");
        if ctx.options.null_pointer_checking {
            ctx.call_utility(out, "check_null_ptr_x", "");
        }
    }
    if offset != 0 {
        out.ins(
            "LEAX",
            &format!("{},X", offset),
            &format!("member {} of {}", member, class_name),
        );
    }

    if !l_value {
        let desc = ctx.desc(id);
        match desc.base {
            BasicType::Byte => out.ins("LDB", ",X", &format!("member {}", member)),
            BasicType::Word | BasicType::Pointer => {
                out.ins("LDD", ",X", &format!("member {}", member))
            }
            // Wide and aggregate r-values are their address in X.
            _ => {}
        }
    }
    Ok(())
}

fn emit_cast(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (target, sub) = match ctx.arena.kind(id) {
        NodeKind::Cast { target, expr } => (*target, *expr),
        _ => unreachable!(),
    };
    let cast_desc = ctx.types.get(target).clone();
    let sub_desc = ctx.desc(sub).clone();
    let cast_name = ctx.types.type_to_string(target);

    // real <-> long: both operands are addressed; the helper reads the
    // source through D and writes the destination through X.
    if (cast_desc.is_long() && sub_desc.is_real()) || (cast_desc.is_real() && sub_desc.is_long()) {
        emit_code(ctx, out, sub, true)?; // address of source number in X
        let temp = ctx
            .arena
            .get(id)
            .temp
            .ok_or_else(|| ctx.internal(id, "wide cast without temporary"))?;
        out.ins(
            "TFR",
            "X,D",
            &format!("cast to {}: address of source number in D", cast_name),
        );
        out.ins("LEAX", &ctx.var_arg(temp, 0), "destination of cast");
        if (cast_desc.is_long() && cast_desc.is_signed)
            || (cast_desc.is_real() && sub_desc.is_signed)
        {
            out.ins("ORCC", "#$01", "C=1 means signed");
        } else {
            out.ins("ANDCC", "#$FE", "C=0 means unsigned");
        }
        let name = if cast_desc.is_long() {
            format!(
                "initDWordFrom{}",
                if sub_desc.is_single() { "Single" } else { "Double" }
            )
        } else {
            format!(
                "init{}FromDWord",
                if cast_desc.is_single() { "Single" } else { "Double" }
            )
        };
        ctx.call_utility(out, &name, "");
        return Ok(());
    }

    // Integral from real or long.
    if cast_desc.is_integral() && !cast_desc.is_long() && sub_desc.is_real_or_long()
        || cast_desc.is_long() && sub_desc.is_long()
    {
        emit_code(ctx, out, sub, true)?; // address of real/long in X

        if cast_desc.is_long() && sub_desc.is_long() {
            return Ok(()); // same representation
        }

        out.ins(
            "TFR",
            "X,D",
            &format!("cast to {}: address of source number in D", cast_name),
        );
        let result_size = if cast_desc.base == BasicType::Byte { 1 } else { 2 };
        out.ins(
            "LEAS",
            &format!("-{},S", result_size),
            "result of cast",
        );
        out.ins("LEAX", ",S", "");
        let name = format!(
            "init{}{}From{}",
            if sub_desc.is_long() {
                ""
            } else if cast_desc.is_signed {
                "Signed"
            } else {
                "Unsigned"
            },
            if cast_desc.base == BasicType::Byte {
                "Byte"
            } else {
                "Word"
            },
            if sub_desc.is_long() {
                "DWord"
            } else if sub_desc.is_single() {
                "Single"
            } else {
                "Double"
            }
        );
        ctx.call_utility(out, &name, "");
        out.ins(
            "PULS",
            if result_size == 1 { "B" } else { "A,B" },
            "result of cast",
        );
        return Ok(());
    }

    // Real or long from byte or word.
    if cast_desc.is_real_or_long() && sub_desc.is_byte_or_word() {
        emit_code(ctx, out, sub, false)?; // integral in B or D
        if sub_desc.base == BasicType::Byte {
            out.ins(
                if sub_desc.is_signed { "SEX" } else { "CLRA" },
                "",
                "promote to word",
            );
        }
        let temp = ctx
            .arena
            .get(id)
            .temp
            .ok_or_else(|| ctx.internal(id, "wide cast without temporary"))?;
        out.ins("LEAX", &ctx.var_arg(temp, 0), "destination of cast");
        let name = format!(
            "init{}From{}Word",
            if cast_desc.is_long() {
                "DWord"
            } else if cast_desc.is_single() {
                "Single"
            } else {
                "Double"
            },
            if sub_desc.is_signed { "Signed" } else { "Unsigned" }
        );
        ctx.call_utility(out, &name, "");
        return Ok(());
    }

    // Width-preserving casts: emit the operand and extend a byte when
    // the target is 2 bytes wide.
    emit_code(ctx, out, sub, l_value)?;
    if l_value || cast_desc.base == BasicType::Void {
        return Ok(());
    }
    if sub_desc.base == BasicType::Byte && cast_desc.base != BasicType::Byte {
        out.ins(
            if sub_desc.is_signed { "SEX" } else { "CLRA" },
            "",
            "cast from byte",
        );
    }
    Ok(())
}

fn emit_conditional(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (cond, true_expr, false_expr) = match ctx.arena.kind(id) {
        NodeKind::Conditional {
            cond,
            true_expr,
            false_expr,
        } => (*cond, *true_expr, *false_expr),
        _ => unreachable!(),
    };

    // Wide results are delivered by address, so each arm is emitted as
    // an l-value and both leave the chosen address in X.
    let arm_l_value = l_value || ctx.is_real_or_long(id) || ctx.desc(id).is_struct();

    if let Some(value) = ctx.eval_const(cond) {
        let taken = if value != 0 { true_expr } else { false_expr };
        emit_code(ctx, out, taken, arm_l_value)?;
        widen_arm_if_needed(ctx, out, id, taken, arm_l_value);
        return Ok(());
    }

    let true_label = ctx.new_label();
    let false_label = ctx.new_label();
    let end_label = ctx.new_label();

    bool_jumps::emit_bool_jumps(ctx, out, cond, &true_label, &false_label)?;

    out.emit_label(&true_label, "conditional: true expression");
    emit_code(ctx, out, true_expr, arm_l_value)?;
    widen_arm_if_needed(ctx, out, id, true_expr, arm_l_value);
    out.ins("LBRA", &end_label, "");

    out.emit_label(&false_label, "conditional: false expression");
    emit_code(ctx, out, false_expr, arm_l_value)?;
    widen_arm_if_needed(ctx, out, id, false_expr, arm_l_value);

    out.emit_label(&end_label, "end of conditional");
    Ok(())
}

/// `cond ? byteExpr : wordExpr` needs the byte arm promoted so both
/// arms deliver the result type.
fn widen_arm_if_needed(
    ctx: &EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    arm: NodeId,
    arm_l_value: bool,
) {
    if arm_l_value {
        return;
    }
    if !ctx.is_byte(id) && ctx.is_byte(arm) {
        out.ins(
            tree::conv_to_word_ins(ctx.arena, ctx.types, arm),
            "",
            "promote byte to word",
        );
    }
}
