//! Function calls.
//!
//! Arguments are pushed in reverse declaration order. Structs go
//! through the push helpers, arrays by address, bytes promoted to
//! words; a prototyped parameter wider or narrower than the argument
//! converts on the fly. A function returning a struct, union, long or
//! real receives the address of a caller-allocated return slot as a
//! hidden first argument. After the call the caller pops everything it
//! pushed with one LEAS.

use crate::asm::AsmText;
use crate::codegen::{emit_code, emit_word_rvalue, EmitCtx};
use crate::diag::EmitError;
use crate::types::{BasicType, FunctionSignature};
use lang_mc::ast::{DeclId, NodeId, NodeKind, Resolved, TypeId};

/// How the callee is reached.
enum Callee {
    Direct(String),
    ThroughVariable(DeclId),
    Computed(NodeId),
}

pub fn emit(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (callee_node, args, func_ptr_var) = match ctx.arena.kind(id) {
        NodeKind::FunctionCall {
            callee,
            args,
            func_ptr_var,
        } => (*callee, args.clone(), *func_ptr_var),
        _ => unreachable!("call emitter on non-call node"),
    };

    let (callee, signature) = resolve_callee(ctx, id, callee_node, func_ptr_var)?;

    let return_desc = ctx.types.get(signature.return_type).clone();
    let returns_aggregate = return_desc.base == BasicType::Class;
    let hidden_in_reg = signature.first_param_in_reg && returns_aggregate;
    let first_visible_in_reg =
        signature.first_param_in_reg && !returns_aggregate && !args.is_empty();

    let mut bytes_pushed: u16 = 0;

    // Push the arguments, last one first. Under the first-param-in-
    // register convention the first actual argument travels in D and
    // is evaluated after every push, so that nothing clobbers it.
    let pushed_args: &[NodeId] = if first_visible_in_reg {
        &args[1..]
    } else {
        &args
    };
    for (index, &arg) in pushed_args.iter().enumerate().rev() {
        let param_index = index + if first_visible_in_reg { 1 } else { 0 };
        let param = signature.params.get(param_index).copied();
        bytes_pushed += emit_argument_push(ctx, out, arg, param)?;
    }

    // Hidden return-slot argument.
    if returns_aggregate {
        let temp = ctx
            .arena
            .get(id)
            .temp
            .ok_or_else(|| ctx.internal(id, "aggregate return without a return slot"))?;
        out.ins("LEAX", &ctx.var_arg(temp, 0), "address of return slot");
        if hidden_in_reg {
            out.ins("TFR", "X,D", "hidden argument in D");
        } else {
            out.ins("PSHS", "X", "hidden argument");
            bytes_pushed += 2;
        }
    } else if first_visible_in_reg {
        // First visible argument in D (or B for a byte parameter).
        let arg = args[0];
        let param = signature.params.first().copied();
        emit_register_argument(ctx, out, arg, param)?;
    }

    match callee {
        Callee::Direct(name) => {
            let label = ctx.functions[&name].label.clone();
            out.ins("LBSR", &label, &format!("call {}()", name));
        }
        Callee::ThroughVariable(did) => {
            let d = ctx.decl(did);
            if d.frame_displacement.is_some() {
                let arg = format!("[{}]", d.frame_displacement_arg(0));
                out.ins("JSR", &arg, "call through function pointer");
            } else {
                let arg = d.frame_displacement_arg(0);
                out.ins("LDX", &arg, "function pointer");
                out.ins("JSR", ",X", "call through function pointer");
            }
        }
        Callee::Computed(node) => {
            emit_code(ctx, out, node, false)?; // function address in D
            out.ins("TFR", "D,X", "");
            out.ins("JSR", ",X", "call through computed address");
        }
    }

    if bytes_pushed > 0 {
        out.ins(
            "LEAS",
            &format!("{},S", bytes_pushed),
            "pop call arguments",
        );
    }

    // Deliver the return value.
    if returns_aggregate {
        let temp = ctx.arena.get(id).temp.expect("checked above");
        out.ins("LEAX", &ctx.var_arg(temp, 0), "returned value");
        return Ok(());
    }
    if l_value {
        return Err(ctx.internal(id, "function result has no address"));
    }
    Ok(()) // value already in B or D per the return type
}

fn resolve_callee(
    ctx: &EmitCtx<'_>,
    id: NodeId,
    callee_node: NodeId,
    func_ptr_var: Option<DeclId>,
) -> Result<(Callee, FunctionSignature), EmitError> {
    if let Some(did) = func_ptr_var {
        let sig = signature_of_type(ctx, ctx.decl(did).decl_type)
            .ok_or_else(|| ctx.internal(id, "call through non-function pointer"))?;
        return Ok((Callee::ThroughVariable(did), sig));
    }
    if let NodeKind::Identifier {
        name,
        resolved: Some(Resolved::FunctionAddress(_)),
    } = ctx.arena.kind(callee_node)
    {
        if let Some(info) = ctx.functions.get(name) {
            let sig = ctx
                .types
                .get(info.func_type)
                .signature
                .clone()
                .expect("function type without signature");
            return Ok((Callee::Direct(name.clone()), sig));
        }
    }
    let sig = signature_of_type(ctx, ctx.ty(callee_node))
        .ok_or_else(|| ctx.internal(id, "call through expression of non-function type"))?;
    Ok((Callee::Computed(callee_node), sig))
}

fn signature_of_type(ctx: &EmitCtx<'_>, mut ty: TypeId) -> Option<FunctionSignature> {
    let mut desc = ctx.types.get(ty);
    if desc.base == BasicType::Pointer {
        ty = desc.pointed?;
        desc = ctx.types.get(ty);
    }
    if desc.base == BasicType::Function {
        desc.signature.clone()
    } else {
        None
    }
}

/// Pushes one stack argument; returns the number of bytes pushed.
fn emit_argument_push(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    arg: NodeId,
    param: Option<TypeId>,
) -> Result<u16, EmitError> {
    let arg_desc = ctx.desc(arg).clone();
    let param_desc = param.map(|p| ctx.types.get(p).clone());

    // Arrays are passed by address.
    if arg_desc.base == BasicType::Array {
        emit_code(ctx, out, arg, true)?;
        out.ins("PSHS", "X", "array argument, by address");
        return Ok(2);
    }

    // A short integral where the callee expects a real or long:
    // convert into a stack slot.
    if let Some(pd) = &param_desc {
        if pd.is_real_or_long() && arg_desc.is_byte_or_word() {
            let size = ctx.types.size_of(param.unwrap()).unwrap_or(4);
            emit_word_rvalue(ctx, out, arg)?;
            out.ins("LEAS", &format!("-{},S", size), "widened argument slot");
            out.ins("LEAX", ",S", "");
            let name = format!(
                "init{}From{}Word",
                if pd.is_long() {
                    "DWord"
                } else if pd.is_single() {
                    "Single"
                } else {
                    "Double"
                },
                if arg_desc.is_signed { "Signed" } else { "Unsigned" }
            );
            ctx.call_utility(out, &name, "");
            return Ok(size);
        }
        // A real where the callee expects a short integral.
        if pd.is_byte_or_word() && arg_desc.is_real() {
            emit_code(ctx, out, arg, true)?; // address of real in X
            out.ins("TFR", "X,D", "address of real argument");
            out.ins("LEAS", "-2,S", "narrowed argument slot");
            if pd.base == BasicType::Byte {
                out.ins("CLR", ",S", "padding byte");
                out.ins("LEAX", "1,S", "");
            } else {
                out.ins("LEAX", ",S", "");
            }
            let name = format!(
                "init{}{}From{}",
                if pd.is_signed { "Signed" } else { "Unsigned" },
                if pd.base == BasicType::Byte { "Byte" } else { "Word" },
                if arg_desc.is_single() { "Single" } else { "Double" }
            );
            ctx.call_utility(out, &name, "");
            return Ok(2);
        }
        // A long where the callee expects a short integral: pass the
        // low word.
        if pd.is_byte_or_word() && arg_desc.is_long() {
            emit_code(ctx, out, arg, true)?;
            out.ins("LDD", "2,X", "low word of long argument");
            out.ins("PSHS", "B,A", "");
            return Ok(2);
        }
    }

    // Structs, reals and longs passed by value are copied onto the
    // stack by the push helpers; a 1-byte struct is padded to 2.
    if arg_desc.base == BasicType::Class {
        let size = ctx
            .types
            .size_of(ctx.ty(arg))
            .ok_or_else(|| ctx.internal(arg, "passing incomplete struct by value"))?;
        emit_code(ctx, out, arg, true)?; // address of value in X
        match size {
            4 => ctx.call_utility(out, "push4ByteStruct", "push argument by value"),
            5 => ctx.call_utility(out, "push5ByteStruct", "push argument by value"),
            _ => {
                out.ins("LDD", &format!("#{}", size), "struct size");
                ctx.call_utility(out, "pushStruct", "push argument by value");
            }
        }
        return Ok(size.max(2));
    }

    // Default: a word on the stack, bytes promoted.
    emit_word_rvalue(ctx, out, arg)?;
    out.ins("PSHS", "B,A", "argument");
    Ok(2)
}

/// The first visible argument of a first-param-in-register call:
/// loaded into B or D, never pushed.
fn emit_register_argument(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    arg: NodeId,
    param: Option<TypeId>,
) -> Result<(), EmitError> {
    let byte_param = param
        .map(|p| ctx.types.get(p).base == BasicType::Byte)
        .unwrap_or(false);
    if byte_param {
        // A word argument for a byte parameter leaves its low byte in
        // B, which is what the callee spills.
        emit_code(ctx, out, arg, false)
    } else {
        emit_word_rvalue(ctx, out, arg)
    }
}
