//! Statements: compounds, control flow, jumps, local declarations and
//! inline assembly.

use crate::asm::AsmText;
use crate::asm_stmt;
use crate::codegen::{bool_jumps, emit_code, emit_for_side_effects, emit_word_rvalue, EmitCtx};
use crate::diag::EmitError;
use crate::sema::tree;
use crate::tranunit::BreakableLabels;
use crate::types::BasicType;
use lang_mc::ast::{DeclId, NodeId, NodeKind, StmtLabel, TypeId};
use lang_mc::ops::JumpKind;

pub fn emit(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let pushed_scope = ctx.arena.get(id).scope;
    if let Some(scope) = pushed_scope {
        ctx.scope_stack.push(scope);
    }
    let result = emit_inner(ctx, out, id);
    if pushed_scope.is_some() {
        ctx.scope_stack.pop();
    }
    result
}

fn emit_inner(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    match ctx.arena.kind(id) {
        NodeKind::Compound { stmts } => {
            let stmts = stmts.clone();
            for stmt in stmts {
                emit_statement_or_expression(ctx, out, stmt)?;
            }
            Ok(())
        }
        NodeKind::If { .. } => emit_if(ctx, out, id),
        NodeKind::While { .. } => emit_while(ctx, out, id),
        NodeKind::For { .. } => emit_for(ctx, out, id),
        NodeKind::Switch { .. } => emit_switch(ctx, out, id),
        NodeKind::Labeled { .. } => emit_labeled(ctx, out, id),
        NodeKind::Jump { .. } => emit_jump(ctx, out, id),
        NodeKind::InlineAsm { text } => {
            let text = text.clone();
            let scope = *ctx.scope_stack.last().expect("scope stack never empty");
            out.emit_comment("inline assembly");
            let resolved = asm_stmt::resolve_variable_references(&text, scope, ctx.scopes);
            out.emit_inline_assembly(&resolved);
            Ok(())
        }
        NodeKind::DeclarationSeq { decls } => {
            let decls = decls.clone();
            for d in decls {
                emit_code(ctx, out, d, false)?;
            }
            Ok(())
        }
        NodeKind::VarDecl { .. } => emit_local_declaration(ctx, out, id),
        NodeKind::Pragma { .. } => Ok(()), // consumed by the driver
        _ => Err(ctx.internal(id, "not a statement")),
    }
}

/// An expression in statement position runs for its side effects.
fn emit_statement_or_expression(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
) -> Result<(), EmitError> {
    if ctx.arena.ty(id).is_some() {
        ctx.line_comment(out, id, "expression statement");
        emit_for_side_effects(ctx, out, id)
    } else {
        emit_code(ctx, out, id, false)
    }
}

fn emit_if(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let (cond, consequence, alternative) = match ctx.arena.kind(id) {
        NodeKind::If {
            cond,
            consequence,
            alternative,
        } => (*cond, *consequence, *alternative),
        _ => unreachable!(),
    };

    // A constant condition drops the dead arm entirely.
    if let Some(value) = ctx.eval_const(cond) {
        if value != 0 {
            return emit_code(ctx, out, consequence, false);
        }
        if let Some(alt) = alternative {
            return emit_code(ctx, out, alt, false);
        }
        return Ok(());
    }

    let then_label = ctx.new_label();
    let else_label = ctx.new_label();

    ctx.line_comment(out, cond, "if");
    bool_jumps::emit_bool_jumps(ctx, out, cond, &then_label, &else_label)?;

    out.emit_label(&then_label, "then");
    emit_code(ctx, out, consequence, false)?;

    let endif_label = ctx.new_label();
    if alternative.is_some() {
        out.ins("LBRA", &endif_label, "jump over else clause");
    }
    out.emit_label(&else_label, "else");
    if let Some(alt) = alternative {
        emit_code(ctx, out, alt, false)?;
    }
    out.emit_label(&endif_label, "end if");
    Ok(())
}

/// `while` evaluates its condition after the body, saving one branch
/// per iteration; `do-while` just leaves out the initial jump to the
/// condition.
fn emit_while(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let (cond, body, is_do) = match ctx.arena.kind(id) {
        NodeKind::While { cond, body, is_do } => (*cond, *body, *is_do),
        _ => unreachable!(),
    };
    let stmt_name = if is_do { "do-while" } else { "while" };

    let always_false = tree::is_expression_always_false(ctx.arena, ctx.types, cond);
    let always_true = tree::is_expression_always_true(ctx.arena, ctx.types, cond);

    let body_label = ctx.new_label();
    let condition_label = ctx.new_label();
    let end_label = ctx.new_label();

    ctx.breakables.push(BreakableLabels {
        break_label: end_label.clone(),
        continue_label: condition_label.clone(),
    });

    if is_do || !always_false {
        ctx.line_comment(out, cond, stmt_name);
        if !is_do {
            out.ins(
                "LBRA",
                &condition_label,
                &format!("jump to {} condition", stmt_name),
            );
        }
        out.emit_label(&body_label, &format!("{} body", stmt_name));
        emit_code(ctx, out, body, false)?;
    }

    if !always_false {
        out.emit_label(&condition_label, &format!("{} condition", stmt_name));
        if always_true {
            out.ins(
                "LBRA",
                &body_label,
                &format!("go to start of {} body", stmt_name),
            );
        } else {
            bool_jumps::emit_bool_jumps(ctx, out, cond, &body_label, &end_label)?;
        }
    }

    out.emit_label(&end_label, &format!("end of {}", stmt_name));
    ctx.breakables.pop();
    Ok(())
}

/// `for` is a `while` with the initialization in front and the step
/// between the body and the condition; `continue` jumps to the step.
fn emit_for(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let (init, cond, step, body) = match ctx.arena.kind(id) {
        NodeKind::For {
            init,
            cond,
            step,
            body,
        } => (*init, *cond, *step, *body),
        _ => unreachable!(),
    };

    let body_label = ctx.new_label();
    let step_label = ctx.new_label();
    let condition_label = ctx.new_label();
    let end_label = ctx.new_label();

    if let Some(init) = init {
        ctx.line_comment(out, init, "for init");
        emit_statement_or_expression(ctx, out, init)?;
    }

    ctx.breakables.push(BreakableLabels {
        break_label: end_label.clone(),
        continue_label: step_label.clone(),
    });

    out.ins("LBRA", &condition_label, "jump to for condition");
    out.emit_label(&body_label, "for body");
    emit_code(ctx, out, body, false)?;

    out.emit_label(&step_label, "for step");
    if let Some(step) = step {
        emit_for_side_effects(ctx, out, step)?;
    }

    out.emit_label(&condition_label, "for condition");
    match cond {
        None => out.ins("LBRA", &body_label, "no condition: loop"),
        Some(cond) => {
            if tree::is_expression_always_true(ctx.arena, ctx.types, cond) {
                out.ins("LBRA", &body_label, "condition always true");
            } else {
                bool_jumps::emit_bool_jumps(ctx, out, cond, &body_label, &end_label)?;
            }
        }
    }

    out.emit_label(&end_label, "end of for");
    ctx.breakables.pop();
    Ok(())
}

/// `switch` lowers to a ladder of comparisons against each case
/// value, then a jump to the default (or past the switch).
fn emit_switch(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let (expr, body) = match ctx.arena.kind(id) {
        NodeKind::Switch { expr, body } => (*expr, *body),
        _ => unreachable!(),
    };
    let end_label = ctx.new_label();

    // Find the case and default statements of this switch (not of a
    // nested one) and give each a label.
    let mut cases: Vec<(NodeId, Option<NodeId>)> = Vec::new(); // (labeled stmt, case expr)
    collect_cases(ctx, body, &mut cases);
    let mut default_label: Option<String> = None;
    let mut comparisons: Vec<(u16, String)> = Vec::new();
    for &(stmt, case_expr) in &cases {
        let label = ctx.new_label();
        ctx.case_labels.insert(stmt, label.clone());
        match case_expr {
            Some(e) => {
                let value = match ctx.eval_const(e) {
                    Some(v) => v,
                    None => {
                        let loc = ctx.arena.loc(e);
                        ctx.diags
                            .error(&loc, "case label is not a constant expression");
                        continue;
                    }
                };
                comparisons.push((value, label));
            }
            None => default_label = Some(label),
        }
    }

    ctx.line_comment(out, expr, "switch");
    emit_word_rvalue(ctx, out, expr)?;
    for (value, label) in &comparisons {
        out.emit_cmpd_immediate(*value, &format!("case {}", value));
        out.ins("LBEQ", label, "");
    }
    out.ins(
        "LBRA",
        default_label.as_deref().unwrap_or(&end_label),
        "no case matched",
    );

    ctx.breakables.push(BreakableLabels {
        break_label: end_label.clone(),
        continue_label: String::new(), // continue is an error in a switch
    });
    emit_code(ctx, out, body, false)?;
    ctx.breakables.pop();

    out.emit_label(&end_label, "end of switch");
    Ok(())
}

/// The case/default statements belonging to one switch body, nested
/// compounds included but nested switches excluded.
fn collect_cases(ctx: &EmitCtx<'_>, id: NodeId, out: &mut Vec<(NodeId, Option<NodeId>)>) {
    match ctx.arena.kind(id) {
        NodeKind::Switch { .. } => {} // its cases are its own
        NodeKind::Labeled { label, stmt } => {
            match label {
                StmtLabel::Case(value) => out.push((id, Some(*value))),
                StmtLabel::Default => out.push((id, None)),
                StmtLabel::Id(_) => {}
            }
            collect_cases(ctx, *stmt, out);
        }
        _ => {
            for child in ctx.arena.children(id) {
                collect_cases(ctx, child, out);
            }
        }
    }
}

fn emit_labeled(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let (label, stmt) = match ctx.arena.kind(id) {
        NodeKind::Labeled { label, stmt } => (label.clone(), *stmt),
        _ => unreachable!(),
    };
    match label {
        StmtLabel::Case(_) | StmtLabel::Default => {
            let asm_label = ctx
                .case_labels
                .get(&id)
                .cloned()
                .ok_or_else(|| ctx.internal(id, "case label outside of a switch"))?;
            out.emit_label(&asm_label, "case");
        }
        StmtLabel::Id(name) => {
            let asm_label = ctx
                .current_fn()
                .goto_labels
                .get(&name)
                .cloned()
                .ok_or_else(|| ctx.internal(id, "labeled statement without an assembler label"))?;
            out.emit_label(&asm_label, &name);
        }
    }
    emit_code(ctx, out, stmt, false)
}

fn emit_jump(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> Result<(), EmitError> {
    let (kind, arg, target) = match ctx.arena.kind(id) {
        NodeKind::Jump { kind, arg, target } => (*kind, *arg, target.clone()),
        _ => unreachable!(),
    };
    match kind {
        JumpKind::Break | JumpKind::Continue => {
            let what = if kind == JumpKind::Break {
                "break"
            } else {
                "continue"
            };
            let labels = match ctx.breakables.last() {
                Some(l) => l.clone(),
                None => {
                    let loc = ctx.arena.loc(id);
                    ctx.diags
                        .error(&loc, format!("{} outside of a breakable statement", what));
                    return Ok(());
                }
            };
            if kind == JumpKind::Continue && labels.continue_label.is_empty() {
                let loc = ctx.arena.loc(id);
                ctx.diags
                    .error(&loc, "continue statement is not supported in a switch");
                return Ok(());
            }
            out.ins(
                "LBRA",
                if kind == JumpKind::Break {
                    &labels.break_label
                } else {
                    &labels.continue_label
                },
                what,
            );
            Ok(())
        }
        JumpKind::Goto => {
            let target = target.ok_or_else(|| ctx.internal(id, "goto without target"))?;
            let asm_label = ctx
                .current_fn()
                .goto_labels
                .get(&target)
                .cloned()
                .ok_or_else(|| ctx.internal(id, "goto to unknown label"))?;
            out.ins("LBRA", &asm_label, &format!("goto {}", target));
            Ok(())
        }
        JumpKind::Return => emit_return(ctx, out, id, arg),
    }
}

/// Delivers the returned value per the callee ABI, then jumps to the
/// function's end label where the epilogue runs.
fn emit_return(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    arg: Option<NodeId>,
) -> Result<(), EmitError> {
    ctx.line_comment(out, id, "return");
    let end_label = ctx.function_end_label.clone();

    let arg = match arg {
        Some(a) => a,
        None => {
            out.ins("LBRA", &end_label, "return");
            return Ok(());
        }
    };

    let info = ctx.current_fn();
    let ret_type = ctx
        .types
        .get(info.func_type)
        .signature
        .as_ref()
        .map(|s| s.return_type)
        .ok_or_else(|| ctx.internal(id, "function without signature"))?;
    let hidden = info.hidden_param;
    let ret_desc = ctx.types.get(ret_type).clone();

    if ret_desc.base != BasicType::Class {
        // Narrow return: value in B or D.
        emit_code(ctx, out, arg, false)?;
        if ret_desc.base != BasicType::Byte && ctx.is_byte(arg) {
            out.ins(
                tree::conv_to_word_ins(ctx.arena, ctx.types, arg),
                "",
                "promote returned byte",
            );
        }
        out.ins("LBRA", &end_label, "return");
        return Ok(());
    }

    // Aggregate return: write through the hidden return-slot pointer.
    let hidden = hidden.ok_or_else(|| ctx.internal(id, "aggregate return without hidden parameter"))?;
    let hidden_arg = ctx.var_arg(hidden, 0);
    let arg_desc = ctx.desc(arg).clone();

    if ret_desc.is_long() && arg_desc.is_long() {
        emit_code(ctx, out, arg, true)?; // address of long in X
        out.ins("LDD", &hidden_arg, "address of return value");
        ctx.call_utility(out, "copyDWordFromXToD", "");
    } else if ret_desc.is_long() && arg_desc.is_byte_or_word() {
        emit_word_rvalue(ctx, out, arg)?;
        out.ins("LDX", &hidden_arg, "address of return value");
        let name = format!(
            "initDWordFrom{}Word",
            if tree::is_signed(ctx.arena, ctx.types, arg) {
                "Signed"
            } else {
                "Unsigned"
            }
        );
        ctx.call_utility(out, &name, "");
    } else if ret_desc.is_real() && arg_desc.is_real() {
        emit_code(ctx, out, arg, true)?;
        out.ins("TFR", "X,D", "address of returned value");
        out.ins("LDX", &hidden_arg, "address of return value");
        ctx.call_utility(
            out,
            if ret_desc.is_single() {
                "copySingle"
            } else {
                "copyDouble"
            },
            "",
        );
    } else if ret_desc.is_real() && arg_desc.is_byte_or_word() {
        emit_word_rvalue(ctx, out, arg)?;
        out.ins("LDX", &hidden_arg, "address of return value");
        let name = format!(
            "init{}From{}Word",
            if ret_desc.is_single() { "Single" } else { "Double" },
            if tree::is_signed(ctx.arena, ctx.types, arg) {
                "Signed"
            } else {
                "Unsigned"
            }
        );
        ctx.call_utility(out, &name, "");
    } else if ret_desc.is_struct() {
        let size = ctx
            .types
            .size_of(ret_type)
            .ok_or_else(|| ctx.internal(id, "returning incomplete struct"))?;
        emit_code(ctx, out, arg, true)?; // address of struct in X
        if size == 4 {
            out.ins("TFR", "X,D", "address of returned value");
            out.ins("LDX", &hidden_arg, "address of return value");
            ctx.call_utility(out, "copyDWord", "");
        } else {
            out.ins("LDD", &format!("#{}", size), "byte count");
            out.ins("PSHS", "B,A", "");
            out.ins("PSHS", "X", "source");
            out.ins("LDX", &hidden_arg, "address of return value");
            out.ins("PSHS", "X", "destination");
            ctx.call_utility(out, "_memcpy", "");
            out.ins("LEAS", "6,S", "");
        }
    } else {
        return Err(ctx.internal(id, "unsupported return conversion"));
    }

    out.ins("LBRA", &end_label, "return");
    Ok(())
}

// ----- local declarations -----

fn emit_local_declaration(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
) -> Result<(), EmitError> {
    let (did, init) = match ctx.arena.kind(id) {
        NodeKind::VarDecl { decl, init, .. } => (*decl, *init),
        _ => unreachable!(),
    };
    let did = match did {
        Some(d) => d,
        None => return Ok(()), // declaration failed; diagnosed already
    };
    // Static-duration locals are initialized in the data section.
    if !ctx.decl(did).is_frame_resident() {
        return Ok(());
    }
    let init = match init {
        Some(i) => i,
        None => return Ok(()),
    };

    let name = ctx.decl(did).id.clone();
    ctx.line_comment(out, id, &format!("init of {}", name));

    let decl_type = ctx.decl(did).decl_type;
    match ctx.arena.kind(init) {
        NodeKind::InitializerList { exprs } => {
            let exprs = exprs.clone();
            emit_aggregate_init(ctx, out, id, did, decl_type, &exprs)
        }
        NodeKind::StringLiteral { value } => {
            // char a[] = "text": copy the pooled literal into the
            // frame.
            let value = value.clone();
            let size = ctx
                .types
                .size_of(decl_type)
                .ok_or_else(|| ctx.internal(id, "string initializer for incomplete array"))?;
            let label = ctx.string_label(&value);
            out.ins("LDD", &format!("#{}", size), "byte count");
            out.ins("PSHS", "B,A", "");
            out.ins("LEAX", &format!("{},PCR", label), "string literal");
            out.ins("PSHS", "X", "source");
            out.ins("LEAX", &ctx.var_arg(did, 0), &name);
            out.ins("PSHS", "X", "destination");
            ctx.call_utility(out, "_memcpy", "");
            out.ins("LEAS", "6,S", "");
            Ok(())
        }
        _ => emit_scalar_init(ctx, out, did, 0, decl_type, init),
    }
}

/// One scalar store into `target + offset`.
fn emit_scalar_init(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    did: DeclId,
    offset: i16,
    target_type: TypeId,
    init: NodeId,
) -> Result<(), EmitError> {
    let td = ctx.types.get(target_type).clone();
    let init_desc = ctx.desc(init).clone();

    if td.is_real_or_long() {
        if init_desc.is_real_or_long() {
            emit_code(ctx, out, init, true)?; // source address in X
            out.ins("TFR", "X,D", "source of copy");
            out.ins("LEAX", &ctx.var_arg(did, offset), "initialized variable");
            let variant = if td.is_long() {
                "DWord"
            } else if td.is_single() {
                "Single"
            } else {
                "Double"
            };
            ctx.call_utility(out, &format!("copy{}", variant), "");
        } else {
            emit_word_rvalue(ctx, out, init)?;
            out.ins("LEAX", &ctx.var_arg(did, offset), "initialized variable");
            let name = format!(
                "init{}From{}Word",
                if td.is_long() {
                    "DWord"
                } else if td.is_single() {
                    "Single"
                } else {
                    "Double"
                },
                if init_desc.is_signed { "Signed" } else { "Unsigned" }
            );
            ctx.call_utility(out, &name, "");
        }
        return Ok(());
    }

    if td.base == BasicType::Byte {
        emit_code(ctx, out, init, false)?;
        out.ins("STB", &ctx.var_arg(did, offset), "initializer");
    } else {
        emit_word_rvalue(ctx, out, init)?;
        out.ins("STD", &ctx.var_arg(did, offset), "initializer");
    }
    Ok(())
}

/// Brace-initialized local array or struct: element-wise stores.
fn emit_aggregate_init(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    did: DeclId,
    decl_type: TypeId,
    exprs: &[NodeId],
) -> Result<(), EmitError> {
    let td = ctx.types.get(decl_type).clone();
    match td.base {
        BasicType::Array => {
            let elem = td.pointed.expect("array without element type");
            let elem_size = ctx
                .types
                .size_of(elem)
                .ok_or_else(|| ctx.internal(id, "array of incomplete element type"))? as i16;
            for (i, &e) in exprs.iter().enumerate() {
                if let NodeKind::InitializerList { exprs: inner } = ctx.arena.kind(e) {
                    // Nested rows are laid out contiguously.
                    let inner = inner.clone();
                    let row = RowTarget {
                        did,
                        offset: i as i16 * elem_size,
                    };
                    emit_nested_row(ctx, out, id, row, elem, &inner)?;
                } else {
                    emit_scalar_init(ctx, out, did, i as i16 * elem_size, elem, e)?;
                }
            }
            Ok(())
        }
        BasicType::Class if td.is_struct() => {
            let def = ctx
                .types
                .class_def(&td.class_name)
                .cloned()
                .ok_or_else(|| ctx.internal(id, "initializer for incomplete struct"))?;
            for (member, &e) in def.members.iter().zip(exprs.iter()) {
                let offset = ctx
                    .types
                    .member_offset(&td.class_name, &member.name)
                    .unwrap_or(0) as i16;
                emit_scalar_init(ctx, out, did, offset, member.member_type, e)?;
            }
            Ok(())
        }
        _ => {
            // A scalar wrapped in braces.
            match exprs {
                [single] => emit_scalar_init(ctx, out, did, 0, decl_type, *single),
                _ => Err(ctx.internal(id, "braced initializer for scalar")),
            }
        }
    }
}

struct RowTarget {
    did: DeclId,
    offset: i16,
}

fn emit_nested_row(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    row: RowTarget,
    row_type: TypeId,
    exprs: &[NodeId],
) -> Result<(), EmitError> {
    let td = ctx.types.get(row_type).clone();
    if td.base != BasicType::Array {
        return Err(ctx.internal(id, "nested initializer for non-array"));
    }
    let elem = td.pointed.expect("array without element type");
    let elem_size = ctx
        .types
        .size_of(elem)
        .ok_or_else(|| ctx.internal(id, "array of incomplete element type"))? as i16;
    for (i, &e) in exprs.iter().enumerate() {
        emit_scalar_init(ctx, out, row.did, row.offset + i as i16 * elem_size, elem, e)?;
    }
    Ok(())
}
