//! Code generation for the 6809.
//!
//! One emitter function per concern, all dispatching on the node tag.
//! The public contract, shared by every expression emitter:
//!
//! - `l_value == true`: on success, register X holds the address of
//!   the result (aggregate, real and long values included).
//! - `l_value == false`: on success, the result is in B (byte), in D
//!   (word or pointer; an array yields its address in D), or at the
//!   address in X for real, long and struct values.
//!
//! Statements ignore `l_value`. An `Err` is an internal error, i.e. a
//! compiler bug, not a user diagnostic; user problems were reported
//! by the semantic passes.

pub mod assign;
pub mod binary;
pub mod bool_jumps;
pub mod call;
pub mod data;
pub mod expr;
pub mod stmt;
pub mod unary;

use crate::asm::{hex16, AsmText};
use crate::diag::{Diagnostics, EmitError};
use crate::options::CompilerOptions;
use crate::pragma::PragmaState;
use crate::scope::{Declaration, ScopeArena};
use crate::sema::const_eval::evaluate_constant_expr;
use crate::sema::tree;
use crate::tranunit::{BreakableLabels, FunctionInfo, LabelGenerator, TranslationUnit};
use crate::types::{TypeDesc, TypeManager};
use indexmap::IndexMap;
use lang_mc::ast::{DeclId, NodeArena, NodeId, NodeKind, TypeId};
use std::collections::BTreeSet;

/// Everything the emitters need. The tree, the types and the scopes
/// are frozen by the time emission runs; the mutable parts are the
/// output-side state: labels, pooled constants, diagnostics, the
/// needed-utilities set and the per-function label stacks.
pub struct EmitCtx<'a> {
    pub arena: &'a NodeArena,
    pub types: &'a TypeManager,
    pub scopes: &'a ScopeArena,
    pub options: &'a CompilerOptions,
    pub functions: &'a IndexMap<String, FunctionInfo>,
    pub pragmas: &'a PragmaState,
    pub diags: &'a mut Diagnostics,
    pub labels: &'a mut LabelGenerator,
    pub utilities: &'a mut BTreeSet<String>,
    pub string_literals: &'a mut IndexMap<String, String>,
    pub dword_constants: &'a mut IndexMap<u32, String>,
    pub real_constants: &'a mut IndexMap<u64, (f64, String)>,
    pub breakables: Vec<BreakableLabels>,
    pub current_function: String,
    pub function_end_label: String,
    /// Innermost scope at the statement being emitted; used by the
    /// inline-assembly `:VAR` resolution.
    pub scope_stack: Vec<lang_mc::ast::ScopeId>,
    /// Assembler label for each `case`/`default` statement, assigned
    /// when the enclosing `switch` scans its body.
    pub case_labels: std::collections::HashMap<NodeId, String>,
}

impl<'a> EmitCtx<'a> {
    pub fn ty(&self, id: NodeId) -> TypeId {
        tree::type_of(self.arena, id)
    }

    pub fn desc(&self, id: NodeId) -> &TypeDesc {
        tree::desc(self.arena, self.types, id)
    }

    pub fn size(&self, id: NodeId) -> u16 {
        tree::type_size(self.arena, self.types, id).unwrap_or(0)
    }

    pub fn is_byte(&self, id: NodeId) -> bool {
        self.desc(id).base == crate::types::BasicType::Byte
    }

    pub fn is_real_or_long(&self, id: NodeId) -> bool {
        self.desc(id).is_real_or_long()
    }

    pub fn eval_const(&self, id: NodeId) -> Option<u16> {
        evaluate_constant_expr(self.arena, self.types, id)
    }

    pub fn new_label(&mut self) -> String {
        self.labels.generate('L')
    }

    pub fn decl(&self, did: DeclId) -> &Declaration {
        self.scopes.decl(did)
    }

    /// Operand text for a declaration plus constant offset.
    pub fn var_arg(&self, did: DeclId, offset: i16) -> String {
        self.decl(did).frame_displacement_arg(offset)
    }

    pub fn current_fn(&self) -> &FunctionInfo {
        &self.functions[&self.current_function]
    }

    /// Calls a runtime helper and remembers that its body will be
    /// needed at assembly time.
    pub fn call_utility(&mut self, out: &mut AsmText, name: &str, comment: &str) {
        self.utilities.insert(name.to_string());
        out.ins("LBSR", name, comment);
    }

    pub fn internal(&self, id: NodeId, message: impl Into<String>) -> EmitError {
        EmitError::new(&self.arena.loc(id), message)
    }

    pub fn string_label(&mut self, value: &str) -> String {
        if let Some(label) = self.string_literals.get(value) {
            return label.clone();
        }
        let label = self.labels.generate('S');
        self.string_literals
            .insert(value.to_string(), label.clone());
        label
    }

    pub fn dword_label(&mut self, value: u32) -> String {
        if let Some(label) = self.dword_constants.get(&value) {
            return label.clone();
        }
        let label = self.labels.generate('D');
        self.dword_constants.insert(value, label.clone());
        label
    }

    pub fn real_label(&mut self, value: f64) -> String {
        let key = value.to_bits();
        if let Some((_, label)) = self.real_constants.get(&key) {
            return label.clone();
        }
        let label = self.labels.generate('F');
        self.real_constants.insert(key, (value, label.clone()));
        label
    }

    /// `; <file>:<line>: <what>` marker above a statement's code.
    pub fn line_comment(&self, out: &mut AsmText, id: NodeId, what: &str) {
        let loc = self.arena.loc(id);
        if !loc.is_none() {
            out.emit_comment(&format!("{}: {}", loc, what));
        }
    }
}

/// Emits the whole unit: code for every (non-suppressed) function,
/// then the data sections and the list of imported runtime helpers.
pub fn emit_translation_unit(tu: &mut TranslationUnit, out: &mut AsmText) -> Result<(), EmitError> {
    if let Some(org) = tu.pragmas.code_org {
        out.ins("ORG", &hex16(org), "");
    }

    for name in tu.functions_to_emit() {
        emit_function(tu, out, &name)?;
    }

    data::emit_global_data(tu, out)?;
    data::emit_literal_pools(tu, out);
    data::emit_utility_imports(tu, out);
    Ok(())
}

fn make_ctx<'a>(tu: &'a mut TranslationUnit, name: &str) -> EmitCtx<'a> {
    let end_label = tu
        .functions
        .get(name)
        .map(|f| f.end_label.clone())
        .unwrap_or_default();
    EmitCtx {
        arena: &tu.arena,
        types: &tu.types,
        scopes: &tu.scopes,
        options: &tu.options,
        functions: &tu.functions,
        pragmas: &tu.pragmas,
        diags: &mut tu.diags,
        labels: &mut tu.labels,
        utilities: &mut tu.needed_utilities,
        string_literals: &mut tu.string_literals,
        dword_constants: &mut tu.dword_constants,
        real_constants: &mut tu.real_constants,
        breakables: Vec::new(),
        current_function: name.to_string(),
        function_end_label: end_label,
        scope_stack: vec![tu.global_scope],
        case_labels: std::collections::HashMap::new(),
    }
}

/// Prologue, body, epilogue of one function.
fn emit_function(tu: &mut TranslationUnit, out: &mut AsmText, name: &str) -> Result<(), EmitError> {
    let (node, min_disp, num_locals, attrs, label, end_label, hidden, scope) = {
        let info = match tu.functions.get(name) {
            Some(i) if i.defined => i,
            _ => return Ok(()),
        };
        let attrs = match tu.arena.kind(info.node) {
            NodeKind::FunctionDef { attrs, .. } => *attrs,
            _ => return Ok(()),
        };
        (
            info.node,
            info.min_displacement,
            info.num_locals,
            attrs,
            info.label.clone(),
            info.end_label.clone(),
            info.hidden_param,
            info.scope,
        )
    };
    let body = match tu.arena.kind(node) {
        NodeKind::FunctionDef { body, .. } => match body {
            Some(b) => *b,
            None => return Ok(()),
        },
        _ => return Ok(()),
    };
    let loc = tu.arena.loc(node);
    let returns_aggregate = tu.functions[name].returns_aggregate(&tu.types);
    let num_params = {
        let sig = tu.types.get(tu.functions[name].func_type).signature.clone();
        sig.map(|s| s.params.len()).unwrap_or(0)
    };
    let fpir = tu.functions[name].receives_first_param_in_reg();

    log::debug!("emitting code for function {}", name);
    out.emit_separator_comment();
    out.emit_function_start(name, &loc.to_string());
    out.emit_label(&label, "");

    // A stack frame is only needed when the function receives
    // parameters, declares locals or returns an aggregate, and is not
    // an asm-only function, whose point is to forego the frame.
    let need_stack_frame = !attrs.asm_only && (num_params > 0 || num_locals > 0 || returns_aggregate);

    let mut ctx = make_ctx(tu, name);
    if let Some(scope) = scope {
        ctx.scope_stack.push(scope);
    }

    if need_stack_frame {
        out.ins("PSHS", "U", "");
    }

    // Function-entry stack check, when a per-unit stack space was
    // requested. The routine reads its word argument after the call
    // and adjusts the stacked return address accordingly.
    let stack_space = ctx.pragmas.stack_space;
    if !attrs.asm_only && stack_space > 0 {
        ctx.call_utility(out, "_stkcheck", "");
        let needed = (stack_space as i32 - min_disp as i32) as u16;
        out.ins(
            "FDB",
            &format!("-{}", needed),
            "argument for _stkcheck",
        );
    }

    if need_stack_frame {
        out.ins("LEAU", ",S", "");
        if min_disp < 0 {
            out.ins("LEAS", &format!("{},S", min_disp), "");
        }
    }

    if ctx.options.stack_overflow_checking {
        ctx.call_utility(out, "check_stack_overflow", "");
    }

    // First argument received in D: spill it into its frame slot.
    if fpir {
        if let Some(hidden) = hidden {
            let arg = ctx.var_arg(hidden, 0);
            out.ins("STD", &arg, "spill hidden parameter");
        } else if let Some(scope) = scope {
            let first = ctx
                .scopes
                .decl_ids(scope)
                .into_iter()
                .find(|&d| ctx.decl(d).is_formal_param);
            if let Some(first) = first {
                let d = ctx.decl(first);
                let store = if d.size_in_bytes(ctx.types) == Some(1) {
                    "STB"
                } else {
                    "STD"
                };
                let arg = ctx.var_arg(first, 0);
                let id = d.id.clone();
                out.ins(store, &arg, &format!("spill parameter {}", id));
            }
        }
    }

    // Where the parameters and locals ended up.
    if let Some(scope) = scope {
        let ids = ctx.scopes.decl_ids(scope);
        if !ids.is_empty() {
            out.emit_comment("Formal parameters and locals:");
            for did in ids {
                let d = ctx.decl(did);
                let size = d.size_in_bytes(ctx.types).unwrap_or(0);
                out.emit_comment(&format!(
                    "  {}: {}; {} byte{} at {}",
                    d.id,
                    ctx.types.type_to_string(d.decl_type),
                    size,
                    if size == 1 { "" } else { "s" },
                    d.frame_displacement_arg(0)
                ));
            }
        }
    }

    emit_code(&mut ctx, out, body, false)?;
    out.emit_label(&end_label, &format!("end of {}()", name));

    if need_stack_frame {
        debug_assert!(!attrs.asm_only);
        out.ins("LEAS", ",U", "");
        if attrs.interrupt {
            out.ins("PULS", "U", "");
            out.ins("RTI", "", "");
        } else {
            out.ins("PULS", "U,PC", "");
        }
    } else if !attrs.no_return_instruction {
        out.ins(if attrs.interrupt { "RTI" } else { "RTS" }, "", "");
    }

    out.emit_function_end(name);
    Ok(())
}

/// The per-variant dispatch. Every emitter below observes the X/D/B
/// contract described at the top of the module.
pub fn emit_code(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    match ctx.arena.kind(id) {
        NodeKind::WordConstant { .. }
        | NodeKind::DWordConstant { .. }
        | NodeKind::RealConstant { .. }
        | NodeKind::StringLiteral { .. }
        | NodeKind::Identifier { .. }
        | NodeKind::ObjectMember { .. }
        | NodeKind::Cast { .. }
        | NodeKind::Conditional { .. }
        | NodeKind::Comma { .. } => expr::emit(ctx, out, id, l_value),

        NodeKind::FunctionCall { .. } => call::emit(ctx, out, id, l_value),

        NodeKind::Unary { .. } => unary::emit(ctx, out, id, l_value),

        NodeKind::Binary { op, .. } => {
            if op.is_assignment() {
                assign::emit(ctx, out, id, l_value)
            } else {
                binary::emit(ctx, out, id, l_value)
            }
        }

        NodeKind::InitializerList { .. } => {
            Err(ctx.internal(id, "initializer list evaluated as an expression"))
        }

        NodeKind::Compound { .. }
        | NodeKind::If { .. }
        | NodeKind::While { .. }
        | NodeKind::For { .. }
        | NodeKind::Switch { .. }
        | NodeKind::Labeled { .. }
        | NodeKind::Jump { .. }
        | NodeKind::InlineAsm { .. }
        | NodeKind::VarDecl { .. }
        | NodeKind::DeclarationSeq { .. }
        | NodeKind::Pragma { .. } => stmt::emit(ctx, out, id),

        NodeKind::FunctionDef { .. } => {
            Err(ctx.internal(id, "nested function definitions are not supported"))
        }
    }
}

/// Evaluates `id` for its side effects only, discarding the value.
/// Wide values are evaluated as l-values so no temporary is read back.
pub fn emit_for_side_effects(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
) -> Result<(), EmitError> {
    let wide = ctx.arena.ty(id).is_some() && ctx.is_real_or_long(id);
    emit_code(ctx, out, id, wide)
}

/// Loads the value of a byte expression already emitted into B as a
/// word in D, honoring signedness.
pub fn extend_byte_to_word(ctx: &EmitCtx<'_>, out: &mut AsmText, id: NodeId) {
    out.ins(
        tree::conv_to_word_ins(ctx.arena, ctx.types, id),
        "",
        "promote byte to word",
    );
}

/// Convenience used by several emitters: emit the r-value of `id` and
/// leave a word in D whatever the operand's integral size.
pub fn emit_word_rvalue(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
) -> Result<(), EmitError> {
    emit_code(ctx, out, id, false)?;
    if ctx.is_byte(id) {
        extend_byte_to_word(ctx, out, id);
    }
    Ok(())
}
