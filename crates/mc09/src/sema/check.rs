//! Final semantic checks.
//!
//! This pass sees a fully typed tree. It verifies what only a typed
//! tree can tell: return statements against the enclosing function's
//! type, duplicate `goto` labels, incomplete types in declarations,
//! interrupt-routine constraints, enumerator collisions, and printf
//! format strings. It also declares the hidden temporaries that wide
//! (32-bit and real) intermediate results need, owning them in the
//! scope where the expression occurs so that frame allocation gives
//! them displacements.

use crate::diag::Diagnostics;
use crate::scope::{Declaration, ScopeArena};
use crate::sema::conv::{self, ArgAcceptance};
use crate::sema::tree;
use crate::tranunit::{LabelGenerator, TranslationUnit};
use crate::types::{BasicType, TypeManager};
use lang_mc::ast::{
    walk, NodeArena, NodeId, NodeKind, Resolved, ScopeId, StmtLabel, TypeId, Visitor,
};
use lang_mc::ops::{BinaryOp, JumpKind, StorageClass, UnaryOp};
use lang_mc::span::Loc;
use std::collections::BTreeSet;

pub fn check_semantics(tu: &mut TranslationUnit) {
    check_enumerators(tu);
    check_global_declarations(tu);

    let fn_names: Vec<String> = tu
        .functions
        .values()
        .filter(|f| f.defined)
        .map(|f| f.name.clone())
        .collect();

    for name in fn_names {
        check_function(tu, &name);
    }
}

/// Duplicate values inside one enum draw a warning: they are legal
/// but usually an editing accident.
fn check_enumerators(tu: &mut TranslationUnit) {
    let mut enum_names: BTreeSet<String> = BTreeSet::new();
    for name in tu.types.enumerator_names() {
        if let Some(enum_name) = tu.types.enum_of(&name) {
            enum_names.insert(enum_name);
        }
    }
    for enum_name in enum_names {
        let members = tu.types.enumerators_of(&enum_name);
        for (i, (name_a, value_a)) in members.iter().enumerate() {
            for (name_b, value_b) in &members[i + 1..] {
                if value_a == value_b {
                    let msg = format!(
                        "enumerators `{}' and `{}' of enum {} have the same value {}",
                        name_a, name_b, enum_name, value_a
                    );
                    tu.diags.warning(&Loc::none(), msg);
                }
            }
        }
    }
}

fn check_global_declarations(tu: &mut TranslationUnit) {
    for did in tu.scopes.decl_ids(tu.global_scope) {
        let (name, ty, storage, loc, init) = {
            let d = tu.scopes.decl(did);
            (
                d.id.clone(),
                d.decl_type,
                d.storage,
                d.loc.clone(),
                d.init,
            )
        };
        // An extern array may stay without a dimension; a definition
        // may not.
        if storage != StorageClass::Extern && tu.types.size_of(ty).is_none() {
            tu.diags.error(
                &loc,
                format!(
                    "variable `{}' has incomplete type `{}'",
                    name,
                    tu.types.type_to_string(ty)
                ),
            );
        }
        if let Some(init) = init {
            check_initializer(tu, &name, ty, init);
        }
    }
}

/// Initializer shape checks: scalar vs brace list, list length
/// against a known array dimension, assignment compatibility for
/// scalars.
fn check_initializer(tu: &mut TranslationUnit, name: &str, ty: TypeId, init: NodeId) {
    let loc = tu.arena.loc(init);
    let desc = tu.types.get(ty).clone();
    match tu.arena.kind(init) {
        NodeKind::InitializerList { exprs } => {
            let count = exprs.len() as u16;
            match desc.base {
                BasicType::Array => {
                    if let Some(dim) = desc.num_array_elements {
                        if count > dim {
                            tu.diags.error(
                                &loc,
                                format!(
                                    "too many elements ({}) in initializer for array `{}' of {} element(s)",
                                    count, name, dim
                                ),
                            );
                        }
                    }
                }
                BasicType::Class if !desc.is_numerical() => {}
                _ => {
                    if count != 1 {
                        tu.diags.error(
                            &loc,
                            format!("invalid braced initializer for scalar `{}'", name),
                        );
                    }
                }
            }
        }
        NodeKind::StringLiteral { .. } if desc.base == BasicType::Array => {}
        _ => {
            if tu.arena.ty(init).is_some() {
                let diag = conv::param_accepts_arg(
                    &tu.arena,
                    &tu.types,
                    &tu.options,
                    ty,
                    init,
                );
                if diag == ArgAcceptance::ErrorMsg {
                    let it = tree::type_of(&tu.arena, init);
                    tu.diags.error(
                        &loc,
                        format!(
                            "initializing `{}' with `{}'",
                            tu.types.type_to_string(ty),
                            tu.types.type_to_string(it)
                        ),
                    );
                }
            }
        }
    }
}

fn check_function(tu: &mut TranslationUnit, name: &str) {
    let (node, scope, func_type) = {
        let info = &tu.functions[name];
        (info.node, info.scope, info.func_type)
    };
    let scope = match scope {
        Some(s) => s,
        None => return,
    };
    let (body, attrs, loc) = match tu.arena.kind(node) {
        NodeKind::FunctionDef { body, attrs, .. } => (*body, *attrs, tu.arena.loc(node)),
        _ => return,
    };
    let signature = tu
        .types
        .get(func_type)
        .signature
        .clone()
        .expect("function type without signature");

    if attrs.interrupt && !signature.params.is_empty() {
        tu.diags.error(
            &loc,
            format!(
                "interrupt service routine {}() must not have parameters",
                name
            ),
        );
    }
    if attrs.first_param_in_reg {
        if let Some(&first) = signature.params.first() {
            let fd = tu.types.get(first);
            let too_wide = tu.types.size_of(first).map(|s| s > 2).unwrap_or(true);
            if fd.is_struct() || too_wide {
                tu.diags.error(
                    &loc,
                    format!(
                        "first parameter of {}() cannot be received in a register (size or class)",
                        name
                    ),
                );
            }
        }
    }

    let body = match body {
        Some(b) => b,
        None => return,
    };

    log::trace!("checking semantics of function {}", name);
    let mut checker = SemanticsChecker {
        scopes: &mut tu.scopes,
        types: &mut tu.types,
        diags: &mut tu.diags,
        labels: &mut tu.labels,
        options: &tu.options,
        function_name: name.to_string(),
        return_type: signature.return_type,
        scope_stack: vec![tu.global_scope, scope],
        goto_labels: indexmap::IndexMap::new(),
        goto_targets: Vec::new(),
        callees: BTreeSet::new(),
        address_taken: BTreeSet::new(),
        direct_callees: BTreeSet::new(),
        has_return: false,
        num_temps: 0,
    };
    walk(&mut tu.arena, body, &mut checker);

    // goto targets are verified once every label of the body is known.
    for (target, gloc) in std::mem::take(&mut checker.goto_targets) {
        if !checker.goto_labels.contains_key(&target) {
            checker.diags.error(
                &gloc,
                format!(
                    "goto targets label `{}' which is unknown to function {}()",
                    target, name
                ),
            );
        }
    }

    let ret_is_void = checker.types.get(signature.return_type).base == BasicType::Void;
    if !ret_is_void && !checker.has_return {
        checker.diags.warning(
            &loc,
            format!("function {}() is not void but has no return statement", name),
        );
    }

    let has_return = checker.has_return;
    let goto_labels = std::mem::take(&mut checker.goto_labels);
    let callees = std::mem::take(&mut checker.callees);
    let address_taken = std::mem::take(&mut checker.address_taken);
    drop(checker);

    let info = tu.functions.get_mut(name).unwrap();
    info.has_return_statement = has_return;
    info.goto_labels = goto_labels;
    info.callees = callees;
    tu.address_taken.extend(address_taken);
}

struct SemanticsChecker<'a> {
    scopes: &'a mut ScopeArena,
    types: &'a mut TypeManager,
    diags: &'a mut Diagnostics,
    labels: &'a mut LabelGenerator,
    options: &'a crate::options::CompilerOptions,
    function_name: String,
    return_type: TypeId,
    scope_stack: Vec<ScopeId>,
    goto_labels: indexmap::IndexMap<String, String>,
    goto_targets: Vec<(String, Loc)>,
    callees: BTreeSet<String>,
    address_taken: BTreeSet<String>,
    /// Identifier nodes that are the callee of a direct call; their
    /// use is a call, not an address capture.
    direct_callees: BTreeSet<NodeId>,
    has_return: bool,
    num_temps: usize,
}

impl<'a> SemanticsChecker<'a> {
    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack never empty")
    }

    /// Declares a compiler temporary of `ty` in the current scope and
    /// records it on the node. The scope owns the temporary; frame
    /// allocation will give it a displacement.
    fn declare_temp(&mut self, arena: &mut NodeArena, id: NodeId, ty: TypeId) {
        if arena.get(id).temp.is_some() {
            return;
        }
        self.num_temps += 1;
        let name = format!("__temp{}", self.num_temps);
        let loc = arena.loc(id);
        let mut decl = Declaration::new(name, ty, StorageClass::Auto, loc);
        decl.is_compiler_temp = true;
        let did = self
            .scopes
            .declare_variable(self.current_scope(), decl)
            .expect("temporary names are unique per function");
        arena.get_mut(id).temp = Some(did);
        log::trace!(
            "declared temporary {:?} for node {:?} in {}",
            did,
            id,
            self.function_name
        );
    }

    fn temp_for_wide_result(&mut self, arena: &mut NodeArena, id: NodeId) {
        let ty = match arena.ty(id) {
            Some(t) => t,
            None => return,
        };
        if self.types.get(ty).is_real_or_long() {
            self.declare_temp(arena, id, ty);
        }
    }

    fn check_return(&mut self, arena: &mut NodeArena, id: NodeId, arg: Option<NodeId>) {
        self.has_return = true;
        let loc = arena.loc(id);
        let ret = self.return_type;
        let ret_desc = self.types.get(ret).clone();

        let arg = match arg {
            Some(a) => a,
            None => {
                if ret_desc.base != BasicType::Void {
                    self.diags.error(
                        &loc,
                        "return without argument in a non-void function".to_string(),
                    );
                }
                return;
            }
        };

        let at = tree::type_of(arena, arg);
        let ad = self.types.get(at).clone();
        let value = crate::sema::const_eval::evaluate_constant_expr(arena, self.types, arg);

        let fine = if ret_desc.base == BasicType::Word && ad.base == BasicType::Byte {
            true // byte from a word function, regardless of signedness
        } else if ret_desc.base == BasicType::Byte
            && ad.base == BasicType::Word
            && tree::is_8bit_constant(arena, self.types, arg)
        {
            true // word constant that fits a byte
        } else if ret_desc.base == BasicType::Word && ad.base == BasicType::Word {
            true
        } else if ret_desc.base == BasicType::Byte && ad.base == BasicType::Byte {
            true
        } else if ret_desc.base == BasicType::Pointer
            && ad.is_byte_or_word()
            && value == Some(0)
        {
            true // returning zero from a pointer function
        } else if ret_desc.base == BasicType::Pointer && ad.base == BasicType::Array {
            // returning T[] from a function that must return T *
            match (ret_desc.pointed, ad.pointed) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        } else if ret_desc.is_long() && ad.is_byte_or_word() {
            true // char or short from a function returning long
        } else if ret_desc.base == BasicType::Pointer
            && conv::is_zero_cast_to_void_pointer(arena, self.types, arg)
        {
            true
        } else if self.types.same_types_modulo_const(ret, at)
            && (ret_desc.is_constant
                || (ret_desc.base == BasicType::Pointer
                    && ret_desc
                        .pointed
                        .map(|p| self.types.get(p).is_constant)
                        .unwrap_or(false)))
        {
            true // returning T * from a function returning const T *
        } else if ret_desc.base == BasicType::Pointer
            && ret_desc
                .pointed
                .map(|p| self.types.get(p).base == BasicType::Void)
                .unwrap_or(false)
            && ad.base == BasicType::Pointer
            && !ad
                .pointed
                .map(|p| self.types.get(p).is_constant)
                .unwrap_or(false)
        {
            true // non-const T * from a function returning void *
        } else {
            ret == at
        };

        if !fine {
            self.diags.error(
                &loc,
                format!(
                    "returning expression of type `{}', which differs from function's return type (`{}')",
                    self.types.type_to_string(at),
                    self.types.type_to_string(ret)
                ),
            );
        }
    }

    fn check_labeled(&mut self, arena: &NodeArena, id: NodeId) {
        if let NodeKind::Labeled {
            label: StmtLabel::Id(name),
            ..
        } = arena.kind(id)
        {
            let loc = arena.loc(id);
            if self.goto_labels.contains_key(name) {
                self.diags.error(
                    &loc,
                    format!(
                        "label `{}' already defined in function {}()",
                        name, self.function_name
                    ),
                );
            } else {
                let asm_label = self.labels.generate('L');
                self.goto_labels.insert(name.clone(), asm_label);
            }
        }
    }

    /// printf-family checks: format directives against argument types,
    /// and a string literal where sprintf expects a buffer.
    fn check_printf_call(&mut self, arena: &NodeArena, id: NodeId) {
        let (callee, args) = match arena.kind(id) {
            NodeKind::FunctionCall { callee, args, .. } => (*callee, args.clone()),
            _ => return,
        };
        let name = match arena.kind(callee) {
            NodeKind::Identifier { name, .. } => name.clone(),
            _ => return,
        };
        let format_index = match name.as_str() {
            "printf" => 0,
            "sprintf" => 1,
            _ => return,
        };
        if name == "sprintf" {
            if let Some(&first) = args.first() {
                if matches!(arena.kind(first), NodeKind::StringLiteral { .. }) {
                    let loc = arena.loc(first);
                    self.diags.warning(
                        &loc,
                        "string literal passed as first argument of sprintf(), which expects a writable buffer"
                            .to_string(),
                    );
                }
            }
        }
        let format = match args.get(format_index) {
            Some(&f) => f,
            None => return,
        };
        let text = match arena.kind(format) {
            NodeKind::StringLiteral { value } => value.clone(),
            _ => return,
        };
        let loc = arena.loc(format);
        let specs = parse_format_directives(&text);
        let value_args = &args[format_index + 1..];
        if specs.len() != value_args.len() {
            self.diags.warning(
                &loc,
                format!(
                    "{}() format string expects {} argument(s) but {} given",
                    name,
                    specs.len(),
                    value_args.len()
                ),
            );
            return;
        }
        for (&letter, &arg) in specs.iter().zip(value_args) {
            let ad = tree::desc(arena, self.types, arg);
            let ok = match letter {
                b'd' | b'u' | b'x' | b'X' | b'c' => ad.is_integral(),
                b's' => ad.is_ptr_or_array(),
                b'p' => ad.is_ptr_or_array() || ad.is_integral(),
                b'f' | b'e' | b'g' => ad.is_real(),
                _ => true,
            };
            if !ok {
                let at = tree::type_of(arena, arg);
                self.diags.warning(
                    &loc,
                    format!(
                        "format directive %{} does not match argument of type `{}'",
                        letter as char,
                        self.types.type_to_string(at)
                    ),
                );
            }
        }
    }

    fn note_wide_operations(&mut self, arena: &mut NodeArena, id: NodeId) {
        match arena.kind(id) {
            NodeKind::Binary { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                match op {
                    BinaryOp::Add
                    | BinaryOp::Sub
                    | BinaryOp::Mul
                    | BinaryOp::Div
                    | BinaryOp::Mod
                    | BinaryOp::BitwiseAnd
                    | BinaryOp::BitwiseOr
                    | BinaryOp::BitwiseXor
                    | BinaryOp::LeftShift
                    | BinaryOp::RightShift => self.temp_for_wide_result(arena, id),
                    // A compound assignment over mismatched widths
                    // (e.g. long += float) runs the helper in
                    // temporary mode.
                    _ if op.is_assignment()
                        && !matches!(
                            op,
                            BinaryOp::Assignment | BinaryOp::LeftAssign | BinaryOp::RightAssign
                        ) =>
                    {
                        let lt = tree::type_of(arena, left);
                        let rt = tree::type_of(arena, right);
                        let (ld, rd) = (self.types.get(lt), self.types.get(rt));
                        if ld.is_real_or_long()
                            && rd.is_real_or_long()
                            && self.types.size_of(lt) != self.types.size_of(rt)
                        {
                            self.declare_temp(arena, id, lt);
                        }
                    }
                    _ => {}
                }
            }
            NodeKind::Unary { op, .. } => {
                let op = *op;
                match op {
                    UnaryOp::Neg => self.temp_for_wide_result(arena, id),
                    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                        self.temp_for_wide_result(arena, id)
                    }
                    _ => {}
                }
            }
            NodeKind::Cast { .. } => self.temp_for_wide_result(arena, id),
            NodeKind::Conditional { .. } => self.temp_for_wide_result(arena, id),
            NodeKind::FunctionCall { .. } => {
                // The caller allocates the return slot for aggregate
                // returns, struct included.
                let ty = match arena.ty(id) {
                    Some(t) => t,
                    None => return,
                };
                if self.types.get(ty).base == BasicType::Class {
                    self.declare_temp(arena, id, ty);
                }
            }
            _ => {}
        }
    }
}

impl<'a> Visitor for SemanticsChecker<'a> {
    fn open(&mut self, arena: &mut NodeArena, id: NodeId) -> bool {
        if let Some(scope) = arena.get(id).scope {
            self.scope_stack.push(scope);
        }
        if let NodeKind::FunctionCall { callee, .. } = arena.kind(id) {
            if matches!(arena.kind(*callee), NodeKind::Identifier { .. }) {
                self.direct_callees.insert(*callee);
            }
        }
        self.check_labeled(arena, id);
        true
    }

    fn close(&mut self, arena: &mut NodeArena, id: NodeId) -> bool {
        match arena.kind(id) {
            NodeKind::Jump {
                kind: JumpKind::Return,
                arg,
                ..
            } => {
                let arg = *arg;
                self.check_return(arena, id, arg);
            }
            NodeKind::Jump {
                kind: JumpKind::Goto,
                target,
                ..
            } => {
                if let Some(t) = target {
                    let loc = arena.loc(id);
                    self.goto_targets.push((t.clone(), loc));
                }
            }
            NodeKind::Identifier {
                resolved: Some(Resolved::FunctionAddress(f)),
                ..
            } => {
                if !self.direct_callees.contains(&id) {
                    self.address_taken.insert(f.clone());
                }
            }
            NodeKind::FunctionCall { callee, .. } => {
                let callee = *callee;
                if let NodeKind::Identifier {
                    name,
                    resolved: Some(Resolved::FunctionAddress(_)),
                } = arena.kind(callee)
                {
                    self.callees.insert(name.clone());
                }
                self.check_printf_call(arena, id);
                self.note_wide_operations(arena, id);
            }
            NodeKind::VarDecl { decl: Some(did), init: Some(init), .. } => {
                let (did, init) = (*did, *init);
                let d = self.scopes.decl(did);
                let (name, ty, storage, dloc) =
                    (d.id.clone(), d.decl_type, d.storage, d.loc.clone());
                if storage != StorageClass::Extern && self.types.size_of(ty).is_none() {
                    self.diags.error(
                        &dloc,
                        format!(
                            "variable `{}' has incomplete type `{}'",
                            name,
                            self.types.type_to_string(ty)
                        ),
                    );
                }
                // Local scalar initializers obey assignment rules.
                if !matches!(
                    arena.kind(init),
                    NodeKind::InitializerList { .. } | NodeKind::StringLiteral { .. }
                ) && arena.ty(init).is_some()
                {
                    let diag = conv::param_accepts_arg(
                        arena,
                        self.types,
                        self.options,
                        ty,
                        init,
                    );
                    if diag == ArgAcceptance::ErrorMsg {
                        let it = tree::type_of(arena, init);
                        let iloc = arena.loc(init);
                        self.diags.error(
                            &iloc,
                            format!(
                                "initializing `{}' with `{}'",
                                self.types.type_to_string(ty),
                                self.types.type_to_string(it)
                            ),
                        );
                    }
                }
            }
            NodeKind::VarDecl { decl: Some(did), init: None, .. } => {
                let did = *did;
                let d = self.scopes.decl(did);
                let (name, ty, storage, dloc) =
                    (d.id.clone(), d.decl_type, d.storage, d.loc.clone());
                if storage != StorageClass::Extern && self.types.size_of(ty).is_none() {
                    self.diags.error(
                        &dloc,
                        format!(
                            "variable `{}' has incomplete type `{}'",
                            name,
                            self.types.type_to_string(ty)
                        ),
                    );
                }
            }
            NodeKind::Binary { .. } | NodeKind::Unary { .. } | NodeKind::Cast { .. }
            | NodeKind::Conditional { .. } => {
                self.note_wide_operations(arena, id);
            }
            _ => {}
        }

        if arena.get(id).scope.is_some() {
            self.scope_stack.pop();
        }
        true
    }
}

/// Conversion directives of a printf-style format string, reduced to
/// their conversion letter.
fn parse_format_directives(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            i += 1;
            if i < bytes.len() && bytes[i] == b'%' {
                i += 1;
                continue;
            }
            // skip flags, width, precision and length prefixes
            while i < bytes.len()
                && (bytes[i].is_ascii_digit()
                    || matches!(bytes[i], b'-' | b'+' | b' ' | b'#' | b'.' | b'l' | b'h'))
            {
                i += 1;
            }
            if i < bytes.len() {
                out.push(bytes[i]);
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn format_directive_parsing() {
        assert_eq!(parse_format_directives("x=%d y=%u%%"), vec![b'd', b'u']);
        assert_eq!(parse_format_directives("%5d %-3s %02x"), vec![b'd', b's', b'x']);
        assert_eq!(parse_format_directives("no directives"), Vec::<u8>::new());
    }
}
