//! Scope creation and identifier resolution.
//!
//! Global declarations are registered first, so that a function body
//! may refer to a global defined further down the file. Then, for each
//! function definition: its top scope is created (holding the hidden
//! return-slot parameter, the visible parameters and the body's
//! top-level locals; the function's own braces do not open a second
//! scope), and the body is walked. Compound statements below the top
//! level and the bodies of `for` and `while` statements open child
//! scopes; declaration statements register their declarators in the
//! current scope; identifier expressions resolve to a variable, a
//! function address, an enumerated name or `__FUNCTION__`.

use crate::asm_stmt;
use crate::diag::Diagnostics;
use crate::scope::{Declaration, ScopeArena};
use crate::tranunit::{FunctionInfo, LabelGenerator, TranslationUnit};
use crate::types::{BasicType, TypeManager};
use indexmap::IndexMap;
use lang_mc::ast::{walk, ArrayDims, NodeArena, NodeId, NodeKind, Resolved, ScopeId, Visitor};
use lang_mc::ops::StorageClass;

pub fn create_scopes(tu: &mut TranslationUnit) {
    register_globals(tu);
    resolve_global_initializers(tu);

    let fn_nodes: Vec<(String, NodeId)> = tu
        .functions
        .values()
        .filter(|f| f.defined)
        .map(|f| (f.name.clone(), f.node))
        .collect();

    for (name, node) in fn_nodes {
        prepare_function_scope(tu, &name, node);
        let (scope, body) = {
            let info = &tu.functions[&name];
            let body = match tu.arena.kind(node) {
                NodeKind::FunctionDef { body, .. } => *body,
                _ => None,
            };
            (info.scope, body)
        };
        let (scope, body) = match (scope, body) {
            (Some(s), Some(b)) => (s, b),
            _ => continue,
        };

        log::trace!("creating scopes for function {}", name);
        let mut creator = ScopeCreator {
            scopes: &mut tu.scopes,
            types: &mut tu.types,
            diags: &mut tu.diags,
            labels: &mut tu.labels,
            functions: &tu.functions,
            scope_stack: vec![tu.global_scope, scope],
            depth: 0,
        };
        walk(&mut tu.arena, body, &mut creator);
    }
}

/// Registers every file-scope declarator into the global scope before
/// any body is analyzed.
fn register_globals(tu: &mut TranslationUnit) {
    for i in 0..tu.top_level.len() {
        let item = tu.top_level[i];
        let decl_ids = match tu.arena.kind(item) {
            NodeKind::DeclarationSeq { decls } => decls.clone(),
            _ => continue,
        };
        for var_decl in decl_ids {
            register_declarator(tu, var_decl, None);
        }
    }
}

/// Identifiers inside global initializers resolve against the global
/// scope only.
fn resolve_global_initializers(tu: &mut TranslationUnit) {
    let items: Vec<NodeId> = tu
        .top_level
        .iter()
        .copied()
        .filter(|&n| matches!(tu.arena.kind(n), NodeKind::DeclarationSeq { .. }))
        .collect();
    for item in items {
        let mut creator = ScopeCreator {
            scopes: &mut tu.scopes,
            types: &mut tu.types,
            diags: &mut tu.diags,
            labels: &mut tu.labels,
            functions: &tu.functions,
            scope_stack: vec![tu.global_scope],
            depth: 0,
        };
        walk(&mut tu.arena, item, &mut creator);
    }
}

/// Builds a `Declaration` from a `VarDecl` node and binds it in the
/// proper scope: the global scope for file-scope declarators, the
/// given scope otherwise. Annotates the node with the resulting id.
fn register_declarator(tu: &mut TranslationUnit, node: NodeId, scope: Option<ScopeId>) {
    let (name, var_type, dims, init, storage, read_only, loc) = match tu.arena.kind(node) {
        NodeKind::VarDecl {
            name,
            var_type,
            dims,
            init,
            storage,
            read_only,
            ..
        } => (
            name.clone(),
            *var_type,
            dims.clone(),
            *init,
            *storage,
            *read_only,
            tu.arena.loc(node),
        ),
        _ => {
            let loc = tu.arena.loc(node);
            tu.diags.error(&loc, "invalid declaration");
            return;
        }
    };

    let dims = infer_first_dimension(&tu.arena, dims, init);
    let decl_type = if dims.is_empty() {
        var_type
    } else {
        tu.types.array_of(var_type, &dims)
    };

    let target_scope = scope.unwrap_or(tu.global_scope);
    let mut decl = Declaration::new(name.clone(), decl_type, storage, loc.clone());
    decl.dims = dims;
    decl.init = init;
    decl.read_only = read_only;
    if storage.is_static_duration() {
        decl.label = Some(static_label(&mut tu.labels, &name, storage, scope.is_some()));
    }

    match tu.scopes.declare_variable(target_scope, decl) {
        Ok(did) => {
            if let NodeKind::VarDecl { decl, .. } = &mut tu.arena.get_mut(node).kind {
                *decl = Some(did);
            }
        }
        Err(existing) => {
            let prev = tu.scopes.decl(existing).loc.clone();
            tu.diags.error(
                &loc,
                format!(
                    "variable `{}' already declared in this scope at {}",
                    name, prev
                ),
            );
        }
    }
}

/// A first array dimension left open is taken from the initializer:
/// the element count of a brace list, or the length of a string
/// literal plus its terminating NUL.
fn infer_first_dimension(arena: &NodeArena, mut dims: ArrayDims, init: Option<NodeId>) -> ArrayDims {
    if dims.first().copied() != Some(None) {
        return dims;
    }
    let init = match init {
        Some(i) => i,
        None => return dims,
    };
    let inferred = match arena.kind(init) {
        NodeKind::InitializerList { exprs } => Some(exprs.len() as u16),
        NodeKind::StringLiteral { value } => Some(value.len() as u16 + 1),
        _ => None,
    };
    if let Some(n) = inferred {
        dims[0] = Some(n);
    }
    dims
}

fn static_label(
    labels: &mut LabelGenerator,
    name: &str,
    storage: StorageClass,
    function_local: bool,
) -> String {
    match storage {
        StorageClass::Static if function_local => {
            // Function-local statics need unit-unique labels.
            format!("{}_{}", labels.generate('G'), name)
        }
        _ => format!("_{}", name),
    }
}

/// Creates the function's top scope and declares the hidden parameter
/// and the formal parameters in it.
fn prepare_function_scope(tu: &mut TranslationUnit, name: &str, node: NodeId) {
    let loc = tu.arena.loc(node);
    let (params, func_type) = match tu.arena.kind(node) {
        NodeKind::FunctionDef {
            params, func_type, ..
        } => (params.clone(), *func_type),
        _ => return,
    };

    let scope = tu.scopes.new_scope(Some(tu.global_scope), loc.clone());

    // A function that returns a struct, union, long or real receives
    // the address of its return slot as a hidden first parameter.
    let returns_aggregate = {
        let sig = tu.types.get(func_type).signature.clone();
        sig.map(|s| tu.types.get(s.return_type).base == BasicType::Class)
            .unwrap_or(false)
    };
    let mut hidden_param = None;
    if returns_aggregate {
        let ret = tu
            .types
            .get(func_type)
            .signature
            .as_ref()
            .map(|s| s.return_type)
            .expect("function type without signature");
        let slot_ptr = tu.types.pointer_to(ret);
        let mut decl = Declaration::new("$hidden", slot_ptr, StorageClass::Auto, loc.clone());
        decl.is_hidden_param = true;
        hidden_param = tu.scopes.declare_variable(scope, decl).ok();
    }

    for param in params {
        let (pname, ptype, dims, ploc) = match tu.arena.kind(param) {
            NodeKind::VarDecl {
                name,
                var_type,
                dims,
                ..
            } => (
                name.clone(),
                *var_type,
                dims.clone(),
                tu.arena.loc(param),
            ),
            _ => continue,
        };
        // An array parameter decays to a pointer to its element type.
        let ptype = if !dims.is_empty() {
            tu.types.pointer_to(ptype)
        } else {
            ptype
        };
        let mut decl = Declaration::new(pname.clone(), ptype, StorageClass::Auto, ploc.clone());
        decl.is_formal_param = true;
        match tu.scopes.declare_variable(scope, decl) {
            Ok(did) => {
                if let NodeKind::VarDecl { decl, .. } = &mut tu.arena.get_mut(param).kind {
                    *decl = Some(did);
                }
            }
            Err(_) => {
                tu.diags.error(
                    &ploc,
                    format!("parameter `{}' declared more than once", pname),
                );
            }
        }
    }

    let info = tu.functions.get_mut(name).expect("function registered");
    info.scope = Some(scope);
    info.hidden_param = hidden_param;
}

struct ScopeCreator<'a> {
    scopes: &'a mut ScopeArena,
    types: &'a mut TypeManager,
    diags: &'a mut Diagnostics,
    labels: &'a mut LabelGenerator,
    functions: &'a IndexMap<String, FunctionInfo>,
    scope_stack: Vec<ScopeId>,
    /// Depth below the function body's own compound statement.
    depth: usize,
}

impl<'a> ScopeCreator<'a> {
    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack never empty")
    }

    fn opens_scope(&self, kind: &NodeKind) -> bool {
        match kind {
            // The body's own braces use the function scope.
            NodeKind::Compound { .. } => self.depth > 0,
            NodeKind::For { .. } | NodeKind::While { .. } => true,
            _ => false,
        }
    }

    fn process_identifier(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (name, already_resolved, loc) = match arena.kind(id) {
            NodeKind::Identifier { name, resolved, .. } => {
                (name.clone(), resolved.is_some(), arena.loc(id))
            }
            _ => return,
        };
        if already_resolved {
            return;
        }

        if let Some(did) = self.scopes.lookup(self.current_scope(), &name, true) {
            let ty = self.scopes.decl(did).decl_type;
            debug_assert!(self.types.get(ty).base != BasicType::Void);
            let node = arena.get_mut(id);
            node.ty = Some(ty);
            if let NodeKind::Identifier { resolved, .. } = &mut node.kind {
                *resolved = Some(Resolved::Variable(did));
            }
            return;
        }

        if let Some(info) = self.functions.get(&name) {
            // A function name used as a value: the function's address.
            let fp = self.types.pointer_to(info.func_type);
            let node = arena.get_mut(id);
            node.ty = Some(fp);
            if let NodeKind::Identifier { resolved, .. } = &mut node.kind {
                *resolved = Some(Resolved::FunctionAddress(name));
            }
            return;
        }

        if self.types.is_enumerator_name(&name) {
            // Typed by the expression type setter.
            return;
        }

        if name == "__FUNCTION__" || name == "__func__" {
            let ty = self.types.array_of_char();
            let node = arena.get_mut(id);
            node.ty = Some(ty);
            if let NodeKind::Identifier { resolved, .. } = &mut node.kind {
                *resolved = Some(Resolved::FunctionName);
            }
            return;
        }

        self.diags
            .error(&loc, format!("undeclared identifier `{}'", name));
    }

    fn process_function_call(&mut self, arena: &mut NodeArena, id: NodeId) {
        let callee = match arena.kind(id) {
            NodeKind::FunctionCall { callee, .. } => *callee,
            _ => return,
        };
        let name = match arena.kind(callee) {
            NodeKind::Identifier { name, .. } => name.clone(),
            _ => return, // e.g. (*pf)() or obj.member()
        };
        let var = self.scopes.lookup(self.current_scope(), &name, true);
        if let Some(did) = var {
            if self.functions.contains_key(&name) {
                let loc = arena.loc(id);
                self.diags.warning(
                    &loc,
                    format!(
                        "calling `{}', which is both a variable and a function name",
                        name
                    ),
                );
                return;
            }
            if let NodeKind::FunctionCall { func_ptr_var, .. } = &mut arena.get_mut(id).kind {
                *func_ptr_var = Some(did);
            }
        }
    }

    fn process_inline_asm(&mut self, arena: &NodeArena, id: NodeId) {
        let text = match arena.kind(id) {
            NodeKind::InlineAsm { text } => text.clone(),
            _ => return,
        };
        let loc = arena.loc(id);
        for name in asm_stmt::referenced_variable_names(&text) {
            if self.scopes.lookup(self.current_scope(), &name, true).is_none() {
                self.diags.error(
                    &loc,
                    format!(
                        "undeclared identifier `{}' in assembly language statement",
                        name
                    ),
                );
            }
        }
    }
}

impl<'a> Visitor for ScopeCreator<'a> {
    fn open(&mut self, arena: &mut NodeArena, id: NodeId) -> bool {
        let kind_opens = self.opens_scope(&arena.get(id).kind);
        if kind_opens {
            let loc = arena.loc(id);
            let scope = self.scopes.new_scope(Some(self.current_scope()), loc);
            arena.get_mut(id).scope = Some(scope);
            self.scope_stack.push(scope);
        }
        if matches!(arena.kind(id), NodeKind::Compound { .. }) {
            self.depth += 1;
        }

        match arena.kind(id) {
            NodeKind::DeclarationSeq { decls } => {
                let decls = decls.clone();
                let scope = self.current_scope();
                for d in decls {
                    declare_local(self, arena, d, scope);
                }
            }
            NodeKind::Identifier { .. } => self.process_identifier(arena, id),
            NodeKind::FunctionCall { .. } => self.process_function_call(arena, id),
            NodeKind::InlineAsm { .. } => self.process_inline_asm(arena, id),
            _ => {}
        }
        true
    }

    fn close(&mut self, arena: &mut NodeArena, id: NodeId) -> bool {
        if matches!(arena.kind(id), NodeKind::Compound { .. }) {
            self.depth -= 1;
        }
        if arena.get(id).scope.is_some() {
            self.scope_stack.pop();
        }
        true
    }
}

/// Registers one local declarator in `scope`. Declarators that were
/// already registered (file-scope ones) are left alone.
fn declare_local(sc: &mut ScopeCreator<'_>, arena: &mut NodeArena, node: NodeId, scope: ScopeId) {
    if matches!(
        arena.kind(node),
        NodeKind::VarDecl { decl: Some(_), .. }
    ) {
        return;
    }
    let (name, var_type, dims, init, storage, read_only, loc) = match arena.kind(node) {
        NodeKind::VarDecl {
            name,
            var_type,
            dims,
            init,
            storage,
            read_only,
            ..
        } => (
            name.clone(),
            *var_type,
            dims.clone(),
            *init,
            *storage,
            *read_only,
            arena.loc(node),
        ),
        _ => {
            let loc = arena.loc(node);
            sc.diags.error(&loc, "invalid declaration");
            return;
        }
    };

    let dims = infer_first_dimension(arena, dims, init);
    let decl_type = if dims.is_empty() {
        var_type
    } else {
        sc.types.array_of(var_type, &dims)
    };

    let mut decl = Declaration::new(name.clone(), decl_type, storage, loc.clone());
    decl.dims = dims;
    decl.init = init;
    decl.read_only = read_only;
    if storage.is_static_duration() {
        decl.label = Some(static_label(sc.labels, &name, storage, true));
    }

    match sc.scopes.declare_variable(scope, decl) {
        Ok(did) => {
            if let NodeKind::VarDecl { decl, .. } = &mut arena.get_mut(node).kind {
                *decl = Some(did);
            }
        }
        Err(existing) => {
            let prev = sc.scopes.decl(existing).loc.clone();
            sc.diags.error(
                &loc,
                format!(
                    "variable `{}' already declared in this scope at {}",
                    name, prev
                ),
            );
        }
    }
}
