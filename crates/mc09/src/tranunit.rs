//! The translation unit: owner of all per-compilation state.
//!
//! One `TranslationUnit` is built per input file. The parser (out of
//! scope here) allocates nodes into the arena, hands top-level items to
//! [`TranslationUnit::add_top_level`], and then [`compile`] runs the
//! semantic passes in order, allocates stack frames and emits assembly
//! text. All passes record their diagnostics and keep going; the error
//! count at the end decides success.
//!
//! [`compile`]: TranslationUnit::compile

use crate::asm::AsmText;
use crate::codegen;
use crate::diag::{CompileError, Diagnostics};
use crate::options::CompilerOptions;
use crate::pragma::{self, PragmaState};
use crate::scope::ScopeArena;
use crate::sema;
use crate::types::{BasicType, TypeManager};
use indexmap::IndexMap;
use lang_mc::ast::{DeclId, FuncAttrs, NodeArena, NodeId, NodeKind, ScopeId, TypeId};
use lang_mc::span::Loc;
use std::collections::BTreeSet;

/// Monotonic generator of assembler labels (`L00001`, `S00002`, ...).
#[derive(Debug, Default)]
pub struct LabelGenerator {
    counter: u32,
}

impl LabelGenerator {
    pub fn generate(&mut self, prefix: char) -> String {
        self.counter += 1;
        format!("{}{:05}", prefix, self.counter)
    }
}

/// Jump targets for `break` and `continue` inside the innermost
/// breakable statement. A `switch` pushes an empty continue label;
/// `continue` seeing that is an error.
#[derive(Debug, Clone)]
pub struct BreakableLabels {
    pub break_label: String,
    pub continue_label: String,
}

/// Per-function record kept by the translation unit.
#[derive(Debug)]
pub struct FunctionInfo {
    pub name: String,
    pub func_type: TypeId,
    pub node: NodeId,
    pub label: String,
    pub end_label: String,
    pub attrs: FuncAttrs,
    /// Top scope (parameters + top-level locals); set by scope
    /// creation when the function has a body.
    pub scope: Option<ScopeId>,
    /// Hidden return-slot parameter, for aggregate-returning
    /// functions.
    pub hidden_param: Option<DeclId>,
    /// Most negative frame displacement; valid after frame
    /// allocation.
    pub min_displacement: i16,
    pub num_locals: usize,
    /// Functions this one calls by name; filled by the semantics
    /// checker for the unused-function suppression.
    pub callees: BTreeSet<String>,
    /// `goto` label name to assembler label, one entry per labeled
    /// statement of the body.
    pub goto_labels: IndexMap<String, String>,
    pub has_return_statement: bool,
    pub defined: bool,
}

impl FunctionInfo {
    /// Whether callers must pass the address of a return slot as a
    /// hidden first argument.
    pub fn returns_aggregate(&self, tm: &TypeManager) -> bool {
        let ret = match &tm.get(self.func_type).signature {
            Some(sig) => sig.return_type,
            None => return false,
        };
        let desc = tm.get(ret);
        desc.base == BasicType::Class
    }

    /// The first actual argument (hidden or visible) travels in D.
    pub fn receives_first_param_in_reg(&self) -> bool {
        self.attrs.first_param_in_reg
    }
}

/// Owner of the arena, the type manager, the scope tree and the
/// per-function records of one input file.
pub struct TranslationUnit {
    pub options: CompilerOptions,
    pub arena: NodeArena,
    pub types: TypeManager,
    pub scopes: ScopeArena,
    pub global_scope: ScopeId,
    pub top_level: Vec<NodeId>,
    pub functions: IndexMap<String, FunctionInfo>,
    pub diags: Diagnostics,
    pub labels: LabelGenerator,
    /// String literal pool: content to assembler label, one copy per
    /// distinct content.
    pub string_literals: IndexMap<String, String>,
    /// 32-bit constants referenced by emitted code; they live in the
    /// read-only data section.
    pub dword_constants: IndexMap<u32, String>,
    /// Real constants, keyed by bit pattern.
    pub real_constants: IndexMap<u64, (f64, String)>,
    /// Runtime helper routines referenced by the emitted code.
    pub needed_utilities: BTreeSet<String>,
    /// Functions whose address was taken somewhere.
    pub address_taken: BTreeSet<String>,
    pub pragmas: PragmaState,
}

impl TranslationUnit {
    pub fn new(options: CompilerOptions) -> TranslationUnit {
        let mut scopes = ScopeArena::new();
        let global_scope = scopes.new_scope(None, Loc::none());
        TranslationUnit {
            options,
            arena: NodeArena::new(),
            types: TypeManager::new(),
            scopes,
            global_scope,
            top_level: Vec::new(),
            functions: IndexMap::new(),
            diags: Diagnostics::new(),
            labels: LabelGenerator::default(),
            string_literals: IndexMap::new(),
            dword_constants: IndexMap::new(),
            real_constants: IndexMap::new(),
            needed_utilities: BTreeSet::new(),
            address_taken: BTreeSet::new(),
            pragmas: PragmaState::default(),
        }
    }

    /// Accepts one top-level item from the parser: a declaration
    /// sequence, a function definition or a pragma.
    pub fn add_top_level(&mut self, node: NodeId) {
        match self.arena.kind(node) {
            NodeKind::FunctionDef {
                name,
                func_type,
                body,
                attrs,
                ..
            } => {
                let name = name.clone();
                let func_type = *func_type;
                let attrs = *attrs;
                let defined = body.is_some();
                let label = format!("_{}", name);
                let end_label = self.labels.generate('L');
                match self.functions.get_mut(&name) {
                    Some(info) => {
                        if defined && info.defined {
                            let loc = self.arena.loc(node);
                            self.diags
                                .error(&loc, format!("function `{}' already defined", name));
                        } else if defined {
                            info.defined = true;
                            info.node = node;
                        }
                    }
                    None => {
                        self.functions.insert(
                            name.clone(),
                            FunctionInfo {
                                name,
                                func_type,
                                node,
                                label,
                                end_label,
                                attrs,
                                scope: None,
                                hidden_param: None,
                                min_displacement: 0,
                                num_locals: 0,
                                callees: BTreeSet::new(),
                                goto_labels: IndexMap::new(),
                                has_return_statement: false,
                                defined,
                            },
                        );
                    }
                }
            }
            NodeKind::Pragma { text } => {
                let text = text.clone();
                match pragma::parse(&text) {
                    Some(p) => self.pragmas.apply(&p),
                    None => {
                        let loc = self.arena.loc(node);
                        self.diags
                            .warning(&loc, format!("ignoring unsupported pragma: {}", text));
                    }
                }
            }
            _ => {}
        }
        self.top_level.push(node);
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    /// Label of the pooled copy of a string literal, allocating one on
    /// first sight of the content.
    pub fn string_literal_label(&mut self, value: &str) -> String {
        if let Some(label) = self.string_literals.get(value) {
            return label.clone();
        }
        let label = self.labels.generate('S');
        self.string_literals
            .insert(value.to_string(), label.clone());
        label
    }

    /// Remembers that the emitted code calls the named runtime helper,
    /// so that end-of-unit output can declare it.
    pub fn need_utility(&mut self, name: &str) {
        self.needed_utilities.insert(name.to_string());
    }

    /// Assigns frame displacements in every defined function.
    pub fn allocate_frames(&mut self) {
        let names: Vec<String> = self.functions.keys().cloned().collect();
        for name in names {
            let (scope, fpir) = {
                let info = &self.functions[&name];
                (info.scope, info.receives_first_param_in_reg())
            };
            let scope = match scope {
                Some(s) => s,
                None => continue,
            };
            let mut count = 0;
            let min =
                self.scopes
                    .allocate_local_variables(scope, &self.types, 0, true, fpir, &mut count);
            debug_assert!(min <= 0);
            let info = self.functions.get_mut(&name).unwrap();
            info.min_displacement = min;
            info.num_locals = count;
        }
    }

    /// Functions to emit, honoring the unused-function suppression:
    /// everything reachable from `main` or from an address-taken
    /// function. When `main` is absent or suppression is off, all
    /// defined functions are kept.
    pub fn functions_to_emit(&self) -> Vec<String> {
        let all: Vec<String> = self
            .functions
            .values()
            .filter(|f| f.defined)
            .map(|f| f.name.clone())
            .collect();
        if !self.options.suppress_uncalled_functions || !self.functions.contains_key("main") {
            return all;
        }
        let mut reachable: BTreeSet<String> = BTreeSet::new();
        let mut work: Vec<String> = vec!["main".to_string()];
        work.extend(self.address_taken.iter().cloned());
        while let Some(name) = work.pop() {
            if !reachable.insert(name.clone()) {
                continue;
            }
            if let Some(info) = self.functions.get(&name) {
                work.extend(info.callees.iter().cloned());
            }
        }
        all.into_iter().filter(|n| reachable.contains(n)).collect()
    }

    /// Runs the whole pipeline over the unit and appends the emitted
    /// assembly to `out`.
    pub fn compile(&mut self, out: &mut AsmText) -> Result<(), CompileError> {
        log::debug!(
            "compiling translation unit: {} top-level item(s), {} function(s)",
            self.top_level.len(),
            self.functions.len()
        );
        sema::create_scopes(self);
        sema::set_expression_types(self);
        sema::check_semantics(self);
        self.allocate_frames();
        codegen::emit_translation_unit(self, out)?;
        match self.diags.num_errors() {
            0 => Ok(()),
            n => Err(CompileError::Errors(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn labels_are_monotonic() {
        let mut gen = LabelGenerator::default();
        assert_eq!(gen.generate('L'), "L00001");
        assert_eq!(gen.generate('L'), "L00002");
        assert_eq!(gen.generate('S'), "S00003");
    }

    #[test]
    fn string_pool_dedupes_by_content() {
        let mut tu = TranslationUnit::new(CompilerOptions::default());
        let a = tu.string_literal_label("hello");
        let b = tu.string_literal_label("hello");
        let c = tu.string_literal_label("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
