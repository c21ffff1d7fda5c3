//! Lexical scopes and declarations.
//!
//! Scopes form a tree: the global scope, one scope per function body,
//! and one per compound statement or loop body below it. Each scope
//! owns its declarations in insertion order, which fixes the
//! stack-frame layout, and its child scopes. A declaration is
//! identified by a [`DeclId`], the pair of its owning scope and its
//! index there, so that cross references from the tree stay plain
//! indices.

use crate::types::TypeManager;
use indexmap::IndexMap;
use lang_mc::ast::{ArrayDims, DeclId, NodeId, ScopeId, TypeId};
use lang_mc::ops::StorageClass;
use lang_mc::span::Loc;

/// Frame displacement of the first stack-passed parameter: above the
/// saved frame pointer (2 bytes) and the return address (2 bytes).
pub const FIRST_PARAM_DISPLACEMENT: i16 = 4;

/// A name binding: variable, formal parameter, or compiler temporary.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: String,
    pub decl_type: TypeId,
    /// Array dimensions; empty if the declarator is not an array.
    /// Kept alongside the (array-typed) `decl_type` because the first
    /// dimension may only become known from the initializer.
    pub dims: ArrayDims,
    /// Initializer expression, owned by the node arena.
    pub init: Option<NodeId>,
    pub storage: StorageClass,
    pub is_formal_param: bool,
    /// The hidden first parameter carrying the address of the caller's
    /// return slot.
    pub is_hidden_param: bool,
    /// A temporary introduced by the compiler for a wide intermediate
    /// result.
    pub is_compiler_temp: bool,
    pub read_only: bool,
    /// Offset from U once `allocate_local_variables` has run; only for
    /// frame-resident declarations.
    pub frame_displacement: Option<i16>,
    /// Assembly label; only for static-duration declarations.
    pub label: Option<String>,
    pub loc: Loc,
}

impl Declaration {
    pub fn new(id: impl Into<String>, decl_type: TypeId, storage: StorageClass, loc: Loc) -> Declaration {
        Declaration {
            id: id.into(),
            decl_type,
            dims: ArrayDims::new(),
            init: None,
            storage,
            is_formal_param: false,
            is_hidden_param: false,
            is_compiler_temp: false,
            read_only: false,
            frame_displacement: None,
            label: None,
            loc,
        }
    }

    pub fn is_frame_resident(&self) -> bool {
        self.storage == StorageClass::Auto
    }

    /// Operand text for this declaration plus a constant byte offset:
    /// `disp,U` for frame residents, `label+off` for the rest.
    pub fn frame_displacement_arg(&self, offset: i16) -> String {
        if let Some(disp) = self.frame_displacement {
            format!("{},U", disp + offset)
        } else {
            let label = self.label.as_deref().unwrap_or(&self.id);
            if offset == 0 {
                label.to_string()
            } else {
                format!("{}+{}", label, offset)
            }
        }
    }

    /// Size of the declared object. `None` while the type is still
    /// incomplete.
    pub fn size_in_bytes(&self, tm: &TypeManager) -> Option<u16> {
        tm.size_of(self.decl_type)
    }
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    decls: Vec<Declaration>,
    by_name: IndexMap<String, u32>,
    pub loc: Loc,
}

impl Scope {
    fn new(parent: Option<ScopeId>, loc: Loc) -> Scope {
        Scope {
            parent,
            children: Vec::new(),
            decls: Vec::new(),
            by_name: IndexMap::new(),
            loc,
        }
    }

    pub fn declaration_ids(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn num_declarations(&self) -> usize {
        self.decls.len()
    }
}

/// Owner of every scope of a translation unit.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> ScopeArena {
        ScopeArena::default()
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>, loc: Loc) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(parent, loc));
        if let Some(p) = parent {
            self.scopes[p.0 as usize].children.push(id);
        }
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.scopes[id.scope.0 as usize].decls[id.index as usize]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.scopes[id.scope.0 as usize].decls[id.index as usize]
    }

    /// Binds `decl` in `scope`. Fails with the previous binding's id
    /// when the name is already declared in this same scope.
    pub fn declare_variable(&mut self, scope: ScopeId, decl: Declaration) -> Result<DeclId, DeclId> {
        let s = self.get_mut(scope);
        if let Some(&index) = s.by_name.get(&decl.id) {
            return Err(DeclId { scope, index });
        }
        let index = s.decls.len() as u32;
        s.by_name.insert(decl.id.clone(), index);
        s.decls.push(decl);
        Ok(DeclId { scope, index })
    }

    /// Looks `name` up in `scope`, walking parent scopes when asked.
    pub fn lookup(&self, scope: ScopeId, name: &str, walk_parents: bool) -> Option<DeclId> {
        let mut cur = Some(scope);
        while let Some(sid) = cur {
            let s = self.get(sid);
            if let Some(&index) = s.by_name.get(name) {
                return Some(DeclId { scope: sid, index });
            }
            if !walk_parents {
                return None;
            }
            cur = s.parent;
        }
        None
    }

    pub fn decl_ids(&self, scope: ScopeId) -> Vec<DeclId> {
        (0..self.get(scope).decls.len() as u32)
            .map(|index| DeclId { scope, index })
            .collect()
    }

    /// Assigns frame displacements to the declarations of `scope` and
    /// its children, in insertion order.
    ///
    /// Stack-passed parameters receive positive displacements starting
    /// at `+4,U`; a 1-byte parameter occupies a 2-byte slot with the
    /// value in the low byte. Locals receive negative displacements
    /// growing downward from `initial_displacement`. Under the
    /// first-param-in-register convention, the hidden return-slot
    /// parameter (or, failing that, the first visible parameter)
    /// is allocated as a local instead; the callee spills D there.
    ///
    /// Child scopes are allocated after this scope's own declarations,
    /// each continuing where the previous one ended, so that every
    /// local of the function has a distinct slot. Returns the most
    /// negative displacement reached (≤ 0): the number of bytes to
    /// subtract from S on function entry. `num_locals_allocated`
    /// accumulates the count of frame locals placed.
    pub fn allocate_local_variables(
        &mut self,
        scope: ScopeId,
        tm: &TypeManager,
        initial_displacement: i16,
        is_top_of_function: bool,
        first_param_in_reg: bool,
        num_locals_allocated: &mut usize,
    ) -> i16 {
        let mut min_disp = initial_displacement;
        let mut next_param_disp = FIRST_PARAM_DISPLACEMENT;
        let mut reg_param_pending = is_top_of_function && first_param_in_reg;

        for index in 0..self.get(scope).decls.len() {
            let did = DeclId {
                scope,
                index: index as u32,
            };
            let (size, is_param, storage) = {
                let d = self.decl(did);
                if !d.is_frame_resident() {
                    continue;
                }
                (
                    d.size_in_bytes(tm).unwrap_or(0),
                    d.is_formal_param || d.is_hidden_param,
                    d.storage,
                )
            };
            debug_assert_eq!(storage, StorageClass::Auto);

            if is_param && is_top_of_function {
                if reg_param_pending {
                    // First parameter arrives in D: give it a local
                    // slot below the frame pointer.
                    reg_param_pending = false;
                    min_disp -= size as i16;
                    self.decl_mut(did).frame_displacement = Some(min_disp);
                    *num_locals_allocated += 1;
                } else {
                    // Byte parameters are pushed as words; the value
                    // is the low byte of the 2-byte slot.
                    let slot = size.max(2) as i16;
                    let disp = if size == 1 {
                        next_param_disp + 1
                    } else {
                        next_param_disp
                    };
                    self.decl_mut(did).frame_displacement = Some(disp);
                    next_param_disp += slot;
                }
            } else {
                min_disp -= size as i16;
                self.decl_mut(did).frame_displacement = Some(min_disp);
                *num_locals_allocated += 1;
            }
        }

        let children = self.get(scope).children.clone();
        for child in children {
            min_disp = self.allocate_local_variables(
                child,
                tm,
                min_disp,
                false,
                false,
                num_locals_allocated,
            );
        }
        min_disp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasicType;
    use pretty_assertions::assert_eq;

    fn arena_with_types() -> (ScopeArena, TypeManager, TypeId, TypeId) {
        let mut tm = TypeManager::new();
        let word = tm.basic_type(BasicType::Word, true);
        let byte = tm.basic_type(BasicType::Byte, true);
        (ScopeArena::new(), tm, word, byte)
    }

    fn declare(
        scopes: &mut ScopeArena,
        scope: ScopeId,
        name: &str,
        ty: TypeId,
        formal: bool,
    ) -> DeclId {
        let mut d = Declaration::new(name, ty, StorageClass::Auto, Loc::none());
        d.is_formal_param = formal;
        scopes.declare_variable(scope, d).unwrap()
    }

    #[test]
    fn duplicate_declaration_is_rejected() {
        let (mut scopes, _tm, word, _) = arena_with_types();
        let top = scopes.new_scope(None, Loc::none());
        let first = declare(&mut scopes, top, "x", word, false);
        let d = Declaration::new("x", word, StorageClass::Auto, Loc::none());
        assert_eq!(scopes.declare_variable(top, d), Err(first));
    }

    #[test]
    fn lookup_walks_parents_only_when_asked() {
        let (mut scopes, _tm, word, _) = arena_with_types();
        let top = scopes.new_scope(None, Loc::none());
        let inner = scopes.new_scope(Some(top), Loc::none());
        let did = declare(&mut scopes, top, "x", word, false);
        assert_eq!(scopes.lookup(inner, "x", true), Some(did));
        assert_eq!(scopes.lookup(inner, "x", false), None);
    }

    #[test]
    fn params_at_plus_four_then_locals_negative() {
        let (mut scopes, tm, word, byte) = arena_with_types();
        let top = scopes.new_scope(None, Loc::none());
        let a = declare(&mut scopes, top, "a", word, true);
        let b = declare(&mut scopes, top, "b", byte, true);
        let c = declare(&mut scopes, top, "c", word, true);
        let x = declare(&mut scopes, top, "x", word, false);
        let y = declare(&mut scopes, top, "y", byte, false);

        let mut count = 0;
        let min = scopes.allocate_local_variables(top, &tm, 0, true, false, &mut count);
        assert_eq!(scopes.decl(a).frame_displacement, Some(4));
        // byte parameter: 2-byte slot at +6, value in the low byte
        assert_eq!(scopes.decl(b).frame_displacement, Some(7));
        assert_eq!(scopes.decl(c).frame_displacement, Some(8));
        assert_eq!(scopes.decl(x).frame_displacement, Some(-2));
        assert_eq!(scopes.decl(y).frame_displacement, Some(-3));
        assert_eq!(min, -3);
        assert_eq!(count, 2);
    }

    #[test]
    fn first_param_in_reg_gets_a_local_slot() {
        let (mut scopes, tm, word, _) = arena_with_types();
        let top = scopes.new_scope(None, Loc::none());
        let a = declare(&mut scopes, top, "a", word, true);
        let b = declare(&mut scopes, top, "b", word, true);

        let mut count = 0;
        let min = scopes.allocate_local_variables(top, &tm, 0, true, true, &mut count);
        assert_eq!(scopes.decl(a).frame_displacement, Some(-2));
        assert_eq!(scopes.decl(b).frame_displacement, Some(4));
        assert_eq!(min, -2);
    }

    #[test]
    fn child_scopes_extend_the_frame() {
        let (mut scopes, tm, word, byte) = arena_with_types();
        let top = scopes.new_scope(None, Loc::none());
        let inner = scopes.new_scope(Some(top), Loc::none());
        declare(&mut scopes, top, "x", word, false);
        let i = declare(&mut scopes, inner, "i", byte, false);

        let mut count = 0;
        let min = scopes.allocate_local_variables(top, &tm, 0, true, false, &mut count);
        assert_eq!(min, -3);
        assert_eq!(scopes.decl(i).frame_displacement, Some(-3));
        assert_eq!(count, 2);
    }

    #[test]
    fn frame_displacement_arg_forms() {
        let (mut scopes, _tm, word, _) = arena_with_types();
        let top = scopes.new_scope(None, Loc::none());
        let did = declare(&mut scopes, top, "x", word, false);
        scopes.decl_mut(did).frame_displacement = Some(-4);
        assert_eq!(scopes.decl(did).frame_displacement_arg(0), "-4,U");
        assert_eq!(scopes.decl(did).frame_displacement_arg(2), "-2,U");

        let mut g = Declaration::new("g", word, StorageClass::Global, Loc::none());
        g.label = Some("_g".to_string());
        let gid = scopes.declare_variable(top, g).unwrap();
        assert_eq!(scopes.decl(gid).frame_displacement_arg(0), "_g");
        assert_eq!(scopes.decl(gid).frame_displacement_arg(2), "_g+2");
    }
}
