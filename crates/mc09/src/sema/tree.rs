//! Read-only queries over typed trees.
//!
//! These free functions answer the questions every later stage keeps
//! asking of an expression node: its type descriptor, whether it is a
//! constant, whether it fits a byte. They assume the expression type
//! setter has run; asking for the type of an untyped node is a
//! compiler bug.

use crate::sema::const_eval::evaluate_constant_expr;
use crate::types::{TypeDesc, TypeManager};
use lang_mc::ast::{DeclId, NodeArena, NodeId, NodeKind, Resolved, TypeId};

/// Type of an expression node. Panics when the node has not been
/// typed; the type setter runs before anything that calls this.
pub fn type_of(arena: &NodeArena, id: NodeId) -> TypeId {
    arena
        .ty(id)
        .unwrap_or_else(|| panic!("untyped expression node {:?}", id))
}

pub fn desc<'a>(arena: &NodeArena, tm: &'a TypeManager, id: NodeId) -> &'a TypeDesc {
    tm.get(type_of(arena, id))
}

pub fn is_signed(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    desc(arena, tm, id).is_signed
}

pub fn type_size(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> Option<u16> {
    tm.size_of(type_of(arena, id))
}

/// The declaration behind an expression that is directly a variable
/// reference, looking through the identifier wrapper.
pub fn as_variable(arena: &NodeArena, id: NodeId) -> Option<DeclId> {
    match arena.kind(id) {
        NodeKind::Identifier {
            resolved: Some(Resolved::Variable(decl)),
            ..
        } => Some(*decl),
        _ => None,
    }
}

/// True for an unsigned expression, or a signed one whose constant
/// value is known not to be negative.
pub fn is_unsigned_or_positive_const(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    let d = desc(arena, tm, id);
    if !d.is_signed {
        return true;
    }
    let value = match evaluate_constant_expr(arena, tm, id) {
        Some(v) => v,
        None => return false,
    };
    if d.base == crate::types::BasicType::Byte {
        (value & 0xFF) <= 0x7F
    } else {
        value <= 0x7FFF
    }
}

pub fn is_expression_always_true(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    matches!(evaluate_constant_expr(arena, tm, id), Some(v) if v != 0)
}

pub fn is_expression_always_false(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    evaluate_constant_expr(arena, tm, id) == Some(0)
}

fn is_cast_to_multi_byte_type(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    match arena.kind(id) {
        NodeKind::Cast { target, .. } => {
            let d = tm.get(*target);
            !matches!(d.base, crate::types::BasicType::Byte) && tm.size_of(*target) != Some(1)
        }
        _ => false,
    }
}

/// A constant whose value fits in one byte, whatever the type of the
/// expression. A value like $FFB0 counts when the tree is signed (the
/// user wrote a small negative number), not when it is unsigned.
pub fn is_8bit_constant(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    if is_cast_to_multi_byte_type(arena, tm, id) {
        return false;
    }
    let value = match evaluate_constant_expr(arena, tm, id) {
        Some(v) => v,
        None => return false,
    };
    if value <= 255 {
        return true;
    }
    (value as i16) >= -128 && (value as i16) < 0 && is_signed(arena, tm, id)
}

pub fn fits_8_bits(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    desc(arena, tm, id).base == crate::types::BasicType::Byte || is_8bit_constant(arena, tm, id)
}

/// `SEX` extends a signed byte in B into D; `CLRA` zero-extends.
pub fn conv_to_word_ins(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> &'static str {
    if is_signed(arena, tm, id) {
        "SEX"
    } else {
        "CLRA"
    }
}

pub fn load_ins(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> &'static str {
    if desc(arena, tm, id).base == crate::types::BasicType::Byte {
        "LDB"
    } else {
        "LDD"
    }
}

pub fn store_ins(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> &'static str {
    if desc(arena, tm, id).base == crate::types::BasicType::Byte {
        "STB"
    } else {
        "STD"
    }
}
