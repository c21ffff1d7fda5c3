//! Constant-expression evaluation.
//!
//! Folds an expression to a 16-bit value when every part of it is
//! known at compile time. Returns `None` otherwise, including on a
//! division or modulo by zero, and for string literals: the program is
//! assumed relocatable, so the address of a character array is not a
//! predictable number.
//!
//! The expression type setter must have run on the tree first, because
//! folding of signed operations depends on the operand types.

use crate::types::{BasicType, TypeManager};
use lang_mc::ast::{NodeArena, NodeId, NodeKind};
use lang_mc::ops::{BinaryOp, UnaryOp};

pub fn evaluate_constant_expr(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> Option<u16> {
    match arena.kind(id) {
        NodeKind::WordConstant { value, .. } => Some(*value),

        NodeKind::Binary { op, left, right } => {
            let (lv, rv) = (
                sign_extended_operand(arena, tm, *left)?,
                sign_extended_operand(arena, tm, *right)?,
            );
            let both_signed = signed(arena, tm, *left) && signed(arena, tm, *right);
            match op {
                BinaryOp::Add => Some(lv.wrapping_add(rv)),
                BinaryOp::Sub => Some(lv.wrapping_sub(rv)),
                BinaryOp::Mul => {
                    if both_signed {
                        Some((lv as i16).wrapping_mul(rv as i16) as u16)
                    } else {
                        Some(lv.wrapping_mul(rv))
                    }
                }
                BinaryOp::Div => {
                    if rv == 0 {
                        None
                    } else if both_signed {
                        Some((lv as i16).wrapping_div(rv as i16) as u16)
                    } else {
                        Some(lv / rv)
                    }
                }
                BinaryOp::Mod => {
                    if rv == 0 {
                        None
                    } else if both_signed {
                        Some((lv as i16).wrapping_rem(rv as i16) as u16)
                    } else {
                        Some(lv % rv)
                    }
                }
                BinaryOp::BitwiseOr => Some(lv | rv),
                BinaryOp::BitwiseXor => Some(lv ^ rv),
                BinaryOp::BitwiseAnd => Some(lv & rv),
                BinaryOp::LeftShift => Some(lv.wrapping_shl(u32::from(rv))),
                BinaryOp::RightShift => {
                    if signed(arena, tm, *left) {
                        Some(((lv as i16).wrapping_shr(u32::from(rv))) as u16)
                    } else {
                        Some(lv.wrapping_shr(u32::from(rv)))
                    }
                }
                _ => None,
            }
        }

        NodeKind::Unary {
            op,
            expr,
            sizeof_type,
        } => match op {
            UnaryOp::SizeOf => {
                if let Some(ty) = sizeof_type {
                    return tm.size_of(*ty);
                }
                // sizeof of an expression never evaluates it; the type
                // setter stored the measured size in the node's type
                // annotation step, so compute from the operand type.
                let sub = (*expr)?;
                let sub_ty = arena.ty(sub)?;
                tm.size_of(sub_ty)
            }
            UnaryOp::Identity => evaluate_constant_expr(arena, tm, (*expr)?),
            UnaryOp::Neg => {
                Some(evaluate_constant_expr(arena, tm, (*expr)?)?.wrapping_neg())
            }
            UnaryOp::BooleanNeg => {
                Some((evaluate_constant_expr(arena, tm, (*expr)?)? == 0) as u16)
            }
            UnaryOp::BitwiseNot => Some(!evaluate_constant_expr(arena, tm, (*expr)?)?),
            _ => None,
        },

        // Casting to long is not considered constant because the
        // result would not necessarily fit 16 bits.
        NodeKind::Cast { target, expr } => {
            let d = tm.get(*target);
            if !d.is_byte_or_word() {
                return None;
            }
            let sub = evaluate_constant_expr(arena, tm, *expr)?;
            match d.base {
                BasicType::Byte => Some(if d.is_signed { sub } else { sub & 0xFF }),
                _ => Some(sub),
            }
        }

        NodeKind::Identifier { name, .. } => tm.enumerator_value(name),

        _ => None,
    }
}

/// Operand value with signed bytes extended to 16 bits, so that
/// folding `-1 + 1` over `char` operands works out.
fn sign_extended_operand(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> Option<u16> {
    let mut value = evaluate_constant_expr(arena, tm, id)?;
    if let Some(ty) = arena.ty(id) {
        let d = tm.get(ty);
        if d.base == BasicType::Byte && d.is_signed && value >= 0x0080 && value <= 0x00FF {
            value |= 0xFF00;
        }
    }
    Some(value)
}

fn signed(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    arena.ty(id).map(|t| tm.get(t).is_signed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang_mc::span::Loc;
    use pretty_assertions::assert_eq;

    fn word(arena: &mut NodeArena, tm: &mut TypeManager, value: u16, signed: bool) -> NodeId {
        let id = arena.alloc(
            NodeKind::WordConstant {
                value,
                is_word: true,
                is_signed: signed,
            },
            Loc::none(),
        );
        let ty = tm.basic_type(BasicType::Word, signed);
        arena.set_ty(id, ty);
        id
    }

    fn bin(
        arena: &mut NodeArena,
        tm: &mut TypeManager,
        op: BinaryOp,
        l: NodeId,
        r: NodeId,
    ) -> NodeId {
        let id = arena.alloc(NodeKind::Binary { op, left: l, right: r }, Loc::none());
        let ty = tm.basic_type(BasicType::Word, true);
        arena.set_ty(id, ty);
        id
    }

    #[test]
    fn folds_arithmetic() {
        let mut arena = NodeArena::new();
        let mut tm = TypeManager::new();
        let two = word(&mut arena, &mut tm, 2, true);
        let three = word(&mut arena, &mut tm, 3, true);
        let sum = bin(&mut arena, &mut tm, BinaryOp::Add, two, three);
        assert_eq!(evaluate_constant_expr(&arena, &tm, sum), Some(5));
    }

    #[test]
    fn division_by_zero_is_not_constant() {
        let mut arena = NodeArena::new();
        let mut tm = TypeManager::new();
        let one = word(&mut arena, &mut tm, 1, true);
        let zero = word(&mut arena, &mut tm, 0, true);
        let div = bin(&mut arena, &mut tm, BinaryOp::Div, one, zero);
        assert_eq!(evaluate_constant_expr(&arena, &tm, div), None);
    }

    #[test]
    fn signed_and_unsigned_division_differ() {
        let mut arena = NodeArena::new();
        let mut tm = TypeManager::new();
        // 0xFFFE is -2 signed: -2 / 2 == -1, but 65534 / 2 == 32767.
        let l_signed = word(&mut arena, &mut tm, 0xFFFE, true);
        let r_signed = word(&mut arena, &mut tm, 2, true);
        let div_signed = bin(&mut arena, &mut tm, BinaryOp::Div, l_signed, r_signed);
        assert_eq!(
            evaluate_constant_expr(&arena, &tm, div_signed),
            Some(0xFFFFu16)
        );

        let l_uns = word(&mut arena, &mut tm, 0xFFFE, false);
        let r_uns = word(&mut arena, &mut tm, 2, false);
        let div_uns = bin(&mut arena, &mut tm, BinaryOp::Div, l_uns, r_uns);
        assert_eq!(evaluate_constant_expr(&arena, &tm, div_uns), Some(32767));
    }

    #[test]
    fn string_literal_is_not_constant() {
        let mut arena = NodeArena::new();
        let tm = TypeManager::new();
        let s = arena.alloc(
            NodeKind::StringLiteral {
                value: "hi".to_string(),
            },
            Loc::none(),
        );
        assert_eq!(evaluate_constant_expr(&arena, &tm, s), None);
    }

    #[test]
    fn enumerator_folds_by_name() {
        let mut arena = NodeArena::new();
        let mut tm = TypeManager::new();
        let wt = tm.basic_type(BasicType::Word, true);
        tm.declare_enumerator("GREEN", 7, Some("Color"), wt);
        let id = arena.alloc(
            NodeKind::Identifier {
                name: "GREEN".to_string(),
                resolved: None,
            },
            Loc::none(),
        );
        assert_eq!(evaluate_constant_expr(&arena, &tm, id), Some(7));
    }

    #[test]
    fn cast_to_unsigned_byte_masks() {
        let mut arena = NodeArena::new();
        let mut tm = TypeManager::new();
        let v = word(&mut arena, &mut tm, 0x1234, false);
        let byte = tm.basic_type(BasicType::Byte, false);
        let cast = arena.alloc(
            NodeKind::Cast {
                target: byte,
                expr: v,
            },
            Loc::none(),
        );
        arena.set_ty(cast, byte);
        assert_eq!(evaluate_constant_expr(&arena, &tm, cast), Some(0x34));
    }
}
