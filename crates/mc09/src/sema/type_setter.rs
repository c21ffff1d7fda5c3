//! Bottom-up expression typing.
//!
//! Runs after scope creation: every node gets its `TypeDesc` in a
//! post-order walk, children before parents. Variable references were
//! already typed when they were resolved; everything else is decided
//! here, including the dialect's deviations from standard C: byte
//! arithmetic stays byte, and a mixed-size integral operation takes
//! the size of the wider operand but the signedness of the *left* one.

use crate::diag::Diagnostics;
use crate::options::CompilerOptions;
use crate::scope::ScopeArena;
use crate::sema::conv::{self, ArgAcceptance};
use crate::sema::tree;
use crate::tranunit::{FunctionInfo, TranslationUnit};
use crate::types::{BasicType, FunctionSignature, TypeManager};
use indexmap::IndexMap;
use lang_mc::ast::{walk, NodeArena, NodeId, NodeKind, Resolved, TypeId, Visitor};
use lang_mc::ops::{BinaryOp, UnaryOp};
use lang_mc::span::Loc;

pub fn set_expression_types(tu: &mut TranslationUnit) {
    let items = tu.top_level.clone();
    let mut setter = TypeSetter {
        types: &mut tu.types,
        scopes: &tu.scopes,
        diags: &mut tu.diags,
        functions: &tu.functions,
        options: &tu.options,
    };
    for item in items {
        walk(&mut tu.arena, item, &mut setter);
    }
}

struct TypeSetter<'a> {
    types: &'a mut TypeManager,
    scopes: &'a ScopeArena,
    diags: &'a mut Diagnostics,
    functions: &'a IndexMap<String, FunctionInfo>,
    options: &'a CompilerOptions,
}

impl<'a> TypeSetter<'a> {
    fn error(&mut self, loc: &Loc, msg: String) {
        self.diags.error(loc, msg);
    }

    fn warn(&mut self, loc: &Loc, msg: String) {
        self.diags.warning(loc, msg);
    }

    fn name(&self, ty: TypeId) -> String {
        self.types.type_to_string(ty)
    }

    fn set(&mut self, arena: &mut NodeArena, id: NodeId, ty: TypeId) {
        arena.set_ty(id, ty);
    }

    // Size is that of the larger operand; signedness is that of the
    // left operand (an unsigned-or-positive-constant left gives an
    // unsigned result).
    fn set_type_for_diff_sized_operands(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        left: NodeId,
        right: NodeId,
    ) {
        let left_size = if tree::desc(arena, self.types, left).base == BasicType::Byte
            || tree::is_8bit_constant(arena, self.types, left)
        {
            1
        } else {
            2
        };
        let right_size = if tree::desc(arena, self.types, right).base == BasicType::Byte
            || tree::is_8bit_constant(arena, self.types, right)
        {
            1
        } else {
            2
        };
        let base = if left_size.max(right_size) == 1 {
            BasicType::Byte
        } else {
            BasicType::Word
        };
        let signed = !tree::is_unsigned_or_positive_const(arena, self.types, left);
        let ty = self.types.basic_type(base, signed);
        self.set(arena, id, ty);
    }

    /// If either operand is real or long, types the node per the
    /// promotion rules and returns true.
    fn set_type_for_real_or_long_operands(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    ) -> bool {
        let loc = arena.loc(id);
        let (lt, rt) = (tree::type_of(arena, left), tree::type_of(arena, right));
        let (ld, rd) = (self.types.get(lt).clone(), self.types.get(rt).clone());
        if ld.is_real() || rd.is_real() {
            if op == BinaryOp::Mod || !ld.is_numerical() || !rd.is_numerical() {
                self.error(
                    &loc,
                    format!(
                        "invalid use of {} with operands of types `{}' and `{}'",
                        op.token(),
                        self.name(lt),
                        self.name(rt)
                    ),
                );
                self.set(arena, id, lt); // fallback
            } else {
                let is_double = ld.is_double() || rd.is_double();
                let ty = self.types.real_type(is_double);
                self.set(arena, id, ty);
            }
            return true;
        }
        if ld.is_long() || rd.is_long() {
            if !ld.is_numerical() || !rd.is_numerical() {
                self.error(
                    &loc,
                    format!(
                        "invalid use of {} with operands of types `{}' and `{}'",
                        op.token(),
                        self.name(lt),
                        self.name(rt)
                    ),
                );
                self.set(arena, id, lt); // fallback
            } else {
                let signed = if ld.is_long() && rd.is_long() {
                    ld.is_signed && rd.is_signed
                } else if ld.is_long() {
                    ld.is_signed
                } else {
                    rd.is_signed
                };
                let ty = self.types.long_type(signed);
                self.set(arena, id, ty);
            }
            return true;
        }
        false
    }

    fn process_bin_op(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (op, left, right) = match arena.kind(id) {
            NodeKind::Binary { op, left, right } => (*op, *left, *right),
            _ => return,
        };
        let loc = arena.loc(id);
        let lt = tree::type_of(arena, left);
        let rt = tree::type_of(arena, right);
        let ld = self.types.get(lt).clone();
        let rd = self.types.get(rt).clone();

        if ld.base == BasicType::Void {
            let lloc = arena.loc(left);
            self.error(
                &lloc,
                format!("left side of operator {} is of type void", op.token()),
            );
        }
        if rd.base == BasicType::Void {
            let rloc = arena.loc(right);
            self.error(
                &rloc,
                format!("right side of operator {} is of type void", op.token()),
            );
        }

        if self.options.warn_sign_compare
            && op.is_order_comparison()
            && ld.is_signed != rd.is_signed
        {
            self.warn(
                &loc,
                format!(
                    "comparison of integers of different signs (`{}' vs `{}'); using unsigned comparison",
                    self.name(lt),
                    self.name(rt)
                ),
            );
        }

        match op {
            BinaryOp::ArrayRef => {
                if !ld.is_ptr_or_array() {
                    self.error(&loc, "array reference on non array or pointer".to_string());
                    let fallback = self.types.basic_type(BasicType::Word, true);
                    self.set(arena, id, fallback);
                    return;
                }
                if !rd.is_integral() {
                    self.error(
                        &loc,
                        format!("array subscript is not an integer (`{}')", self.name(rt)),
                    );
                }
                let pointed = ld.pointed.expect("pointer without pointee");
                self.set(arena, id, pointed);
            }

            BinaryOp::Sub => {
                if ld.is_ptr_or_array() && rd.is_ptr_or_array() {
                    // Compare what each side ultimately points at.
                    let le = ld.pointed.expect("pointer without pointee");
                    let re = rd.pointed.expect("pointer without pointee");
                    let le = self.types.final_array_element_type(le);
                    let re = self.types.final_array_element_type(re);
                    if !self.types.same_types_modulo_const(le, re) {
                        self.error(
                            &loc,
                            format!(
                                "subtraction of incompatible pointers ({} vs {})",
                                self.name(lt),
                                self.name(rt)
                            ),
                        );
                    }
                    // The distance between two pointers is a signed
                    // element count.
                    let ty = self.types.basic_type(BasicType::Word, true);
                    self.set(arena, id, ty);
                    return;
                }
                if ld.is_ptr_or_array() && rd.is_integral() {
                    self.set(arena, id, lt);
                    return;
                }
                if ld.is_integral() && rd.is_ptr_or_array() {
                    self.error(&loc, "subtraction of pointer or array from integral".to_string());
                    self.set(arena, id, lt);
                    return;
                }
                if mixed_byte_word(&ld, &rd) {
                    self.set_type_for_diff_sized_operands(arena, id, left, right);
                    return;
                }
                if self.set_type_for_real_or_long_operands(arena, id, op, left, right) {
                    return;
                }
                self.warn_byte_on_byte(arena, id, op, &ld, &rd);
                self.set(arena, id, lt);
            }

            BinaryOp::Add => {
                if ld.is_ptr_or_array() && rd.is_integral() {
                    self.set(arena, id, lt);
                    return;
                }
                if ld.is_integral() && rd.is_ptr_or_array() {
                    self.set(arena, id, rt);
                    return;
                }
                if self.set_type_for_real_or_long_operands(arena, id, op, left, right) {
                    return;
                }
                self.bitwise_and_multiplicative(arena, id, op, left, right, &loc, lt, rt, &ld, &rd);
            }

            BinaryOp::BitwiseOr | BinaryOp::BitwiseXor | BinaryOp::BitwiseAnd => {
                self.bitwise_and_multiplicative(arena, id, op, left, right, &loc, lt, rt, &ld, &rd);
            }

            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                self.multiplicative(arena, id, op, left, right, &loc, lt, rt, &ld, &rd);
            }

            BinaryOp::Equality
            | BinaryOp::Inequality
            | BinaryOp::Inferior
            | BinaryOp::InferiorOrEqual
            | BinaryOp::Superior
            | BinaryOp::SuperiorOrEqual
            | BinaryOp::LogicalAnd
            | BinaryOp::LogicalOr => {
                let ty = self.types.basic_type(BasicType::Byte, false);
                self.set(arena, id, ty);
            }

            BinaryOp::Assignment
            | BinaryOp::IncAssign
            | BinaryOp::DecAssign
            | BinaryOp::MulAssign
            | BinaryOp::DivAssign
            | BinaryOp::ModAssign
            | BinaryOp::XorAssign
            | BinaryOp::AndAssign
            | BinaryOp::OrAssign => {
                self.check_assignment(arena, id, op, left, right, &loc, lt, rt, &ld, &rd);
                self.set(arena, id, lt);
            }

            BinaryOp::LeftAssign | BinaryOp::RightAssign | BinaryOp::LeftShift
            | BinaryOp::RightShift => {
                self.set(arena, id, lt);
            }
        }
    }

    // The common tail shared by +, the bitwise operators and the
    // multiplicative operators, mirroring the fallthrough ladder of
    // the operator table.
    #[allow(clippy::too_many_arguments)]
    fn bitwise_and_multiplicative(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
        loc: &Loc,
        lt: TypeId,
        rt: TypeId,
        ld: &crate::types::TypeDesc,
        rd: &crate::types::TypeDesc,
    ) {
        if ld.is_real() || rd.is_real() {
            self.error(
                loc,
                format!("invalid use of {} on a floating point type", op.token()),
            );
            self.set(arena, id, lt); // fallback
            return;
        }
        if ld.is_long() || rd.is_long() {
            let ty = if ld.is_long() { lt } else { rt };
            self.set(arena, id, ty);
            return;
        }
        if ld.is_struct() || rd.is_struct() {
            self.error(
                loc,
                format!("invalid use of {} on a struct or union", op.token()),
            );
            self.set(arena, id, lt); // fallback
            return;
        }
        if ld.is_ptr_or_array() && rd.is_integral() {
            self.set(arena, id, lt);
            return;
        }
        if ld.is_integral() && rd.is_ptr_or_array() {
            self.set(arena, id, rt);
            return;
        }
        self.multiplicative(arena, id, op, left, right, loc, lt, rt, ld, rd);
    }

    #[allow(clippy::too_many_arguments)]
    fn multiplicative(
        &mut self,
        arena: &mut NodeArena,
        id: NodeId,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
        loc: &Loc,
        lt: TypeId,
        _rt: TypeId,
        ld: &crate::types::TypeDesc,
        rd: &crate::types::TypeDesc,
    ) {
        if ld.is_ptr_or_array() || rd.is_ptr_or_array() {
            self.error(
                loc,
                format!("operator {} cannot be applied to a pointer", op.token()),
            );
            return;
        }
        if mixed_byte_word(ld, rd) {
            self.set_type_for_diff_sized_operands(arena, id, left, right);
            return;
        }
        if self.set_type_for_real_or_long_operands(arena, id, op, left, right) {
            return;
        }
        self.warn_byte_on_byte(arena, id, op, ld, rd);
        self.set(arena, id, lt);
    }

    /// The dialect keeps `byte op byte` 8 bits wide instead of
    /// promoting to int; optionally warn, since standard C differs.
    fn warn_byte_on_byte(
        &mut self,
        arena: &NodeArena,
        id: NodeId,
        op: BinaryOp,
        ld: &crate::types::TypeDesc,
        rd: &crate::types::TypeDesc,
    ) {
        if self.options.warn_byte_arith
            && ld.base == BasicType::Byte
            && rd.base == BasicType::Byte
            && matches!(
                op,
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
            )
        {
            let loc = arena.loc(id);
            self.warn(
                &loc,
                format!(
                    "operator {} on two byte operands gives a byte result (no promotion to int)",
                    op.token()
                ),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_assignment(
        &mut self,
        arena: &mut NodeArena,
        _id: NodeId,
        op: BinaryOp,
        _left: NodeId,
        right: NodeId,
        loc: &Loc,
        lt: TypeId,
        rt: TypeId,
        ld: &crate::types::TypeDesc,
        rd: &crate::types::TypeDesc,
    ) {
        let mut diag = conv::param_accepts_arg(arena, self.types, self.options, lt, right);
        if diag == ArgAcceptance::NoProblem
            && ld.is_constant
            && self.options.warn_const_incorrect
        {
            diag = ArgAcceptance::WarnConstIncorrect;
        }
        let rloc = arena.loc(right);
        match diag {
            ArgAcceptance::NoProblem => {}
            ArgAcceptance::WarnConstIncorrect => {
                self.warn(
                    &rloc,
                    format!(
                        "assigning `{}' to `{}' is not const-correct",
                        self.name(rt),
                        self.name(lt)
                    ),
                );
            }
            ArgAcceptance::WarnNonPtrArrayForPtr => {
                let ptr_step = (op == BinaryOp::IncAssign || op == BinaryOp::DecAssign)
                    && ld.base == BasicType::Pointer
                    && rd.is_integral();
                if !ptr_step {
                    // accept ptr += num;
                    self.warn(
                        &rloc,
                        format!(
                            "assigning non-pointer/array ({}) to `{}'",
                            self.name(rt),
                            self.name(lt)
                        ),
                    );
                }
            }
            ArgAcceptance::WarnPassingConstantForPtr => {
                if self.options.warn_pass_const_for_ptr {
                    self.warn(
                        &rloc,
                        format!("assigning non-zero numeric constant to `{}'", self.name(lt)),
                    );
                }
            }
            ArgAcceptance::WarnArgumentTooLarge => {
                self.warn(
                    &rloc,
                    format!(
                        "assigning to `{}' from larger type `{}'",
                        self.name(lt),
                        self.name(rt)
                    ),
                );
            }
            ArgAcceptance::WarnRealForIntegral => {
                self.warn(
                    &rloc,
                    format!(
                        "assigning real type `{}' to `{}'",
                        self.name(rt),
                        self.name(lt)
                    ),
                );
            }
            ArgAcceptance::WarnFuncPtrForPtr => {
                self.warn(
                    &rloc,
                    format!(
                        "assigning function pointer `{}' to `{}'",
                        self.name(rt),
                        self.name(lt)
                    ),
                );
            }
            ArgAcceptance::WarnDifferentSignedness => {
                self.warn(
                    &rloc,
                    format!(
                        "assigning `{}' to `{}' changes signedness",
                        self.name(rt),
                        self.name(lt)
                    ),
                );
            }
            ArgAcceptance::WarnVoidPointer => {
                self.warn(
                    &rloc,
                    format!(
                        "assigning `{}' to `{}' (implicit cast of void pointer)",
                        self.name(rt),
                        self.name(lt)
                    ),
                );
            }
            ArgAcceptance::ErrorMsg => {
                let null_to_ptr = ld.base == BasicType::Pointer
                    && conv::is_zero_cast_to_void_pointer(arena, self.types, right);
                if ld.base != BasicType::Void && !null_to_ptr {
                    self.error(
                        &rloc,
                        format!("assigning `{}' to `{}'", self.name(rt), self.name(lt)),
                    );
                }
            }
        }

        // Compound assignments put numeric demands on both sides.
        if op != BinaryOp::Assignment && (ld.base == BasicType::Class || rd.base == BasicType::Class)
        {
            let error = match op {
                BinaryOp::IncAssign
                | BinaryOp::DecAssign
                | BinaryOp::MulAssign
                | BinaryOp::DivAssign => !ld.is_numerical() || !rd.is_numerical(),
                BinaryOp::ModAssign
                | BinaryOp::AndAssign
                | BinaryOp::OrAssign
                | BinaryOp::XorAssign => !ld.is_integral() || !rd.is_integral(),
                _ => true,
            };
            if error {
                self.error(
                    loc,
                    format!("invalid use of {} on a struct or union", op.token()),
                );
            }
        }
    }

    fn check_unary_on_class(&mut self, arena: &NodeArena, sub: NodeId, op: UnaryOp) -> bool {
        let td = tree::desc(arena, self.types, sub).clone();
        if td.base == BasicType::Class && !td.is_long() {
            let loc = arena.loc(sub);
            let what = if td.is_real() {
                self.name(tree::type_of(arena, sub))
            } else if td.is_union {
                "union".to_string()
            } else {
                "struct".to_string()
            };
            self.error(&loc, format!("invalid use of {} on a {}", op.name(), what));
            return false;
        }
        true
    }

    fn process_unary_op(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (op, sub, sizeof_type) = match arena.kind(id) {
            NodeKind::Unary {
                op,
                expr,
                sizeof_type,
            } => (*op, *expr, *sizeof_type),
            _ => return,
        };
        let loc = arena.loc(id);

        if let Some(sub) = sub {
            if tree::desc(arena, self.types, sub).base == BasicType::Void {
                let sloc = arena.loc(sub);
                self.error(
                    &sloc,
                    format!("argument of {} operator is of type void", op.name()),
                );
                let fallback = self.types.basic_type(BasicType::Word, true);
                self.set(arena, id, fallback);
                return;
            }
        }

        match op {
            UnaryOp::AddressOf => {
                let sub = sub.expect("address-of without operand");
                let st = tree::type_of(arena, sub);
                let sd = self.types.get(st).clone();
                if sd.base == BasicType::Array {
                    // Address of T[] is T *.
                    let elem = sd.pointed.expect("array without element type");
                    let ty = self.types.pointer_to(elem);
                    self.set(arena, id, ty);
                    return;
                }
                if matches!(
                    arena.kind(sub),
                    NodeKind::Identifier {
                        resolved: Some(Resolved::FunctionAddress(_)),
                        ..
                    }
                ) {
                    // '&' on a function name: the address of that
                    // function, already a function pointer.
                    self.set(arena, id, st);
                    return;
                }
                // Taking the address of a pointer is supported.
                let ty = self.types.pointer_to(st);
                self.set(arena, id, ty);
            }

            UnaryOp::Indirection => {
                let sub = sub.expect("indirection without operand");
                let st = tree::type_of(arena, sub);
                let sd = self.types.get(st).clone();
                if !matches!(
                    sd.base,
                    BasicType::Pointer | BasicType::Array | BasicType::Function
                ) {
                    let ty = self.types.pointer_to_void();
                    self.set(arena, id, ty);
                    self.error(
                        &loc,
                        format!(
                            "indirection using `{}' as pointer (assuming `void *')",
                            self.name(st)
                        ),
                    );
                    return;
                }
                if !self.check_unary_on_class(arena, sub, op) {
                    self.set(arena, id, st);
                    return;
                }
                if sd.base == BasicType::Function {
                    self.set(arena, id, st);
                } else {
                    self.set(arena, id, sd.pointed.expect("pointer without pointee"));
                }
            }

            UnaryOp::SizeOf => {
                let ty = self.types.basic_type(BasicType::Word, false);
                self.set(arena, id, ty);
                let measured = match sizeof_type {
                    Some(t) => Some(t),
                    None => sub.map(|s| tree::type_of(arena, s)),
                };
                if let Some(t) = measured {
                    if self.types.size_of(t).is_none() {
                        self.error(
                            &loc,
                            format!("cannot take sizeof of incomplete type `{}'", self.name(t)),
                        );
                    }
                }
            }

            UnaryOp::BooleanNeg => {
                let ty = self.types.basic_type(BasicType::Byte, false);
                self.set(arena, id, ty);
                let sub = sub.expect("boolean negation without operand");
                if tree::desc(arena, self.types, sub).is_numerical() {
                    return;
                }
                self.check_unary_on_class(arena, sub, op);
            }

            UnaryOp::Neg => {
                // Negation always returns a signed type.
                let sub = sub.expect("negation without operand");
                let st = tree::type_of(arena, sub);
                let sd = self.types.get(st).clone();
                if sd.is_byte_or_word() {
                    let ty = self.types.basic_type(sd.base, true);
                    self.set(arena, id, ty);
                } else if sd.is_real() || sd.is_long() {
                    self.set(arena, id, st); // same type
                } else if !self.check_unary_on_class(arena, sub, op) {
                    // fall back on int, to avoid further error messages
                    let ty = self.types.basic_type(BasicType::Word, true);
                    self.set(arena, id, ty);
                } else {
                    self.set(arena, id, st);
                }
            }

            UnaryOp::Identity => {
                let sub = sub.expect("unary plus without operand");
                let st = tree::type_of(arena, sub);
                if self.types.get(st).is_numerical() {
                    self.set(arena, id, st);
                } else if !self.check_unary_on_class(arena, sub, op) {
                    let ty = self.types.basic_type(BasicType::Word, true);
                    self.set(arena, id, ty);
                } else {
                    self.set(arena, id, st);
                }
            }

            UnaryOp::PreDec | UnaryOp::PreInc | UnaryOp::PostDec | UnaryOp::PostInc => {
                let sub = sub.expect("increment without operand");
                let st = tree::type_of(arena, sub);
                self.set(arena, id, st); // same type
                if !self.types.get(st).is_numerical() {
                    self.check_unary_on_class(arena, sub, op);
                }
            }

            UnaryOp::BitwiseNot => {
                let sub = sub.expect("bitwise not without operand");
                let st = tree::type_of(arena, sub);
                self.set(arena, id, st);
                self.check_unary_on_class(arena, sub, op);
            }
        }
    }

    fn process_cast(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (target, sub) = match arena.kind(id) {
            NodeKind::Cast { target, expr } => (*target, *expr),
            _ => return,
        };
        let loc = arena.loc(id);
        self.set(arena, id, target);
        let td = self.types.get(target).clone();
        let sd = tree::desc(arena, self.types, sub).clone();
        if td.base == BasicType::Class && !td.is_numerical() {
            self.error(&loc, format!("cannot cast to struct `{}'", self.name(target)));
        } else if td.is_real() && sd.is_ptr_or_array() {
            let st = tree::type_of(arena, sub);
            self.error(
                &loc,
                format!("cannot cast `{}' to `{}'", self.name(st), self.name(target)),
            );
        } else if td.is_ptr_or_array() && sd.is_real() {
            let st = tree::type_of(arena, sub);
            self.error(
                &loc,
                format!("cannot cast `{}' to `{}'", self.name(st), self.name(target)),
            );
        }
        debug_assert!(td.base != BasicType::Array); // no syntax for this
    }

    fn process_conditional(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (true_expr, false_expr) = match arena.kind(id) {
            NodeKind::Conditional {
                true_expr,
                false_expr,
                ..
            } => (*true_expr, *false_expr),
            _ => return,
        };
        let loc = arena.loc(id);
        let tt = tree::type_of(arena, true_expr);
        let ft = tree::type_of(arena, false_expr);
        let td = self.types.get(tt).clone();
        let fd = self.types.get(ft).clone();

        // Both expressions must be of the same type, but if one of
        // them is an 8-bit constant, take it as a byte expression.
        // This allows "char b = (cond ? 42 : 43);" without a useless
        // warning about assigning a word to a byte.
        let t_is8 = tree::is_8bit_constant(arena, self.types, true_expr);
        let f_is8 = tree::is_8bit_constant(arena, self.types, false_expr);
        if t_is8 && f_is8 {
            let ty = self.types.basic_type(BasicType::Byte, td.is_signed);
            self.set(arena, id, ty);
            return;
        }
        if td.base == BasicType::Byte && f_is8 {
            let ty = self.types.basic_type(BasicType::Byte, td.is_signed);
            self.set(arena, id, ty);
            return;
        }
        if t_is8 && fd.base == BasicType::Byte {
            let ty = self.types.basic_type(BasicType::Byte, fd.is_signed);
            self.set(arena, id, ty);
            return;
        }
        if td.is_ptr_or_array() != fd.is_ptr_or_array() {
            self.error(
                &loc,
                format!(
                    "true and false expressions of conditional are of incompatible types ({} vs {})",
                    self.name(tt),
                    self.name(ft)
                ),
            );
            self.set(arena, id, tt); // fallback
            return;
        }

        if td.is_ptr_or_array() {
            self.set(arena, id, tt); // both types must be ptr/array
        } else {
            // The type of the result is the larger of the two types.
            // If same size, the true expression's type is used.
            let ts = self.types.size_of(tt).unwrap_or(0);
            let fs = self.types.size_of(ft).unwrap_or(0);
            let ty = if ts >= fs { tt } else { ft };
            self.set(arena, id, ty);
        }

        let pointees_match = match (td.pointed, fd.pointed) {
            (Some(a), Some(b)) => self.types.same_types_modulo_const(a, b),
            _ => false,
        };
        if !self.types.same_types_modulo_const(tt, ft) && !pointees_match {
            let result = tree::type_of(arena, id);
            self.warn(
                &loc,
                format!(
                    "true and false expressions of conditional are not of the same type ({} vs {}); result is of type {}",
                    self.name(tt),
                    self.name(ft),
                    self.name(result)
                ),
            );
        }
    }

    fn process_object_member(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (object, member, direct) = match arena.kind(id) {
            NodeKind::ObjectMember {
                object,
                member,
                direct,
            } => (*object, member.clone(), *direct),
            _ => return,
        };
        let loc = arena.loc(id);
        let ot = tree::type_of(arena, object);
        let od = self.types.get(ot).clone();

        if direct && !od.is_struct() {
            self.error(
                &loc,
                format!(
                    "left side of dot operator must be a struct but is of type {}",
                    self.name(ot)
                ),
            );
            let fallback = self.types.basic_type(BasicType::Word, true);
            self.set(arena, id, fallback);
            return;
        }
        if !direct {
            let pointee_is_struct = od.base == BasicType::Pointer
                && od
                    .pointed
                    .map(|p| self.types.get(p).is_struct())
                    .unwrap_or(false);
            if !pointee_is_struct {
                self.error(
                    &loc,
                    format!(
                        "left side of arrow operator must be a pointer to a struct but is of type {}",
                        self.name(ot)
                    ),
                );
                let fallback = self.types.basic_type(BasicType::Word, true);
                self.set(arena, id, fallback);
                return;
            }
        }

        let class_name = if direct {
            od.class_name.clone()
        } else {
            let p = od.pointed.expect("pointer without pointee");
            self.types.get(p).class_name.clone()
        };

        let member_info = self
            .types
            .class_def(&class_name)
            .and_then(|def| def.member(&member))
            .map(|m| (m.member_type, m.dims.clone()));
        match member_info {
            Some((mt, dims)) => {
                debug_assert!(self.types.get(mt).base != BasicType::Void);
                let ty = if dims.is_empty() {
                    mt
                } else {
                    let dims: Vec<Option<u16>> = dims.iter().map(|&d| Some(d)).collect();
                    self.types.array_of(mt, &dims)
                };
                self.set(arena, id, ty);
            }
            None => {
                self.error(
                    &loc,
                    format!("struct {} has no member named {}", class_name, member),
                );
                let fallback = self.types.basic_type(BasicType::Word, true);
                self.set(arena, id, fallback);
            }
        }
    }

    fn process_function_call(&mut self, arena: &mut NodeArena, id: NodeId) {
        let (callee, args, func_ptr_var) = match arena.kind(id) {
            NodeKind::FunctionCall {
                callee,
                args,
                func_ptr_var,
            } => (*callee, args.clone(), *func_ptr_var),
            _ => return,
        };
        let loc = arena.loc(id);

        // A call through a pointer: the callee expression (or the
        // named function-pointer variable) supplies the signature.
        let named_function = match arena.kind(callee) {
            NodeKind::Identifier { name, .. } if func_ptr_var.is_none() => {
                self.functions.get(name).map(|f| (name.clone(), f))
            }
            _ => None,
        };

        let (function_id, signature) = match named_function {
            Some((name, info)) => {
                let sig = self
                    .types
                    .get(info.func_type)
                    .signature
                    .clone()
                    .expect("function type without signature");
                (Some(name), sig)
            }
            None => {
                let mut ft = tree::type_of(arena, callee);
                let mut fd = self.types.get(ft).clone();
                if fd.base == BasicType::Pointer {
                    let p = fd.pointed.expect("pointer without pointee");
                    if self.types.get(p).base == BasicType::Function {
                        ft = p;
                        fd = self.types.get(ft).clone();
                    }
                }
                if fd.base != BasicType::Function {
                    let cloc = arena.loc(callee);
                    self.error(
                        &cloc,
                        format!(
                            "function pointer call through expression of invalid type (`{}')",
                            self.name(tree::type_of(arena, callee))
                        ),
                    );
                    let fallback = self.types.basic_type(BasicType::Word, true);
                    self.set(arena, id, fallback);
                    return;
                }
                (None, fd.signature.clone().expect("function without signature"))
            }
        };

        if signature.is_interrupt_service_routine {
            match &function_id {
                Some(name) => self.error(
                    &loc,
                    format!(
                        "calling function {}() is forbidden because it is an interrupt service routine",
                        name
                    ),
                ),
                None => self.error(&loc, "calling an interrupt service routine is forbidden".to_string()),
            }
            self.set(arena, id, signature.return_type);
            return;
        }

        self.set(arena, id, signature.return_type);
        self.check_call_arguments(arena, &loc, function_id.as_deref(), &signature, &args);
    }

    fn check_call_arguments(
        &mut self,
        arena: &NodeArena,
        loc: &Loc,
        function_id: Option<&str>,
        signature: &FunctionSignature,
        args: &[NodeId],
    ) {
        let expected = signature.params.len();
        let acceptable = if signature.ends_with_ellipsis {
            args.len() >= expected
        } else {
            args.len() == expected
        };
        let display = function_id
            .map(|f| format!("{}()", f))
            .unwrap_or_else(|| "function via pointer".to_string());
        if !acceptable {
            self.error(
                loc,
                format!(
                    "call to {} passes {} argument(s) but function expects {}{}",
                    display,
                    args.len(),
                    if signature.ends_with_ellipsis {
                        "at least "
                    } else {
                        ""
                    },
                    expected
                ),
            );
            return;
        }

        for (index, (&param, &arg)) in signature.params.iter().zip(args.iter()).enumerate() {
            let n = index + 1;
            let at = tree::type_of(arena, arg);
            let aloc = arena.loc(arg);
            use ArgAcceptance::*;
            match conv::param_accepts_arg(arena, self.types, self.options, param, arg) {
                NoProblem => {}
                WarnConstIncorrect => self.warn(
                    &aloc,
                    format!(
                        "`{}' used as parameter {} of {} which is `{}' (not const-correct)",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
                WarnNonPtrArrayForPtr => self.warn(
                    &aloc,
                    format!(
                        "passing non-pointer/array ({}) as parameter {} of {}, which is `{}'",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
                WarnPassingConstantForPtr => {
                    if self.options.warn_pass_const_for_ptr {
                        self.warn(
                            &aloc,
                            format!(
                                "passing non-zero numeric constant as parameter {} of {}, which is `{}'",
                                n,
                                display,
                                self.name(param)
                            ),
                        );
                    }
                }
                WarnArgumentTooLarge => self.warn(
                    &aloc,
                    format!(
                        "`{}' argument is too large for parameter {} of {}, which is `{}'",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
                WarnRealForIntegral => self.warn(
                    &aloc,
                    format!(
                        "passing real type `{}' for parameter {} of {}, which is `{}'",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
                WarnFuncPtrForPtr => self.warn(
                    &aloc,
                    format!(
                        "passing function pointer `{}' for parameter {} of {}, which is `{}'",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
                WarnDifferentSignedness => self.warn(
                    &aloc,
                    format!(
                        "`{}' used as parameter {} of {} which is `{}' (different signedness)",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
                WarnVoidPointer => self.warn(
                    &aloc,
                    format!(
                        "passing `{}' for parameter of type `{}' (implicit cast of void pointer)",
                        self.name(at),
                        self.name(param)
                    ),
                ),
                ErrorMsg => self.error(
                    &aloc,
                    format!(
                        "`{}' used as parameter {} of {} which is `{}'",
                        self.name(at),
                        n,
                        display,
                        self.name(param)
                    ),
                ),
            }
        }
    }
}

impl<'a> Visitor for TypeSetter<'a> {
    fn close(&mut self, arena: &mut NodeArena, id: NodeId) -> bool {
        match arena.kind(id) {
            NodeKind::WordConstant {
                is_word, is_signed, ..
            } => {
                let base = if *is_word {
                    BasicType::Word
                } else {
                    BasicType::Byte
                };
                let signed = *is_signed;
                let ty = self.types.basic_type(base, signed);
                self.set(arena, id, ty);
            }
            NodeKind::DWordConstant { is_signed, .. } => {
                let signed = *is_signed;
                let ty = self.types.long_type(signed);
                self.set(arena, id, ty);
            }
            NodeKind::RealConstant { is_double, .. } => {
                let is_double = *is_double;
                let ty = self.types.real_type(is_double);
                self.set(arena, id, ty);
            }
            NodeKind::StringLiteral { value } => {
                let len = value.len() as u16 + 1;
                let ch = self.types.basic_type(BasicType::Byte, true);
                let ty = self.types.array_of(ch, &[Some(len)]);
                self.set(arena, id, ty);
            }
            NodeKind::Identifier { name, .. } => {
                if arena.ty(id).is_none() {
                    // An enumerated name gets its enum's type; an
                    // unresolved identifier was already diagnosed and
                    // falls back to int to limit the noise.
                    let name = name.clone();
                    let ty = self
                        .types
                        .enumerator_type(&name)
                        .unwrap_or_else(|| self.types.basic_type(BasicType::Word, true));
                    self.set(arena, id, ty);
                }
            }
            NodeKind::Binary { .. } => self.process_bin_op(arena, id),
            NodeKind::Unary { .. } => self.process_unary_op(arena, id),
            NodeKind::Cast { .. } => self.process_cast(arena, id),
            NodeKind::Conditional { .. } => self.process_conditional(arena, id),
            NodeKind::ObjectMember { .. } => self.process_object_member(arena, id),
            NodeKind::FunctionCall { .. } => self.process_function_call(arena, id),
            NodeKind::Comma { exprs } => {
                if let Some(&last) = exprs.last() {
                    let lt = tree::type_of(arena, last);
                    if self.types.get(lt).base == BasicType::Void {
                        let lloc = arena.loc(last);
                        self.error(
                            &lloc,
                            "last sub-expression of comma expression is of type void".to_string(),
                        );
                    } else {
                        self.set(arena, id, lt);
                    }
                }
            }
            NodeKind::VarDecl { decl, .. } => {
                if let Some(did) = decl {
                    let ty = self.scopes.decl(*did).decl_type;
                    self.set(arena, id, ty);
                }
            }
            _ => {}
        }
        true
    }
}

fn mixed_byte_word(ld: &crate::types::TypeDesc, rd: &crate::types::TypeDesc) -> bool {
    (ld.base == BasicType::Word && rd.base == BasicType::Byte)
        || (ld.base == BasicType::Byte && rd.base == BasicType::Word)
}
