//! Implicit-conversion legality.
//!
//! [`param_accepts_arg`] is the single authority on whether a value of
//! one type may be supplied where another type is expected: for
//! function arguments, and reused by the type setter for the whole
//! assignment family. The decision table below is deliberate about
//! every case; changing a branch changes user-visible diagnostics.

use crate::options::CompilerOptions;
use crate::sema::const_eval::evaluate_constant_expr;
use crate::sema::tree;
use crate::types::{BasicType, TypeManager};
use lang_mc::ast::{NodeArena, NodeId, NodeKind, TypeId};

/// Outcome of matching an argument against a parameter type, ordered
/// from harmless to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgAcceptance {
    NoProblem,
    WarnConstIncorrect,
    WarnNonPtrArrayForPtr,
    /// A non-zero numeric constant supplied for a pointer.
    WarnPassingConstantForPtr,
    WarnArgumentTooLarge,
    WarnRealForIntegral,
    /// A function pointer supplied for `void *`.
    WarnFuncPtrForPtr,
    WarnDifferentSignedness,
    WarnVoidPointer,
    ErrorMsg,
}

/// `(void *) 0`, the shape a null-pointer macro expands to.
pub fn is_zero_cast_to_void_pointer(arena: &NodeArena, tm: &TypeManager, id: NodeId) -> bool {
    match arena.kind(id) {
        NodeKind::Cast { target, expr } => {
            let d = tm.get(*target);
            d.base == BasicType::Pointer
                && d.pointed
                    .map(|p| tm.get(p).base == BasicType::Void)
                    .unwrap_or(false)
                && evaluate_constant_expr(arena, tm, *expr) == Some(0)
        }
        _ => false,
    }
}

pub fn param_accepts_arg(
    arena: &NodeArena,
    tm: &TypeManager,
    options: &CompilerOptions,
    param: TypeId,
    arg: NodeId,
) -> ArgAcceptance {
    use ArgAcceptance::*;

    let param_desc = tm.get(param);
    let arg_ty = tree::type_of(arena, arg);
    let arg_desc = tm.get(arg_ty);

    match param_desc.base {
        BasicType::Byte => {
            if !arg_desc.is_numerical() {
                return ErrorMsg;
            }
            if arg_desc.base != BasicType::Byte && tree::is_8bit_constant(arena, tm, arg) {
                // Argument wider than a byte, but the value is known
                // and fits one.
                return NoProblem;
            }
            match (tm.size_of(arg_ty), tm.size_of(param)) {
                (Some(a), Some(p)) if a <= p => NoProblem,
                _ => WarnArgumentTooLarge,
            }
        }

        BasicType::Word | BasicType::Sizeless => {
            if param_desc.is_integral() && arg_desc.is_real() {
                return WarnRealForIntegral; // e.g. short <- float
            }
            if arg_desc.is_numerical() || arg_desc.is_ptr_or_array() {
                NoProblem
            } else {
                ErrorMsg
            }
        }

        BasicType::Class => {
            if param_desc.is_numerical() {
                if param_desc.is_real() && arg_desc.is_ptr_or_array() {
                    return ErrorMsg; // e.g. float <- float *
                }
                if param_desc.is_integral() && arg_desc.is_real() {
                    return WarnRealForIntegral; // e.g. long <- float
                }
                return if arg_desc.is_numerical() || arg_desc.is_ptr_or_array() {
                    NoProblem
                } else {
                    ErrorMsg
                };
            }
            // The parameter is a user struct.
            if arg_desc.is_struct() && param_desc.class_name == arg_desc.class_name {
                NoProblem
            } else {
                ErrorMsg
            }
        }

        BasicType::Pointer | BasicType::Array => {
            if arg_desc.is_numerical() {
                return match evaluate_constant_expr(arena, tm, arg) {
                    None => WarnNonPtrArrayForPtr,
                    Some(v) if v != 0 => WarnPassingConstantForPtr,
                    Some(_) => NoProblem,
                };
            }
            if !arg_desc.is_ptr_or_array() {
                return ErrorMsg;
            }
            let param_pointee = param_desc.pointed.expect("pointer without pointee");
            let arg_pointee = arg_desc.pointed.expect("pointer without pointee");

            // A void * parameter accepts a pointer of any type, except
            // a function pointer.
            if tm.get(param_pointee).base == BasicType::Void && tm.is_ptr_to_function(arg_ty) {
                return WarnFuncPtrForPtr;
            }
            if is_zero_cast_to_void_pointer(arena, tm, arg) {
                return NoProblem;
            }
            if tm.get(param_pointee).is_constant {
                return if tm.get(param_pointee).base == BasicType::Void
                    || tm.same_types_modulo_const(param_pointee, arg_pointee)
                {
                    NoProblem
                } else {
                    ErrorMsg
                };
            }
            // The parameter is non-const T * or T[].
            if tm.get(param_pointee).base != BasicType::Void
                && !tm.same_types_modulo_const(param_pointee, arg_pointee)
            {
                if tm.same_pointer_or_array_types_modulo_signedness(param, arg_ty) {
                    return WarnDifferentSignedness;
                }
                if tm.get(param_pointee).base == BasicType::Void
                    || tm.get(arg_pointee).base == BasicType::Void
                {
                    return WarnVoidPointer;
                }
                return ErrorMsg; // argument points to an incompatible type
            }
            if tm.get(arg_pointee).is_constant && options.warn_const_incorrect {
                return WarnConstIncorrect;
            }
            NoProblem
        }

        BasicType::Void => ErrorMsg,

        BasicType::Function => {
            if param == arg_ty {
                NoProblem
            } else {
                ErrorMsg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang_mc::span::Loc;
    use pretty_assertions::assert_eq;

    struct Fixture {
        arena: NodeArena,
        tm: TypeManager,
        options: CompilerOptions,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture {
                arena: NodeArena::new(),
                tm: TypeManager::new(),
                options: CompilerOptions::default(),
            }
        }

        fn typed_word(&mut self, value: u16, signed: bool) -> NodeId {
            let id = self.arena.alloc(
                NodeKind::WordConstant {
                    value,
                    is_word: true,
                    is_signed: signed,
                },
                Loc::none(),
            );
            let ty = self.tm.basic_type(BasicType::Word, signed);
            self.arena.set_ty(id, ty);
            id
        }

        fn typed_var(&mut self, ty: TypeId) -> NodeId {
            let id = self.arena.alloc(
                NodeKind::Identifier {
                    name: "v".to_string(),
                    resolved: None,
                },
                Loc::none(),
            );
            self.arena.set_ty(id, ty);
            id
        }

        fn accepts(&self, param: TypeId, arg: NodeId) -> ArgAcceptance {
            param_accepts_arg(&self.arena, &self.tm, &self.options, param, arg)
        }
    }

    #[test]
    fn byte_param_takes_fitting_constant() {
        let mut f = Fixture::new();
        let byte = f.tm.basic_type(BasicType::Byte, true);
        let small = f.typed_word(42, true);
        let big = f.typed_word(300, true);
        let wide = {
            let w = f.tm.basic_type(BasicType::Word, true);
            f.typed_var(w)
        };
        assert_eq!(f.accepts(byte, small), ArgAcceptance::NoProblem);
        assert_eq!(f.accepts(byte, big), ArgAcceptance::WarnArgumentTooLarge);
        assert_eq!(f.accepts(byte, wide), ArgAcceptance::WarnArgumentTooLarge);
    }

    #[test]
    fn pointer_param_and_constants() {
        let mut f = Fixture::new();
        let ch = f.tm.basic_type(BasicType::Byte, true);
        let p_ch = f.tm.pointer_to(ch);
        let zero = f.typed_word(0, true);
        let seven = f.typed_word(7, true);
        let wt = f.tm.basic_type(BasicType::Word, true);
        let word_var = f.typed_var(wt);
        assert_eq!(f.accepts(p_ch, zero), ArgAcceptance::NoProblem);
        assert_eq!(
            f.accepts(p_ch, seven),
            ArgAcceptance::WarnPassingConstantForPtr
        );
        assert_eq!(
            f.accepts(p_ch, word_var),
            ArgAcceptance::WarnNonPtrArrayForPtr
        );
    }

    #[test]
    fn pointer_signedness_and_const_cases() {
        let mut f = Fixture::new();
        let sch = f.tm.basic_type(BasicType::Byte, true);
        let uch = f.tm.basic_type(BasicType::Byte, false);
        let p_s = f.tm.pointer_to(sch);
        let p_u = f.tm.pointer_to(uch);
        let arg_u = f.typed_var(p_u);
        assert_eq!(
            f.accepts(p_s, arg_u),
            ArgAcceptance::WarnDifferentSignedness
        );

        let c_ch = f.tm.with_const(sch);
        let p_const = f.tm.pointer_to(c_ch);
        let arg_const = f.typed_var(p_const);
        assert_eq!(f.accepts(p_s, arg_const), ArgAcceptance::WarnConstIncorrect);
        let arg_plain = f.typed_var(p_s);
        assert_eq!(f.accepts(p_const, arg_plain), ArgAcceptance::NoProblem);
    }

    #[test]
    fn void_pointer_cases() {
        let mut f = Fixture::new();
        let pv = f.tm.pointer_to_void();
        let word = f.tm.basic_type(BasicType::Word, true);
        let sig = crate::types::FunctionSignature {
            return_type: word,
            params: vec![],
            ends_with_ellipsis: false,
            is_interrupt_service_routine: false,
            first_param_in_reg: false,
        };
        let fp = f.tm.function_pointer_type(sig);
        let fp_arg = f.typed_var(fp);
        assert_eq!(f.accepts(pv, fp_arg), ArgAcceptance::WarnFuncPtrForPtr);

        let ch = f.tm.basic_type(BasicType::Byte, true);
        let p_ch = f.tm.pointer_to(ch);
        let pv_arg = f.typed_var(pv);
        assert_eq!(f.accepts(p_ch, pv_arg), ArgAcceptance::WarnVoidPointer);
    }

    #[test]
    fn real_for_integral_and_struct_matching() {
        let mut f = Fixture::new();
        let long_ty = f.tm.long_type(true);
        let single = f.tm.real_type(false);
        let real_arg = f.typed_var(single);
        assert_eq!(
            f.accepts(long_ty, real_arg),
            ArgAcceptance::WarnRealForIntegral
        );

        let s1 = f.tm.class_type("S", false);
        let s2 = f.tm.class_type("T", false);
        let s1_arg = f.typed_var(s1);
        assert_eq!(f.accepts(s1, s1_arg), ArgAcceptance::NoProblem);
        assert_eq!(f.accepts(s2, s1_arg), ArgAcceptance::ErrorMsg);
    }
}
