//! End-to-end emission checks: little programs in, literal facts
//! about the 6809 text out.

mod common;

use common::Prog;
use lang_mc::ast::FuncAttrs;
use lang_mc::ops::{BinaryOp, StorageClass, UnaryOp};
use lang_mc::NodeKind;
use mc09::{ClassDef, ClassMember, CompilerOptions};
use smallvec::smallvec;

#[test]
fn constant_sum_is_folded() {
    // int main() { return 2 + 3; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let two = p.int(2);
    let three = p.int(3);
    let sum = p.bin(BinaryOp::Add, two, three);
    let ret = p.ret(Some(sum));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("LDD", "#$0005");
    assert!(c.asm.contains("LBRA"), "return must jump to the end label");
}

#[test]
fn global_byte_array_data_and_indexing() {
    // char a[3] = {1, 2, 3};  int main() { return a[1]; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let ch = p.char_ty();
    let e1 = p.ch(1);
    let e2 = p.ch(2);
    let e3 = p.ch(3);
    let init = p.init_list(vec![e1, e2, e3]);
    p.global_array("a", ch, smallvec![Some(3)], Some(init));

    let a = p.ident("a");
    let one = p.int(1);
    let elem = p.subscript(a, one);
    let ret = p.ret(Some(elem));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("FCB", "$01");
    c.assert_line("FCB", "$02");
    c.assert_line("FCB", "$03");
    // constant subscript: one LEAX with a constant offset, then a
    // byte load
    c.assert_line("LEAX", "1,X");
    c.assert_line("LDB", ",X");
}

#[test]
fn store_through_global_pointer_is_indirect() {
    // int *p;  int main() { *p = 7; return 0; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let int_ptr = p.ptr_ty(int);
    p.global("p", int_ptr, None);

    let pv = p.ident("p");
    let target = p.deref(pv);
    let seven = p.int(7);
    let store = p.assign(target, seven);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![store, ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("LDD", "#$0007");
    c.assert_line("STD", "[_p]");
}

#[test]
fn unsigned_long_shift_by_eight_is_byte_moves() {
    // unsigned long x;  int main() { x <<= 8; return 0; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let ulong = p.ulong_ty();
    p.global("x", ulong, None);

    let x = p.ident("x");
    let eight = p.int(8);
    let shift = p.bin(BinaryOp::LeftAssign, x, eight);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![shift, ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("LDD", "1,X");
    c.assert_line("STD", ",X");
    c.assert_line("LDB", "3,X");
    c.assert_line("STB", "2,X");
    c.assert_line("CLR", "3,X");
    assert!(
        !c.asm.contains("leftShiftDWord"),
        "constant byte-granular shift must not call the helper:\n{}",
        c.asm
    );
}

#[test]
fn signed_comparison_uses_signed_branch() {
    // int f(int a, int b) { return a < b; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let a = p.ident("a");
    let b = p.ident("b");
    let cmp = p.bin(BinaryOp::Inferior, a, b);
    let ret = p.ret(Some(cmp));
    p.function("f", int, vec![("a", int), ("b", int)], vec![ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("CMPD", ",S++");
    assert!(c.asm.contains("LBLT"), "signed < must use LBLT:\n{}", c.asm);
}

#[test]
fn unsigned_comparison_uses_unsigned_branch() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let uint = p.uint_ty();
    let a = p.ident("a");
    let b = p.ident("b");
    let cmp = p.bin(BinaryOp::Inferior, a, b);
    let ret = p.ret(Some(cmp));
    p.function("f", int, vec![("a", uint), ("b", uint)], vec![ret]);

    let c = p.compile();
    c.assert_clean();
    assert!(c.asm.contains("LBLO"), "unsigned < must use LBLO:\n{}", c.asm);
}

#[test]
fn struct_return_goes_through_hidden_parameter() {
    // struct S { int x; int y; };
    // struct S f(void) { struct S s = {1, 2}; return s; }
    // int main() { f(); return 0; }
    let mut p = Prog::new();
    let int = p.int_ty();
    p.tu.types.declare_class(ClassDef {
        name: "S".to_string(),
        is_union: false,
        members: vec![
            ClassMember {
                name: "x".to_string(),
                member_type: int,
                dims: smallvec![],
            },
            ClassMember {
                name: "y".to_string(),
                member_type: int,
                dims: smallvec![],
            },
        ],
    });
    let s_ty = p.tu.types.class_type("S", false);

    let one = p.int(1);
    let two = p.int(2);
    let init = p.init_list(vec![one, two]);
    let s_decl = p.var_decl("s", s_ty, Some(init));
    let decl = p.decl_stmt(vec![s_decl]);
    let s = p.ident("s");
    let ret = p.ret(Some(s));
    p.function("f", s_ty, vec![], vec![decl, ret]);

    let call = p.call("f", vec![]);
    let zero = p.int(0);
    let ret0 = p.ret(Some(zero));
    p.function("main", int, vec![], vec![call, ret0]);

    let c = p.compile();
    c.assert_clean();
    // f() copies its local into the caller's slot with the 4-byte
    // copy helper.
    assert!(c.asm.contains("copyDWord"), "4-byte struct return:\n{}", c.asm);
    // The caller passes the address of a frame temporary and pops it
    // after the call.
    c.assert_line("PSHS", "X");
    c.assert_line("LBSR", "_f");
    c.assert_line("LEAS", "2,S");
    // The temporary is frame-allocated in main.
    assert_eq!(c.tu.function("main").unwrap().min_displacement, -4);
}

#[test]
fn call_cleanup_matches_pushed_bytes() {
    // int g(int a, int b, int c);  int main() { return g(1, 2, 3); }
    let mut p = Prog::new();
    let int = p.int_ty();
    let a = p.ident("a");
    let ret_a = p.ret(Some(a));
    p.function("g", int, vec![("a", int), ("b", int), ("c", int)], vec![ret_a]);

    let one = p.int(1);
    let two = p.int(2);
    let three = p.int(3);
    let call = p.call("g", vec![one, two, three]);
    let ret = p.ret(Some(call));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("LEAS", "6,S");
}

#[test]
fn arguments_are_pushed_in_reverse_order() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let a = p.ident("a");
    let ret_a = p.ret(Some(a));
    p.function("g", int, vec![("a", int), ("b", int)], vec![ret_a]);

    let one = p.int(1);
    let two = p.int(2);
    let call = p.call("g", vec![one, two]);
    let ret = p.ret(Some(call));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    c.assert_clean();
    let second = c.asm.find("#$0002").expect("second argument");
    let first = c.asm.find("#$0001").expect("first argument");
    assert!(
        second < first,
        "last argument must be pushed first:\n{}",
        c.asm
    );
}

#[test]
fn comma_expression_runs_left_to_right() {
    // int main() { int x; int y; (x = 1, y = 2); return 0; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let x_decl = p.var_decl("x", int, None);
    let y_decl = p.var_decl("y", int, None);
    let decls = p.decl_stmt(vec![x_decl, y_decl]);
    let x = p.ident("x");
    let one = p.int(1);
    let ax = p.assign(x, one);
    let y = p.ident("y");
    let two = p.int(2);
    let ay = p.assign(y, two);
    let loc = lang_mc::Loc::new("test.c", 99);
    let comma = p.tu.arena.alloc(NodeKind::Comma { exprs: vec![ax, ay] }, loc);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![decls, comma, ret]);

    let c = p.compile();
    c.assert_clean();
    let first = c.asm.find("#$0001").expect("first store");
    let second = c.asm.find("#$0002").expect("second store");
    assert!(first < second, "comma order violated:\n{}", c.asm);
}

#[test]
fn interrupt_service_routine_ends_with_rti() {
    let mut p = Prog::new();
    let void = p.void_ty();
    let ret = p.ret(None);
    let attrs = FuncAttrs {
        interrupt: true,
        ..Default::default()
    };
    p.function_with_attrs("handler", void, vec![], vec![ret], attrs);

    let c = p.compile();
    c.assert_clean();
    assert!(c.asm.contains("RTI"), "ISR must return with RTI:\n{}", c.asm);
    assert!(
        !c.has_line("PULS", "U,PC"),
        "ISR must not use the normal epilogue:\n{}",
        c.asm
    );
}

#[test]
fn post_increment_yields_initial_value() {
    // int main() { int x; x = 5; return x++; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let x_decl = p.var_decl("x", int, None);
    let decls = p.decl_stmt(vec![x_decl]);
    let x1 = p.ident("x");
    let five = p.int(5);
    let set = p.assign(x1, five);
    let x2 = p.ident("x");
    let inc = p.un(UnaryOp::PostInc, x2);
    let ret = p.ret(Some(inc));
    p.function("main", int, vec![], vec![decls, set, ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("ADDD", "#1");
    assert!(
        c.asm.contains("post increment yields initial value"),
        "post-increment must deliver the original value:\n{}",
        c.asm
    );
}

#[test]
fn division_signedness_selects_the_helper() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let a = p.ident("a");
    let b = p.ident("b");
    let div = p.bin(BinaryOp::Div, a, b);
    let ret = p.ret(Some(div));
    p.function("f", int, vec![("a", int), ("b", int)], vec![ret]);

    let uint = p.uint_ty();
    let a2 = p.ident("a");
    let b2 = p.ident("b");
    let div2 = p.bin(BinaryOp::Div, a2, b2);
    let ret2 = p.ret(Some(div2));
    p.function("g", uint, vec![("a", uint), ("b", uint)], vec![ret2]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("LBSR", "SDIV16");
    c.assert_line("LBSR", "DIV16");
}

#[test]
fn frame_layout_locals_and_params() {
    // int f(int a, char b) { int x; char y; return a; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let ch = p.char_ty();
    let x_decl = p.var_decl("x", int, None);
    let y_decl = p.var_decl("y", ch, None);
    let decls = p.decl_stmt(vec![x_decl, y_decl]);
    let a = p.ident("a");
    let ret = p.ret(Some(a));
    p.function("f", int, vec![("a", int), ("b", ch)], vec![decls, ret]);

    let c = p.compile();
    c.assert_clean();
    let info = c.tu.function("f").unwrap();
    // |min displacement| equals the sum of the local sizes.
    assert_eq!(info.min_displacement, -3);
    let scope = info.scope.unwrap();
    let a_decl = c.tu.scopes.lookup(scope, "a", false).unwrap();
    assert_eq!(c.tu.scopes.decl(a_decl).frame_displacement, Some(4));
    // A byte parameter occupies a 2-byte slot, value in the low byte.
    let b_decl = c.tu.scopes.lookup(scope, "b", false).unwrap();
    assert_eq!(c.tu.scopes.decl(b_decl).frame_displacement, Some(7));
}

#[test]
fn not_e_and_e_equals_zero_test_the_same_value() {
    // if (!e) f();     vs.     if (e == 0) f();
    fn build(negated: bool) -> common::Compiled {
        let mut p = Prog::new();
        let int = p.int_ty();
        let void = p.void_ty();
        let ret0 = p.ret(None);
        p.function("f", void, vec![], vec![ret0]);

        let e = p.ident("e");
        let cond = if negated {
            p.un(UnaryOp::BooleanNeg, e)
        } else {
            let zero = p.int(0);
            p.bin(BinaryOp::Equality, e, zero)
        };
        let call = p.call("f", vec![]);
        let then = p.compound(vec![call]);
        let iff = p.if_stmt(cond, then, None);
        let zero = p.int(0);
        let ret = p.ret(Some(zero));
        p.function("main", int, vec![("e", int)], vec![iff, ret]);
        p.compile()
    }

    let with_not = build(true);
    let with_eq = build(false);
    with_not.assert_clean();
    with_eq.assert_clean();
    // Both forms test the value against zero instead of materializing
    // a boolean.
    with_not.assert_line("CMPD", "#$0000");
    with_eq.assert_line("CMPD", "#$0000");
    assert!(with_not.asm.contains("LBNE") || with_not.asm.contains("LBEQ"));
    assert!(with_eq.asm.contains("LBEQ"));
}

#[test]
fn while_condition_is_evaluated_after_the_body() {
    // int main() { int i; i = 0; while (i < 10) i = i + 1; return i; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let i_decl = p.var_decl("i", int, None);
    let decls = p.decl_stmt(vec![i_decl]);
    let i0 = p.ident("i");
    let zero = p.int(0);
    let init = p.assign(i0, zero);
    let i1 = p.ident("i");
    let ten = p.int(10);
    let cond = p.bin(BinaryOp::Inferior, i1, ten);
    let i2 = p.ident("i");
    let i3 = p.ident("i");
    let one = p.int(1);
    let next = p.bin(BinaryOp::Add, i3, one);
    let step = p.assign(i2, next);
    let body = p.compound(vec![step]);
    let w = p.while_stmt(cond, body);
    let i4 = p.ident("i");
    let ret = p.ret(Some(i4));
    p.function("main", int, vec![], vec![decls, init, w, ret]);

    let c = p.compile();
    c.assert_clean();
    let jump = c.asm.find("jump to while condition").expect("initial jump");
    let body_pos = c.asm.find("while body").expect("body label");
    let cond_pos = c.asm.rfind("while condition").expect("condition label");
    assert!(jump < body_pos, "condition jump precedes the body:\n{}", c.asm);
    assert!(body_pos < cond_pos, "body precedes the condition:\n{}", c.asm);
}

#[test]
fn local_static_data_is_emitted_with_a_unique_label() {
    // int main() { static int counter = 7; return counter; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let seven = p.int(7);
    let decl = p.var_decl_full(
        "counter",
        int,
        smallvec![],
        Some(seven),
        StorageClass::Static,
    );
    let decls = p.decl_stmt(vec![decl]);
    let cv = p.ident("counter");
    let ret = p.ret(Some(cv));
    p.function("main", int, vec![], vec![decls, ret]);

    let c = p.compile();
    c.assert_clean();
    c.assert_line("FDB", "$0007");
    assert!(
        c.asm.contains("_counter"),
        "static must carry a unit-unique label:\n{}",
        c.asm
    );
}

#[test]
fn uncalled_function_can_be_suppressed() {
    let mut p = Prog::with_options(CompilerOptions {
        suppress_uncalled_functions: true,
        ..Default::default()
    });
    let int = p.int_ty();
    let one = p.int(1);
    let r1 = p.ret(Some(one));
    p.function("unused", int, vec![], vec![r1]);
    let zero = p.int(0);
    let r0 = p.ret(Some(zero));
    p.function("main", int, vec![], vec![r0]);

    let c = p.compile();
    c.assert_clean();
    assert!(c.asm.contains("_main"));
    assert!(
        !c.asm.contains("_unused"),
        "unreachable function must be suppressed:\n{}",
        c.asm
    );
}

#[test]
fn long_bitwise_goes_through_helpers() {
    // unsigned long x; unsigned long y;
    // int main() { x = x & y; return 0; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let ulong = p.ulong_ty();
    p.global("x", ulong, None);
    p.global("y", ulong, None);
    let x = p.ident("x");
    let x2 = p.ident("x");
    let y = p.ident("y");
    let and = p.bin(BinaryOp::BitwiseAnd, x2, y);
    let set = p.assign(x, and);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![set, ret]);

    let c = p.compile();
    c.assert_clean();
    assert!(
        c.asm.contains("andDWordDWord"),
        "long & long must call the helper:\n{}",
        c.asm
    );
}

#[test]
fn inline_asm_resolves_frame_references() {
    // int main() { int total; asm { "  LDD :total" }; return 0; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let decl = p.var_decl("total", int, None);
    let decls = p.decl_stmt(vec![decl]);
    let loc = lang_mc::Loc::new("test.c", 50);
    let asm = p.tu.arena.alloc(
        NodeKind::InlineAsm {
            text: "  LDD :total".to_string(),
        },
        loc,
    );
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![decls, asm, ret]);

    let c = p.compile();
    c.assert_clean();
    assert!(
        c.asm.contains("LDD -2,U"),
        ":VAR must resolve to the frame displacement:\n{}",
        c.asm
    );
}
