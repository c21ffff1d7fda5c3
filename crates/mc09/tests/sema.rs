//! Diagnostics: what the semantic passes must report, and what they
//! must accept silently.

mod common;

use common::Prog;
use lang_mc::ops::{BinaryOp, JumpKind};
use lang_mc::NodeKind;
use mc09::CompilerOptions;

#[test]
fn undeclared_identifier_is_an_error() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let ghost = p.ident("ghost");
    let ret = p.ret(Some(ghost));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics().contains("undeclared identifier `ghost'"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn duplicate_declaration_names_the_previous_line() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let first = p.var_decl("x", int, None);
    let second = p.var_decl("x", int, None);
    let d1 = p.decl_stmt(vec![first]);
    let d2 = p.decl_stmt(vec![second]);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![d1, d2, ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics()
            .contains("variable `x' already declared in this scope"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn mixed_sign_ordering_comparison_warns() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let uint = p.uint_ty();
    let a = p.ident("a");
    let b = p.ident("b");
    let cmp = p.bin(BinaryOp::Inferior, a, b);
    let ret = p.ret(Some(cmp));
    p.function("f", int, vec![("a", int), ("b", uint)], vec![ret]);

    let c = p.compile();
    assert!(c.ok, "{}", c.diagnostics());
    assert!(
        c.diagnostics()
            .contains("comparison of integers of different signs"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn sign_compare_warning_can_be_disabled() {
    let mut p = Prog::with_options(CompilerOptions {
        warn_sign_compare: false,
        ..Default::default()
    });
    let int = p.int_ty();
    let uint = p.uint_ty();
    let a = p.ident("a");
    let b = p.ident("b");
    let cmp = p.bin(BinaryOp::Inferior, a, b);
    let ret = p.ret(Some(cmp));
    p.function("f", int, vec![("a", int), ("b", uint)], vec![ret]);

    let c = p.compile();
    assert!(c.ok);
    assert_eq!(c.tu.diags.num_warnings(), 0, "{}", c.diagnostics());
}

#[test]
fn word_assigned_to_byte_variable_warns() {
    // char c; int main() { c = w; return 0; }  with w an int
    let mut p = Prog::new();
    let int = p.int_ty();
    let ch = p.char_ty();
    p.global("c", ch, None);
    p.global("w", int, None);
    let cv = p.ident("c");
    let wv = p.ident("w");
    let set = p.assign(cv, wv);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![set, ret]);

    let c = p.compile();
    assert!(c.ok, "{}", c.diagnostics());
    assert!(
        c.diagnostics()
            .contains("assigning to `char' from larger type `int'"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn byte_constant_for_byte_variable_is_silent() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let ch = p.char_ty();
    p.global("c", ch, None);
    let cv = p.ident("c");
    let value = p.int(42); // int-typed constant fitting a byte
    let set = p.assign(cv, value);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![set, ret]);

    let c = p.compile();
    assert!(c.ok);
    assert_eq!(c.tu.diags.num_warnings(), 0, "{}", c.diagnostics());
}

#[test]
fn returning_wrong_type_is_an_error() {
    // int *f() { return g; }  with g an int global
    let mut p = Prog::new();
    let int = p.int_ty();
    let int_ptr = p.ptr_ty(int);
    p.global("g", int, None);
    let gv = p.ident("g");
    let ret = p.ret(Some(gv));
    p.function("f", int_ptr, vec![], vec![ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics().contains("differs from function's return type"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn missing_return_in_non_void_function_warns() {
    let mut p = Prog::new();
    let int = p.int_ty();
    p.function("f", int, vec![], vec![]);

    let c = p.compile();
    assert!(c.ok);
    assert!(
        c.diagnostics().contains("has no return statement"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn goto_to_unknown_label_is_an_error() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let loc = lang_mc::Loc::new("test.c", 10);
    let goto = p.tu.arena.alloc(
        NodeKind::Jump {
            kind: JumpKind::Goto,
            arg: None,
            target: Some("nowhere".to_string()),
        },
        loc,
    );
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![goto, ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics().contains("goto targets label `nowhere'"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn continue_inside_switch_is_an_error() {
    // switch (v) { default: continue; }
    let mut p = Prog::new();
    let int = p.int_ty();
    let v = p.ident("v");
    let loc = lang_mc::Loc::new("test.c", 20);
    let cont = p.tu.arena.alloc(
        NodeKind::Jump {
            kind: JumpKind::Continue,
            arg: None,
            target: None,
        },
        loc.clone(),
    );
    let labeled = p.tu.arena.alloc(
        NodeKind::Labeled {
            label: lang_mc::StmtLabel::Default,
            stmt: cont,
        },
        loc.clone(),
    );
    let body = p.compound(vec![labeled]);
    let sw = p.tu.arena.alloc(NodeKind::Switch { expr: v, body }, loc);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![("v", int)], vec![sw, ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics()
            .contains("continue statement is not supported in a switch"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn interrupt_routine_with_parameters_is_an_error() {
    let mut p = Prog::new();
    let void = p.void_ty();
    let int = p.int_ty();
    let ret = p.ret(None);
    let attrs = lang_mc::FuncAttrs {
        interrupt: true,
        ..Default::default()
    };
    p.function_with_attrs("handler", void, vec![("n", int)], vec![ret], attrs);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics().contains("must not have parameters"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn calling_an_isr_is_an_error() {
    let mut p = Prog::new();
    let void = p.void_ty();
    let int = p.int_ty();
    let r = p.ret(None);
    let attrs = lang_mc::FuncAttrs {
        interrupt: true,
        ..Default::default()
    };
    p.function_with_attrs("handler", void, vec![], vec![r], attrs);

    let call = p.call("handler", vec![]);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![call, ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics()
            .contains("forbidden because it is an interrupt service routine"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn wrong_argument_count_is_an_error() {
    let mut p = Prog::new();
    let int = p.int_ty();
    let a = p.ident("a");
    let r = p.ret(Some(a));
    p.function("f", int, vec![("a", int)], vec![r]);

    let one = p.int(1);
    let two = p.int(2);
    let call = p.call("f", vec![one, two]);
    let ret = p.ret(Some(call));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics().contains("passes 2 argument(s)"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn printf_format_mismatch_warns() {
    // printf("%d %s", 1, 2);  %s wants a pointer
    let mut p = Prog::new();
    let int = p.int_ty();
    let ch = p.char_ty();
    let char_ptr = p.ptr_ty(ch);
    let fmt_param = p.tu.types.with_const(ch);
    let fmt_ptr = p.tu.types.pointer_to(fmt_param);
    // declare printf(const char *, ...) as a variadic function
    let sig = mc09::FunctionSignature {
        return_type: int,
        params: vec![fmt_ptr],
        ends_with_ellipsis: true,
        is_interrupt_service_routine: false,
        first_param_in_reg: false,
    };
    let fn_type = p.tu.types.function_type(sig);
    let loc = lang_mc::Loc::new("test.c", 1);
    let printf_decl = p.tu.arena.alloc(
        NodeKind::FunctionDef {
            name: "printf".to_string(),
            func_type: fn_type,
            params: vec![],
            body: None,
            attrs: Default::default(),
        },
        loc,
    );
    p.tu.add_top_level(printf_decl);
    let _ = char_ptr;

    let fmt = p.string("%d %s");
    let one = p.int(1);
    let two = p.int(2);
    let call = p.call("printf", vec![fmt, one, two]);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![call, ret]);

    let c = p.compile();
    assert!(
        c.diagnostics().contains("format directive %s"),
        "{}",
        c.diagnostics()
    );
}

#[test]
fn volatile_is_warned_about_once() {
    let mut p = Prog::new();
    let l1 = lang_mc::Loc::new("test.c", 1);
    let l2 = lang_mc::Loc::new("test.c", 2);
    p.tu.diags.warn_volatile_ignored(&l1);
    p.tu.diags.warn_volatile_ignored(&l2);
    assert_eq!(p.tu.diags.num_warnings(), 1);
}

#[test]
fn incomplete_global_type_is_an_error() {
    // struct Opaque o;  (no body ever declared)
    let mut p = Prog::new();
    let int = p.int_ty();
    let opaque = p.tu.types.class_type("Opaque", false);
    p.global("o", opaque, None);
    let zero = p.int(0);
    let ret = p.ret(Some(zero));
    p.function("main", int, vec![], vec![ret]);

    let c = p.compile();
    assert!(!c.ok);
    assert!(
        c.diagnostics().contains("incomplete type"),
        "{}",
        c.diagnostics()
    );
}
