//! Cross-compiler core targeting Motorola 6809 assembly.
//!
//! The parser (out of scope of this crate) builds a [`lang_mc`] syntax
//! tree into a [`TranslationUnit`]; [`TranslationUnit::compile`] then
//! runs the semantic passes (scope creation, expression typing, final
//! checks), lays out every stack frame and emits 6809 assembler text
//! into an [`AsmText`] sink. Diagnostics accumulate across the whole
//! run; the error count decides success.
//!
//! ```
//! use mc09::{AsmText, CompilerOptions, TranslationUnit};
//! use lang_mc::{NodeKind, Loc};
//!
//! let mut tu = TranslationUnit::new(CompilerOptions::default());
//! let word = tu.types.basic_type(mc09::BasicType::Word, true);
//! let two = tu.arena.alloc(
//!     NodeKind::WordConstant { value: 2, is_word: true, is_signed: true },
//!     Loc::new("t.c", 1),
//! );
//! let ret = tu.arena.alloc(
//!     NodeKind::Jump {
//!         kind: lang_mc::JumpKind::Return,
//!         arg: Some(two),
//!         target: None,
//!     },
//!     Loc::new("t.c", 1),
//! );
//! let body = tu.arena.alloc(NodeKind::Compound { stmts: vec![ret] }, Loc::new("t.c", 1));
//! let sig = mc09::FunctionSignature {
//!     return_type: word,
//!     params: vec![],
//!     ends_with_ellipsis: false,
//!     is_interrupt_service_routine: false,
//!     first_param_in_reg: false,
//! };
//! let fn_type = tu.types.function_type(sig);
//! let main = tu.arena.alloc(
//!     NodeKind::FunctionDef {
//!         name: "main".to_string(),
//!         func_type: fn_type,
//!         params: vec![],
//!         body: Some(body),
//!         attrs: Default::default(),
//!     },
//!     Loc::new("t.c", 1),
//! );
//! tu.add_top_level(main);
//! let mut out = AsmText::new();
//! tu.compile(&mut out).unwrap();
//! assert!(out.as_str().contains("LDD"));
//! ```

pub mod asm;
pub mod asm_stmt;
pub mod codegen;
pub mod diag;
pub mod options;
pub mod pragma;
pub mod scope;
pub mod sema;
pub mod tranunit;
pub mod types;

pub use asm::AsmText;
pub use diag::{CompileError, Diagnostic, Diagnostics, EmitError, Severity};
pub use options::CompilerOptions;
pub use pragma::{Pragma, PragmaState};
pub use scope::{Declaration, Scope, ScopeArena};
pub use tranunit::{FunctionInfo, TranslationUnit};
pub use types::{BasicType, ClassDef, ClassMember, FunctionSignature, TypeDesc, TypeManager};
