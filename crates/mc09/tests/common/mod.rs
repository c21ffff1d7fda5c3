//! Test-side stand-in for the parser: a small builder over the node
//! arena that assembles programs the way the grammar would.

#![allow(dead_code)]

use lang_mc::ast::{ArrayDims, FuncAttrs, NodeId, TypeId};
use lang_mc::ops::{BinaryOp, JumpKind, StorageClass, UnaryOp};
use lang_mc::{Loc, NodeKind};
use mc09::{AsmText, BasicType, CompilerOptions, FunctionSignature, TranslationUnit};

pub struct Prog {
    pub tu: TranslationUnit,
    line: u32,
}

impl Prog {
    pub fn new() -> Prog {
        Prog::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Prog {
        let _ = env_logger::builder().is_test(true).try_init();
        Prog {
            tu: TranslationUnit::new(options),
            line: 0,
        }
    }

    fn loc(&mut self) -> Loc {
        self.line += 1;
        Loc::new("test.c", self.line)
    }

    // ----- types -----

    pub fn int_ty(&mut self) -> TypeId {
        self.tu.types.basic_type(BasicType::Word, true)
    }

    pub fn uint_ty(&mut self) -> TypeId {
        self.tu.types.basic_type(BasicType::Word, false)
    }

    pub fn char_ty(&mut self) -> TypeId {
        self.tu.types.basic_type(BasicType::Byte, true)
    }

    pub fn uchar_ty(&mut self) -> TypeId {
        self.tu.types.basic_type(BasicType::Byte, false)
    }

    pub fn void_ty(&mut self) -> TypeId {
        self.tu.types.void_type()
    }

    pub fn ulong_ty(&mut self) -> TypeId {
        self.tu.types.long_type(false)
    }

    pub fn long_ty(&mut self) -> TypeId {
        self.tu.types.long_type(true)
    }

    pub fn ptr_ty(&mut self, pointee: TypeId) -> TypeId {
        self.tu.types.pointer_to(pointee)
    }

    // ----- expressions -----

    pub fn int(&mut self, value: i32) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::WordConstant {
                value: value as u16,
                is_word: true,
                is_signed: true,
            },
            loc,
        )
    }

    pub fn uint(&mut self, value: u16) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::WordConstant {
                value,
                is_word: true,
                is_signed: false,
            },
            loc,
        )
    }

    pub fn ch(&mut self, value: u8) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::WordConstant {
                value: u16::from(value),
                is_word: false,
                is_signed: true,
            },
            loc,
        )
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::Identifier {
                name: name.to_string(),
                resolved: None,
            },
            loc,
        )
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::StringLiteral {
                value: value.to_string(),
            },
            loc,
        )
    }

    pub fn bin(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(NodeKind::Binary { op, left, right }, loc)
    }

    pub fn un(&mut self, op: UnaryOp, expr: NodeId) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::Unary {
                op,
                expr: Some(expr),
                sizeof_type: None,
            },
            loc,
        )
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.bin(BinaryOp::Assignment, target, value)
    }

    pub fn subscript(&mut self, base: NodeId, index: NodeId) -> NodeId {
        self.bin(BinaryOp::ArrayRef, base, index)
    }

    pub fn deref(&mut self, expr: NodeId) -> NodeId {
        self.un(UnaryOp::Indirection, expr)
    }

    pub fn call(&mut self, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.ident(name);
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::FunctionCall {
                callee,
                args,
                func_ptr_var: None,
            },
            loc,
        )
    }

    pub fn init_list(&mut self, exprs: Vec<NodeId>) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(NodeKind::InitializerList { exprs }, loc)
    }

    // ----- statements -----

    pub fn ret(&mut self, arg: Option<NodeId>) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::Jump {
                kind: JumpKind::Return,
                arg,
                target: None,
            },
            loc,
        )
    }

    pub fn expr_stmt(&mut self, expr: NodeId) -> NodeId {
        expr
    }

    pub fn compound(&mut self, stmts: Vec<NodeId>) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(NodeKind::Compound { stmts }, loc)
    }

    pub fn if_stmt(&mut self, cond: NodeId, consequence: NodeId, alternative: Option<NodeId>) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::If {
                cond,
                consequence,
                alternative,
            },
            loc,
        )
    }

    pub fn while_stmt(&mut self, cond: NodeId, body: NodeId) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::While {
                cond,
                body,
                is_do: false,
            },
            loc,
        )
    }

    pub fn var_decl(&mut self, name: &str, ty: TypeId, init: Option<NodeId>) -> NodeId {
        self.var_decl_full(name, ty, ArrayDims::new(), init, StorageClass::Auto)
    }

    pub fn var_decl_full(
        &mut self,
        name: &str,
        ty: TypeId,
        dims: ArrayDims,
        init: Option<NodeId>,
        storage: StorageClass,
    ) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(
            NodeKind::VarDecl {
                name: name.to_string(),
                var_type: ty,
                dims,
                init,
                storage,
                read_only: false,
                decl: None,
            },
            loc,
        )
    }

    pub fn decl_stmt(&mut self, decls: Vec<NodeId>) -> NodeId {
        let loc = self.loc();
        self.tu.arena.alloc(NodeKind::DeclarationSeq { decls }, loc)
    }

    // ----- top level -----

    pub fn global(&mut self, name: &str, ty: TypeId, init: Option<NodeId>) -> NodeId {
        self.global_array(name, ty, ArrayDims::new(), init)
    }

    pub fn global_array(
        &mut self,
        name: &str,
        ty: TypeId,
        dims: ArrayDims,
        init: Option<NodeId>,
    ) -> NodeId {
        let decl = self.var_decl_full(name, ty, dims, init, StorageClass::Global);
        let seq = self.decl_stmt(vec![decl]);
        self.tu.add_top_level(seq);
        seq
    }

    pub fn function(
        &mut self,
        name: &str,
        return_type: TypeId,
        params: Vec<(&str, TypeId)>,
        body_stmts: Vec<NodeId>,
    ) -> NodeId {
        self.function_with_attrs(name, return_type, params, body_stmts, FuncAttrs::default())
    }

    pub fn function_with_attrs(
        &mut self,
        name: &str,
        return_type: TypeId,
        params: Vec<(&str, TypeId)>,
        body_stmts: Vec<NodeId>,
        attrs: FuncAttrs,
    ) -> NodeId {
        let param_types: Vec<TypeId> = params.iter().map(|&(_, t)| t).collect();
        let sig = FunctionSignature {
            return_type,
            params: param_types,
            ends_with_ellipsis: false,
            is_interrupt_service_routine: attrs.interrupt,
            first_param_in_reg: attrs.first_param_in_reg,
        };
        let func_type = self.tu.types.function_type(sig);
        let param_nodes: Vec<NodeId> = params
            .iter()
            .map(|&(pname, pty)| self.var_decl(pname, pty, None))
            .collect();
        let body = self.compound(body_stmts);
        let loc = self.loc();
        let def = self.tu.arena.alloc(
            NodeKind::FunctionDef {
                name: name.to_string(),
                func_type,
                params: param_nodes,
                body: Some(body),
                attrs,
            },
            loc,
        );
        self.tu.add_top_level(def);
        def
    }

    /// Runs the pipeline; returns the emitted text even when errors
    /// were reported, so tests can assert on diagnostics.
    pub fn compile(mut self) -> Compiled {
        let mut out = AsmText::new();
        let result = self.tu.compile(&mut out);
        Compiled {
            asm: out.into_string(),
            ok: result.is_ok(),
            tu: self.tu,
        }
    }
}

pub struct Compiled {
    pub asm: String,
    pub ok: bool,
    pub tu: TranslationUnit,
}

impl Compiled {
    pub fn diagnostics(&self) -> String {
        self.tu.diags.render()
    }

    pub fn assert_clean(&self) {
        assert!(
            self.ok,
            "compilation failed:\n{}\n--- asm ---\n{}",
            self.diagnostics(),
            self.asm
        );
    }

    pub fn has_line(&self, ins: &str, arg: &str) -> bool {
        self.asm.lines().any(|l| {
            let mut it = l.split_whitespace();
            it.next() == Some(ins) && it.next() == Some(arg)
        })
    }

    pub fn assert_line(&self, ins: &str, arg: &str) {
        assert!(
            self.has_line(ins, arg),
            "expected `{} {}` in emitted code:\n{}",
            ins,
            arg,
            self.asm
        );
    }
}
