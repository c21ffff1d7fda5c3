//! Syntax tree for a small C-like systems dialect.
//!
//! This crate defines the data a parser for the dialect produces and a
//! compiler consumes: source locations, the node arena, the operator
//! enums and a pre/post-order traversal. It carries no semantic
//! knowledge; types, scopes and declarations are the consuming
//! compiler's business and appear here only as opaque indices.

pub mod ast;
pub mod ops;
pub mod span;

pub use ast::{
    walk, ArrayDims, DeclId, FuncAttrs, Node, NodeArena, NodeId, NodeKind, Resolved, ScopeId,
    StmtLabel, TypeId, Visitor,
};
pub use ops::{BinaryOp, JumpKind, StorageClass, UnaryOp};
pub use span::{CurrentLoc, Loc};
