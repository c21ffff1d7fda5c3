//! Semantic analysis.
//!
//! Three passes run over every function body, in this order, each
//! reading annotations the previous one wrote:
//!
//! 1. [`create_scopes`] builds the scope tree, registers
//!    declarations and resolves identifiers.
//! 2. [`set_expression_types`] assigns a type to every expression,
//!    bottom-up.
//! 3. [`check_semantics`] adds the final diagnostics that need a fully typed
//!    tree, plus declaration of the hidden temporaries wide operations
//!    need.

pub mod check;
pub mod const_eval;
pub mod conv;
pub mod scope_creator;
pub mod tree;
pub mod type_setter;

pub use check::check_semantics;
pub use scope_creator::create_scopes;
pub use type_setter::set_expression_types;
