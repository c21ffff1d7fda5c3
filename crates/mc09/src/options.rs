//! Compilation options.
//!
//! The command-line driver is out of scope here; it is expected to fill
//! this record and hand it to the translation unit. Defaults match the
//! behavior of a bare invocation.

/// Switches that alter diagnostics and code generation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Warn when an ordering comparison mixes signed and unsigned
    /// operands.
    pub warn_sign_compare: bool,
    /// Warn on const-incorrect assignments and argument passing.
    pub warn_const_incorrect: bool,
    /// Warn when a non-zero numeric constant is used where a pointer
    /// is expected.
    pub warn_pass_const_for_ptr: bool,
    /// Warn when byte-on-byte arithmetic stays 8 bits instead of
    /// widening to int as standard C would.
    pub warn_byte_arith: bool,
    /// Call `check_null_ptr_x` before dereferences.
    pub null_pointer_checking: bool,
    /// Call `check_stack_overflow` in every function prologue.
    pub stack_overflow_checking: bool,
    /// Omit functions never transitively called from `main` or from an
    /// address-taken external symbol.
    pub suppress_uncalled_functions: bool,
    /// Emit the needed runtime utilities as `IMPORT`s; when false the
    /// support library is assumed concatenated and definitions are
    /// expected elsewhere.
    pub import_runtime_utilities: bool,
}

impl Default for CompilerOptions {
    fn default() -> CompilerOptions {
        CompilerOptions {
            warn_sign_compare: true,
            warn_const_incorrect: true,
            warn_pass_const_for_ptr: false,
            warn_byte_arith: false,
            null_pointer_checking: false,
            stack_overflow_checking: false,
            suppress_uncalled_functions: false,
            import_runtime_utilities: true,
        }
    }
}
