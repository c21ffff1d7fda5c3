//! Diagnostics.
//!
//! Errors and warnings are collected synchronously by the semantic
//! passes and the emitter; compilation keeps going after an error so
//! that one run reports as many problems as possible. The final error
//! count decides whether the driver reports failure.

use lang_mc::Loc;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One reported problem, rendered as `<file>:<line>: error: <message>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: Loc,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", self.loc, kind, self.message)
    }
}

/// Append-only sink for diagnostics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
    num_errors: usize,
    num_warnings: usize,
    volatile_warning_issued: bool,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn error(&mut self, loc: &Loc, message: impl Into<String>) {
        let message = message.into();
        log::debug!("error at {}: {}", loc, message);
        self.num_errors += 1;
        self.list.push(Diagnostic {
            severity: Severity::Error,
            loc: loc.clone(),
            message,
        });
    }

    pub fn warning(&mut self, loc: &Loc, message: impl Into<String>) {
        let message = message.into();
        log::debug!("warning at {}: {}", loc, message);
        self.num_warnings += 1;
        self.list.push(Diagnostic {
            severity: Severity::Warning,
            loc: loc.clone(),
            message,
        });
    }

    /// `volatile` is accepted by the grammar and ignored by the code
    /// generator. Warn about that once per translation unit.
    pub fn warn_volatile_ignored(&mut self, loc: &Loc) {
        if !self.volatile_warning_issued {
            self.volatile_warning_issued = true;
            self.warning(loc, "the `volatile' keyword is not supported and is ignored");
        }
    }

    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    /// All diagnostics in report order, one per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.list {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }
}

/// Internal failure of the code emitter. These indicate compiler bugs,
/// not user errors: user-level problems are reported through
/// [`Diagnostics`] and emission carries on.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{loc}: internal error: {message}")]
pub struct EmitError {
    pub loc: Loc,
    pub message: String,
}

impl EmitError {
    pub fn new(loc: &Loc, message: impl Into<String>) -> EmitError {
        EmitError {
            loc: loc.clone(),
            message: message.into(),
        }
    }
}

/// Failure of a whole compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0} error(s) reported")]
    Errors(usize),
    #[error(transparent)]
    Internal(#[from] EmitError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn diagnostic_format() {
        let mut diags = Diagnostics::new();
        diags.error(&Loc::new("t.c", 7), "undeclared identifier `x'");
        diags.warning(&Loc::new("t.c", 9), "comparison of integers of different signs");
        assert_eq!(
            diags.render(),
            "t.c:7: error: undeclared identifier `x'\n\
             t.c:9: warning: comparison of integers of different signs\n"
        );
        assert_eq!(diags.num_errors(), 1);
        assert_eq!(diags.num_warnings(), 1);
    }

    #[test]
    fn volatile_warning_is_once_per_unit() {
        let mut diags = Diagnostics::new();
        diags.warn_volatile_ignored(&Loc::new("t.c", 1));
        diags.warn_volatile_ignored(&Loc::new("t.c", 2));
        assert_eq!(diags.num_warnings(), 1);
    }
}
