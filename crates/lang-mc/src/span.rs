//! Source locations.
//!
//! Every node of the syntax tree carries the file name and line number
//! it came from, so that later passes can attach diagnostics and the
//! code generator can write `; file:line` comments into the assembly
//! output. The lexer is expected to keep a current location record and
//! the tree builders sample it at construction time.

use std::fmt;
use std::rc::Rc;

/// A source position: file name and 1-based line number.
///
/// File names are reference-counted so that the thousands of nodes of a
/// translation unit share one allocation per file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    pub file: Rc<str>,
    pub line: u32,
}

impl Loc {
    pub fn new(file: impl Into<Rc<str>>, line: u32) -> Loc {
        Loc {
            file: file.into(),
            line,
        }
    }

    /// A location for nodes fabricated by the compiler itself.
    pub fn none() -> Loc {
        Loc {
            file: Rc::from(""),
            line: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Mutable record the lexer writes into; builders sample it when no
/// explicit location is given.
#[derive(Debug, Clone, Default)]
pub struct CurrentLoc {
    file: Option<Rc<str>>,
    line: u32,
}

impl CurrentLoc {
    pub fn set(&mut self, file: impl Into<Rc<str>>, line: u32) {
        self.file = Some(file.into());
        self.line = line;
    }

    pub fn advance_line(&mut self) {
        self.line += 1;
    }

    pub fn get(&self) -> Loc {
        match &self.file {
            Some(file) => Loc {
                file: Rc::clone(file),
                line: self.line,
            },
            None => Loc::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let loc = Loc::new("prog.c", 12);
        assert_eq!(loc.to_string(), "prog.c:12");
    }

    #[test]
    fn current_loc_sampling() {
        let mut cur = CurrentLoc::default();
        assert!(cur.get().is_none());
        cur.set("a.c", 3);
        cur.advance_line();
        assert_eq!(cur.get(), Loc::new("a.c", 4));
    }
}
