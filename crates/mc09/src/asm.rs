//! Assembler output sink.
//!
//! The code generator appends lines to an [`AsmText`]: a label column,
//! an instruction column, an operand column and an optional `;`
//! comment. The sink is append-only; nothing ever rewrites emitted
//! text.

use std::fmt::Write;

const INSTRUCTION_COLUMN: usize = 8;
const COMMENT_COLUMN: usize = 32;

/// Renders a word as the assembler writes immediates: `$ABCD`.
pub fn hex16(value: u16) -> String {
    format!("${:04X}", value)
}

pub fn hex8(value: u8) -> String {
    format!("${:02X}", value)
}

/// Append-only assembler source text.
#[derive(Debug, Default)]
pub struct AsmText {
    out: String,
}

impl AsmText {
    pub fn new() -> AsmText {
        AsmText::default()
    }

    /// One instruction line: `        INS     ARG     ; comment`.
    pub fn ins(&mut self, instruction: &str, argument: &str, comment: &str) {
        let mut line = String::with_capacity(COMMENT_COLUMN + comment.len());
        for _ in 0..INSTRUCTION_COLUMN {
            line.push(' ');
        }
        line.push_str(instruction);
        if !argument.is_empty() {
            while line.len() < INSTRUCTION_COLUMN + 8 {
                line.push(' ');
            }
            line.push(' ');
            line.push_str(argument);
        }
        if !comment.is_empty() {
            while line.len() < COMMENT_COLUMN {
                line.push(' ');
            }
            line.push_str("; ");
            line.push_str(comment);
        }
        line.push('\n');
        self.out.push_str(&line);
    }

    pub fn emit_label(&mut self, label: &str, comment: &str) {
        if comment.is_empty() {
            let _ = writeln!(self.out, "{}", label);
        } else {
            let mut line = label.to_string();
            while line.len() < COMMENT_COLUMN {
                line.push(' ');
            }
            let _ = writeln!(self.out, "{}; {}", line, comment);
        }
    }

    pub fn emit_comment(&mut self, text: &str) {
        let _ = writeln!(self.out, "; {}", text);
    }

    pub fn emit_separator_comment(&mut self) {
        let _ = writeln!(self.out, ";{}", "-".repeat(63));
    }

    pub fn emit_function_start(&mut self, function_id: &str, loc: &str) {
        self.emit_comment(&format!("{}(): {}", function_id, loc));
    }

    pub fn emit_function_end(&mut self, function_id: &str) {
        self.emit_comment(&format!("end of {}()", function_id));
        let _ = writeln!(self.out, "");
    }

    pub fn emit_cmpd_immediate(&mut self, value: u16, comment: &str) {
        self.ins("CMPD", &format!("#{}", hex16(value)), comment);
    }

    /// Inline assembly is copied as-is, one line per source line.
    pub fn emit_inline_assembly(&mut self, text: &str) {
        for line in text.lines() {
            let _ = writeln!(self.out, "{}", line);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn instruction_layout() {
        let mut out = AsmText::new();
        out.ins("LDD", "#$0005", "");
        out.ins("RTS", "", "");
        assert_eq!(out.as_str(), "        LDD      #$0005\n        RTS\n");
    }

    #[test]
    fn label_and_comment() {
        let mut out = AsmText::new();
        out.emit_label("L00001", "then");
        assert!(out.as_str().starts_with("L00001"));
        assert!(out.as_str().contains("; then"));
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(hex16(5), "$0005");
        assert_eq!(hex16(0xABCD), "$ABCD");
        assert_eq!(hex8(7), "$07");
    }
}
