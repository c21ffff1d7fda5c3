//! `#pragma` directives.
//!
//! Pragmas arrive from the parser as raw directive text. The forms the
//! compiler understands are parsed here; how `org`/`limit`/`data`
//! affect section origins is the assembler driver's business and out
//! of scope, so the translation unit merely records the values.

/// A recognized pragma directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Pragma {
    CodeOrg(u16),
    CodeLimit(u16),
    DataOrg(u16),
    ExecOnce,
    /// Extra stack bytes every function of the unit must be able to
    /// count on; checked by `_stkcheck` in the prologue.
    StackSpace(u16),
    VxTitle(String),
    VxTitleSize { height: i16, width: i16 },
    VxTitlePos { y: i16, x: i16 },
    VxMusic(String),
    VxCopyright(String),
}

/// Values accumulated from the pragmas of one translation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PragmaState {
    pub code_org: Option<u16>,
    pub code_limit: Option<u16>,
    pub data_org: Option<u16>,
    pub exec_once: bool,
    pub stack_space: u16,
    pub vx_title: Option<String>,
    pub vx_title_size: Option<(i16, i16)>,
    pub vx_title_pos: Option<(i16, i16)>,
    pub vx_music: Option<String>,
    pub vx_copyright: Option<String>,
}

impl PragmaState {
    pub fn apply(&mut self, pragma: &Pragma) {
        match pragma {
            Pragma::CodeOrg(a) => self.code_org = Some(*a),
            Pragma::CodeLimit(a) => self.code_limit = Some(*a),
            Pragma::DataOrg(a) => self.data_org = Some(*a),
            Pragma::ExecOnce => self.exec_once = true,
            Pragma::StackSpace(n) => self.stack_space = *n,
            Pragma::VxTitle(s) => self.vx_title = Some(s.clone()),
            Pragma::VxTitleSize { height, width } => {
                self.vx_title_size = Some((*height, *width))
            }
            Pragma::VxTitlePos { y, x } => self.vx_title_pos = Some((*y, *x)),
            Pragma::VxMusic(s) => self.vx_music = Some(s.clone()),
            Pragma::VxCopyright(s) => self.vx_copyright = Some(s.clone()),
        }
    }
}

/// Parses one directive. Returns `None` for directives the compiler
/// does not recognize; those are ignored, as the original toolchain
/// does.
pub fn parse(directive: &str) -> Option<Pragma> {
    let directive = directive.trim();
    let (keyword, rest) = match directive.find(char::is_whitespace) {
        Some(i) => (&directive[..i], directive[i..].trim_start()),
        None => (directive, ""),
    };
    match keyword {
        "org" => parse_address(rest).map(Pragma::CodeOrg),
        "limit" => parse_address(rest).map(Pragma::CodeLimit),
        "data" => parse_address(rest).map(Pragma::DataOrg),
        "exec_once" if rest.is_empty() => Some(Pragma::ExecOnce),
        "stack_space" => rest.parse::<u16>().ok().map(Pragma::StackSpace),
        "vx_title" => parse_quoted(rest).map(Pragma::VxTitle),
        "vx_title_size" => {
            let (height, width) = parse_pair(rest)?;
            Some(Pragma::VxTitleSize { height, width })
        }
        "vx_title_pos" => {
            let (y, x) = parse_pair(rest)?;
            Some(Pragma::VxTitlePos { y, x })
        }
        "vx_music" => {
            if rest.is_empty() {
                None
            } else {
                Some(Pragma::VxMusic(rest.to_string()))
            }
        }
        "vx_copyright" => parse_quoted(rest).map(Pragma::VxCopyright),
        _ => None,
    }
}

/// Decimal, or hexadecimal with a `0x` prefix, not exceeding $FFFF.
fn parse_address(text: &str) -> Option<u16> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u16>().ok()
    }
}

fn parse_quoted(text: &str) -> Option<String> {
    let text = text.trim();
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    Some(inner.to_string())
}

/// Two comma-separated signed numbers, e.g. `#pragma vx_title_size h, w`.
fn parse_pair(text: &str) -> Option<(i16, i16)> {
    let mut parts = text.splitn(2, ',');
    let a = parts.next()?.trim().parse::<i16>().ok()?;
    let b = parts.next()?.trim().parse::<i16>().ok()?;
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn org_forms() {
        assert_eq!(parse("org 10240"), Some(Pragma::CodeOrg(10240)));
        assert_eq!(parse("org 0x2800"), Some(Pragma::CodeOrg(0x2800)));
        assert_eq!(parse("data 0x3800"), Some(Pragma::DataOrg(0x3800)));
        assert_eq!(parse("limit 0xF000"), Some(Pragma::CodeLimit(0xF000)));
        assert_eq!(parse("org 70000"), None);
    }

    #[test]
    fn misc_forms() {
        assert_eq!(parse("exec_once"), Some(Pragma::ExecOnce));
        assert_eq!(parse("stack_space 1024"), Some(Pragma::StackSpace(1024)));
        assert_eq!(
            parse("vx_title \"My Game\""),
            Some(Pragma::VxTitle("My Game".to_string()))
        );
        assert_eq!(
            parse("vx_title_size 40, 60"),
            Some(Pragma::VxTitleSize {
                height: 40,
                width: 60
            })
        );
        assert_eq!(parse("vx_music song_data"), Some(Pragma::VxMusic("song_data".to_string())));
        assert_eq!(parse("frobnicate 3"), None);
    }

    #[test]
    fn state_accumulates() {
        let mut state = PragmaState::default();
        state.apply(&parse("org 0x2800").unwrap());
        state.apply(&parse("stack_space 512").unwrap());
        assert_eq!(state.code_org, Some(0x2800));
        assert_eq!(state.stack_space, 512);
    }
}
