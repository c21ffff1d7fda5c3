//! Inline assembly statements.
//!
//! The text of an `asm { ... }` block is copied verbatim into the
//! output, except that `:VAR` (optionally `:VAR+N` or `:VAR-N`)
//! resolves to the operand for that variable in the enclosing
//! function: `disp,U` for a frame-resident variable, its label for a
//! global. The variable must be visible in the enclosing scope; scope
//! creation checks that and emission assumes it.

use crate::scope::ScopeArena;
use lang_mc::ast::ScopeId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static VAR_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)((?:\+|-)\d+)?").expect("valid regex")
});

/// All names referred to with the `:VAR` notation, whether or not they
/// are declared.
pub fn referenced_variable_names(text: &str) -> BTreeSet<String> {
    VAR_REF
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Rewrites every `:VAR[+off]` in `text` into the variable's operand
/// text. Unknown names are left untouched; scope creation has already
/// diagnosed them.
pub fn resolve_variable_references(text: &str, scope: ScopeId, scopes: &ScopeArena) -> String {
    VAR_REF
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let offset: i16 = caps
                .get(2)
                .map(|m| m.as_str().parse().unwrap_or(0))
                .unwrap_or(0);
            match scopes.lookup(scope, name, true) {
                Some(did) => scopes.decl(did).frame_displacement_arg(offset),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Declaration;
    use crate::types::{BasicType, TypeManager};
    use lang_mc::ops::StorageClass;
    use lang_mc::span::Loc;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_variable_names() {
        let names = referenced_variable_names("  LDB :count\n  STB :total+1\n  LDD #1234");
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["count".to_string(), "total".to_string()]
        );
    }

    #[test]
    fn resolves_frame_and_global_references() {
        let mut tm = TypeManager::new();
        let word = tm.basic_type(BasicType::Word, true);
        let mut scopes = ScopeArena::new();
        let top = scopes.new_scope(None, Loc::none());

        let mut local = Declaration::new("count", word, StorageClass::Auto, Loc::none());
        local.frame_displacement = Some(-4);
        scopes.declare_variable(top, local).unwrap();

        let mut global = Declaration::new("total", word, StorageClass::Global, Loc::none());
        global.label = Some("_total".to_string());
        scopes.declare_variable(top, global).unwrap();

        let out = resolve_variable_references("  LDB :count+1\n  STB :total", top, &scopes);
        assert_eq!(out, "  LDB -3,U\n  STB _total");
    }
}
