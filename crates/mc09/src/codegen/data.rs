//! Data sections: global variables, pooled literals and the imports
//! of the runtime helpers the emitted code referenced.

use crate::asm::{hex16, hex8, AsmText};
use crate::diag::EmitError;
use crate::scope::Declaration;
use crate::sema::const_eval::evaluate_constant_expr;
use crate::tranunit::TranslationUnit;
use crate::types::{BasicType, TypeDesc, REAL_SIZE};
use lang_mc::ast::{NodeId, NodeKind, Resolved};
use lang_mc::ops::StorageClass;

/// The 5-byte unpacked-BASIC float layout the target's runtime uses:
/// a biased exponent byte, then the 32-bit mantissa, most significant
/// byte first, its top bit replaced by the sign.
pub fn encode_single(value: f64) -> [u8; 5] {
    if value == 0.0 {
        return [0; 5];
    }
    let negative = value < 0.0;
    let mut mantissa = value.abs();
    let mut exponent: i32 = 0;
    while mantissa >= 1.0 {
        mantissa /= 2.0;
        exponent += 1;
    }
    while mantissa < 0.5 {
        mantissa *= 2.0;
        exponent -= 1;
    }
    let bits = (mantissa * 4294967296.0) as u64;
    let bits = bits.min(0xFFFF_FFFF) as u32;
    let mut bytes = bits.to_be_bytes();
    if negative {
        bytes[0] |= 0x80;
    } else {
        bytes[0] &= 0x7F;
    }
    let biased = (0x80 + exponent).clamp(1, 255) as u8;
    [biased, bytes[0], bytes[1], bytes[2], bytes[3]]
}

/// Emits every global and static variable: initialized ones as
/// FCB/FDB/FCC data, uninitialized ones as RMB reservations, extern
/// ones as imports.
pub fn emit_global_data(tu: &mut TranslationUnit, out: &mut AsmText) -> Result<(), EmitError> {
    let decl_ids = tu.scopes.decl_ids(tu.global_scope);
    if decl_ids.is_empty() {
        return Ok(());
    }

    out.emit_separator_comment();
    out.emit_comment("global variables");
    if let Some(org) = tu.pragmas.data_org {
        out.ins("ORG", &hex16(org), "data section origin");
    }

    // Statics declared inside functions also live here; walk every
    // scope for labeled declarations.
    let mut statics: Vec<(String, Declaration)> = Vec::new();
    for did in decl_ids {
        let d = tu.scopes.decl(did).clone();
        statics.push((d.id.clone(), d));
    }
    collect_function_statics(tu, &mut statics);

    for (_, decl) in statics {
        emit_one_global(tu, out, &decl)?;
    }
    Ok(())
}

fn collect_function_statics(tu: &TranslationUnit, out: &mut Vec<(String, Declaration)>) {
    for info in tu.functions.values() {
        let scope = match info.scope {
            Some(s) => s,
            None => continue,
        };
        collect_scope_statics(tu, scope, out);
    }
}

fn collect_scope_statics(
    tu: &TranslationUnit,
    scope: lang_mc::ast::ScopeId,
    out: &mut Vec<(String, Declaration)>,
) {
    for did in tu.scopes.decl_ids(scope) {
        let d = tu.scopes.decl(did);
        if d.storage == StorageClass::Static {
            out.push((d.id.clone(), d.clone()));
        }
    }
    for &child in &tu.scopes.get(scope).children {
        collect_scope_statics(tu, child, out);
    }
}

fn emit_one_global(
    tu: &mut TranslationUnit,
    out: &mut AsmText,
    decl: &Declaration,
) -> Result<(), EmitError> {
    let label = match &decl.label {
        Some(l) => l.clone(),
        None => return Ok(()),
    };
    if decl.storage == StorageClass::Extern {
        out.ins("IMPORT", &label, &format!("extern {}", decl.id));
        return Ok(());
    }

    let desc = tu.types.get(decl.decl_type).clone();
    let size = tu.types.size_of(decl.decl_type).unwrap_or(0);
    let comment = format!("{}: {}", decl.id, tu.types.type_to_string(decl.decl_type));
    out.emit_label(&label, &comment);

    let init = match decl.init {
        Some(i) => i,
        None => {
            out.ins("RMB", &format!("{}", size.max(1)), "");
            return Ok(());
        }
    };

    emit_initializer(tu, out, &desc, decl.decl_type, init)?;
    Ok(())
}

/// Emits the data directives for one initializer against one type.
/// The concatenated bytes are the big-endian representation of the
/// value truncated to the declared size.
fn emit_initializer(
    tu: &mut TranslationUnit,
    out: &mut AsmText,
    desc: &TypeDesc,
    ty: lang_mc::ast::TypeId,
    init: NodeId,
) -> Result<(), EmitError> {
    match tu.arena.kind(init) {
        NodeKind::InitializerList { exprs } => {
            let exprs = exprs.clone();
            match desc.base {
                BasicType::Array => {
                    let elem = desc.pointed.expect("array without element type");
                    let elem_desc = tu.types.get(elem).clone();
                    let declared = desc.num_array_elements.unwrap_or(exprs.len() as u16);
                    for &e in exprs.iter().take(declared as usize) {
                        emit_initializer(tu, out, &elem_desc.clone(), elem, e)?;
                    }
                    // If the list is short, reserve the remaining
                    // elements.
                    let missing = declared.saturating_sub(exprs.len() as u16);
                    if missing > 0 {
                        let elem_size = tu.types.size_of(elem).unwrap_or(1);
                        out.ins("RMB", &format!("{}", missing * elem_size), "rest of array");
                    }
                    Ok(())
                }
                BasicType::Class if desc.is_struct() => {
                    let def = tu
                        .types
                        .class_def(&desc.class_name)
                        .cloned()
                        .ok_or_else(|| {
                            EmitError::new(&tu.arena.loc(init), "initializer for incomplete struct")
                        })?;
                    for (member, &e) in def.members.iter().zip(exprs.iter()) {
                        let md = tu.types.get(member.member_type).clone();
                        emit_initializer(tu, out, &md, member.member_type, e)?;
                    }
                    // If the list is too short, reserve the remaining
                    // members.
                    for member in def.members.iter().skip(exprs.len()) {
                        let msize = tu
                            .types
                            .size_of(member.member_type)
                            .unwrap_or(1)
                            .max(1)
                            * member.num_elements().max(1);
                        out.ins("RMB", &format!("{}", msize), &member.name);
                    }
                    Ok(())
                }
                _ => match exprs.as_slice() {
                    [single] => emit_initializer(tu, out, desc, ty, *single),
                    _ => Err(EmitError::new(
                        &tu.arena.loc(init),
                        "braced initializer for scalar",
                    )),
                },
            }
        }

        NodeKind::StringLiteral { value } => {
            let value = value.clone();
            if desc.base == BasicType::Array {
                emit_string_bytes(out, &value);
                // Pad to the declared length.
                if let Some(n) = desc.num_array_elements {
                    let used = value.len() as u16 + 1;
                    if n > used {
                        out.ins("RMB", &format!("{}", n - used), "rest of array");
                    }
                }
            } else {
                // A pointer initialized with a literal's address.
                let label = tu.string_literal_label(&value);
                out.ins("FDB", &label, "string literal address");
            }
            Ok(())
        }

        NodeKind::DWordConstant { value, .. } => {
            let value = *value;
            out.ins("FDB", &hex16((value >> 16) as u16), &format!("decimal {}", value));
            out.ins("FDB", &hex16(value as u16), "");
            Ok(())
        }

        NodeKind::RealConstant { value, .. } => {
            let bytes = encode_single(*value);
            for b in &bytes {
                out.ins("FCB", &hex8(*b), "");
            }
            Ok(())
        }

        NodeKind::Identifier {
            resolved: Some(Resolved::FunctionAddress(func)),
            ..
        } => {
            let func = func.clone();
            let label = tu
                .functions
                .get(&func)
                .map(|f| f.label.clone())
                .unwrap_or_else(|| format!("_{}", func));
            out.ins("FDB", &label, "function address");
            Ok(())
        }

        NodeKind::Identifier {
            resolved: Some(Resolved::Variable(did)),
            ..
        } => {
            // The address of a global array as an initializer.
            let d = tu.scopes.decl(*did);
            if tu.types.get(d.decl_type).base == BasicType::Array {
                let label = d.label.clone().unwrap_or_else(|| d.id.clone());
                let comment = format!("array {}", d.id);
                out.ins("FDB", &label, &comment);
                return Ok(());
            }
            Err(EmitError::new(
                &tu.arena.loc(init),
                "global initializer is not constant",
            ))
        }

        _ => {
            // Fold everything else to a constant.
            let value = evaluate_constant_expr(&tu.arena, &tu.types, init).ok_or_else(|| {
                EmitError::new(&tu.arena.loc(init), "global initializer is not constant")
            })?;
            match desc.base {
                BasicType::Byte => {
                    out.ins("FCB", &hex8(value as u8), &format!("decimal {}", value as u8))
                }
                BasicType::Class if desc.is_long() => {
                    // A word constant widened to a long.
                    let wide: u32 = if desc.is_signed && (value & 0x8000) != 0 {
                        0xFFFF_0000 | u32::from(value)
                    } else {
                        u32::from(value)
                    };
                    out.ins("FDB", &hex16((wide >> 16) as u16), &format!("decimal {}", value));
                    out.ins("FDB", &hex16(wide as u16), "");
                }
                BasicType::Class if desc.is_real() => {
                    let bytes = encode_single(f64::from(value as i16));
                    for b in &bytes {
                        out.ins("FCB", &hex8(*b), "");
                    }
                }
                _ => out.ins("FDB", &hex16(value), &format!("decimal {}", value)),
            }
            Ok(())
        }
    }
}

/// One FCB per byte for short or non-printable content, FCC runs for
/// printable stretches, always NUL-terminated.
fn emit_string_bytes(out: &mut AsmText, value: &str) {
    let bytes = value.as_bytes();
    let mut run = String::new();
    for &b in bytes {
        if (0x20..0x7F).contains(&b) && b != b'"' {
            run.push(b as char);
        } else {
            if !run.is_empty() {
                out.ins("FCC", &format!("\"{}\"", run), "");
                run.clear();
            }
            out.ins("FCB", &hex8(b), "");
        }
    }
    if !run.is_empty() {
        out.ins("FCC", &format!("\"{}\"", run), "");
    }
    out.ins("FCB", "$00", "terminating NUL");
}

/// String, 32-bit and real literals referenced by the emitted code.
pub fn emit_literal_pools(tu: &mut TranslationUnit, out: &mut AsmText) {
    if tu.string_literals.is_empty() && tu.dword_constants.is_empty() && tu.real_constants.is_empty()
    {
        return;
    }
    out.emit_separator_comment();
    out.emit_comment("read-only literals");

    let strings: Vec<(String, String)> = tu
        .string_literals
        .iter()
        .map(|(v, l)| (v.clone(), l.clone()))
        .collect();
    for (value, label) in strings {
        out.emit_label(&label, "string literal");
        emit_string_bytes(out, &value);
    }

    let dwords: Vec<(u32, String)> = tu
        .dword_constants
        .iter()
        .map(|(v, l)| (*v, l.clone()))
        .collect();
    for (value, label) in dwords {
        out.emit_label(&label, &format!("32-bit constant {}", value));
        out.ins("FDB", &hex16((value >> 16) as u16), "");
        out.ins("FDB", &hex16(value as u16), "");
    }

    let reals: Vec<(f64, String)> = tu.real_constants.values().cloned().collect();
    for (value, label) in reals {
        out.emit_label(&label, &format!("real constant {}", value));
        for b in &encode_single(value) {
            out.ins("FCB", &hex8(*b), "");
        }
    }
    debug_assert_eq!(REAL_SIZE, 5);
}

/// One IMPORT per runtime helper the unit referenced.
pub fn emit_utility_imports(tu: &mut TranslationUnit, out: &mut AsmText) {
    if !tu.options.import_runtime_utilities || tu.needed_utilities.is_empty() {
        return;
    }
    out.emit_separator_comment();
    out.emit_comment("runtime helper routines");
    let names: Vec<String> = tu.needed_utilities.iter().cloned().collect();
    for name in names {
        out.ins("IMPORT", &name, "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_encoding_of_zero_and_one() {
        assert_eq!(encode_single(0.0), [0, 0, 0, 0, 0]);
        // 1.0 = 0.5 * 2^1: exponent byte $81, mantissa $80000000 with
        // the sign bit cleared.
        assert_eq!(encode_single(1.0), [0x81, 0x00, 0x00, 0x00, 0x00]);
        // -1.0 only differs by the sign bit.
        assert_eq!(encode_single(-1.0), [0x81, 0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn single_encoding_of_half_and_ten() {
        // 0.5 = 0.5 * 2^0
        assert_eq!(encode_single(0.5), [0x80, 0x00, 0x00, 0x00, 0x00]);
        // 10 = 0.625 * 2^4: exponent $84, mantissa $A0000000
        assert_eq!(encode_single(10.0), [0x84, 0x20, 0x00, 0x00, 0x00]);
    }
}
