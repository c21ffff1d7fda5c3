//! Binary operators: arithmetic, bitwise, shifts, comparisons and the
//! short-circuit logical operators. Array subscripts land here too,
//! since the grammar treats `a[i]` as a binary operator.
//!
//! Every operator has a general strategy plus peephole cases keyed on
//! constant operands, operand widths and powers of two; the tables
//! sit next to the code that uses them.

use crate::asm::{hex16, hex8, AsmText};
use crate::codegen::{emit_code, emit_word_rvalue, EmitCtx};
use crate::diag::EmitError;
use crate::sema::tree;
use crate::types::BasicType;
use bitflags::bitflags;
use lang_mc::ast::{NodeId, NodeKind};
use lang_mc::ops::BinaryOp;

bitflags! {
    /// Flag byte consumed by the `signedDivOrModOnDWord` runtime
    /// helper, selecting the exact operation variant.
    pub struct DivFlags: u8 {
        const DIVISION        = 1 << 0;
        const RESULT_SIGNED   = 1 << 1;
        const DIVIDEND_LONG   = 1 << 2;
        const DIVIDEND_SIGNED = 1 << 3;
        const DIVISOR_LONG    = 1 << 4;
        const DIVISOR_SIGNED  = 1 << 5;
    }
}

pub fn emit(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let (op, left, right) = parts(ctx, id);
    match op {
        BinaryOp::ArrayRef => emit_array_ref(ctx, out, id, left, right, l_value),
        BinaryOp::Add => emit_add_sub(ctx, out, id, left, right, l_value, false),
        BinaryOp::Sub => emit_add_sub(ctx, out, id, left, right, l_value, true),
        BinaryOp::Mul => emit_mul(ctx, out, id, left, right, l_value),
        BinaryOp::Div => emit_div_mod(ctx, out, id, left, right, l_value, true),
        BinaryOp::Mod => emit_div_mod(ctx, out, id, left, right, l_value, false),
        BinaryOp::LeftShift => emit_shift(ctx, out, id, left, right, l_value, true, false),
        BinaryOp::RightShift => emit_shift(ctx, out, id, left, right, l_value, false, false),
        BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr | BinaryOp::BitwiseXor => {
            emit_bitwise(ctx, out, id, op, left, right, l_value)
        }
        BinaryOp::LogicalAnd => emit_logical_and(ctx, out, id, left, right, l_value),
        BinaryOp::LogicalOr => emit_logical_or(ctx, out, id, left, right, l_value),
        op if op.is_relational() => {
            if l_value {
                return Err(ctx.internal(id, "comparison has no address"));
            }
            let signed = is_signed_comparison(ctx, left, right);
            let branch = branch_opcode(op, signed)
                .ok_or_else(|| ctx.internal(id, "no branch for operator"))?;
            emit_comparison(ctx, out, id, true, branch)
        }
        _ => Err(ctx.internal(id, "assignment operator reached binary emitter")),
    }
}

fn parts(ctx: &EmitCtx<'_>, id: NodeId) -> (BinaryOp, NodeId, NodeId) {
    match ctx.arena.kind(id) {
        NodeKind::Binary { op, left, right } => (*op, *left, *right),
        _ => unreachable!("binary emitter on non-binary node"),
    }
}

// ----- shared helpers -----

/// Long-branch opcode implementing a relational operator, picked by
/// the signedness of the comparison.
pub fn branch_opcode(op: BinaryOp, signed: bool) -> Option<&'static str> {
    Some(match op {
        BinaryOp::Equality => "LBEQ",
        BinaryOp::Inequality => "LBNE",
        BinaryOp::Inferior => {
            if signed {
                "LBLT"
            } else {
                "LBLO"
            }
        }
        BinaryOp::InferiorOrEqual => {
            if signed {
                "LBLE"
            } else {
                "LBLS"
            }
        }
        BinaryOp::Superior => {
            if signed {
                "LBGT"
            } else {
                "LBHI"
            }
        }
        BinaryOp::SuperiorOrEqual => {
            if signed {
                "LBGE"
            } else {
                "LBHS"
            }
        }
        _ => return None,
    })
}

pub fn is_signed_comparison(ctx: &EmitCtx<'_>, left: NodeId, right: NodeId) -> bool {
    tree::is_signed(ctx.arena, ctx.types, left) && tree::is_signed(ctx.arena, ctx.types, right)
}

/// Helper-name fragment for one operand of a wide operation.
fn variant_name(ctx: &EmitCtx<'_>, id: NodeId, include_signedness_of_long: bool) -> &'static str {
    let d = ctx.desc(id);
    if d.is_single() {
        return "Single";
    }
    if d.is_double() {
        return "Double";
    }
    if d.is_long() {
        return if include_signedness_of_long {
            if d.is_signed {
                "SignedDWord"
            } else {
                "UnsignedDWord"
            }
        } else {
            "DWord"
        };
    }
    if d.is_signed {
        "SignedInt"
    } else {
        "UnsignedInt"
    }
}

/// Emits an operand of a numerical helper call. A real or long leaves
/// its address in X; a byte or word leaves its value in D, promoted to
/// a word. When `push` is set the register is pushed. Returns the
/// register that holds the operand.
pub fn emit_numerical_operand(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    push: bool,
) -> Result<char, EmitError> {
    if ctx.is_real_or_long(id) {
        emit_code(ctx, out, id, true)?; // address in X
        if push {
            out.ins("PSHS", "X", "");
        }
        return Ok('X');
    }
    emit_word_rvalue(ctx, out, id)?;
    if push {
        out.ins("PSHS", "B,A", "");
    }
    Ok('D')
}

/// Arithmetic on a real or long: pushes both operands (address for
/// wide ones, promoted word value otherwise), points X at the hidden
/// temporary, and calls `<op><LeftVariant><RightVariant>`. On return X
/// addresses the result.
///
/// With `push_address_of_left`, the left side is evaluated as an
/// l-value and its address is left on the stack after the call, for
/// the compound assignments that must also deliver the left side.
pub fn emit_real_or_long_op(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    op_name: &str,
    left: NodeId,
    right: NodeId,
    push_address_of_left: bool,
) -> Result<(), EmitError> {
    if push_address_of_left {
        out.ins("LEAS", "-2,S", "slot for pointer to left side");
    }

    out.emit_comment(&format!("push right operand of {}", op_name));
    let right_reg = emit_numerical_operand(ctx, out, right, true)?;

    out.emit_comment(&format!("push left operand of {}", op_name));
    let left_reg;
    if push_address_of_left {
        emit_code(ctx, out, left, true)?; // address of left side in X
        out.ins("STX", "2,S", "save in slot for pointer to left side");
        if ctx.is_real_or_long(left) {
            out.ins("PSHS", "X", "");
            left_reg = 'X';
        } else {
            if ctx.is_byte(left) {
                out.ins("LDB", ",X", "");
                out.ins(
                    tree::conv_to_word_ins(ctx.arena, ctx.types, left),
                    "",
                    "promote to word",
                );
            } else {
                out.ins("LDD", ",X", "");
            }
            out.ins("PSHS", "B,A", "");
            left_reg = 'D';
        }
    } else {
        left_reg = emit_numerical_operand(ctx, out, left, true)?;
    }

    debug_assert!(left_reg == 'X' || right_reg == 'X');
    if let Some(temp) = ctx.arena.get(id).temp {
        let d = ctx.decl(temp);
        let comment = format!(
            "temporary destination, type {}",
            ctx.types.type_to_string(d.decl_type)
        );
        out.ins("LEAX", &ctx.var_arg(temp, 0), &comment);
    } else if left_reg != 'X' {
        return Err(ctx.internal(id, "in-place wide operation requires a wide left side"));
    }

    let include_signedness = is_real_and_long_operation(ctx, left, right);
    let name = if left_reg == 'X' && right_reg == 'X' {
        format!(
            "{}{}{}",
            op_name,
            variant_name(ctx, left, include_signedness),
            variant_name(ctx, right, include_signedness)
        )
    } else if left_reg == 'X' {
        format!(
            "{}{}{}",
            op_name,
            variant_name(ctx, left, include_signedness),
            if tree::is_signed(ctx.arena, ctx.types, right) {
                "Int"
            } else {
                "UnsignedInt"
            }
        )
    } else {
        format!(
            "{}{}{}",
            op_name,
            if tree::is_signed(ctx.arena, ctx.types, left) {
                "Int"
            } else {
                "UnsignedInt"
            },
            variant_name(ctx, right, include_signedness)
        )
    };
    ctx.call_utility(out, &name, "preserves X");
    out.ins("LEAS", "4,S", "");
    Ok(())
}

fn is_real_and_long_operation(ctx: &EmitCtx<'_>, left: NodeId, right: NodeId) -> bool {
    let (ld, rd) = (ctx.desc(left), ctx.desc(right));
    (ld.is_real() && rd.is_long()) || (ld.is_long() && rd.is_real())
}

/// Emits a constant-folded operation when the whole node folds.
fn emit_if_constant(ctx: &mut EmitCtx<'_>, out: &mut AsmText, id: NodeId) -> bool {
    let value = match ctx.eval_const(id) {
        Some(v) => v,
        None => return false,
    };
    if ctx.is_byte(id) {
        out.ins(
            "LDB",
            &format!("#{}", hex8(value as u8)),
            &format!("constant expression: {}", value as u8),
        );
    } else {
        out.ins(
            "LDD",
            &format!("#{}", hex16(value)),
            &format!("constant expression: {}", value),
        );
    }
    true
}

/// Emits both operands for a word-sized operation: `first` is pushed
/// as a word, `second` ends in D. Pass the right operand as `first`
/// for non-commutative operations so that `OP ,S++` computes
/// left-minus-right.
fn push_first_then_load(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    first: NodeId,
    second: NodeId,
) -> Result<(), EmitError> {
    emit_word_rvalue(ctx, out, first)?;
    out.ins("PSHS", "B,A", "");
    emit_word_rvalue(ctx, out, second)
}

// ----- array subscript -----

/// `base[index]`: computes the element address in X (l-value) or the
/// element value (r-value).
fn emit_array_ref(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    base: NodeId,
    index: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let elem_size = ctx
        .types
        .size_of(ctx.ty(id))
        .ok_or_else(|| ctx.internal(id, "subscript on incomplete element type"))?;

    // Constant index peephole: one LEAX (or direct load) with a
    // constant offset off the base address.
    if let Some(index_value) = ctx.eval_const(index) {
        let offset = index_value.wrapping_mul(elem_size) as i16;
        emit_base_address(ctx, out, base)?;
        if offset != 0 {
            out.ins("LEAX", &format!("{},X", offset), "constant subscript");
        }
        return finish_element(ctx, out, id, l_value);
    }

    // Variable index: scale it by the element size.
    emit_scaled_index(ctx, out, index, elem_size)?;
    out.ins("PSHS", "B,A", "scaled subscript");
    emit_base_address(ctx, out, base)?;
    out.ins("TFR", "X,D", "");
    out.ins("ADDD", ",S++", "add scaled subscript");
    out.ins("TFR", "D,X", "address of element");
    finish_element(ctx, out, id, l_value)
}

/// Leaves the base address of a pointer or array expression in X.
fn emit_base_address(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    base: NodeId,
) -> Result<(), EmitError> {
    if ctx.desc(base).base == BasicType::Pointer {
        // The pointer's value is the base address.
        if let Some(did) = tree::as_variable(ctx.arena, base) {
            out.ins("LDX", &ctx.var_arg(did, 0), "pointer variable");
            if ctx.options.null_pointer_checking {
                ctx.call_utility(out, "check_null_ptr_x", "");
            }
            return Ok(());
        }
        emit_code(ctx, out, base, false)?;
        out.ins("TFR", "D,X", "");
        if ctx.options.null_pointer_checking {
            ctx.call_utility(out, "check_null_ptr_x", "");
        }
        Ok(())
    } else {
        emit_code(ctx, out, base, true) // array: address in X
    }
}

/// Loads a subscript as a word in D. A long subscript contributes its
/// low word.
fn emit_index_word(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    index: NodeId,
) -> Result<(), EmitError> {
    if ctx.desc(index).is_long() {
        emit_code(ctx, out, index, true)?; // address of long subscript in X
        out.ins("LDD", "2,X", "low word of long array subscript");
        Ok(())
    } else {
        emit_word_rvalue(ctx, out, index)
    }
}

/// Emits `index * elem_size` as a word in D. Powers of two become
/// shifts; byte operands use the 8-bit MUL when they can.
fn emit_scaled_index(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    index: NodeId,
    elem_size: u16,
) -> Result<(), EmitError> {
    if elem_size == 1 {
        return emit_index_word(ctx, out, index);
    }
    if elem_size.is_power_of_two() && elem_size <= 16 {
        emit_index_word(ctx, out, index)?;
        let mut n = elem_size;
        while n > 1 {
            out.ins("LSLB", "", "");
            out.ins("ROLA", "", "scale subscript");
            n /= 2;
        }
        return Ok(());
    }
    if ctx.is_byte(index) && elem_size <= 255 && !tree::is_signed(ctx.arena, ctx.types, index) {
        emit_code(ctx, out, index, false)?; // byte in B
        out.ins("LDA", &format!("#{}", hex8(elem_size as u8)), "element size");
        out.ins("MUL", "", "scale byte subscript");
        return Ok(());
    }
    emit_index_word(ctx, out, index)?;
    out.ins("TFR", "D,X", "");
    out.ins("LDD", &format!("#{}", elem_size), "element size");
    ctx.call_utility(out, "MUL16", "");
    Ok(())
}

/// X holds the element address; deliver per the l-value/r-value
/// contract.
fn finish_element(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    if l_value {
        return Ok(());
    }
    match ctx.desc(id).base {
        BasicType::Byte => out.ins("LDB", ",X", "indexed element"),
        BasicType::Word | BasicType::Pointer => out.ins("LDD", ",X", "indexed element"),
        BasicType::Array => out.ins("TFR", "X,D", "address of sub-array is its value"),
        _ => {} // wide or aggregate: address in X is the r-value
    }
    Ok(())
}

// ----- addition and subtraction -----

fn emit_add_sub(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
    do_sub: bool,
) -> Result<(), EmitError> {
    if ctx.is_real_or_long(id) {
        return emit_real_or_long_op(
            ctx,
            out,
            id,
            if do_sub { "sub" } else { "add" },
            left,
            right,
            false,
        );
    }
    if l_value {
        return Err(ctx.internal(id, "sum has no address"));
    }
    if emit_if_constant(ctx, out, id) {
        return Ok(());
    }

    let ld = ctx.desc(left).clone();
    let rd = ctx.desc(right).clone();

    // ptr - ptr: subtract, then divide by the element size.
    if do_sub && ld.is_ptr_or_array() && rd.is_ptr_or_array() {
        let pointee = ld.pointed.expect("pointer without pointee");
        let elem_size = ctx
            .types
            .size_of(ctx.types.final_array_element_type(pointee))
            .unwrap_or(1);
        push_pointer_value(ctx, out, right)?;
        load_pointer_value(ctx, out, left)?;
        out.ins("SUBD", ",S++", "pointer difference in bytes");
        if elem_size > 1 {
            if elem_size.is_power_of_two() {
                let mut n = elem_size;
                while n > 1 {
                    out.ins("LSRA", "", "");
                    out.ins("RORB", "", "divide by element size");
                    n /= 2;
                }
            } else {
                out.ins("TFR", "D,X", "");
                out.ins("LDD", &format!("#{}", elem_size), "element size");
                ctx.call_utility(out, "DIV16", "");
                out.ins("TFR", "X,D", "quotient");
            }
        }
        return Ok(());
    }

    // Pointer arithmetic: scale the integral operand by the pointee
    // size before adding or subtracting.
    if ld.is_ptr_or_array() && rd.is_integral() {
        return emit_pointer_plus_int(ctx, out, id, left, right, do_sub);
    }
    if !do_sub && ld.is_integral() && rd.is_ptr_or_array() {
        return emit_pointer_plus_int(ctx, out, id, right, left, false);
    }

    // var +/- const: one load, one immediate operation.
    if let (Some(did), Some(value)) = (tree::as_variable(ctx.arena, left), ctx.eval_const(right)) {
        let value = if do_sub { value.wrapping_neg() } else { value };
        if ctx.is_byte(id) && ctx.is_byte(left) {
            out.ins("LDB", &ctx.var_arg(did, 0), "variable");
            out.ins("ADDB", &format!("#{}", hex8(value as u8)), "immediate operand");
        } else {
            emit_word_rvalue(ctx, out, left)?;
            out.ins("ADDD", &format!("#{}", hex16(value)), "immediate operand");
        }
        return Ok(());
    }

    // Byte-sized operation.
    if ctx.is_byte(id) && ctx.is_byte(left) && ctx.is_byte(right) {
        emit_code(ctx, out, right, false)?;
        out.ins("PSHS", "B", "right operand");
        emit_code(ctx, out, left, false)?;
        out.ins(if do_sub { "SUBB" } else { "ADDB" }, ",S+", "");
        return Ok(());
    }

    // General word case: push the right operand, load the left.
    push_first_then_load(ctx, out, right, left)?;
    out.ins(if do_sub { "SUBD" } else { "ADDD" }, ",S++", "");
    Ok(())
}

/// Pointer value as a word in D, pushed.
fn push_pointer_value(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
) -> Result<(), EmitError> {
    load_pointer_value(ctx, out, id)?;
    out.ins("PSHS", "B,A", "");
    Ok(())
}

fn load_pointer_value(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
) -> Result<(), EmitError> {
    if ctx.desc(id).base == BasicType::Array {
        emit_code(ctx, out, id, true)?;
        out.ins("TFR", "X,D", "array address");
        Ok(())
    } else {
        emit_code(ctx, out, id, false)
    }
}

fn emit_pointer_plus_int(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    ptr: NodeId,
    int: NodeId,
    do_sub: bool,
) -> Result<(), EmitError> {
    let pointee = ctx.desc(ptr).pointed.expect("pointer without pointee");
    let size = ctx.types.size_of(pointee).unwrap_or(1);

    // Constant offset: fold the scaling into an immediate.
    if let Some(value) = ctx.eval_const(int) {
        let offset = value.wrapping_mul(size);
        load_pointer_value(ctx, out, ptr)?;
        if offset != 0 {
            out.ins(
                if do_sub { "SUBD" } else { "ADDD" },
                &format!("#{}", hex16(offset)),
                &format!("{} elements", value),
            );
        }
        return Ok(());
    }

    if size == 1 {
        push_first_then_load(ctx, out, int, ptr)?;
    } else if size.is_power_of_two() && size <= 16 {
        emit_word_rvalue(ctx, out, int)?;
        let mut n = size;
        while n > 1 {
            out.ins("LSLB", "", "");
            out.ins("ROLA", "", "scale by element size");
            n /= 2;
        }
        out.ins("PSHS", "B,A", "");
        load_pointer_value(ctx, out, ptr)?;
    } else {
        // Large pointee: multiply the index by the size with MUL16.
        load_pointer_value(ctx, out, ptr)?;
        out.ins("PSHS", "B,A", "pointer value");
        emit_word_rvalue(ctx, out, int)?;
        out.ins("TFR", "D,X", "");
        out.ins("LDD", &format!("#{}", size), "pointed type size");
        ctx.call_utility(out, "MUL16", "");
        if do_sub {
            // offset is in D; compute ptr - offset
            out.ins("PSHS", "B,A", "");
            out.ins("LDD", "2,S", "pointer value");
            out.ins("SUBD", ",S++", "");
            out.ins("LEAS", "2,S", "");
            return Ok(());
        }
        out.ins("ADDD", ",S++", "");
        return Ok(());
    }
    if do_sub {
        // stack holds the scaled offset; D holds the pointer
        out.ins("SUBD", ",S++", "");
    } else {
        out.ins("ADDD", ",S++", "");
    }
    Ok(())
}

// ----- multiplication -----

fn emit_mul(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    if ctx.is_real_or_long(id) {
        return emit_real_or_long_op(ctx, out, id, "mul", left, right, false);
    }
    if l_value {
        return Err(ctx.internal(id, "product has no address"));
    }

    // Fold only when both operands are unsigned or positive constants;
    // a signed fold would not match the target's narrow multiply.
    if tree::is_unsigned_or_positive_const(ctx.arena, ctx.types, left)
        && tree::is_unsigned_or_positive_const(ctx.arena, ctx.types, right)
        && emit_if_constant(ctx, out, id)
    {
        return Ok(());
    }

    // byte * byte: the 6809 multiplies A by B directly.
    if ctx.is_byte(left) && ctx.is_byte(right) {
        emit_code(ctx, out, left, false)?;
        out.ins("PSHS", "B", "left factor");
        emit_code(ctx, out, right, false)?;
        out.ins("PULS", "A", "left factor");
        out.ins("MUL", "", "");
        return Ok(());
    }

    // Multiplication by 10 has a dedicated helper.
    if ctx.eval_const(right) == Some(10) && !tree::is_signed(ctx.arena, ctx.types, left) {
        emit_word_rvalue(ctx, out, left)?;
        ctx.call_utility(out, "MUL16BY10", "");
        return Ok(());
    }

    // Powers of two become shifts.
    if let Some(value) = ctx.eval_const(right) {
        if value.is_power_of_two() {
            emit_word_rvalue(ctx, out, left)?;
            let mut n = value;
            while n > 1 {
                out.ins("LSLB", "", "");
                out.ins("ROLA", "", "multiply by 2");
                n /= 2;
            }
            return Ok(());
        }
    }

    emit_word_rvalue(ctx, out, left)?;
    out.ins("PSHS", "B,A", "left factor");
    emit_word_rvalue(ctx, out, right)?;
    out.ins("PULS", "X", "left factor");
    ctx.call_utility(out, "MUL16", "");
    Ok(())
}

// ----- division and modulo -----

fn emit_div_mod(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
    is_division: bool,
) -> Result<(), EmitError> {
    let desc = ctx.desc(id).clone();

    if desc.is_real() {
        return emit_real_or_long_op(ctx, out, id, "div", left, right, false);
    }
    if desc.is_long() {
        return emit_long_div_or_mod(ctx, out, id, left, right, is_division);
    }
    if l_value {
        return Err(ctx.internal(id, "quotient has no address"));
    }
    if emit_if_constant(ctx, out, id) {
        return Ok(());
    }

    let left_signed = tree::is_signed(ctx.arena, ctx.types, left);
    let right_value = ctx.eval_const(right);

    // Unsigned division and modulo by powers of two collapse to
    // shifts and masks. Signed operands keep the general path: the
    // rounding of a signed division is not an arithmetic shift.
    if let Some(value) = right_value {
        if !left_signed && value.is_power_of_two() && value > 1 {
            if is_division {
                emit_word_rvalue(ctx, out, left)?;
                let mut n = value;
                while n > 1 {
                    out.ins("LSRA", "", "");
                    out.ins("RORB", "", "divide by 2");
                    n /= 2;
                }
            } else {
                let mask = value - 1;
                emit_word_rvalue(ctx, out, left)?;
                out.ins("ANDA", &format!("#{}", hex8((mask >> 8) as u8)), "");
                out.ins("ANDB", &format!("#{}", hex8(mask as u8)), "modulo mask");
            }
            return Ok(());
        }
        // Unsigned word divided by 10: decimal conversion loops lean
        // on this.
        if is_division && value == 10 && !left_signed {
            emit_word_rvalue(ctx, out, left)?;
            ctx.call_utility(out, "DIV16BY10", "");
            return Ok(());
        }
        // Byte divided by 7.
        if is_division && value == 7 && ctx.is_byte(left) && !left_signed && ctx.is_byte(id) {
            emit_code(ctx, out, left, false)?;
            ctx.call_utility(out, "DIV8BY7", "");
            return Ok(());
        }
    }

    let signed = left_signed && tree::is_signed(ctx.arena, ctx.types, right);
    emit_word_rvalue(ctx, out, left)?;
    out.ins("PSHS", "B,A", "dividend");
    emit_word_rvalue(ctx, out, right)?;
    out.ins("PULS", "X", "dividend");
    ctx.call_utility(out, if signed { "SDIV16" } else { "DIV16" }, "quotient in X, remainder in D");
    if is_division {
        out.ins("TFR", "X,D", "quotient");
    }
    Ok(())
}

/// Long division and modulo, signed or not: the helper receives both
/// operand descriptions, the destination address and a flag byte
/// selecting the exact variant.
fn emit_long_div_or_mod(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    is_division: bool,
) -> Result<(), EmitError> {
    // Divisor info.
    let right_reg = emit_numerical_operand(ctx, out, right, false)?;
    out.ins("PSHS", if right_reg == 'X' { "X" } else { "B,A" }, "divisor");

    // Dividend info.
    let left_reg = emit_numerical_operand(ctx, out, left, false)?;
    out.ins("PSHS", if left_reg == 'X' { "X" } else { "B,A" }, "dividend");

    // Quotient info.
    if let Some(temp) = ctx.arena.get(id).temp {
        let d = ctx.decl(temp);
        let comment = format!("destination of type {}", ctx.types.type_to_string(d.decl_type));
        out.ins("LEAX", &ctx.var_arg(temp, 0), &comment);
    } else if left_reg != 'X' {
        return Err(ctx.internal(id, "in-place long division requires a long left side"));
    } else {
        emit_code(ctx, out, left, true)?;
    }
    out.ins("PSHS", "X", "address of quotient to be computed");

    let mut flags = DivFlags::empty();
    flags.set(DivFlags::DIVISION, is_division);
    flags.set(DivFlags::RESULT_SIGNED, ctx.desc(id).is_signed);
    flags.set(DivFlags::DIVIDEND_LONG, ctx.desc(left).is_long());
    flags.set(
        DivFlags::DIVIDEND_SIGNED,
        tree::is_signed(ctx.arena, ctx.types, left),
    );
    flags.set(DivFlags::DIVISOR_LONG, ctx.desc(right).is_long());
    flags.set(
        DivFlags::DIVISOR_SIGNED,
        tree::is_signed(ctx.arena, ctx.types, right),
    );
    out.ins("LDB", &format!("#{}", hex8(flags.bits())), "flag byte");

    ctx.call_utility(out, "signedDivOrModOnDWord", "");
    out.ins("LEAS", "6,S", "");
    Ok(())
}

// ----- shifts -----

#[allow(clippy::too_many_arguments)]
pub fn emit_shift(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
    is_left_shift: bool,
    change_left_side: bool,
) -> Result<(), EmitError> {
    if ctx.desc(left).is_real_or_long() {
        return emit_dword_shift(ctx, out, id, left, right, is_left_shift, change_left_side);
    }
    if l_value && !change_left_side {
        return Err(ctx.internal(id, "shift has no address"));
    }
    if !change_left_side && emit_if_constant(ctx, out, id) {
        return Ok(());
    }

    let left_signed = tree::is_signed(ctx.arena, ctx.types, left);
    let is_byte = ctx.is_byte(left);
    let const_shift = ctx.eval_const(right);

    if let Some(mut num_bits) = const_shift {
        // Get the value (r-value) or the address (compound form).
        emit_code(ctx, out, left, change_left_side)?;
        if change_left_side {
            out.ins(
                if is_byte { "LDB" } else { "LDD" },
                ",X",
                "get value to be shifted",
            );
        }
        if num_bits == 0 {
            if change_left_side {
                // nothing to store back differently
            }
            return Ok(());
        }
        if is_byte {
            let count = num_bits.min(8);
            for _ in 0..count {
                out.ins(
                    if is_left_shift {
                        "LSLB"
                    } else if left_signed {
                        "ASRB"
                    } else {
                        "LSRB"
                    },
                    "",
                    "",
                );
            }
        } else {
            if num_bits >= 8 {
                // Shift by 8 is a register move.
                if is_left_shift {
                    out.ins("TFR", "B,A", "shift left by 8");
                    out.ins("CLRB", "", "");
                } else {
                    out.ins("TFR", "A,B", "shift right by 8");
                    if left_signed {
                        out.ins("SEX", "", "signed");
                    } else {
                        out.ins("CLRA", "", "unsigned");
                    }
                }
                num_bits -= 8;
            }
            if num_bits > 0 {
                if is_left_shift {
                    if num_bits >= 8 {
                        out.ins("CLRA", "", "");
                        out.ins("CLRB", "", "");
                    } else {
                        for _ in 0..num_bits {
                            out.ins("LSLB", "", "");
                            out.ins("ROLA", "", "");
                        }
                    }
                } else if num_bits >= 7 && left_signed {
                    out.ins("TFR", "A,B", "");
                } else if num_bits >= 8 && !left_signed {
                    out.ins("CLRA", "", "");
                    out.ins("CLRB", "", "");
                } else {
                    for _ in 0..num_bits {
                        out.ins(if left_signed { "ASRA" } else { "LSRA" }, "", "");
                        out.ins("RORB", "", "");
                    }
                }
            }
        }
        if change_left_side {
            out.ins(if is_byte { "STB" } else { "STD" }, ",X", "store shifted value");
            // address of left side stays in X
        }
        return Ok(());
    }

    // Variable count: a runtime helper does the loop.
    emit_code(ctx, out, left, change_left_side)?;
    if change_left_side {
        out.ins(
            if is_byte { "LDB" } else { "LDD" },
            ",X",
            "get value to be shifted",
        );
        out.ins("PSHS", "X", "preserve address of left side");
    }

    let utility = if is_left_shift {
        if is_byte {
            "shiftByteLeft"
        } else {
            "shiftLeft"
        }
    } else if left_signed {
        if is_byte {
            "shiftByteRightSigned"
        } else {
            "shiftRightSigned"
        }
    } else if is_byte {
        "shiftByteRightUnsigned"
    } else {
        "shiftRightUnsigned"
    };

    out.ins(
        "PSHS",
        if is_byte { "B" } else { "B,A" },
        &format!("left side of shift: used and popped by {}", utility),
    );
    if ctx.desc(right).is_long() {
        emit_code(ctx, out, right, true)?;
        out.ins("LDD", "2,X", "low word of long shift count");
    } else {
        emit_code(ctx, out, right, false)?;
        if ctx.is_byte(right) {
            out.ins("CLRA", "", "");
        }
    }
    ctx.call_utility(out, utility, "");

    if change_left_side {
        out.ins("PULS", "X", "restore address of left side of shift");
        out.ins(if is_byte { "STB" } else { "STD" }, ",X", "store shifted value");
    }
    Ok(())
}

/// Shift of a 32-bit value via `leftShiftDWord`/`rightShiftDWord`.
/// Constant shifts of 8, 16 or 24 bits on an unsigned long mutated in
/// place collapse to byte moves; that peephole lives with the
/// compound assignments, which are the only place it is legal.
fn emit_dword_shift(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    is_left_shift: bool,
    change_left_side: bool,
) -> Result<(), EmitError> {
    // Shifting an unsigned long in place by a whole number of bytes
    // is pure byte moves at the long's memory location.
    if change_left_side && !ctx.desc(left).is_signed {
        if let Some(n) = ctx.eval_const(right) {
            if n == 8 || n == 16 || n == 24 {
                emit_code(ctx, out, left, true)?; // address of long in X
                emit_byte_granular_dword_shift(out, n, is_left_shift);
                return Ok(()); // address of the long stays in X
            }
        }
    }
    // Number of bits to shift by.
    if ctx.desc(right).is_long() {
        emit_code(ctx, out, right, true)?; // address of long count in X
        out.ins("LDB", "3,X", "low byte of long shift count");
    } else {
        emit_code(ctx, out, right, false)?;
    }

    if !is_left_shift {
        if ctx.desc(id).is_signed {
            out.ins("LDA", "#$FF", "request sign extension");
        } else {
            out.ins("CLRA", "", "request zero extension");
        }
        out.ins("PSHS", "B,A", "A=sign/zero ext flag, B=number of bits to shift");
    } else {
        out.ins("PSHS", "B", "number of bits to shift");
    }

    emit_code(ctx, out, left, true)?; // address of left side long in X
    out.ins("PSHS", "X", "address of input dword to be shifted");
    if let Some(temp) = ctx.arena.get(id).temp {
        if !change_left_side {
            let d = ctx.decl(temp);
            let comment = format!(
                "temporary destination, type {}",
                ctx.types.type_to_string(d.decl_type)
            );
            out.ins("LEAX", &ctx.var_arg(temp, 0), &comment);
        }
    }
    ctx.call_utility(
        out,
        if is_left_shift {
            "leftShiftDWord"
        } else {
            "rightShiftDWord"
        },
        "preserves X",
    );
    out.ins("LEAS", if is_left_shift { "3,S" } else { "4,S" }, "");
    Ok(())
}

/// The byte-move patterns for an in-place shift of an unsigned long
/// by 8, 16 or 24 bits. X addresses the long.
fn emit_byte_granular_dword_shift(out: &mut AsmText, num_bits: u16, is_left_shift: bool) {
    match (is_left_shift, num_bits) {
        (true, 8) => {
            out.ins("LDD", "1,X", "middle word of unsigned long");
            out.ins("STD", ",X", "shift left by 8");
            out.ins("LDB", "3,X", "low byte of unsigned long");
            out.ins("STB", "2,X", "");
            out.ins("CLR", "3,X", "clear low byte");
        }
        (true, 16) => {
            out.ins("LDD", "2,X", "low word of unsigned long");
            out.ins("STD", ",X", "shift left by 16");
            out.ins("CLR", "2,X", "");
            out.ins("CLR", "3,X", "clear low word");
        }
        (true, 24) => {
            out.ins("LDB", "3,X", "low byte of unsigned long");
            out.ins("STB", ",X", "shift left by 24");
            out.ins("CLR", "1,X", "");
            out.ins("CLR", "2,X", "");
            out.ins("CLR", "3,X", "");
        }
        (false, 8) => {
            out.ins("LDB", "2,X", "");
            out.ins("STB", "3,X", "shift right by 8");
            out.ins("LDD", ",X", "high word of unsigned long");
            out.ins("STD", "1,X", "");
            out.ins("CLR", ",X", "clear highest byte");
        }
        (false, 16) => {
            out.ins("LDD", ",X", "high word of unsigned long");
            out.ins("STD", "2,X", "shift right by 16");
            out.ins("CLR", ",X", "");
            out.ins("CLR", "1,X", "clear high word");
        }
        (false, 24) => {
            out.ins("LDB", ",X", "load high byte of unsigned long");
            out.ins("STB", "3,X", "store in low byte of unsigned long");
            out.ins("CLR", ",X", "clear highest byte");
            out.ins("CLR", "1,X", "clear 2nd highest byte");
            out.ins("CLR", "2,X", "clear 2nd lowest byte");
        }
        _ => unreachable!("byte-granular shift with unexpected count"),
    }
}

// ----- bitwise -----

fn emit_bitwise(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    op: BinaryOp,
    left: NodeId,
    right: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    let op_name = match op {
        BinaryOp::BitwiseAnd => "and",
        BinaryOp::BitwiseOr => "or",
        BinaryOp::BitwiseXor => "xor",
        _ => unreachable!(),
    };

    // Bitwise on longs always goes through the helpers, which take
    // the dword addresses (or a dword and a word).
    if ctx.desc(id).is_long() {
        return emit_long_bitwise(ctx, out, id, op_name, left, right, false);
    }
    if l_value {
        return Err(ctx.internal(id, "bitwise result has no address"));
    }
    if emit_if_constant(ctx, out, id) {
        return Ok(());
    }

    let (word_ins_a, word_ins_b) = match op {
        BinaryOp::BitwiseAnd => ("ANDA", "ANDB"),
        BinaryOp::BitwiseOr => ("ORA", "ORB"),
        _ => ("EORA", "EORB"),
    };

    // Constant right operand: immediate forms.
    if let Some(value) = ctx.eval_const(right) {
        if ctx.is_byte(id) {
            emit_code(ctx, out, left, false)?;
            out.ins(word_ins_b, &format!("#{}", hex8(value as u8)), "");
        } else {
            emit_word_rvalue(ctx, out, left)?;
            out.ins(word_ins_a, &format!("#{}", hex8((value >> 8) as u8)), "");
            out.ins(word_ins_b, &format!("#{}", hex8(value as u8)), "");
        }
        return Ok(());
    }

    if ctx.is_byte(id) && ctx.is_byte(left) && ctx.is_byte(right) {
        emit_code(ctx, out, right, false)?;
        out.ins("PSHS", "B", "right operand");
        emit_code(ctx, out, left, false)?;
        out.ins(word_ins_b, ",S+", "");
        return Ok(());
    }

    push_first_then_load(ctx, out, right, left)?;
    out.ins(word_ins_a, ",S+", "");
    out.ins(word_ins_b, ",S+", "");
    Ok(())
}

/// `and`/`or`/`xor` on longs: `<op>DWordDWord` or `<op>DWordWord`.
pub fn emit_long_bitwise(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    op_name: &str,
    left: NodeId,
    right: NodeId,
    in_place: bool,
) -> Result<(), EmitError> {
    let right_is_long = ctx.desc(right).is_long();
    emit_numerical_operand(ctx, out, right, true)?;
    let left_reg = emit_numerical_operand(ctx, out, left, true)?;
    if left_reg != 'X' {
        return Err(ctx.internal(id, "long bitwise operation requires a long left side"));
    }
    if !in_place {
        let temp = ctx
            .arena
            .get(id)
            .temp
            .ok_or_else(|| ctx.internal(id, "long bitwise operation without temporary"))?;
        out.ins("LEAX", &ctx.var_arg(temp, 0), "temporary destination");
    }
    let name = format!(
        "{}DWord{}",
        op_name,
        if right_is_long { "DWord" } else { "Word" }
    );
    ctx.call_utility(out, &name, "preserves X");
    out.ins("LEAS", "4,S", "");
    Ok(())
}

// ----- comparisons -----

/// Compares the two operands of `id`, leaving the condition codes set.
/// With `produce_integer_result`, materializes 0 or 1 in B using
/// `cond_branch` (the long-branch picked for the operator).
pub fn emit_comparison(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    produce_integer_result: bool,
    cond_branch: &str,
) -> Result<(), EmitError> {
    let (_, left, right) = parts(ctx, id);

    if ctx.is_real_or_long(left) || ctx.is_real_or_long(right) {
        emit_real_or_long_comparison(ctx, out, id, left, right)?;
    } else if emit_comparison_with_constant(ctx, out, left, right)? {
        // peephole emitted
    } else {
        // General case: push the right operand, promote and load the
        // left one.
        push_first_then_load(ctx, out, right, left)?;
        if tree::fits_8_bits(ctx.arena, ctx.types, left)
            && tree::fits_8_bits(ctx.arena, ctx.types, right)
            && !tree::is_signed(ctx.arena, ctx.types, left)
            && !tree::is_signed(ctx.arena, ctx.types, right)
        {
            // Only for unsigned operands: a signed byte would need a
            // sign extension the discarded MSB cannot provide.
            out.ins("LEAS", "1,S", "disregard MSB");
            out.ins("CMPB", ",S+", "compare with LSB");
        } else {
            out.ins("CMPD", ",S++", "");
        }
    }

    if produce_integer_result {
        let true_label = ctx.new_label();
        let false_label = ctx.new_label();
        out.ins(cond_branch, &true_label, "if true");
        out.ins("CLRB", "", "");
        out.ins("BRA", &false_label, "false");
        out.emit_label(&true_label, "");
        out.ins("LDB", "#1", "");
        out.emit_label(&false_label, "");
    }
    Ok(())
}

/// Variable-against-constant and pointer-against-zero comparisons
/// avoid the push.
fn emit_comparison_with_constant(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    left: NodeId,
    right: NodeId,
) -> Result<bool, EmitError> {
    let value = match ctx.eval_const(right) {
        Some(v) => v,
        None => return Ok(false),
    };
    // An unsigned byte expression against a byte constant is an 8-bit
    // compare.
    if ctx.is_byte(left)
        && !tree::is_signed(ctx.arena, ctx.types, left)
        && value <= 0xFF
    {
        emit_code(ctx, out, left, false)?;
        out.ins("CMPB", &format!("#{}", hex8(value as u8)), "");
        return Ok(true);
    }
    if ctx.is_byte(left) {
        return Ok(false);
    }
    // Word, pointer or array: a plain CMPD immediate. This covers the
    // pointer-against-null case without any helper.
    emit_code(ctx, out, left, false)?;
    if ctx.desc(left).base == BasicType::Array {
        // address already in D
    }
    out.emit_cmpd_immediate(value, "");
    Ok(true)
}

/// Comparison involving a real or long operand: pushes both operand
/// descriptions and calls `cmp<LeftVariant><RightVariant>`, which sets
/// N, Z, V and C like a CMP would.
fn emit_real_or_long_comparison(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
) -> Result<(), EmitError> {
    if !ctx.desc(left).is_numerical() || !ctx.desc(right).is_numerical() {
        return Err(ctx.internal(id, "comparison between non-numerical types"));
    }

    out.emit_comment("push right operand of comparison");
    emit_numerical_operand(ctx, out, right, true)?;
    out.emit_comment("push left operand of comparison");
    emit_numerical_operand(ctx, out, left, true)?;

    let name = if ctx.desc(left).is_long() && ctx.desc(right).is_long() {
        "cmpDWordDWord".to_string()
    } else {
        let include_signedness = is_real_and_long_operation(ctx, left, right);
        format!(
            "cmp{}{}",
            variant_name(ctx, left, include_signedness),
            variant_name(ctx, right, include_signedness)
        )
    };
    ctx.call_utility(out, &name, "sets N, Z, V, C; preserves X");
    out.ins("LEAS", "4,S", "");
    Ok(())
}

// ----- logical operators -----

fn emit_truth_test(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    comment: &str,
) -> Result<(), EmitError> {
    if ctx.is_real_or_long(id) {
        emit_code(ctx, out, id, true)?; // address of number in X
        ctx.call_utility(
            out,
            if ctx.desc(id).is_long() {
                "isDWordZero"
            } else if ctx.desc(id).is_single() {
                "isSingleZero"
            } else {
                "isDoubleZero"
            },
            "",
        );
        return Ok(());
    }
    emit_code(ctx, out, id, false)?;
    if ctx.is_byte(id) {
        out.ins("TSTB", "", comment);
    } else {
        if ctx.desc(id).base == BasicType::Array {
            // address is the value, already in D
        }
        out.emit_cmpd_immediate(0, comment);
    }
    Ok(())
}

fn emit_logical_and(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    if l_value {
        return Err(ctx.internal(id, "logical operator has no address"));
    }
    let end_label = ctx.new_label();
    emit_truth_test(ctx, out, left, "&&")?;
    out.ins("LBEQ", &end_label, "&& yields false, B == 0");
    emit_truth_test(ctx, out, right, "&&")?;
    out.ins("LBEQ", &end_label, "&& yields false, B == 0");
    out.ins("LDB", "#1", "&& yields true");
    out.emit_label(&end_label, "");
    Ok(())
}

fn emit_logical_or(
    ctx: &mut EmitCtx<'_>,
    out: &mut AsmText,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    l_value: bool,
) -> Result<(), EmitError> {
    if l_value {
        return Err(ctx.internal(id, "logical operator has no address"));
    }
    let true_label = ctx.new_label();
    let end_label = ctx.new_label();
    emit_truth_test(ctx, out, left, "||")?;
    out.ins("LBNE", &true_label, "|| yields true");
    emit_truth_test(ctx, out, right, "||")?;
    out.ins("LBNE", &true_label, "|| yields true");
    out.ins("CLRB", "", "|| yields false");
    out.ins("LBRA", &end_label, "");
    out.emit_label(&true_label, "");
    out.ins("LDB", "#1", "|| yields true");
    out.emit_label(&end_label, "");
    Ok(())
}
