//! This module contains constant folding for the pure arithmetic and logic
//! opcodes, following the EVM's wrapping 256-bit semantics.
//!
//! Operands are always provided from the top of the stack down, so for `SUB`
//! the first operand is the minuend and for `SHL` the first operand is the
//! shift amount.

use ethnum::{I256, U256};

use crate::{
    constant::{WORD_SIZE_BITS, WORD_SIZE_BYTES},
    opcode::Opcode,
};

/// Folds `opcode` over the known `operands`, returning the word that it would
/// push.
///
/// Returns [`None`] if the opcode cannot be folded, either because it is not
/// a pure computation on its operands or because too few operands are
/// provided.
#[must_use]
pub fn fold(opcode: Opcode, operands: &[U256]) -> Option<U256> {
    if operands.len() < opcode.arg_count() {
        return None;
    }
    let arg = |index: usize| operands[index];

    let result = match opcode {
        Opcode::Add => arg(0).wrapping_add(arg(1)),
        Opcode::Mul => arg(0).wrapping_mul(arg(1)),
        Opcode::Sub => arg(0).wrapping_sub(arg(1)),
        Opcode::Div => arg(0).checked_div(arg(1)).unwrap_or(U256::ZERO),
        Opcode::SDiv => signed_div(arg(0), arg(1)),
        Opcode::Mod => arg(0).checked_rem(arg(1)).unwrap_or(U256::ZERO),
        Opcode::SMod => signed_rem(arg(0), arg(1)),
        Opcode::Exp => exp(arg(0), arg(1)),
        Opcode::SignExtend => sign_extend(arg(0), arg(1)),
        Opcode::Lt => from_bool(arg(0) < arg(1)),
        Opcode::Gt => from_bool(arg(0) > arg(1)),
        Opcode::SLt => from_bool(as_signed(arg(0)) < as_signed(arg(1))),
        Opcode::SGt => from_bool(as_signed(arg(0)) > as_signed(arg(1))),
        Opcode::Eq => from_bool(arg(0) == arg(1)),
        Opcode::IsZero => from_bool(arg(0) == U256::ZERO),
        Opcode::And => arg(0) & arg(1),
        Opcode::Or => arg(0) | arg(1),
        Opcode::Xor => arg(0) ^ arg(1),
        Opcode::Not => !arg(0),
        Opcode::Byte => byte(arg(0), arg(1)),
        Opcode::Shl => shift_amount(arg(0)).map_or(U256::ZERO, |shift| arg(1) << shift),
        Opcode::Shr => shift_amount(arg(0)).map_or(U256::ZERO, |shift| arg(1) >> shift),
        Opcode::Sar => sar(arg(0), arg(1)),
        _ => return None,
    };

    Some(result)
}

/// Checks if the opcode is one that [`fold`] can compute.
#[must_use]
pub fn is_foldable(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Add
            | Opcode::Mul
            | Opcode::Sub
            | Opcode::Div
            | Opcode::SDiv
            | Opcode::Mod
            | Opcode::SMod
            | Opcode::Exp
            | Opcode::SignExtend
            | Opcode::Lt
            | Opcode::Gt
            | Opcode::SLt
            | Opcode::SGt
            | Opcode::Eq
            | Opcode::IsZero
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Not
            | Opcode::Byte
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Sar
    )
}

fn from_bool(value: bool) -> U256 {
    if value {
        U256::ONE
    } else {
        U256::ZERO
    }
}

// Reinterprets the bit pattern as two's complement.
fn as_signed(value: U256) -> I256 {
    I256::from_ne_bytes(value.to_ne_bytes())
}

fn as_unsigned(value: I256) -> U256 {
    U256::from_ne_bytes(value.to_ne_bytes())
}

/// Gets the shift as a `u32` if it is less than the word size.
fn shift_amount(shift: U256) -> Option<u32> {
    (shift < U256::from(WORD_SIZE_BITS as u64)).then(|| shift.as_u32())
}

fn signed_div(left: U256, right: U256) -> U256 {
    let (left, right) = (as_signed(left), as_signed(right));
    if right == I256::ZERO {
        return U256::ZERO;
    }
    as_unsigned(left.wrapping_div(right))
}

fn signed_rem(left: U256, right: U256) -> U256 {
    let (left, right) = (as_signed(left), as_signed(right));
    if right == I256::ZERO {
        return U256::ZERO;
    }
    as_unsigned(left.wrapping_rem(right))
}

fn exp(base: U256, exponent: U256) -> U256 {
    let mut result = U256::ONE;
    let mut base = base;
    let mut exponent = exponent;
    while exponent > U256::ZERO {
        if exponent & U256::ONE == U256::ONE {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent >>= 1u32;
    }

    result
}

fn sign_extend(byte_index: U256, value: U256) -> U256 {
    if byte_index >= U256::from(WORD_SIZE_BYTES as u64 - 1) {
        return value;
    }
    let bit = byte_index.as_u32() * 8 + 7;
    let mask = (U256::ONE << bit) - U256::ONE;
    if (value >> bit) & U256::ONE == U256::ONE {
        value | !mask
    } else {
        value & mask
    }
}

fn byte(index: U256, value: U256) -> U256 {
    if index >= U256::from(WORD_SIZE_BYTES as u64) {
        return U256::ZERO;
    }
    let position = index.as_usize();
    U256::from(value.to_be_bytes()[position])
}

fn sar(shift: U256, value: U256) -> U256 {
    let value = as_signed(value);
    match shift_amount(shift) {
        Some(shift) => as_unsigned(value >> shift),
        None if value < I256::ZERO => U256::MAX,
        None => U256::ZERO,
    }
}
