//! Macros for assembling bytecode out of opcodes.

/// Assembles bytecode from a comma-separated list of things that implement
/// [`crate::opcode::Encode`].
///
/// Opcodes encode as their byte, a [`crate::opcode::PushN`] encodes along with
/// its immediate data, and a bare `u8` is copied through unchanged. The last
/// of these makes it possible to write inputs that are not well-formed.
///
/// # Usage
///
/// ```
/// use bytecode_structure_analyzer::{
///     bytecode,
///     opcode::{Opcode, PushN},
/// };
///
/// let bytes = bytecode![
///     PushN::new(1, vec![0x03]).unwrap(),
///     Opcode::Jump,
///     Opcode::JumpDest,
///     Opcode::Push(2),
///     0x01u8,
/// ];
///
/// assert_eq!(bytes, vec![0x60, 0x03, 0x56, 0x5b, 0x61, 0x01]);
/// ```
#[macro_export]
macro_rules! bytecode {
    ($($item:expr),* $(,)?) => {{
        let mut bytes: Vec<u8> = Vec::new();
        $(bytes.extend($crate::opcode::Encode::encode(&$item));)*
        bytes
    }};
}

pub use bytecode;
