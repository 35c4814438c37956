//! The `PUSHN` opcode together with its immediate data, as it appears in the
//! bytecode.

use ethnum::U256;

use crate::{
    error::disassembly,
    opcode::{is_valid_push_size, Encode, Opcode},
};

/// The `PUSHN` opcode places the `N` bytes that follow it in the bytecode onto
/// the stack as a single word, where `0 < N <= 32`.
///
/// # Semantics
///
/// | Stack Index | Input | Output  |
/// | :---------: | :---: | :-----: |
/// | 1           |       | `value` |
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PushN {
    byte_count: u8,
    bytes:      Vec<u8>,
}

impl PushN {
    /// Construct a new instance of the `PUSHN` opcode for some `n`.
    ///
    /// The `bytes` are in big-endian byte ordering, exactly as they appear in
    /// the bytecode.
    ///
    /// # Errors
    ///
    /// If `n` is not in the specified range, or `bytes` does not have length
    /// `n`.
    pub fn new(n: u8, bytes: impl Into<Vec<u8>>) -> Result<Self, disassembly::Error> {
        let bytes: Vec<u8> = bytes.into();
        if is_valid_push_size(n) && bytes.len() == n as usize {
            Ok(Self {
                byte_count: n,
                bytes,
            })
        } else {
            Err(disassembly::Error::InvalidPushSize(n))
        }
    }

    /// Get the number of bytes this `PUSHN` opcode pushes onto the stack.
    #[must_use]
    pub fn byte_size(&self) -> u8 {
        self.byte_count
    }

    /// Get the data to be pushed onto the stack by this opcode. It is
    /// guaranteed that `bytes_data.len() == byte_size()`.
    #[must_use]
    pub fn bytes_data(&self) -> &[u8] {
        &self.bytes
    }

    /// Gets the opcode corresponding to this push.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        Opcode::Push(self.byte_count)
    }

    /// Gets the pushed bytes as a word.
    #[must_use]
    pub fn value(&self) -> U256 {
        word_from_be_slice(&self.bytes)
    }
}

impl Encode for PushN {
    fn encode(&self) -> Vec<u8> {
        let mut data = vec![self.opcode().as_byte()];
        data.extend(self.bytes.iter().copied());
        data
    }
}

/// Interprets up to 32 big-endian `bytes` as a word, as the EVM does for the
/// immediate of a `PUSH`.
///
/// Any bytes beyond the 32nd are ignored.
#[must_use]
pub fn word_from_be_slice(bytes: &[u8]) -> U256 {
    let mut word = [0u8; 32];
    let bytes = &bytes[..bytes.len().min(32)];
    word[32 - bytes.len()..].copy_from_slice(bytes);
    U256::from_be_bytes(word)
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        error::disassembly,
        opcode::{push::word_from_be_slice, Encode, PushN},
    };

    #[test]
    fn encodes_opcode_and_data() -> anyhow::Result<()> {
        let push = PushN::new(2, vec![0x01, 0x02])?;
        assert_eq!(push.encode(), vec![0x61, 0x01, 0x02]);
        assert_eq!(push.value(), U256::new(0x0102));

        Ok(())
    }

    #[test]
    fn rejects_mismatched_sizes() {
        assert_eq!(
            PushN::new(3, vec![0x01]).unwrap_err(),
            disassembly::Error::InvalidPushSize(3)
        );
        assert_eq!(
            PushN::new(33, vec![0u8; 33]).unwrap_err(),
            disassembly::Error::InvalidPushSize(33)
        );
    }

    #[test]
    fn words_are_big_endian() {
        assert_eq!(word_from_be_slice(&[]), U256::ZERO);
        assert_eq!(word_from_be_slice(&[0xff]), U256::new(0xff));
        assert_eq!(word_from_be_slice(&[0x12, 0x34]), U256::new(0x1234));
        assert_eq!(word_from_be_slice(&[0xff; 32]), U256::MAX);
    }
}
