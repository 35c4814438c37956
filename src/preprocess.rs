//! This module contains the steps that prepare raw input for analysis: hex
//! decoding, removal of the swarm metadata trailer that solc appends to
//! contract bytecode, and location of the runtime code inside a constructor.

use ethnum::U256;
use hex::FromHexError;
use log::{debug, trace};

use crate::{
    analysis::ReachingDefinition,
    constant::{SWARM_METADATA_HEADER, SWARM_METADATA_LENGTH, SWARM_METADATA_TRAILER},
    error::{
        container::Locatable,
        disassembly,
        preprocess::{Error, Result},
    },
    opcode::Opcode,
    program::Program,
};

/// Decodes the hexadecimal `input` into bytes.
///
/// Surrounding and embedded whitespace is ignored, as is a leading `0x` or
/// `0X` prefix.
///
/// # Errors
///
/// Returns [`Err`] if the input contains a character that is not a hex digit,
/// or if it has an odd number of digits. Errors are located at the byte that
/// the offending digit would have contributed to.
pub fn decode_hex(input: &str) -> disassembly::Result<Vec<u8>> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = digits.chars().filter(|c| !c.is_whitespace()).collect();

    hex::decode(&digits).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { c, index } => {
            disassembly::Error::InvalidHexCharacter(c, index).locate(index / 2)
        }
        _ => disassembly::Error::InvalidHexLength.locate(digits.len() / 2),
    })
}

/// Checks if `bytes` ends with a swarm metadata trailer.
#[must_use]
pub fn has_metadata(bytes: &[u8]) -> bool {
    if bytes.len() < SWARM_METADATA_LENGTH {
        return false;
    }
    let start = bytes.len() - SWARM_METADATA_LENGTH;
    let header = &bytes[start..start + SWARM_METADATA_HEADER.len()];
    let trailer = &bytes[bytes.len() - SWARM_METADATA_TRAILER.len()..];

    header == SWARM_METADATA_HEADER && trailer == SWARM_METADATA_TRAILER
}

/// Removes the swarm metadata trailer from the end of `bytes` if there is
/// one, returning the bytes unchanged otherwise.
#[must_use]
pub fn strip_metadata(bytes: &[u8]) -> &[u8] {
    if has_metadata(bytes) {
        debug!("Removing {SWARM_METADATA_LENGTH} bytes of swarm metadata");
        &bytes[..bytes.len() - SWARM_METADATA_LENGTH]
    } else {
        bytes
    }
}

/// Finds the offset at which the runtime code starts in the constructor
/// `program`.
///
/// Constructors copy the runtime code into memory with `CODECOPY` before
/// returning it. The source offset of the last such copy whose value is known
/// statically is taken to be the entry point. The program must have had its
/// reaching definitions computed.
///
/// # Errors
///
/// Returns [`Err`] if no such copy exists, if it copies from offset zero, or if
/// the offset does not lie inside the program.
pub fn find_code_entry_point(program: &Program) -> Result<usize> {
    let mut found: Option<(usize, U256)> = None;
    for instruction in program.instructions() {
        if instruction.opcode() != Opcode::CodeCopy {
            continue;
        }
        let source = instruction
            .annotations()
            .get::<ReachingDefinition>()
            .and_then(|definition| definition.slot(1))
            .and_then(|slot| slot.constant().exact());
        match source {
            Some(offset) => found = Some((instruction.offset(), offset)),
            None => trace!("CODECOPY at {:#x} has no static source", instruction.offset()),
        }
    }

    let (location, offset) = found.ok_or(Error::NoCodeEntryPoint).locate(0)?;
    if offset == U256::ZERO {
        return Err(Error::NoCodeEntryPoint.locate(location));
    }

    let length = program.size();
    match usize::try_from(offset) {
        Ok(entry) if entry < length => Ok(entry),
        _ => Err(Error::CodeEntryPointOutOfRange { offset, length }.locate(location)),
    }
}
