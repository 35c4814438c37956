//! This module contains constants that are needed throughout the codebase.

/// The base byte value for the `PUSH` opcode, for `N > 0`.
///
/// This is constructed such that for `PUSHN`, `PUSH_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `PUSH` opcode.
pub const PUSH_OPCODE_BASE_VALUE: u8 = 0x5f;

/// The base byte value for the `DUP` opcode.
///
/// This is constructed such that for `DUPN`, `DUP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `DUP` opcode.
pub const DUP_OPCODE_BASE_VALUE: u8 = 0x7f;

/// The base byte value for the `SWAP` opcode.
///
/// This is constructed such that for `SWAPN`, `SWAP_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `SWAP` opcode.
pub const SWAP_OPCODE_BASE_VALUE: u8 = 0x8f;

/// The base byte value for the `LOG` opcode.
///
/// This is constructed such that for `LOGN`, `LOG_OPCODE_BASE_VALUE` + `N`
/// equals the byte value for the corresponding `LOG` opcode.
pub const LOG_OPCODE_BASE_VALUE: u8 = 0xa0;

/// The maximum number of bytes that can be pushed at once using the `PUSH`
/// opcode.
pub const PUSH_OPCODE_MAX_BYTES: u8 = 32;

/// The maximum stack depth for the EVM.
pub const MAXIMUM_STACK_DEPTH: usize = 1024;

/// The width of word on the EVM in bits.
pub const WORD_SIZE_BITS: usize = 256;

/// The width of a byte on the EVM (and most other places) in bits.
pub const BYTE_SIZE_BITS: usize = 8;

/// The width of a word on the EVM in bytes.
pub const WORD_SIZE_BYTES: usize = WORD_SIZE_BITS / BYTE_SIZE_BITS;

/// The default number of times, per block in the program, that the reaching
/// definitions fixpoint may visit a block before giving up.
///
/// The total visit budget is this value multiplied by the number of blocks.
pub const DEFAULT_MAX_BLOCK_VISITS_FACTOR: usize = 64;

/// The default number of worklist iterations the analysis will wait before
/// polling the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;

/// The default for whether the metadata trailer appended by solc is removed
/// before analysis.
pub const DEFAULT_STRIP_METADATA_ENABLED: bool = true;

/// The length in bytes of the swarm metadata trailer appended by solc,
/// including the header and the two-byte length suffix.
///
/// See the [solidity documentation](https://docs.soliditylang.org/en/latest/metadata.html#encoding-of-the-metadata-hash-in-the-bytecode)
/// for the encoding.
pub const SWARM_METADATA_LENGTH: usize = 43;

/// The two bytes that begin the swarm metadata trailer.
pub const SWARM_METADATA_HEADER: [u8; 2] = [0xa1, 0x65];

/// The two bytes that end the swarm metadata trailer, encoding its length.
pub const SWARM_METADATA_TRAILER: [u8; 2] = [0x00, 0x29];
