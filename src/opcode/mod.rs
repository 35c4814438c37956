//! This module contains the [`Opcode`] type, a static description of each of
//! the EVM's [opcodes](https://ethereum.org/en/developers/docs/evm/opcodes/).
//!
//! Every opcode carries a fixed set of attributes that the analysis passes
//! depend upon:
//!
//! - The width of its immediate operand in the bytecode (only non-zero for the
//!   `PUSH1..=PUSH32` family).
//! - The number of values that it pops from the stack ([`Opcode::arg_count`]).
//! - The number of values that it pushes to the stack
//!   ([`Opcode::push_count`]).
//! - Its [`Flow`] class, which determines where basic blocks start and end.
//!
//! # Terminology
//!
//! When referring to stack slots, we treat index 0 as being the top of the
//! stack.

pub mod macros;
mod push;

use std::fmt::{Display, Formatter};

pub use push::{word_from_be_slice, PushN};

use crate::constant::{
    DUP_OPCODE_BASE_VALUE,
    LOG_OPCODE_BASE_VALUE,
    PUSH_OPCODE_BASE_VALUE,
    PUSH_OPCODE_MAX_BYTES,
    SWAP_OPCODE_BASE_VALUE,
};

/// The way in which an opcode affects the flow of control through the
/// program.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Flow {
    /// Execution continues with the next instruction.
    Fallthrough,

    /// Execution always continues at a location popped from the stack.
    Jump,

    /// Execution continues at a location popped from the stack or with the
    /// next instruction, depending on a condition.
    ConditionalJump,

    /// Execution of the current call context ends.
    Terminal,

    /// The instruction marks a valid jump destination, and hence always begins
    /// a new basic block.
    BlockEntry,
}

impl Flow {
    /// Checks if an instruction with this flow class ends its basic block.
    #[must_use]
    pub fn ends_block(self) -> bool {
        matches!(self, Self::Jump | Self::ConditionalJump | Self::Terminal)
    }

    /// Checks if control may pass from an instruction with this flow class to
    /// the instruction that follows it in the bytecode.
    #[must_use]
    pub fn falls_through(self) -> bool {
        matches!(
            self,
            Self::Fallthrough | Self::ConditionalJump | Self::BlockEntry
        )
    }
}

/// A single EVM opcode.
///
/// The families of opcodes that are parameterised by a count (`PUSH`, `DUP`,
/// `SWAP` and `LOG`) carry that count. Bytes that do not correspond to any
/// known opcode decode to [`Opcode::Invalid`], retaining the original byte so
/// that the bytecode can be reproduced.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Opcode {
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,
    Sha3,
    Address,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,
    BlockHash,
    CoinBase,
    Timestamp,
    Number,
    Prevrandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,
    BlobHash,
    BlobBaseFee,
    Pop,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    JumpI,
    PC,
    MSize,
    Gas,
    JumpDest,
    TLoad,
    TStore,
    MCopy,
    Push0,

    /// `PUSHN` for `1 <= N <= 32`.
    Push(u8),

    /// `DUPN` for `1 <= N <= 16`.
    Dup(u8),

    /// `SWAPN` for `1 <= N <= 16`.
    Swap(u8),

    /// `LOGN` for `0 <= N <= 4`.
    Log(u8),

    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,

    /// The designated invalid instruction (`0xfe`) or any unassigned byte.
    Invalid(u8),

    SelfDestruct,
}

impl Opcode {
    /// Decodes the opcode for the provided `byte`.
    ///
    /// This never fails; any byte that is not a known opcode is decoded to
    /// [`Opcode::Invalid`]. This allows the disassembly to cope with data and
    /// CBOR metadata embedded in the bytecode, as these will only be reachable
    /// if execution intends to revert.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Stop,
            0x01 => Self::Add,
            0x02 => Self::Mul,
            0x03 => Self::Sub,
            0x04 => Self::Div,
            0x05 => Self::SDiv,
            0x06 => Self::Mod,
            0x07 => Self::SMod,
            0x08 => Self::AddMod,
            0x09 => Self::MulMod,
            0x0a => Self::Exp,
            0x0b => Self::SignExtend,
            0x10 => Self::Lt,
            0x11 => Self::Gt,
            0x12 => Self::SLt,
            0x13 => Self::SGt,
            0x14 => Self::Eq,
            0x15 => Self::IsZero,
            0x16 => Self::And,
            0x17 => Self::Or,
            0x18 => Self::Xor,
            0x19 => Self::Not,
            0x1a => Self::Byte,
            0x1b => Self::Shl,
            0x1c => Self::Shr,
            0x1d => Self::Sar,
            0x20 => Self::Sha3,
            0x30 => Self::Address,
            0x31 => Self::Balance,
            0x32 => Self::Origin,
            0x33 => Self::Caller,
            0x34 => Self::CallValue,
            0x35 => Self::CallDataLoad,
            0x36 => Self::CallDataSize,
            0x37 => Self::CallDataCopy,
            0x38 => Self::CodeSize,
            0x39 => Self::CodeCopy,
            0x3a => Self::GasPrice,
            0x3b => Self::ExtCodeSize,
            0x3c => Self::ExtCodeCopy,
            0x3d => Self::ReturnDataSize,
            0x3e => Self::ReturnDataCopy,
            0x3f => Self::ExtCodeHash,
            0x40 => Self::BlockHash,
            0x41 => Self::CoinBase,
            0x42 => Self::Timestamp,
            0x43 => Self::Number,
            0x44 => Self::Prevrandao,
            0x45 => Self::GasLimit,
            0x46 => Self::ChainId,
            0x47 => Self::SelfBalance,
            0x48 => Self::BaseFee,
            0x49 => Self::BlobHash,
            0x4a => Self::BlobBaseFee,
            0x50 => Self::Pop,
            0x51 => Self::MLoad,
            0x52 => Self::MStore,
            0x53 => Self::MStore8,
            0x54 => Self::SLoad,
            0x55 => Self::SStore,
            0x56 => Self::Jump,
            0x57 => Self::JumpI,
            0x58 => Self::PC,
            0x59 => Self::MSize,
            0x5a => Self::Gas,
            0x5b => Self::JumpDest,
            0x5c => Self::TLoad,
            0x5d => Self::TStore,
            0x5e => Self::MCopy,
            0x5f => Self::Push0,
            0x60..=0x7f => Self::Push(byte - PUSH_OPCODE_BASE_VALUE),
            0x80..=0x8f => Self::Dup(byte - DUP_OPCODE_BASE_VALUE),
            0x90..=0x9f => Self::Swap(byte - SWAP_OPCODE_BASE_VALUE),
            0xa0..=0xa4 => Self::Log(byte - LOG_OPCODE_BASE_VALUE),
            0xf0 => Self::Create,
            0xf1 => Self::Call,
            0xf2 => Self::CallCode,
            0xf3 => Self::Return,
            0xf4 => Self::DelegateCall,
            0xf5 => Self::Create2,
            0xfa => Self::StaticCall,
            0xfd => Self::Revert,
            0xff => Self::SelfDestruct,
            _ => Self::Invalid(byte),
        }
    }

    /// Gets the byte representation of the opcode.
    #[must_use]
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Stop => 0x00,
            Self::Add => 0x01,
            Self::Mul => 0x02,
            Self::Sub => 0x03,
            Self::Div => 0x04,
            Self::SDiv => 0x05,
            Self::Mod => 0x06,
            Self::SMod => 0x07,
            Self::AddMod => 0x08,
            Self::MulMod => 0x09,
            Self::Exp => 0x0a,
            Self::SignExtend => 0x0b,
            Self::Lt => 0x10,
            Self::Gt => 0x11,
            Self::SLt => 0x12,
            Self::SGt => 0x13,
            Self::Eq => 0x14,
            Self::IsZero => 0x15,
            Self::And => 0x16,
            Self::Or => 0x17,
            Self::Xor => 0x18,
            Self::Not => 0x19,
            Self::Byte => 0x1a,
            Self::Shl => 0x1b,
            Self::Shr => 0x1c,
            Self::Sar => 0x1d,
            Self::Sha3 => 0x20,
            Self::Address => 0x30,
            Self::Balance => 0x31,
            Self::Origin => 0x32,
            Self::Caller => 0x33,
            Self::CallValue => 0x34,
            Self::CallDataLoad => 0x35,
            Self::CallDataSize => 0x36,
            Self::CallDataCopy => 0x37,
            Self::CodeSize => 0x38,
            Self::CodeCopy => 0x39,
            Self::GasPrice => 0x3a,
            Self::ExtCodeSize => 0x3b,
            Self::ExtCodeCopy => 0x3c,
            Self::ReturnDataSize => 0x3d,
            Self::ReturnDataCopy => 0x3e,
            Self::ExtCodeHash => 0x3f,
            Self::BlockHash => 0x40,
            Self::CoinBase => 0x41,
            Self::Timestamp => 0x42,
            Self::Number => 0x43,
            Self::Prevrandao => 0x44,
            Self::GasLimit => 0x45,
            Self::ChainId => 0x46,
            Self::SelfBalance => 0x47,
            Self::BaseFee => 0x48,
            Self::BlobHash => 0x49,
            Self::BlobBaseFee => 0x4a,
            Self::Pop => 0x50,
            Self::MLoad => 0x51,
            Self::MStore => 0x52,
            Self::MStore8 => 0x53,
            Self::SLoad => 0x54,
            Self::SStore => 0x55,
            Self::Jump => 0x56,
            Self::JumpI => 0x57,
            Self::PC => 0x58,
            Self::MSize => 0x59,
            Self::Gas => 0x5a,
            Self::JumpDest => 0x5b,
            Self::TLoad => 0x5c,
            Self::TStore => 0x5d,
            Self::MCopy => 0x5e,
            Self::Push0 => 0x5f,
            Self::Push(n) => PUSH_OPCODE_BASE_VALUE + n,
            Self::Dup(n) => DUP_OPCODE_BASE_VALUE + n,
            Self::Swap(n) => SWAP_OPCODE_BASE_VALUE + n,
            Self::Log(n) => LOG_OPCODE_BASE_VALUE + n,
            Self::Create => 0xf0,
            Self::Call => 0xf1,
            Self::CallCode => 0xf2,
            Self::Return => 0xf3,
            Self::DelegateCall => 0xf4,
            Self::Create2 => 0xf5,
            Self::StaticCall => 0xfa,
            Self::Revert => 0xfd,
            Self::Invalid(byte) => *byte,
            Self::SelfDestruct => 0xff,
        }
    }

    /// Gets the number of bytes of immediate data that follow the opcode in
    /// the bytecode.
    #[must_use]
    pub fn operand_size(&self) -> usize {
        match self {
            Self::Push(n) => usize::from(*n),
            _ => 0,
        }
    }

    /// Gets the number of arguments that the opcode accepts from the stack.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        match self {
            Self::Stop
            | Self::Address
            | Self::Origin
            | Self::Caller
            | Self::CallValue
            | Self::CallDataSize
            | Self::CodeSize
            | Self::GasPrice
            | Self::ReturnDataSize
            | Self::CoinBase
            | Self::Timestamp
            | Self::Number
            | Self::Prevrandao
            | Self::GasLimit
            | Self::ChainId
            | Self::SelfBalance
            | Self::BaseFee
            | Self::BlobBaseFee
            | Self::PC
            | Self::MSize
            | Self::Gas
            | Self::JumpDest
            | Self::Push0
            | Self::Push(_)
            | Self::Invalid(_) => 0,
            Self::IsZero
            | Self::Not
            | Self::Balance
            | Self::CallDataLoad
            | Self::ExtCodeSize
            | Self::ExtCodeHash
            | Self::BlockHash
            | Self::BlobHash
            | Self::Pop
            | Self::MLoad
            | Self::SLoad
            | Self::Jump
            | Self::TLoad
            | Self::SelfDestruct => 1,
            Self::Add
            | Self::Mul
            | Self::Sub
            | Self::Div
            | Self::SDiv
            | Self::Mod
            | Self::SMod
            | Self::Exp
            | Self::SignExtend
            | Self::Lt
            | Self::Gt
            | Self::SLt
            | Self::SGt
            | Self::Eq
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Byte
            | Self::Shl
            | Self::Shr
            | Self::Sar
            | Self::Sha3
            | Self::MStore
            | Self::MStore8
            | Self::SStore
            | Self::JumpI
            | Self::TStore
            | Self::Return
            | Self::Revert => 2,
            Self::AddMod
            | Self::MulMod
            | Self::CallDataCopy
            | Self::CodeCopy
            | Self::ReturnDataCopy
            | Self::MCopy
            | Self::Create => 3,
            Self::ExtCodeCopy | Self::Create2 => 4,
            Self::DelegateCall | Self::StaticCall => 6,
            Self::Call | Self::CallCode => 7,
            Self::Dup(n) => usize::from(*n),
            Self::Swap(n) => usize::from(*n) + 1,
            Self::Log(n) => usize::from(*n) + 2,
        }
    }

    /// Gets the number of values that the opcode pushes onto the stack.
    ///
    /// For `DUPN` and `SWAPN` this counts the values they rearrange as well as
    /// any new value, matching their declared stack effect.
    #[must_use]
    pub fn push_count(&self) -> usize {
        match self {
            Self::Dup(n) => usize::from(*n) + 1,
            Self::Swap(n) => usize::from(*n) + 1,
            Self::Stop
            | Self::CallDataCopy
            | Self::CodeCopy
            | Self::ExtCodeCopy
            | Self::ReturnDataCopy
            | Self::Pop
            | Self::MStore
            | Self::MStore8
            | Self::SStore
            | Self::Jump
            | Self::JumpI
            | Self::JumpDest
            | Self::TStore
            | Self::MCopy
            | Self::Log(_)
            | Self::Return
            | Self::Revert
            | Self::Invalid(_)
            | Self::SelfDestruct => 0,
            _ => 1,
        }
    }

    /// Gets the flow-control class of the opcode.
    #[must_use]
    pub fn flow(&self) -> Flow {
        match self {
            Self::Jump => Flow::Jump,
            Self::JumpI => Flow::ConditionalJump,
            Self::Stop | Self::Return | Self::Revert | Self::Invalid(_) | Self::SelfDestruct => {
                Flow::Terminal
            }
            Self::JumpDest => Flow::BlockEntry,
            _ => Flow::Fallthrough,
        }
    }

    /// Checks if the opcode pushes immediate data from the bytecode, including
    /// `PUSH0`.
    #[must_use]
    pub fn is_push(&self) -> bool {
        matches!(self, Self::Push(_) | Self::Push0)
    }

    /// Checks if the opcode is one of the `DUPN` family.
    #[must_use]
    pub fn is_dup(&self) -> bool {
        matches!(self, Self::Dup(_))
    }

    /// Checks if the opcode is one of the `SWAPN` family.
    #[must_use]
    pub fn is_swap(&self) -> bool {
        matches!(self, Self::Swap(_))
    }

    /// Checks if the opcode only rearranges existing stack values rather than
    /// consuming them.
    #[must_use]
    pub fn is_stack_manipulation(&self) -> bool {
        self.is_dup() || self.is_swap()
    }

    /// Checks if the opcode is a jump of either kind.
    #[must_use]
    pub fn is_jump(&self) -> bool {
        matches!(self.flow(), Flow::Jump | Flow::ConditionalJump)
    }

    /// Gets a textual representation of the opcode.
    #[must_use]
    pub fn as_text_code(&self) -> String {
        let text = match self {
            Self::Push(n) => return format!("PUSH{n}"),
            Self::Dup(n) => return format!("DUP{n}"),
            Self::Swap(n) => return format!("SWAP{n}"),
            Self::Log(n) => return format!("LOG{n}"),
            Self::Invalid(0xfe) => "INVALID",
            Self::Invalid(byte) => return format!("INVALID_{byte:02X}"),
            Self::Stop => "STOP",
            Self::Add => "ADD",
            Self::Mul => "MUL",
            Self::Sub => "SUB",
            Self::Div => "DIV",
            Self::SDiv => "SDIV",
            Self::Mod => "MOD",
            Self::SMod => "SMOD",
            Self::AddMod => "ADDMOD",
            Self::MulMod => "MULMOD",
            Self::Exp => "EXP",
            Self::SignExtend => "SIGNEXTEND",
            Self::Lt => "LT",
            Self::Gt => "GT",
            Self::SLt => "SLT",
            Self::SGt => "SGT",
            Self::Eq => "EQ",
            Self::IsZero => "ISZERO",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
            Self::Byte => "BYTE",
            Self::Shl => "SHL",
            Self::Shr => "SHR",
            Self::Sar => "SAR",
            Self::Sha3 => "SHA3",
            Self::Address => "ADDRESS",
            Self::Balance => "BALANCE",
            Self::Origin => "ORIGIN",
            Self::Caller => "CALLER",
            Self::CallValue => "CALLVALUE",
            Self::CallDataLoad => "CALLDATALOAD",
            Self::CallDataSize => "CALLDATASIZE",
            Self::CallDataCopy => "CALLDATACOPY",
            Self::CodeSize => "CODESIZE",
            Self::CodeCopy => "CODECOPY",
            Self::GasPrice => "GASPRICE",
            Self::ExtCodeSize => "EXTCODESIZE",
            Self::ExtCodeCopy => "EXTCODECOPY",
            Self::ReturnDataSize => "RETURNDATASIZE",
            Self::ReturnDataCopy => "RETURNDATACOPY",
            Self::ExtCodeHash => "EXTCODEHASH",
            Self::BlockHash => "BLOCKHASH",
            Self::CoinBase => "COINBASE",
            Self::Timestamp => "TIMESTAMP",
            Self::Number => "NUMBER",
            Self::Prevrandao => "PREVRANDAO",
            Self::GasLimit => "GASLIMIT",
            Self::ChainId => "CHAINID",
            Self::SelfBalance => "SELFBALANCE",
            Self::BaseFee => "BASEFEE",
            Self::BlobHash => "BLOBHASH",
            Self::BlobBaseFee => "BLOBBASEFEE",
            Self::Pop => "POP",
            Self::MLoad => "MLOAD",
            Self::MStore => "MSTORE",
            Self::MStore8 => "MSTORE8",
            Self::SLoad => "SLOAD",
            Self::SStore => "SSTORE",
            Self::Jump => "JUMP",
            Self::JumpI => "JUMPI",
            Self::PC => "PC",
            Self::MSize => "MSIZE",
            Self::Gas => "GAS",
            Self::JumpDest => "JUMPDEST",
            Self::TLoad => "TLOAD",
            Self::TStore => "TSTORE",
            Self::MCopy => "MCOPY",
            Self::Push0 => "PUSH0",
            Self::Create => "CREATE",
            Self::Call => "CALL",
            Self::CallCode => "CALLCODE",
            Self::Return => "RETURN",
            Self::DelegateCall => "DELEGATECALL",
            Self::Create2 => "CREATE2",
            Self::StaticCall => "STATICCALL",
            Self::Revert => "REVERT",
            Self::SelfDestruct => "SELFDESTRUCT",
        };

        text.into()
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text_code())
    }
}

/// A trait for things that can be written out as bytecode.
///
/// This is mostly useful for assembling test inputs through the
/// [`crate::bytecode`] macro.
pub trait Encode {
    /// Gets the bytes that represent `self` in the bytecode.
    fn encode(&self) -> Vec<u8>;
}

/// An opcode on its own encodes to its byte alone; any immediate data has to
/// be supplied separately (see [`PushN`]).
impl Encode for Opcode {
    fn encode(&self) -> Vec<u8> {
        vec![self.as_byte()]
    }
}

/// A bare byte encodes as itself, so that raw data (such as a truncated
/// operand) can be spliced into a test input.
impl Encode for u8 {
    fn encode(&self) -> Vec<u8> {
        vec![*self]
    }
}

/// Checks that `n` is a valid byte count for `PUSHN`, excluding `PUSH0`.
#[must_use]
pub fn is_valid_push_size(n: u8) -> bool {
    0 < n && n <= PUSH_OPCODE_MAX_BYTES
}
