//! This module contains types useful for dealing with concrete contracts that
//! you want to analyze.

use std::{fs::File, io::Read, path::Path};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::{error::disassembly, preprocess::decode_hex};

/// A representation of a contract that is passed to the library.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contract {
    bytecode: Vec<u8>,
}

impl Contract {
    /// Creates a new contract from the provided `bytecode`.
    ///
    /// The bytecode may still carry its swarm metadata trailer, which is
    /// removed during analysis if the analysis is configured to do so.
    #[must_use]
    pub fn new(bytecode: Vec<u8>) -> Self {
        Self { bytecode }
    }

    /// Creates a new contract from the hexadecimal encoding of its bytecode,
    /// with or without the `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `code` is not valid hexadecimal.
    pub fn from_hex(code: &str) -> disassembly::Result<Self> {
        let bytecode = decode_hex(code)?;
        Ok(Self { bytecode })
    }

    /// Creates a new contract from the JSON representation of a compiled
    /// Solidity contract, as output by `solc --combined-json` or `forge`.
    ///
    /// The `kind` selects whether the deployed (runtime) bytecode or the
    /// creation bytecode, constructor included, is taken.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the JSON cannot be parsed, does not contain the
    /// requested bytecode, or the bytecode is not valid hexadecimal.
    pub fn from_compiled_json(json: &[u8], kind: BytecodeKind) -> anyhow::Result<Self> {
        let contract_rep: CompiledContract = serde_json::from_slice(json)
            .map_err(|e| anyhow!("Could not parse compiled contract: {e}"))?;

        let object = match kind {
            BytecodeKind::Deployed => contract_rep.deployed_bytecode,
            BytecodeKind::Creation => contract_rep.bytecode,
        }
        .map(|b| b.object)
        .ok_or_else(|| anyhow!("Compiled contract has no {kind} bytecode"))?;

        Ok(Self::from_hex(&object)?)
    }

    /// Creates a new contract from the compiled JSON file at the provided
    /// `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the file cannot be read, or if its contents are not
    /// a compiled contract as accepted by [`Self::from_compiled_json`].
    pub fn new_from_file(path: impl AsRef<Path>, kind: BytecodeKind) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut file =
            File::open(path).map_err(|e| anyhow!("File {} not available: {e}", path.display()))?;
        let mut contents = vec![];
        file.read_to_end(&mut contents)
            .map_err(|e| anyhow!("File {} could not be read: {e}", path.display()))?;

        Self::from_compiled_json(&contents, kind)
    }

    /// Gets a reference to the bytecode of the contract.
    #[must_use]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }
}

/// Which of the bytecodes in a compiled contract to analyze.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BytecodeKind {
    /// The code that is stored on chain once the contract is deployed.
    #[default]
    Deployed,

    /// The code that is executed to deploy the contract, which returns the
    /// deployed code.
    Creation,
}

impl std::fmt::Display for BytecodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployed => write!(f, "deployed"),
            Self::Creation => write!(f, "creation"),
        }
    }
}

/// A wrapper for the parts of the JSON representation of the compiled contract
/// on disk that we care about.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompiledContract {
    #[serde(default)]
    bytecode:          Option<CompiledBytecode>,
    #[serde(default)]
    deployed_bytecode: Option<CompiledBytecode>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
struct CompiledBytecode {
    object: String,
}

#[cfg(test)]
mod test {
    use crate::contract::{BytecodeKind, Contract};

    const COMPILED: &str = r#"{
        "abi": [],
        "bytecode": { "object": "0x6080604052" },
        "deployedBytecode": { "object": "0x600160020100", "sourceMap": "" }
    }"#;

    #[test]
    fn reads_hex_bytecode() -> anyhow::Result<()> {
        let contract = Contract::from_hex("0x6001")?;
        assert_eq!(contract.bytecode(), &[0x60, 0x01]);

        Ok(())
    }

    #[test]
    fn reads_compiled_json() -> anyhow::Result<()> {
        let deployed = Contract::from_compiled_json(COMPILED.as_bytes(), BytecodeKind::Deployed)?;
        assert_eq!(deployed.bytecode(), &[0x60, 0x01, 0x60, 0x02, 0x01, 0x00]);

        let creation = Contract::from_compiled_json(COMPILED.as_bytes(), BytecodeKind::Creation)?;
        assert_eq!(creation.bytecode(), &[0x60, 0x80, 0x60, 0x40, 0x52]);

        Ok(())
    }

    #[test]
    fn rejects_json_without_bytecode() {
        let result = Contract::from_compiled_json(br#"{ "abi": [] }"#, BytecodeKind::Deployed);
        assert!(result.is_err());

        let result = Contract::from_compiled_json(b"not json", BytecodeKind::Deployed);
        assert!(result.is_err());
    }
}
