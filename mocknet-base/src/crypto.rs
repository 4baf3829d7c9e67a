// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hashing of uploaded bytecode.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// The SHA-256 hash of a contract's bytecode.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CodeHash([u8; 32]);

/// Error when parsing a [`CodeHash`] from its hexadecimal representation.
#[derive(Debug, Error)]
pub enum CodeHashError {
    /// The string is not valid hexadecimal.
    #[error("invalid hexadecimal code hash: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The decoded hash does not have 32 bytes.
    #[error("code hash must be 32 bytes long, got {0}")]
    Length(usize),
}

impl CodeHash {
    /// Computes the hash of some `bytecode`.
    pub fn of(bytecode: &[u8]) -> Self {
        CodeHash(Sha256::digest(bytecode).into())
    }

    /// Returns the raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for CodeHash {
    fn from(bytes: [u8; 32]) -> Self {
        CodeHash(bytes)
    }
}

impl fmt::Display for CodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..", hex::encode(&self.0[..8]))
    }
}

impl FromStr for CodeHash {
    type Err = CodeHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let length = bytes.len();
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CodeHashError::Length(length))?;
        Ok(CodeHash(bytes))
    }
}

impl Serialize for CodeHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CodeHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        string.parse().map_err(de::Error::custom)
    }
}
