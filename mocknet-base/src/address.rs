// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bech32 addresses for simulated accounts and contracts.
//!
//! The "canonical" form of an address is the sequence of 5-bit words of its bech32 data part,
//! one word per byte. No prefix or length checks are performed besides what bech32 itself
//! enforces, so this is only a stand-in for the address handling of a real chain.

use bech32::{primitives::decode::CheckedHrpstring, Bech32, ByteIterExt, Fe32, Fe32IterExt, Hrp};
use rand::Rng;
use thiserror::Error;

/// Number of random bytes in a generated address.
pub const ADDRESS_LENGTH: usize = 20;

/// Errors from encoding or decoding bech32 addresses.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddressError {
    /// The human readable prefix is not valid bech32.
    #[error("invalid bech32 prefix `{prefix}`: {reason}")]
    InvalidPrefix {
        /// The rejected prefix.
        prefix: String,
        /// Why bech32 rejected it.
        reason: String,
    },

    /// The address could not be decoded.
    #[error("invalid bech32 address `{address}`: {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why bech32 rejected it.
        reason: String,
    },

    /// The canonical bytes could not be encoded.
    #[error("failed to encode {length} canonical bytes as bech32: {reason}")]
    Encode {
        /// Number of canonical bytes.
        length: usize,
        /// Why bech32 rejected them.
        reason: String,
    },

    /// Canonical addresses can't be empty.
    #[error("canonical address is empty")]
    Empty,

    /// The address decodes, but is not in its normalized form.
    #[error("address `{0}` is not normalized")]
    NotNormalized(String),
}

/// Generates a new random address with the provided `prefix`.
pub fn random_address(prefix: &str) -> Result<String, AddressError> {
    let mut bytes = [0u8; ADDRESS_LENGTH];
    rand::thread_rng().fill(&mut bytes);
    let words = bytes.iter().copied().bytes_to_fes().map(u8::from).collect::<Vec<_>>();
    humanize(prefix, &words)
}

/// Decodes a bech32 `address` into its prefix and the words of its data part.
fn decode(address: &str) -> Result<(Hrp, Vec<u8>), AddressError> {
    let invalid = |reason: String| AddressError::InvalidAddress {
        address: address.to_owned(),
        reason,
    };
    let checked =
        CheckedHrpstring::new::<Bech32>(address).map_err(|error| invalid(error.to_string()))?;
    let words = checked
        .data_part_ascii_no_checksum()
        .iter()
        .map(|&character| Fe32::from_char(char::from(character)).map(u8::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| invalid(error.to_string()))?;
    Ok((checked.hrp(), words))
}

/// Decodes a bech32 `address` into its canonical form, one 5-bit word per byte.
pub fn canonicalize(address: &str) -> Result<Vec<u8>, AddressError> {
    let (_prefix, words) = decode(address)?;
    if words.is_empty() {
        return Err(AddressError::Empty);
    }
    Ok(words)
}

/// Encodes `canonical` words as a bech32 address with the provided `prefix`.
pub fn humanize(prefix: &str, canonical: &[u8]) -> Result<String, AddressError> {
    if canonical.is_empty() {
        return Err(AddressError::Empty);
    }
    let hrp = Hrp::parse(prefix).map_err(|error| AddressError::InvalidPrefix {
        prefix: prefix.to_owned(),
        reason: error.to_string(),
    })?;
    let words = canonical
        .iter()
        .map(|&word| Fe32::try_from(word))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| AddressError::Encode {
            length: canonical.len(),
            reason: error.to_string(),
        })?;
    Ok(words.into_iter().with_checksum::<Bech32>(&hrp).chars().collect())
}

/// Checks that `address` decodes and is already in its normalized (lower case) form.
pub fn validate(address: &str) -> Result<(), AddressError> {
    let (prefix, words) = decode(address)?;
    let normalized = humanize(&prefix.to_lowercase(), &words)?;
    if normalized != address {
        return Err(AddressError::NotNormalized(address.to_owned()));
    }
    Ok(())
}
