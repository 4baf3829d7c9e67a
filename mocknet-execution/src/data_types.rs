// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core data types exchanged with the [`Backend`](crate::Backend).

use mocknet_base::crypto::CodeHash;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{fmt, num::ParseIntError, str::FromStr, sync::Arc};

/// Identifier of an uploaded bytecode.
///
/// Identifiers start at `1` and are always rendered as decimal strings. They are parsed from
/// either JSON strings or JSON numbers, since contracts use both.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CodeId(pub u64);

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CodeId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(CodeId)
    }
}

impl Serialize for CodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            String(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(number) => Ok(CodeId(number)),
            Repr::String(string) => string.parse().map_err(de::Error::custom),
        }
    }
}

/// An uploaded bytecode.
#[derive(Clone, Debug)]
pub struct CodeRecord {
    pub code_id: CodeId,
    pub code_hash: CodeHash,
    pub bytecode: Arc<[u8]>,
}

/// The result of uploading some bytecode.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub code_id: CodeId,
    pub code_hash: CodeHash,
}

/// An amount of tokens attached to a call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(amount: u128, denom: impl Into<String>) -> Self {
        Coin {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }
}

/// What is needed to create a new contract instance.
#[derive(Clone, Debug, PartialEq)]
pub struct InstantiateRequest {
    pub code_id: CodeId,
    /// The hash the caller expects the code to have. Mismatches are only reported.
    pub code_hash: Option<CodeHash>,
    pub label: String,
    pub init_msg: Value,
    pub funds: Vec<Coin>,
}

impl InstantiateRequest {
    pub fn new(code_id: CodeId, label: impl Into<String>, init_msg: Value) -> Self {
        InstantiateRequest {
            code_id,
            code_hash: None,
            label: label.into(),
            init_msg,
            funds: Vec::new(),
        }
    }

    pub fn with_code_hash(mut self, code_hash: CodeHash) -> Self {
        self.code_hash = Some(code_hash);
        self
    }

    pub fn with_funds(mut self, funds: Vec<Coin>) -> Self {
        self.funds = funds;
        self
    }
}

/// A live contract instance, as reported to callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDescriptor {
    pub address: String,
    pub chain_id: String,
    pub code_id: CodeId,
    pub code_hash: CodeHash,
    pub label: String,
}

/// The contract an execution or a query is addressed to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContractTarget {
    pub address: String,
    /// The hash the caller expects the contract's code to have. Mismatches are only reported.
    pub code_hash: Option<CodeHash>,
}

impl ContractTarget {
    pub fn new(address: impl Into<String>) -> Self {
        ContractTarget {
            address: address.into(),
            code_hash: None,
        }
    }

    pub fn with_code_hash(mut self, code_hash: CodeHash) -> Self {
        self.code_hash = Some(code_hash);
        self
    }
}

impl From<&ContractDescriptor> for ContractTarget {
    fn from(descriptor: &ContractDescriptor) -> Self {
        ContractTarget {
            address: descriptor.address.clone(),
            code_hash: Some(descriptor.code_hash),
        }
    }
}

/// The outcome of a successful execution.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecuteResponse {
    /// The `Ok` payload returned by the contract.
    pub response: Value,
    /// The base64-decoded `data` field, if the contract set one.
    pub data: Option<Vec<u8>>,
    /// The sub-messages the contract requested, already processed.
    pub messages: Vec<Value>,
}
