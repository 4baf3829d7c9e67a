// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The JSON messages contracts send to the host: sub-messages in their responses and requests to
//! `query_chain`.
//!
//! Both ABI generations are accepted. Older contracts list bare `{"wasm": ...}` messages, use
//! `callback_code_hash` and `send`, while newer ones wrap messages in `{"id", "msg", "reply_on"}`
//! and use `code_hash` and `funds`.

use crate::{data_types::{CodeId, Coin}, ExecutionError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use mocknet_base::crypto::CodeHash;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Binary data encoded as a base64 string in JSON.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    /// Parses the decoded bytes as JSON.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map(Binary).map_err(de::Error::custom)
    }
}

/// A request to instantiate or execute a contract, found in a contract's response.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum WasmMsg {
    Instantiate {
        code_id: CodeId,
        #[serde(default, alias = "callback_code_hash")]
        code_hash: Option<String>,
        #[serde(default)]
        label: String,
        msg: Binary,
        #[serde(default, alias = "send")]
        funds: Vec<Coin>,
    },
    Execute {
        contract_addr: String,
        #[serde(default, alias = "callback_code_hash")]
        code_hash: Option<String>,
        msg: Binary,
        #[serde(default, alias = "send")]
        funds: Vec<Coin>,
    },
}

/// Extracts the `wasm.instantiate` or `wasm.execute` request from a sub-message.
///
/// Returns `Ok(None)` for every other kind of message, which the host does not support.
pub fn wasm_sub_message(message: &Value) -> Result<Option<WasmMsg>, serde_json::Error> {
    let wasm = message
        .get("wasm")
        .or_else(|| message.get("msg").and_then(|inner| inner.get("wasm")));

    match wasm {
        Some(wasm) if wasm.get("instantiate").is_some() || wasm.get("execute").is_some() => {
            WasmMsg::deserialize(wasm).map(Some)
        }
        _ => Ok(None),
    }
}

/// Returns the `messages` listed in a contract's `Ok` payload.
pub fn sub_messages(response: &Value) -> Vec<Value> {
    response
        .get("messages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// A `wasm.smart` query of another contract.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SmartQuery {
    pub contract_addr: String,
    #[serde(default, alias = "callback_code_hash")]
    pub code_hash: Option<String>,
    pub msg: Binary,
}

/// Parses the raw request a contract passed to `query_chain`.
pub fn parse_query_request(request: &[u8]) -> Result<SmartQuery, ExecutionError> {
    let request: Value = serde_json::from_slice(request)?;
    let Some(wasm) = request.get("wasm") else {
        return Err(ExecutionError::UnsupportedQuery(request.to_string()));
    };
    let Some(smart) = wasm.get("smart") else {
        return Err(ExecutionError::UnsupportedWasmQuery(wasm.to_string()));
    };
    Ok(SmartQuery::deserialize(smart)?)
}

/// Parses a code hash sent by a contract, ignoring it with a warning if it's malformed.
pub fn parse_code_hash(code_hash: Option<String>) -> Option<CodeHash> {
    let code_hash = code_hash?;
    match code_hash.parse() {
        Ok(hash) => Some(hash),
        Err(error) => {
            tracing::warn!(%code_hash, %error, "ignoring malformed code hash");
            None
        }
    }
}
