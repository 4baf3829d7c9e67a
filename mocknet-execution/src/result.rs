// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parsing of the `{"Ok": ...}` / `{"Err": ...}` results returned by every contract entry point,
//! tagged `{"ok": ...}` / `{"error": ...}` by newer contracts.

use crate::{wasm::AbiVersion, ExecutionError};
use serde_json::Value;
use std::fmt;

/// The host operation a contract result belongs to, used to give errors some context.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    Instantiate,
    Execute,
    Query,
    QueryChain,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Instantiate => "instantiate",
            Action::Execute => "execute",
            Action::Query => "query",
            Action::QueryChain => "query_chain",
        };
        f.write_str(name)
    }
}

/// Extracts the success payload of the `response` of an `abi` contract.
///
/// Older contracts tag results as `Ok`/`Err`, newer ones as `ok`/`error`. An error payload takes
/// precedence over a success payload.
pub fn parse_result(
    response: Value,
    abi: AbiVersion,
    action: Action,
    address: &str,
) -> Result<Value, ExecutionError> {
    let Value::Object(mut fields) = response else {
        return Err(ExecutionError::MissingResult {
            action,
            address: address.to_owned(),
            response: response.to_string(),
        });
    };

    if let Some(payload) = fields.remove(abi.error_tag()) {
        return Err(ExecutionError::Contract {
            action,
            address: address.to_owned(),
            payload,
        });
    }

    fields
        .remove(abi.result_tag())
        .ok_or_else(|| ExecutionError::MissingResult {
            action,
            address: address.to_owned(),
            response: Value::Object(fields).to_string(),
        })
}
