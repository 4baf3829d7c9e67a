// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hosting of CosmWasm-style WebAssembly contracts inside a simulated chain.
//!
//! A [`Backend`] owns the uploaded bytecode and every live contract instance. Each instance runs in
//! its own Wasmtime store with its own linear memory and storage, and talks to the host through
//! one of the two supported generations of the contract ABI (see [`wasm::AbiVersion`]).

mod backend;
pub mod config;
mod contract;
pub mod data_types;
pub mod env;
pub mod messages;
pub mod result;
pub mod storage;
pub mod wasm;

pub use crate::{
    backend::Backend,
    config::MocknetConfig,
    contract::ContractInstance,
    data_types::{
        CodeId, CodeRecord, Coin, ContractDescriptor, ContractTarget, ExecuteResponse,
        InstantiateRequest, UploadResult,
    },
    result::Action,
    wasm::{AbiVersion, WasmExecutionError},
};
pub use mocknet_base::crypto::CodeHash;

use mocknet_base::address::AddressError;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by the [`Backend`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no code with id {0}")]
    CodeNotFound(CodeId),

    #[error("no contract instance at address {0}")]
    NoInstanceAtAddress(String),

    #[error("{action} of contract {address} returned an error: {payload}")]
    Contract {
        action: Action,
        address: String,
        payload: Value,
    },

    #[error("{action} of contract {address} returned neither `Ok` nor `Err`: {response}")]
    MissingResult {
        action: Action,
        address: String,
        response: String,
    },

    #[error("invalid response from contract {address}: {reason}")]
    InvalidResponse { address: String, reason: String },

    #[error("contract {address} sent an invalid sub-message: {reason}")]
    InvalidSubMessage { address: String, reason: String },

    #[error("query_chain only supports `wasm` queries, got {0}")]
    UnsupportedQuery(String),

    #[error("query_chain only supports `wasm.smart` queries, got {0}")]
    UnsupportedWasmQuery(String),

    #[error("query_chain target {0} is not a known contract")]
    UnknownQueryTarget(String),

    #[error("contract {0} is already executing and can't be re-entered")]
    Reentrancy(String),

    #[error("sub-message chain exceeded the maximum call depth of {0}")]
    CallDepthExceeded(usize),

    #[error("the backend owning this contract has been dropped")]
    BackendDropped,

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Wasm(#[from] WasmExecutionError),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
