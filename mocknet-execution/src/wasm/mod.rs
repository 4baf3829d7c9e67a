// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Support for CosmWasm-style contracts compiled to WebAssembly.
//!
//! Two generations of the contract ABI are supported. They differ in the names and arities of the
//! entry points, in the shape of the environment passed to them and in the host functions they
//! import. Both are hidden behind the [`ContractHost`] trait, and the generation a module uses is
//! detected once when it is loaded.

mod common;
mod cw0;
mod cw1;
pub mod module_cache;
pub mod region;
mod system_api;

pub use self::{
    module_cache::ModuleCache,
    region::{GuestMemory, Region, RegionError},
    system_api::{HostFunctionError, Querier},
};

use self::{cw0::Cw0Contract, cw1::Cw1Contract};
use crate::{config::MocknetConfig, env::CallContext, storage::ContractStorage};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use wasmtime::{Engine, Module};

/// The generation of the contract ABI a module was compiled against.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AbiVersion {
    /// Entry points `init`, `handle` and `query`.
    Cw0,
    /// Entry points `instantiate`, `execute` and `query`.
    Cw1,
}

impl AbiVersion {
    /// Detects the ABI of a `module` from the names of its exports.
    pub fn detect(module: &Module) -> Result<Self, WasmExecutionError> {
        let exports = |names: [&str; 2]| names.iter().all(|name| module.get_export(name).is_some());

        if exports(["instantiate", "execute"]) {
            Ok(AbiVersion::Cw1)
        } else if exports(["init", "handle"]) {
            Ok(AbiVersion::Cw0)
        } else {
            Err(WasmExecutionError::UnknownAbi)
        }
    }

    /// The tag wrapping successful results in this ABI's serialization.
    pub fn result_tag(&self) -> &'static str {
        match self {
            AbiVersion::Cw0 => "Ok",
            AbiVersion::Cw1 => "ok",
        }
    }

    /// The key under which contracts of this generation return their errors.
    pub fn error_tag(&self) -> &'static str {
        match self {
            AbiVersion::Cw0 => "Err",
            AbiVersion::Cw1 => "error",
        }
    }
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiVersion::Cw0 => f.write_str("cw0"),
            AbiVersion::Cw1 => f.write_str("cw1"),
        }
    }
}

/// A loaded contract, ready to have its entry points called.
///
/// Every method returns the raw JSON response of the guest, still wrapped in its `Ok`/`Err` tag.
pub trait ContractHost {
    fn abi(&self) -> AbiVersion;

    /// The contract's storage, as left by its last call.
    fn storage(&self) -> &ContractStorage;

    fn instantiate(&mut self, context: &CallContext, msg: &Value)
        -> Result<Value, WasmExecutionError>;

    fn execute(&mut self, context: &CallContext, msg: &Value) -> Result<Value, WasmExecutionError>;

    fn query(&mut self, context: &CallContext, msg: &Value) -> Result<Value, WasmExecutionError>;
}

/// Instantiates a compiled `module` in a fresh store, as the contract at `address`.
pub fn load(
    engine: &Engine,
    module: &Module,
    config: &MocknetConfig,
    address: &str,
    querier: Querier,
) -> Result<Box<dyn ContractHost>, WasmExecutionError> {
    let host: Box<dyn ContractHost> = match AbiVersion::detect(module)? {
        AbiVersion::Cw0 => Box::new(Cw0Contract::load(engine, module, config, address, querier)?),
        AbiVersion::Cw1 => Box::new(Cw1Contract::load(engine, module, config, address, querier)?),
    };
    tracing::debug!(address, abi = %host.abi(), "loaded contract");
    Ok(host)
}

/// Errors that can occur when loading or running a WebAssembly contract.
#[derive(Debug, Error)]
pub enum WasmExecutionError {
    #[error("failed to compile WebAssembly module: {0:#}")]
    Compile(#[source] anyhow::Error),

    #[error("failed to link contract imports: {0:#}")]
    Link(#[source] anyhow::Error),

    #[error("failed to instantiate contract {address}: {error:#}")]
    Instantiate {
        address: String,
        #[source]
        error: anyhow::Error,
    },

    #[error("module exports neither `instantiate`/`execute` nor `init`/`handle`")]
    UnknownAbi,

    #[error("missing or mistyped contract export `{name}`: {error:#}")]
    Export {
        name: &'static str,
        #[source]
        error: anyhow::Error,
    },

    #[error("contract {address} trapped in `{entrypoint}`: {error:#}")]
    Trap {
        address: String,
        entrypoint: &'static str,
        #[source]
        error: anyhow::Error,
    },

    #[error("invalid response from `{entrypoint}` of contract {address}: {source}")]
    InvalidResponse {
        address: String,
        entrypoint: &'static str,
        source: RegionError,
    },

    #[error(transparent)]
    Region(#[from] RegionError),
}
