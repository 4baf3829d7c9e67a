// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::MocknetConfig,
    data_types::{CodeId, CodeRecord, ContractDescriptor},
    env::CallContext,
    result::{parse_result, Action},
    storage::ContractStorage,
    wasm::{self, AbiVersion, ContractHost, Querier},
    ExecutionError,
};
use mocknet_base::crypto::CodeHash;
use serde_json::Value;
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};
use wasmtime::{Engine, Module};

/// The live contract instances of a backend, by address.
pub(crate) type InstanceTable = BTreeMap<String, Rc<RefCell<ContractInstance>>>;

/// A contract instance: a loaded module with its own memory and storage.
pub struct ContractInstance {
    address: String,
    code_id: CodeId,
    code_hash: CodeHash,
    label: String,
    host: Box<dyn ContractHost>,
}

impl ContractInstance {
    pub(crate) fn load(
        engine: &Engine,
        module: &Module,
        config: &MocknetConfig,
        code: &CodeRecord,
        address: String,
        label: String,
        querier: Querier,
    ) -> Result<Self, ExecutionError> {
        let host = wasm::load(engine, module, config, &address, querier)?;
        Ok(ContractInstance {
            address,
            code_id: code.code_id,
            code_hash: CodeHash::of(&code.bytecode),
            label,
            host,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn code_id(&self) -> CodeId {
        self.code_id
    }

    /// The hash of the bytecode this instance was loaded from.
    pub fn code_hash(&self) -> CodeHash {
        self.code_hash
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn abi(&self) -> AbiVersion {
        self.host.abi()
    }

    pub fn storage(&self) -> &ContractStorage {
        self.host.storage()
    }

    pub fn descriptor(&self, chain_id: &str) -> ContractDescriptor {
        ContractDescriptor {
            address: self.address.clone(),
            chain_id: chain_id.to_owned(),
            code_id: self.code_id,
            code_hash: self.code_hash,
            label: self.label.clone(),
        }
    }

    /// Warns if a caller expected this instance to run some other code.
    pub(crate) fn check_code_hash(&self, expected: Option<CodeHash>) {
        if let Some(expected) = expected {
            if expected != self.code_hash {
                tracing::warn!(
                    address = %self.address,
                    %expected,
                    actual = %self.code_hash,
                    "code hash mismatch, using the hash of the loaded code"
                );
            }
        }
    }

    pub(crate) fn instantiate(
        &mut self,
        context: &CallContext,
        msg: &Value,
    ) -> Result<Value, ExecutionError> {
        let response = self.host.instantiate(context, msg)?;
        parse_result(response, self.abi(), Action::Instantiate, &self.address)
    }

    pub(crate) fn execute(
        &mut self,
        context: &CallContext,
        msg: &Value,
    ) -> Result<Value, ExecutionError> {
        let response = self.host.execute(context, msg)?;
        parse_result(response, self.abi(), Action::Execute, &self.address)
    }

    /// Runs a query, returning the guest's `Ok` payload as is.
    pub(crate) fn query(
        &mut self,
        context: &CallContext,
        msg: &Value,
        action: Action,
    ) -> Result<Value, ExecutionError> {
        let response = self.host.query(context, msg)?;
        parse_result(response, self.abi(), action, &self.address)
    }
}

impl fmt::Debug for ContractInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractInstance")
            .field("address", &self.address)
            .field("code_id", &self.code_id)
            .field("code_hash", &self.code_hash)
            .field("label", &self.label)
            .field("abi", &self.host.abi())
            .finish_non_exhaustive()
    }
}
