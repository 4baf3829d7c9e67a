// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contracts built against the newer ABI, with `instantiate`, `execute` and `query` entry points.

use super::{
    common::WasmContract, system_api::Querier, AbiVersion, ContractHost, WasmExecutionError,
};
use crate::{config::MocknetConfig, env::CallContext, storage::ContractStorage};
use serde_json::{json, Value};
use wasmtime::{Engine, Module, TypedFunc};

pub struct Cw1Contract {
    contract: WasmContract,
    instantiate: TypedFunc<(u32, u32, u32), u32>,
    execute: TypedFunc<(u32, u32, u32), u32>,
    query: TypedFunc<(u32, u32), u32>,
}

impl Cw1Contract {
    pub fn load(
        engine: &Engine,
        module: &Module,
        config: &MocknetConfig,
        address: &str,
        querier: Querier,
    ) -> Result<Self, WasmExecutionError> {
        let (mut contract, instance) =
            WasmContract::new(engine, module, config, AbiVersion::Cw1, address, querier)?;

        Ok(Cw1Contract {
            instantiate: contract.typed_func(&instance, "instantiate")?,
            execute: contract.typed_func(&instance, "execute")?,
            query: contract.typed_func(&instance, "query")?,
            contract,
        })
    }

    fn env(context: &CallContext) -> Value {
        json!({
            "block": {
                "height": context.block.height,
                "time": context.block.time_nanos().to_string(),
                "chain_id": context.block.chain_id,
            },
            "transaction": null,
            "contract": {
                "address": context.contract_address,
                "code_hash": context.code_hash,
            },
        })
    }

    fn info(context: &CallContext) -> Value {
        json!({
            "sender": context.sender,
            "funds": context.funds,
        })
    }

    /// Calls an entry point taking an environment, call information and a message.
    fn call_with_info(
        &mut self,
        entrypoint: &'static str,
        function: TypedFunc<(u32, u32, u32), u32>,
        context: &CallContext,
        msg: &Value,
    ) -> Result<Value, WasmExecutionError> {
        let env = self.contract.pass_json(&Self::env(context))?;
        let info = self.contract.pass_json(&Self::info(context))?;
        let msg = self.contract.pass_json(msg)?;
        self.contract.call(entrypoint, &function, (env, info, msg))
    }
}

impl ContractHost for Cw1Contract {
    fn abi(&self) -> AbiVersion {
        AbiVersion::Cw1
    }

    fn storage(&self) -> &ContractStorage {
        self.contract.storage()
    }

    fn instantiate(
        &mut self,
        context: &CallContext,
        msg: &Value,
    ) -> Result<Value, WasmExecutionError> {
        self.call_with_info("instantiate", self.instantiate.clone(), context, msg)
    }

    fn execute(&mut self, context: &CallContext, msg: &Value) -> Result<Value, WasmExecutionError> {
        self.call_with_info("execute", self.execute.clone(), context, msg)
    }

    fn query(&mut self, context: &CallContext, msg: &Value) -> Result<Value, WasmExecutionError> {
        let env = self.contract.pass_json(&Self::env(context))?;
        let msg = self.contract.pass_json(msg)?;
        self.contract.call("query", &self.query, (env, msg))
    }
}
