// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Contracts built against the older ABI, with `init`, `handle` and `query` entry points.

use super::{
    common::WasmContract, system_api::Querier, AbiVersion, ContractHost, WasmExecutionError,
};
use crate::{config::MocknetConfig, env::CallContext, storage::ContractStorage};
use serde_json::{json, Value};
use wasmtime::{Engine, ExternType, Module, TypedFunc};

/// The `query` export, which older contracts declare either with or without an environment.
enum QueryEntrypoint {
    Message(TypedFunc<u32, u32>),
    EnvAndMessage(TypedFunc<(u32, u32), u32>),
}

pub struct Cw0Contract {
    contract: WasmContract,
    init: TypedFunc<(u32, u32), u32>,
    handle: TypedFunc<(u32, u32), u32>,
    query: QueryEntrypoint,
}

impl Cw0Contract {
    pub fn load(
        engine: &Engine,
        module: &Module,
        config: &MocknetConfig,
        address: &str,
        querier: Querier,
    ) -> Result<Self, WasmExecutionError> {
        let (mut contract, instance) =
            WasmContract::new(engine, module, config, AbiVersion::Cw0, address, querier)?;
        let init = contract.typed_func(&instance, "init")?;
        let handle = contract.typed_func(&instance, "handle")?;
        let query = match module.get_export("query") {
            Some(ExternType::Func(function)) if function.params().len() == 2 => {
                QueryEntrypoint::EnvAndMessage(contract.typed_func(&instance, "query")?)
            }
            _ => QueryEntrypoint::Message(contract.typed_func(&instance, "query")?),
        };

        Ok(Cw0Contract {
            contract,
            init,
            handle,
            query,
        })
    }

    fn env(context: &CallContext) -> Value {
        json!({
            "block": {
                "height": context.block.height,
                "time": context.block.time,
                "chain_id": context.block.chain_id,
            },
            "message": {
                "sender": context.sender,
                "sent_funds": context.funds,
            },
            "contract": {
                "address": context.contract_address,
            },
            "contract_key": "",
            "contract_code_hash": context.code_hash,
        })
    }
}

impl ContractHost for Cw0Contract {
    fn abi(&self) -> AbiVersion {
        AbiVersion::Cw0
    }

    fn storage(&self) -> &ContractStorage {
        self.contract.storage()
    }

    fn instantiate(
        &mut self,
        context: &CallContext,
        msg: &Value,
    ) -> Result<Value, WasmExecutionError> {
        let env = self.contract.pass_json(&Self::env(context))?;
        let msg = self.contract.pass_json(msg)?;
        self.contract.call("init", &self.init, (env, msg))
    }

    fn execute(&mut self, context: &CallContext, msg: &Value) -> Result<Value, WasmExecutionError> {
        let env = self.contract.pass_json(&Self::env(context))?;
        let msg = self.contract.pass_json(msg)?;
        self.contract.call("handle", &self.handle, (env, msg))
    }

    fn query(&mut self, context: &CallContext, msg: &Value) -> Result<Value, WasmExecutionError> {
        match &self.query {
            QueryEntrypoint::Message(query) => {
                let msg = self.contract.pass_json(msg)?;
                self.contract.call("query", query, msg)
            }
            QueryEntrypoint::EnvAndMessage(query) => {
                let env = self.contract.pass_json(&Self::env(context))?;
                let msg = self.contract.pass_json(msg)?;
                self.contract.call("query", query, (env, msg))
            }
        }
    }
}
