// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::MocknetConfig,
    contract::{ContractInstance, InstanceTable},
    data_types::{
        CodeId, CodeRecord, Coin, ContractDescriptor, ContractTarget, ExecuteResponse,
        InstantiateRequest, UploadResult,
    },
    env::{BlockInfo, CallContext},
    messages::{parse_code_hash, sub_messages, wasm_sub_message, WasmMsg},
    result::Action,
    storage::ContractStorage,
    wasm::{ModuleCache, Querier, WasmExecutionError},
    ExecutionError,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use mocknet_base::{address::random_address, crypto::CodeHash, ensure};
use serde_json::Value;
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    rc::Rc,
    sync::Arc,
};
use wasmtime::{Engine, Module};

/// A simulated chain hosting contracts in-process.
///
/// The backend owns all uploaded bytecode and every contract instance. Calls are fully synchronous:
/// an execution returns only once all the sub-messages it triggered have been processed.
pub struct Backend {
    config: MocknetConfig,
    engine: Engine,
    modules: ModuleCache<Module>,
    codes: BTreeMap<CodeId, CodeRecord>,
    instances: Rc<RefCell<InstanceTable>>,
    code_id_for_code_hash: HashMap<CodeHash, CodeId>,
    code_id_for_address: HashMap<String, CodeId>,
    label_for_address: HashMap<String, String>,
}

impl Default for Backend {
    fn default() -> Self {
        Self::new(MocknetConfig::default())
    }
}

impl Backend {
    pub fn new(config: MocknetConfig) -> Self {
        Backend {
            modules: ModuleCache::new(config.module_cache_size),
            engine: Engine::default(),
            codes: BTreeMap::new(),
            instances: Rc::default(),
            code_id_for_code_hash: HashMap::new(),
            code_id_for_address: HashMap::new(),
            label_for_address: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &MocknetConfig {
        &self.config
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    /// Stores `bytecode` under a new code ID.
    ///
    /// Identical bytecodes uploaded twice get two code IDs with the same hash.
    pub fn upload(&mut self, bytecode: impl AsRef<[u8]>) -> UploadResult {
        let bytecode: Arc<[u8]> = Arc::from(bytecode.as_ref());
        let code_hash = CodeHash::of(&bytecode);
        let code_id = CodeId(self.codes.keys().next_back().map_or(1, |last| last.0 + 1));

        tracing::debug!(%code_id, %code_hash, size = bytecode.len(), "uploaded bytecode");
        self.codes.insert(
            code_id,
            CodeRecord {
                code_id,
                code_hash,
                bytecode,
            },
        );
        self.code_id_for_code_hash.insert(code_hash, code_id);

        UploadResult { code_id, code_hash }
    }

    pub fn get_code(&self, code_id: CodeId) -> Result<&CodeRecord, ExecutionError> {
        self.codes
            .get(&code_id)
            .ok_or(ExecutionError::CodeNotFound(code_id))
    }

    /// Creates a new instance of uploaded code on behalf of `sender`.
    ///
    /// Nothing is registered if the contract rejects its instantiation. Sub-messages returned by
    /// the contract are processed after it is registered.
    pub fn instantiate(
        &mut self,
        sender: &str,
        request: InstantiateRequest,
    ) -> Result<ContractDescriptor, ExecutionError> {
        self.instantiate_at_depth(sender, request, 0)
    }

    /// Executes `msg` on the `target` contract on behalf of `sender`, then its sub-messages.
    ///
    /// Effects of calls that completed before a failure are kept.
    pub fn execute(
        &mut self,
        sender: &str,
        target: &ContractTarget,
        msg: &Value,
        funds: Vec<Coin>,
    ) -> Result<ExecuteResponse, ExecutionError> {
        self.execute_at_depth(sender, target, msg, funds, 0)
    }

    /// Queries the `target` contract, decoding the base64 JSON it returns.
    #[tracing::instrument(level = "debug", skip(self, target), fields(address = %target.address))]
    pub fn query(&self, target: &ContractTarget, msg: &Value) -> Result<Value, ExecutionError> {
        let instance = self.instance(&target.address)?;
        let mut instance = instance
            .try_borrow_mut()
            .map_err(|_| ExecutionError::Reentrancy(target.address.clone()))?;

        instance.check_code_hash(target.code_hash);
        let context = CallContext::for_query(&target.address, instance.code_hash(), self.block());
        let result = instance.query(&context, msg, Action::Query)?;

        let Value::String(encoded) = result else {
            return Err(ExecutionError::InvalidResponse {
                address: target.address.clone(),
                reason: format!("query result must be a base64 string, got {result}"),
            });
        };
        Ok(serde_json::from_slice(&BASE64.decode(encoded)?)?)
    }

    /// Describes the instance at `address`, if there is one.
    pub fn contract(&self, address: &str) -> Option<ContractDescriptor> {
        let instances = self.instances.borrow();
        let instance = instances.get(address)?.borrow();
        Some(instance.descriptor(&self.config.chain_id))
    }

    /// Describes every instance, ordered by address.
    pub fn contracts(&self) -> Vec<ContractDescriptor> {
        self.instances
            .borrow()
            .values()
            .map(|instance| instance.borrow().descriptor(&self.config.chain_id))
            .collect()
    }

    /// A snapshot of the storage of the instance at `address`.
    pub fn contract_storage(&self, address: &str) -> Option<ContractStorage> {
        let instances = self.instances.borrow();
        let instance = instances.get(address)?.borrow();
        Some(instance.storage().clone())
    }

    /// The latest code ID uploaded with `code_hash`.
    pub fn code_id_for_code_hash(&self, code_hash: &CodeHash) -> Option<CodeId> {
        self.code_id_for_code_hash.get(code_hash).copied()
    }

    pub fn code_id_for_address(&self, address: &str) -> Option<CodeId> {
        self.code_id_for_address.get(address).copied()
    }

    pub fn label_for_address(&self, address: &str) -> Option<&str> {
        self.label_for_address.get(address).map(String::as_str)
    }

    fn block(&self) -> BlockInfo {
        BlockInfo::now(&self.config.chain_id)
    }

    fn instance(&self, address: &str) -> Result<Rc<RefCell<ContractInstance>>, ExecutionError> {
        self.instances
            .borrow()
            .get(address)
            .cloned()
            .ok_or_else(|| ExecutionError::NoInstanceAtAddress(address.to_owned()))
    }

    /// Generates an address that no instance uses yet.
    fn fresh_address(&self) -> Result<String, ExecutionError> {
        loop {
            let address = random_address(&self.config.address_prefix)?;
            if !self.instances.borrow().contains_key(&address) {
                return Ok(address);
            }
        }
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, request),
        fields(code_id = %request.code_id, label = %request.label)
    )]
    fn instantiate_at_depth(
        &mut self,
        sender: &str,
        request: InstantiateRequest,
        depth: usize,
    ) -> Result<ContractDescriptor, ExecutionError> {
        ensure!(
            depth <= self.config.max_call_depth,
            ExecutionError::CallDepthExceeded(self.config.max_call_depth)
        );

        let code = self.get_code(request.code_id)?.clone();
        if let Some(expected) = request.code_hash.filter(|expected| *expected != code.code_hash) {
            tracing::warn!(
                %expected,
                actual = %code.code_hash,
                "code hash mismatch, using the hash of the uploaded code"
            );
        }

        let engine = &self.engine;
        let module = self
            .modules
            .get_or_insert_with(code.code_hash, &code.bytecode, |bytecode| {
                Module::new(engine, bytecode).map_err(WasmExecutionError::Compile)
            })?;

        let address = self.fresh_address()?;
        let querier = Querier::new(Rc::downgrade(&self.instances), &self.config.chain_id);
        let mut instance = ContractInstance::load(
            &self.engine,
            &module,
            &self.config,
            &code,
            address.clone(),
            request.label,
            querier,
        )?;

        let context = CallContext::new(
            sender,
            &address,
            instance.code_hash(),
            request.funds,
            self.block(),
        );
        let response = instance.instantiate(&context, &request.init_msg)?;

        let descriptor = instance.descriptor(&self.config.chain_id);
        self.register(instance);
        tracing::debug!(%address, "instantiated contract");

        self.process_callbacks(&address, &response, depth)?;
        Ok(descriptor)
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, target, msg, funds),
        fields(address = %target.address)
    )]
    fn execute_at_depth(
        &mut self,
        sender: &str,
        target: &ContractTarget,
        msg: &Value,
        funds: Vec<Coin>,
        depth: usize,
    ) -> Result<ExecuteResponse, ExecutionError> {
        ensure!(
            depth <= self.config.max_call_depth,
            ExecutionError::CallDepthExceeded(self.config.max_call_depth)
        );

        let instance = self.instance(&target.address)?;
        let response = {
            let mut instance = instance
                .try_borrow_mut()
                .map_err(|_| ExecutionError::Reentrancy(target.address.clone()))?;
            instance.check_code_hash(target.code_hash);
            let context = CallContext::new(
                sender,
                &target.address,
                instance.code_hash(),
                funds,
                self.block(),
            );
            instance.execute(&context, msg)?
        };

        let data = match response.get("data") {
            None | Some(Value::Null) => None,
            Some(Value::String(encoded)) => Some(BASE64.decode(encoded)?),
            Some(other) => {
                return Err(ExecutionError::InvalidResponse {
                    address: target.address.clone(),
                    reason: format!("`data` must be a base64 string, got {other}"),
                })
            }
        };
        let messages = self.process_callbacks(&target.address, &response, depth)?;

        Ok(ExecuteResponse {
            response,
            data,
            messages,
        })
    }

    /// Runs the sub-messages of a `response` from the contract at `sender`, depth-first.
    ///
    /// The first failing sub-message aborts the remaining ones. Messages other than wasm
    /// instantiations and executions are skipped.
    fn process_callbacks(
        &mut self,
        sender: &str,
        response: &Value,
        depth: usize,
    ) -> Result<Vec<Value>, ExecutionError> {
        let messages = sub_messages(response);
        let invalid = |error: serde_json::Error| ExecutionError::InvalidSubMessage {
            address: sender.to_owned(),
            reason: error.to_string(),
        };

        for message in &messages {
            match wasm_sub_message(message).map_err(invalid)? {
                None => tracing::warn!(sender, %message, "skipping unsupported sub-message"),
                Some(WasmMsg::Instantiate {
                    code_id,
                    code_hash,
                    label,
                    msg,
                    funds,
                }) => {
                    let init_msg = msg.to_json().map_err(invalid)?;
                    let mut request =
                        InstantiateRequest::new(code_id, label, init_msg).with_funds(funds);
                    request.code_hash = parse_code_hash(code_hash);
                    self.instantiate_at_depth(sender, request, depth + 1)?;
                }
                Some(WasmMsg::Execute {
                    contract_addr,
                    code_hash,
                    msg,
                    funds,
                }) => {
                    let msg = msg.to_json().map_err(invalid)?;
                    let target = ContractTarget {
                        address: contract_addr,
                        code_hash: parse_code_hash(code_hash),
                    };
                    self.execute_at_depth(sender, &target, &msg, funds, depth + 1)?;
                }
            }
        }

        Ok(messages)
    }

    fn register(&mut self, instance: ContractInstance) {
        let address = instance.address().to_owned();
        self.code_id_for_address
            .insert(address.clone(), instance.code_id());
        self.label_for_address
            .insert(address.clone(), instance.label().to_owned());
        self.instances
            .borrow_mut()
            .insert(address, Rc::new(RefCell::new(instance)));
    }
}
