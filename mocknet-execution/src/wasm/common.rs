// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The parts of a running contract shared by both ABI generations.

use super::{
    region::GuestMemory,
    system_api::{self, HostState, Querier},
    AbiVersion, WasmExecutionError,
};
use crate::{config::MocknetConfig, storage::ContractStorage};
use serde::Serialize;
use serde_json::Value;
use wasmtime::{
    Engine, ExternType, Instance, Linker, Memory, MemoryType, Module, Store, StoreLimitsBuilder,
    TypedFunc, WasmParams, WasmResults,
};

/// A contract instantiated in its own store.
pub struct WasmContract {
    address: String,
    store: Store<HostState>,
    memory: GuestMemory,
}

impl WasmContract {
    /// Instantiates `module` in a fresh store with the host functions of the `abi` generation.
    ///
    /// Returns the contract together with its instance, from which the entry points are taken.
    pub fn new(
        engine: &Engine,
        module: &Module,
        config: &MocknetConfig,
        abi: AbiVersion,
        address: &str,
        querier: Querier,
    ) -> Result<(Self, Instance), WasmExecutionError> {
        let limits = StoreLimitsBuilder::new()
            .memory_size(config.maximum_memory_bytes())
            .build();
        let state = HostState::new(address, abi, &config.address_prefix, querier, limits);
        let mut store = Store::new(engine, state);
        store.limiter(|state| &mut state.limits);

        let mut linker = Linker::new(engine);
        system_api::add_to_linker(&mut linker, abi).map_err(WasmExecutionError::Link)?;

        let imported_memory = if imports_memory(module) {
            let memory_type = MemoryType::new(
                config.initial_memory_pages,
                Some(config.maximum_memory_pages),
            );
            let memory =
                Memory::new(&mut store, memory_type).map_err(WasmExecutionError::Link)?;
            linker
                .define(&store, "env", "memory", memory)
                .map_err(WasmExecutionError::Link)?;
            Some(memory)
        } else {
            None
        };
        linker
            .define_unknown_imports_as_traps(module)
            .map_err(WasmExecutionError::Link)?;

        let instance = linker.instantiate(&mut store, module).map_err(|error| {
            WasmExecutionError::Instantiate {
                address: address.to_owned(),
                error,
            }
        })?;
        let memory = GuestMemory::from_instance(&mut store, &instance, imported_memory)?;
        store.data_mut().guest_memory = Some(memory.clone());

        let contract = WasmContract {
            address: address.to_owned(),
            store,
            memory,
        };
        Ok((contract, instance))
    }

    pub fn storage(&self) -> &ContractStorage {
        &self.store.data().storage
    }

    /// Looks up the entry point `name` of the `instance`.
    pub fn typed_func<Params, Results>(
        &mut self,
        instance: &Instance,
        name: &'static str,
    ) -> Result<TypedFunc<Params, Results>, WasmExecutionError>
    where
        Params: WasmParams,
        Results: WasmResults,
    {
        instance
            .get_typed_func(&mut self.store, name)
            .map_err(|error| WasmExecutionError::Export { name, error })
    }

    /// Copies `value` as JSON into a new guest region.
    pub fn pass_json(&mut self, value: &impl Serialize) -> Result<u32, WasmExecutionError> {
        Ok(self.memory.pass_json(&mut self.store, value)?)
    }

    /// Calls the `entrypoint` and reads the JSON response from the region it returns.
    pub fn call<Params: WasmParams>(
        &mut self,
        entrypoint: &'static str,
        function: &TypedFunc<Params, u32>,
        params: Params,
    ) -> Result<Value, WasmExecutionError> {
        self.store.data_mut().reset_iterators();
        let pointer =
            function
                .call(&mut self.store, params)
                .map_err(|error| WasmExecutionError::Trap {
                    address: self.address.clone(),
                    entrypoint,
                    error,
                })?;

        let response = self.memory.read_json(&self.store, pointer);
        self.memory.release(&mut self.store, pointer);
        response.map_err(|source| WasmExecutionError::InvalidResponse {
            address: self.address.clone(),
            entrypoint,
            source,
        })
    }
}

/// Whether `module` expects the host to provide its linear memory.
fn imports_memory(module: &Module) -> bool {
    module.imports().any(|import| {
        import.module() == "env"
            && import.name() == "memory"
            && matches!(import.ty(), ExternType::Memory(_))
    })
}
