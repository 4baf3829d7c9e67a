// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The host functions imported by contracts from the `env` module.

use super::{region::GuestMemory, AbiVersion};
use crate::{
    contract::InstanceTable,
    env::{BlockInfo, CallContext},
    messages::{parse_code_hash, parse_query_request},
    result::Action,
    storage::{ContractStorage, InvalidOrder, Order},
    ExecutionError,
};
use anyhow::Result;
use mocknet_base::address::{self, AddressError};
use serde_json::{Map, Value};
use std::{cell::RefCell, rc::Weak, vec};
use thiserror::Error;
use wasmtime::{Caller, Linker, StoreLimits};

/// Status returned by the signature verification stubs: the signature is not valid.
const VERIFICATION_FAILED: u32 = 1;

/// Errors raised by host functions, which trap the calling contract.
#[derive(Debug, Error)]
pub enum HostFunctionError {
    #[error("contract aborted: {0}")]
    Aborted(String),

    #[error("unknown storage iterator {0}")]
    UnknownIterator(u32),

    #[error(transparent)]
    InvalidOrder(#[from] InvalidOrder),

    #[error("guest memory is not available until the contract is instantiated")]
    MemoryUnavailable,
}

type StorageIterator = vec::IntoIter<(Vec<u8>, Vec<u8>)>;

/// The state of a contract's store, available to every host function.
pub struct HostState {
    pub(super) address: String,
    pub(super) abi: AbiVersion,
    pub(super) address_prefix: String,
    pub(super) storage: ContractStorage,
    pub(super) iterators: Vec<StorageIterator>,
    pub(super) querier: Querier,
    pub(super) guest_memory: Option<GuestMemory>,
    pub(super) limits: StoreLimits,
}

impl HostState {
    pub fn new(
        address: &str,
        abi: AbiVersion,
        address_prefix: &str,
        querier: Querier,
        limits: StoreLimits,
    ) -> Self {
        HostState {
            address: address.to_owned(),
            abi,
            address_prefix: address_prefix.to_owned(),
            storage: ContractStorage::default(),
            iterators: Vec::new(),
            querier,
            guest_memory: None,
            limits,
        }
    }

    /// Drops the iterators created during the previous entry point call.
    pub fn reset_iterators(&mut self) {
        self.iterators.clear();
    }
}

/// Resolves `query_chain` requests against the other instances of the same backend.
#[derive(Clone, Debug)]
pub struct Querier {
    instances: Weak<RefCell<InstanceTable>>,
    chain_id: String,
}

impl Querier {
    pub(crate) fn new(
        instances: Weak<RefCell<InstanceTable>>,
        chain_id: impl Into<String>,
    ) -> Self {
        Querier {
            instances,
            chain_id: chain_id.into(),
        }
    }

    /// Runs a raw `query_chain` request and returns the serialized response for an `abi` guest.
    ///
    /// The target's result is wrapped twice in the guest's `Ok` tag.
    pub fn query_chain(&self, request: &[u8], abi: AbiVersion) -> Result<Vec<u8>, ExecutionError> {
        let query = parse_query_request(request)?;
        let msg = query.msg.to_json()?;
        let instances = self.instances.upgrade().ok_or(ExecutionError::BackendDropped)?;
        let instance = instances
            .borrow()
            .get(&query.contract_addr)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownQueryTarget(query.contract_addr.clone()))?;
        let mut instance = instance
            .try_borrow_mut()
            .map_err(|_| ExecutionError::Reentrancy(query.contract_addr.clone()))?;

        instance.check_code_hash(parse_code_hash(query.code_hash));
        let context = CallContext::for_query(
            query.contract_addr,
            instance.code_hash(),
            BlockInfo::now(&self.chain_id),
        );
        let result = instance.query(&context, &msg, Action::QueryChain)?;

        let tag = abi.result_tag();
        let inner = Map::from_iter([(tag.to_owned(), result)]);
        let outer = Map::from_iter([(tag.to_owned(), Value::Object(inner))]);
        Ok(serde_json::to_vec(&outer)?)
    }
}

/// Adds the host functions of the `abi` generation to the `linker`.
pub fn add_to_linker(linker: &mut Linker<HostState>, abi: AbiVersion) -> Result<()> {
    linker.func_wrap("env", "db_read", db_read)?;
    linker.func_wrap("env", "db_write", db_write)?;
    linker.func_wrap("env", "db_remove", db_remove)?;
    linker.func_wrap("env", "query_chain", query_chain)?;

    match abi {
        AbiVersion::Cw0 => {
            linker.func_wrap("env", "canonicalize_address", canonicalize_address)?;
            linker.func_wrap("env", "humanize_address", humanize_address)?;
        }
        AbiVersion::Cw1 => {
            linker.func_wrap("env", "db_scan", db_scan)?;
            linker.func_wrap("env", "db_next", db_next)?;
            linker.func_wrap("env", "db_next_key", db_next_key)?;
            linker.func_wrap("env", "db_next_value", db_next_value)?;
            linker.func_wrap("env", "addr_validate", addr_validate)?;
            linker.func_wrap("env", "addr_canonicalize", addr_canonicalize)?;
            linker.func_wrap("env", "addr_humanize", addr_humanize)?;
            linker.func_wrap("env", "debug", debug)?;
            linker.func_wrap("env", "abort", abort)?;
            linker.func_wrap("env", "secp256k1_verify", secp256k1_verify)?;
            linker.func_wrap("env", "secp256k1_recover_pubkey", secp256k1_recover_pubkey)?;
            linker.func_wrap("env", "ed25519_verify", ed25519_verify)?;
            linker.func_wrap("env", "ed25519_batch_verify", ed25519_batch_verify)?;
        }
    }

    Ok(())
}

fn guest_memory(caller: &Caller<'_, HostState>) -> Result<GuestMemory, HostFunctionError> {
    caller
        .data()
        .guest_memory
        .clone()
        .ok_or(HostFunctionError::MemoryUnavailable)
}

/// Copies `data` into a new guest region, returning its pointer.
fn pass_to_guest(caller: &mut Caller<'_, HostState>, data: &[u8]) -> Result<u32> {
    let memory = guest_memory(caller)?;
    Ok(memory.pass_buffer(caller, data)?)
}

/// Reports an address error to the guest through a new region holding its message.
fn report_address_error(caller: &mut Caller<'_, HostState>, error: AddressError) -> Result<u32> {
    tracing::debug!(address = %caller.data().address, %error, "address conversion failed");
    pass_to_guest(caller, error.to_string().as_bytes())
}

fn db_read(mut caller: Caller<'_, HostState>, key: u32) -> Result<u32> {
    let memory = guest_memory(&caller)?;
    let key = memory.read_region(&caller, key)?;
    let Some(value) = caller.data().storage.get(&key).map(<[u8]>::to_vec) else {
        return Ok(0);
    };
    Ok(memory.pass_buffer(&mut caller, &value)?)
}

fn db_write(mut caller: Caller<'_, HostState>, key: u32, value: u32) -> Result<()> {
    let memory = guest_memory(&caller)?;
    let key = memory.read_region(&caller, key)?;
    let value = memory.read_region(&caller, value)?;
    caller.data_mut().storage.set(key, value);
    Ok(())
}

fn db_remove(mut caller: Caller<'_, HostState>, key: u32) -> Result<()> {
    let memory = guest_memory(&caller)?;
    let key = memory.read_region(&caller, key)?;
    caller.data_mut().storage.remove(&key);
    Ok(())
}

fn query_chain(mut caller: Caller<'_, HostState>, request: u32) -> Result<u32> {
    let memory = guest_memory(&caller)?;
    let request = memory.read_region(&caller, request)?;
    let state = caller.data();
    let (querier, abi) = (state.querier.clone(), state.abi);

    let response = querier.query_chain(&request, abi)?;
    Ok(memory.pass_buffer(&mut caller, &response)?)
}

/// Converts the human readable address at `source` into its canonical bytes at `destination`.
///
/// Returns `0` on success or a pointer to a region with the error message.
fn canonicalize_into(
    caller: &mut Caller<'_, HostState>,
    source: u32,
    destination: u32,
) -> Result<u32> {
    let memory = guest_memory(caller)?;
    let human = memory.read_string(&*caller, source)?;
    match address::canonicalize(&human) {
        Ok(canonical) => {
            memory.write_to_region(caller, destination, &canonical)?;
            Ok(0)
        }
        Err(error) => report_address_error(caller, error),
    }
}

/// Converts the canonical address bytes at `source` into a human readable address at
/// `destination`, using the configured prefix.
fn humanize_into(
    caller: &mut Caller<'_, HostState>,
    source: u32,
    destination: u32,
) -> Result<u32> {
    let memory = guest_memory(caller)?;
    let canonical = memory.read_region(&*caller, source)?;
    match address::humanize(&caller.data().address_prefix, &canonical) {
        Ok(human) => {
            memory.write_to_region(caller, destination, human.as_bytes())?;
            Ok(0)
        }
        Err(error) => report_address_error(caller, error),
    }
}

fn canonicalize_address(
    mut caller: Caller<'_, HostState>,
    source: u32,
    destination: u32,
) -> Result<i32> {
    Ok(canonicalize_into(&mut caller, source, destination)? as i32)
}

fn humanize_address(
    mut caller: Caller<'_, HostState>,
    source: u32,
    destination: u32,
) -> Result<i32> {
    Ok(humanize_into(&mut caller, source, destination)? as i32)
}

fn addr_canonicalize(
    mut caller: Caller<'_, HostState>,
    source: u32,
    destination: u32,
) -> Result<u32> {
    canonicalize_into(&mut caller, source, destination)
}

fn addr_humanize(
    mut caller: Caller<'_, HostState>,
    source: u32,
    destination: u32,
) -> Result<u32> {
    humanize_into(&mut caller, source, destination)
}

fn addr_validate(mut caller: Caller<'_, HostState>, source: u32) -> Result<u32> {
    let memory = guest_memory(&caller)?;
    let human = memory.read_string(&caller, source)?;
    match address::validate(&human) {
        Ok(()) => Ok(0),
        Err(error) => report_address_error(&mut caller, error),
    }
}

fn db_scan(mut caller: Caller<'_, HostState>, start: u32, end: u32, order: i32) -> Result<u32> {
    let memory = guest_memory(&caller)?;
    let order = Order::try_from(order).map_err(HostFunctionError::from)?;
    let read_bound = |pointer: u32| match pointer {
        0 => Ok(None),
        pointer => memory.read_region(&caller, pointer).map(Some),
    };
    let start = read_bound(start)?;
    let end = read_bound(end)?;

    let state = caller.data_mut();
    let entries = state
        .storage
        .range(start.as_deref(), end.as_deref(), order);
    let iterator_id = u32::try_from(state.iterators.len())?;
    state.iterators.push(entries.into_iter());
    Ok(iterator_id)
}

/// Advances the iterator `iterator_id`, returning `None` once it is exhausted.
fn next_entry(
    caller: &mut Caller<'_, HostState>,
    iterator_id: u32,
) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    let iterator = caller
        .data_mut()
        .iterators
        .get_mut(iterator_id as usize)
        .ok_or(HostFunctionError::UnknownIterator(iterator_id))?;
    Ok(iterator.next())
}

/// Appends `data` to `buffer` as a section: the bytes followed by their big-endian length.
fn push_section(buffer: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    let length = u32::try_from(data.len())?;
    buffer.extend_from_slice(data);
    buffer.extend_from_slice(&length.to_be_bytes());
    Ok(())
}

fn db_next(mut caller: Caller<'_, HostState>, iterator_id: u32) -> Result<u32> {
    let (key, value) = next_entry(&mut caller, iterator_id)?.unwrap_or_default();
    let mut sections = Vec::with_capacity(key.len() + value.len() + 8);
    push_section(&mut sections, &key)?;
    push_section(&mut sections, &value)?;
    pass_to_guest(&mut caller, &sections)
}

fn db_next_key(mut caller: Caller<'_, HostState>, iterator_id: u32) -> Result<u32> {
    match next_entry(&mut caller, iterator_id)? {
        Some((key, _)) => pass_to_guest(&mut caller, &key),
        None => Ok(0),
    }
}

fn db_next_value(mut caller: Caller<'_, HostState>, iterator_id: u32) -> Result<u32> {
    match next_entry(&mut caller, iterator_id)? {
        Some((_, value)) => pass_to_guest(&mut caller, &value),
        None => Ok(0),
    }
}

fn debug(caller: Caller<'_, HostState>, message: u32) -> Result<()> {
    let memory = guest_memory(&caller)?;
    let message = memory.read_string(&caller, message)?;
    tracing::debug!(address = %caller.data().address, "{message}");
    Ok(())
}

fn abort(caller: Caller<'_, HostState>, message: u32) -> Result<()> {
    let memory = guest_memory(&caller)?;
    let message = memory.read_string(&caller, message)?;
    Err(HostFunctionError::Aborted(message).into())
}

fn warn_unsupported(caller: &Caller<'_, HostState>, function: &str) {
    tracing::warn!(
        address = %caller.data().address,
        function,
        "signature verification is not supported, reporting failure"
    );
}

fn secp256k1_verify(
    caller: Caller<'_, HostState>,
    _hash: u32,
    _signature: u32,
    _public_key: u32,
) -> u32 {
    warn_unsupported(&caller, "secp256k1_verify");
    VERIFICATION_FAILED
}

fn secp256k1_recover_pubkey(
    caller: Caller<'_, HostState>,
    _hash: u32,
    _signature: u32,
    _recovery_param: u32,
) -> u64 {
    warn_unsupported(&caller, "secp256k1_recover_pubkey");
    // The error code is returned in the upper half, with a null pointer in the lower one.
    u64::from(VERIFICATION_FAILED) << 32
}

fn ed25519_verify(
    caller: Caller<'_, HostState>,
    _message: u32,
    _signature: u32,
    _public_key: u32,
) -> u32 {
    warn_unsupported(&caller, "ed25519_verify");
    VERIFICATION_FAILED
}

fn ed25519_batch_verify(
    caller: Caller<'_, HostState>,
    _messages: u32,
    _signatures: u32,
    _public_keys: u32,
) -> u32 {
    warn_unsupported(&caller, "ed25519_batch_verify");
    VERIFICATION_FAILED
}

#[cfg(test)]
mod tests {
    use super::push_section;

    #[test]
    fn sections_end_with_their_big_endian_length() {
        let mut buffer = Vec::new();
        push_section(&mut buffer, b"key").unwrap();
        push_section(&mut buffer, b"").unwrap();

        assert_eq!(buffer, [b'k', b'e', b'y', 0, 0, 0, 3, 0, 0, 0, 0]);
    }
}
