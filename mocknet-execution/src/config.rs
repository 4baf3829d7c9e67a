// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration of a [`Backend`](crate::Backend).

use serde::{Deserialize, Serialize};

/// The chain ID reported to contracts by default.
pub const DEFAULT_CHAIN_ID: &str = "mocknet";

/// The bech32 prefix of generated contract addresses by default.
pub const DEFAULT_ADDRESS_PREFIX: &str = "mocked";

/// Initial size of a contract's linear memory, in 64 KiB pages.
pub const DEFAULT_INITIAL_MEMORY_PAGES: u32 = 32;

/// Maximum size of a contract's linear memory, in 64 KiB pages.
pub const DEFAULT_MAXIMUM_MEMORY_PAGES: u32 = 128;

/// Total bytecode size kept compiled in the module cache.
pub const DEFAULT_MODULE_CACHE_SIZE: u64 = 512 * 1024 * 1024;

/// Maximum nesting of sub-messages.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Size of a WebAssembly page.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Settings of a simulated chain.
#[derive(Clone, Debug, Eq, PartialEq, clap::Args, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MocknetConfig {
    /// The chain ID reported to contracts in their environment.
    #[arg(long = "mocknet-chain-id", default_value = DEFAULT_CHAIN_ID)]
    pub chain_id: String,

    /// The bech32 prefix of generated contract addresses.
    #[arg(long = "mocknet-address-prefix", default_value = DEFAULT_ADDRESS_PREFIX)]
    pub address_prefix: String,

    /// Initial size of each contract's linear memory, in 64 KiB pages.
    #[arg(long, default_value_t = DEFAULT_INITIAL_MEMORY_PAGES)]
    pub initial_memory_pages: u32,

    /// Maximum size of each contract's linear memory, in 64 KiB pages.
    #[arg(long, default_value_t = DEFAULT_MAXIMUM_MEMORY_PAGES)]
    pub maximum_memory_pages: u32,

    /// Total size of bytecode whose compiled modules are kept in memory.
    #[arg(long, default_value_t = DEFAULT_MODULE_CACHE_SIZE)]
    pub module_cache_size: u64,

    /// Maximum nesting of sub-messages before a call chain is aborted.
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    pub max_call_depth: usize,
}

impl Default for MocknetConfig {
    fn default() -> Self {
        MocknetConfig {
            chain_id: DEFAULT_CHAIN_ID.to_owned(),
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_owned(),
            initial_memory_pages: DEFAULT_INITIAL_MEMORY_PAGES,
            maximum_memory_pages: DEFAULT_MAXIMUM_MEMORY_PAGES,
            module_cache_size: DEFAULT_MODULE_CACHE_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl MocknetConfig {
    /// Returns a copy of this configuration with a different chain ID.
    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    /// The maximum size of a contract's linear memory in bytes.
    pub fn maximum_memory_bytes(&self) -> usize {
        self.maximum_memory_pages as usize * WASM_PAGE_SIZE
    }
}
