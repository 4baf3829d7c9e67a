// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A cache of compiled WebAssembly modules.
//!
//! The cache is limited by the total size of cached bytecodes. Note that this is a heuristic to
//! estimate the total memory usage by the cache, since it's currently not possible to determine
//! the size of a compiled `Module`.

use crate::config::DEFAULT_MODULE_CACHE_SIZE;
use mocknet_base::crypto::CodeHash;
use std::{cmp::Ordering, collections::HashMap};

/// A cache of compiled WebAssembly modules, indexed by the hash of their bytecode.
///
/// The cache prioritizes entries based on how recently and how often they were used.
pub struct ModuleCache<Module> {
    modules: HashMap<CodeHash, Entry<Module>>,
    access_clock: u64,
    total_size: u64,
    max_size: u64,
}

/// An entry in the [`ModuleCache`].
struct Entry<Module> {
    module: Module,
    metadata: Metadata,
}

/// Information on a cache entry used to find eviction candidates.
///
/// Entries most recently used are prioritized over entries least recently used. Entries that are
/// more accessed are prioritized over entries that are less accessed. Entries for smaller
/// bytecodes are prioritized over entries for larger bytecodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Metadata {
    last_access: u64,
    access_count: u64,
    bytecode_size: u64,
}

impl<Module: Clone> Default for ModuleCache<Module> {
    fn default() -> Self {
        Self::new(DEFAULT_MODULE_CACHE_SIZE)
    }
}

impl<Module: Clone> ModuleCache<Module> {
    /// Creates an empty cache holding modules for at most `max_size` bytes of bytecode.
    pub fn new(max_size: u64) -> Self {
        ModuleCache {
            modules: HashMap::new(),
            access_clock: 0,
            total_size: 0,
            max_size,
        }
    }

    /// Returns the `Module` for the `bytecode` with `code_hash`, creating it with
    /// `module_builder` and adding it to the cache if it isn't already cached.
    pub fn get_or_insert_with<E>(
        &mut self,
        code_hash: CodeHash,
        bytecode: &[u8],
        module_builder: impl FnOnce(&[u8]) -> Result<Module, E>,
    ) -> Result<Module, E> {
        if let Some(module) = self.get(&code_hash) {
            return Ok(module);
        }

        let module = module_builder(bytecode)?;
        self.insert(code_hash, bytecode.len() as u64, module.clone());
        Ok(module)
    }

    /// Returns the `Module` for the bytecode with `code_hash` if it's in the cache.
    pub fn get(&mut self, code_hash: &CodeHash) -> Option<Module> {
        let current_access_time = self.tick_access_clock();
        let entry = self.modules.get_mut(code_hash)?;

        entry.metadata.access_count = entry.metadata.access_count.saturating_add(1);
        entry.metadata.last_access = current_access_time;

        Some(entry.module.clone())
    }

    /// Inserts the compiled `module` of a bytecode of `bytecode_size` bytes in the cache.
    ///
    /// Modules for bytecodes larger than the whole cache are not kept.
    pub fn insert(&mut self, code_hash: CodeHash, bytecode_size: u64, module: Module) {
        if bytecode_size > self.max_size {
            tracing::debug!(%code_hash, bytecode_size, "bytecode too large to be cached");
            return;
        }

        if let Some(previous) = self.modules.remove(&code_hash) {
            self.total_size -= previous.metadata.bytecode_size;
        }
        if self.total_size + bytecode_size > self.max_size {
            self.reduce_size_to(self.max_size - bytecode_size);
        }

        let metadata = Metadata {
            last_access: self.tick_access_clock(),
            access_count: 1,
            bytecode_size,
        };
        self.modules.insert(code_hash, Entry { module, metadata });
        self.total_size += bytecode_size;
    }

    pub fn contains(&self, code_hash: &CodeHash) -> bool {
        self.modules.contains_key(code_hash)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// The total size of the bytecodes whose modules are cached.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Evicts entries from the cache until the total size of cached bytecodes is at most
    /// `new_size`.
    fn reduce_size_to(&mut self, new_size: u64) {
        let mut eviction_candidates = self
            .modules
            .iter()
            .map(|(code_hash, entry)| (entry.metadata, *code_hash))
            .collect::<Vec<_>>();
        eviction_candidates.sort_unstable_by(|(left, _), (right, _)| right.cmp(left));

        while self.total_size > new_size {
            let Some((metadata, code_hash)) = eviction_candidates.pop() else {
                break;
            };
            self.modules.remove(&code_hash);
            self.total_size -= metadata.bytecode_size;
            tracing::debug!(%code_hash, "evicted module from cache");
        }
    }

    /// Increments the logical clock used to keep track of cache entry hits.
    fn tick_access_clock(&mut self) -> u64 {
        if self.access_clock == u64::MAX {
            self.reset_access_clock();
        }

        self.access_clock += 1;
        self.access_clock - 1
    }

    /// Resets the logical clock used to keep track of cache entry hits, to control how it
    /// overflows.
    ///
    /// All entries in the cache have their access time reset to lower values so that they become
    /// compacted, and the clock is reset to the next value after the latest access time.
    fn reset_access_clock(&mut self) {
        let mut entries = self.modules.values_mut().collect::<Vec<_>>();
        entries.sort_unstable_by_key(|entry| entry.metadata.last_access);

        for (new_last_access, entry) in (0_u64..).zip(entries) {
            entry.metadata.last_access = new_last_access;
        }
        self.access_clock = self.modules.len() as u64;
    }
}

impl Ord for Metadata {
    fn cmp(&self, other: &Self) -> Ordering {
        self.last_access
            .cmp(&other.last_access)
            .then(self.access_count.cmp(&other.access_count))
            .then(self.bytecode_size.cmp(&other.bytecode_size).reverse())
    }
}

impl PartialOrd for Metadata {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
