// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The per-call context from which contract environments are synthesized.

use crate::data_types::Coin;
use mocknet_base::crypto::CodeHash;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds between two simulated blocks.
const BLOCK_INTERVAL_MILLIS: u64 = 5_000;

/// The simulated block a call happens in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockInfo {
    pub height: u64,
    /// Seconds since the Unix epoch.
    pub time: u64,
    pub chain_id: String,
}

impl BlockInfo {
    /// The block at `unix_millis` milliseconds since the Unix epoch.
    pub fn at(chain_id: impl Into<String>, unix_millis: u64) -> Self {
        BlockInfo {
            height: unix_millis / BLOCK_INTERVAL_MILLIS,
            time: unix_millis / 1_000,
            chain_id: chain_id.into(),
        }
    }

    /// The block at the current wall-clock time.
    pub fn now(chain_id: impl Into<String>) -> Self {
        let unix_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        Self::at(chain_id, unix_millis)
    }

    /// The block time in nanoseconds.
    pub fn time_nanos(&self) -> u64 {
        self.time * 1_000_000_000
    }
}

/// Everything a contract is told about the call it is handling.
///
/// Never persisted: a new context is built for every call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallContext {
    /// The caller. Empty for queries.
    pub sender: String,
    pub contract_address: String,
    pub code_hash: CodeHash,
    pub funds: Vec<Coin>,
    pub block: BlockInfo,
}

impl CallContext {
    pub fn new(
        sender: impl Into<String>,
        contract_address: impl Into<String>,
        code_hash: CodeHash,
        funds: Vec<Coin>,
        block: BlockInfo,
    ) -> Self {
        CallContext {
            sender: sender.into(),
            contract_address: contract_address.into(),
            code_hash,
            funds,
            block,
        }
    }

    /// A context for a query, which has no sender and no funds.
    pub fn for_query(
        contract_address: impl Into<String>,
        code_hash: CodeHash,
        block: BlockInfo,
    ) -> Self {
        Self::new(String::new(), contract_address, code_hash, Vec::new(), block)
    }
}
