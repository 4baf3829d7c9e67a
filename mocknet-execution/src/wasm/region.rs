// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Access to a guest's linear memory through regions.
//!
//! A region is a 12 byte descriptor stored in guest memory, made of three little-endian `u32`
//! words: the `offset` of the data, the `capacity` reserved for it, and the `length` in use. Every
//! buffer exchanged between the host and a contract is passed as a pointer to such a descriptor.

use mocknet_base::ensure;
use serde::{de::DeserializeOwned, Serialize};
use std::string::FromUtf8Error;
use thiserror::Error;
use wasmtime::{AsContext, AsContextMut, Extern, Instance, Memory, TypedFunc};

/// Size of a region descriptor in bytes.
pub const REGION_SIZE: usize = 12;

/// A region descriptor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Region {
    pub offset: u32,
    pub capacity: u32,
    pub length: u32,
}

impl Region {
    pub fn from_bytes(bytes: [u8; REGION_SIZE]) -> Self {
        let word = |index: usize| {
            let mut word = [0; 4];
            word.copy_from_slice(&bytes[index * 4..(index + 1) * 4]);
            u32::from_le_bytes(word)
        };
        Region {
            offset: word(0),
            capacity: word(1),
            length: word(2),
        }
    }

    pub fn to_bytes(&self) -> [u8; REGION_SIZE] {
        let mut bytes = [0; REGION_SIZE];
        bytes[0..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.capacity.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }
}

/// Errors caused by invalid regions or by the guest functions that manage them.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("null region pointer")]
    NullPointer,

    #[error("region descriptor at {0:#x} is outside of guest memory")]
    DescriptorOutOfBounds(u32),

    #[error("region length {length} exceeds its capacity {capacity}")]
    LengthExceedsCapacity { length: u32, capacity: u32 },

    #[error(
        "region data of {length} bytes at {offset:#x} is outside of guest memory \
        ({memory_size} bytes)"
    )]
    DataOutOfBounds {
        offset: u32,
        length: u32,
        memory_size: usize,
    },

    #[error("{length} bytes don't fit in a region with capacity {capacity}")]
    DataTooLarge { length: usize, capacity: u32 },

    #[error("contract does not export `{0}`")]
    MissingExport(&'static str),

    #[error("contract export `{name}` has an unexpected signature: {error:#}")]
    ExportSignature {
        name: &'static str,
        error: anyhow::Error,
    },

    #[error("guest failed to allocate {length} bytes: {error:#}")]
    Allocate { length: usize, error: anyhow::Error },

    #[error("region data is not valid UTF-8")]
    Utf8(#[from] FromUtf8Error),

    #[error("region data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handles to a contract's memory and to the exports that manage it.
#[derive(Clone)]
pub struct GuestMemory {
    memory: Memory,
    allocate: TypedFunc<u32, u32>,
    deallocate: Option<TypedFunc<u32, ()>>,
}

impl GuestMemory {
    /// Looks up the memory and allocation exports of an `instance`.
    ///
    /// Contracts that import their memory instead of exporting it use `imported_memory`.
    pub fn from_instance(
        mut store: impl AsContextMut,
        instance: &Instance,
        imported_memory: Option<Memory>,
    ) -> Result<Self, RegionError> {
        let memory = instance
            .get_export(&mut store, "memory")
            .and_then(Extern::into_memory)
            .or(imported_memory)
            .ok_or(RegionError::MissingExport("memory"))?;
        let allocate = instance
            .get_func(&mut store, "allocate")
            .ok_or(RegionError::MissingExport("allocate"))?
            .typed(&store)
            .map_err(|error| RegionError::ExportSignature {
                name: "allocate",
                error,
            })?;
        let deallocate = match instance.get_func(&mut store, "deallocate") {
            Some(function) => Some(function.typed(&store).map_err(|error| {
                RegionError::ExportSignature {
                    name: "deallocate",
                    error,
                }
            })?),
            None => None,
        };

        Ok(GuestMemory {
            memory,
            allocate,
            deallocate,
        })
    }

    /// Reads the descriptor at `pointer`.
    pub fn read_descriptor(
        &self,
        store: impl AsContext,
        pointer: u32,
    ) -> Result<Region, RegionError> {
        ensure!(pointer != 0, RegionError::NullPointer);
        let start = pointer as usize;
        let bytes = self
            .memory
            .data(store.as_context())
            .get(start..start + REGION_SIZE)
            .ok_or(RegionError::DescriptorOutOfBounds(pointer))?;
        let mut descriptor = [0; REGION_SIZE];
        descriptor.copy_from_slice(bytes);
        Ok(Region::from_bytes(descriptor))
    }

    /// Copies the data of the region at `pointer` out of guest memory.
    pub fn read_region(&self, store: impl AsContext, pointer: u32) -> Result<Vec<u8>, RegionError> {
        let region = self.read_descriptor(&store, pointer)?;
        ensure!(
            region.length <= region.capacity,
            RegionError::LengthExceedsCapacity {
                length: region.length,
                capacity: region.capacity,
            }
        );

        let data = self.memory.data(store.as_context());
        let start = region.offset as usize;
        data.get(start..start + region.length as usize)
            .map(<[u8]>::to_vec)
            .ok_or(RegionError::DataOutOfBounds {
                offset: region.offset,
                length: region.length,
                memory_size: data.len(),
            })
    }

    pub fn read_string(&self, store: impl AsContext, pointer: u32) -> Result<String, RegionError> {
        Ok(String::from_utf8(self.read_region(store, pointer)?)?)
    }

    pub fn read_json<T: DeserializeOwned>(
        &self,
        store: impl AsContext,
        pointer: u32,
    ) -> Result<T, RegionError> {
        Ok(serde_json::from_str(&self.read_string(store, pointer)?)?)
    }

    /// Writes `data` into the guest allocated region at `pointer` and updates its length.
    ///
    /// Nothing is written if `data` exceeds the region's capacity.
    pub fn write_to_region(
        &self,
        mut store: impl AsContextMut,
        pointer: u32,
        data: &[u8],
    ) -> Result<(), RegionError> {
        let mut region = self.read_descriptor(&store, pointer)?;
        let length = u32::try_from(data.len())
            .ok()
            .filter(|&length| length <= region.capacity)
            .ok_or(RegionError::DataTooLarge {
                length: data.len(),
                capacity: region.capacity,
            })?;

        let memory = self.memory.data_mut(store.as_context_mut());
        let memory_size = memory.len();
        let start = region.offset as usize;
        memory
            .get_mut(start..start + data.len())
            .ok_or(RegionError::DataOutOfBounds {
                offset: region.offset,
                length,
                memory_size,
            })?
            .copy_from_slice(data);

        region.length = length;
        let descriptor = pointer as usize;
        memory[descriptor..descriptor + REGION_SIZE].copy_from_slice(&region.to_bytes());
        Ok(())
    }

    /// Asks the guest for a new region and copies `data` into it, returning the region pointer.
    pub fn pass_buffer(
        &self,
        mut store: impl AsContextMut,
        data: &[u8],
    ) -> Result<u32, RegionError> {
        let length = u32::try_from(data.len()).map_err(|_| RegionError::DataTooLarge {
            length: data.len(),
            capacity: u32::MAX,
        })?;
        let pointer = self
            .allocate
            .call(&mut store, length)
            .map_err(|error| RegionError::Allocate {
                length: data.len(),
                error,
            })?;

        // The allocation may have grown the memory, so the descriptor is looked up afresh.
        self.write_to_region(&mut store, pointer, data)?;
        Ok(pointer)
    }

    /// Serializes `value` as JSON into a new guest region.
    pub fn pass_json(
        &self,
        store: impl AsContextMut,
        value: &impl Serialize,
    ) -> Result<u32, RegionError> {
        let bytes = serde_json::to_vec(value)?;
        self.pass_buffer(store, &bytes)
    }

    /// Returns the region at `pointer` to the guest, if it exports `deallocate`.
    pub fn release(&self, store: impl AsContextMut, pointer: u32) {
        if let Some(deallocate) = &self.deallocate {
            if let Err(error) = deallocate.call(store, pointer) {
                tracing::debug!(pointer, error = %error, "guest failed to deallocate a region");
            }
        }
    }
}
