// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The private key-value storage of a contract instance.

use std::{collections::BTreeMap, ops::Bound};
use thiserror::Error;

/// The order in which a range of keys is iterated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Order {
    Ascending = 1,
    Descending = 2,
}

/// An order value passed by a contract that is neither ascending nor descending.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("invalid iteration order {0}")]
pub struct InvalidOrder(pub i32);

impl TryFrom<i32> for Order {
    type Error = InvalidOrder;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Order::Ascending),
            2 => Ok(Order::Descending),
            other => Err(InvalidOrder(other)),
        }
    }
}

/// An ordered map of raw byte keys to raw byte values.
///
/// Keys are compared byte-wise. A key mapped to an empty value is present, which is different from
/// an absent key.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContractStorage {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl ContractStorage {
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    /// Removes `key`. Removing an absent key does nothing.
    pub fn remove(&mut self, key: &[u8]) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collects the entries with keys in `[start, end)`, where missing bounds are unbounded.
    pub fn range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Vec::new();
            }
        }

        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);
        let entries = self
            .entries
            .range::<[u8], _>((lower, upper))
            .map(|(key, value)| (key.clone(), value.clone()));

        match order {
            Order::Ascending => entries.collect(),
            Order::Descending => entries.rev().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ContractStorage, InvalidOrder, Order};
    use test_case::test_case;

    fn storage() -> ContractStorage {
        let mut storage = ContractStorage::default();
        for key in [b"a", b"b", b"c", b"d"] {
            storage.set(key.to_vec(), key.to_ascii_uppercase());
        }
        storage
    }

    fn keys(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<Vec<u8>> {
        entries.into_iter().map(|(key, _)| key).collect()
    }

    #[test]
    fn empty_values_are_not_absent() {
        let mut storage = ContractStorage::default();
        storage.set(b"k".to_vec(), Vec::new());

        assert_eq!(storage.get(b"k"), Some(&[][..]));
        assert_eq!(storage.get(b"other"), None);

        storage.remove(b"k");
        storage.remove(b"k");
        assert!(storage.is_empty());
    }

    #[test]
    fn overwriting_keeps_a_single_entry() {
        let mut storage = ContractStorage::default();
        storage.set(b"k".to_vec(), b"1".to_vec());
        storage.set(b"k".to_vec(), b"2".to_vec());

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(b"k"), Some(&b"2"[..]));
    }

    #[test_case(None, None, Order::Ascending => vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]; "everything")]
    #[test_case(Some(b"b"), Some(b"d"), Order::Ascending => vec![b"b".to_vec(), b"c".to_vec()]; "end is exclusive")]
    #[test_case(Some(b"b"), None, Order::Descending => vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec()]; "descending")]
    #[test_case(Some(b"c"), Some(b"b"), Order::Ascending => Vec::<Vec<u8>>::new(); "inverted bounds")]
    #[test_case(Some(b"c"), Some(b"c"), Order::Descending => Vec::<Vec<u8>>::new(); "empty bounds")]
    fn ranges(start: Option<&[u8; 1]>, end: Option<&[u8; 1]>, order: Order) -> Vec<Vec<u8>> {
        keys(storage().range(
            start.map(|key| &key[..]),
            end.map(|key| &key[..]),
            order,
        ))
    }

    #[test]
    fn orders_are_parsed() {
        assert_eq!(Order::try_from(1), Ok(Order::Ascending));
        assert_eq!(Order::try_from(2), Ok(Order::Descending));
        assert_eq!(Order::try_from(0), Err(InvalidOrder(0)));
    }
}
