//! # Memtable
//!
//! An in-memory, sorted, multi-version write buffer for the TideLake
//! merge-tree writer.
//!
//! The memtable is the first point of contact for every change record of
//! one (partition, bucket). Unlike a plain key-value buffer it never
//! collapses versions on insertion: every `(key, seq)` pair is retained,
//! because the configured merge function must observe **all** versions of
//! a key when the buffer is flushed or queried.
//!
//! ## Key properties
//! - **Sorted order**: entries are always in ascending (key, seq) order,
//!   which is exactly the order the flush path and the loser-tree merge
//!   expect.
//! - **Normalized-key fast path**: the map key leads with an 8-byte
//!   order-preserving prefix so most comparisons never decode the full
//!   binary key.
//! - **Approximate size tracking**: key + value bytes are counted so the
//!   writer can decide when to flush or spill.

use row::{BinaryRow, KeyValue, KvIterator, NormalizedKey, Row, RowKind};
use std::collections::BTreeMap;

/// Composite map key: normalized prefix first, full binary key second,
/// sequence last. `BinaryRow`'s `Ord` is the typed comparison, so equal
/// prefixes fall back to the correct full-key order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MemKey {
    norm: NormalizedKey,
    key: BinaryRow,
    seq: u64,
}

/// An ordered, multi-version, in-memory change buffer.
#[derive(Debug, Default)]
pub struct Memtable {
    map: BTreeMap<MemKey, (RowKind, Row)>,
    approx_size: usize,
}

impl Memtable {
    /// Creates a new, empty memtable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            approx_size: 0,
        }
    }

    /// Inserts a change record.
    ///
    /// Every `(key, seq)` version is kept. Writing the same `(key, seq)`
    /// twice replaces the previous payload — that only happens when a
    /// caller re-delivers a record, and the last delivery wins.
    pub fn insert(&mut self, kv: KeyValue) {
        self.approx_size += kv.approx_size();
        let mem_key = MemKey {
            norm: kv.key.normalized_key(),
            key: kv.key,
            seq: kv.seq,
        };
        // Size of a replaced payload is intentionally not reclaimed; the
        // estimate resets at the next flush anyway.
        self.map.insert(mem_key, (kv.kind, kv.value));
    }

    /// Number of buffered records (all versions).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` if the memtable contains zero records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Approximate byte size of all buffered keys and values.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Iterates all records in ascending (key, seq) order.
    pub fn iter(&self) -> impl Iterator<Item = KeyValue> + '_ {
        self.map
            .iter()
            .map(|(k, (kind, value))| KeyValue::new(k.key.clone(), k.seq, *kind, value.clone()))
    }

    /// Drains the memtable into a sorted record vector, resetting the
    /// buffer while reusing its allocation.
    pub fn drain(&mut self) -> Vec<KeyValue> {
        let map = std::mem::take(&mut self.map);
        self.approx_size = 0;
        map.into_iter()
            .map(|(k, (kind, value))| KeyValue::new(k.key, k.seq, kind, value))
            .collect()
    }

    /// Removes all entries and resets the size accounting.
    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
    }

    /// Consumes the memtable into a [`KvIterator`] over its records.
    #[must_use]
    pub fn into_iterator(mut self) -> MemtableIterator {
        MemtableIterator {
            records: self.drain().into_iter(),
        }
    }
}

/// Owning iterator over a drained memtable, in (key, seq) order.
pub struct MemtableIterator {
    records: std::vec::IntoIter<KeyValue>,
}

impl KvIterator for MemtableIterator {
    fn advance(&mut self) -> anyhow::Result<Option<KeyValue>> {
        Ok(self.records.next())
    }
}

#[cfg(test)]
mod tests;
