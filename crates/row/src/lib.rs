//! # Row — TideLake Data Model
//!
//! Core value types shared by every layer of the TideLake table engine:
//! typed datums, rows, the compact binary row codec, schemas, change-record
//! kinds, field statistics, predicates, and the loser-tree k-way merge.
//!
//! ## Value pipeline
//!
//! ```text
//! CDC record
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ KeyValue { key, seq, kind, value }            │
//! │                                               │
//! │   key   : BinaryRow   (primary key, trimmed)  │
//! │   seq   : u64         (monotonic per key)     │
//! │   kind  : RowKind     (+I / -U / +U / -D)     │
//! │   value : Row         (full typed row)        │
//! └───────────────────────────────────────────────┘
//!   |
//!   v
//! sorted by (normalized key prefix, key, seq)
//! ```
//!
//! ## Ordering
//!
//! [`BinaryRow`] keys are compared **typed**: the tagged binary encoding is
//! walked datum by datum, so integer keys compare numerically rather than
//! bytewise. An order-preserving 8-byte [`NormalizedKey`] prefix gives the
//! hot path a cache-friendly first comparison; only equal prefixes fall
//! back to the full decode.
//!
//! ## Merging
//!
//! [`LoserTree`] merges k sorted [`KvIterator`] sources in O(log k) per
//! record, ordered by (key ascending, sequence ascending), so downstream
//! merge functions observe every version of a key consecutively.

mod datum;
mod iterator;
mod keyvalue;
mod kind;
mod losertree;
mod predicate;
mod row;
mod schema;
mod stats;

pub use datum::{DataType, Datum};
pub use iterator::{KvIterator, VecIterator};
pub use keyvalue::KeyValue;
pub use kind::RowKind;
pub use losertree::LoserTree;
pub use predicate::Predicate;
pub use row::{compare_binary_rows, BinaryRow, NormalizedKey, Row, NORMALIZED_KEY_BYTES};
pub use schema::{Field, Schema, SchemaError};
pub use stats::{read_stats, write_stats, FieldStats, StatsCollector};

#[cfg(test)]
mod tests;
