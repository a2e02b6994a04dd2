//! # Index — Global Primary-Key Index
//!
//! Enforces primary-key uniqueness **across partitions** for tables whose
//! primary key does not cover the partition key. Sits between the bucket
//! channel partitioner and the per-bucket writers, rewriting each record's
//! effective (partition, bucket) and emitting a paired retraction when a
//! key migrates partitions.
//!
//! ## Steady state
//!
//! ```text
//! record (pk, partition, row)
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ GlobalIndexAssigner (one per shard)           │
//! │                                               │
//! │ pk in store?                                  │
//! │   no  -> assign bucket, store pk -> (pid, b)  │
//! │   yes, same partition -> reuse stored bucket  │
//! │   yes, other partition -> ExistsAction:       │
//! │     Delete  : retract old location, reinsert  │
//! │     UseOld  : rewrite record to old location  │
//! │     SkipNew : drop the record                 │
//! └───────────────────────────────────────────────┘
//!   |
//!   v
//! routed records (0, 1 or 2 per input)
//! ```
//!
//! ## Sharding
//!
//! With `M` assigner shards, shard `s` owns bucket `b` iff
//! `|b| mod M == s`. Bucket assignment only ever picks owned buckets, so
//! the shards' stores are disjoint and need no coordination.
//!
//! ## Bootstrap
//!
//! Before consuming live input a shard scans the existing table,
//! external-sorts `(pk, seq)` and bulk-loads the newest location per key;
//! see [`Bootstrap`].

mod assign;
mod bootstrap;
mod idmapping;
mod routing;

pub use assign::BucketAssigner;
pub use bootstrap::{Bootstrap, BootstrapRecord};
pub use idmapping::IdMapping;
pub use routing::{ExistsAction, GlobalIndexAssigner, RoutedRecord};

use thiserror::Error;

/// Errors raised by the global index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedded KV store failed.
    #[error(transparent)]
    Store(#[from] indexkv::IndexKvError),

    /// A stored index value could not be decoded.
    #[error("corrupt index entry for key {key}")]
    CorruptEntry { key: String },

    /// Bootstrap found two live rows for one primary key in different
    /// partitions and the configured merge engine has no resolution
    /// policy.
    #[error(
        "primary key {key} has live rows in partitions {first} and {second}; \
         merge engine '{engine}' cannot resolve cross-partition duplicates"
    )]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
        engine: String,
    },

    /// External sort failure during bootstrap.
    #[error("bootstrap sort failed: {0}")]
    Sort(#[from] anyhow::Error),
}
