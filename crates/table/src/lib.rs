//! # Table — TideLake Orchestration
//!
//! The top of the write path: a [`Table`] ties the schema, options,
//! snapshot tree, per-bucket merge-tree writers, the global index and
//! the scan planner together.
//!
//! ```text
//! change records
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ TableWrite                                    │
//! │   partition extraction                        │
//! │   bucket routing                              │
//! │     static: hash(bucket key) % B              │
//! │     dynamic: global index assigner            │
//! │   per-(partition, bucket) MergeTreeWriter     │
//! └───────────────────────────────────────────────┘
//!   | prepare_commit -> Vec<CommitMessage>
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ TableCommit                                   │
//! │   delta + changelog manifests                 │
//! │   APPEND snapshot, then COMPACT snapshot      │
//! │   rebase-and-retry on conflicts               │
//! └───────────────────────────────────────────────┘
//!   |
//!   v
//! snapshot-<n>  ──  TableRead (plan -> merge -> rows)
//! ```
//!
//! ## On-disk layout
//!
//! ```text
//! <table-root>/
//!   snapshot/snapshot-<id>, LATEST, EARLIEST
//!   manifest/manifest-<uuid>, manifest-list-<uuid>
//!   bucket-<b>/<partition-path>/data-<uuid>.tld
//!   schema/schema-<id>
//!   index/shard-<s>/            (global index working set)
//! ```

mod commit;
mod paths;
mod read;
mod schemas;
mod table;
mod write;

pub use commit::{CommitMessage, TableCommit};
pub use read::TableRead;
pub use table::Table;
pub use write::TableWrite;

use thiserror::Error;

/// Table-level failures that are not plain I/O.
#[derive(Debug, Error)]
pub enum TableError {
    /// The commit retry budget was exhausted.
    #[error(
        "commit abandoned after {attempts} attempts; \
         latest conflicting snapshot was {conflicting_snapshot}"
    )]
    CommitRetriesExhausted {
        attempts: usize,
        conflicting_snapshot: u64,
    },

    /// The table already exists (on create) or is missing (on open).
    #[error("{0}")]
    Layout(String),

    /// Unsupported configuration for this build of the engine.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests;
