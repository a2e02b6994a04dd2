//! # IndexKv — Embedded Ordered Key-Value Store
//!
//! The on-disk store backing the TideLake global primary-key index. Each
//! assigner shard owns one store mapping a trimmed primary key to a small
//! payload (partition id + bucket), with optional TTL.
//!
//! ## Architecture
//!
//! ```text
//! put / delete
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ MEMTABLE  BTreeMap<key, (ts, value | ⊥)>      │
//! │    |                                          │
//! │    | (threshold exceeded?)                    │
//! │    v            yes                           │
//! │ flush() → new run file (newest first)         │
//! │    |                                          │
//! │    | (run count >= trigger?)                  │
//! │    v            yes                           │
//! │ compact() → single merged run                 │
//! │                                               │
//! │ get() → memtable → runs newest → oldest       │
//! │          (first match wins; bloom-gated)      │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Lookups hit the bloom filter of each run first; a negative answer
//! skips the run entirely, which is the common case in steady state when
//! most incoming keys are new.
//!
//! ## Durability
//!
//! None, on purpose. The source of truth is the table itself: the index
//! is rebuilt by a bootstrap scan on startup, so [`IndexStore::open`]
//! clears any leftover run files. Runs exist to let the index exceed
//! memory, not to survive restarts.

mod run;
mod store;

pub use run::{RunEntry, RunReader, RunWriter};
pub use store::IndexStore;

use thiserror::Error;

/// Errors raised by the index store.
#[derive(Debug, Error)]
pub enum IndexKvError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A run file's framing, checksum or footer is invalid.
    #[error("corrupt index run {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl IndexKvError {
    pub(crate) fn corrupt(path: &std::path::Path, reason: impl Into<String>) -> Self {
        IndexKvError::Corrupt {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}
