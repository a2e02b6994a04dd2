//! # MergeTree — Per-(Partition, Bucket) LSM Writer
//!
//! The write engine of one bucket: buffer change records in memory, flush
//! level-0 files, and keep the sorted-run count bounded with background
//! universal compaction.
//!
//! ## Architecture
//!
//! ```text
//! write(key, kind, value)
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │              MERGE-TREE WRITER                │
//! │                                               │
//! │ buffer (memtable | spillable sorter)          │
//! │    |                                          │
//! │    |  (buffer full / prepare_commit)          │
//! │    v                                          │
//! │ flush -> one level-0 file (+ changelog file)  │
//! │    |                                          │
//! │    |  (sorted runs >= compaction-trigger)     │
//! │    v                                          │
//! │ CompactRequest ──channel──> worker thread     │
//! │                                |              │
//! │ levels <──channel── CompactOutcome            │
//! │                                               │
//! │ (sorted runs >= stop-trigger: write stalls    │
//! │  until the worker returns)                    │
//! └───────────────────────────────────────────────┘
//!   |
//!   v
//! prepare_commit -> CommitIncrement { adds, deletes, changelog }
//! ```
//!
//! The writer and its compaction worker share **no** mutable state: the
//! writer sends file lists over a channel, the worker merges them through
//! the configured merge function and sends back the before/after file
//! sets, which the writer folds into its levels on the next poll. A
//! failed compaction is logged and its inputs stay in place; the next
//! cycle retries.

mod compact;
mod levels;
mod worker;
mod writer;

pub use compact::{CompactUnit, UniversalCompaction};
pub use levels::{Levels, SortedRun};
pub use worker::{CompactOutcome, CompactionWorker};
pub use writer::{CommitIncrement, MergeTreeWriter, WriterOptions};

use thiserror::Error;

/// Errors raised by the merge-tree writer.
#[derive(Debug, Error)]
pub enum MergeTreeError {
    /// The in-memory buffer cannot accept the record right now. Internal
    /// and transient: the writer resolves it by flushing or spilling
    /// before surfacing anything to the caller.
    #[error("write buffer full")]
    BufferFull,

    /// A data file operation failed.
    #[error(transparent)]
    File(#[from] datafile::DataFileError),

    /// Anything from the merge / sort iterator stack below (including
    /// merge-function rejections and spill failures).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
