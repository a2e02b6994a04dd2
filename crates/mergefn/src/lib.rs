//! # MergeFn — CDC Merge Functions
//!
//! The per-key reducers applied during compaction and merge-on-read.
//! A merge observes **all versions of one key in ascending sequence
//! order** (the loser tree guarantees this) and reduces them to at most
//! one logical record.
//!
//! | Engine | Behaviour |
//! |---|---|
//! | [`DeduplicateMerge`] | Highest sequence wins; `-D` beats `+I` at equal sequence. |
//! | [`PartialUpdateMerge`] | Folds non-null fields; per-field sequence groups gate updates. |
//! | [`FirstRowMerge`] | Earliest record wins; later versions are dropped. |
//! | [`AggregateMerge`] | Per-field aggregators folded over the version sequence. |
//!
//! Each engine exposes `reset` / `add` / `get_result` through the
//! [`Merger`] trait; [`MergeFunction`] is the closed variant the rest of
//! the engine passes around. [`MergeReader`] drives a sorted record
//! stream through a merge function, emitting one record per key.

mod functions;
mod reader;

pub use functions::{
    AggregateMerge, AggregateOp, DeduplicateMerge, FirstRowMerge, MergeFunction, Merger,
    PartialUpdateMerge, SequenceGroup,
};
pub use reader::MergeReader;

use thiserror::Error;

/// Errors raised while merging record versions.
#[derive(Debug, Error)]
pub enum MergeError {
    /// `partial-update` received a retraction and `ignore-delete` is off.
    #[error(
        "partial-update cannot handle {kind} records; \
         set 'partial-update.ignore-delete' to drop them"
    )]
    PartialUpdateRetract { kind: String },

    /// `aggregate` received a retraction; aggregators cannot subtract.
    #[error("aggregate merge does not support {kind} records")]
    AggregateRetract { kind: String },

    /// An aggregator was applied to a value it cannot fold.
    #[error("aggregate function {op:?} cannot fold {value}")]
    BadAggregate { op: String, value: String },
}
