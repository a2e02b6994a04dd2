//! # Manifest — Metadata Tree & Scan Planning
//!
//! Immutable metadata describing which data files belong to which
//! (partition, bucket, level), organised as a tree of snapshots:
//!
//! ```text
//! snapshot/LATEST ──> snapshot-<id>           (JSON descriptor)
//!                        │
//!            ┌───────────┼──────────────┐
//!            v           v              v
//!      base list     delta list   changelog list    (manifest-list-<uuid>)
//!            │           │              │
//!            v           v              v
//!      manifest-<uuid> files                        (binary entry files)
//!            │
//!            v
//!      ManifestEntry { ADD | DELETE, partition, bucket, file meta }
//! ```
//!
//! Every file in the tree is immutable after publication; a commit only
//! ever adds files and atomically publishes a new snapshot descriptor.
//! Concurrent readers therefore need no synchronisation, and a loser of
//! a commit race leaves only orphans behind.
//!
//! The scan planner resolves a snapshot plus filters into the set of
//! live data files, with partition / bucket / level / statistics
//! pushdown applied while manifests are read in parallel.

mod entry;
mod list;
mod manifestfile;
mod planner;
mod snapshot;
mod snapshotmgr;

pub use entry::{FileKind, ManifestEntry};
pub use list::{read_manifest_list, write_manifest_list};
pub use manifestfile::{
    fold_manifests, read_manifest_file, write_manifest_files, ManifestFileMeta,
};
pub use planner::{ScanKind, ScanPlanner};
pub use snapshot::{CommitKind, Snapshot, SNAPSHOT_FORMAT_VERSION};
pub use snapshotmgr::{CommitResult, SnapshotManager};

use thiserror::Error;

/// Errors raised by the manifest layer.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest file, list or snapshot descriptor is malformed.
    #[error("corrupt manifest {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// A retained manifest entry was written under a different bucket
    /// count; the table must be rescaled with a full overwrite.
    #[error(
        "bucket count mismatch: file {file} was written with {actual} total buckets, \
         current table has {expected}"
    )]
    BucketCountMismatch {
        file: String,
        actual: i32,
        expected: i32,
    },

    /// The referenced snapshot does not exist.
    #[error("snapshot {0} not found")]
    SnapshotNotFound(u64),
}

impl ManifestError {
    pub(crate) fn corrupt(path: &std::path::Path, reason: impl Into<String>) -> Self {
        ManifestError::Corrupt {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests;
