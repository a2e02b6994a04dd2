//! # DataFile — Immutable Sorted-Run Files
//!
//! On-disk storage for the TideLake merge tree. When a write buffer is
//! flushed, or a compaction merges sorted runs, the records are written as
//! a data file. Data files are *write-once, read-many* — once published
//! they are only ever superseded, never modified — and are consumed
//! strictly sequentially by merges and scans (point lookups live in the
//! global-index store, which has its own keyed format).
//!
//! ## File layout (v1 – current)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (records in ascending (key, seq) order)          │
//! │                                                               │
//! │ crc32 (u32) | key_len (u32) | key | seq (u64) | kind (u8)     │
//! │ val_len (u32) | value                                         │
//! │                                                               │
//! │ ... repeated for each record ...                              │
//! │                                                               │
//! │ The CRC32 covers everything after itself in the record        │
//! │ (key_len through end of value), detecting silent disk         │
//! │ corruption on reads.                                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 28 bytes)                                 │
//! │                                                               │
//! │ min_seq (u64) | max_seq (u64) | row_count (u64)               │
//! │ magic (u32 "TLD1")                                            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Writes are crash-safe: data goes to a
//! `.tmp` sibling, is fsynced, and is atomically renamed into place; a
//! file that is not referenced by a committed snapshot is garbage.
//!
//! Per-file metadata that the manifest layer carries — min/max key,
//! per-field key and value statistics, level, schema id — is computed
//! during the single write pass and returned as a [`DataFileMeta`]; it is
//! not stored in the file itself, so the planner never opens data files.

mod concat;
mod format;
mod meta;
mod reader;
mod writer;

pub use concat::ConcatIterator;
pub use format::{read_footer, write_footer, Footer, DATA_FILE_MAGIC, FOOTER_BYTES};
pub use meta::{changelog_file_name, new_data_file_name, DataFileMeta, DATA_FILE_EXTENSION};
pub use reader::{DataFileIterator, DataFileReader};
pub use writer::DataFileWriter;

use thiserror::Error;

/// Errors raised by the data file layer.
#[derive(Debug, Error)]
pub enum DataFileError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file's framing, checksums or footer are invalid.
    #[error("corrupt data file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// A writer was finished without any records.
    #[error("refusing to write an empty data file at {0}")]
    Empty(String),
}

impl DataFileError {
    pub(crate) fn corrupt(path: &std::path::Path, reason: impl Into<String>) -> Self {
        DataFileError::Corrupt {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests;
