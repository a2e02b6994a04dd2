//! # SortBuffer — Two-Stage External Sorter
//!
//! Sorts an unbounded stream of change records with a bounded memory
//! budget. Used by the global-index bootstrap (sorting the whole existing
//! table by primary key) and by spillable write buffers.
//!
//! ## Stages
//!
//! ```text
//! add(record)
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │ IN-MEMORY PHASE                               │
//! │   Vec<(normalized key, record)>               │
//! │   sorted lazily with an unstable sort         │
//! │   (pdqsort: quicksort + insertion-sort base)  │
//! ├───────────────────────────────────────────────┤
//! │ EXTERNAL PHASE (memory budget exceeded)       │
//! │   sorted batch -> spill-<n>.run on disk       │
//! │   runs >= max fan-in -> intermediate merge    │
//! ├───────────────────────────────────────────────┤
//! │ sorted_iterator()                             │
//! │   loser tree over surviving runs + the        │
//! │   remaining in-memory tail                    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Spill runs use the length-prefixed, CRC32-checked record framing
//! (`[record_len: u32][crc32: u32][body]`, little-endian) so a truncated
//! or bit-flipped spill surfaces as [`SpillError::Corrupt`] instead of
//! producing silently wrong sort output.

mod buffer;
mod spill;

pub use buffer::{SortBuffer, SortedIterator};
pub use spill::{SpillError, SpillReader, SpillWriter};

#[cfg(test)]
mod tests;
