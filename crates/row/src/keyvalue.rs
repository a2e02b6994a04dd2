//! The unit record flowing through the write path.

use crate::kind::RowKind;
use crate::row::{BinaryRow, Row};

/// One change record: a trimmed primary key, a sequence number, a change
/// kind, and the full row payload.
///
/// Sequence numbers are strictly increasing per key within one
/// (partition, bucket); merges order by (key ascending, seq ascending) so
/// the highest sequence is always the last version a merge function sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: BinaryRow,
    pub seq: u64,
    pub kind: RowKind,
    pub value: Row,
}

impl KeyValue {
    /// Creates a record.
    #[must_use]
    pub fn new(key: BinaryRow, seq: u64, kind: RowKind, value: Row) -> Self {
        Self {
            key,
            seq,
            kind,
            value,
        }
    }

    /// Byte size estimate used for buffer accounting: key + an encoded
    /// value-row approximation + the fixed header.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        // 8 (seq) + 1 (kind) + 2 (arity) + ~9 bytes per datum header/payload
        // for fixed-width fields; variable fields add their lengths below.
        let mut size = self.key.len() + 8 + 1 + 2 + self.value.arity() * 9;
        for datum in &self.value.0 {
            match datum {
                crate::Datum::Str(s) => size += s.len(),
                crate::Datum::Bytes(b) => size += b.len(),
                _ => {}
            }
        }
        size
    }
}
