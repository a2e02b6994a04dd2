//! Rows and the compact binary row codec.
//!
//! A [`Row`] is a positional vector of datums. A [`BinaryRow`] is its
//! serialized form: `[field_count: u16 LE]` followed by one tagged datum
//! per field. Binary rows are the wire currency for keys and partition
//! payloads — they are hashable, cheap to clone, and compared **typed**
//! via [`compare_binary_rows`] rather than bytewise.

use crate::datum::Datum;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Cursor, Read, Write};

/// Width of the normalized key prefix in bytes.
pub const NORMALIZED_KEY_BYTES: usize = 8;

/// Order-preserving fixed-width prefix of a binary key.
///
/// If `normalized(a) < normalized(b)` then `a < b` under the full typed
/// comparison; equal prefixes decide nothing and require the full decode.
pub type NormalizedKey = [u8; NORMALIZED_KEY_BYTES];

/// Guard against corrupt field counts when decoding rows from disk.
const MAX_ROW_FIELDS: usize = 4096;

/// A positional, typed row of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row(pub Vec<Datum>);

impl Row {
    /// Creates a row from its fields.
    #[must_use]
    pub fn new(fields: Vec<Datum>) -> Self {
        Row(fields)
    }

    /// An empty row — the partition payload of an unpartitioned table.
    #[must_use]
    pub fn empty() -> Self {
        Row(Vec::new())
    }

    /// Number of fields.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Borrow a field by position.
    #[must_use]
    pub fn field(&self, i: usize) -> &Datum {
        &self.0[i]
    }

    /// Projects the row onto the given field positions (in order).
    #[must_use]
    pub fn project(&self, positions: &[usize]) -> Row {
        Row(positions.iter().map(|&i| self.0[i].clone()).collect())
    }

    /// Serializes this row into a fresh [`BinaryRow`].
    #[must_use]
    pub fn to_binary(&self) -> BinaryRow {
        BinaryRow::from_row(self)
    }
}

/// A serialized [`Row`]: the engine's key and partition payload format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryRow(Vec<u8>);

impl BinaryRow {
    /// Serializes `row` with the tagged datum codec.
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        let mut buf = Vec::with_capacity(2 + row.arity() * 9);
        buf.write_u16::<LittleEndian>(row.arity() as u16)
            .expect("write to Vec cannot fail");
        for datum in &row.0 {
            datum
                .write_to(&mut buf)
                .expect("write to Vec cannot fail");
        }
        BinaryRow(buf)
    }

    /// Wraps already-encoded bytes (e.g. read back from a manifest).
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        BinaryRow(bytes)
    }

    /// The serialized payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Serialized length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` for the empty (zero-field) row encoding or empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.len() <= 2
    }

    /// Decodes back into a typed [`Row`].
    pub fn to_row(&self) -> io::Result<Row> {
        let mut cursor = Cursor::new(&self.0);
        let arity = cursor.read_u16::<LittleEndian>()? as usize;
        if arity > MAX_ROW_FIELDS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("row field count {arity} exceeds maximum {MAX_ROW_FIELDS}"),
            ));
        }
        let mut fields = Vec::with_capacity(arity);
        for _ in 0..arity {
            fields.push(Datum::read_from(&mut cursor)?);
        }
        Ok(Row(fields))
    }

    /// Reads one length-prefixed binary row from `r`.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<BinaryRow> {
        let len = r.read_u32::<LittleEndian>()? as usize;
        if len > 64 * 1024 * 1024 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "binary row length exceeds 64 MiB",
            ));
        }
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf)?;
        Ok(BinaryRow(buf))
    }

    /// Writes this row length-prefixed to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.0.len() as u32)?;
        w.write_all(&self.0)
    }

    /// Computes the order-preserving [`NormalizedKey`] prefix.
    ///
    /// Fields are appended in order using their memcomparable encodings.
    /// After the first variable-width field no further fields are added
    /// (their bytes would not be position-aligned across keys); the
    /// remainder is zero-padded.
    #[must_use]
    pub fn normalized_key(&self) -> NormalizedKey {
        let mut buf = Vec::with_capacity(NORMALIZED_KEY_BYTES + 9);
        if let Ok(row) = self.to_row() {
            for datum in &row.0 {
                datum.write_normalized(&mut buf);
                if buf.len() >= NORMALIZED_KEY_BYTES || !datum.normalized_fixed_width() {
                    break;
                }
            }
        }
        let mut key = [0u8; NORMALIZED_KEY_BYTES];
        let n = buf.len().min(NORMALIZED_KEY_BYTES);
        key[..n].copy_from_slice(&buf[..n]);
        key
    }
}

impl fmt::Display for BinaryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_row() {
            Ok(row) => write!(f, "{:?}", row.0),
            Err(_) => write!(f, "<corrupt row: {} bytes>", self.0.len()),
        }
    }
}

/// Typed comparison of two serialized rows.
///
/// Walks both encodings datum by datum. Keys are engine-generated, so a
/// decode failure indicates corruption; in that case the raw bytes decide
/// deterministically rather than panicking mid-merge.
#[must_use]
pub fn compare_binary_rows(a: &BinaryRow, b: &BinaryRow) -> Ordering {
    if a.0 == b.0 {
        return Ordering::Equal;
    }
    match (a.to_row(), b.to_row()) {
        (Ok(ra), Ok(rb)) => {
            for (da, db) in ra.0.iter().zip(rb.0.iter()) {
                let ord = da.cmp(db);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            ra.arity().cmp(&rb.arity())
        }
        _ => a.0.cmp(&b.0),
    }
}

impl PartialOrd for BinaryRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BinaryRow {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_binary_rows(self, other)
    }
}
