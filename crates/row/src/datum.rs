//! Typed scalar values and their tagged binary codec.
//!
//! Every datum is encoded as `[tag: u8][payload]`, little-endian, so a
//! serialized row can be decoded (and compared) without consulting the
//! schema. Variable-length payloads are `u32`-length-prefixed.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{self, Read, Write};

/// Upper bound on a single string/bytes payload read back from disk.
/// Prevents OOM on corrupt length prefixes.
const MAX_DATUM_BYTES: usize = 16 * 1024 * 1024;

/// Logical column types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Int,
    Long,
    Double,
    String,
    Bytes,
    /// Milliseconds since the Unix epoch.
    Timestamp,
}

/// A single typed value, nullable.
///
/// `Null` sorts before every non-null value; `Double` uses
/// [`f64::total_cmp`] so the ordering is total even in the presence of
/// NaN. Values of different types never appear in the same column, but a
/// deterministic cross-type order (by tag) is defined anyway so sorting
/// never panics on malformed input.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    TimestampMillis(i64),
}

impl Datum {
    /// Tag byte identifying the variant in the binary encoding.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int(_) => 2,
            Datum::Long(_) => 3,
            Datum::Double(_) => 4,
            Datum::Str(_) => 5,
            Datum::Bytes(_) => 6,
            Datum::TimestampMillis(_) => 7,
        }
    }

    /// Returns `true` for [`Datum::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Returns `true` if the value matches the given logical type
    /// (`Null` matches every type).
    #[must_use]
    pub fn fits(&self, ty: DataType) -> bool {
        matches!(
            (self, ty),
            (Datum::Null, _)
                | (Datum::Boolean(_), DataType::Boolean)
                | (Datum::Int(_), DataType::Int)
                | (Datum::Long(_), DataType::Long)
                | (Datum::Double(_), DataType::Double)
                | (Datum::Str(_), DataType::String)
                | (Datum::Bytes(_), DataType::Bytes)
                | (Datum::TimestampMillis(_), DataType::Timestamp)
        )
    }

    /// Serializes the datum as `[tag][payload]`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.tag())?;
        match self {
            Datum::Null => {}
            Datum::Boolean(b) => w.write_u8(u8::from(*b))?,
            Datum::Int(v) => w.write_i32::<LittleEndian>(*v)?,
            Datum::Long(v) | Datum::TimestampMillis(v) => w.write_i64::<LittleEndian>(*v)?,
            Datum::Double(v) => w.write_f64::<LittleEndian>(*v)?,
            Datum::Str(s) => {
                w.write_u32::<LittleEndian>(s.len() as u32)?;
                w.write_all(s.as_bytes())?;
            }
            Datum::Bytes(b) => {
                w.write_u32::<LittleEndian>(b.len() as u32)?;
                w.write_all(b)?;
            }
        }
        Ok(())
    }

    /// Deserializes a datum previously written by [`write_to`](Datum::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Datum> {
        let tag = r.read_u8()?;
        let datum = match tag {
            0 => Datum::Null,
            1 => Datum::Boolean(r.read_u8()? != 0),
            2 => Datum::Int(r.read_i32::<LittleEndian>()?),
            3 => Datum::Long(r.read_i64::<LittleEndian>()?),
            4 => Datum::Double(r.read_f64::<LittleEndian>()?),
            5 => {
                let bytes = read_len_prefixed(r)?;
                Datum::Str(String::from_utf8(bytes).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "datum string is not utf-8")
                })?)
            }
            6 => Datum::Bytes(read_len_prefixed(r)?),
            7 => Datum::TimestampMillis(r.read_i64::<LittleEndian>()?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown datum tag: {other}"),
                ))
            }
        };
        Ok(datum)
    }

    /// Appends an **order-preserving** encoding of this datum to `out`.
    ///
    /// Used only for the normalized-key prefix: a presence byte (nulls
    /// first), then big-endian with the sign bit flipped for integers,
    /// the IEEE total-order transform for doubles, raw bytes for
    /// strings/bytes.
    pub(crate) fn write_normalized(&self, out: &mut Vec<u8>) {
        match self {
            Datum::Null => out.push(0),
            other => {
                out.push(1);
                match other {
                    Datum::Null => unreachable!(),
                    Datum::Boolean(b) => out.push(u8::from(*b)),
                    Datum::Int(v) => {
                        out.extend_from_slice(&((*v as u32) ^ 0x8000_0000).to_be_bytes())
                    }
                    Datum::Long(v) | Datum::TimestampMillis(v) => {
                        out.extend_from_slice(&((*v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes())
                    }
                    Datum::Double(v) => {
                        let bits = v.to_bits();
                        let ordered = if bits & 0x8000_0000_0000_0000 != 0 {
                            !bits
                        } else {
                            bits | 0x8000_0000_0000_0000
                        };
                        out.extend_from_slice(&ordered.to_be_bytes());
                    }
                    Datum::Str(s) => out.extend_from_slice(s.as_bytes()),
                    Datum::Bytes(b) => out.extend_from_slice(b),
                }
            }
        }
    }

    /// `true` if the normalized encoding has a fixed width, so further
    /// fields may safely be appended after it in the prefix.
    pub(crate) fn normalized_fixed_width(&self) -> bool {
        !matches!(self, Datum::Str(_) | Datum::Bytes(_))
    }
}

fn read_len_prefixed<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_DATUM_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("datum payload of {len} bytes exceeds maximum {MAX_DATUM_BYTES}"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

impl Eq for Datum {}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    fn cmp(&self, other: &Self) -> Ordering {
        use Datum::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Long(a), Long(b)) => a.cmp(b),
            (Double(a), Double(b)) => a.total_cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (TimestampMillis(a), TimestampMillis(b)) => a.cmp(b),
            // Mixed types only occur on malformed input; order by tag.
            (a, b) => a.tag().cmp(&b.tag()),
        }
    }
}
