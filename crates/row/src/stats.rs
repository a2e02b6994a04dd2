//! Per-field statistics carried by data files and manifest entries.
//!
//! Serialized layout (little-endian):
//!
//! ```text
//! [field_count: u16]
//! per field: [null_count: u64][has_min: u8][min datum?][has_max: u8][max datum?]
//! ```

use crate::datum::Datum;
use crate::row::Row;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

/// Min/max/null-count for one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldStats {
    pub min: Option<Datum>,
    pub max: Option<Datum>,
    pub null_count: u64,
}

impl FieldStats {
    /// Folds another stats record into this one (manifest-level
    /// aggregation across files).
    pub fn merge(&mut self, other: &FieldStats) {
        self.null_count += other.null_count;
        match (&self.min, &other.min) {
            (Some(a), Some(b)) if b < a => self.min = other.min.clone(),
            (None, Some(_)) => self.min = other.min.clone(),
            _ => {}
        }
        match (&self.max, &other.max) {
            (Some(a), Some(b)) if b > a => self.max = other.max.clone(),
            (None, Some(_)) => self.max = other.max.clone(),
            _ => {}
        }
    }
}

/// Accumulates [`FieldStats`] for every field of the rows it observes.
///
/// Created once per file write; `collect` is called for each row during
/// the single output pass so statistics never require a second scan.
#[derive(Debug)]
pub struct StatsCollector {
    stats: Vec<FieldStats>,
}

impl StatsCollector {
    /// Collector for rows of the given arity.
    #[must_use]
    pub fn new(arity: usize) -> Self {
        Self {
            stats: vec![FieldStats::default(); arity],
        }
    }

    /// Observes one row.
    pub fn collect(&mut self, row: &Row) {
        for (i, datum) in row.0.iter().enumerate() {
            if i >= self.stats.len() {
                break;
            }
            let s = &mut self.stats[i];
            if datum.is_null() {
                s.null_count += 1;
                continue;
            }
            match &s.min {
                Some(m) if datum >= m => {}
                _ => s.min = Some(datum.clone()),
            }
            match &s.max {
                Some(m) if datum <= m => {}
                _ => s.max = Some(datum.clone()),
            }
        }
    }

    /// Finishes collection.
    #[must_use]
    pub fn finish(self) -> Vec<FieldStats> {
        self.stats
    }
}

/// Serializes a stats vector to bytes.
pub fn write_stats(stats: &[FieldStats]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + stats.len() * 24);
    buf.write_u16::<LittleEndian>(stats.len() as u16)
        .expect("write to Vec cannot fail");
    for s in stats {
        write_one(&mut buf, s).expect("write to Vec cannot fail");
    }
    buf
}

fn write_one<W: Write>(w: &mut W, s: &FieldStats) -> io::Result<()> {
    w.write_u64::<LittleEndian>(s.null_count)?;
    match &s.min {
        Some(d) => {
            w.write_u8(1)?;
            d.write_to(w)?;
        }
        None => w.write_u8(0)?,
    }
    match &s.max {
        Some(d) => {
            w.write_u8(1)?;
            d.write_to(w)?;
        }
        None => w.write_u8(0)?,
    }
    Ok(())
}

/// Deserializes a stats vector written by [`write_stats`].
pub fn read_stats(bytes: &[u8]) -> io::Result<Vec<FieldStats>> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor.read_u16::<LittleEndian>()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_one(&mut cursor)?);
    }
    Ok(out)
}

fn read_one<R: Read>(r: &mut R) -> io::Result<FieldStats> {
    let null_count = r.read_u64::<LittleEndian>()?;
    let min = if r.read_u8()? == 1 {
        Some(Datum::read_from(r)?)
    } else {
        None
    };
    let max = if r.read_u8()? == 1 {
        Some(Datum::read_from(r)?)
    } else {
        None
    };
    Ok(FieldStats {
        min,
        max,
        null_count,
    })
}
