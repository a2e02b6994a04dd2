//! Per-file metadata carried by manifest entries.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use row::{read_stats, write_stats, BinaryRow, FieldStats};
use std::io::{self, Read, Write};
use uuid::Uuid;

/// Extension of data and changelog files.
pub const DATA_FILE_EXTENSION: &str = "tld";

/// Generates a fresh data file name: `data-<uuid>.tld`.
#[must_use]
pub fn new_data_file_name() -> String {
    format!("data-{}.{}", Uuid::new_v4(), DATA_FILE_EXTENSION)
}

/// Generates a fresh changelog file name: `changelog-<uuid>.tld`.
#[must_use]
pub fn changelog_file_name() -> String {
    format!("changelog-{}.{}", Uuid::new_v4(), DATA_FILE_EXTENSION)
}

/// Metadata describing one immutable data file.
///
/// Produced by the writer during its single output pass and recorded in
/// manifest entries; everything the scan planner and compaction picker
/// need without opening the file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFileMeta {
    pub file_name: String,
    pub file_size: u64,
    pub row_count: u64,
    pub min_key: BinaryRow,
    pub max_key: BinaryRow,
    pub key_stats: Vec<FieldStats>,
    pub value_stats: Vec<FieldStats>,
    pub min_seq: u64,
    pub max_seq: u64,
    pub schema_id: u64,
    pub level: u32,
    pub extra_files: Vec<String>,
    /// Creation time, milliseconds since the Unix epoch.
    pub creation_time: i64,
}

impl DataFileMeta {
    /// Serializes this meta (little-endian, length-prefixed fields).
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_string(w, &self.file_name)?;
        w.write_u64::<LittleEndian>(self.file_size)?;
        w.write_u64::<LittleEndian>(self.row_count)?;
        self.min_key.write_to(w)?;
        self.max_key.write_to(w)?;
        write_bytes(w, &write_stats(&self.key_stats))?;
        write_bytes(w, &write_stats(&self.value_stats))?;
        w.write_u64::<LittleEndian>(self.min_seq)?;
        w.write_u64::<LittleEndian>(self.max_seq)?;
        w.write_u64::<LittleEndian>(self.schema_id)?;
        w.write_u32::<LittleEndian>(self.level)?;
        w.write_u32::<LittleEndian>(self.extra_files.len() as u32)?;
        for extra in &self.extra_files {
            write_string(w, extra)?;
        }
        w.write_i64::<LittleEndian>(self.creation_time)?;
        Ok(())
    }

    /// Deserializes a meta written by [`write_to`](DataFileMeta::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<DataFileMeta> {
        let file_name = read_string(r)?;
        let file_size = r.read_u64::<LittleEndian>()?;
        let row_count = r.read_u64::<LittleEndian>()?;
        let min_key = BinaryRow::read_from(r)?;
        let max_key = BinaryRow::read_from(r)?;
        let key_stats = read_stats(&read_bytes(r)?)?;
        let value_stats = read_stats(&read_bytes(r)?)?;
        let min_seq = r.read_u64::<LittleEndian>()?;
        let max_seq = r.read_u64::<LittleEndian>()?;
        let schema_id = r.read_u64::<LittleEndian>()?;
        let level = r.read_u32::<LittleEndian>()?;
        let extra_count = r.read_u32::<LittleEndian>()? as usize;
        if extra_count > 1024 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "extra file count exceeds maximum",
            ));
        }
        let mut extra_files = Vec::with_capacity(extra_count);
        for _ in 0..extra_count {
            extra_files.push(read_string(r)?);
        }
        let creation_time = r.read_i64::<LittleEndian>()?;
        Ok(DataFileMeta {
            file_name,
            file_size,
            row_count,
            min_key,
            max_key,
            key_stats,
            value_stats,
            min_seq,
            max_seq,
            schema_id,
            level,
            extra_files,
            creation_time,
        })
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_bytes(w, s.as_bytes())
}

fn write_bytes<W: Write>(w: &mut W, b: &[u8]) -> io::Result<()> {
    w.write_u32::<LittleEndian>(b.len() as u32)?;
    w.write_all(b)
}

fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string is not utf-8"))
}

fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > 64 * 1024 * 1024 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "length prefix exceeds 64 MiB",
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
