//! Spill run files: sequential, CRC-checked record framing.
//!
//! ## Binary record format
//!
//! ```text
//! [record_len: u32 LE][crc32: u32 LE][body ...]
//! ```
//!
//! Body: `[key: len-prefixed BinaryRow][seq: u64][kind: u8]
//! [value: len-prefixed BinaryRow]`. `record_len` counts the body only;
//! the CRC32 covers the body bytes.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use row::{BinaryRow, KeyValue, KvIterator, RowKind};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Upper bound on one spill record body. Guards allocation on corrupt
/// length prefixes.
const MAX_RECORD_BYTES: usize = 128 * 1024 * 1024;

/// Errors surfaced by the spill codec.
#[derive(Debug, Error)]
pub enum SpillError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or had a malformed body.
    #[error("corrupt spill record")]
    Corrupt,
}

/// Append-only writer for one spill run.
///
/// Records are serialized into a reusable scratch buffer, checksummed and
/// written with a single `write_all`. Spill runs are private temporaries:
/// they are never renamed into place and never survive the sorter that
/// wrote them, so no fsync discipline applies.
pub struct SpillWriter {
    file: BufWriter<File>,
    buf: Vec<u8>,
    records: u64,
}

impl SpillWriter {
    /// Creates (truncating) a spill run at `path`.
    pub fn create(path: &Path) -> Result<Self, SpillError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
            buf: Vec::with_capacity(256),
            records: 0,
        })
    }

    /// Appends one record.
    pub fn append(&mut self, kv: &KeyValue) -> Result<(), SpillError> {
        self.buf.clear();
        kv.key.write_to(&mut self.buf)?;
        self.buf.write_u64::<LittleEndian>(kv.seq)?;
        self.buf.write_u8(kv.kind.to_byte())?;
        kv.value.to_binary().write_to(&mut self.buf)?;

        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        let crc = hasher.finalize();

        self.file.write_u32::<LittleEndian>(self.buf.len() as u32)?;
        self.file.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&self.buf)?;
        self.records += 1;
        Ok(())
    }

    /// Number of records appended so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Flushes buffered bytes and closes the run.
    pub fn finish(mut self) -> Result<(), SpillError> {
        self.file.flush()?;
        Ok(())
    }
}

/// Sequential reader over one spill run; a [`KvIterator`] source.
pub struct SpillReader {
    file: BufReader<File>,
    scratch: Vec<u8>,
}

impl SpillReader {
    /// Opens a spill run for replay.
    pub fn open(path: &Path) -> Result<Self, SpillError> {
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            scratch: Vec::with_capacity(256),
        })
    }

    /// Reads the next record, `None` at end of file.
    pub fn read_record(&mut self) -> Result<Option<KeyValue>, SpillError> {
        let len = match self.file.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len > MAX_RECORD_BYTES {
            return Err(SpillError::Corrupt);
        }
        let crc = self.file.read_u32::<LittleEndian>()?;

        self.scratch.resize(len, 0);
        self.file.read_exact(&mut self.scratch)?;

        let mut hasher = Crc32::new();
        hasher.update(&self.scratch);
        if hasher.finalize() != crc {
            return Err(SpillError::Corrupt);
        }

        let mut body = &self.scratch[..];
        let key = BinaryRow::read_from(&mut body)?;
        let seq = body.read_u64::<LittleEndian>()?;
        let kind = RowKind::from_byte(body.read_u8()?)?;
        let value = BinaryRow::read_from(&mut body)?
            .to_row()
            .map_err(|_| SpillError::Corrupt)?;
        Ok(Some(KeyValue::new(key, seq, kind, value)))
    }
}

impl KvIterator for SpillReader {
    fn advance(&mut self) -> anyhow::Result<Option<KeyValue>> {
        Ok(self.read_record()?)
    }
}
