//! Sequential data file reader.

use crate::format::{read_footer, Footer};
use crate::DataFileError;
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use row::{BinaryRow, KeyValue, KvIterator, RowKind};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Maximum key size accepted during reads (64 KiB). Prevents OOM on
/// corrupt length prefixes.
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size accepted during reads (64 MiB).
const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// Opens a data file and validates its footer.
///
/// The reader is a cheap handle: it holds the parsed footer and the data
/// section length. Actual record reads happen through
/// [`DataFileIterator`], which owns its own file handle, so any number of
/// concurrent scans can run over the same file.
#[derive(Debug)]
pub struct DataFileReader {
    path: PathBuf,
    footer: Footer,
    data_end: u64,
}

impl DataFileReader {
    /// Opens `path` and reads the footer.
    pub fn open(path: &Path) -> Result<Self, DataFileError> {
        let mut file = File::open(path)?;
        let (footer, data_end) = read_footer(&mut file, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            footer,
            data_end,
        })
    }

    /// Number of records in the file.
    #[must_use]
    pub fn row_count(&self) -> u64 {
        self.footer.row_count
    }

    /// Smallest sequence number in the file.
    #[must_use]
    pub fn min_seq(&self) -> u64 {
        self.footer.min_seq
    }

    /// Largest sequence number in the file.
    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.footer.max_seq
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a sequential scan from the first record.
    pub fn iter(&self) -> Result<DataFileIterator, DataFileError> {
        let mut file = BufReader::new(File::open(&self.path)?);
        file.seek(SeekFrom::Start(0))?;
        Ok(DataFileIterator {
            path: self.path.clone(),
            file,
            pos: 0,
            data_end: self.data_end,
            scratch: Vec::with_capacity(256),
        })
    }
}

/// Sequential scan over one data file; a [`KvIterator`] source.
pub struct DataFileIterator {
    path: PathBuf,
    file: BufReader<File>,
    pos: u64,
    data_end: u64,
    scratch: Vec<u8>,
}

impl DataFileIterator {
    /// Reads the next record, verifying its CRC32.
    pub fn read_record(&mut self) -> Result<Option<KeyValue>, DataFileError> {
        if self.pos >= self.data_end {
            return Ok(None);
        }

        let crc = self.file.read_u32::<LittleEndian>()?;

        let key_len = self.file.read_u32::<LittleEndian>()? as usize;
        if key_len > MAX_KEY_BYTES {
            return Err(DataFileError::corrupt(
                &self.path,
                format!("key length {key_len} exceeds maximum"),
            ));
        }
        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;
        let seq = self.file.read_u64::<LittleEndian>()?;
        let kind_byte = self.file.read_u8()?;
        let val_len = self.file.read_u32::<LittleEndian>()? as usize;
        if val_len > MAX_VALUE_BYTES {
            return Err(DataFileError::corrupt(
                &self.path,
                format!("value length {val_len} exceeds maximum"),
            ));
        }
        let mut value = vec![0u8; val_len];
        self.file.read_exact(&mut value)?;

        // Re-frame the body exactly as the writer did and verify the CRC.
        self.scratch.clear();
        self.scratch.extend_from_slice(&(key_len as u32).to_le_bytes());
        self.scratch.extend_from_slice(&key);
        self.scratch.extend_from_slice(&seq.to_le_bytes());
        self.scratch.push(kind_byte);
        self.scratch.extend_from_slice(&(val_len as u32).to_le_bytes());
        self.scratch.extend_from_slice(&value);
        let mut hasher = Crc32::new();
        hasher.update(&self.scratch);
        if hasher.finalize() != crc {
            return Err(DataFileError::corrupt(&self.path, "record crc mismatch"));
        }

        self.pos += 4 + self.scratch.len() as u64;

        let kind = RowKind::from_byte(kind_byte)?;
        let value_row = BinaryRow::from_bytes(value)
            .to_row()
            .map_err(|e| DataFileError::corrupt(&self.path, e.to_string()))?;
        Ok(Some(KeyValue::new(
            BinaryRow::from_bytes(key),
            seq,
            kind,
            value_row,
        )))
    }
}

impl KvIterator for DataFileIterator {
    fn advance(&mut self) -> anyhow::Result<Option<KeyValue>> {
        Ok(self.read_record()?)
    }
}
