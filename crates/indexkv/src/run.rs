//! Index run files.
//!
//! ## File layout - magic `TIX1` (`0x5449_5831`)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA SECTION (entries in ascending key order)                 │
//! │                                                               │
//! │ crc32 (u32) | key_len (u32) | key | ts (i64)                  │
//! │ present (u8) | [val_len (u32) | val]                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ BLOOM SECTION (serialized BloomFilter over keys)              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX SECTION (key -> data_offset, in key order)              │
//! │                                                               │
//! │ key_len (u32) | key | data_offset (u64)                       │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (last 28 bytes)                                        │
//! │                                                               │
//! │ entry_count (u64) | bloom_offset (u64) | index_offset (u64)   │
//! │ magic (u32 "TIX1")                                            │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. `present = 0` marks a tombstone. Keys are
//! binary rows and all ordering (file order, binary search) is the typed
//! row comparison.

use crate::IndexKvError;
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use row::{compare_binary_rows, BinaryRow};
use std::fs::{rename, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Magic number identifying index run files (ASCII "TIX1").
pub const RUN_MAGIC: u32 = 0x5449_5831;

/// Footer size: 3 × u64 + u32.
pub const RUN_FOOTER_BYTES: u64 = 8 * 3 + 4;

/// Bloom filter target false-positive rate for run files (1%).
const BLOOM_FPR: f64 = 0.01;

/// Allocation guards for corrupt length prefixes.
const MAX_KEY_BYTES: usize = 64 * 1024;
const MAX_VALUE_BYTES: usize = 1024 * 1024;

/// One stored entry: write timestamp plus payload (`None` = tombstone).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEntry {
    /// Milliseconds since the Unix epoch at write time; drives TTL.
    pub ts: i64,
    /// `Some(bytes)` for live entries, `None` for tombstones.
    pub value: Option<Vec<u8>>,
}

/// Writes one run file from entries in ascending key order.
///
/// Crash safety follows the data file discipline: a `.tmp` sibling is
/// written, synced and atomically renamed.
pub struct RunWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    filter: BloomFilter,
    index: Vec<(BinaryRow, u64)>,
    record_buf: Vec<u8>,
    offset: u64,
}

impl RunWriter {
    /// Creates a writer; `expected_entries` sizes the bloom filter
    /// (over-estimating is safe, under-estimating raises the FPR).
    pub fn create(path: &Path, expected_entries: usize) -> Result<Self, IndexKvError> {
        let tmp_path = path.with_extension("idx.tmp");
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            file: BufWriter::new(raw),
            filter: BloomFilter::new(expected_entries.max(1), BLOOM_FPR),
            index: Vec::new(),
            record_buf: Vec::with_capacity(128),
            offset: 0,
        })
    }

    /// Appends one entry; keys must arrive in ascending order.
    pub fn append(&mut self, key: &BinaryRow, entry: &RunEntry) -> Result<(), IndexKvError> {
        self.record_buf.clear();
        self.record_buf
            .write_u32::<LittleEndian>(key.len() as u32)?;
        self.record_buf.extend_from_slice(key.as_bytes());
        self.record_buf.write_i64::<LittleEndian>(entry.ts)?;
        match &entry.value {
            Some(v) => {
                self.record_buf.write_u8(1)?;
                self.record_buf.write_u32::<LittleEndian>(v.len() as u32)?;
                self.record_buf.extend_from_slice(v);
            }
            None => self.record_buf.write_u8(0)?,
        }

        let mut hasher = Crc32::new();
        hasher.update(&self.record_buf);
        let crc = hasher.finalize();

        self.file.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&self.record_buf)?;

        self.filter.insert(key.as_bytes());
        self.index.push((key.clone(), self.offset));
        self.offset += 4 + self.record_buf.len() as u64;
        Ok(())
    }

    /// Entries appended so far.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Writes the bloom, index and footer sections and publishes the run.
    pub fn finish(mut self) -> Result<(), IndexKvError> {
        let bloom_offset = self.offset;
        self.filter.write_to(&mut self.file)?;

        let index_offset = bloom_offset + self.filter.serialized_size() as u64;
        for (key, data_offset) in &self.index {
            self.file.write_u32::<LittleEndian>(key.len() as u32)?;
            self.file.write_all(key.as_bytes())?;
            self.file.write_u64::<LittleEndian>(*data_offset)?;
        }

        self.file.write_u64::<LittleEndian>(self.index.len() as u64)?;
        self.file.write_u64::<LittleEndian>(bloom_offset)?;
        self.file.write_u64::<LittleEndian>(index_offset)?;
        self.file.write_u32::<LittleEndian>(RUN_MAGIC)?;

        self.file.flush()?;
        self.file
            .into_inner()
            .map_err(|e| IndexKvError::Io(e.into_error()))?
            .sync_all()?;
        rename(&self.tmp_path, &self.path)?;
        Ok(())
    }

    /// Abandons the run, removing the temp file.
    pub fn abort(self) {
        drop(self.file);
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

/// Reads one run file for point lookups.
///
/// On open the whole index section (key → offset) and the bloom filter
/// are loaded into memory; a `get` is then a filter probe, a binary
/// search and at most one seek + read. The persistent handle sits behind
/// a `Mutex` so lookups work through `&self`.
#[derive(Debug)]
pub struct RunReader {
    path: PathBuf,
    index: Vec<(BinaryRow, u64)>,
    filter: BloomFilter,
    file: Mutex<BufReader<File>>,
}

impl RunReader {
    /// Opens a run and loads its index and bloom filter.
    pub fn open(path: &Path) -> Result<Self, IndexKvError> {
        let mut f = File::open(path)?;
        let filesize = f.seek(SeekFrom::End(0))?;
        if filesize < RUN_FOOTER_BYTES {
            return Err(IndexKvError::corrupt(path, "file too small for footer"));
        }

        f.seek(SeekFrom::End(-(RUN_FOOTER_BYTES as i64)))?;
        let entry_count = f.read_u64::<LittleEndian>()?;
        let bloom_offset = f.read_u64::<LittleEndian>()?;
        let index_offset = f.read_u64::<LittleEndian>()?;
        let magic = f.read_u32::<LittleEndian>()?;
        if magic != RUN_MAGIC {
            return Err(IndexKvError::corrupt(
                path,
                format!("unknown magic {magic:#x}"),
            ));
        }
        if bloom_offset > index_offset || index_offset >= filesize {
            return Err(IndexKvError::corrupt(path, "inconsistent section offsets"));
        }

        f.seek(SeekFrom::Start(bloom_offset))?;
        let filter = BloomFilter::read_from(&mut f)?;

        f.seek(SeekFrom::Start(index_offset))?;
        let index_end = filesize - RUN_FOOTER_BYTES;
        let mut index = Vec::with_capacity(entry_count as usize);
        let mut pos = index_offset;
        while pos < index_end {
            let key_len = f.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                return Err(IndexKvError::corrupt(path, "index key length too large"));
            }
            let mut key = vec![0u8; key_len];
            f.read_exact(&mut key)?;
            let data_offset = f.read_u64::<LittleEndian>()?;
            index.push((BinaryRow::from_bytes(key), data_offset));
            pos += 4 + key_len as u64 + 8;
        }
        if index.len() as u64 != entry_count {
            return Err(IndexKvError::corrupt(path, "index entry count mismatch"));
        }

        f.seek(SeekFrom::Start(0))?;
        Ok(Self {
            path: path.to_path_buf(),
            index,
            filter,
            file: Mutex::new(BufReader::new(f)),
        })
    }

    /// Number of entries (including tombstones).
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// The run's file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point lookup; `None` means the key is not in this run at all,
    /// `Some(entry)` may still be a tombstone.
    pub fn get(&self, key: &BinaryRow) -> Result<Option<RunEntry>, IndexKvError> {
        if !self.filter.may_contain(key.as_bytes()) {
            return Ok(None);
        }
        let slot = self
            .index
            .binary_search_by(|(k, _)| compare_binary_rows(k, key));
        let offset = match slot {
            Ok(i) => self.index[i].1,
            Err(_) => return Ok(None),
        };
        self.read_entry_at(offset, key)
    }

    /// Iterates all entries in key order (used by compaction).
    pub fn entries(&self) -> Result<Vec<(BinaryRow, RunEntry)>, IndexKvError> {
        let mut out = Vec::with_capacity(self.index.len());
        for (key, offset) in &self.index {
            match self.read_entry_at(*offset, key)? {
                Some(entry) => out.push((key.clone(), entry)),
                None => {
                    return Err(IndexKvError::corrupt(
                        &self.path,
                        "indexed entry missing from data section",
                    ))
                }
            }
        }
        Ok(out)
    }

    fn read_entry_at(
        &self,
        offset: u64,
        expect_key: &BinaryRow,
    ) -> Result<Option<RunEntry>, IndexKvError> {
        let mut file = self.file.lock().map_err(|_| {
            IndexKvError::Io(std::io::Error::other("run reader mutex poisoned"))
        })?;
        file.seek(SeekFrom::Start(offset))?;

        let crc = file.read_u32::<LittleEndian>()?;
        let key_len = file.read_u32::<LittleEndian>()? as usize;
        if key_len > MAX_KEY_BYTES {
            return Err(IndexKvError::corrupt(&self.path, "key length too large"));
        }
        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key)?;
        let ts = file.read_i64::<LittleEndian>()?;
        let present = file.read_u8()?;
        let value = if present == 1 {
            let val_len = file.read_u32::<LittleEndian>()? as usize;
            if val_len > MAX_VALUE_BYTES {
                return Err(IndexKvError::corrupt(&self.path, "value length too large"));
            }
            let mut value = vec![0u8; val_len];
            file.read_exact(&mut value)?;
            Some(value)
        } else {
            None
        };

        // Verify the CRC over the reconstructed record body.
        let mut body = Vec::with_capacity(4 + key_len + 13);
        body.extend_from_slice(&(key_len as u32).to_le_bytes());
        body.extend_from_slice(&key);
        body.extend_from_slice(&ts.to_le_bytes());
        match &value {
            Some(v) => {
                body.push(1);
                body.extend_from_slice(&(v.len() as u32).to_le_bytes());
                body.extend_from_slice(v);
            }
            None => body.push(0),
        }
        let mut hasher = Crc32::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(IndexKvError::corrupt(&self.path, "entry crc mismatch"));
        }

        if key != expect_key.as_bytes() {
            return Err(IndexKvError::corrupt(&self.path, "entry key mismatch"));
        }
        Ok(Some(RunEntry { ts, value }))
    }
}
