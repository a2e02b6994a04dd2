//! Streaming data file writer.

use crate::format::{write_footer, Footer};
use crate::meta::DataFileMeta;
use crate::DataFileError;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use row::{BinaryRow, KeyValue, StatsCollector};
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Writes one immutable data file from a stream of records.
///
/// Records must arrive in ascending (key, seq) order — that is what every
/// producer (memtable drain, sort buffer, loser-tree merge) yields.
/// Statistics, key range and sequence range are accumulated during the
/// single pass, so [`finish`](DataFileWriter::finish) returns a complete
/// [`DataFileMeta`] without re-reading anything.
///
/// # Crash safety
///
/// Bytes go to `<name>.tmp`, are flushed and fsynced, and the file is
/// atomically renamed into place; the parent directory is fsynced so the
/// rename survives a crash. An interrupted write leaves only a `.tmp`
/// orphan that recovery sweeps away.
pub struct DataFileWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    schema_id: u64,
    level: u32,

    record_buf: Vec<u8>,
    bytes_written: u64,
    row_count: u64,
    min_seq: u64,
    max_seq: u64,
    min_key: Option<BinaryRow>,
    max_key: Option<BinaryRow>,
    key_stats: Option<StatsCollector>,
    value_stats: Option<StatsCollector>,
}

impl DataFileWriter {
    /// Opens a writer for `path`.
    pub fn create(path: &Path, schema_id: u64, level: u32) -> Result<Self, DataFileError> {
        let tmp_path = path.with_extension("tld.tmp");
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            file: BufWriter::new(raw),
            schema_id,
            level,
            record_buf: Vec::with_capacity(256),
            bytes_written: 0,
            row_count: 0,
            min_seq: u64::MAX,
            max_seq: 0,
            min_key: None,
            max_key: None,
            key_stats: None,
            value_stats: None,
        })
    }

    /// Appends one record.
    pub fn write(&mut self, kv: &KeyValue) -> Result<(), DataFileError> {
        // Build the record body so the CRC32 can cover it.
        self.record_buf.clear();
        self.record_buf
            .write_u32::<LittleEndian>(kv.key.len() as u32)?;
        self.record_buf.extend_from_slice(kv.key.as_bytes());
        self.record_buf.write_u64::<LittleEndian>(kv.seq)?;
        self.record_buf.write_u8(kv.kind.to_byte())?;
        let value_bin = kv.value.to_binary();
        self.record_buf
            .write_u32::<LittleEndian>(value_bin.len() as u32)?;
        self.record_buf.extend_from_slice(value_bin.as_bytes());

        let mut hasher = Crc32::new();
        hasher.update(&self.record_buf);
        let crc = hasher.finalize();

        self.file.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&self.record_buf)?;
        self.bytes_written += 4 + self.record_buf.len() as u64;

        // Range and statistics accounting.
        self.row_count += 1;
        self.min_seq = self.min_seq.min(kv.seq);
        self.max_seq = self.max_seq.max(kv.seq);
        // Tracked by comparison rather than first/last: changelog files
        // carry records in arrival order, not key order.
        match &self.min_key {
            Some(min) if *min <= kv.key => {}
            _ => self.min_key = Some(kv.key.clone()),
        }
        match &self.max_key {
            Some(max) if *max >= kv.key => {}
            _ => self.max_key = Some(kv.key.clone()),
        }

        if let Ok(key_row) = kv.key.to_row() {
            self.key_stats
                .get_or_insert_with(|| StatsCollector::new(key_row.arity()))
                .collect(&key_row);
        }
        self.value_stats
            .get_or_insert_with(|| StatsCollector::new(kv.value.arity()))
            .collect(&kv.value);
        Ok(())
    }

    /// Bytes written to the data section so far; used by rolling writers
    /// to decide when to cut the file.
    #[must_use]
    pub fn written_bytes(&self) -> u64 {
        self.bytes_written
    }

    /// Records written so far.
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.row_count
    }

    /// Finishes the file: footer, flush, fsync, atomic rename.
    ///
    /// # Errors
    ///
    /// Refuses to finish an empty file — an empty data file is never
    /// useful and indicates a logic bug upstream.
    pub fn finish(mut self) -> Result<DataFileMeta, DataFileError> {
        if self.row_count == 0 {
            // Clean up the temp file and bail; nothing was written.
            drop(self.file);
            let _ = std::fs::remove_file(&self.tmp_path);
            return Err(DataFileError::Empty(self.path.display().to_string()));
        }

        write_footer(
            &mut self.file,
            &Footer {
                min_seq: self.min_seq,
                max_seq: self.max_seq,
                row_count: self.row_count,
            },
        )?;

        self.file.flush()?;
        self.file
            .into_inner()
            .map_err(|e| DataFileError::Io(e.into_error()))?
            .sync_all()?;
        rename(&self.tmp_path, &self.path)?;

        // Fsync the parent directory so the rename itself is durable.
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let file_size = std::fs::metadata(&self.path)?.len();
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        debug!(file = %file_name, rows = self.row_count, level = self.level, "wrote data file");

        let creation_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(DataFileMeta {
            file_name,
            file_size,
            row_count: self.row_count,
            min_key: self.min_key.expect("non-empty file has a min key"),
            max_key: self.max_key.expect("non-empty file has a max key"),
            key_stats: self.key_stats.map(StatsCollector::finish).unwrap_or_default(),
            value_stats: self
                .value_stats
                .map(StatsCollector::finish)
                .unwrap_or_default(),
            min_seq: self.min_seq,
            max_seq: self.max_seq,
            schema_id: self.schema_id,
            level: self.level,
            extra_files: Vec::new(),
            creation_time,
        })
    }

    /// Abandons the write, removing the temp file.
    pub fn abort(self) {
        drop(self.file);
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}
