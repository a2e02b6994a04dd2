//! The store: memtable + runs + full-merge compaction.

use crate::run::{RunEntry, RunReader, RunWriter};
use crate::IndexKvError;
use row::BinaryRow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Memtable flush threshold default: 8 MiB of key + value bytes.
const DEFAULT_FLUSH_BYTES: usize = 8 * 1024 * 1024;

/// Full-merge compaction trigger: run count at which all runs are merged
/// into one.
const RUN_COMPACTION_TRIGGER: usize = 4;

/// An embedded ordered KV store with optional TTL.
///
/// Writes land in an in-memory table; when it exceeds the flush
/// threshold it is written out as a run file. Lookups consult the
/// memtable first, then runs newest to oldest — first match wins,
/// tombstones shadow older values. When the run count reaches the
/// compaction trigger, all runs are merged into one and tombstones and
/// expired entries are dropped (a full merge has nothing older to
/// shadow).
#[derive(Debug)]
pub struct IndexStore {
    dir: PathBuf,
    mem: BTreeMap<BinaryRow, RunEntry>,
    mem_bytes: usize,
    flush_threshold: usize,
    /// Newest first, the lookup precedence order.
    runs: Vec<RunReader>,
    ttl: Option<Duration>,
    next_run: u64,
}

impl IndexStore {
    /// Opens a store under `dir`, clearing any leftover run files.
    ///
    /// The index has no durability contract of its own — it is rebuilt
    /// from the table by bootstrap — so stale runs from a previous
    /// process are garbage, not state.
    pub fn open(dir: &Path, ttl: Option<Duration>) -> Result<Self, IndexKvError> {
        Self::open_with_threshold(dir, ttl, DEFAULT_FLUSH_BYTES)
    }

    /// [`open`](IndexStore::open) with an explicit flush threshold.
    pub fn open_with_threshold(
        dir: &Path,
        ttl: Option<Duration>,
        flush_threshold: usize,
    ) -> Result<Self, IndexKvError> {
        fs::create_dir_all(dir)?;
        for entry in fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with("run-") {
                    let _ = fs::remove_file(&path);
                }
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            mem: BTreeMap::new(),
            mem_bytes: 0,
            flush_threshold: flush_threshold.max(1),
            runs: Vec::new(),
            ttl,
            next_run: 0,
        })
    }

    fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    /// `true` if `ts` has outlived the configured TTL.
    fn expired(&self, ts: i64) -> bool {
        match self.ttl {
            Some(ttl) => Self::now_millis().saturating_sub(ts) > ttl.as_millis() as i64,
            None => false,
        }
    }

    /// Inserts or replaces a key.
    pub fn put(&mut self, key: BinaryRow, value: Vec<u8>) -> Result<(), IndexKvError> {
        self.mem_bytes += key.len() + value.len() + 16;
        self.mem.insert(
            key,
            RunEntry {
                ts: Self::now_millis(),
                value: Some(value),
            },
        );
        self.maybe_flush()
    }

    /// Records a tombstone for a key.
    pub fn delete(&mut self, key: BinaryRow) -> Result<(), IndexKvError> {
        self.mem_bytes += key.len() + 16;
        self.mem.insert(
            key,
            RunEntry {
                ts: Self::now_millis(),
                value: None,
            },
        );
        self.maybe_flush()
    }

    /// Point lookup. Expired entries are treated as absent.
    pub fn get(&self, key: &BinaryRow) -> Result<Option<Vec<u8>>, IndexKvError> {
        if let Some(entry) = self.mem.get(key) {
            return Ok(self.live_value(entry));
        }
        for run in &self.runs {
            if let Some(entry) = run.get(key)? {
                return Ok(self.live_value(&entry));
            }
        }
        Ok(None)
    }

    fn live_value(&self, entry: &RunEntry) -> Option<Vec<u8>> {
        match &entry.value {
            Some(v) if !self.expired(entry.ts) => Some(v.clone()),
            _ => None,
        }
    }

    fn maybe_flush(&mut self) -> Result<(), IndexKvError> {
        if self.mem_bytes >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the memtable to a new run file.
    pub fn flush(&mut self) -> Result<(), IndexKvError> {
        if self.mem.is_empty() {
            return Ok(());
        }
        let path = self.dir.join(format!("run-{:06}.idx", self.next_run));
        self.next_run += 1;

        let mem = std::mem::take(&mut self.mem);
        let mut writer = RunWriter::create(&path, mem.len())?;
        for (key, entry) in &mem {
            writer.append(key, entry)?;
        }
        writer.finish()?;
        debug!(run = %path.display(), entries = mem.len(), "flushed index run");

        self.mem_bytes = 0;
        self.runs.insert(0, RunReader::open(&path)?);

        if self.runs.len() >= RUN_COMPACTION_TRIGGER {
            self.compact()?;
        }
        Ok(())
    }

    /// Merges every run into one, dropping tombstones and expired
    /// entries.
    pub fn compact(&mut self) -> Result<(), IndexKvError> {
        if self.runs.len() <= 1 {
            return Ok(());
        }

        // Newest-first precedence: the first run that mentions a key wins.
        let mut merged: BTreeMap<BinaryRow, RunEntry> = BTreeMap::new();
        for run in &self.runs {
            for (key, entry) in run.entries()? {
                merged.entry(key).or_insert(entry);
            }
        }
        merged.retain(|_, entry| entry.value.is_some() && !self.expired(entry.ts));

        let old_paths: Vec<PathBuf> =
            self.runs.iter().map(|r| r.path().to_path_buf()).collect();

        if merged.is_empty() {
            self.runs.clear();
            for path in &old_paths {
                let _ = fs::remove_file(path);
            }
            return Ok(());
        }

        let path = self.dir.join(format!("run-{:06}.idx", self.next_run));
        self.next_run += 1;
        let mut writer = RunWriter::create(&path, merged.len())?;
        let entry_total = merged.len();
        // BTreeMap on BinaryRow iterates in typed key order, which is the
        // order the run's binary search expects.
        for (key, entry) in &merged {
            writer.append(key, entry)?;
        }
        writer.finish()?;
        debug!(runs = old_paths.len(), entries = entry_total, "compacted index runs");

        self.runs = vec![RunReader::open(&path)?];
        for path in &old_paths {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }

    /// Bulk-loads an already-sorted, already-deduplicated stream as a
    /// single run (the bootstrap path). Existing state is replaced.
    pub fn bulk_load<I>(&mut self, entries: I) -> Result<(), IndexKvError>
    where
        I: IntoIterator<Item = (BinaryRow, Vec<u8>)>,
    {
        self.mem.clear();
        self.mem_bytes = 0;
        for run in self.runs.drain(..) {
            let _ = fs::remove_file(run.path());
        }

        let entries: Vec<(BinaryRow, Vec<u8>)> = entries.into_iter().collect();
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.dir.join(format!("run-{:06}.idx", self.next_run));
        self.next_run += 1;
        let mut writer = RunWriter::create(&path, entries.len())?;
        let ts = Self::now_millis();
        for (key, value) in &entries {
            writer.append(
                key,
                &RunEntry {
                    ts,
                    value: Some(value.clone()),
                },
            )?;
        }
        writer.finish()?;
        debug!(entries = entries.len(), "bulk-loaded index");
        self.runs = vec![RunReader::open(&path)?];
        Ok(())
    }

    /// Entries currently buffered in memory.
    #[must_use]
    pub fn in_memory_len(&self) -> usize {
        self.mem.len()
    }

    /// Number of on-disk runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}
