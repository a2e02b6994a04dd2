//! The merge-tree writer.

use crate::compact::UniversalCompaction;
use crate::levels::Levels;
use crate::worker::{CompactOutcome, CompactionWorker};
use crate::MergeTreeError;
use config::{ChangelogProducer, CoreOptions};
use datafile::{changelog_file_name, new_data_file_name, DataFileMeta, DataFileWriter};
use memtable::Memtable;
use mergefn::{MergeFunction, MergeReader};
use row::{BinaryRow, KeyValue, KvIterator, Row, RowKind, VecIterator};
use sortbuffer::SortBuffer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Frozen per-writer configuration, extracted from [`CoreOptions`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub write_buffer_size: usize,
    pub spillable: bool,
    pub spill_fan_in: usize,
    pub compaction_trigger: usize,
    pub stop_trigger: usize,
    pub size_ratio: usize,
    pub target_file_size: u64,
    pub changelog_input: bool,
    pub schema_id: u64,
}

impl WriterOptions {
    /// Projects the table options onto one writer.
    #[must_use]
    pub fn from_core(options: &CoreOptions, schema_id: u64) -> Self {
        Self {
            write_buffer_size: options.write_buffer_size,
            spillable: options.write_buffer_spillable,
            spill_fan_in: options.local_sort_max_num_file_handles,
            compaction_trigger: options.num_sorted_run_compaction_trigger,
            stop_trigger: options.num_sorted_run_stop_trigger,
            size_ratio: options.compaction_size_ratio,
            target_file_size: options.target_file_size,
            changelog_input: options.changelog_producer == ChangelogProducer::Input,
            schema_id,
        }
    }
}

/// The manifest-relevant result of one `prepare_commit`.
#[derive(Debug, Default, Clone)]
pub struct CommitIncrement {
    /// Freshly flushed level-0 files (ADD entries).
    pub new_files: Vec<DataFileMeta>,
    /// Changelog files written since the last commit.
    pub changelog_files: Vec<DataFileMeta>,
    /// Files consumed by completed compactions (DELETE entries).
    pub compact_before: Vec<DataFileMeta>,
    /// Files produced by completed compactions (ADD entries).
    pub compact_after: Vec<DataFileMeta>,
}

impl CommitIncrement {
    /// `true` when the commit would carry nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty()
            && self.changelog_files.is_empty()
            && self.compact_before.is_empty()
            && self.compact_after.is_empty()
    }
}

/// The write buffer: plain memtable, or the external sorter when spill
/// is allowed.
enum Buffer {
    Mem(Memtable),
    Spill(Option<SortBuffer>),
}

/// Accepts the change stream of one (partition, bucket), flushes level-0
/// files and keeps the sorted-run count bounded via the background
/// compaction worker.
pub struct MergeTreeWriter {
    dir: PathBuf,
    options: WriterOptions,
    merge_factory: Arc<dyn Fn() -> MergeFunction + Send + Sync>,

    buffer: Buffer,
    /// Distinguishes successive spill directories so a refilled sorter
    /// never reuses run files an in-flight iterator still reads.
    spill_gen: u64,
    /// Raw input records for the `input` changelog producer, in arrival
    /// order.
    changelog: Vec<KeyValue>,
    next_seq: u64,

    levels: Levels,
    picker: UniversalCompaction,
    worker: CompactionWorker,
    compaction_in_flight: bool,

    new_files: Vec<DataFileMeta>,
    changelog_files: Vec<DataFileMeta>,
    compact_before: Vec<DataFileMeta>,
    compact_after: Vec<DataFileMeta>,
}

impl MergeTreeWriter {
    /// Opens a writer over `dir`, restoring its levels from `restored`
    /// (the scan plan of this bucket at the latest snapshot).
    pub fn new(
        dir: &Path,
        options: WriterOptions,
        restored: Vec<DataFileMeta>,
        merge_factory: Arc<dyn Fn() -> MergeFunction + Send + Sync>,
    ) -> Result<Self, MergeTreeError> {
        std::fs::create_dir_all(dir).map_err(datafile::DataFileError::Io)?;
        cleanup_leftovers(dir);

        let levels = Levels::restore(restored);
        let next_seq = levels.max_seq() + 1;
        let worker_factory = {
            let factory = Arc::clone(&merge_factory);
            Box::new(move || factory())
        };
        let worker = CompactionWorker::spawn(
            dir,
            worker_factory,
            options.schema_id,
            options.target_file_size,
        );

        let buffer = if options.spillable {
            Buffer::Spill(Some(SortBuffer::new(
                &dir.join(".spill-0"),
                options.write_buffer_size,
                options.spill_fan_in,
            )?))
        } else {
            Buffer::Mem(Memtable::new())
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            picker: UniversalCompaction::new(options.compaction_trigger, options.size_ratio),
            options,
            merge_factory,
            buffer,
            spill_gen: 0,
            changelog: Vec::new(),
            next_seq,
            levels,
            worker,
            compaction_in_flight: false,
            new_files: Vec::new(),
            changelog_files: Vec::new(),
            compact_before: Vec::new(),
            compact_after: Vec::new(),
        })
    }

    /// Writes one change record.
    ///
    /// `seq` comes from the configured sequence column when present;
    /// otherwise the writer assigns the next engine sequence. The call
    /// blocks only when the sorted-run count has hit the stop trigger,
    /// and then only until the in-flight compaction returns.
    pub fn write(
        &mut self,
        key: BinaryRow,
        kind: RowKind,
        value: Row,
        seq: Option<u64>,
    ) -> Result<(), MergeTreeError> {
        self.stall_if_needed()?;

        let seq = seq.unwrap_or(self.next_seq);
        self.next_seq = self.next_seq.max(seq + 1);
        let kv = KeyValue::new(key, seq, kind, value);

        if self.options.changelog_input {
            self.changelog.push(kv.clone());
        }

        match &mut self.buffer {
            Buffer::Mem(mem) => {
                mem.insert(kv);
                if mem.approx_size() >= self.options.write_buffer_size {
                    debug!(size = mem.approx_size(), "write buffer full; flushing");
                    self.flush_buffer()?;
                }
            }
            Buffer::Spill(sorter) => {
                // The sorter spills internally at its budget; no flush
                // until prepare_commit.
                match sorter.as_mut() {
                    Some(s) => s.add(kv)?,
                    None => return Err(MergeTreeError::BufferFull),
                }
            }
        }
        Ok(())
    }

    /// The number of sorted runs currently tracked.
    #[must_use]
    pub fn sorted_run_count(&self) -> usize {
        self.levels.run_count()
    }

    /// Sequence number the next engine-assigned record would get.
    #[must_use]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Forces the buffer out as a level-0 file.
    pub fn force_flush(&mut self) -> Result<(), MergeTreeError> {
        self.flush_buffer()
    }

    /// Flushes all in-memory data and returns the manifest delta since
    /// the previous call. With `wait_for_compaction`, blocks until the
    /// background compaction has drained so its result rides this
    /// commit.
    pub fn prepare_commit(
        &mut self,
        wait_for_compaction: bool,
    ) -> Result<CommitIncrement, MergeTreeError> {
        self.flush_buffer()?;

        if wait_for_compaction && self.compaction_in_flight {
            if let Some(outcome) = self.worker.recv() {
                self.integrate(outcome);
            } else {
                self.compaction_in_flight = false;
            }
        }
        self.poll_outcomes();

        Ok(CommitIncrement {
            new_files: std::mem::take(&mut self.new_files),
            changelog_files: std::mem::take(&mut self.changelog_files),
            compact_before: std::mem::take(&mut self.compact_before),
            compact_after: std::mem::take(&mut self.compact_after),
        })
    }

    /// Drops buffered state and stops the background worker. Data not
    /// returned by a `prepare_commit` is abandoned; uncommitted files
    /// are never referenced by a manifest and are swept as orphans.
    pub fn close(self) {
        // Worker teardown happens in CompactionWorker::drop.
    }

    /// Blocks the writer while the run count is at the stop trigger.
    fn stall_if_needed(&mut self) -> Result<(), MergeTreeError> {
        self.poll_outcomes();
        while self.levels.run_count() >= self.options.stop_trigger {
            if self.compaction_in_flight {
                debug!(
                    runs = self.levels.run_count(),
                    "sorted-run stop trigger hit; awaiting compaction"
                );
                match self.worker.recv() {
                    Some(outcome) => self.integrate(outcome),
                    None => {
                        self.compaction_in_flight = false;
                        break;
                    }
                }
            } else if !self.maybe_compact() {
                // Nothing the picker can do; let the write proceed
                // rather than deadlocking.
                break;
            }
        }
        Ok(())
    }

    /// Writes the buffered records as one level-0 file (plus a changelog
    /// file when the `input` producer is active), then considers
    /// compaction.
    fn flush_buffer(&mut self) -> Result<(), MergeTreeError> {
        self.poll_outcomes();

        if !self.changelog.is_empty() {
            let records = std::mem::take(&mut self.changelog);
            let path = self.dir.join(changelog_file_name());
            let mut writer = DataFileWriter::create(&path, self.options.schema_id, 0)?;
            for kv in &records {
                writer.write(kv)?;
            }
            let meta = writer.finish()?;
            debug!(file = %meta.file_name, rows = meta.row_count, "wrote changelog file");
            self.changelog_files.push(meta);
        }

        let source: Option<Box<dyn KvIterator + Send>> = match &mut self.buffer {
            Buffer::Mem(mem) => {
                if mem.is_empty() {
                    None
                } else {
                    Some(Box::new(VecIterator::new(mem.drain())))
                }
            }
            Buffer::Spill(sorter) => match sorter.take() {
                Some(s) if !s.is_empty() => {
                    self.spill_gen += 1;
                    *sorter = Some(SortBuffer::new(
                        &self.dir.join(format!(".spill-{}", self.spill_gen)),
                        self.options.write_buffer_size,
                        self.options.spill_fan_in,
                    )?);
                    Some(Box::new(s.sorted_iterator()?))
                }
                other => {
                    *sorter = other;
                    None
                }
            },
        };

        if let Some(source) = source {
            let mut merged = MergeReader::new(source, (self.merge_factory)());
            let path = self.dir.join(new_data_file_name());
            let mut writer = DataFileWriter::create(&path, self.options.schema_id, 0)?;
            while let Some(kv) = merged.next_merged()? {
                writer.write(&kv)?;
            }
            if writer.record_count() == 0 {
                writer.abort();
            } else {
                let meta = writer.finish()?;
                self.levels.add(meta.clone());
                self.new_files.push(meta);
            }
        }

        self.maybe_compact();
        Ok(())
    }

    /// Submits a compaction if one is due and none is in flight.
    /// Returns `true` if a unit was submitted.
    fn maybe_compact(&mut self) -> bool {
        if self.compaction_in_flight {
            return false;
        }
        match self.picker.pick(&self.levels.runs()) {
            Some(unit) => {
                debug!(
                    runs = unit.runs.len(),
                    output_level = unit.output_level,
                    "scheduling compaction"
                );
                if self.worker.submit(unit) {
                    self.compaction_in_flight = true;
                    true
                } else {
                    warn!("compaction worker unavailable");
                    false
                }
            }
            None => false,
        }
    }

    /// Folds any finished compactions into the levels.
    fn poll_outcomes(&mut self) {
        while let Some(outcome) = self.worker.try_recv() {
            self.integrate(outcome);
        }
    }

    fn integrate(&mut self, outcome: CompactOutcome) {
        match outcome {
            CompactOutcome::Done { before, after } => {
                self.levels.remove(&before);
                for file in &after {
                    self.levels.add(file.clone());
                }
                self.compact_before.extend(before);
                self.compact_after.extend(after);
                self.compaction_in_flight = false;
            }
            CompactOutcome::Failed { error } => {
                // Already logged by the worker; inputs stay in place and
                // a later cycle retries.
                debug!(error = %error, "compaction outcome: failed");
                self.compaction_in_flight = false;
            }
        }
    }
}

/// Sweeps temp files and spill directories left behind by an
/// interrupted writer.
fn cleanup_leftovers(dir: &Path) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".tmp") {
                    let _ = std::fs::remove_file(&path);
                } else if name.starts_with(".spill") {
                    let _ = std::fs::remove_dir_all(&path);
                }
            }
        }
    }
}
