//! The single-threaded compaction worker.

use crate::compact::CompactUnit;
use crossbeam_channel::{Receiver, Sender};
use datafile::{
    new_data_file_name, ConcatIterator, DataFileMeta, DataFileReader, DataFileWriter,
};
use mergefn::{MergeFunction, MergeReader};
use row::{KeyValue, KvIterator, LoserTree, RowKind};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// What a compaction produced.
#[derive(Debug)]
pub enum CompactOutcome {
    /// The unit was merged; `before` leaves the levels, `after` enters.
    Done {
        before: Vec<DataFileMeta>,
        after: Vec<DataFileMeta>,
    },
    /// The unit failed; inputs stay in place and the next cycle retries.
    Failed { error: String },
}

/// A compaction request: the unit plus everything the worker needs to
/// rebuild its merge pipeline.
pub(crate) struct CompactRequest {
    pub unit: CompactUnit,
}

/// Handle to one bucket's compaction thread.
///
/// The writer owns the request sender and the outcome receiver; the
/// thread owns everything else. Dropping the handle closes the request
/// channel, which ends the thread.
pub struct CompactionWorker {
    request_tx: Sender<CompactRequest>,
    outcome_rx: Receiver<CompactOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionWorker {
    /// Spawns the worker for a bucket whose data files live in `dir`.
    ///
    /// `merge_factory` builds a fresh merge function per compaction;
    /// `target_file_size` bounds output files at levels >= 1.
    pub fn spawn(
        dir: &Path,
        merge_factory: Box<dyn Fn() -> MergeFunction + Send>,
        schema_id: u64,
        target_file_size: u64,
    ) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<CompactRequest>();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded();
        let dir = dir.to_path_buf();

        let handle = std::thread::spawn(move || {
            for request in request_rx {
                let outcome = match run_compaction(
                    &dir,
                    &request.unit,
                    merge_factory(),
                    schema_id,
                    target_file_size,
                ) {
                    Ok(after) => {
                        let before: Vec<DataFileMeta> = request
                            .unit
                            .runs
                            .iter()
                            .flat_map(|run| run.files.iter().cloned())
                            .collect();
                        CompactOutcome::Done { before, after }
                    }
                    Err(e) => {
                        warn!(error = %e, "compaction failed; inputs retained");
                        CompactOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                if outcome_tx.send(outcome).is_err() {
                    break;
                }
            }
        });

        Self {
            request_tx,
            outcome_rx,
            handle: Some(handle),
        }
    }

    /// Submits a unit; returns `false` if the worker is gone.
    pub(crate) fn submit(&self, unit: CompactUnit) -> bool {
        self.request_tx.send(CompactRequest { unit }).is_ok()
    }

    /// Non-blocking poll for a finished compaction.
    pub(crate) fn try_recv(&self) -> Option<CompactOutcome> {
        self.outcome_rx.try_recv().ok()
    }

    /// Blocks until the in-flight compaction finishes.
    pub(crate) fn recv(&self) -> Option<CompactOutcome> {
        self.outcome_rx.recv().ok()
    }
}

impl Drop for CompactionWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the thread's loop.
        let (closed_tx, _) = crossbeam_channel::bounded(0);
        self.request_tx = closed_tx;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Merges the unit's runs through the merge function and writes the
/// output run at the destination level.
fn run_compaction(
    dir: &Path,
    unit: &CompactUnit,
    function: MergeFunction,
    schema_id: u64,
    target_file_size: u64,
) -> anyhow::Result<Vec<DataFileMeta>> {
    let mut sources: Vec<Box<dyn KvIterator + Send>> = Vec::with_capacity(unit.runs.len());
    for run in &unit.runs {
        if run.files.len() == 1 {
            let reader = DataFileReader::open(&dir.join(&run.files[0].file_name))?;
            sources.push(Box::new(reader.iter()?));
        } else {
            sources.push(Box::new(ConcatIterator::new(dir, run.files.clone())));
        }
    }

    let tree = LoserTree::new(sources)?;
    let mut merged = MergeReader::new(tree, function);

    let mut output = RollingOutput::new(
        dir.to_path_buf(),
        schema_id,
        unit.output_level,
        // Level-0 runs must stay single files; only upper levels roll.
        if unit.output_level == 0 {
            u64::MAX
        } else {
            target_file_size
        },
    );

    while let Some(kv) = merged.next_merged()? {
        if unit.drop_delete && kv.kind == RowKind::Delete {
            continue;
        }
        output.write(&kv)?;
    }
    let after = output.finish()?;
    debug!(
        inputs = unit.runs.len(),
        outputs = after.len(),
        level = unit.output_level,
        "compaction finished"
    );
    Ok(after)
}

/// Writes a sorted stream as one or more files, rolling at the size
/// target.
struct RollingOutput {
    dir: PathBuf,
    schema_id: u64,
    level: u32,
    target_size: u64,
    current: Option<DataFileWriter>,
    finished: Vec<DataFileMeta>,
}

impl RollingOutput {
    fn new(dir: PathBuf, schema_id: u64, level: u32, target_size: u64) -> Self {
        Self {
            dir,
            schema_id,
            level,
            target_size,
            current: None,
            finished: Vec::new(),
        }
    }

    fn write(&mut self, kv: &KeyValue) -> anyhow::Result<()> {
        if self.current.is_none() {
            let path = self.dir.join(new_data_file_name());
            self.current = Some(DataFileWriter::create(&path, self.schema_id, self.level)?);
        }
        let writer = self.current.as_mut().expect("writer just ensured");
        writer.write(kv)?;
        if writer.written_bytes() >= self.target_size {
            if let Some(full) = self.current.take() {
                self.finished.push(full.finish()?);
            }
        }
        Ok(())
    }

    fn finish(mut self) -> anyhow::Result<Vec<DataFileMeta>> {
        if let Some(writer) = self.current.take() {
            if writer.record_count() > 0 {
                self.finished.push(writer.finish()?);
            } else {
                writer.abort();
            }
        }
        Ok(self.finished)
    }
}
