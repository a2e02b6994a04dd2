//! The two-stage sorter.

use crate::spill::{SpillReader, SpillWriter};
use anyhow::{Context, Result};
use row::{compare_binary_rows, KeyValue, KvIterator, LoserTree, NormalizedKey, VecIterator};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sorts records by (key, seq) with a bounded in-memory budget, spilling
/// sorted runs to disk when the budget is exceeded.
///
/// The in-memory phase keeps an 8-byte normalized key next to each record
/// so the sort's hot comparisons stay within one cache line; only equal
/// prefixes decode the full binary key.
pub struct SortBuffer {
    dir: PathBuf,
    memory_budget: usize,
    max_fan_in: usize,
    records: Vec<(NormalizedKey, KeyValue)>,
    mem_bytes: usize,
    spills: Vec<PathBuf>,
    next_run: u64,
}

impl SortBuffer {
    /// Creates a sorter spilling under `dir`.
    ///
    /// `memory_budget` is the in-memory byte threshold; `max_fan_in`
    /// bounds how many spill runs may exist before an intermediate merge
    /// folds them into one (`local-sort.max-num-file-handles`).
    pub fn new(dir: &Path, memory_budget: usize, max_fan_in: usize) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create sort dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            memory_budget: memory_budget.max(1),
            max_fan_in: max_fan_in.max(2),
            records: Vec::new(),
            mem_bytes: 0,
            spills: Vec::new(),
            next_run: 0,
        })
    }

    /// Adds one record, spilling if the memory budget is exceeded.
    pub fn add(&mut self, kv: KeyValue) -> Result<()> {
        self.mem_bytes += kv.approx_size();
        self.records.push((kv.key.normalized_key(), kv));
        if self.mem_bytes >= self.memory_budget {
            self.spill()?;
        }
        Ok(())
    }

    /// Total records added (in memory + spilled is not tracked; this is
    /// the in-memory count only, exposed for flush decisions).
    #[must_use]
    pub fn in_memory_len(&self) -> usize {
        self.records.len()
    }

    /// `true` if nothing was ever added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.spills.is_empty()
    }

    /// `true` once at least one run has been spilled to disk.
    #[must_use]
    pub fn spilled(&self) -> bool {
        !self.spills.is_empty()
    }

    fn sort_in_memory(records: &mut [(NormalizedKey, KeyValue)]) {
        records.sort_unstable_by(|(na, a), (nb, b)| {
            na.cmp(nb)
                .then_with(|| compare_binary_rows(&a.key, &b.key))
                .then_with(|| a.seq.cmp(&b.seq))
        });
    }

    /// Sorts the in-memory batch and writes it out as one spill run.
    fn spill(&mut self) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        Self::sort_in_memory(&mut self.records);

        let path = self.dir.join(format!("spill-{:06}.run", self.next_run));
        self.next_run += 1;
        let mut writer = SpillWriter::create(&path)?;
        for (_, kv) in self.records.drain(..) {
            writer.append(&kv)?;
        }
        writer.finish()?;
        debug!(run = %path.display(), bytes = self.mem_bytes, "spilled sort run");

        self.mem_bytes = 0;
        self.spills.push(path);

        if self.spills.len() >= self.max_fan_in {
            self.merge_spills()?;
        }
        Ok(())
    }

    /// Folds all current spill runs into a single larger run, keeping the
    /// open-file count bounded by the configured fan-in.
    fn merge_spills(&mut self) -> Result<()> {
        let inputs = std::mem::take(&mut self.spills);
        let mut sources = Vec::with_capacity(inputs.len());
        for path in &inputs {
            sources.push(SpillReader::open(path)?);
        }
        let mut tree = LoserTree::new(sources)?;

        let path = self.dir.join(format!("spill-{:06}.run", self.next_run));
        self.next_run += 1;
        let mut writer = SpillWriter::create(&path)?;
        while let Some(kv) = tree.next_record()? {
            writer.append(&kv)?;
        }
        let merged = writer.record_count();
        writer.finish()?;
        debug!(runs = inputs.len(), records = merged, "merged spill runs");

        for path in inputs {
            let _ = fs::remove_file(path);
        }
        self.spills.push(path);
        Ok(())
    }

    /// Finishes the sort: merges the surviving spill runs with the
    /// remaining in-memory tail into one ascending (key, seq) iterator.
    pub fn sorted_iterator(mut self) -> Result<SortedIterator> {
        Self::sort_in_memory(&mut self.records);
        let tail: Vec<KeyValue> = self.records.drain(..).map(|(_, kv)| kv).collect();

        let mut sources: Vec<Box<dyn KvIterator + Send>> = Vec::new();
        for path in &self.spills {
            sources.push(Box::new(SpillReader::open(path)?));
        }
        if !tail.is_empty() {
            sources.push(Box::new(VecIterator::new(tail)));
        }
        let tree = LoserTree::new(sources)?;
        Ok(SortedIterator {
            tree,
            _cleanup: SpillCleanup {
                files: std::mem::take(&mut self.spills),
            },
        })
    }
}

impl Drop for SortBuffer {
    fn drop(&mut self) {
        // Abandoned without sorted_iterator(): remove leftover runs.
        for path in &self.spills {
            let _ = fs::remove_file(path);
        }
    }
}

/// Removes spill files once the merge that reads them is dropped.
struct SpillCleanup {
    files: Vec<PathBuf>,
}

impl Drop for SpillCleanup {
    fn drop(&mut self) {
        for path in &self.files {
            let _ = fs::remove_file(path);
        }
    }
}

/// The final merged output of a [`SortBuffer`].
pub struct SortedIterator {
    tree: LoserTree<Box<dyn KvIterator + Send>>,
    _cleanup: SpillCleanup,
}

impl KvIterator for SortedIterator {
    fn advance(&mut self) -> Result<Option<KeyValue>> {
        self.tree.next_record()
    }
}
