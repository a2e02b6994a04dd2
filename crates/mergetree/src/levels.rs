//! Sorted-run bookkeeping for one bucket.

use datafile::DataFileMeta;
use std::collections::BTreeMap;

/// One merge input: a set of files with non-overlapping key ranges.
///
/// Level 0 breaks the rule deliberately — every freshly flushed file is
/// its own single-file run, and level-0 runs overlap freely. Levels >= 1
/// hold exactly one run each.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedRun {
    pub level: u32,
    pub files: Vec<DataFileMeta>,
}

impl SortedRun {
    /// Total byte size of the run.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.files.iter().map(|f| f.file_size).sum()
    }
}

/// The level structure of one (partition, bucket).
#[derive(Debug, Default)]
pub struct Levels {
    /// Level-0 files, newest first (descending max sequence).
    level0: Vec<DataFileMeta>,
    /// One sorted run per non-empty level >= 1.
    uppers: BTreeMap<u32, Vec<DataFileMeta>>,
}

impl Levels {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores the structure from a scan plan's file set.
    #[must_use]
    pub fn restore(files: Vec<DataFileMeta>) -> Self {
        let mut levels = Self::new();
        for file in files {
            levels.add(file);
        }
        levels
    }

    /// Adds one file at its recorded level.
    pub fn add(&mut self, file: DataFileMeta) {
        if file.level == 0 {
            let pos = self
                .level0
                .iter()
                .position(|f| f.max_seq < file.max_seq)
                .unwrap_or(self.level0.len());
            self.level0.insert(pos, file);
        } else {
            self.uppers.entry(file.level).or_default().push(file);
        }
    }

    /// Removes the given files (by name) from whatever level holds them.
    pub fn remove(&mut self, files: &[DataFileMeta]) {
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        self.level0.retain(|f| !names.contains(&f.file_name.as_str()));
        self.uppers.retain(|_, run| {
            run.retain(|f| !names.contains(&f.file_name.as_str()));
            !run.is_empty()
        });
    }

    /// All sorted runs in merge precedence order: level-0 newest first,
    /// then each upper level ascending.
    #[must_use]
    pub fn runs(&self) -> Vec<SortedRun> {
        let mut runs: Vec<SortedRun> = self
            .level0
            .iter()
            .map(|f| SortedRun {
                level: 0,
                files: vec![f.clone()],
            })
            .collect();
        for (&level, files) in &self.uppers {
            runs.push(SortedRun {
                level,
                files: files.clone(),
            });
        }
        runs
    }

    /// Number of sorted runs (level-0 files + non-empty upper levels).
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.level0.len() + self.uppers.len()
    }

    /// Highest occupied level, 0 when only level 0 has data.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.uppers.keys().next_back().copied().unwrap_or(0)
    }

    /// Every live file, for commit restoration and reads.
    #[must_use]
    pub fn all_files(&self) -> Vec<DataFileMeta> {
        let mut files = self.level0.clone();
        for run in self.uppers.values() {
            files.extend(run.iter().cloned());
        }
        files
    }

    /// `true` when no file is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.level0.is_empty() && self.uppers.is_empty()
    }

    /// Largest sequence number across all files, 0 when empty.
    #[must_use]
    pub fn max_seq(&self) -> u64 {
        self.all_files().iter().map(|f| f.max_seq).max().unwrap_or(0)
    }
}
