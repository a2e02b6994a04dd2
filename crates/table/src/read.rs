//! Merge-on-read: plan, merge, emit live rows.

use crate::paths::{bucket_dir_binary, manifest_dir};
use crate::table::Table;
use anyhow::{Context, Result};
use datafile::{ConcatIterator, DataFileMeta, DataFileReader};
use manifest::{ManifestEntry, ScanKind, ScanPlanner};
use mergefn::{MergeFunction, MergeReader};
use mergetree::Levels;
use row::{BinaryRow, KeyValue, KvIterator, LoserTree, Predicate, Row};
use std::path::Path;

/// Reads a table snapshot through the configured merge engine.
///
/// This is the read surface the engine's correctness laws are stated
/// against: `read_all` after a commit equals the reference application
/// of the change stream, and compaction never changes its result.
pub struct TableRead {
    table: Table,
    value_filter: Option<Predicate>,
    partition_filter: Option<Predicate>,
}

impl TableRead {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            value_filter: None,
            partition_filter: None,
        }
    }

    /// Installs a value-column filter (statistics pushdown plus a final
    /// row filter).
    #[must_use]
    pub fn with_value_filter(mut self, filter: Predicate) -> Self {
        self.value_filter = Some(filter);
        self
    }

    /// Installs a partition filter.
    #[must_use]
    pub fn with_partition_filter(mut self, filter: Predicate) -> Self {
        self.partition_filter = Some(filter);
        self
    }

    /// Plans the latest snapshot; empty on a fresh table.
    pub fn plan(&self, kind: ScanKind) -> Result<Vec<ManifestEntry>> {
        let manager = self.table.snapshots()?;
        let Some(snapshot) = manager.latest_snapshot()? else {
            return Ok(Vec::new());
        };
        self.plan_snapshot(&snapshot, kind)
    }

    fn plan_snapshot(
        &self,
        snapshot: &manifest::Snapshot,
        kind: ScanKind,
    ) -> Result<Vec<ManifestEntry>> {
        let mut planner = ScanPlanner::new(
            &manifest_dir(self.table.root()),
            self.table.options().bucket,
        )
        .with_kind(kind)
        .with_parallelism(self.table.options().scan_manifest_parallelism);
        if let Some(filter) = &self.partition_filter {
            planner = planner.with_partition_filter(filter.clone());
        }
        if let Some(filter) = &self.value_filter {
            planner = planner.with_value_filter(filter.clone());
        }
        Ok(planner.plan(snapshot)?)
    }

    /// Reads every live row of the latest snapshot, merged per
    /// (partition, bucket) by the configured merge engine.
    pub fn read_all(&self) -> Result<Vec<Row>> {
        let entries = self.plan(ScanKind::All)?;
        let factory = self.table.merge_factory()?;
        let mut rows = Vec::new();
        for ((partition, bucket), files) in group_by_bucket(entries) {
            let dir = bucket_dir_binary(
                self.table.root(),
                self.table.schema(),
                &partition,
                bucket,
            )?;
            for kv in merge_read_group(&dir, files, factory())? {
                if kv.kind.is_retract() {
                    continue;
                }
                if let Some(filter) = &self.value_filter {
                    if !filter.test_row(&kv.value) {
                        continue;
                    }
                }
                rows.push(kv.value);
            }
        }
        Ok(rows)
    }

    /// Reads the raw changelog records of snapshot `id`, in file order.
    pub fn read_changelog(&self, snapshot_id: u64) -> Result<Vec<KeyValue>> {
        let manager = self.table.snapshots()?;
        let snapshot = manager.snapshot(snapshot_id)?;
        let entries = self.plan_snapshot(&snapshot, ScanKind::Changelog)?;
        let mut records = Vec::new();
        for entry in entries {
            let dir = bucket_dir_binary(
                self.table.root(),
                self.table.schema(),
                &entry.partition,
                entry.bucket,
            )?;
            let reader = DataFileReader::open(&dir.join(&entry.file.file_name))
                .with_context(|| format!("changelog file {}", entry.file.file_name))?;
            let mut iter = reader.iter()?;
            while let Some(kv) = iter.read_record()? {
                records.push(kv);
            }
        }
        Ok(records)
    }
}

/// Groups plan output by (partition, bucket), preserving plan order.
pub(crate) fn group_by_bucket(
    entries: Vec<ManifestEntry>,
) -> Vec<((BinaryRow, i32), Vec<DataFileMeta>)> {
    let mut groups: Vec<((BinaryRow, i32), Vec<DataFileMeta>)> = Vec::new();
    for entry in entries {
        let key = (entry.partition.clone(), entry.bucket);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, files)) => files.push(entry.file),
            None => groups.push((key, vec![entry.file])),
        }
    }
    groups
}

/// Merge-reads one bucket's file set: loser tree over the sorted runs,
/// reduced by `function`. Returns the merged records, retractions
/// included (callers drop them as needed).
pub(crate) fn merge_read_group(
    dir: &Path,
    files: Vec<DataFileMeta>,
    function: MergeFunction,
) -> Result<Vec<KeyValue>> {
    let levels = Levels::restore(files);
    let mut sources: Vec<Box<dyn KvIterator + Send>> = Vec::new();
    for run in levels.runs() {
        if run.files.len() == 1 {
            let reader = DataFileReader::open(&dir.join(&run.files[0].file_name))?;
            sources.push(Box::new(reader.iter()?));
        } else {
            sources.push(Box::new(ConcatIterator::new(dir, run.files)));
        }
    }
    let mut merged = MergeReader::new(LoserTree::new(sources)?, function);
    let mut records = Vec::new();
    while let Some(kv) = merged.next_merged()? {
        records.push(kv);
    }
    Ok(records)
}
