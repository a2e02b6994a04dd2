//! The write session: routing change records to per-bucket writers.

use crate::commit::CommitMessage;
use crate::paths::{bucket_dir_binary, index_shard_dir, manifest_dir};
use crate::read::{group_by_bucket, merge_read_group};
use crate::table::Table;
use anyhow::{Context, Result};
use datafile::DataFileMeta;
use index::{Bootstrap, BootstrapRecord, ExistsAction, GlobalIndexAssigner};
use manifest::{ScanKind, ScanPlanner};
use mergetree::{MergeTreeWriter, WriterOptions};
use row::{BinaryRow, Datum, KeyValue, Row, RowKind};
use std::collections::HashMap;
use tracing::{debug, info};

/// One write session over a table.
///
/// Routes each change record to its (partition, bucket) writer. In
/// static mode the bucket is a hash of the bucket key modulo the bucket
/// count; in dynamic mode records pass through the global index
/// assigner, which may also emit a paired retraction when a key
/// migrates partitions.
pub struct TableWrite {
    table: Table,
    partition_proj: Vec<usize>,
    key_proj: Vec<usize>,
    bucket_key_proj: Vec<usize>,
    seq_field: Option<usize>,
    writers: HashMap<(Vec<u8>, i32), MergeTreeWriter>,
    assigner: Option<GlobalIndexAssigner>,
    /// Overwrite sessions replace the table wholesale: no level
    /// restoration, so a pending rescale cannot block them.
    restore: bool,
}

impl TableWrite {
    pub(crate) fn new(table: Table) -> Result<Self> {
        Self::with_restore(table, true)
    }

    pub(crate) fn new_for_overwrite(table: Table) -> Result<Self> {
        Self::with_restore(table, false)
    }

    fn with_restore(table: Table, restore: bool) -> Result<Self> {
        let schema = table.schema();
        let partition_proj = schema.partition_projection()?;
        let key_proj = schema.trimmed_primary_key_projection()?;
        let bucket_key_proj = if table.options().bucket_key.is_empty() {
            key_proj.clone()
        } else {
            table
                .options()
                .bucket_key
                .iter()
                .map(|name| schema.field_index(name))
                .collect::<Result<Vec<_>, _>>()?
        };
        let seq_field = match &table.options().sequence_field {
            Some(name) => Some(schema.field_index(name)?),
            None => None,
        };

        let assigner = if table.options().dynamic_bucket() && restore {
            Some(build_assigner(&table)?)
        } else if table.options().dynamic_bucket() {
            // Overwrite starts from an empty index; keys re-assign as
            // the replacement data streams in.
            Some(empty_assigner(&table)?)
        } else {
            None
        };

        Ok(Self {
            table,
            partition_proj,
            key_proj,
            bucket_key_proj,
            seq_field,
            writers: HashMap::new(),
            assigner,
            restore,
        })
    }

    /// Writes one change record (a full row plus its change kind).
    pub fn write(&mut self, kind: RowKind, row: Row) -> Result<()> {
        anyhow::ensure!(
            row.arity() == self.table.schema().fields.len(),
            "row arity {} does not match schema arity {}",
            row.arity(),
            self.table.schema().fields.len()
        );

        let partition = row.project(&self.partition_proj).to_binary();
        let key = row.project(&self.key_proj).to_binary();
        let seq = self.extract_seq(&row);

        if let Some(assigner) = self.assigner.as_mut() {
            let kv = KeyValue::new(key, seq.unwrap_or(0), kind, row);
            let routed = assigner.route(partition, kv)?;
            for record in routed {
                let seq_opt = self.seq_field.map(|_| record.kv.seq);
                // The assigner may have redirected the record (or built a
                // retraction) for a partition other than the row's own;
                // the row's partition columns must match its destination.
                let mut value = record.kv.value;
                let destination = record.partition.to_row()?;
                for (slot, datum) in self.partition_proj.iter().zip(destination.0) {
                    value.0[*slot] = datum;
                }
                self.writer_for(&record.partition, record.bucket)?.write(
                    record.kv.key,
                    record.kv.kind,
                    value,
                    seq_opt,
                )?;
            }
            return Ok(());
        }

        let bucket = self.static_bucket(&row);
        self.writer_for(&partition, bucket)?
            .write(key, kind, row, seq)?;
        Ok(())
    }

    /// Flushes every writer and collects the per-bucket commit
    /// messages. With `wait_for_compaction`, each writer drains its
    /// background compaction first.
    pub fn prepare_commit(&mut self, wait_for_compaction: bool) -> Result<Vec<CommitMessage>> {
        let total_buckets = self.table.options().bucket;
        let mut messages = Vec::new();
        for ((partition_bytes, bucket), writer) in &mut self.writers {
            let increment = writer.prepare_commit(wait_for_compaction)?;
            if increment.is_empty() {
                continue;
            }
            messages.push(CommitMessage {
                partition: BinaryRow::from_bytes(partition_bytes.clone()),
                bucket: *bucket,
                total_buckets,
                increment,
            });
        }
        messages.sort_by(|a, b| {
            a.partition
                .as_bytes()
                .cmp(b.partition.as_bytes())
                .then(a.bucket.cmp(&b.bucket))
        });
        Ok(messages)
    }

    /// Ends the session, dropping buffered state and stopping the
    /// background workers.
    pub fn close(self) {
        for (_, writer) in self.writers {
            writer.close();
        }
    }

    /// Static bucket choice: hash of the bucket key modulo the count.
    fn static_bucket(&self, row: &Row) -> i32 {
        let bucket_key = row.project(&self.bucket_key_proj).to_binary();
        let hash = crc32fast::hash(bucket_key.as_bytes());
        (hash % self.table.options().bucket as u32) as i32
    }

    fn extract_seq(&self, row: &Row) -> Option<u64> {
        let field = self.seq_field?;
        match row.field(field) {
            Datum::Int(v) => Some((*v).max(0) as u64),
            Datum::Long(v) | Datum::TimestampMillis(v) => Some((*v).max(0) as u64),
            _ => None,
        }
    }

    fn writer_for(
        &mut self,
        partition: &BinaryRow,
        bucket: i32,
    ) -> Result<&mut MergeTreeWriter> {
        let map_key = (partition.as_bytes().to_vec(), bucket);
        if !self.writers.contains_key(&map_key) {
            let dir = bucket_dir_binary(self.table.root(), self.table.schema(), partition, bucket)?;
            let restored = self.restore_files(partition, bucket)?;
            debug!(
                partition = %partition,
                bucket,
                restored = restored.len(),
                "opening bucket writer"
            );
            let writer = MergeTreeWriter::new(
                &dir,
                WriterOptions::from_core(self.table.options(), self.table.schema().id),
                restored,
                self.table.merge_factory()?,
            )?;
            self.writers.insert(map_key.clone(), writer);
        }
        Ok(self
            .writers
            .get_mut(&map_key)
            .expect("writer inserted above"))
    }

    /// The bucket's live files at the latest snapshot, for level
    /// restoration.
    fn restore_files(&self, partition: &BinaryRow, bucket: i32) -> Result<Vec<DataFileMeta>> {
        if !self.restore {
            return Ok(Vec::new());
        }
        let manager = self.table.snapshots()?;
        let Some(snapshot) = manager.latest_snapshot()? else {
            return Ok(Vec::new());
        };
        let entries = ScanPlanner::new(
            &manifest_dir(self.table.root()),
            self.table.options().bucket,
        )
        .with_bucket(bucket)
        .with_parallelism(self.table.options().scan_manifest_parallelism)
        .plan(&snapshot)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.partition == *partition)
            .map(|e| e.file)
            .collect())
    }
}

/// An assigner with an empty index (overwrite sessions).
fn empty_assigner(table: &Table) -> Result<GlobalIndexAssigner> {
    let options = table.options();
    Ok(GlobalIndexAssigner::new(
        &index_shard_dir(table.root(), 0),
        0,
        1,
        ExistsAction::for_engine(options.merge_engine),
        options.dynamic_bucket_target_row_num,
        options.cross_partition_index_ttl,
    )?)
}

/// Builds (and, when the table has data, bootstraps) the single-shard
/// global index assigner of this write session.
fn build_assigner(table: &Table) -> Result<GlobalIndexAssigner> {
    let options = table.options();
    let action = ExistsAction::for_engine(options.merge_engine);
    let shard_dir = index_shard_dir(table.root(), 0);
    let mut assigner = GlobalIndexAssigner::new(
        &shard_dir,
        0,
        1,
        action,
        options.dynamic_bucket_target_row_num,
        options.cross_partition_index_ttl,
    )?;

    let manager = table.snapshots()?;
    if let Some(snapshot) = manager.latest_snapshot()? {
        let entries = ScanPlanner::new(&manifest_dir(table.root()), options.bucket)
            .with_parallelism(options.scan_manifest_parallelism)
            .plan(&snapshot)?;
        let factory = table.merge_factory()?;

        let mut records: Vec<anyhow::Result<BootstrapRecord>> = Vec::new();
        for ((partition, bucket), files) in group_by_bucket(entries) {
            let dir = bucket_dir_binary(table.root(), table.schema(), &partition, bucket)?;
            for kv in merge_read_group(&dir, files, factory())? {
                if kv.kind.is_retract() {
                    continue;
                }
                records.push(Ok(BootstrapRecord {
                    key: kv.key,
                    seq: kv.seq,
                    partition: partition.clone(),
                    bucket,
                }));
            }
        }
        let loaded = Bootstrap::run(
            &mut assigner,
            options.merge_engine,
            records,
            &shard_dir.join(".bootstrap-sort"),
            options.write_buffer_size,
            options.local_sort_max_num_file_handles,
        )
        .context("global index bootstrap")?;
        info!(keys = loaded, "bootstrapped global index from table scan");
    }
    Ok(assigner)
}
