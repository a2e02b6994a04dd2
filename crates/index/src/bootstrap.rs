//! Index bootstrap: bulk-loading the store from existing table contents.

use crate::routing::{encode_location, GlobalIndexAssigner};
use crate::IndexError;
use config::MergeEngine;
use row::{BinaryRow, Datum, KeyValue, KvIterator, Row, RowKind};
use sortbuffer::SortBuffer;
use std::path::Path;
use tracing::info;

/// One live row observed while scanning the existing table.
#[derive(Debug, Clone)]
pub struct BootstrapRecord {
    pub key: BinaryRow,
    pub seq: u64,
    pub partition: BinaryRow,
    pub bucket: i32,
}

/// The startup bulk-load.
///
/// Feeds `(pk, seq, partition-id, bucket)` tuples through the external
/// sorter, deduplicates per key, seeds the bucket assigner's row counts
/// and bulk-loads the KV store in one pass. Records for buckets this
/// shard does not own are skipped — each shard bootstraps exactly the
/// slice it will serve.
pub struct Bootstrap;

impl Bootstrap {
    /// Runs the bootstrap; returns the number of keys loaded.
    ///
    /// Duplicate resolution follows the merge engine: `deduplicate`
    /// keeps the newest location, `first-row` the earliest;
    /// `partial-update` and `aggregate` have no cross-partition policy,
    /// so two live rows for one key in different partitions fail with
    /// [`IndexError::DuplicateKey`].
    pub fn run<I>(
        assigner: &mut GlobalIndexAssigner,
        engine: MergeEngine,
        records: I,
        sort_dir: &Path,
        sort_memory: usize,
        sort_fan_in: usize,
    ) -> Result<u64, IndexError>
    where
        I: IntoIterator<Item = anyhow::Result<BootstrapRecord>>,
    {
        let mut sorter = SortBuffer::new(sort_dir, sort_memory, sort_fan_in)?;

        {
            let (_, ids, buckets) = assigner.parts();
            for record in records {
                let record = record?;
                if !buckets.owns(record.bucket) {
                    continue;
                }
                let pid = ids.id_of(&record.partition);
                sorter.add(KeyValue::new(
                    record.key,
                    record.seq,
                    RowKind::Insert,
                    Row::new(vec![
                        Datum::Long(i64::from(pid)),
                        Datum::Long(i64::from(record.bucket)),
                    ]),
                ))?;
            }
        }

        let mut sorted = sorter.sorted_iterator()?;
        let mut loaded: Vec<(BinaryRow, Vec<u8>)> = Vec::new();
        let mut cluster: Vec<KeyValue> = Vec::new();

        let flush_cluster = |cluster: &mut Vec<KeyValue>,
                                 loaded: &mut Vec<(BinaryRow, Vec<u8>)>,
                                 assigner: &mut GlobalIndexAssigner|
         -> Result<(), IndexError> {
            if cluster.is_empty() {
                return Ok(());
            }
            let chosen = resolve_cluster(cluster, engine)?;
            let (pid, bucket) = location_of(&chosen);
            let (_, _, buckets) = assigner.parts();
            buckets.count_up(pid, bucket);
            loaded.push((chosen.key.clone(), encode_location(pid, bucket)));
            cluster.clear();
            Ok(())
        };

        while let Some(kv) = sorted.advance()? {
            if let Some(first) = cluster.first() {
                if first.key != kv.key {
                    flush_cluster(&mut cluster, &mut loaded, assigner)?;
                }
            }
            cluster.push(kv);
        }
        flush_cluster(&mut cluster, &mut loaded, assigner)?;
        drop(sorted);

        let count = loaded.len() as u64;
        let (store, _, _) = assigner.parts();
        store.bulk_load(loaded)?;
        info!(keys = count, "global index bootstrap complete");
        Ok(count)
    }
}

/// Picks the surviving location among all versions of one key.
fn resolve_cluster(cluster: &[KeyValue], engine: MergeEngine) -> Result<KeyValue, IndexError> {
    // Versions arrive in ascending seq order.
    let first = cluster.first().expect("cluster is non-empty");
    let last = cluster.last().expect("cluster is non-empty");
    match engine {
        MergeEngine::Deduplicate => Ok(last.clone()),
        MergeEngine::FirstRow => Ok(first.clone()),
        MergeEngine::PartialUpdate | MergeEngine::Aggregate => {
            let (first_pid, _) = location_of(first);
            for kv in cluster {
                let (pid, _) = location_of(kv);
                if pid != first_pid {
                    return Err(IndexError::DuplicateKey {
                        key: first.key.to_string(),
                        first: format!("partition-id {first_pid}"),
                        second: format!("partition-id {pid}"),
                        engine: match engine {
                            MergeEngine::PartialUpdate => "partial-update".to_string(),
                            _ => "aggregate".to_string(),
                        },
                    });
                }
            }
            Ok(last.clone())
        }
    }
}

fn location_of(kv: &KeyValue) -> (u32, i32) {
    let pid = match kv.value.field(0) {
        Datum::Long(v) => *v as u32,
        _ => 0,
    };
    let bucket = match kv.value.field(1) {
        Datum::Long(v) => *v as i32,
        _ => 0,
    };
    (pid, bucket)
}
