//! Steady-state cross-partition routing.

use crate::assign::BucketAssigner;
use crate::idmapping::IdMapping;
use crate::IndexError;
use config::MergeEngine;
use indexkv::IndexStore;
use integer_encoding::VarInt;
use row::{BinaryRow, KeyValue, RowKind};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// What to do when an incoming key already lives in another partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistsAction {
    /// Retract the old location, insert at the new one (`deduplicate`).
    Delete,
    /// Keep the key where it is; rewrite the record's partition
    /// (`partial-update` and `aggregate`, whose accumulators cannot be
    /// split across a partition move).
    UseOld,
    /// Drop the record (`first-row`).
    SkipNew,
}

impl ExistsAction {
    /// The action implied by a merge engine.
    #[must_use]
    pub fn for_engine(engine: MergeEngine) -> Self {
        match engine {
            MergeEngine::Deduplicate => ExistsAction::Delete,
            MergeEngine::PartialUpdate | MergeEngine::Aggregate => ExistsAction::UseOld,
            MergeEngine::FirstRow => ExistsAction::SkipNew,
        }
    }
}

/// A record with its resolved destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedRecord {
    pub partition: BinaryRow,
    pub bucket: i32,
    pub kv: KeyValue,
}

/// One shard's global index: KV store + id mapping + bucket assigner.
#[derive(Debug)]
pub struct GlobalIndexAssigner {
    store: IndexStore,
    ids: IdMapping,
    buckets: BucketAssigner,
    action: ExistsAction,
}

impl GlobalIndexAssigner {
    /// Opens the shard's store under `dir`.
    pub fn new(
        dir: &Path,
        shard: usize,
        num_shards: usize,
        action: ExistsAction,
        target_rows: u64,
        ttl: Option<Duration>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            store: IndexStore::open(dir, ttl)?,
            ids: IdMapping::new(),
            buckets: BucketAssigner::new(shard, num_shards, target_rows),
            action,
        })
    }

    /// Routes one record, returning zero, one or two destination-tagged
    /// records (a migration under [`ExistsAction::Delete`] emits the
    /// retraction first).
    pub fn route(
        &mut self,
        partition: BinaryRow,
        kv: KeyValue,
    ) -> Result<Vec<RoutedRecord>, IndexError> {
        let new_pid = self.ids.id_of(&partition);

        let existing = match self.store.get(&kv.key)? {
            Some(bytes) => Some(decode_location(&kv.key, &bytes)?),
            None => None,
        };

        match existing {
            None => {
                let bucket = self.buckets.assign(new_pid);
                self.store
                    .put(kv.key.clone(), encode_location(new_pid, bucket))?;
                Ok(vec![RoutedRecord {
                    partition,
                    bucket,
                    kv,
                }])
            }
            Some((old_pid, old_bucket)) if old_pid == new_pid => Ok(vec![RoutedRecord {
                partition,
                bucket: old_bucket,
                kv,
            }]),
            Some((old_pid, old_bucket)) => match self.action {
                ExistsAction::Delete => {
                    let old_partition = self
                        .ids
                        .partition_of(old_pid)
                        .cloned()
                        .ok_or_else(|| IndexError::CorruptEntry {
                            key: kv.key.to_string(),
                        })?;
                    debug!(key = %kv.key, from = %old_partition, to = %partition, "key migrated partitions");

                    let retraction = KeyValue::new(
                        kv.key.clone(),
                        kv.seq,
                        RowKind::Delete,
                        kv.value.clone(),
                    );
                    self.buckets.count_down(old_pid, old_bucket);

                    let bucket = self.buckets.assign(new_pid);
                    self.store
                        .put(kv.key.clone(), encode_location(new_pid, bucket))?;
                    Ok(vec![
                        RoutedRecord {
                            partition: old_partition,
                            bucket: old_bucket,
                            kv: retraction,
                        },
                        RoutedRecord {
                            partition,
                            bucket,
                            kv,
                        },
                    ])
                }
                ExistsAction::UseOld => {
                    let old_partition = self
                        .ids
                        .partition_of(old_pid)
                        .cloned()
                        .ok_or_else(|| IndexError::CorruptEntry {
                            key: kv.key.to_string(),
                        })?;
                    Ok(vec![RoutedRecord {
                        partition: old_partition,
                        bucket: old_bucket,
                        kv,
                    }])
                }
                ExistsAction::SkipNew => Ok(Vec::new()),
            },
        }
    }

    /// Direct lookup (tests and diagnostics).
    pub fn lookup(&self, key: &BinaryRow) -> Result<Option<(u32, i32)>, IndexError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(decode_location(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// The id mapping (shared with bootstrap).
    pub(crate) fn parts(
        &mut self,
    ) -> (&mut IndexStore, &mut IdMapping, &mut BucketAssigner) {
        (&mut self.store, &mut self.ids, &mut self.buckets)
    }

    /// `true` if this shard owns `bucket`.
    #[must_use]
    pub fn owns(&self, bucket: i32) -> bool {
        self.buckets.owns(bucket)
    }

    /// The configured exists-action.
    #[must_use]
    pub fn action(&self) -> ExistsAction {
        self.action
    }
}

/// Encodes `(partition-id, bucket)` as two varints.
pub(crate) fn encode_location(pid: u32, bucket: i32) -> Vec<u8> {
    let mut out = pid.encode_var_vec();
    out.extend_from_slice(&bucket.encode_var_vec());
    out
}

/// Decodes a location written by [`encode_location`].
pub(crate) fn decode_location(key: &BinaryRow, bytes: &[u8]) -> Result<(u32, i32), IndexError> {
    let corrupt = || IndexError::CorruptEntry {
        key: key.to_string(),
    };
    let (pid, n) = u32::decode_var(bytes).ok_or_else(corrupt)?;
    let (bucket, _) = i32::decode_var(&bytes[n..]).ok_or_else(corrupt)?;
    Ok((pid, bucket))
}
