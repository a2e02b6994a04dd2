//! Dynamic bucket assignment.

use std::collections::{BTreeMap, HashMap};

/// Per-partition bucket placement targeting a configured row count.
///
/// For each partition the assigner tracks `bucket -> current row count`.
/// A new key goes to the first shard-owned bucket below the target; when
/// every known bucket is full, the smallest unused shard-owned bucket id
/// is opened. Given the same bootstrap count snapshot this is fully
/// deterministic, and because only owned buckets are ever picked, the
/// assigners of different shards write disjoint bucket sets.
#[derive(Debug)]
pub struct BucketAssigner {
    shard: usize,
    num_shards: usize,
    target_rows: u64,
    counts: HashMap<u32, BTreeMap<i32, u64>>,
}

impl BucketAssigner {
    /// Creates an assigner for shard `shard` of `num_shards`, targeting
    /// `target_rows` rows per bucket.
    #[must_use]
    pub fn new(shard: usize, num_shards: usize, target_rows: u64) -> Self {
        Self {
            shard,
            num_shards: num_shards.max(1),
            target_rows: target_rows.max(1),
            counts: HashMap::new(),
        }
    }

    /// `true` if this shard owns `bucket` (`|b| mod M == s`).
    #[must_use]
    pub fn owns(&self, bucket: i32) -> bool {
        (bucket.unsigned_abs() as usize) % self.num_shards == self.shard
    }

    /// Assigns a bucket for a new key in partition `pid`, incrementing
    /// the chosen bucket's count.
    pub fn assign(&mut self, pid: u32) -> i32 {
        let counts = self.counts.entry(pid).or_default();

        // First owned bucket with headroom, in ascending id order.
        for (&bucket, count) in counts.iter_mut() {
            if *count < self.target_rows {
                // Only owned buckets are ever inserted, but guard anyway
                // against counts seeded from a foreign snapshot.
                if (bucket.unsigned_abs() as usize) % self.num_shards == self.shard {
                    *count += 1;
                    return bucket;
                }
            }
        }

        // All known buckets are full: open the smallest owned id that is
        // not in the map yet.
        let mut candidate = self.shard as i32;
        while counts.contains_key(&candidate) {
            candidate += self.num_shards as i32;
        }
        counts.insert(candidate, 1);
        candidate
    }

    /// Seeds a bucket's row count from the bootstrap scan.
    pub fn seed(&mut self, pid: u32, bucket: i32, count: u64) {
        self.counts.entry(pid).or_default().insert(bucket, count);
    }

    /// Adds one row to a bucket's count (bootstrap accumulation).
    pub fn count_up(&mut self, pid: u32, bucket: i32) {
        *self
            .counts
            .entry(pid)
            .or_default()
            .entry(bucket)
            .or_insert(0) += 1;
    }

    /// Removes one row from a bucket's count (a key retracted out of the
    /// bucket).
    pub fn count_down(&mut self, pid: u32, bucket: i32) {
        if let Some(count) = self.counts.get_mut(&pid).and_then(|m| m.get_mut(&bucket)) {
            *count = count.saturating_sub(1);
        }
    }

    /// Current row count of a bucket.
    #[must_use]
    pub fn count(&self, pid: u32, bucket: i32) -> u64 {
        self.counts
            .get(&pid)
            .and_then(|m| m.get(&bucket))
            .copied()
            .unwrap_or(0)
    }
}
