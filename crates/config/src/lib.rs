//! # Config — Typed Core Options
//!
//! Table behaviour is configured through a loose `key -> value` string
//! map (catalog properties, job options). That map is parsed **once**
//! into the typed [`CoreOptions`] struct; everything downstream reads
//! plain fields and the map never travels further. Under
//! [`CoreOptions::from_map_strict`] unrecognised keys are rejected
//! instead of silently ignored.

use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Option parsing and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown option '{0}'")]
    UnknownKey(String),

    #[error("invalid value '{value}' for option '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The per-key reducer applied during compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeEngine {
    #[default]
    Deduplicate,
    PartialUpdate,
    Aggregate,
    FirstRow,
}

impl MergeEngine {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "deduplicate" => Some(MergeEngine::Deduplicate),
            "partial-update" => Some(MergeEngine::PartialUpdate),
            "aggregate" => Some(MergeEngine::Aggregate),
            "first-row" => Some(MergeEngine::FirstRow),
            _ => None,
        }
    }
}

/// How changelog files are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangelogProducer {
    #[default]
    None,
    Input,
    FullCompaction,
    Lookup,
}

impl ChangelogProducer {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(ChangelogProducer::None),
            "input" => Some(ChangelogProducer::Input),
            "full-compaction" => Some(ChangelogProducer::FullCompaction),
            "lookup" => Some(ChangelogProducer::Lookup),
            _ => None,
        }
    }
}

/// Marker for dynamic bucket mode in the `bucket` option.
pub const DYNAMIC_BUCKET: i32 = -1;

/// Every recognised table option, typed and defaulted.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Static bucket count, or [`DYNAMIC_BUCKET`].
    pub bucket: i32,
    /// Columns hashed for bucketing; defaults to the trimmed primary key.
    pub bucket_key: Vec<String>,
    /// Memory per writer before flush / spill, in bytes.
    pub write_buffer_size: usize,
    /// Spill the write buffer instead of blocking when full.
    pub write_buffer_spillable: bool,
    /// Sorted-run count that schedules a compaction.
    pub num_sorted_run_compaction_trigger: usize,
    /// Sorted-run count that stalls writes.
    pub num_sorted_run_stop_trigger: usize,
    /// Universal-compaction size ratio, in percent.
    pub compaction_size_ratio: usize,
    /// Target size of one data file, in bytes.
    pub target_file_size: u64,
    pub changelog_producer: ChangelogProducer,
    pub merge_engine: MergeEngine,
    /// Drop retraction records in partial-update instead of erroring.
    pub partial_update_ignore_delete: bool,
    /// `fields.<gate>.sequence-group = col,col` declarations.
    pub sequence_groups: BTreeMap<String, Vec<String>>,
    /// `fields.<col>.aggregate-function = op` declarations.
    pub aggregate_functions: BTreeMap<String, String>,
    /// Column supplying sequence numbers; engine-assigned when absent.
    pub sequence_field: Option<String>,
    /// TTL on global-index entries.
    pub cross_partition_index_ttl: Option<Duration>,
    /// Target rows per bucket in dynamic mode.
    pub dynamic_bucket_target_row_num: u64,
    /// External-sort merge fan-in.
    pub local_sort_max_num_file_handles: usize,
    /// Manifest compaction: target size of one manifest file, in bytes.
    pub manifest_target_file_size: u64,
    /// Manifest compaction: base manifest count that triggers a fold.
    pub manifest_merge_min_count: usize,
    /// Snapshot retention bounds (expiration runs outside the core).
    pub snapshot_num_retained_min: usize,
    pub snapshot_num_retained_max: usize,
    pub snapshot_time_retained: Duration,
    /// Parallelism of manifest reads during planning.
    pub scan_manifest_parallelism: usize,
    /// Commit retry budget on snapshot conflicts.
    pub commit_max_retries: usize,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            bucket: DYNAMIC_BUCKET,
            bucket_key: Vec::new(),
            write_buffer_size: 256 * 1024 * 1024,
            write_buffer_spillable: false,
            num_sorted_run_compaction_trigger: 5,
            num_sorted_run_stop_trigger: 6,
            compaction_size_ratio: 1,
            target_file_size: 128 * 1024 * 1024,
            changelog_producer: ChangelogProducer::None,
            merge_engine: MergeEngine::Deduplicate,
            partial_update_ignore_delete: false,
            sequence_groups: BTreeMap::new(),
            aggregate_functions: BTreeMap::new(),
            sequence_field: None,
            cross_partition_index_ttl: None,
            dynamic_bucket_target_row_num: 2_000_000,
            local_sort_max_num_file_handles: 128,
            manifest_target_file_size: 8 * 1024 * 1024,
            manifest_merge_min_count: 30,
            snapshot_num_retained_min: 10,
            snapshot_num_retained_max: usize::MAX,
            snapshot_time_retained: Duration::from_secs(60 * 60),
            scan_manifest_parallelism: 8,
            commit_max_retries: 5,
        }
    }
}

impl CoreOptions {
    /// Parses options, ignoring unknown keys.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        Self::parse(map, false)
    }

    /// Parses options, rejecting unknown keys.
    pub fn from_map_strict(map: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        Self::parse(map, true)
    }

    fn parse(map: &BTreeMap<String, String>, strict: bool) -> Result<Self, ConfigError> {
        let mut options = CoreOptions::default();
        let mut stop_trigger_set = false;

        for (key, value) in map {
            match key.as_str() {
                "bucket" => options.bucket = parse_i32(key, value)?,
                "bucket-key" => options.bucket_key = parse_list(value),
                "write-buffer-size" => {
                    options.write_buffer_size = parse_size(key, value)? as usize
                }
                "write-buffer-spillable" => {
                    options.write_buffer_spillable = parse_bool(key, value)?
                }
                "num-sorted-run.compaction-trigger" => {
                    options.num_sorted_run_compaction_trigger = parse_usize(key, value)?
                }
                "num-sorted-run.stop-trigger" => {
                    options.num_sorted_run_stop_trigger = parse_usize(key, value)?;
                    stop_trigger_set = true;
                }
                "compaction.size-ratio" => {
                    options.compaction_size_ratio = parse_usize(key, value)?
                }
                "target-file-size" => options.target_file_size = parse_size(key, value)?,
                "changelog-producer" => {
                    options.changelog_producer = ChangelogProducer::parse(value).ok_or_else(
                        || invalid(key, value, "expected none|input|full-compaction|lookup"),
                    )?
                }
                "merge-engine" => {
                    options.merge_engine = MergeEngine::parse(value).ok_or_else(|| {
                        invalid(
                            key,
                            value,
                            "expected deduplicate|partial-update|aggregate|first-row",
                        )
                    })?
                }
                "partial-update.ignore-delete" => {
                    options.partial_update_ignore_delete = parse_bool(key, value)?
                }
                "sequence.field" => options.sequence_field = Some(value.clone()),
                "cross-partition-upsert.index-ttl" => {
                    options.cross_partition_index_ttl = Some(parse_duration(key, value)?)
                }
                "dynamic-bucket.target-row-num" => {
                    options.dynamic_bucket_target_row_num = parse_u64(key, value)?
                }
                "local-sort.max-num-file-handles" => {
                    options.local_sort_max_num_file_handles = parse_usize(key, value)?
                }
                "manifest.target-file-size" => {
                    options.manifest_target_file_size = parse_size(key, value)?
                }
                "manifest.merge-min-count" => {
                    options.manifest_merge_min_count = parse_usize(key, value)?
                }
                "snapshot.num-retained.min" => {
                    options.snapshot_num_retained_min = parse_usize(key, value)?
                }
                "snapshot.num-retained.max" => {
                    options.snapshot_num_retained_max = parse_usize(key, value)?
                }
                "snapshot.time-retained" => {
                    options.snapshot_time_retained = parse_duration(key, value)?
                }
                "scan.manifest.parallelism" => {
                    options.scan_manifest_parallelism = parse_usize(key, value)?
                }
                "commit.max-retries" => options.commit_max_retries = parse_usize(key, value)?,
                other => {
                    if let Some(rest) = other.strip_prefix("fields.") {
                        if let Some(field) = rest.strip_suffix(".sequence-group") {
                            options
                                .sequence_groups
                                .insert(field.to_string(), parse_list(value));
                            continue;
                        }
                        if let Some(field) = rest.strip_suffix(".aggregate-function") {
                            options
                                .aggregate_functions
                                .insert(field.to_string(), value.clone());
                            continue;
                        }
                    }
                    if strict {
                        return Err(ConfigError::UnknownKey(other.to_string()));
                    }
                }
            }
        }

        if !stop_trigger_set {
            options.num_sorted_run_stop_trigger = options.num_sorted_run_compaction_trigger + 1;
        }
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket == 0 || self.bucket < DYNAMIC_BUCKET {
            return Err(ConfigError::Invalid(format!(
                "'bucket' must be positive or {DYNAMIC_BUCKET} (dynamic), got {}",
                self.bucket
            )));
        }
        if self.num_sorted_run_compaction_trigger < 2 {
            return Err(ConfigError::Invalid(
                "'num-sorted-run.compaction-trigger' must be at least 2".to_string(),
            ));
        }
        if self.num_sorted_run_stop_trigger < self.num_sorted_run_compaction_trigger {
            return Err(ConfigError::Invalid(format!(
                "'num-sorted-run.stop-trigger' ({}) must not be below \
                 'num-sorted-run.compaction-trigger' ({})",
                self.num_sorted_run_stop_trigger, self.num_sorted_run_compaction_trigger
            )));
        }
        if self.dynamic_bucket_target_row_num == 0 {
            return Err(ConfigError::Invalid(
                "'dynamic-bucket.target-row-num' must be positive".to_string(),
            ));
        }
        if self.local_sort_max_num_file_handles < 2 {
            return Err(ConfigError::Invalid(
                "'local-sort.max-num-file-handles' must be at least 2".to_string(),
            ));
        }
        if self.snapshot_num_retained_min > self.snapshot_num_retained_max {
            return Err(ConfigError::Invalid(
                "'snapshot.num-retained.min' exceeds 'snapshot.num-retained.max'".to_string(),
            ));
        }
        Ok(())
    }

    /// `true` when buckets are assigned dynamically through the global
    /// index.
    #[must_use]
    pub fn dynamic_bucket(&self) -> bool {
        self.bucket == DYNAMIC_BUCKET
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

fn parse_i32(key: &str, value: &str) -> Result<i32, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "expected an integer"))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "expected a non-negative integer"))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value)
        .map_err(|e| invalid(key, value, &format!("expected a duration: {e}")))
}

/// Parses a byte size: a plain integer, or an integer with a `kb`, `mb`
/// or `gb` suffix (case-insensitive).
fn parse_size(key: &str, value: &str) -> Result<u64, ConfigError> {
    let lower = value.trim().to_ascii_lowercase();
    let (digits, multiplier) = if let Some(n) = lower.strip_suffix("kb") {
        (n, 1024u64)
    } else if let Some(n) = lower.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix('b') {
        (n, 1)
    } else {
        (lower.as_str(), 1)
    };
    let digits = digits.trim();
    let base: u64 = digits
        .parse()
        .map_err(|_| invalid(key, value, "expected a size like 1024, 64kb, 256mb"))?;
    base.checked_mul(multiplier)
        .ok_or_else(|| invalid(key, value, "size overflows"))
}

/// Splits a comma-separated list, trimming whitespace and dropping
/// empty items.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests;
