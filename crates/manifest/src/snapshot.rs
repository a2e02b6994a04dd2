//! The snapshot descriptor: one immutable version of the table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot descriptor format version. Snapshots below version 3
/// predate separate changelog manifest lists; for those, CHANGELOG scans
/// of APPEND snapshots fall back to the delta list.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 3;

/// What produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitKind {
    #[serde(rename = "APPEND")]
    Append,
    #[serde(rename = "COMPACT")]
    Compact,
    #[serde(rename = "OVERWRITE")]
    Overwrite,
}

/// An immutable, monotonically numbered table version.
///
/// `base_manifest_list` holds the table state before this commit;
/// `delta_manifest_list` holds this commit's changes; reading ALL means
/// base ⊕ delta. Serialized as JSON under `snapshot/snapshot-<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub id: u64,
    pub schema_id: u64,
    pub base_manifest_list: String,
    pub delta_manifest_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub changelog_manifest_list: Option<String>,
    pub commit_user: String,
    pub commit_identifier: u64,
    pub commit_kind: CommitKind,
    pub time_millis: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub log_offsets: Option<BTreeMap<u32, i64>>,
    pub total_record_count: u64,
    /// Signed: a COMPACT snapshot that drops tombstones shrinks the
    /// table.
    pub delta_record_count: i64,
    pub changelog_record_count: u64,
}

impl Snapshot {
    /// Serializes to the on-disk JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parses the on-disk JSON form.
    pub fn from_json(json: &str) -> serde_json::Result<Snapshot> {
        serde_json::from_str(json)
    }
}
