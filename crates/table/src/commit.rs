//! The committer: manifest building plus the optimistic commit loop.

use crate::paths::manifest_dir;
use crate::table::Table;
use crate::TableError;
use anyhow::Result;
use datafile::DataFileMeta;
use manifest::{
    fold_manifests, read_manifest_list, write_manifest_files, write_manifest_list, CommitKind,
    CommitResult, FileKind, ManifestEntry, ScanPlanner, Snapshot, SnapshotManager,
    SNAPSHOT_FORMAT_VERSION,
};
use mergetree::CommitIncrement;
use row::BinaryRow;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// One bucket's contribution to a commit.
#[derive(Debug, Clone)]
pub struct CommitMessage {
    pub partition: BinaryRow,
    pub bucket: i32,
    pub total_buckets: i32,
    pub increment: CommitIncrement,
}

/// Publishes commit messages as snapshots.
///
/// Appended files and compaction results are committed as **separate**
/// snapshots (APPEND first, then COMPACT) so that incremental consumers
/// of the delta never observe compaction rewrites as new data. Each
/// publication runs the optimistic loop: build manifests against the
/// observed latest snapshot, try to publish `latest + 1`, and on a
/// conflict re-read and rebuild, up to `commit.max-retries` attempts.
pub struct TableCommit {
    table: Table,
    manager: SnapshotManager,
    user: String,
    identifier: u64,
}

impl TableCommit {
    pub(crate) fn new(table: Table, user: &str) -> Result<Self> {
        let manager = table.snapshots()?;
        Ok(Self {
            table,
            manager,
            user: user.to_string(),
            identifier: 0,
        })
    }

    /// Commits the messages; returns the published snapshot ids (one or
    /// two, in order).
    pub fn commit(&mut self, messages: Vec<CommitMessage>) -> Result<Vec<u64>> {
        self.identifier += 1;

        let mut append = Vec::new();
        let mut changelog = Vec::new();
        let mut compact = Vec::new();
        for message in &messages {
            for file in &message.increment.new_files {
                append.push(to_entry(FileKind::Add, message, file));
            }
            for file in &message.increment.changelog_files {
                changelog.push(to_entry(FileKind::Add, message, file));
            }
            for file in &message.increment.compact_before {
                compact.push(to_entry(FileKind::Delete, message, file));
            }
            for file in &message.increment.compact_after {
                compact.push(to_entry(FileKind::Add, message, file));
            }
        }

        let mut committed = Vec::new();
        if !append.is_empty() || !changelog.is_empty() {
            committed.push(self.commit_once(CommitKind::Append, &append, &changelog)?);
        }
        if !compact.is_empty() {
            committed.push(self.commit_once(CommitKind::Compact, &compact, &[])?);
        }
        Ok(committed)
    }

    /// Replaces the whole table state: every currently-live file is
    /// retracted and the messages' new files take its place. This is
    /// the rescale path, so the planner's bucket-count check is off.
    pub fn overwrite(&mut self, messages: Vec<CommitMessage>) -> Result<u64> {
        self.identifier += 1;

        let mut entries = Vec::new();
        if let Some(snapshot) = self.manager.latest_snapshot()? {
            let live = ScanPlanner::new(
                &manifest_dir(self.table.root()),
                self.table.options().bucket,
            )
            .without_bucket_check()
            .plan(&snapshot)?;
            for mut entry in live {
                entry.kind = FileKind::Delete;
                entries.push(entry);
            }
        }
        for message in &messages {
            for file in &message.increment.new_files {
                entries.push(to_entry(FileKind::Add, message, file));
            }
        }
        self.commit_once(CommitKind::Overwrite, &entries, &[])
    }

    fn commit_once(
        &self,
        kind: CommitKind,
        delta: &[ManifestEntry],
        changelog: &[ManifestEntry],
    ) -> Result<u64> {
        let dir = manifest_dir(self.table.root());
        let options = self.table.options();
        let schema_id = self.table.schema().id;
        let attempts = options.commit_max_retries.max(1);
        let mut last_conflict = 0;

        for attempt in 1..=attempts {
            let latest = self.manager.latest_snapshot()?;
            let (mut base_metas, prev_total, next_id) = match &latest {
                Some(snapshot) => {
                    let mut metas =
                        read_manifest_list(&dir.join(&snapshot.base_manifest_list))?;
                    if let Some(delta_list) = &snapshot.delta_manifest_list {
                        metas.extend(read_manifest_list(&dir.join(delta_list))?);
                    }
                    (metas, snapshot.total_record_count, snapshot.id + 1)
                }
                None => (Vec::new(), 0, 1),
            };

            if let Some(folded) = fold_manifests(
                &dir,
                &base_metas,
                schema_id,
                options.manifest_merge_min_count,
                options.manifest_target_file_size,
            )? {
                info!(
                    before = base_metas.len(),
                    after = folded.len(),
                    "folded base manifests"
                );
                base_metas = folded;
            }

            let base_list = write_manifest_list(&dir, &base_metas)?;
            let delta_list = if delta.is_empty() {
                None
            } else {
                let metas = write_manifest_files(
                    &dir,
                    delta,
                    schema_id,
                    options.manifest_target_file_size,
                )?;
                Some(write_manifest_list(&dir, &metas)?)
            };
            let changelog_list = if changelog.is_empty() {
                None
            } else {
                let metas = write_manifest_files(
                    &dir,
                    changelog,
                    schema_id,
                    options.manifest_target_file_size,
                )?;
                Some(write_manifest_list(&dir, &metas)?)
            };

            let delta_rows: i64 = delta
                .iter()
                .map(|e| match e.kind {
                    FileKind::Add => e.file.row_count as i64,
                    FileKind::Delete => -(e.file.row_count as i64),
                })
                .sum();
            let changelog_rows: u64 = changelog.iter().map(|e| e.file.row_count).sum();

            let snapshot = Snapshot {
                version: SNAPSHOT_FORMAT_VERSION,
                id: next_id,
                schema_id,
                base_manifest_list: base_list,
                delta_manifest_list: delta_list,
                changelog_manifest_list: changelog_list,
                commit_user: self.user.clone(),
                commit_identifier: self.identifier,
                commit_kind: kind,
                time_millis: now_millis(),
                log_offsets: None,
                total_record_count: (prev_total as i64 + delta_rows).max(0) as u64,
                delta_record_count: delta_rows,
                changelog_record_count: changelog_rows,
            };

            match self.manager.try_commit(&snapshot)? {
                CommitResult::Committed { snapshot_id } => return Ok(snapshot_id),
                CommitResult::Conflict { observed_latest } => {
                    // The manifests written for this attempt are orphans;
                    // the expiration task reclaims them.
                    warn!(attempt, observed_latest, "commit conflict; rebasing");
                    last_conflict = observed_latest;
                }
            }
        }

        Err(TableError::CommitRetriesExhausted {
            attempts,
            conflicting_snapshot: last_conflict,
        }
        .into())
    }
}

fn to_entry(kind: FileKind, message: &CommitMessage, file: &DataFileMeta) -> ManifestEntry {
    ManifestEntry {
        kind,
        partition: message.partition.clone(),
        bucket: message.bucket,
        total_buckets: message.total_buckets,
        file: file.clone(),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
