//! Snapshot directory management and the optimistic commit primitive.

use crate::snapshot::Snapshot;
use crate::ManifestError;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the pointer file tracking the newest snapshot id.
pub const LATEST: &str = "LATEST";
/// Name of the pointer file tracking the oldest non-expired snapshot id.
pub const EARLIEST: &str = "EARLIEST";

/// The outcome of one commit attempt.
///
/// Result-typed on purpose: a conflict is an expected outcome of
/// optimistic concurrency, not an error. The caller owns the
/// rebase-and-retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// The snapshot was published.
    Committed { snapshot_id: u64 },
    /// Another committer published this id first; re-read and rebase.
    Conflict { observed_latest: u64 },
}

/// Manages `<table-root>/snapshot/`.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    snapshot_dir: PathBuf,
}

impl SnapshotManager {
    /// Creates a manager for the given table root.
    pub fn new(table_root: &Path) -> Result<Self, ManifestError> {
        let snapshot_dir = table_root.join("snapshot");
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self { snapshot_dir })
    }

    /// Path of `snapshot-<id>`.
    #[must_use]
    pub fn snapshot_path(&self, id: u64) -> PathBuf {
        self.snapshot_dir.join(format!("snapshot-{id}"))
    }

    /// Reads a snapshot descriptor.
    pub fn snapshot(&self, id: u64) -> Result<Snapshot, ManifestError> {
        let path = self.snapshot_path(id);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ManifestError::SnapshotNotFound(id))
            }
            Err(e) => return Err(e.into()),
        };
        Snapshot::from_json(&json).map_err(|e| ManifestError::corrupt(&path, e.to_string()))
    }

    /// The newest committed snapshot id, `None` on a fresh table.
    pub fn latest_snapshot_id(&self) -> Result<Option<u64>, ManifestError> {
        self.read_pointer(LATEST)
    }

    /// The oldest non-expired snapshot id, `None` on a fresh table.
    pub fn earliest_snapshot_id(&self) -> Result<Option<u64>, ManifestError> {
        self.read_pointer(EARLIEST)
    }

    /// The newest snapshot descriptor, `None` on a fresh table.
    pub fn latest_snapshot(&self) -> Result<Option<Snapshot>, ManifestError> {
        match self.latest_snapshot_id()? {
            Some(id) => Ok(Some(self.snapshot(id)?)),
            None => Ok(None),
        }
    }

    /// Attempts to publish `snapshot` as `snapshot-<id>`.
    ///
    /// Publication is `create_new`-guarded: if the file already exists,
    /// another committer won the race and [`CommitResult::Conflict`] is
    /// returned with the latest id observed afterwards. On success the
    /// `LATEST` pointer is rewritten (and `EARLIEST` seeded on the first
    /// ever commit).
    pub fn try_commit(&self, snapshot: &Snapshot) -> Result<CommitResult, ManifestError> {
        let path = self.snapshot_path(snapshot.id);
        let json = snapshot
            .to_json()
            .map_err(|e| ManifestError::corrupt(&path, e.to_string()))?;

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let observed = self.latest_snapshot_id()?.unwrap_or(snapshot.id);
                debug!(id = snapshot.id, observed, "snapshot publication conflict");
                return Ok(CommitResult::Conflict {
                    observed_latest: observed.max(snapshot.id),
                });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        self.write_pointer(LATEST, snapshot.id)?;
        if self.earliest_snapshot_id()?.is_none() {
            self.write_pointer(EARLIEST, snapshot.id)?;
        }
        info!(id = snapshot.id, kind = ?snapshot.commit_kind, "committed snapshot");
        Ok(CommitResult::Committed {
            snapshot_id: snapshot.id,
        })
    }

    /// Truncates the snapshot tail: every snapshot above `id` is deleted
    /// and `LATEST` is rewound. Data and manifest files referenced only
    /// by the deleted snapshots become orphans for the expiration task.
    pub fn rollback_to(&self, id: u64) -> Result<(), ManifestError> {
        // Validate the target exists before touching anything.
        let _ = self.snapshot(id)?;
        let latest = self
            .latest_snapshot_id()?
            .ok_or(ManifestError::SnapshotNotFound(id))?;

        for stale in (id + 1)..=latest {
            let _ = fs::remove_file(self.snapshot_path(stale));
        }
        self.write_pointer(LATEST, id)?;
        info!(id, from = latest, "rolled back snapshot tail");
        Ok(())
    }

    fn pointer_path(&self, name: &str) -> PathBuf {
        self.snapshot_dir.join(name)
    }

    fn read_pointer(&self, name: &str) -> Result<Option<u64>, ManifestError> {
        let path = self.pointer_path(name);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let id = text
                    .trim()
                    .parse()
                    .map_err(|_| ManifestError::corrupt(&path, "pointer is not an integer"))?;
                Ok(Some(id))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Pointer rewrite via tmp + atomic rename.
    fn write_pointer(&self, name: &str, id: u64) -> Result<(), ManifestError> {
        let path = self.pointer_path(name);
        let tmp = self.snapshot_dir.join(format!("{name}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            writeln!(file, "{id}")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
