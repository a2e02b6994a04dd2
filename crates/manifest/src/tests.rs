use super::*;
use datafile::DataFileMeta;
use row::{Datum, FieldStats, Predicate, Row};
use tempfile::tempdir;

fn part(name: &str) -> row::BinaryRow {
    Row::new(vec![Datum::Str(name.to_string())]).to_binary()
}

fn file_meta(name: &str, level: u32, value_min: i64, value_max: i64) -> DataFileMeta {
    DataFileMeta {
        file_name: name.to_string(),
        file_size: 1024,
        row_count: 10,
        min_key: Row::new(vec![Datum::Long(value_min)]).to_binary(),
        max_key: Row::new(vec![Datum::Long(value_max)]).to_binary(),
        key_stats: vec![FieldStats {
            min: Some(Datum::Long(value_min)),
            max: Some(Datum::Long(value_max)),
            null_count: 0,
        }],
        value_stats: vec![FieldStats {
            min: Some(Datum::Long(value_min)),
            max: Some(Datum::Long(value_max)),
            null_count: 0,
        }],
        min_seq: 1,
        max_seq: 9,
        schema_id: 0,
        level,
        extra_files: Vec::new(),
        creation_time: 1_700_000_000_000,
    }
}

fn entry(kind: FileKind, partition: &str, bucket: i32, name: &str, level: u32) -> ManifestEntry {
    ManifestEntry {
        kind,
        partition: part(partition),
        bucket,
        total_buckets: 4,
        file: file_meta(name, level, 0, 100),
    }
}

fn snapshot_with(
    id: u64,
    base: String,
    delta: Option<String>,
    changelog: Option<String>,
) -> Snapshot {
    Snapshot {
        version: SNAPSHOT_FORMAT_VERSION,
        id,
        schema_id: 0,
        base_manifest_list: base,
        delta_manifest_list: delta,
        changelog_manifest_list: changelog,
        commit_user: "test".to_string(),
        commit_identifier: id,
        commit_kind: CommitKind::Append,
        time_millis: 1_700_000_000_000,
        log_offsets: None,
        total_record_count: 0,
        delta_record_count: 0,
        changelog_record_count: 0,
    }
}

// -------------------- Codecs --------------------

#[test]
fn entry_roundtrip() -> anyhow::Result<()> {
    let original = entry(FileKind::Delete, "A", 3, "data-1.tld", 2);
    let mut buf = Vec::new();
    original.write_to(&mut buf)?;
    let decoded = ManifestEntry::read_from(&mut &buf[..])?;
    assert_eq!(decoded, original);
    Ok(())
}

#[test]
fn manifest_file_write_read() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let entries = vec![
        entry(FileKind::Add, "A", 0, "data-1.tld", 0),
        entry(FileKind::Add, "B", 1, "data-2.tld", 1),
        entry(FileKind::Delete, "A", 0, "data-0.tld", 0),
    ];
    let metas = write_manifest_files(dir.path(), &entries, 0, u64::MAX)?;
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].num_added_files, 2);
    assert_eq!(metas[0].num_deleted_files, 1);
    // Partition stats aggregate A and B.
    assert_eq!(
        metas[0].partition_stats[0].min,
        Some(Datum::Str("A".to_string()))
    );
    assert_eq!(
        metas[0].partition_stats[0].max,
        Some(Datum::Str("B".to_string()))
    );

    let read = read_manifest_file(&dir.path().join(&metas[0].file_name))?;
    assert_eq!(read, entries);
    Ok(())
}

#[test]
fn manifest_file_rolls_at_target_size() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let entries: Vec<ManifestEntry> = (0..10)
        .map(|i| entry(FileKind::Add, "A", 0, &format!("data-{i}.tld"), 0))
        .collect();
    let metas = write_manifest_files(dir.path(), &entries, 0, 512)?;
    assert!(metas.len() > 1, "expected rolling, got {} file(s)", metas.len());

    let total: usize = metas
        .iter()
        .map(|m| read_manifest_file(&dir.path().join(&m.file_name)).unwrap().len())
        .sum();
    assert_eq!(total, 10);
    Ok(())
}

#[test]
fn corrupt_manifest_detected() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let metas = write_manifest_files(
        dir.path(),
        &[entry(FileKind::Add, "A", 0, "data-1.tld", 0)],
        0,
        u64::MAX,
    )?;
    let path = dir.path().join(&metas[0].file_name);
    let mut bytes = std::fs::read(&path)?;
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, &bytes)?;

    assert!(matches!(
        read_manifest_file(&path),
        Err(ManifestError::Corrupt { .. })
    ));
    Ok(())
}

#[test]
fn manifest_list_roundtrip() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let metas = write_manifest_files(
        dir.path(),
        &[entry(FileKind::Add, "A", 0, "data-1.tld", 0)],
        0,
        u64::MAX,
    )?;
    let list_name = write_manifest_list(dir.path(), &metas)?;
    let read = read_manifest_list(&dir.path().join(&list_name))?;
    assert_eq!(read, metas);
    Ok(())
}

#[test]
fn snapshot_json_field_names_are_stable() -> anyhow::Result<()> {
    let snapshot = snapshot_with(7, "base-list".to_string(), Some("delta-list".to_string()), None);
    let json = snapshot.to_json()?;
    assert!(json.contains("\"schemaId\""));
    assert!(json.contains("\"baseManifestList\""));
    assert!(json.contains("\"deltaManifestList\""));
    assert!(json.contains("\"commitKind\": \"APPEND\""));
    assert!(json.contains("\"timeMillis\""));
    assert!(!json.contains("changelogManifestList"));

    let decoded = Snapshot::from_json(&json)?;
    assert_eq!(decoded, snapshot);
    Ok(())
}

// -------------------- Snapshot manager --------------------

#[test]
fn commit_advances_latest_and_seeds_earliest() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mgr = SnapshotManager::new(dir.path())?;
    assert_eq!(mgr.latest_snapshot_id()?, None);

    let result = mgr.try_commit(&snapshot_with(1, "b".into(), None, None))?;
    assert_eq!(result, CommitResult::Committed { snapshot_id: 1 });
    assert_eq!(mgr.latest_snapshot_id()?, Some(1));
    assert_eq!(mgr.earliest_snapshot_id()?, Some(1));

    mgr.try_commit(&snapshot_with(2, "b".into(), None, None))?;
    assert_eq!(mgr.latest_snapshot_id()?, Some(2));
    assert_eq!(mgr.earliest_snapshot_id()?, Some(1));
    Ok(())
}

#[test]
fn conflicting_commit_reports_observed_latest() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mgr = SnapshotManager::new(dir.path())?;
    mgr.try_commit(&snapshot_with(1, "b".into(), None, None))?;

    // A second committer proposing the same id must lose.
    let result = mgr.try_commit(&snapshot_with(1, "other".into(), None, None))?;
    assert!(matches!(result, CommitResult::Conflict { observed_latest: 1 }));
    // The winner's descriptor is untouched.
    assert_eq!(mgr.snapshot(1)?.base_manifest_list, "b");
    Ok(())
}

#[test]
fn rollback_truncates_tail() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mgr = SnapshotManager::new(dir.path())?;
    for id in 1..=5 {
        mgr.try_commit(&snapshot_with(id, format!("base-{id}"), None, None))?;
    }

    mgr.rollback_to(3)?;
    assert_eq!(mgr.latest_snapshot_id()?, Some(3));
    assert!(matches!(
        mgr.snapshot(4),
        Err(ManifestError::SnapshotNotFound(4))
    ));
    assert!(matches!(
        mgr.snapshot(5),
        Err(ManifestError::SnapshotNotFound(5))
    ));
    // A later commit reuses id 4.
    let result = mgr.try_commit(&snapshot_with(4, "new-4".into(), None, None))?;
    assert_eq!(result, CommitResult::Committed { snapshot_id: 4 });
    assert_eq!(mgr.snapshot(4)?.base_manifest_list, "new-4");
    Ok(())
}

// -------------------- Planner --------------------

/// Writes entries as one manifest + list, returning the list name.
fn store_list(dir: &std::path::Path, entries: &[ManifestEntry]) -> anyhow::Result<String> {
    let metas = write_manifest_files(dir, entries, 0, u64::MAX)?;
    Ok(write_manifest_list(dir, &metas)?)
}

#[test]
fn plan_merges_add_delete() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = store_list(
        dir.path(),
        &[
            entry(FileKind::Add, "A", 0, "data-1.tld", 0),
            entry(FileKind::Add, "A", 0, "data-2.tld", 0),
        ],
    )?;
    let delta = store_list(
        dir.path(),
        &[
            entry(FileKind::Delete, "A", 0, "data-1.tld", 0),
            entry(FileKind::Add, "A", 0, "data-3.tld", 1),
        ],
    )?;
    let snapshot = snapshot_with(1, base, Some(delta), None);

    let live = ScanPlanner::new(dir.path(), 4).plan(&snapshot)?;
    let names: Vec<&str> = live.iter().map(|e| e.file.file_name.as_str()).collect();
    assert_eq!(names, vec!["data-2.tld", "data-3.tld"]);
    Ok(())
}

#[test]
fn plan_delta_only() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = store_list(dir.path(), &[entry(FileKind::Add, "A", 0, "data-1.tld", 0)])?;
    let delta = store_list(dir.path(), &[entry(FileKind::Add, "A", 0, "data-2.tld", 0)])?;
    let snapshot = snapshot_with(1, base, Some(delta), None);

    let live = ScanPlanner::new(dir.path(), 4)
        .with_kind(ScanKind::Delta)
        .plan(&snapshot)?;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].file.file_name, "data-2.tld");
    Ok(())
}

#[test]
fn changelog_falls_back_to_delta_for_old_append_snapshots() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = store_list(dir.path(), &[])?;
    let delta = store_list(dir.path(), &[entry(FileKind::Add, "A", 0, "data-2.tld", 0)])?;
    let mut snapshot = snapshot_with(1, base, Some(delta), None);
    snapshot.version = 2;

    let live = ScanPlanner::new(dir.path(), 4)
        .with_kind(ScanKind::Changelog)
        .plan(&snapshot)?;
    assert_eq!(live.len(), 1);

    // A current-version snapshot without a changelog list yields nothing.
    let base2 = store_list(dir.path(), &[])?;
    let delta2 = store_list(dir.path(), &[entry(FileKind::Add, "A", 0, "data-9.tld", 0)])?;
    let current = snapshot_with(2, base2, Some(delta2), None);
    let live = ScanPlanner::new(dir.path(), 4)
        .with_kind(ScanKind::Changelog)
        .plan(&current)?;
    assert!(live.is_empty());
    Ok(())
}

#[test]
fn plan_partition_and_bucket_and_level_filters() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = store_list(
        dir.path(),
        &[
            entry(FileKind::Add, "A", 0, "a0.tld", 0),
            entry(FileKind::Add, "A", 1, "a1.tld", 0),
            entry(FileKind::Add, "B", 0, "b0.tld", 2),
        ],
    )?;
    let snapshot = snapshot_with(1, base, None, None);

    let only_a = ScanPlanner::new(dir.path(), 4)
        .with_partition_filter(Predicate::Equal(0, Datum::Str("A".to_string())))
        .plan(&snapshot)?;
    assert_eq!(only_a.len(), 2);

    let bucket1 = ScanPlanner::new(dir.path(), 4)
        .with_bucket(1)
        .plan(&snapshot)?;
    assert_eq!(bucket1.len(), 1);
    assert_eq!(bucket1[0].file.file_name, "a1.tld");

    let level2 = ScanPlanner::new(dir.path(), 4)
        .with_level(2)
        .plan(&snapshot)?;
    assert_eq!(level2.len(), 1);
    assert_eq!(level2[0].file.file_name, "b0.tld");

    let set = ScanPlanner::new(dir.path(), 4)
        .with_bucket_set(vec![0])
        .plan(&snapshot)?;
    assert_eq!(set.len(), 2);
    Ok(())
}

#[test]
fn plan_value_stats_pushdown() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut low = entry(FileKind::Add, "A", 0, "low.tld", 0);
    low.file = file_meta("low.tld", 0, 0, 50);
    let mut high = entry(FileKind::Add, "A", 0, "high.tld", 0);
    high.file = file_meta("high.tld", 0, 1000, 2000);

    let base = store_list(dir.path(), &[low, high])?;
    let snapshot = snapshot_with(1, base, None, None);

    let live = ScanPlanner::new(dir.path(), 4)
        .with_value_filter(Predicate::GreaterThan(0, Datum::Long(500)))
        .plan(&snapshot)?;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].file.file_name, "high.tld");
    Ok(())
}

#[test]
fn bucket_count_mismatch_is_fatal_unless_disabled() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut stale = entry(FileKind::Add, "A", 0, "stale.tld", 0);
    stale.total_buckets = 2;
    let base = store_list(dir.path(), &[stale])?;
    let snapshot = snapshot_with(1, base, None, None);

    let err = ScanPlanner::new(dir.path(), 4).plan(&snapshot).unwrap_err();
    assert!(matches!(err, ManifestError::BucketCountMismatch { .. }));

    let live = ScanPlanner::new(dir.path(), 4)
        .without_bucket_check()
        .plan(&snapshot)?;
    assert_eq!(live.len(), 1);
    Ok(())
}

#[test]
fn fold_manifests_compacts_base() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut metas = Vec::new();
    metas.extend(write_manifest_files(
        dir.path(),
        &[entry(FileKind::Add, "A", 0, "data-1.tld", 0)],
        0,
        u64::MAX,
    )?);
    metas.extend(write_manifest_files(
        dir.path(),
        &[
            entry(FileKind::Delete, "A", 0, "data-1.tld", 0),
            entry(FileKind::Add, "A", 0, "data-2.tld", 0),
        ],
        0,
        u64::MAX,
    )?);

    // Below the threshold: untouched.
    assert!(fold_manifests(dir.path(), &metas, 0, 10, u64::MAX)?.is_none());

    let folded = fold_manifests(dir.path(), &metas, 0, 2, u64::MAX)?.unwrap();
    let entries: Vec<ManifestEntry> = folded
        .iter()
        .flat_map(|m| read_manifest_file(&dir.path().join(&m.file_name)).unwrap())
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file.file_name, "data-2.tld");
    Ok(())
}
