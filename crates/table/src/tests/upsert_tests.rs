use super::helpers::*;
use crate::Table;
use anyhow::Result;
use row::{Datum, RowKind};
use tempfile::tempdir;

fn dynamic_table(root: &std::path::Path, extra: &[(&str, &str)]) -> Table {
    let mut pairs = vec![("bucket", "-1"), ("dynamic-bucket.target-row-num", "100")];
    pairs.extend_from_slice(extra);
    Table::create(root, cross_partition_schema(), &options(&pairs)).unwrap()
}

#[test]
fn cross_partition_upsert_moves_key_and_emits_retraction() -> Result<()> {
    let dir = tempdir()?;
    let table = dynamic_table(dir.path(), &[("changelog-producer", "input")]);

    {
        let mut write = table.new_write()?;
        let mut commit = table.new_commit("tester")?;
        write.write(RowKind::Insert, cross_row(7, "A", 10))?;
        commit.commit(write.prepare_commit(true)?)?;
        write.close();
    }

    let second_snapshot = {
        let mut write = table.new_write()?;
        let mut commit = table.new_commit("tester")?;
        write.write(RowKind::Insert, cross_row(7, "B", 20))?;
        let ids = commit.commit(write.prepare_commit(true)?)?;
        write.close();
        ids[0]
    };

    // Exactly one live row, in the new partition.
    let rows = as_triples(table.new_read().read_all()?);
    assert_eq!(rows, vec![(7, "B".to_string(), 20)]);

    // The changelog of the second commit carries the synthetic DELETE
    // for the old partition.
    let changelog = table.new_read().read_changelog(second_snapshot)?;
    let deletes: Vec<_> = changelog
        .iter()
        .filter(|kv| kv.kind == RowKind::Delete)
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].value.field(1), &Datum::Str("A".to_string()));
    let inserts: Vec<_> = changelog
        .iter()
        .filter(|kv| kv.kind == RowKind::Insert)
        .collect();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].value.field(1), &Datum::Str("B".to_string()));
    Ok(())
}

#[test]
fn same_partition_update_does_not_retract() -> Result<()> {
    let dir = tempdir()?;
    let table = dynamic_table(dir.path(), &[]);

    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    write.write(RowKind::Insert, cross_row(1, "A", 1))?;
    write.write(RowKind::UpdateAfter, cross_row(1, "A", 2))?;
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    assert_eq!(
        as_triples(table.new_read().read_all()?),
        vec![(1, "A".to_string(), 2)]
    );
    Ok(())
}

#[test]
fn first_row_engine_skips_migrating_records() -> Result<()> {
    let dir = tempdir()?;
    let table = dynamic_table(dir.path(), &[("merge-engine", "first-row")]);

    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    write.write(RowKind::Insert, cross_row(7, "A", 10))?;
    write.write(RowKind::Insert, cross_row(7, "B", 20))?;
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    // The second record was dropped; the first stays.
    assert_eq!(
        as_triples(table.new_read().read_all()?),
        vec![(7, "A".to_string(), 10)]
    );
    Ok(())
}

#[test]
fn partial_update_keeps_old_partition() -> Result<()> {
    let dir = tempdir()?;
    let table = dynamic_table(dir.path(), &[("merge-engine", "partial-update")]);

    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    write.write(RowKind::Insert, cross_row(7, "A", 10))?;
    // Arrives tagged with partition B, but folds into A.
    write.write(RowKind::UpdateAfter, cross_row(7, "B", 20))?;
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    assert_eq!(
        as_triples(table.new_read().read_all()?),
        vec![(7, "A".to_string(), 20)]
    );
    Ok(())
}

#[test]
fn dynamic_buckets_fill_to_target() -> Result<()> {
    let dir = tempdir()?;
    let table = Table::create(
        dir.path(),
        cross_partition_schema(),
        &options(&[("bucket", "-1"), ("dynamic-bucket.target-row-num", "3")]),
    )?;

    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    for id in 1..=7i64 {
        write.write(RowKind::Insert, cross_row(id, "A", id))?;
    }
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    // Seven keys at target 3 spread over buckets 0, 1, 2.
    let entries = table.new_read().plan(manifest::ScanKind::All)?;
    let mut buckets: Vec<i32> = entries.iter().map(|e| e.bucket).collect();
    buckets.sort_unstable();
    buckets.dedup();
    assert_eq!(buckets, vec![0, 1, 2]);
    assert_eq!(as_triples(table.new_read().read_all()?).len(), 7);
    Ok(())
}

#[test]
fn index_bootstrap_survives_new_session() -> Result<()> {
    let dir = tempdir()?;
    let table = dynamic_table(dir.path(), &[]);

    {
        let mut write = table.new_write()?;
        let mut commit = table.new_commit("tester")?;
        write.write(RowKind::Insert, cross_row(7, "A", 10))?;
        commit.commit(write.prepare_commit(true)?)?;
        write.close();
    }
    {
        // The new session's assigner bootstraps from the table, so the
        // migration is detected even with a fresh index directory.
        let mut write = table.new_write()?;
        let mut commit = table.new_commit("tester")?;
        write.write(RowKind::Insert, cross_row(7, "B", 20))?;
        commit.commit(write.prepare_commit(true)?)?;
        write.close();
    }

    assert_eq!(
        as_triples(table.new_read().read_all()?),
        vec![(7, "B".to_string(), 20)]
    );
    Ok(())
}
