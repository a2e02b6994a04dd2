use super::helpers::*;
use crate::Table;
use anyhow::Result;
use row::{Datum, Predicate, Row, RowKind};
use tempfile::tempdir;

#[test]
fn create_then_open() -> Result<()> {
    let dir = tempdir()?;
    simple_table(dir.path(), &[]);
    let reopened = Table::open(dir.path(), &options(&[("bucket", "2")]))?;
    assert_eq!(reopened.schema().primary_keys, vec!["id".to_string()]);
    Ok(())
}

#[test]
fn open_missing_table_fails() {
    let dir = tempdir().unwrap();
    assert!(Table::open(dir.path(), &options(&[])).is_err());
}

#[test]
fn table_without_primary_key_rejected() {
    let dir = tempdir().unwrap();
    let schema = row::Schema::new(
        vec![("a", row::DataType::Long)],
        &[],
        &[],
    )
    .unwrap();
    assert!(Table::create(dir.path(), schema, &options(&[("bucket", "1")])).is_err());
}

#[test]
fn unsupported_changelog_producer_rejected() {
    let dir = tempdir().unwrap();
    let result = Table::create(
        dir.path(),
        simple_schema(),
        &options(&[("bucket", "1"), ("changelog-producer", "lookup")]),
    );
    assert!(result.is_err());
}

#[test]
fn write_commit_read_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(dir.path(), &[]);

    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    for id in 0..20i64 {
        write.write(RowKind::Insert, simple_row(id, id * 2))?;
    }
    // Updates and a delete, CDC style.
    write.write(RowKind::UpdateAfter, simple_row(3, 333))?;
    write.write(RowKind::Delete, simple_row(7, 0))?;

    let ids = commit.commit(write.prepare_commit(true)?)?;
    assert_eq!(ids, vec![1]);
    write.close();

    let rows = as_pairs(table.new_read().read_all()?);
    let mut expected: Vec<(i64, i64)> = (0..20).filter(|id| *id != 7).map(|id| (id, id * 2)).collect();
    expected[3].1 = 333;
    assert_eq!(rows, expected);
    Ok(())
}

#[test]
fn empty_commit_does_not_advance_snapshot() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(dir.path(), &[]);
    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;

    let ids = commit.commit(write.prepare_commit(true)?)?;
    assert!(ids.is_empty());
    assert_eq!(table.snapshots()?.latest_snapshot_id()?, None);
    write.close();
    Ok(())
}

#[test]
fn delete_of_absent_key_is_noop() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(dir.path(), &[]);
    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;

    write.write(RowKind::Insert, simple_row(1, 10))?;
    write.write(RowKind::Delete, simple_row(42, 0))?;
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    assert_eq!(as_pairs(table.new_read().read_all()?), vec![(1, 10)]);
    Ok(())
}

#[test]
fn second_session_restores_levels_and_sequences() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(dir.path(), &[]);
    {
        let mut write = table.new_write()?;
        let mut commit = table.new_commit("tester")?;
        write.write(RowKind::Insert, simple_row(1, 10))?;
        commit.commit(write.prepare_commit(true)?)?;
        write.close();
    }
    {
        // A fresh session must see the old value and win over it.
        let mut write = table.new_write()?;
        let mut commit = table.new_commit("tester")?;
        write.write(RowKind::UpdateAfter, simple_row(1, 11))?;
        commit.commit(write.prepare_commit(true)?)?;
        write.close();
    }
    assert_eq!(as_pairs(table.new_read().read_all()?), vec![(1, 11)]);
    Ok(())
}

#[test]
fn value_filter_pushdown_on_read() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(dir.path(), &[]);
    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    for id in 0..10i64 {
        write.write(RowKind::Insert, simple_row(id, id))?;
    }
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    let rows = table
        .new_read()
        .with_value_filter(Predicate::GreaterOrEqual(1, Datum::Long(7)))
        .read_all()?;
    assert_eq!(as_pairs(rows), vec![(7, 7), (8, 8), (9, 9)]);
    Ok(())
}

#[test]
fn compaction_is_invisible_to_readers() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(
        dir.path(),
        &[
            ("num-sorted-run.compaction-trigger", "2"),
            ("num-sorted-run.stop-trigger", "3"),
        ],
    );
    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;

    let mut expected = Vec::new();
    for round in 0..5i64 {
        for id in 0..4i64 {
            write.write(RowKind::UpdateAfter, simple_row(id, round * 10 + id))?;
        }
        commit.commit(write.prepare_commit(true)?)?;
    }
    for id in 0..4i64 {
        expected.push((id, 40 + id));
    }
    write.close();

    assert_eq!(as_pairs(table.new_read().read_all()?), expected);
    Ok(())
}

#[test]
fn partial_update_sequence_groups_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    // Schema (k, g1, a, g2, b) with two sequence groups.
    let schema = row::Schema::new(
        vec![
            ("k", row::DataType::Long),
            ("g1", row::DataType::Long),
            ("a", row::DataType::String),
            ("g2", row::DataType::Long),
            ("b", row::DataType::String),
        ],
        &[],
        &["k"],
    )?;
    let table = Table::create(
        dir.path(),
        schema,
        &options(&[
            ("bucket", "1"),
            ("merge-engine", "partial-update"),
            ("fields.g1.sequence-group", "a"),
            ("fields.g2.sequence-group", "b"),
        ]),
    )?;

    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    write.write(
        RowKind::Insert,
        Row::new(vec![
            Datum::Long(1),
            Datum::Long(10),
            Datum::Str("A".into()),
            Datum::Long(5),
            Datum::Str("X".into()),
        ]),
    )?;
    write.write(
        RowKind::UpdateAfter,
        Row::new(vec![
            Datum::Long(1),
            Datum::Long(5),
            Datum::Str("A'".into()),
            Datum::Long(10),
            Datum::Str("Y".into()),
        ]),
    )?;
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    let rows = table.new_read().read_all()?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].0,
        vec![
            Datum::Long(1),
            Datum::Long(10),
            Datum::Str("A".into()),
            Datum::Long(10),
            Datum::Str("Y".into()),
        ]
    );
    Ok(())
}

#[test]
fn aggregate_engine_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let table = simple_table(
        dir.path(),
        &[
            ("merge-engine", "aggregate"),
            ("fields.v.aggregate-function", "sum"),
        ],
    );
    let mut write = table.new_write()?;
    let mut commit = table.new_commit("tester")?;
    write.write(RowKind::Insert, simple_row(1, 10))?;
    write.write(RowKind::Insert, simple_row(1, 5))?;
    write.write(RowKind::Insert, simple_row(2, 1))?;
    commit.commit(write.prepare_commit(true)?)?;
    write.close();

    assert_eq!(as_pairs(table.new_read().read_all()?), vec![(1, 15), (2, 1)]);
    Ok(())
}
