use super::*;
use anyhow::Result;
use row::{compare_binary_rows, Datum, KeyValue, KvIterator, Row, RowKind};
use tempfile::tempdir;

fn kv(key: i64, seq: u64) -> KeyValue {
    KeyValue::new(
        Row::new(vec![Datum::Long(key)]).to_binary(),
        seq,
        RowKind::Insert,
        Row::new(vec![Datum::Long(key), Datum::Long(seq as i64)]),
    )
}

fn drain_sorted(mut iter: SortedIterator) -> Result<Vec<KeyValue>> {
    let mut out = Vec::new();
    while let Some(record) = iter.advance()? {
        out.push(record);
    }
    Ok(out)
}

fn assert_sorted(records: &[KeyValue]) {
    for pair in records.windows(2) {
        let ord = compare_binary_rows(&pair[0].key, &pair[1].key);
        assert!(
            ord == std::cmp::Ordering::Less
                || (ord == std::cmp::Ordering::Equal && pair[0].seq <= pair[1].seq),
            "output out of order"
        );
    }
}

// -------------------- Spill codec --------------------

#[test]
fn spill_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("run");
    let mut w = SpillWriter::create(&path)?;
    let records = vec![kv(1, 1), kv(2, 2), kv(3, 3)];
    for r in &records {
        w.append(r)?;
    }
    assert_eq!(w.record_count(), 3);
    w.finish()?;

    let mut r = SpillReader::open(&path)?;
    for expected in &records {
        assert_eq!(&r.read_record()?.unwrap(), expected);
    }
    assert!(r.read_record()?.is_none());
    Ok(())
}

#[test]
fn spill_detects_corruption() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("run");
    let mut w = SpillWriter::create(&path)?;
    w.append(&kv(1, 1))?;
    w.finish()?;

    // Flip a byte inside the record body.
    let mut bytes = std::fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes)?;

    let mut r = SpillReader::open(&path)?;
    assert!(matches!(r.read_record(), Err(SpillError::Corrupt)));
    Ok(())
}

// -------------------- In-memory only --------------------

#[test]
fn sorts_in_memory_without_spilling() -> Result<()> {
    let dir = tempdir()?;
    let mut buffer = SortBuffer::new(dir.path(), 1024 * 1024, 8)?;
    for key in [5i64, 1, 3, 2, 4] {
        buffer.add(kv(key, key as u64))?;
    }
    assert!(!buffer.spilled());

    let records = drain_sorted(buffer.sorted_iterator()?)?;
    assert_eq!(records.len(), 5);
    assert_sorted(&records);
    Ok(())
}

#[test]
fn duplicate_keys_ordered_by_seq() -> Result<()> {
    let dir = tempdir()?;
    let mut buffer = SortBuffer::new(dir.path(), 1024 * 1024, 8)?;
    buffer.add(kv(1, 9))?;
    buffer.add(kv(1, 2))?;
    buffer.add(kv(1, 5))?;

    let records = drain_sorted(buffer.sorted_iterator()?)?;
    let seqs: Vec<u64> = records.iter().map(|r| r.seq).collect();
    assert_eq!(seqs, vec![2, 5, 9]);
    Ok(())
}

// -------------------- Spilling --------------------

#[test]
fn spills_and_merges_when_budget_exceeded() -> Result<()> {
    let dir = tempdir()?;
    // Tiny budget: every few records force a spill.
    let mut buffer = SortBuffer::new(dir.path(), 256, 3)?;
    for i in (0..200i64).rev() {
        buffer.add(kv(i, i as u64))?;
    }
    assert!(buffer.spilled());

    let records = drain_sorted(buffer.sorted_iterator()?)?;
    assert_eq!(records.len(), 200);
    assert_sorted(&records);
    Ok(())
}

#[test]
fn fan_in_limit_bounds_run_count() -> Result<()> {
    let dir = tempdir()?;
    let mut buffer = SortBuffer::new(dir.path(), 128, 3)?;
    for i in 0..500i64 {
        buffer.add(kv(i % 97, i as u64))?;
    }
    // Intermediate merges keep the spill directory small.
    let runs = std::fs::read_dir(dir.path())?.count();
    assert!(runs < 3, "expected intermediate merges, found {runs} runs");

    let records = drain_sorted(buffer.sorted_iterator()?)?;
    assert_eq!(records.len(), 500);
    assert_sorted(&records);
    Ok(())
}

#[test]
fn spill_files_removed_after_iteration() -> Result<()> {
    let dir = tempdir()?;
    let mut buffer = SortBuffer::new(dir.path(), 64, 4)?;
    for i in 0..50i64 {
        buffer.add(kv(i, i as u64))?;
    }
    let iter = buffer.sorted_iterator()?;
    drop(iter);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}
