use super::*;
use anyhow::Result;
use row::{Datum, KeyValue, KvIterator, Row, RowKind};
use tempfile::tempdir;

fn kv(key: i64, seq: u64, kind: RowKind, val: &str) -> KeyValue {
    KeyValue::new(
        Row::new(vec![Datum::Long(key)]).to_binary(),
        seq,
        kind,
        Row::new(vec![Datum::Long(key), Datum::Str(val.to_string())]),
    )
}

fn write_file(dir: &std::path::Path, name: &str, records: &[KeyValue]) -> Result<DataFileMeta> {
    let mut writer = DataFileWriter::create(&dir.join(name), 0, 0)?;
    for r in records {
        writer.write(r)?;
    }
    Ok(writer.finish()?)
}

// -------------------- Write / read roundtrip --------------------

#[test]
fn roundtrip_preserves_records_and_order() -> Result<()> {
    let dir = tempdir()?;
    let records = vec![
        kv(1, 1, RowKind::Insert, "a"),
        kv(1, 4, RowKind::UpdateAfter, "a2"),
        kv(2, 2, RowKind::Insert, "b"),
        kv(3, 3, RowKind::Delete, ""),
    ];
    let meta = write_file(dir.path(), "data-0.tld", &records)?;
    assert_eq!(meta.row_count, 4);
    assert_eq!(meta.min_seq, 1);
    assert_eq!(meta.max_seq, 4);

    let reader = DataFileReader::open(&dir.path().join("data-0.tld"))?;
    assert_eq!(reader.row_count(), 4);
    let mut iter = reader.iter()?;
    for expected in &records {
        assert_eq!(&iter.read_record()?.unwrap(), expected);
    }
    assert!(iter.read_record()?.is_none());
    Ok(())
}

#[test]
fn meta_carries_key_range_and_stats() -> Result<()> {
    let dir = tempdir()?;
    let records = vec![
        kv(-5, 1, RowKind::Insert, "x"),
        kv(3, 2, RowKind::Insert, "y"),
        kv(100, 3, RowKind::Insert, "z"),
    ];
    let meta = write_file(dir.path(), "data-1.tld", &records)?;

    assert_eq!(meta.min_key, records[0].key);
    assert_eq!(meta.max_key, records[2].key);
    assert_eq!(meta.key_stats[0].min, Some(Datum::Long(-5)));
    assert_eq!(meta.key_stats[0].max, Some(Datum::Long(100)));
    assert_eq!(meta.value_stats[0].min, Some(Datum::Long(-5)));
    assert_eq!(meta.value_stats[1].max, Some(Datum::Str("z".to_string())));
    assert!(meta.creation_time > 0);
    Ok(())
}

#[test]
fn empty_writer_refused_and_tmp_removed() -> Result<()> {
    let dir = tempdir()?;
    let writer = DataFileWriter::create(&dir.path().join("data-2.tld"), 0, 0)?;
    assert!(matches!(writer.finish(), Err(DataFileError::Empty(_))));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn abort_removes_tmp_file() -> Result<()> {
    let dir = tempdir()?;
    let mut writer = DataFileWriter::create(&dir.path().join("data-3.tld"), 0, 0)?;
    writer.write(&kv(1, 1, RowKind::Insert, "a"))?;
    writer.abort();
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

// -------------------- Corruption --------------------

#[test]
fn bit_flip_in_record_detected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("data-4.tld");
    write_file(dir.path(), "data-4.tld", &[kv(1, 1, RowKind::Insert, "abc")])?;

    let mut bytes = std::fs::read(&path)?;
    // Flip a byte in the middle of the data section (inside the value).
    let idx = bytes.len() - FOOTER_BYTES as usize - 2;
    bytes[idx] ^= 0x01;
    std::fs::write(&path, &bytes)?;

    let reader = DataFileReader::open(&path)?;
    let mut iter = reader.iter()?;
    assert!(matches!(
        iter.read_record(),
        Err(DataFileError::Corrupt { .. })
    ));
    Ok(())
}

#[test]
fn wrong_magic_rejected_on_open() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("data-5.tld");
    write_file(dir.path(), "data-5.tld", &[kv(1, 1, RowKind::Insert, "a")])?;

    let mut bytes = std::fs::read(&path)?;
    let n = bytes.len();
    bytes[n - 1] ^= 0xff;
    std::fs::write(&path, &bytes)?;

    assert!(matches!(
        DataFileReader::open(&path),
        Err(DataFileError::Corrupt { .. })
    ));
    Ok(())
}

#[test]
fn truncated_file_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("data-6.tld");
    std::fs::write(&path, b"tiny")?;
    assert!(matches!(
        DataFileReader::open(&path),
        Err(DataFileError::Corrupt { .. })
    ));
    Ok(())
}

// -------------------- Meta codec --------------------

#[test]
fn meta_binary_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let mut meta = write_file(dir.path(), "data-7.tld", &[kv(1, 9, RowKind::Insert, "v")])?;
    meta.level = 3;
    meta.extra_files = vec!["changelog-x.tld".to_string()];

    let mut buf = Vec::new();
    meta.write_to(&mut buf)?;
    let decoded = DataFileMeta::read_from(&mut &buf[..])?;
    assert_eq!(decoded, meta);
    Ok(())
}

// -------------------- Concat --------------------

#[test]
fn concat_chains_disjoint_files_in_key_order() -> Result<()> {
    let dir = tempdir()?;
    // Written out of range order; ConcatIterator must sort by min key.
    let high = write_file(
        dir.path(),
        "data-h.tld",
        &[kv(10, 3, RowKind::Insert, "j"), kv(11, 4, RowKind::Insert, "k")],
    )?;
    let low = write_file(
        dir.path(),
        "data-l.tld",
        &[kv(1, 1, RowKind::Insert, "a"), kv(2, 2, RowKind::Insert, "b")],
    )?;

    let mut iter = ConcatIterator::new(dir.path(), vec![high, low]);
    let mut keys = Vec::new();
    while let Some(record) = iter.advance()? {
        keys.push(record.key.to_row()?.field(0).clone());
    }
    assert_eq!(
        keys,
        vec![
            Datum::Long(1),
            Datum::Long(2),
            Datum::Long(10),
            Datum::Long(11)
        ]
    );
    Ok(())
}
