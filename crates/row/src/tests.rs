use super::*;
use anyhow::Result;

fn long_key(v: i64) -> BinaryRow {
    Row::new(vec![Datum::Long(v)]).to_binary()
}

fn kv(key: i64, seq: u64, kind: RowKind, val: i64) -> KeyValue {
    KeyValue::new(
        long_key(key),
        seq,
        kind,
        Row::new(vec![Datum::Long(key), Datum::Long(val)]),
    )
}

// -------------------- Datum codec --------------------

#[test]
fn datum_roundtrip_all_variants() -> Result<()> {
    let values = vec![
        Datum::Null,
        Datum::Boolean(true),
        Datum::Int(-42),
        Datum::Long(i64::MIN),
        Datum::Double(3.5),
        Datum::Str("partition".to_string()),
        Datum::Bytes(vec![0, 255, 7]),
        Datum::TimestampMillis(1_700_000_000_000),
    ];
    let mut buf = Vec::new();
    for v in &values {
        v.write_to(&mut buf)?;
    }
    let mut cursor = std::io::Cursor::new(&buf);
    for v in &values {
        assert_eq!(&Datum::read_from(&mut cursor)?, v);
    }
    Ok(())
}

#[test]
fn datum_ordering_nulls_first() {
    assert!(Datum::Null < Datum::Long(i64::MIN));
    assert!(Datum::Long(-1) < Datum::Long(0));
    assert!(Datum::Str("a".into()) < Datum::Str("ab".into()));
    assert!(Datum::Double(f64::NEG_INFINITY) < Datum::Double(0.0));
}

#[test]
fn datum_rejects_unknown_tag() {
    let buf = [99u8];
    assert!(Datum::read_from(&mut std::io::Cursor::new(&buf[..])).is_err());
}

// -------------------- BinaryRow --------------------

#[test]
fn binary_row_roundtrip() -> Result<()> {
    let row = Row::new(vec![
        Datum::Long(7),
        Datum::Str("pt-A".into()),
        Datum::Null,
    ]);
    let bin = row.to_binary();
    assert_eq!(bin.to_row()?, row);
    Ok(())
}

#[test]
fn binary_row_typed_ordering() {
    // Little-endian bytewise order would put 256 before 2; typed compare
    // must not.
    assert!(long_key(2) < long_key(256));
    assert!(long_key(-5) < long_key(3));
}

#[test]
fn normalized_key_is_order_preserving_for_longs() {
    let mut keys: Vec<i64> = vec![-100, -1, 0, 1, 7, 255, 256, 1 << 40];
    keys.sort_unstable();
    let norms: Vec<NormalizedKey> = keys.iter().map(|&v| long_key(v).normalized_key()).collect();
    let mut sorted = norms.clone();
    sorted.sort_unstable();
    assert_eq!(norms, sorted);
}

#[test]
fn normalized_key_prefix_never_contradicts_full_order() {
    let a = Row::new(vec![Datum::Str("ab".into())]).to_binary();
    let b = Row::new(vec![Datum::Str("abc".into())]).to_binary();
    // Zero padding keeps the shorter string first.
    assert!(a.normalized_key() <= b.normalized_key());
    assert!(a < b);
}

// -------------------- Schema --------------------

#[test]
fn trimmed_primary_key_excludes_partition_columns() -> Result<()> {
    let schema = Schema::new(
        vec![
            ("id", DataType::Long),
            ("pt", DataType::String),
            ("v", DataType::Long),
        ],
        &["pt"],
        &["id", "pt"],
    )?;
    assert_eq!(schema.trimmed_primary_key_projection()?, vec![0]);
    assert!(!schema.cross_partition_update());
    Ok(())
}

#[test]
fn cross_partition_update_detected() -> Result<()> {
    let schema = Schema::new(
        vec![("id", DataType::Long), ("pt", DataType::String)],
        &["pt"],
        &["id"],
    )?;
    assert!(schema.cross_partition_update());
    Ok(())
}

#[test]
fn incompatible_schema_rejected() -> Result<()> {
    let a = Schema::new(vec![("id", DataType::Long)], &[], &["id"])?;
    let b = Schema::new(vec![("id", DataType::String)], &[], &["id"])?;
    assert!(a.check_compatible(&b).is_err());
    Ok(())
}

// -------------------- Stats --------------------

#[test]
fn stats_collect_and_roundtrip() -> Result<()> {
    let mut collector = StatsCollector::new(2);
    collector.collect(&Row::new(vec![Datum::Long(5), Datum::Null]));
    collector.collect(&Row::new(vec![Datum::Long(-3), Datum::Str("x".into())]));
    collector.collect(&Row::new(vec![Datum::Long(9), Datum::Null]));
    let stats = collector.finish();

    assert_eq!(stats[0].min, Some(Datum::Long(-3)));
    assert_eq!(stats[0].max, Some(Datum::Long(9)));
    assert_eq!(stats[0].null_count, 0);
    assert_eq!(stats[1].null_count, 2);

    let bytes = write_stats(&stats);
    assert_eq!(read_stats(&bytes)?, stats);
    Ok(())
}

#[test]
fn stats_merge_widens_range() {
    let mut a = FieldStats {
        min: Some(Datum::Long(3)),
        max: Some(Datum::Long(5)),
        null_count: 1,
    };
    let b = FieldStats {
        min: Some(Datum::Long(-1)),
        max: Some(Datum::Long(4)),
        null_count: 2,
    };
    a.merge(&b);
    assert_eq!(a.min, Some(Datum::Long(-1)));
    assert_eq!(a.max, Some(Datum::Long(5)));
    assert_eq!(a.null_count, 3);
}

// -------------------- Predicates --------------------

#[test]
fn predicate_row_eval() {
    let row = Row::new(vec![Datum::Long(7), Datum::Str("A".into())]);
    assert!(Predicate::Equal(0, Datum::Long(7)).test_row(&row));
    assert!(!Predicate::Equal(1, Datum::Str("B".into())).test_row(&row));
    assert!(Predicate::And(vec![
        Predicate::GreaterThan(0, Datum::Long(5)),
        Predicate::LessOrEqual(0, Datum::Long(7)),
    ])
    .test_row(&row));
}

#[test]
fn predicate_stats_pruning() {
    let stats = vec![FieldStats {
        min: Some(Datum::Long(10)),
        max: Some(Datum::Long(20)),
        null_count: 0,
    }];
    // 7 is outside [10, 20]: provably no match.
    assert!(!Predicate::Equal(0, Datum::Long(7)).test_stats(&stats, 100));
    assert!(Predicate::Equal(0, Datum::Long(15)).test_stats(&stats, 100));
    assert!(!Predicate::LessThan(0, Datum::Long(10)).test_stats(&stats, 100));
    assert!(Predicate::LessOrEqual(0, Datum::Long(10)).test_stats(&stats, 100));
    assert!(!Predicate::IsNull(0).test_stats(&stats, 100));
    // Missing stats must never prune.
    assert!(Predicate::Equal(3, Datum::Long(1)).test_stats(&stats, 100));
}

// -------------------- Loser tree --------------------

#[test]
fn loser_tree_merges_in_key_seq_order() -> Result<()> {
    let a = VecIterator::new(vec![
        kv(1, 1, RowKind::Insert, 10),
        kv(3, 5, RowKind::Insert, 30),
    ]);
    let b = VecIterator::new(vec![
        kv(1, 4, RowKind::UpdateAfter, 11),
        kv(2, 2, RowKind::Insert, 20),
    ]);
    let c = VecIterator::new(vec![kv(1, 3, RowKind::Delete, 0)]);

    let mut tree = LoserTree::new(vec![a, b, c])?;
    let mut got = Vec::new();
    while let Some(record) = tree.next_record()? {
        got.push((record.key.clone(), record.seq));
    }
    assert_eq!(
        got,
        vec![
            (long_key(1), 1),
            (long_key(1), 3),
            (long_key(1), 4),
            (long_key(2), 2),
            (long_key(3), 5),
        ]
    );
    Ok(())
}

#[test]
fn loser_tree_empty_and_single_source() -> Result<()> {
    let mut empty: LoserTree<VecIterator> = LoserTree::new(vec![])?;
    assert!(empty.next_record()?.is_none());

    let mut single = LoserTree::new(vec![VecIterator::new(vec![kv(9, 1, RowKind::Insert, 9)])])?;
    assert_eq!(single.next_record()?.unwrap().seq, 1);
    assert!(single.next_record()?.is_none());
    Ok(())
}

#[test]
fn loser_tree_five_sources_thousand_records() -> Result<()> {
    // Five pre-sorted runs with interleaved keys; the merged output must
    // be a single (key asc, seq asc) sequence.
    let mut sources = Vec::new();
    for s in 0..5u64 {
        let mut records = Vec::new();
        for i in 0..200u64 {
            let key = (i * 5 + s) % 997;
            records.push(kv(key as i64, s * 1000 + i, RowKind::Insert, i as i64));
        }
        records.sort_by(|x, y| {
            compare_binary_rows(&x.key, &y.key).then(x.seq.cmp(&y.seq))
        });
        sources.push(VecIterator::new(records));
    }

    let mut tree = LoserTree::new(sources)?;
    let mut count = 0usize;
    let mut prev: Option<(BinaryRow, u64)> = None;
    while let Some(record) = tree.next_record()? {
        if let Some((pk, ps)) = &prev {
            let ord = compare_binary_rows(pk, &record.key);
            assert!(
                ord == std::cmp::Ordering::Less
                    || (ord == std::cmp::Ordering::Equal && *ps <= record.seq),
                "merge output out of order"
            );
        }
        prev = Some((record.key.clone(), record.seq));
        count += 1;
    }
    assert_eq!(count, 1000);
    Ok(())
}
