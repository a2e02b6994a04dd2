use super::*;
use row::Datum;

fn kv(key: i64, seq: u64, kind: RowKind, val: i64) -> KeyValue {
    KeyValue::new(
        Row::new(vec![Datum::Long(key)]).to_binary(),
        seq,
        kind,
        Row::new(vec![Datum::Long(key), Datum::Long(val)]),
    )
}

// -------------------- Versioning --------------------

#[test]
fn retains_all_versions_of_a_key() {
    let mut m = Memtable::new();
    m.insert(kv(1, 1, RowKind::Insert, 10));
    m.insert(kv(1, 2, RowKind::UpdateAfter, 11));
    m.insert(kv(1, 3, RowKind::Delete, 0));
    assert_eq!(m.len(), 3);
}

#[test]
fn iterates_in_key_then_seq_order() {
    let mut m = Memtable::new();
    m.insert(kv(2, 5, RowKind::Insert, 20));
    m.insert(kv(1, 7, RowKind::UpdateAfter, 11));
    m.insert(kv(1, 3, RowKind::Insert, 10));
    m.insert(kv(256, 1, RowKind::Insert, 99));

    let order: Vec<(u64, u64)> = m
        .iter()
        .map(|r| {
            let row = r.key.to_row().unwrap();
            match row.field(0) {
                Datum::Long(v) => (*v as u64, r.seq),
                _ => panic!("unexpected key type"),
            }
        })
        .collect();
    // Typed key order: 1 < 2 < 256 (bytewise LE order would misplace 256).
    assert_eq!(order, vec![(1, 3), (1, 7), (2, 5), (256, 1)]);
}

#[test]
fn redelivered_record_replaces_payload() {
    let mut m = Memtable::new();
    m.insert(kv(1, 1, RowKind::Insert, 10));
    m.insert(kv(1, 1, RowKind::Insert, 42));
    assert_eq!(m.len(), 1);
    let only = m.iter().next().unwrap();
    assert_eq!(only.value.field(1), &Datum::Long(42));
}

// -------------------- Size accounting --------------------

#[test]
fn approx_size_grows_and_resets() {
    let mut m = Memtable::new();
    assert_eq!(m.approx_size(), 0);
    m.insert(kv(1, 1, RowKind::Insert, 10));
    let after_one = m.approx_size();
    assert!(after_one > 0);
    m.insert(kv(2, 2, RowKind::Insert, 20));
    assert!(m.approx_size() > after_one);

    m.clear();
    assert!(m.is_empty());
    assert_eq!(m.approx_size(), 0);
}

#[test]
fn drain_empties_and_preserves_order() {
    let mut m = Memtable::new();
    m.insert(kv(3, 1, RowKind::Insert, 30));
    m.insert(kv(1, 2, RowKind::Insert, 10));
    let drained = m.drain();
    assert!(m.is_empty());
    assert_eq!(m.approx_size(), 0);
    assert_eq!(drained.len(), 2);
    assert!(drained[0].key < drained[1].key);
}

#[test]
fn into_iterator_yields_all_records() {
    let mut m = Memtable::new();
    m.insert(kv(1, 1, RowKind::Insert, 10));
    m.insert(kv(2, 2, RowKind::Delete, 0));
    let mut iter = m.into_iterator();
    let mut count = 0;
    while let Some(_) = iter.advance().unwrap() {
        count += 1;
    }
    assert_eq!(count, 2);
}
