use crate::Table;
use row::{DataType, Datum, Row, Schema};
use std::collections::BTreeMap;
use std::path::Path;

/// `(id: long, pt: string, v: long)` partitioned by `pt`, primary key
/// `id` — the cross-partition shape.
pub fn cross_partition_schema() -> Schema {
    Schema::new(
        vec![
            ("id", DataType::Long),
            ("pt", DataType::String),
            ("v", DataType::Long),
        ],
        &["pt"],
        &["id"],
    )
    .unwrap()
}

/// `(id: long, v: long)` unpartitioned, primary key `id`.
pub fn simple_schema() -> Schema {
    Schema::new(vec![("id", DataType::Long), ("v", DataType::Long)], &[], &["id"]).unwrap()
}

pub fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn simple_table(root: &Path, extra: &[(&str, &str)]) -> Table {
    let mut pairs = vec![("bucket", "2")];
    pairs.extend_from_slice(extra);
    Table::create(root, simple_schema(), &options(&pairs)).unwrap()
}

pub fn simple_row(id: i64, v: i64) -> Row {
    Row::new(vec![Datum::Long(id), Datum::Long(v)])
}

pub fn cross_row(id: i64, pt: &str, v: i64) -> Row {
    Row::new(vec![
        Datum::Long(id),
        Datum::Str(pt.to_string()),
        Datum::Long(v),
    ])
}

/// Extracts `(id, v)` pairs from simple-schema rows, sorted by id.
pub fn as_pairs(rows: Vec<Row>) -> Vec<(i64, i64)> {
    let mut out: Vec<(i64, i64)> = rows
        .into_iter()
        .map(|r| match (r.field(0), r.field(1)) {
            (Datum::Long(id), Datum::Long(v)) => (*id, *v),
            other => panic!("unexpected row shape: {other:?}"),
        })
        .collect();
    out.sort_unstable();
    out
}

/// Extracts `(id, pt, v)` triples from cross-partition rows, sorted.
pub fn as_triples(rows: Vec<Row>) -> Vec<(i64, String, i64)> {
    let mut out: Vec<(i64, String, i64)> = rows
        .into_iter()
        .map(|r| match (r.field(0), r.field(1), r.field(2)) {
            (Datum::Long(id), Datum::Str(pt), Datum::Long(v)) => (*id, pt.clone(), *v),
            other => panic!("unexpected row shape: {other:?}"),
        })
        .collect();
    out.sort();
    out
}
