//! On-disk layout helpers.

use row::{BinaryRow, Datum, Row, Schema};
use std::path::{Path, PathBuf};

/// `<root>/manifest`
pub fn manifest_dir(root: &Path) -> PathBuf {
    root.join("manifest")
}

/// `<root>/schema`
pub fn schema_dir(root: &Path) -> PathBuf {
    root.join("schema")
}

/// `<root>/index/shard-<s>`
pub fn index_shard_dir(root: &Path, shard: usize) -> PathBuf {
    root.join("index").join(format!("shard-{shard}"))
}

/// `<root>/bucket-<b>/<partition-path>`
///
/// Partition directories nest one level per partition column,
/// `name=value` each.
pub fn bucket_dir(root: &Path, schema: &Schema, partition: &Row, bucket: i32) -> PathBuf {
    let mut dir = root.join(format!("bucket-{bucket}"));
    for (name, datum) in schema.partition_keys.iter().zip(partition.0.iter()) {
        dir = dir.join(format!("{}={}", name, path_value(datum)));
    }
    dir
}

/// Resolves a serialized partition payload to its bucket directory.
pub fn bucket_dir_binary(
    root: &Path,
    schema: &Schema,
    partition: &BinaryRow,
    bucket: i32,
) -> std::io::Result<PathBuf> {
    let row = partition.to_row()?;
    Ok(bucket_dir(root, schema, &row, bucket))
}

/// Renders one partition value as a path segment.
fn path_value(datum: &Datum) -> String {
    match datum {
        Datum::Null => "__NULL__".to_string(),
        Datum::Boolean(b) => b.to_string(),
        Datum::Int(v) => v.to_string(),
        Datum::Long(v) => v.to_string(),
        Datum::Double(v) => v.to_string(),
        Datum::Str(s) => s.replace(['/', '\\'], "_"),
        Datum::Bytes(b) => hex(b),
        Datum::TimestampMillis(v) => v.to_string(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
