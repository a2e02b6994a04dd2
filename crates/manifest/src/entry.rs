//! Manifest entries: ADD / DELETE membership records for data files.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use datafile::DataFileMeta;
use row::BinaryRow;
use std::io::{self, Read, Write};

/// Whether an entry adds a file to the snapshot or removes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Add,
    Delete,
}

impl FileKind {
    /// Stable byte code used on disk.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            FileKind::Add => 0,
            FileKind::Delete => 1,
        }
    }

    /// Decodes a byte written by [`to_byte`](FileKind::to_byte).
    pub fn from_byte(b: u8) -> io::Result<FileKind> {
        match b {
            0 => Ok(FileKind::Add),
            1 => Ok(FileKind::Delete),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown file kind byte: {other}"),
            )),
        }
    }
}

/// One membership record: a data file entering or leaving a
/// (partition, bucket, level).
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub kind: FileKind,
    pub partition: BinaryRow,
    pub bucket: i32,
    /// Bucket count in force when the file was written. A mismatch with
    /// the current table's count means the table was rescaled without an
    /// overwrite and reads must fail.
    pub total_buckets: i32,
    pub file: DataFileMeta,
}

impl ManifestEntry {
    /// The identity under which ADD and DELETE entries cancel out.
    #[must_use]
    pub fn identifier(&self) -> (Vec<u8>, i32, u32, String) {
        (
            self.partition.as_bytes().to_vec(),
            self.bucket,
            self.file.level,
            self.file.file_name.clone(),
        )
    }

    /// Serializes the entry body (framing is the manifest file's job).
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.kind.to_byte())?;
        self.partition.write_to(w)?;
        w.write_i32::<LittleEndian>(self.bucket)?;
        w.write_i32::<LittleEndian>(self.total_buckets)?;
        self.file.write_to(w)
    }

    /// Deserializes an entry body.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<ManifestEntry> {
        let kind = FileKind::from_byte(r.read_u8()?)?;
        let partition = BinaryRow::read_from(r)?;
        let bucket = r.read_i32::<LittleEndian>()?;
        let total_buckets = r.read_i32::<LittleEndian>()?;
        let file = DataFileMeta::read_from(r)?;
        Ok(ManifestEntry {
            kind,
            partition,
            bucket,
            total_buckets,
            file,
        })
    }
}

/// Folds ADD/DELETE entries: a file survives iff its net balance is +1.
pub(crate) fn merge_add_delete(entries: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    use std::collections::HashMap;

    let mut balance: HashMap<(Vec<u8>, i32, u32, String), (i32, Option<ManifestEntry>)> =
        HashMap::new();
    for entry in entries {
        let slot = balance.entry(entry.identifier()).or_insert((0, None));
        match entry.kind {
            FileKind::Add => {
                slot.0 += 1;
                slot.1 = Some(entry);
            }
            FileKind::Delete => slot.0 -= 1,
        }
    }
    balance
        .into_values()
        .filter_map(|(net, entry)| if net > 0 { entry } else { None })
        .collect()
}
