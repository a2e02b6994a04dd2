//! Concatenation of the non-overlapping files of one sorted run.

use crate::meta::DataFileMeta;
use crate::reader::{DataFileIterator, DataFileReader};
use anyhow::Result;
use row::{KeyValue, KvIterator};
use std::path::{Path, PathBuf};

/// Chains the files of a sorted run into one [`KvIterator`].
///
/// Files at level >= 1 have non-overlapping key ranges, so reading them
/// in ascending min-key order yields a globally sorted stream. Readers
/// are opened lazily, one at a time, keeping the open-handle count at one
/// regardless of run width.
pub struct ConcatIterator {
    dir: PathBuf,
    files: std::vec::IntoIter<DataFileMeta>,
    current: Option<DataFileIterator>,
}

impl ConcatIterator {
    /// Creates an iterator over `files` resolved against `dir`.
    ///
    /// The files are sorted by min key, which for a well-formed run is
    /// also their disjoint range order.
    #[must_use]
    pub fn new(dir: &Path, mut files: Vec<DataFileMeta>) -> Self {
        files.sort_by(|a, b| a.min_key.cmp(&b.min_key));
        Self {
            dir: dir.to_path_buf(),
            files: files.into_iter(),
            current: None,
        }
    }
}

impl KvIterator for ConcatIterator {
    fn advance(&mut self) -> Result<Option<KeyValue>> {
        loop {
            if let Some(iter) = &mut self.current {
                if let Some(kv) = iter.read_record()? {
                    return Ok(Some(kv));
                }
                self.current = None;
            }
            match self.files.next() {
                Some(meta) => {
                    let reader = DataFileReader::open(&self.dir.join(&meta.file_name))?;
                    self.current = Some(reader.iter()?);
                }
                None => return Ok(None),
            }
        }
    }
}
