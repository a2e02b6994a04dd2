//! Manifest files: framed entry records behind a magic header.
//!
//! ## File layout - magic `TLM1` (`0x544c_4d31`)
//!
//! ```text
//! [magic: u32 LE]
//! per entry: [body_len: u32 LE][crc32: u32 LE][entry body]
//! ```
//!
//! Manifest files are small (a batch of entries from one commit) and are
//! read whole; statistics for pruning live on [`ManifestFileMeta`] in the
//! manifest lists, so unneeded manifest files are never opened.

use crate::entry::{FileKind, ManifestEntry};
use crate::ManifestError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use row::{read_stats, write_stats, FieldStats, StatsCollector};
use std::fs::{rename, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use uuid::Uuid;

/// Magic number identifying manifest files (ASCII "TLM1").
pub const MANIFEST_MAGIC: u32 = 0x544c_4d31;

/// Guard against corrupt entry lengths.
const MAX_ENTRY_BYTES: usize = 64 * 1024 * 1024;

/// Metadata describing one manifest file, carried in manifest lists.
///
/// The aggregated partition statistics let the planner drop a whole
/// manifest file when no partition inside it can match the filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestFileMeta {
    pub file_name: String,
    pub file_size: u64,
    pub num_added_files: u64,
    pub num_deleted_files: u64,
    pub partition_stats: Vec<FieldStats>,
    pub schema_id: u64,
}

impl ManifestFileMeta {
    /// Serializes this meta (used by the manifest list codec).
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.file_name.len() as u32)?;
        w.write_all(self.file_name.as_bytes())?;
        w.write_u64::<LittleEndian>(self.file_size)?;
        w.write_u64::<LittleEndian>(self.num_added_files)?;
        w.write_u64::<LittleEndian>(self.num_deleted_files)?;
        let stats = write_stats(&self.partition_stats);
        w.write_u32::<LittleEndian>(stats.len() as u32)?;
        w.write_all(&stats)?;
        w.write_u64::<LittleEndian>(self.schema_id)?;
        Ok(())
    }

    /// Deserializes a meta written by [`write_to`](ManifestFileMeta::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<ManifestFileMeta> {
        let name_len = r.read_u32::<LittleEndian>()? as usize;
        if name_len > 4096 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "manifest file name too long",
            ));
        }
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let file_name = String::from_utf8(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "name is not utf-8"))?;
        let file_size = r.read_u64::<LittleEndian>()?;
        let num_added_files = r.read_u64::<LittleEndian>()?;
        let num_deleted_files = r.read_u64::<LittleEndian>()?;
        let stats_len = r.read_u32::<LittleEndian>()? as usize;
        if stats_len > MAX_ENTRY_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "manifest stats too large",
            ));
        }
        let mut stats_buf = vec![0u8; stats_len];
        r.read_exact(&mut stats_buf)?;
        let partition_stats = read_stats(&stats_buf)?;
        let schema_id = r.read_u64::<LittleEndian>()?;
        Ok(ManifestFileMeta {
            file_name,
            file_size,
            num_added_files,
            num_deleted_files,
            partition_stats,
            schema_id,
        })
    }
}

/// Writes `entries` into one or more manifest files under `dir`, rolling
/// to a new file whenever `target_file_size` is exceeded. Returns the
/// metas in write order.
pub fn write_manifest_files(
    dir: &Path,
    entries: &[ManifestEntry],
    schema_id: u64,
    target_file_size: u64,
) -> Result<Vec<ManifestFileMeta>, ManifestError> {
    std::fs::create_dir_all(dir)?;
    let mut metas = Vec::new();
    let mut current: Option<ManifestWriter> = None;

    for entry in entries {
        if current.is_none() {
            current = Some(ManifestWriter::create(dir, schema_id)?);
        }
        let writer = current.as_mut().expect("writer ensured above");
        writer.append(entry)?;
        if writer.bytes_written >= target_file_size {
            if let Some(w) = current.take() {
                metas.push(w.finish()?);
            }
        }
    }
    if let Some(w) = current.take() {
        metas.push(w.finish()?);
    }
    Ok(metas)
}

/// Folds an oversized base manifest set into fewer, larger files.
///
/// When a table accumulates `merge_min_count` or more base manifests,
/// the committer reads them all, cancels matched ADD/DELETE pairs and
/// rewrites the survivors into fresh files capped at `target_file_size`.
/// Returns `None` when the base is still small enough to keep as is.
pub fn fold_manifests(
    dir: &Path,
    base: &[ManifestFileMeta],
    schema_id: u64,
    merge_min_count: usize,
    target_file_size: u64,
) -> Result<Option<Vec<ManifestFileMeta>>, ManifestError> {
    if base.len() < merge_min_count {
        return Ok(None);
    }
    let mut entries = Vec::new();
    for meta in base {
        entries.extend(read_manifest_file(&dir.join(&meta.file_name))?);
    }
    let mut live = crate::entry::merge_add_delete(entries);
    live.sort_by(|a, b| {
        a.partition
            .as_bytes()
            .cmp(b.partition.as_bytes())
            .then(a.bucket.cmp(&b.bucket))
            .then(a.file.file_name.cmp(&b.file.file_name))
    });
    let metas = write_manifest_files(dir, &live, schema_id, target_file_size)?;
    Ok(Some(metas))
}

/// Reads every entry of one manifest file.
pub fn read_manifest_file(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let mut file = BufReader::new(File::open(path)?);
    let magic = file.read_u32::<LittleEndian>()?;
    if magic != MANIFEST_MAGIC {
        return Err(ManifestError::corrupt(
            path,
            format!("unknown magic {magic:#x}"),
        ));
    }

    let mut entries = Vec::new();
    loop {
        let body_len = match file.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if body_len > MAX_ENTRY_BYTES {
            return Err(ManifestError::corrupt(path, "entry length too large"));
        }
        let crc = file.read_u32::<LittleEndian>()?;
        let mut body = vec![0u8; body_len];
        file.read_exact(&mut body)?;

        let mut hasher = Crc32::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(ManifestError::corrupt(path, "entry crc mismatch"));
        }
        entries.push(
            ManifestEntry::read_from(&mut &body[..])
                .map_err(|e| ManifestError::corrupt(path, e.to_string()))?,
        );
    }
    Ok(entries)
}

/// Streaming writer for one `manifest-<uuid>` file.
struct ManifestWriter {
    path: std::path::PathBuf,
    tmp_path: std::path::PathBuf,
    file: BufWriter<File>,
    body_buf: Vec<u8>,
    bytes_written: u64,
    num_added: u64,
    num_deleted: u64,
    partition_stats: Option<StatsCollector>,
    entry_count: u64,
    schema_id: u64,
}

impl ManifestWriter {
    fn create(dir: &Path, schema_id: u64) -> Result<Self, ManifestError> {
        let path = dir.join(format!("manifest-{}", Uuid::new_v4()));
        let tmp_path = path.with_extension("tmp");
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw);
        file.write_u32::<LittleEndian>(MANIFEST_MAGIC)?;
        Ok(Self {
            path,
            tmp_path,
            file,
            body_buf: Vec::with_capacity(512),
            bytes_written: 4,
            num_added: 0,
            num_deleted: 0,
            partition_stats: None,
            entry_count: 0,
            schema_id,
        })
    }

    fn append(&mut self, entry: &ManifestEntry) -> Result<(), ManifestError> {
        self.body_buf.clear();
        entry.write_to(&mut self.body_buf)?;

        let mut hasher = Crc32::new();
        hasher.update(&self.body_buf);
        let crc = hasher.finalize();

        self.file
            .write_u32::<LittleEndian>(self.body_buf.len() as u32)?;
        self.file.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&self.body_buf)?;
        self.bytes_written += 8 + self.body_buf.len() as u64;

        match entry.kind {
            FileKind::Add => self.num_added += 1,
            FileKind::Delete => self.num_deleted += 1,
        }
        if let Ok(partition_row) = entry.partition.to_row() {
            self.partition_stats
                .get_or_insert_with(|| StatsCollector::new(partition_row.arity()))
                .collect(&partition_row);
        }
        self.entry_count += 1;
        Ok(())
    }

    fn finish(self) -> Result<ManifestFileMeta, ManifestError> {
        let mut file = self.file;
        file.flush()?;
        file.into_inner()
            .map_err(|e| ManifestError::Io(e.into_error()))?
            .sync_all()?;
        rename(&self.tmp_path, &self.path)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(ManifestFileMeta {
            file_name,
            file_size: self.bytes_written,
            num_added_files: self.num_added,
            num_deleted_files: self.num_deleted,
            partition_stats: self
                .partition_stats
                .map(StatsCollector::finish)
                .unwrap_or_default(),
            schema_id: self.schema_id,
        })
    }
}
