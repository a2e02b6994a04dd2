//! Manifest lists: the ordered set of manifest files one snapshot
//! references.
//!
//! ## File layout - magic `TLL1` (`0x544c_4c31`)
//!
//! ```text
//! [magic: u32 LE]
//! per meta: [body_len: u32 LE][crc32: u32 LE][ManifestFileMeta body]
//! ```

use crate::manifestfile::ManifestFileMeta;
use crate::ManifestError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{rename, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use uuid::Uuid;

/// Magic number identifying manifest list files (ASCII "TLL1").
pub const MANIFEST_LIST_MAGIC: u32 = 0x544c_4c31;

const MAX_META_BYTES: usize = 16 * 1024 * 1024;

/// Writes a manifest list under `dir`, returning its file name.
pub fn write_manifest_list(
    dir: &Path,
    metas: &[ManifestFileMeta],
) -> Result<String, ManifestError> {
    std::fs::create_dir_all(dir)?;
    let name = format!("manifest-list-{}", Uuid::new_v4());
    let path = dir.join(&name);
    let tmp_path = path.with_extension("tmp");

    let raw = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut file = BufWriter::new(raw);
    file.write_u32::<LittleEndian>(MANIFEST_LIST_MAGIC)?;

    let mut body = Vec::with_capacity(256);
    for meta in metas {
        body.clear();
        meta.write_to(&mut body)?;
        let mut hasher = Crc32::new();
        hasher.update(&body);
        file.write_u32::<LittleEndian>(body.len() as u32)?;
        file.write_u32::<LittleEndian>(hasher.finalize())?;
        file.write_all(&body)?;
    }

    file.flush()?;
    file.into_inner()
        .map_err(|e| ManifestError::Io(e.into_error()))?
        .sync_all()?;
    rename(&tmp_path, &path)?;
    Ok(name)
}

/// Reads a manifest list written by [`write_manifest_list`].
pub fn read_manifest_list(path: &Path) -> Result<Vec<ManifestFileMeta>, ManifestError> {
    let mut file = BufReader::new(File::open(path)?);
    let magic = file.read_u32::<LittleEndian>()?;
    if magic != MANIFEST_LIST_MAGIC {
        return Err(ManifestError::corrupt(
            path,
            format!("unknown magic {magic:#x}"),
        ));
    }

    let mut metas = Vec::new();
    loop {
        let body_len = match file.read_u32::<LittleEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if body_len > MAX_META_BYTES {
            return Err(ManifestError::corrupt(path, "meta length too large"));
        }
        let crc = file.read_u32::<LittleEndian>()?;
        let mut body = vec![0u8; body_len];
        file.read_exact(&mut body)?;

        let mut hasher = Crc32::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(ManifestError::corrupt(path, "meta crc mismatch"));
        }
        metas.push(
            ManifestFileMeta::read_from(&mut &body[..])
                .map_err(|e| ManifestError::corrupt(path, e.to_string()))?,
        );
    }
    Ok(metas)
}
