//! Data file format constants and footer read/write helpers.
//!
//! ## Footer (28 bytes) - magic `TLD1` (`0x544c_4431`)
//!
//! ```text
//! [min_seq: u64 LE][max_seq: u64 LE][row_count: u64 LE][magic: u32 LE]
//! ```
//!
//! The reader reads the last 4 bytes (magic) first, then seeks back for
//! the fixed-size footer. The magic carries the format version; readers
//! reject anything they do not understand rather than guessing.

use crate::DataFileError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Magic number identifying v1 data files (ASCII "TLD1").
pub const DATA_FILE_MAGIC: u32 = 0x544c_4431;

/// Footer size in bytes: 3 × u64 + u32.
pub const FOOTER_BYTES: u64 = 8 * 3 + 4;

/// Parsed data file footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub min_seq: u64,
    pub max_seq: u64,
    pub row_count: u64,
}

/// Writes the footer to `w`.
pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(footer.min_seq)?;
    w.write_u64::<LittleEndian>(footer.max_seq)?;
    w.write_u64::<LittleEndian>(footer.row_count)?;
    w.write_u32::<LittleEndian>(DATA_FILE_MAGIC)?;
    Ok(())
}

/// Reads and validates the footer, returning it along with the byte
/// offset where the data section ends. The cursor position afterwards is
/// unspecified.
pub fn read_footer<R: Read + Seek>(
    r: &mut R,
    path: &Path,
) -> Result<(Footer, u64), DataFileError> {
    let filesize = r.seek(SeekFrom::End(0))?;
    if filesize < FOOTER_BYTES {
        return Err(DataFileError::corrupt(path, "file too small for footer"));
    }

    r.seek(SeekFrom::End(-4))?;
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != DATA_FILE_MAGIC {
        return Err(DataFileError::corrupt(
            path,
            format!("unknown magic {magic:#x}"),
        ));
    }

    r.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
    let min_seq = r.read_u64::<LittleEndian>()?;
    let max_seq = r.read_u64::<LittleEndian>()?;
    let row_count = r.read_u64::<LittleEndian>()?;

    Ok((
        Footer {
            min_seq,
            max_seq,
            row_count,
        },
        filesize - FOOTER_BYTES,
    ))
}
