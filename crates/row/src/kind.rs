//! Change-record kinds for CDC streams.

use std::fmt;
use std::io;

/// The kind of change a record represents.
///
/// Byte codes are stable across the data file and changelog formats:
/// `0 = +I`, `1 = -U`, `2 = +U`, `3 = -D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    Insert,
    UpdateBefore,
    UpdateAfter,
    Delete,
}

impl RowKind {
    /// Stable byte code used on disk.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            RowKind::Insert => 0,
            RowKind::UpdateBefore => 1,
            RowKind::UpdateAfter => 2,
            RowKind::Delete => 3,
        }
    }

    /// Decodes a byte code written by [`to_byte`](RowKind::to_byte).
    pub fn from_byte(b: u8) -> io::Result<RowKind> {
        match b {
            0 => Ok(RowKind::Insert),
            1 => Ok(RowKind::UpdateBefore),
            2 => Ok(RowKind::UpdateAfter),
            3 => Ok(RowKind::Delete),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown row kind byte: {other}"),
            )),
        }
    }

    /// `true` for the two retraction kinds (`-U`, `-D`).
    #[must_use]
    pub fn is_retract(self) -> bool {
        matches!(self, RowKind::UpdateBefore | RowKind::Delete)
    }

    /// `true` for the two additive kinds (`+I`, `+U`).
    #[must_use]
    pub fn is_add(self) -> bool {
        !self.is_retract()
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowKind::Insert => "+I",
            RowKind::UpdateBefore => "-U",
            RowKind::UpdateAfter => "+U",
            RowKind::Delete => "-D",
        };
        f.write_str(s)
    }
}
