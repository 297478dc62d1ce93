use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::map_type::MapType;

pub type BspResult<T> = Result<T, BspError>;

/// Every failure in this crate is recoverable: a bad lump is reported to the
/// caller, which decides whether to continue without it.
#[derive(Debug, Error)]
pub enum BspError {
    #[error("malformed bsp header: {0}")]
    MalformedHeader(String),
    #[error("{lump} lump is truncated: {detail}")]
    TruncatedLump {
        lump: &'static str,
        detail: Truncation,
    },
    #[error("{record} has no layout for {map_type} (lump version {version})")]
    UnsupportedLayout {
        record: &'static str,
        map_type: MapType,
        version: i32,
    },
    #[error("cannot read {}: {source}", .path.display())]
    MissingBackingFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{record} layout differs between {from} and {to}; re-encode instead of copying bytes")]
    IncompatibleCopy {
        record: &'static str,
        from: MapType,
        to: MapType,
    },
    #[error("{lump} lump holds {count} records, above the limit of {limit}")]
    LumpTooLarge {
        lump: &'static str,
        count: usize,
        limit: usize,
    },
    #[error("lump slot {slot} is already loaded as a different type")]
    LumpTypeMismatch { slot: usize },
    #[error("invalid reader options: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl BspError {
    pub(crate) fn truncated(lump: &'static str, detail: Truncation) -> Self {
        BspError::TruncatedLump { lump, detail }
    }

    pub(crate) fn unsupported(record: &'static str, map_type: MapType, version: i32) -> Self {
        BspError::UnsupportedLayout {
            record,
            map_type,
            version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// The lump length does not divide into whole records.
    PartialRecord { length: usize, stride: usize },
    /// The declared range runs past the end of its backing source.
    OutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },
    /// A field needed more bytes than the record provides.
    ShortRecord { expected: usize, actual: usize },
    UnterminatedString { offset: usize },
    /// A run-length marker at the very end of the data has no count byte.
    DanglingRun { offset: usize },
    /// A stored element count is negative.
    NegativeCount { value: i32 },
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Truncation::PartialRecord { length, stride } => write!(
                f,
                "length {} is not a multiple of the record size {}",
                length, stride
            ),
            Truncation::OutOfBounds {
                offset,
                length,
                available,
            } => write!(
                f,
                "range {}+{} exceeds the {} available bytes",
                offset, length, available
            ),
            Truncation::ShortRecord { expected, actual } => {
                write!(f, "expected {} bytes, got {}", expected, actual)
            }
            Truncation::UnterminatedString { offset } => {
                write!(f, "string at {} has no terminator", offset)
            }
            Truncation::DanglingRun { offset } => {
                write!(f, "zero run at {} is missing its count byte", offset)
            }
            Truncation::NegativeCount { value } => write!(f, "count {} is negative", value),
        }
    }
}

/// Converts a stored count, rejecting negative values.
pub(crate) fn read_count(lump: &'static str, value: i32) -> BspResult<usize> {
    usize::try_from(value)
        .map_err(|_| BspError::truncated(lump, Truncation::NegativeCount { value }))
}

/// Checks `offset + length <= available` without overflowing.
pub(crate) fn check_range(
    lump: &'static str,
    offset: usize,
    length: usize,
    available: usize,
) -> BspResult<std::ops::Range<usize>> {
    let end = offset.checked_add(length).filter(|end| *end <= available);
    match end {
        Some(end) => Ok(offset..end),
        None => Err(BspError::truncated(
            lump,
            Truncation::OutOfBounds {
                offset,
                length,
                available,
            },
        )),
    }
}
