//! External lump files (`<map>_l_<n>.lmp`) that replace lumps of a map.
//!
//! Files apply in ascending `n`; when two files target the same slot the one
//! applied last wins.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bytes::{read_i32_le, write_i32};
use crate::error::{check_range, read_count, BspError, BspResult};
use crate::lump::require_len;

const NAME: &str = "lump_file";
pub const LUMP_FILE_HEADER_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LumpFileHeader {
    /// Offset of the lump data inside the file, normally the header size.
    pub offset: i32,
    pub lump_index: i32,
    pub version: i32,
    pub length: i32,
    pub map_revision: i32,
}

impl LumpFileHeader {
    pub fn parse(bytes: &[u8]) -> BspResult<Self> {
        require_len(NAME, bytes, LUMP_FILE_HEADER_SIZE)?;
        Ok(LumpFileHeader {
            offset: read_i32_le(&bytes[0..4]),
            lump_index: read_i32_le(&bytes[4..8]),
            version: read_i32_le(&bytes[8..12]),
            length: read_i32_le(&bytes[12..16]),
            map_revision: read_i32_le(&bytes[16..20]),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        write_i32(out, self.offset);
        write_i32(out, self.lump_index);
        write_i32(out, self.version);
        write_i32(out, self.length);
        write_i32(out, self.map_revision);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LumpFile {
    pub path: PathBuf,
    pub header: LumpFileHeader,
    pub data: Vec<u8>,
}

pub fn read_lump_file(path: &Path) -> BspResult<LumpFile> {
    let bytes = fs::read(path).map_err(|source| BspError::MissingBackingFile {
        path: path.to_path_buf(),
        source,
    })?;
    let header = LumpFileHeader::parse(&bytes)?;
    let offset = read_count(NAME, header.offset)?;
    let length = read_count(NAME, header.length)?;
    let range = check_range(NAME, offset, length, bytes.len())?;
    Ok(LumpFile {
        path: path.to_path_buf(),
        header,
        data: bytes[range].to_vec(),
    })
}

/// Writes a lump file next to a map, replacing any existing one atomically.
pub fn write_lump_file(path: &Path, header: LumpFileHeader, data: &[u8]) -> BspResult<()> {
    let mut bytes = Vec::with_capacity(LUMP_FILE_HEADER_SIZE + data.len());
    LumpFileHeader {
        offset: LUMP_FILE_HEADER_SIZE as i32,
        length: crate::bytes::i32_from_len(data.len()),
        ..header
    }
    .write(&mut bytes);
    bytes.extend_from_slice(data);

    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    let mut file = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    file.write_all(&bytes)?;
    file.persist(path).map_err(|err| BspError::Io(err.error))?;
    Ok(())
}

/// Path of lump file `n` for the map at `map_path`.
pub fn lump_file_path(map_path: &Path, n: u32) -> PathBuf {
    let stem = map_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    map_path.with_file_name(format!("{}_l_{}.lmp", stem, n))
}

/// Lump files next to `map_path`, sorted by their number.
pub fn find_lump_files(map_path: &Path) -> Vec<(u32, PathBuf)> {
    let Some(stem) = map_path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    let dir = match map_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let prefix = format!("{}_l_", stem);
    let mut found: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rest = name.strip_prefix(&prefix)?;
            let (number, extension) = rest.rsplit_once('.')?;
            if !extension.eq_ignore_ascii_case("lmp") {
                return None;
            }
            let n = number.parse::<u32>().ok()?;
            Some((n, entry.path()))
        })
        .collect();
    found.sort_by_key(|(n, _)| *n);
    found
}

/// Lump replacements keyed by directory slot.
#[derive(Clone, Debug, Default)]
pub struct Overlay {
    slots: BTreeMap<usize, LumpFile>,
}

impl Overlay {
    /// Loads every lump file for `map_path`. Files that cannot be read or
    /// target a slot outside `0..lump_count` are skipped with a warning.
    pub fn load(map_path: &Path, lump_count: usize) -> Self {
        let mut overlay = Overlay::default();
        for (n, path) in find_lump_files(map_path) {
            let file = match read_lump_file(&path) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping lump file");
                    continue;
                }
            };
            overlay.insert(n, file, lump_count);
        }
        overlay
    }

    fn insert(&mut self, n: u32, file: LumpFile, lump_count: usize) {
        let slot = match usize::try_from(file.header.lump_index) {
            Ok(slot) if slot < lump_count => slot,
            _ => {
                tracing::warn!(
                    path = %file.path.display(),
                    lump_index = file.header.lump_index,
                    "lump file targets a slot outside the directory"
                );
                return;
            }
        };
        tracing::debug!(n, slot, path = %file.path.display(), "applying lump file");
        self.slots.insert(slot, file);
    }

    pub fn get(&self, slot: usize) -> Option<&LumpFile> {
        self.slots.get(&slot)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots.keys().copied()
    }
}
