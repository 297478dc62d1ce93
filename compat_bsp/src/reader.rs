//! Opens map files: detection, header parsing and lump file overlays.

use std::fs;
use std::path::Path;

use crate::bsp::{Bsp, ByteSource};
use crate::bytes::read_i32_le;
use crate::cipher::{self, Key};
use crate::config::ReaderOptions;
use crate::detect::detect_with_key;
use crate::error::{BspError, BspResult};
use crate::layout::{header_layout, HeaderLayout};
use crate::lump::LumpInfo;
use crate::map_type::MapType;
use crate::overlay::Overlay;

pub fn read_file(path: &Path, options: &ReaderOptions) -> BspResult<Bsp> {
    let data = fs::read(path).map_err(|source| BspError::MissingBackingFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut bsp = read_bytes(data, options)?;
    if options.load_lump_files {
        let overlay = Overlay::load(path, bsp.lump_count());
        apply_overlay(&mut bsp, overlay);
    }
    bsp.path = Some(path.to_path_buf());
    Ok(bsp)
}

/// Parses an in-memory map. Lump files are never applied here since there is
/// no path to look next to.
pub fn read_bytes(data: Vec<u8>, options: &ReaderOptions) -> BspResult<Bsp> {
    let (map_type, key) = identify(&data, options);
    if map_type.is_undefined() {
        return Err(BspError::MalformedHeader(
            "unrecognised map signature".to_string(),
        ));
    }
    let header = header_layout(map_type)
        .ok_or_else(|| BspError::unsupported("header", map_type, 0))?;
    let size = header.size();
    if data.len() < size {
        return Err(BspError::MalformedHeader(format!(
            "{} header needs {} bytes, file has {}",
            map_type,
            size,
            data.len()
        )));
    }

    let mut head = data[..size].to_vec();
    if let Some(key) = &key {
        cipher::xor_in_place(&mut head, key, 0);
    }
    let infos = (0..header.lump_count)
        .map(|slot| parse_row(&head, header, slot))
        .collect::<BspResult<Vec<_>>>()?;
    tracing::debug!(
        map_type = %map_type,
        lumps = infos.len(),
        encrypted = key.is_some(),
        "read bsp header"
    );

    let prefix = head[..header.prefix].to_vec();
    let suffix = head[size - header.suffix..].to_vec();
    let source = ByteSource {
        data,
        key,
        overlay: Overlay::default(),
    };
    let mut bsp = Bsp::from_parts(map_type, header, prefix, suffix, infos, source);
    bsp.max_records = options.max_lump_records;
    Ok(bsp)
}

fn identify(data: &[u8], options: &ReaderOptions) -> (MapType, Option<Key>) {
    match options.forced_map_type() {
        Some(tag) if tag.is_subtype_of(MapType::TACTICAL_INTERVENTION) => {
            (tag, cipher::key_from_file(data))
        }
        Some(tag) => (tag, None),
        None => detect_with_key(data),
    }
}

fn parse_row(head: &[u8], header: HeaderLayout, slot: usize) -> BspResult<LumpInfo> {
    let start = header.row_offset(slot);
    let row = &head[start..start + header.row.width()];
    let field = |at: usize| read_i32_le(&row[at..at + 4]);

    let offset = field(header.row.offset_field());
    let length = field(header.row.length_field());
    let length = usize::try_from(length).map_err(|_| {
        BspError::MalformedHeader(format!("slot {} has negative length {}", slot, length))
    })?;
    let offset = match usize::try_from(offset) {
        Ok(offset) => offset,
        Err(_) if length == 0 => 0,
        Err(_) => {
            return Err(BspError::MalformedHeader(format!(
                "slot {} has negative offset {}",
                slot, offset
            )))
        }
    };
    let (version, ident) = match header.row.version_fields() {
        Some((version, ident)) => (field(version), field(ident)),
        None => (0, 0),
    };
    Ok(LumpInfo {
        ident,
        flags: 0,
        version,
        offset,
        length,
        override_file: None,
    })
}

fn apply_overlay(bsp: &mut Bsp, overlay: Overlay) {
    for slot in overlay.slots() {
        let Some(file) = overlay.get(slot) else {
            continue;
        };
        let info = &mut bsp.infos[slot];
        info.override_file = Some(file.path.clone());
        info.length = file.data.len();
        info.version = file.header.version;
        tracing::debug!(slot, path = %file.path.display(), "lump replaced by lump file");
    }
    bsp.source.overlay = overlay;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::write_i32;

    fn quake_file() -> Vec<u8> {
        let mut data = Vec::new();
        write_i32(&mut data, 29);
        let header = 4 + 15 * 8;
        for slot in 0..15 {
            if slot == 0 {
                write_i32(&mut data, header);
                write_i32(&mut data, 4);
            } else {
                write_i32(&mut data, header + 4);
                write_i32(&mut data, 0);
            }
        }
        data.extend_from_slice(b"{}\n\0");
        data
    }

    #[test]
    fn parses_quake_directory() {
        let bsp = read_bytes(quake_file(), &ReaderOptions::default()).expect("read");
        assert_eq!(bsp.map_type(), MapType::QUAKE);
        assert_eq!(bsp.lump_count(), 15);
        assert_eq!(bsp.lump_info(0).map(|info| info.length), Some(4));
        assert_eq!(bsp.raw_lump(0).expect("entities"), b"{}\n\0");
        assert_eq!(bsp.entities().expect("text"), "{}\n");
    }

    #[test]
    fn short_or_unknown_files_are_malformed() {
        let options = ReaderOptions::default();
        assert!(matches!(
            read_bytes(b"XXXXXXXX".to_vec(), &options),
            Err(BspError::MalformedHeader(_))
        ));
        let mut short = quake_file();
        short.truncate(40);
        assert!(matches!(
            read_bytes(short, &options),
            Err(BspError::MalformedHeader(_))
        ));
    }

    #[test]
    fn forced_type_skips_detection() {
        let options = ReaderOptions {
            map_type: Some("goldsrc".to_string()),
            ..ReaderOptions::default()
        };
        let bsp = read_bytes(quake_file(), &options).expect("read");
        assert_eq!(bsp.map_type(), MapType::GOLDSRC);
    }

    #[test]
    fn lump_past_end_fails_only_that_lump() {
        let mut data = quake_file();
        // planes: offset 128, length 400
        data[16..20].copy_from_slice(&400i32.to_le_bytes());
        let bsp = read_bytes(data, &ReaderOptions::default()).expect("read");
        assert!(matches!(
            bsp.planes(),
            Err(BspError::TruncatedLump { .. })
        ));
        assert_eq!(bsp.entities().expect("text"), "{}\n");
    }

    #[test]
    fn missing_file() {
        let err = read_file(Path::new("/nonexistent/map.bsp"), &ReaderOptions::default())
            .expect_err("missing");
        assert!(matches!(err, BspError::MissingBackingFile { .. }));
    }
}
