//! Serialises a container back to the binary format.

use std::io::Write;
use std::path::Path;

use crate::bsp::Bsp;
use crate::bytes::{align4, i32_from_len};
use crate::cipher;
use crate::error::{BspError, BspResult};
use crate::game_lump::GameLump;
use crate::layout::{lump_index, LumpKind, RowFormat};
use crate::map_type::MapType;

/// A regenerated directory row.
struct Row {
    offset: usize,
    length: usize,
    version: i32,
    ident: i32,
}

pub fn write_bytes(bsp: &Bsp) -> BspResult<Vec<u8>> {
    force_game_lump(bsp)?;

    let header = bsp.header;
    let zero_empty = bsp.map_type.is_subtype_of(MapType::SOURCE);
    let mut out = vec![0u8; header.size()];
    let mut rows = Vec::with_capacity(bsp.lump_count());
    for slot in 0..bsp.lump_count() {
        let offset = align4(out.len());
        out.resize(offset, 0);

        let info = &bsp.infos[slot];
        let (bytes, ident) = match bsp.slots[slot].get() {
            Some(lump) => (lump.emit_dyn(bsp.context(slot), offset)?, 0),
            None => (bsp.raw_lump(slot)?, info.ident),
        };
        rows.push(Row {
            offset: if bytes.is_empty() && zero_empty { 0 } else { offset },
            length: bytes.len(),
            version: info.version,
            ident,
        });
        out.extend_from_slice(&bytes);
    }

    let (head, _) = out.split_at_mut(header.size());
    head[..header.prefix].copy_from_slice(&bsp.prefix);
    for (slot, row) in rows.iter().enumerate() {
        let start = header.row_offset(slot);
        write_row(&mut head[start..start + header.row.width()], header.row, row);
    }
    let suffix_start = header.size() - header.suffix;
    head[suffix_start..].copy_from_slice(&bsp.suffix);

    if let Some(key) = &bsp.key {
        cipher::xor_in_place(&mut out, key, 0);
    }
    tracing::debug!(map_type = %bsp.map_type, bytes = out.len(), "wrote bsp");
    Ok(out)
}

/// Writes through a temporary file in the destination directory, so a failed
/// write never leaves a partial map behind.
pub fn write_file(bsp: &Bsp, path: &Path) -> BspResult<()> {
    let bytes = write_bytes(bsp)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| BspError::Io(err.error))?;
    tracing::debug!(path = %path.display(), "persisted bsp");
    Ok(())
}

// Game lump rows hold absolute file offsets, which go stale as soon as any
// earlier lump changes size.
fn force_game_lump(bsp: &Bsp) -> BspResult<()> {
    let Some(slot) = lump_index(LumpKind::GameLump, bsp.map_type) else {
        return Ok(());
    };
    if slot < bsp.lump_count() && !bsp.is_loaded(slot) {
        bsp.lump_at::<GameLump>(slot)?;
    }
    Ok(())
}

fn write_row(row: &mut [u8], format: RowFormat, entry: &Row) {
    put_i32(row, format.offset_field(), i32_from_len(entry.offset));
    put_i32(row, format.length_field(), i32_from_len(entry.length));
    if let Some((version, ident)) = format.version_fields() {
        put_i32(row, version, entry.version);
        put_i32(row, ident, entry.ident);
    }
}

fn put_i32(buf: &mut [u8], at: usize, value: i32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::RawLump;
    use crate::bytes::{read_i32_le, write_i32};
    use crate::config::ReaderOptions;
    use crate::detect::detect;
    use crate::lump::Lump;
    use crate::math::Vector3;
    use crate::reader::read_bytes;
    use crate::records::Plane;

    fn quake_file() -> Vec<u8> {
        let mut data = Vec::new();
        write_i32(&mut data, 29);
        for slot in 0..15 {
            let (offset, length) = if slot == 0 { (124, 4) } else { (128, 0) };
            write_i32(&mut data, offset);
            write_i32(&mut data, length);
        }
        data.extend_from_slice(b"{}\n\0");
        data
    }

    #[test]
    fn untouched_rewrite_is_identical() {
        let original = quake_file();
        let bsp = read_bytes(original.clone(), &ReaderOptions::default()).expect("read");
        assert_eq!(bsp.to_bytes().expect("write"), original);
    }

    #[test]
    fn lumps_are_aligned_and_rows_regenerated() {
        let mut bsp = read_bytes(quake_file(), &ReaderOptions::default()).expect("read");
        bsp.replace_lump(0, RawLump(b"{}\n".to_vec())).expect("entities");
        bsp.replace_lump(
            1,
            Lump::from_vec(vec![Plane::new(Vector3::new(1.0, 0.0, 0.0), 8.0)]),
        )
        .expect("planes");
        let out = bsp.to_bytes().expect("write");

        assert_eq!(read_i32_le(&out[8..12]), 3);
        // planes start on the next 4-byte boundary
        assert_eq!(read_i32_le(&out[12..16]), 128);
        assert_eq!(read_i32_le(&out[16..20]), 20);
        assert_eq!(out[127], 0);
        assert_eq!(out.len(), 148);
        // empty lumps point at the end of the previous one
        assert_eq!(read_i32_le(&out[20..24]), 148);

        let reread = read_bytes(out, &ReaderOptions::default()).expect("reread");
        assert_eq!(reread.planes().expect("planes")[0].distance, 8.0);
    }

    #[test]
    fn source_empty_lumps_use_offset_zero() {
        let bsp = Bsp::new(MapType::SOURCE20).expect("new");
        let out = bsp.to_bytes().expect("write");
        assert_eq!(detect(&out), MapType::SOURCE20);
        // entities: empty
        assert_eq!(read_i32_le(&out[8..12]), 0);
        assert_eq!(read_i32_le(&out[12..16]), 0);
        // game lump: forced to load and written as an empty directory
        let row = 8 + 35 * 16;
        assert_eq!(read_i32_le(&out[row..row + 4]), 1036);
        assert_eq!(read_i32_le(&out[row + 4..row + 8]), 4);
        assert_eq!(out.len(), 1040);
    }

    #[test]
    fn source_rows_keep_version_and_clear_fourcc_of_loaded_lumps() {
        let mut data = Bsp::new(MapType::SOURCE19)
            .expect("new")
            .to_bytes()
            .expect("write");
        // planes row: version 3 and a nonzero fourCC
        data[24 + 8..24 + 12].copy_from_slice(&3i32.to_le_bytes());
        data[24 + 12..24 + 16].copy_from_slice(&7i32.to_le_bytes());
        // texture info row keeps its fourCC while untouched
        let ti = 8 + 6 * 16;
        data[ti + 12..ti + 16].copy_from_slice(&9i32.to_le_bytes());

        let bsp = read_bytes(data, &ReaderOptions::default()).expect("read");
        bsp.planes().expect("planes");
        let out = bsp.to_bytes().expect("write");
        assert_eq!(read_i32_le(&out[32..36]), 3);
        assert_eq!(read_i32_le(&out[36..40]), 0);
        assert_eq!(read_i32_le(&out[ti + 12..ti + 16]), 9);
    }

    #[test]
    fn write_file_replaces_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.bsp");
        std::fs::write(&path, b"old").expect("seed");
        let bsp = read_bytes(quake_file(), &ReaderOptions::default()).expect("read");
        write_file(&bsp, &path).expect("write");
        assert_eq!(std::fs::read(&path).expect("read back"), quake_file());
    }
}
