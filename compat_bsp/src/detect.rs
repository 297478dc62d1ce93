//! Identifies the variant of a BSP file from its leading bytes.
//!
//! Detection never fails: anything unrecognised, including buffers too short
//! for a secondary probe, comes back as [`MapType::UNDEFINED`].

use crate::bytes::{peek_i32, read_i32_le};
use crate::cipher::{self, Key};
use crate::layout::{header_layout, lump_index, LumpKind, SIGNATURES, SOURCE_HEADER_SIZE};
use crate::map_type::MapType;

pub fn detect(data: &[u8]) -> MapType {
    detect_with_key(data).0
}

/// Like [`detect`], also returning the XOR key of an encrypted file.
pub fn detect_with_key(data: &[u8]) -> (MapType, Option<Key>) {
    if data.len() < 4 {
        return (MapType::UNDEFINED, None);
    }
    let tag = detect_plain(data);
    if !tag.is_undefined() {
        return (tag, None);
    }
    if let Some(key) = cipher::key_from_file(data) {
        let magic = cipher::xor(&data[0..4], &key, 0);
        if magic == b"VBSP" {
            return (MapType::TACTICAL_INTERVENTION, Some(key));
        }
    }
    (MapType::UNDEFINED, None)
}

fn detect_plain(data: &[u8]) -> MapType {
    match read_i32_le(&data[0..4]) {
        29 => return MapType::QUAKE,
        30 => return goldsrc_or_blue_shift(data),
        42 => return MapType::NIGHTFIRE,
        _ => {}
    }

    let Some(version) = peek_i32(data, 4) else {
        return MapType::UNDEFINED;
    };
    let ident = &data[0..4];
    let mut candidates = SIGNATURES.iter().filter(|(_, signature)| {
        signature.ident.as_ref().map(|magic| &magic[..]) == Some(ident)
            && signature.version == version
    });
    let Some((first, _)) = candidates.next() else {
        return MapType::UNDEFINED;
    };

    match *first {
        MapType::SOF | MapType::QUAKE3 if version == 46 => {
            long_header_or(data, MapType::SOF, MapType::QUAKE3)
        }
        MapType::SIN | MapType::RAVEN => long_header_or(data, MapType::SIN, MapType::RAVEN),
        MapType::SOURCE20 => {
            if vindictus_game_lump(data) {
                MapType::VINDICTUS
            } else {
                MapType::SOURCE20
            }
        }
        MapType::SOURCE21 => match peek_i32(data, 8) {
            Some(offset) if (offset as i64) < SOURCE_HEADER_SIZE as i64 => MapType::L4D2,
            _ => MapType::SOURCE21,
        },
        tag => tag,
    }
}

/// GoldSrc and Blue Shift swap the entity and plane slots; the entity lump is
/// the one that starts with `{`.
fn goldsrc_or_blue_shift(data: &[u8]) -> MapType {
    if lump_starts_with_brace(data, 0) {
        return MapType::GOLDSRC;
    }
    if lump_starts_with_brace(data, 1) {
        return MapType::BLUE_SHIFT;
    }
    MapType::GOLDSRC
}

fn lump_starts_with_brace(data: &[u8], slot: usize) -> bool {
    let row = 4 + slot * 8;
    let (Some(offset), Some(length)) = (peek_i32(data, row), peek_i32(data, row + 4)) else {
        return false;
    };
    if length <= 0 {
        return false;
    }
    usize::try_from(offset)
        .ok()
        .and_then(|offset| data.get(offset))
        .is_some_and(|byte| *byte == b'{')
}

/// Picks `long` when the first lump starts right after the longer header.
fn long_header_or(data: &[u8], long: MapType, short: MapType) -> MapType {
    let Some(header) = header_layout(long) else {
        return short;
    };
    match peek_i32(data, header.row_offset(0)) {
        Some(offset) if usize::try_from(offset).ok() == Some(header.size()) => long,
        _ => short,
    }
}

/// Vindictus widens game lump rows to 20 bytes, which puts the version where
/// the stock layout keeps the offset. A version is far smaller than any valid
/// offset past the header.
fn vindictus_game_lump(data: &[u8]) -> bool {
    let Some(header) = header_layout(MapType::SOURCE20) else {
        return false;
    };
    let Some(slot) = lump_index(LumpKind::GameLump, MapType::SOURCE20) else {
        return false;
    };
    let row = header.row_offset(slot);
    let (Some(offset), Some(length)) = (peek_i32(data, row), peek_i32(data, row + 4)) else {
        return false;
    };
    if length < 4 {
        return false;
    }
    let Ok(offset) = usize::try_from(offset) else {
        return false;
    };
    match peek_i32(data, offset) {
        Some(count) if count > 0 => {}
        _ => return false,
    }
    match offset.checked_add(4 + 8).and_then(|at| peek_i32(data, at)) {
        Some(field) => (field as i64) < SOURCE_HEADER_SIZE as i64,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident_header(magic: &[u8; 4], version: i32, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[0..4].copy_from_slice(magic);
        data[4..8].copy_from_slice(&version.to_le_bytes());
        data
    }

    #[test]
    fn short_buffers_are_undefined() {
        assert_eq!(detect(&[]), MapType::UNDEFINED);
        assert_eq!(detect(b"IBS"), MapType::UNDEFINED);
        // Magic present but the version is cut off.
        assert_eq!(detect(b"IBSP"), MapType::UNDEFINED);
        assert_eq!(detect(&29i32.to_le_bytes()), MapType::QUAKE);
    }

    #[test]
    fn ascii_magic_table() {
        let cases: [(&[u8; 4], i32, MapType); 9] = [
            (b"IBSP", 38, MapType::QUAKE2),
            (b"IBSP", 41, MapType::DAIKATANA),
            (b"IBSP", 47, MapType::QUAKE3),
            (b"IBSP", 59, MapType::COD),
            (b"IBSP", 4, MapType::COD2),
            (b"FAKK", 19, MapType::STEF2_DEMO),
            (b"2015", 18, MapType::MOHAA),
            (b"EALA", 21, MapType::MOHAA_BT),
            (b"VBSP", 0x0004_0014, MapType::DMOMAM),
        ];
        for (magic, version, tag) in cases {
            assert_eq!(detect(&ident_header(magic, version, 16)), tag);
        }
        assert_eq!(detect(&ident_header(b"IBSP", 45, 16)), MapType::UNDEFINED);
    }

    #[test]
    fn header_width_separates_sof_from_quake3() {
        let mut data = ident_header(b"IBSP", 46, 200);
        data[8..12].copy_from_slice(&168i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::SOF);
        data[8..12].copy_from_slice(&144i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::QUAKE3);
        // Too short to hold the first row at all.
        assert_eq!(detect(&ident_header(b"IBSP", 46, 8)), MapType::QUAKE3);
    }

    #[test]
    fn header_width_separates_sin_from_raven() {
        let mut data = ident_header(b"RBSP", 1, 200);
        data[8..12].copy_from_slice(&184i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::SIN);
        data[8..12].copy_from_slice(&152i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::RAVEN);
    }

    #[test]
    fn blue_shift_has_entities_in_slot_one() {
        let mut data = vec![0u8; 140];
        data[0..4].copy_from_slice(&30i32.to_le_bytes());
        // slot 1 -> bytes 124..128 hold "{\n}\n"
        data[12..16].copy_from_slice(&124i32.to_le_bytes());
        data[16..20].copy_from_slice(&4i32.to_le_bytes());
        data[124..128].copy_from_slice(b"{\n}\n");
        assert_eq!(detect(&data), MapType::BLUE_SHIFT);

        data[4..8].copy_from_slice(&124i32.to_le_bytes());
        data[8..12].copy_from_slice(&4i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::GOLDSRC);

        // Offsets pointing past the end fall back to GoldSrc.
        let mut bogus = vec![0u8; 32];
        bogus[0..4].copy_from_slice(&30i32.to_le_bytes());
        bogus[12..16].copy_from_slice(&9999i32.to_le_bytes());
        bogus[16..20].copy_from_slice(&4i32.to_le_bytes());
        assert_eq!(detect(&bogus), MapType::GOLDSRC);
    }

    #[test]
    fn l4d2_rows_start_with_version() {
        let mut data = ident_header(b"VBSP", 21, 1100);
        data[8..12].copy_from_slice(&0i32.to_le_bytes());
        data[12..16].copy_from_slice(&1036i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::L4D2);
        data[8..12].copy_from_slice(&1036i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::SOURCE21);
    }

    #[test]
    fn vindictus_game_lump_probe() {
        let mut data = ident_header(b"VBSP", 20, 1200);
        let row = 8 + 35 * 16;
        data[row..row + 4].copy_from_slice(&1036i32.to_le_bytes());
        data[row + 4..row + 8].copy_from_slice(&24i32.to_le_bytes());
        data[1036..1040].copy_from_slice(&1i32.to_le_bytes());
        // Wide row: id, flags, version (6), offset, length
        data[1040..1044].copy_from_slice(b"prps");
        data[1048..1052].copy_from_slice(&6i32.to_le_bytes());
        data[1052..1056].copy_from_slice(&1060i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::VINDICTUS);

        // Stock rows put the offset there instead.
        data[1048..1052].copy_from_slice(&1060i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::SOURCE20);

        // Game lump offset past the end.
        data[row..row + 4].copy_from_slice(&9000i32.to_le_bytes());
        assert_eq!(detect(&data), MapType::SOURCE20);
    }

    #[test]
    fn encrypted_source_recovers_key() {
        let mut plain = ident_header(b"VBSP", 22, 1036);
        plain[1000] = 7;
        let key: Key = std::array::from_fn(|i| (i as u8).wrapping_mul(37).wrapping_add(11));
        let encrypted = cipher::xor(&plain, &key, 0);
        let (tag, recovered) = detect_with_key(&encrypted);
        assert_eq!(tag, MapType::TACTICAL_INTERVENTION);
        assert_eq!(recovered, Some(key));

        let noise = vec![0x5Au8; 500];
        assert_eq!(detect_with_key(&noise), (MapType::UNDEFINED, None));
    }
}
