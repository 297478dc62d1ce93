use crate::bytes::{i32_from_len, read_i32_le, read_u32_le, write_i32, write_u32};
use crate::error::{read_count, BspError, BspResult, Truncation};
use crate::layout::{lookup, LumpKind, TextureLayout, TEXTURE_LAYOUTS};
use crate::lump::{require_len, LumpContext, LumpObject};
use crate::name::Name;

const MIPTEX_HEADER: usize = 40;

/// Embedded Quake/GoldSrc texture: size, mip level offsets relative to the
/// miptex start, and everything after the header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MipTexture {
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; 4],
    /// Pixel data (and the GoldSrc palette), empty for textures kept in a WAD.
    pub pixels: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Texture {
    pub name: Name,
    pub flags: i32,
    pub contents: i32,
    pub subdivisions: i32,
    pub fence_mask: Name,
    /// Miptex payload. `None` marks an unused slot (offset -1 on disk).
    pub mip: Option<MipTexture>,
}

impl Texture {
    pub fn named(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Byte offset of each name inside an encoded Source string lump, for the
    /// string table lump that indexes it.
    pub fn string_table(textures: &[Texture]) -> Vec<i32> {
        let mut offsets = Vec::with_capacity(textures.len());
        let mut at = 0usize;
        for texture in textures {
            offsets.push(i32_from_len(at));
            at += texture.name.len() + 1;
        }
        offsets
    }

    fn decode_miptex(bytes: &[u8]) -> BspResult<Self> {
        require_len(Self::NAME, bytes, MIPTEX_HEADER)?;
        let mut offsets = [0u32; 4];
        for (i, offset) in offsets.iter_mut().enumerate() {
            let at = 24 + i * 4;
            *offset = read_u32_le(&bytes[at..at + 4]);
        }
        Ok(Texture {
            name: Name::from_field(&bytes[0..16]),
            mip: Some(MipTexture {
                width: read_u32_le(&bytes[16..20]),
                height: read_u32_le(&bytes[20..24]),
                offsets,
                pixels: bytes[MIPTEX_HEADER..].to_vec(),
            }),
            ..Texture::default()
        })
    }

    fn encode_miptex(&self, out: &mut Vec<u8>) {
        let Some(mip) = &self.mip else {
            return;
        };
        self.name.write_field(out, 16);
        write_u32(out, mip.width);
        write_u32(out, mip.height);
        for offset in mip.offsets {
            write_u32(out, offset);
        }
        out.extend_from_slice(&mip.pixels);
    }
}

fn decode_miptex_lump(bytes: &[u8]) -> BspResult<Vec<Texture>> {
    require_len(Texture::NAME, bytes, 4)?;
    let count = read_count(Texture::NAME, read_i32_le(&bytes[0..4]))?;
    let table_end = count
        .checked_mul(4)
        .and_then(|len| len.checked_add(4))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            BspError::truncated(
                Texture::NAME,
                Truncation::ShortRecord {
                    expected: count.saturating_mul(4).saturating_add(4),
                    actual: bytes.len(),
                },
            )
        })?;

    let offsets: Vec<i32> = bytes[4..table_end]
        .chunks_exact(4)
        .map(read_i32_le)
        .collect();

    // Each miptex runs until the next one starts, or to the end of the lump.
    let mut starts: Vec<usize> = offsets
        .iter()
        .filter_map(|offset| usize::try_from(*offset).ok())
        .collect();
    starts.sort_unstable();
    starts.dedup();

    let mut textures = Vec::with_capacity(count);
    for offset in offsets {
        let Ok(start) = usize::try_from(offset) else {
            textures.push(Texture::default());
            continue;
        };
        let end = starts
            .iter()
            .copied()
            .find(|next| *next > start)
            .unwrap_or(bytes.len());
        if start >= bytes.len() || end > bytes.len() {
            return Err(BspError::truncated(
                Texture::NAME,
                Truncation::OutOfBounds {
                    offset: start,
                    length: end.saturating_sub(start),
                    available: bytes.len(),
                },
            ));
        }
        textures.push(Texture::decode_miptex(&bytes[start..end])?);
    }
    Ok(textures)
}

// An empty list stays an empty lump; a bare zero count is not reproduced.
fn encode_miptex_lump(textures: &[Texture], out: &mut Vec<u8>) {
    if textures.is_empty() {
        return;
    }
    let base = out.len();
    write_i32(out, i32_from_len(textures.len()));
    let table = out.len();
    out.resize(table + textures.len() * 4, 0);
    for (i, texture) in textures.iter().enumerate() {
        let offset = if texture.mip.is_some() {
            i32_from_len(out.len() - base)
        } else {
            -1
        };
        out[table + i * 4..table + i * 4 + 4].copy_from_slice(&offset.to_le_bytes());
        texture.encode_miptex(out);
    }
}

fn decode_string_lump(bytes: &[u8]) -> BspResult<Vec<Texture>> {
    let mut textures = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        let Some(len) = bytes[start..].iter().position(|&b| b == 0) else {
            return Err(BspError::truncated(
                Texture::NAME,
                Truncation::UnterminatedString { offset: start },
            ));
        };
        textures.push(Texture::named(Name::from_bytes(&bytes[start..start + len])));
        start += len + 1;
    }
    Ok(textures)
}

impl LumpObject for Texture {
    const NAME: &'static str = "textures";
    const KIND: Option<LumpKind> = Some(LumpKind::Textures);
    type Layout = TextureLayout;

    fn layout(ctx: LumpContext) -> Option<TextureLayout> {
        lookup(TEXTURE_LAYOUTS, ctx.map_type)
    }

    fn struct_length(layout: TextureLayout) -> Option<usize> {
        match layout {
            TextureLayout::QuakeMiptex | TextureLayout::SourceStrings => None,
            TextureLayout::Nightfire => Some(64),
            TextureLayout::Quake3 => Some(72),
            TextureLayout::Fakk => Some(76),
            TextureLayout::Mohaa => Some(140),
        }
    }

    fn decode(bytes: &[u8], layout: TextureLayout) -> BspResult<Self> {
        match layout {
            TextureLayout::QuakeMiptex => Texture::decode_miptex(bytes),
            TextureLayout::SourceStrings => {
                let mut names = decode_string_lump(bytes)?;
                Ok(names.pop().unwrap_or_default())
            }
            TextureLayout::Nightfire => {
                require_len(Self::NAME, bytes, 64)?;
                Ok(Texture::named(Name::from_field(&bytes[0..64])))
            }
            TextureLayout::Quake3 | TextureLayout::Fakk | TextureLayout::Mohaa => {
                let expected = Self::struct_length(layout).unwrap_or(0);
                require_len(Self::NAME, bytes, expected)?;
                let mut texture = Texture::named(Name::from_field(&bytes[0..64]));
                texture.flags = read_i32_le(&bytes[64..68]);
                texture.contents = read_i32_le(&bytes[68..72]);
                if layout != TextureLayout::Quake3 {
                    texture.subdivisions = read_i32_le(&bytes[72..76]);
                }
                if layout == TextureLayout::Mohaa {
                    texture.fence_mask = Name::from_field(&bytes[76..140]);
                }
                Ok(texture)
            }
        }
    }

    fn encode(&self, layout: TextureLayout, out: &mut Vec<u8>) {
        match layout {
            TextureLayout::QuakeMiptex => self.encode_miptex(out),
            TextureLayout::SourceStrings => {
                out.extend_from_slice(self.name.as_bytes());
                out.push(0);
            }
            TextureLayout::Nightfire => self.name.write_field(out, 64),
            TextureLayout::Quake3 | TextureLayout::Fakk | TextureLayout::Mohaa => {
                self.name.write_field(out, 64);
                write_i32(out, self.flags);
                write_i32(out, self.contents);
                if layout != TextureLayout::Quake3 {
                    write_i32(out, self.subdivisions);
                }
                if layout == TextureLayout::Mohaa {
                    self.fence_mask.write_field(out, 64);
                }
            }
        }
    }

    fn decode_lump(bytes: &[u8], layout: TextureLayout) -> BspResult<Vec<Self>> {
        match layout {
            TextureLayout::QuakeMiptex => decode_miptex_lump(bytes),
            TextureLayout::SourceStrings => decode_string_lump(bytes),
            _ => {
                let stride = Self::struct_length(layout).unwrap_or(1);
                if bytes.len() % stride != 0 {
                    return Err(BspError::truncated(
                        Self::NAME,
                        Truncation::PartialRecord {
                            length: bytes.len(),
                            stride,
                        },
                    ));
                }
                bytes
                    .chunks_exact(stride)
                    .map(|chunk| Self::decode(chunk, layout))
                    .collect()
            }
        }
    }

    fn encode_lump(items: &[Self], layout: TextureLayout, out: &mut Vec<u8>) {
        match layout {
            TextureLayout::QuakeMiptex => encode_miptex_lump(items, out),
            _ => {
                for item in items {
                    item.encode(layout, out);
                }
            }
        }
    }

    fn record_count(bytes: &[u8], layout: TextureLayout) -> usize {
        match layout {
            TextureLayout::QuakeMiptex if bytes.len() >= 4 => {
                usize::try_from(read_i32_le(&bytes[0..4])).unwrap_or(0)
            }
            TextureLayout::SourceStrings => bytes.iter().filter(|&&b| b == 0).count(),
            _ => Self::struct_length(layout)
                .map(|stride| bytes.len() / stride)
                .unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lump::{Lump, LumpInfo};
    use crate::map_type::MapType;

    fn miptex(name: &str, width: u32, height: u32, pixels: usize) -> Texture {
        let mut texture = Texture::named(name);
        let size = width * height;
        texture.mip = Some(MipTexture {
            width,
            height,
            offsets: [40, 40 + size, 40 + size + size / 4, 40 + size + size / 4 + size / 16],
            pixels: (0..pixels).map(|i| (i % 251) as u8).collect(),
        });
        texture
    }

    #[test]
    fn miptex_lump_round_trips_with_missing_slot() {
        let textures = vec![
            miptex("+0button", 16, 16, 340),
            Texture::default(),
            miptex("sky1", 8, 8, 85),
        ];
        let ctx = LumpContext::from(MapType::QUAKE);
        let bytes = Lump::from_vec(textures.clone()).emit(ctx).expect("emit");
        assert_eq!(read_i32_le(&bytes[0..4]), 3);
        assert_eq!(read_i32_le(&bytes[8..12]), -1);

        let decoded = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(decoded.items(), textures.as_slice());
        assert_eq!(decoded.emit(ctx).expect("emit"), bytes);
        assert_eq!(decoded.serialized_length(ctx).expect("len"), bytes.len());
    }

    #[test]
    fn miptex_offset_past_end_is_truncated() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&400i32.to_le_bytes());
        let err = Lump::<Texture>::decode(&bytes, MapType::GOLDSRC.into(), LumpInfo::default())
            .expect_err("out of bounds");
        assert!(matches!(err, BspError::TruncatedLump { .. }));
    }

    #[test]
    fn source_strings_have_no_padding() {
        let bytes = b"TOOLS/TOOLSNODRAW\0BRICK/WALL01\0".to_vec();
        let ctx = LumpContext::from(MapType::SOURCE19);
        let lump = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(lump.len(), 2);
        assert_eq!(lump[1].name, "BRICK/WALL01");
        assert_eq!(Texture::string_table(lump.items()), vec![0, 18]);
        assert_eq!(lump.emit(ctx).expect("emit"), bytes);
    }

    #[test]
    fn unterminated_source_string_is_truncated() {
        let bytes = b"TOOLS/TOOLSNODRAW\0BRICK".to_vec();
        let err = Lump::<Texture>::decode(&bytes, MapType::SOURCE20.into(), LumpInfo::default())
            .expect_err("no terminator");
        assert!(matches!(
            err,
            BspError::TruncatedLump {
                detail: Truncation::UnterminatedString { offset: 18 },
                ..
            }
        ));
    }

    #[test]
    fn fixed_width_layouts_round_trip() {
        let mut texture = Texture::named("textures/base_wall/concrete");
        texture.flags = 0x4;
        texture.contents = 1;
        texture.subdivisions = 16;
        texture.fence_mask = Name::from("textures/masks/fence");
        let cases = [
            (MapType::QUAKE3, 72),
            (MapType::COD2, 72),
            (MapType::ALICE, 76),
            (MapType::MOHAA_BT, 140),
        ];
        for (tag, size) in cases {
            let ctx = LumpContext::from(tag);
            let bytes = Lump::from_vec(vec![texture.clone()]).emit(ctx).expect("emit");
            assert_eq!(bytes.len(), size, "{}", tag);
            let decoded = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
            assert_eq!(decoded[0].name, texture.name);
            assert_eq!(decoded.emit(ctx).expect("emit"), bytes);
        }
    }

    fn q3_record(name: &[u8]) -> Vec<u8> {
        let mut record = name.to_vec();
        record.resize(64, 0);
        record.extend_from_slice(&7i32.to_le_bytes());
        record.extend_from_slice(&1i32.to_le_bytes());
        record
    }

    #[test]
    fn fixed_width_names_keep_their_bytes() {
        let mut bytes = q3_record(b"caf\xE9");
        bytes.extend(q3_record(b"wall\0xyz"));
        bytes.extend(q3_record(&[b'a'; 64]));
        let ctx = LumpContext::from(MapType::QUAKE3);
        let lump = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(lump[1].name, "wall");
        assert_eq!(lump[2].name.len(), 64);
        assert_eq!(lump.emit(ctx).expect("emit"), bytes);
    }

    #[test]
    fn string_offsets_survive_non_utf8_names() {
        let bytes = b"caf\xE9\0BRICK\0".to_vec();
        let ctx = LumpContext::from(MapType::SOURCE20);
        let lump = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(Texture::string_table(lump.items()), vec![0, 5]);
        assert_eq!(lump.emit(ctx).expect("emit"), bytes);
    }

    #[test]
    fn empty_names_and_lumps() {
        let ctx = LumpContext::from(MapType::SOURCE20);
        let bytes = b"\0\0".to_vec();
        let lump = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(lump.len(), 2);
        assert!(lump[0].name.is_empty());
        assert_eq!(lump.emit(ctx).expect("emit"), bytes);

        for tag in [MapType::QUAKE, MapType::SOURCE20, MapType::QUAKE3, MapType::MOHAA] {
            let ctx = LumpContext::from(tag);
            let lump = Lump::<Texture>::decode(&[], ctx, LumpInfo::default()).expect("decode");
            assert!(lump.is_empty(), "{}", tag);
            assert!(lump.emit(ctx).expect("emit").is_empty(), "{}", tag);
        }
    }

    #[test]
    fn miptex_name_may_fill_its_field() {
        let textures = vec![miptex("0123456789abcdef", 8, 8, 85)];
        let ctx = LumpContext::from(MapType::GOLDSRC);
        let bytes = Lump::from_vec(textures.clone()).emit(ctx).expect("emit");
        let decoded = Lump::<Texture>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(decoded.items(), textures.as_slice());
        assert_eq!(decoded.emit(ctx).expect("emit"), bytes);
    }

    #[test]
    fn negative_miptex_count() {
        let bytes = (-1i32).to_le_bytes();
        let err = Lump::<Texture>::decode(&bytes, MapType::QUAKE.into(), LumpInfo::default())
            .expect_err("negative");
        assert!(matches!(
            err,
            BspError::TruncatedLump {
                detail: Truncation::NegativeCount { value: -1 },
                ..
            }
        ));
    }
}
