//! Per-variant layout dispatch.
//!
//! Every table is a list of `(family, value)` pairs scanned in order; the first
//! family the tag descends from wins, so specific variants are listed before
//! their ancestors. A missing entry means the combination is unsupported.
//!
//! Record layouts are chosen by tag alone. No plane, vertex, texture info,
//! texture or visibility record changes size with the directory row's
//! version; that field only selects static prop strides and is otherwise
//! written back unchanged.

use crate::map_type::MapType;

/// First value whose family `tag` belongs to.
pub fn lookup<T: Copy>(table: &[(MapType, T)], tag: MapType) -> Option<T> {
    table
        .iter()
        .find(|(family, _)| tag.is_subtype_of(*family))
        .map(|(_, value)| *value)
}

/// Field order of one lump directory row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowFormat {
    /// `offset, length`
    OffsetLength,
    /// `length, offset` (Call of Duty)
    LengthOffset,
    /// `offset, length, version, fourCC`
    Source,
    /// `version, offset, length, fourCC` (Left 4 Dead 2)
    L4d2,
}

impl RowFormat {
    pub const fn width(self) -> usize {
        match self {
            RowFormat::OffsetLength | RowFormat::LengthOffset => 8,
            RowFormat::Source | RowFormat::L4d2 => 16,
        }
    }

    /// Byte offset of the `offset` field inside a row.
    pub const fn offset_field(self) -> usize {
        match self {
            RowFormat::OffsetLength | RowFormat::Source => 0,
            RowFormat::LengthOffset => 4,
            RowFormat::L4d2 => 4,
        }
    }

    pub const fn length_field(self) -> usize {
        match self {
            RowFormat::OffsetLength | RowFormat::Source => 4,
            RowFormat::LengthOffset => 0,
            RowFormat::L4d2 => 8,
        }
    }

    /// `(version, fourCC)` field offsets for rows that carry them.
    pub const fn version_fields(self) -> Option<(usize, usize)> {
        match self {
            RowFormat::OffsetLength | RowFormat::LengthOffset => None,
            RowFormat::Source => Some((8, 12)),
            RowFormat::L4d2 => Some((0, 12)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderLayout {
    /// Bytes before the directory (magic, version, checksums).
    pub prefix: usize,
    pub lump_count: usize,
    pub row: RowFormat,
    /// Bytes after the directory (Source map revision).
    pub suffix: usize,
}

impl HeaderLayout {
    const fn new(prefix: usize, lump_count: usize, row: RowFormat, suffix: usize) -> Self {
        Self {
            prefix,
            lump_count,
            row,
            suffix,
        }
    }

    pub const fn size(&self) -> usize {
        self.prefix + self.lump_count * self.row.width() + self.suffix
    }

    pub const fn row_offset(&self, slot: usize) -> usize {
        self.prefix + slot * self.row.width()
    }
}

pub const SOURCE_HEADER_SIZE: usize = 1036;

const HEADERS: &[(MapType, HeaderLayout)] = &[
    (MapType::NIGHTFIRE, HeaderLayout::new(4, 18, RowFormat::OffsetLength, 0)),
    (MapType::QUAKE, HeaderLayout::new(4, 15, RowFormat::OffsetLength, 0)),
    (MapType::DAIKATANA, HeaderLayout::new(8, 21, RowFormat::OffsetLength, 0)),
    (MapType::SOF, HeaderLayout::new(8, 20, RowFormat::OffsetLength, 0)),
    (MapType::SIN, HeaderLayout::new(8, 22, RowFormat::OffsetLength, 0)),
    (MapType::QUAKE2, HeaderLayout::new(8, 19, RowFormat::OffsetLength, 0)),
    (MapType::RAVEN, HeaderLayout::new(8, 18, RowFormat::OffsetLength, 0)),
    (MapType::STEF2, HeaderLayout::new(12, 30, RowFormat::OffsetLength, 0)),
    (MapType::MOHAA, HeaderLayout::new(12, 28, RowFormat::OffsetLength, 0)),
    (MapType::FAKK2, HeaderLayout::new(12, 20, RowFormat::OffsetLength, 0)),
    (MapType::COD2, HeaderLayout::new(8, 39, RowFormat::LengthOffset, 0)),
    (MapType::COD, HeaderLayout::new(8, 33, RowFormat::LengthOffset, 0)),
    (MapType::QUAKE3, HeaderLayout::new(8, 17, RowFormat::OffsetLength, 0)),
    (MapType::TITANFALL, HeaderLayout::new(16, 128, RowFormat::Source, 0)),
    (MapType::L4D2, HeaderLayout::new(8, 64, RowFormat::L4d2, 4)),
    (MapType::SOURCE, HeaderLayout::new(8, 64, RowFormat::Source, 4)),
];

pub fn header_layout(tag: MapType) -> Option<HeaderLayout> {
    lookup(HEADERS, tag)
}

/// How a variant identifies itself in the first eight bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// `None` for the id Software formats that start with a bare version.
    pub ident: Option<[u8; 4]>,
    pub version: i32,
}

impl Signature {
    const fn numeric(version: i32) -> Self {
        Self {
            ident: None,
            version,
        }
    }

    const fn ident(ident: &[u8; 4], version: i32) -> Self {
        Self {
            ident: Some(*ident),
            version,
        }
    }
}

/// Exact-tag signatures. The first row for a tag is the one written by new
/// containers; later rows are alternate versions accepted on read.
pub const SIGNATURES: &[(MapType, Signature)] = &[
    (MapType::QUAKE, Signature::numeric(29)),
    (MapType::GOLDSRC, Signature::numeric(30)),
    (MapType::BLUE_SHIFT, Signature::numeric(30)),
    (MapType::NIGHTFIRE, Signature::numeric(42)),
    (MapType::QUAKE2, Signature::ident(b"IBSP", 38)),
    (MapType::DAIKATANA, Signature::ident(b"IBSP", 41)),
    (MapType::SOF, Signature::ident(b"IBSP", 46)),
    (MapType::SIN, Signature::ident(b"RBSP", 1)),
    (MapType::QUAKE3, Signature::ident(b"IBSP", 46)),
    (MapType::QUAKE3, Signature::ident(b"IBSP", 47)),
    (MapType::RAVEN, Signature::ident(b"RBSP", 1)),
    (MapType::FAKK2, Signature::ident(b"FAKK", 12)),
    (MapType::ALICE, Signature::ident(b"FAKK", 42)),
    (MapType::STEF2, Signature::ident(b"EF2!", 20)),
    (MapType::STEF2_DEMO, Signature::ident(b"FAKK", 19)),
    (MapType::MOHAA, Signature::ident(b"2015", 19)),
    (MapType::MOHAA, Signature::ident(b"2015", 18)),
    (MapType::MOHAA_BT, Signature::ident(b"EALA", 21)),
    (MapType::COD, Signature::ident(b"IBSP", 59)),
    (MapType::COD2, Signature::ident(b"IBSP", 4)),
    (MapType::SOURCE17, Signature::ident(b"VBSP", 17)),
    (MapType::SOURCE18, Signature::ident(b"VBSP", 18)),
    (MapType::SOURCE19, Signature::ident(b"VBSP", 19)),
    (MapType::SOURCE20, Signature::ident(b"VBSP", 20)),
    (MapType::SOURCE21, Signature::ident(b"VBSP", 21)),
    (MapType::SOURCE22, Signature::ident(b"VBSP", 22)),
    (MapType::SOURCE23, Signature::ident(b"VBSP", 23)),
    (MapType::SOURCE27, Signature::ident(b"VBSP", 27)),
    (MapType::VINDICTUS, Signature::ident(b"VBSP", 20)),
    (MapType::DMOMAM, Signature::ident(b"VBSP", 0x0004_0014)),
    (MapType::L4D2, Signature::ident(b"VBSP", 21)),
    (MapType::TACTICAL_INTERVENTION, Signature::ident(b"VBSP", 22)),
    (MapType::TITANFALL, Signature::ident(b"rBSP", 29)),
];

pub fn signature(tag: MapType) -> Option<Signature> {
    SIGNATURES
        .iter()
        .find(|(candidate, _)| *candidate == tag)
        .map(|(_, signature)| *signature)
}

/// Logical lumps the codec layer knows how to type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LumpKind {
    Entities,
    Planes,
    Textures,
    Vertices,
    Visibility,
    TextureInfo,
    GameLump,
}

impl LumpKind {
    pub const ALL: [LumpKind; 7] = [
        LumpKind::Entities,
        LumpKind::Planes,
        LumpKind::Textures,
        LumpKind::Vertices,
        LumpKind::Visibility,
        LumpKind::TextureInfo,
        LumpKind::GameLump,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LumpKind::Entities => "entities",
            LumpKind::Planes => "planes",
            LumpKind::Textures => "textures",
            LumpKind::Vertices => "vertices",
            LumpKind::Visibility => "visibility",
            LumpKind::TextureInfo => "texture_info",
            LumpKind::GameLump => "game_lump",
        }
    }
}

type SlotTable = &'static [(MapType, Option<usize>)];

const ENTITIES: SlotTable = &[
    (MapType::BLUE_SHIFT, Some(1)),
    (MapType::QUAKE, Some(0)),
    (MapType::QUAKE2, Some(0)),
    (MapType::MOHAA, Some(15)),
    (MapType::FAKK2, Some(14)),
    (MapType::COD2, Some(37)),
    (MapType::COD, Some(29)),
    (MapType::QUAKE3, Some(0)),
    (MapType::SOURCE, Some(0)),
];

const PLANES: SlotTable = &[
    (MapType::BLUE_SHIFT, Some(0)),
    (MapType::QUAKE, Some(1)),
    (MapType::QUAKE2, Some(1)),
    (MapType::FAKK2, Some(1)),
    (MapType::COD2, Some(4)),
    (MapType::COD, Some(2)),
    (MapType::QUAKE3, Some(2)),
    (MapType::SOURCE, Some(1)),
];

const TEXTURES: SlotTable = &[
    (MapType::QUAKE, Some(2)),
    (MapType::QUAKE2, None),
    (MapType::FAKK2, Some(0)),
    (MapType::COD, Some(0)),
    (MapType::QUAKE3, Some(1)),
    (MapType::SOURCE, Some(43)),
];

const VERTICES: SlotTable = &[
    (MapType::NIGHTFIRE, Some(5)),
    (MapType::QUAKE, Some(3)),
    (MapType::QUAKE2, Some(2)),
    (MapType::FAKK2, Some(4)),
    (MapType::COD, Some(7)),
    (MapType::QUAKE3, Some(10)),
    (MapType::SOURCE, Some(3)),
];

const VISIBILITY: SlotTable = &[
    (MapType::NIGHTFIRE, Some(7)),
    (MapType::QUAKE, Some(4)),
    (MapType::QUAKE2, Some(3)),
    (MapType::MOHAA, Some(16)),
    (MapType::FAKK2, Some(15)),
    (MapType::COD2, None),
    (MapType::COD, Some(26)),
    (MapType::QUAKE3, Some(16)),
    (MapType::TITANFALL, None),
    (MapType::SOURCE, Some(4)),
];

const TEXTURE_INFO: SlotTable = &[
    (MapType::NIGHTFIRE, Some(17)),
    (MapType::QUAKE, Some(6)),
    (MapType::QUAKE2, Some(5)),
    (MapType::TITANFALL, None),
    (MapType::SOURCE, Some(6)),
];

const GAME_LUMP: SlotTable = &[(MapType::SOURCE, Some(35))];

/// Directory slot holding `kind` in files of type `tag`.
pub fn lump_index(kind: LumpKind, tag: MapType) -> Option<usize> {
    let table = match kind {
        LumpKind::Entities => ENTITIES,
        LumpKind::Planes => PLANES,
        LumpKind::Textures => TEXTURES,
        LumpKind::Vertices => VERTICES,
        LumpKind::Visibility => VISIBILITY,
        LumpKind::TextureInfo => TEXTURE_INFO,
        LumpKind::GameLump => GAME_LUMP,
    };
    lookup(table, tag).flatten()
}

/// Reverse of [`lump_index`], used for log output and the CLI.
pub fn lump_kind_at(slot: usize, tag: MapType) -> Option<LumpKind> {
    LumpKind::ALL
        .into_iter()
        .find(|kind| lump_index(*kind, tag) == Some(slot))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneLayout {
    /// normal, distance, axis type (20 bytes)
    Quake,
    /// normal, distance; the type is derived (16 bytes)
    Quake3,
}

pub const PLANES_LAYOUTS: &[(MapType, PlaneLayout)] = &[
    (MapType::QUAKE, PlaneLayout::Quake),
    (MapType::QUAKE2, PlaneLayout::Quake),
    (MapType::QUAKE3, PlaneLayout::Quake3),
    (MapType::TITANFALL, PlaneLayout::Quake3),
    (MapType::SOURCE, PlaneLayout::Quake),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexLayout {
    Position,
    Quake3,
    Raven,
    Cod,
    Cod2,
}

pub const VERTEX_LAYOUTS: &[(MapType, VertexLayout)] = &[
    (MapType::QUAKE, VertexLayout::Position),
    (MapType::QUAKE2, VertexLayout::Position),
    (MapType::RAVEN, VertexLayout::Raven),
    (MapType::COD2, VertexLayout::Cod2),
    (MapType::COD, VertexLayout::Cod),
    (MapType::QUAKE3, VertexLayout::Quake3),
    (MapType::SOURCE, VertexLayout::Position),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureInfoLayout {
    Quake,
    Nightfire,
    Quake2,
    Sin,
    Source,
}

pub const TEXTURE_INFO_LAYOUTS: &[(MapType, TextureInfoLayout)] = &[
    (MapType::NIGHTFIRE, TextureInfoLayout::Nightfire),
    (MapType::QUAKE, TextureInfoLayout::Quake),
    (MapType::SIN, TextureInfoLayout::Sin),
    (MapType::QUAKE2, TextureInfoLayout::Quake2),
    (MapType::SOURCE, TextureInfoLayout::Source),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureLayout {
    QuakeMiptex,
    Nightfire,
    Quake3,
    Fakk,
    Mohaa,
    SourceStrings,
}

pub const TEXTURE_LAYOUTS: &[(MapType, TextureLayout)] = &[
    (MapType::NIGHTFIRE, TextureLayout::Nightfire),
    (MapType::QUAKE, TextureLayout::QuakeMiptex),
    (MapType::MOHAA, TextureLayout::Mohaa),
    (MapType::FAKK2, TextureLayout::Fakk),
    (MapType::QUAKE3, TextureLayout::Quake3),
    (MapType::SOURCE, TextureLayout::SourceStrings),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityLayout {
    /// The whole lump is compressed PVS data.
    Raw,
    /// Cluster count, PVS/PAS offset pairs, compressed data.
    Clusters,
    /// Cluster count, bytes per cluster, uncompressed rows.
    Quake3,
}

pub const VISIBILITY_LAYOUTS: &[(MapType, VisibilityLayout)] = &[
    (MapType::QUAKE, VisibilityLayout::Raw),
    (MapType::QUAKE2, VisibilityLayout::Clusters),
    (MapType::QUAKE3, VisibilityLayout::Quake3),
    (MapType::SOURCE, VisibilityLayout::Clusters),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameLumpRowLayout {
    /// id, flags u16, version u16, offset, length
    Standard,
    /// id, flags i32, version i32, offset, length
    Wide,
}

impl GameLumpRowLayout {
    pub const fn width(self) -> usize {
        match self {
            GameLumpRowLayout::Standard => 16,
            GameLumpRowLayout::Wide => 20,
        }
    }
}

pub const GAME_LUMP_LAYOUTS: &[(MapType, GameLumpRowLayout)] = &[
    (MapType::VINDICTUS, GameLumpRowLayout::Wide),
    (MapType::SOURCE, GameLumpRowLayout::Standard),
];

/// Variants whose static prop records differ from stock Source and are
/// therefore sized by inference.
const STATIC_PROP_INFERRED: &[MapType] = &[
    MapType::VINDICTUS,
    MapType::DMOMAM,
    MapType::L4D2,
    MapType::TACTICAL_INTERVENTION,
    MapType::TITANFALL,
];

const STATIC_PROP_STRIDES: &[(i32, usize)] = &[
    (4, 56),
    (5, 60),
    (6, 64),
    (7, 68),
    (8, 68),
    (9, 72),
    (11, 80),
];

/// Table stride of one static prop record, `None` when it must be inferred.
pub fn static_prop_stride(tag: MapType, version: i32) -> Option<usize> {
    if !tag.is_subtype_of(MapType::SOURCE) || STATIC_PROP_INFERRED.contains(&tag) {
        return None;
    }
    STATIC_PROP_STRIDES
        .iter()
        .find(|(candidate, _)| *candidate == version)
        .map(|(_, stride)| *stride)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes_match_known_formats() {
        let expected = [
            (MapType::QUAKE, 124),
            (MapType::BLUE_SHIFT, 124),
            (MapType::NIGHTFIRE, 148),
            (MapType::QUAKE2, 160),
            (MapType::DAIKATANA, 176),
            (MapType::SOF, 168),
            (MapType::SIN, 184),
            (MapType::QUAKE3, 144),
            (MapType::RAVEN, 152),
            (MapType::FAKK2, 172),
            (MapType::ALICE, 172),
            (MapType::STEF2_DEMO, 252),
            (MapType::MOHAA_BT, 236),
            (MapType::COD, 272),
            (MapType::COD2, 320),
            (MapType::SOURCE20, SOURCE_HEADER_SIZE),
            (MapType::L4D2, SOURCE_HEADER_SIZE),
            (MapType::TITANFALL, 2064),
        ];
        for (tag, size) in expected {
            let layout = header_layout(tag).expect("layout");
            assert_eq!(layout.size(), size, "{}", tag);
        }
        assert_eq!(header_layout(MapType::UNDEFINED), None);
    }

    #[test]
    fn every_concrete_tag_has_header_and_signature() {
        for tag in MapType::CONCRETE {
            assert!(header_layout(tag).is_some(), "{}", tag);
            assert!(signature(tag).is_some(), "{}", tag);
        }
    }

    #[test]
    fn slot_table_specific_entries_win() {
        assert_eq!(lump_index(LumpKind::Entities, MapType::BLUE_SHIFT), Some(1));
        assert_eq!(lump_index(LumpKind::Entities, MapType::GOLDSRC), Some(0));
        assert_eq!(lump_index(LumpKind::Entities, MapType::MOHAA_BT), Some(15));
        assert_eq!(lump_index(LumpKind::Entities, MapType::STEF2), Some(14));
        assert_eq!(lump_index(LumpKind::Planes, MapType::COD2), Some(4));
        assert_eq!(lump_index(LumpKind::Vertices, MapType::NIGHTFIRE), Some(5));
        assert_eq!(lump_index(LumpKind::Visibility, MapType::COD2), None);
        assert_eq!(lump_index(LumpKind::Visibility, MapType::TITANFALL), None);
        assert_eq!(lump_index(LumpKind::Textures, MapType::SOF), None);
        assert_eq!(lump_index(LumpKind::GameLump, MapType::QUAKE3), None);
        assert_eq!(lump_index(LumpKind::GameLump, MapType::L4D2), Some(35));
    }

    #[test]
    fn slots_fit_inside_the_directory() {
        for tag in MapType::CONCRETE {
            let Some(header) = header_layout(tag) else {
                continue;
            };
            for kind in LumpKind::ALL {
                if let Some(slot) = lump_index(kind, tag) {
                    assert!(slot < header.lump_count, "{} {:?}", tag, kind);
                }
            }
        }
    }

    #[test]
    fn record_layouts_follow_families() {
        assert_eq!(lookup(PLANES_LAYOUTS, MapType::TITANFALL), Some(PlaneLayout::Quake3));
        assert_eq!(lookup(PLANES_LAYOUTS, MapType::SOURCE20), Some(PlaneLayout::Quake));
        assert_eq!(lookup(VERTEX_LAYOUTS, MapType::MOHAA), Some(VertexLayout::Quake3));
        assert_eq!(lookup(VERTEX_LAYOUTS, MapType::COD2), Some(VertexLayout::Cod2));
        assert_eq!(
            lookup(TEXTURE_INFO_LAYOUTS, MapType::SIN),
            Some(TextureInfoLayout::Sin)
        );
        assert_eq!(lookup(TEXTURE_LAYOUTS, MapType::ALICE), Some(TextureLayout::Fakk));
        assert_eq!(lookup(TEXTURE_LAYOUTS, MapType::QUAKE2), None);
        assert_eq!(
            lookup(GAME_LUMP_LAYOUTS, MapType::VINDICTUS),
            Some(GameLumpRowLayout::Wide)
        );
    }

    #[test]
    fn static_prop_strides_are_generic_source_only() {
        assert_eq!(static_prop_stride(MapType::SOURCE20, 6), Some(64));
        assert_eq!(static_prop_stride(MapType::SOURCE20, 10), None);
        assert_eq!(static_prop_stride(MapType::VINDICTUS, 6), None);
        assert_eq!(static_prop_stride(MapType::QUAKE3, 6), None);
    }
}
