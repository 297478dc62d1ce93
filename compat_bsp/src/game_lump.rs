//! Source game lump: a nested directory of sub-lumps keyed by a four byte id.
//!
//! Compilers disagree on whether sub-lump offsets count from the start of the
//! file or from the start of the game lump. The choice is made once when the
//! lump is decoded and reused on emit.

use std::sync::OnceLock;

use crate::bytes::{i32_from_len, read_i32_le, read_u16_le, write_i32, write_u16};
use crate::error::{check_range, read_count, BspError, BspResult, Truncation};
use crate::layout::{lookup, GameLumpRowLayout, GAME_LUMP_LAYOUTS};
use crate::lump::{require_len, LumpContext, LumpInfo};
use crate::static_props::StaticProps;

const NAME: &str = "game_lump";

pub const STATIC_PROPS_ID: i32 = i32::from_be_bytes(*b"sprp");
pub const DETAIL_PROPS_ID: i32 = i32::from_be_bytes(*b"dprp");
pub const DETAIL_LIGHTING_ID: i32 = i32::from_be_bytes(*b"dplt");

/// Readable form of a sub-lump id.
pub fn id_name(id: i32) -> String {
    id.to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct GameLumpEntry {
    /// `ident` is the sub-lump id; `offset` is the value stored in the file.
    pub info: LumpInfo,
    raw: Vec<u8>,
    static_props: OnceLock<StaticProps>,
}

impl GameLumpEntry {
    pub fn new(id: i32, version: i32, raw: Vec<u8>) -> Self {
        Self {
            info: LumpInfo {
                ident: id,
                version,
                length: raw.len(),
                ..LumpInfo::default()
            },
            raw,
            static_props: OnceLock::new(),
        }
    }

    pub fn with_static_props(version: i32, props: StaticProps) -> Self {
        let entry = Self::new(STATIC_PROPS_ID, version, Vec::new());
        let _ = entry.static_props.set(props);
        entry
    }

    pub fn id(&self) -> i32 {
        self.info.ident
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Replaces the stored bytes and drops any decoded form.
    pub fn set_raw(&mut self, raw: Vec<u8>) {
        self.info.length = raw.len();
        self.raw = raw;
        self.static_props = OnceLock::new();
    }

    pub fn is_loaded(&self) -> bool {
        self.static_props.get().is_some()
    }

    fn context(&self, map_type: crate::map_type::MapType) -> LumpContext {
        LumpContext::new(map_type, self.info.version)
    }

    /// Decodes the static prop list on first use.
    pub fn static_props(&self, ctx: LumpContext) -> BspResult<&StaticProps> {
        if let Some(props) = self.static_props.get() {
            return Ok(props);
        }
        if self.id() != STATIC_PROPS_ID {
            return Err(BspError::unsupported(
                "static_props",
                ctx.map_type,
                self.info.version,
            ));
        }
        let decoded = StaticProps::decode(&self.raw, self.context(ctx.map_type))?;
        tracing::debug!(props = decoded.props.len(), "decoded static props");
        Ok(self.static_props.get_or_init(|| decoded))
    }

    pub fn static_props_mut(&mut self, ctx: LumpContext) -> BspResult<&mut StaticProps> {
        self.static_props(ctx)?;
        self.static_props
            .get_mut()
            .ok_or(BspError::LumpTypeMismatch { slot: 0 })
    }

    fn emit(&self, ctx: LumpContext) -> Vec<u8> {
        match self.static_props.get() {
            Some(props) => props.emit(self.context(ctx.map_type)),
            None => self.raw.clone(),
        }
    }
}

impl PartialEq for GameLumpEntry {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && self.raw == other.raw
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameLump {
    pub entries: Vec<GameLumpEntry>,
    /// Sub-lump offsets count from the game lump start instead of the file.
    pub relative: bool,
}

fn row_layout(ctx: LumpContext) -> BspResult<GameLumpRowLayout> {
    lookup(GAME_LUMP_LAYOUTS, ctx.map_type)
        .ok_or_else(|| BspError::unsupported(NAME, ctx.map_type, ctx.version))
}

impl GameLump {
    /// `file_offset` is where the game lump itself starts in the file.
    pub fn decode(bytes: &[u8], ctx: LumpContext, file_offset: usize) -> BspResult<Self> {
        let layout = row_layout(ctx)?;
        if bytes.is_empty() {
            return Ok(GameLump::default());
        }
        require_len(NAME, bytes, 4)?;
        let count = read_count(NAME, read_i32_le(&bytes[0..4]))?;
        let width = layout.width();
        let table = check_range(
            NAME,
            4,
            count.checked_mul(width).unwrap_or(usize::MAX),
            bytes.len(),
        )?;

        let mut rows = Vec::with_capacity(count);
        for row in bytes[table].chunks_exact(width) {
            let (flags, version, rest) = match layout {
                GameLumpRowLayout::Standard => (
                    i32::from(read_u16_le(&row[4..6])),
                    i32::from(read_u16_le(&row[6..8])),
                    8,
                ),
                GameLumpRowLayout::Wide => (read_i32_le(&row[4..8]), read_i32_le(&row[8..12]), 12),
            };
            let offset = read_count(NAME, read_i32_le(&row[rest..rest + 4]))?;
            let length = read_count(NAME, read_i32_le(&row[rest + 4..rest + 8]))?;
            rows.push(LumpInfo {
                ident: read_i32_le(&row[0..4]),
                flags,
                version,
                offset,
                length,
                override_file: None,
            });
        }

        let relative = rows
            .iter()
            .filter(|row| row.length > 0)
            .map(|row| row.offset)
            .min()
            .is_some_and(|lowest| lowest < file_offset);
        tracing::debug!(count, relative, "decoded game lump directory");

        let mut entries = Vec::with_capacity(count);
        for info in rows {
            let raw = if info.length == 0 {
                Vec::new()
            } else {
                let start = if relative {
                    Some(info.offset)
                } else {
                    info.offset.checked_sub(file_offset)
                };
                let start = start.ok_or_else(|| {
                    BspError::truncated(
                        NAME,
                        Truncation::OutOfBounds {
                            offset: info.offset,
                            length: info.length,
                            available: bytes.len(),
                        },
                    )
                })?;
                let range = check_range(NAME, start, info.length, bytes.len())?;
                bytes[range].to_vec()
            };
            entries.push(GameLumpEntry {
                info,
                raw,
                static_props: OnceLock::new(),
            });
        }

        Ok(GameLump { entries, relative })
    }

    /// Lays sub-lumps out after the directory in row order. `base_offset` is
    /// where this lump will start in the output file.
    pub fn emit(&self, ctx: LumpContext, base_offset: usize) -> BspResult<Vec<u8>> {
        let layout = row_layout(ctx)?;
        let payloads: Vec<Vec<u8>> = self.entries.iter().map(|entry| entry.emit(ctx)).collect();
        let header = 4 + self.entries.len() * layout.width();
        let origin = if self.relative { 0 } else { base_offset };

        let mut out = Vec::with_capacity(header + payloads.iter().map(Vec::len).sum::<usize>());
        write_i32(&mut out, i32_from_len(self.entries.len()));
        let mut at = header;
        for (entry, payload) in self.entries.iter().zip(&payloads) {
            write_i32(&mut out, entry.info.ident);
            match layout {
                GameLumpRowLayout::Standard => {
                    write_u16(&mut out, entry.info.flags as u16);
                    write_u16(&mut out, entry.info.version as u16);
                }
                GameLumpRowLayout::Wide => {
                    write_i32(&mut out, entry.info.flags);
                    write_i32(&mut out, entry.info.version);
                }
            }
            write_i32(&mut out, i32_from_len(origin + at));
            write_i32(&mut out, i32_from_len(payload.len()));
            at += payload.len();
        }
        for payload in &payloads {
            out.extend_from_slice(payload);
        }
        Ok(out)
    }

    pub fn entry(&self, id: i32) -> Option<&GameLumpEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    pub fn entry_mut(&mut self, id: i32) -> Option<&mut GameLumpEntry> {
        self.entries.iter_mut().find(|entry| entry.id() == id)
    }

    pub fn static_props(&self, ctx: LumpContext) -> BspResult<Option<&StaticProps>> {
        self.entry(STATIC_PROPS_ID)
            .map(|entry| entry.static_props(ctx))
            .transpose()
    }

    pub fn static_props_mut(&mut self, ctx: LumpContext) -> BspResult<Option<&mut StaticProps>> {
        self.entry_mut(STATIC_PROPS_ID)
            .map(|entry| entry.static_props_mut(ctx))
            .transpose()
    }

    /// Decodes every sub-lump this crate understands.
    pub fn load_all(&self, ctx: LumpContext) -> BspResult<()> {
        for entry in &self.entries {
            if entry.id() == STATIC_PROPS_ID {
                entry.static_props(ctx)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_type::MapType;
    use crate::math::Vector3;
    use crate::static_props::StaticProp;

    fn props() -> StaticProps {
        let mut props = StaticProps::default();
        let model = props.intern_model("models/props/cs_office/chair_office.mdl");
        props.props.push(StaticProp {
            origin: Vector3::new(1.0, 2.0, 3.0),
            prop_type: model,
            ..StaticProp::default()
        });
        props
    }

    fn lump(relative: bool) -> GameLump {
        GameLump {
            entries: vec![
                GameLumpEntry::with_static_props(6, props()),
                GameLumpEntry::new(DETAIL_PROPS_ID, 4, vec![1, 2, 3, 4]),
            ],
            relative,
        }
    }

    #[test]
    fn absolute_offsets_round_trip() {
        let ctx = LumpContext::from(MapType::SOURCE20);
        let bytes = lump(false).emit(ctx, 4000).expect("emit");
        let first_offset = read_i32_le(&bytes[12..16]);
        assert_eq!(first_offset, 4000 + 4 + 2 * 16);

        let decoded = GameLump::decode(&bytes, ctx, 4000).expect("decode");
        assert!(!decoded.relative);
        assert_eq!(decoded.entries[1].raw(), &[1, 2, 3, 4]);
        let sprp = decoded.static_props(ctx).expect("props").expect("present");
        assert_eq!(sprp.props[0].origin, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(decoded.emit(ctx, 4000).expect("emit"), bytes);
    }

    #[test]
    fn relative_policy_survives_mutation() {
        let ctx = LumpContext::from(MapType::SOURCE20);
        let bytes = lump(true).emit(ctx, 4000).expect("emit");
        let mut decoded = GameLump::decode(&bytes, ctx, 4000).expect("decode");
        assert!(decoded.relative);

        let sprp = decoded
            .static_props_mut(ctx)
            .expect("props")
            .expect("present");
        sprp.props.push(StaticProp::default());

        let rewritten = decoded.emit(ctx, 8000).expect("emit");
        let again = GameLump::decode(&rewritten, ctx, 8000).expect("decode");
        assert!(again.relative);
        assert_eq!(
            again.static_props(ctx).expect("props").map(|p| p.props.len()),
            Some(2)
        );
        assert_eq!(again.entries[1].raw(), &[1, 2, 3, 4]);
    }

    #[test]
    fn offsets_equal_to_lump_start_are_absolute() {
        // One sub-lump starting exactly at the game lump offset.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&DETAIL_PROPS_ID.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&2000i32.to_le_bytes());
        bytes.extend_from_slice(&4i32.to_le_bytes());
        let decoded = GameLump::decode(&bytes, MapType::SOURCE19.into(), 2000).expect("decode");
        assert!(!decoded.relative);
        assert_eq!(decoded.entries[0].raw(), &bytes[0..4]);
    }

    #[test]
    fn vindictus_rows_are_wide() {
        let ctx = LumpContext::from(MapType::VINDICTUS);
        let bytes = lump(false).emit(ctx, 0).expect("emit");
        assert_eq!(read_i32_le(&bytes[0..4]), 2);
        assert_eq!(read_i32_le(&bytes[12..16]), 6);
        let decoded = GameLump::decode(&bytes, ctx, 0).expect("decode");
        assert_eq!(decoded.entries[0].info.version, 6);
    }

    #[test]
    fn sub_lump_outside_the_lump_is_truncated() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&STATIC_PROPS_ID.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 6, 0]);
        bytes.extend_from_slice(&100i32.to_le_bytes());
        bytes.extend_from_slice(&64i32.to_le_bytes());
        let err = GameLump::decode(&bytes, MapType::SOURCE20.into(), 1036).expect_err("short");
        assert!(matches!(err, BspError::TruncatedLump { .. }));
    }

    #[test]
    fn ids_are_big_endian_tags() {
        assert_eq!(id_name(STATIC_PROPS_ID), "sprp");
        assert_eq!(STATIC_PROPS_ID.to_le_bytes(), *b"prps");
    }
}
