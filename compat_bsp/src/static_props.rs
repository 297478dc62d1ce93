//! Source static prop game lump (`sprp`).

use crate::bytes::{
    i32_from_len, read_f32_le, read_i32_le, read_u16_le, read_u32_le, write_f32, write_i32,
    write_u16, write_u32,
};
use crate::error::{check_range, read_count, BspError, BspResult, Truncation};
use crate::layout::static_prop_stride;
use crate::lump::LumpContext;
use crate::map_type::MapType;
use crate::math::{Color, Vector3};
use crate::name::Name;
use crate::records::vector::{read_color, read_vector3, write_color, write_vector3};

const NAME: &str = "static_props";
const MODEL_NAME_LENGTH: usize = 128;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticProp {
    pub origin: Vector3,
    pub angles: Vector3,
    /// Index into the model dictionary.
    pub prop_type: u16,
    pub first_leaf: u16,
    pub leaf_count: u16,
    pub solid: u8,
    pub flags: u8,
    pub skin: i32,
    pub min_fade: f32,
    pub max_fade: f32,
    pub lighting_origin: Vector3,
    pub forced_fade_scale: f32,
    pub min_dx_level: u16,
    pub max_dx_level: u16,
    pub min_cpu_level: u8,
    pub max_cpu_level: u8,
    pub min_gpu_level: u8,
    pub max_gpu_level: u8,
    pub diffuse_modulation: Color,
    /// Non-zero hides the prop on Xbox 360.
    pub disable_x360: u32,
    pub flags_ex: u32,
    pub uniform_scale: f32,
    /// Record bytes past the fields known for this version.
    pub extra: Vec<u8>,
}

/// Bytes of a record covered by named fields for `version`.
pub fn known_length(version: i32) -> usize {
    match version {
        i32::MIN..=4 => 56,
        5 => 60,
        6 => 64,
        7 | 8 => 68,
        9 => 72,
        10 => 76,
        _ => 80,
    }
}

impl StaticProp {
    fn decode(bytes: &[u8], version: i32) -> Self {
        let fits = |end: usize| end <= bytes.len();
        let mut prop = StaticProp::default();
        if fits(56) {
            prop.origin = read_vector3(&bytes[0..12]);
            prop.angles = read_vector3(&bytes[12..24]);
            prop.prop_type = read_u16_le(&bytes[24..26]);
            prop.first_leaf = read_u16_le(&bytes[26..28]);
            prop.leaf_count = read_u16_le(&bytes[28..30]);
            prop.solid = bytes[30];
            prop.flags = bytes[31];
            prop.skin = read_i32_le(&bytes[32..36]);
            prop.min_fade = read_f32_le(&bytes[36..40]);
            prop.max_fade = read_f32_le(&bytes[40..44]);
            prop.lighting_origin = read_vector3(&bytes[44..56]);
        }
        if version >= 5 && fits(60) {
            prop.forced_fade_scale = read_f32_le(&bytes[56..60]);
        }
        if (version == 6 || version == 7) && fits(64) {
            prop.min_dx_level = read_u16_le(&bytes[60..62]);
            prop.max_dx_level = read_u16_le(&bytes[62..64]);
        }
        if version >= 8 && fits(64) {
            prop.min_cpu_level = bytes[60];
            prop.max_cpu_level = bytes[61];
            prop.min_gpu_level = bytes[62];
            prop.max_gpu_level = bytes[63];
        }
        if version >= 7 && fits(68) {
            prop.diffuse_modulation = read_color(&bytes[64..68]);
        }
        if version >= 9 && fits(72) {
            prop.disable_x360 = read_u32_le(&bytes[68..72]);
        }
        if version >= 10 && fits(76) {
            prop.flags_ex = read_u32_le(&bytes[72..76]);
        }
        if version >= 11 && fits(80) {
            prop.uniform_scale = read_f32_le(&bytes[76..80]);
        }
        let known = fields_end(version, bytes.len());
        prop.extra = bytes[known..].to_vec();
        prop
    }

    fn encode(&self, version: i32, stride: usize, out: &mut Vec<u8>) {
        let start = out.len();
        let fits = |end: usize| end <= stride;
        if fits(56) {
            write_vector3(out, self.origin);
            write_vector3(out, self.angles);
            write_u16(out, self.prop_type);
            write_u16(out, self.first_leaf);
            write_u16(out, self.leaf_count);
            out.push(self.solid);
            out.push(self.flags);
            write_i32(out, self.skin);
            write_f32(out, self.min_fade);
            write_f32(out, self.max_fade);
            write_vector3(out, self.lighting_origin);
        }
        if version >= 5 && fits(60) {
            write_f32(out, self.forced_fade_scale);
        }
        if (version == 6 || version == 7) && fits(64) {
            write_u16(out, self.min_dx_level);
            write_u16(out, self.max_dx_level);
        }
        if version >= 8 && fits(64) {
            out.extend_from_slice(&[
                self.min_cpu_level,
                self.max_cpu_level,
                self.min_gpu_level,
                self.max_gpu_level,
            ]);
        }
        if version >= 7 && fits(68) {
            write_color(out, self.diffuse_modulation);
        }
        if version >= 9 && fits(72) {
            write_u32(out, self.disable_x360);
        }
        if version >= 10 && fits(76) {
            write_u32(out, self.flags_ex);
        }
        if version >= 11 && fits(80) {
            write_f32(out, self.uniform_scale);
        }
        out.extend_from_slice(&self.extra);
        out.resize(start + stride, 0);
    }
}

/// End of the last named field that fits inside a record of `stride` bytes.
fn fields_end(version: i32, stride: usize) -> usize {
    const ENDS: [usize; 7] = [56, 60, 64, 68, 72, 76, 80];
    let known = known_length(version).min(stride);
    ENDS.iter()
        .copied()
        .filter(|end| *end <= known)
        .max()
        .unwrap_or(0)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticProps {
    pub dictionary: Vec<Name>,
    pub leaves: Vec<u16>,
    /// Per-prop scale overrides `(prop index, scale)`, Vindictus only.
    pub scales: Vec<(i32, Vector3)>,
    pub props: Vec<StaticProp>,
    /// Record size read from the file; used when no table entry exists.
    pub stride: Option<usize>,
}

impl StaticProps {
    pub fn decode(bytes: &[u8], ctx: LumpContext) -> BspResult<Self> {
        let mut cursor = Cursor { bytes, at: 0 };

        let names = cursor.count()?;
        let dictionary = cursor
            .take(names, MODEL_NAME_LENGTH)?
            .chunks_exact(MODEL_NAME_LENGTH)
            .map(Name::from_field)
            .collect();

        let leaf_count = cursor.count()?;
        let leaves = cursor
            .take(leaf_count, 2)?
            .chunks_exact(2)
            .map(read_u16_le)
            .collect();

        let mut scales = Vec::new();
        if ctx.map_type == MapType::VINDICTUS {
            let count = cursor.count()?;
            scales = cursor
                .take(count, 16)?
                .chunks_exact(16)
                .map(|entry| (read_i32_le(&entry[0..4]), read_vector3(&entry[4..16])))
                .collect();
        }

        let count = cursor.count()?;
        let remaining = bytes.len() - cursor.at;
        let stride = match static_prop_stride(ctx.map_type, ctx.version) {
            Some(stride) => {
                if count.checked_mul(stride) != Some(remaining) {
                    return Err(BspError::truncated(
                        NAME,
                        Truncation::PartialRecord {
                            length: remaining,
                            stride,
                        },
                    ));
                }
                stride
            }
            None if count == 0 => known_length(ctx.version),
            None => {
                if remaining % count != 0 {
                    return Err(BspError::truncated(
                        NAME,
                        Truncation::PartialRecord {
                            length: remaining,
                            stride: remaining / count,
                        },
                    ));
                }
                let stride = remaining / count;
                tracing::warn!(
                    map_type = %ctx.map_type,
                    version = ctx.version,
                    stride,
                    "static prop stride inferred from lump size"
                );
                stride
            }
        };

        let props = if stride == 0 {
            vec![StaticProp::default(); count]
        } else {
            cursor
                .take(count, stride)?
                .chunks_exact(stride)
                .map(|record| StaticProp::decode(record, ctx.version))
                .collect()
        };

        Ok(StaticProps {
            dictionary,
            leaves,
            scales,
            props,
            stride: Some(stride),
        })
    }

    pub fn emit(&self, ctx: LumpContext) -> Vec<u8> {
        let stride = static_prop_stride(ctx.map_type, ctx.version)
            .or(self.stride)
            .unwrap_or_else(|| known_length(ctx.version));
        let mut out = Vec::new();
        write_i32(&mut out, i32_from_len(self.dictionary.len()));
        for name in &self.dictionary {
            name.write_field(&mut out, MODEL_NAME_LENGTH);
        }
        write_i32(&mut out, i32_from_len(self.leaves.len()));
        for leaf in &self.leaves {
            write_u16(&mut out, *leaf);
        }
        if ctx.map_type == MapType::VINDICTUS {
            write_i32(&mut out, i32_from_len(self.scales.len()));
            for (index, scale) in &self.scales {
                write_i32(&mut out, *index);
                write_vector3(&mut out, *scale);
            }
        }
        write_i32(&mut out, i32_from_len(self.props.len()));
        for prop in &self.props {
            prop.encode(ctx.version, stride, &mut out);
        }
        out
    }

    /// Model name used by `prop`, if its dictionary index is valid and the
    /// name is UTF-8.
    pub fn model_name(&self, prop: &StaticProp) -> Option<&str> {
        self.dictionary
            .get(usize::from(prop.prop_type))
            .and_then(Name::as_str)
    }

    /// Adds a model to the dictionary, returning its index.
    pub fn intern_model(&mut self, name: &str) -> u16 {
        if let Some(index) = self.dictionary.iter().position(|entry| entry == name) {
            return u16::try_from(index).unwrap_or(u16::MAX);
        }
        self.dictionary.push(Name::from(name));
        u16::try_from(self.dictionary.len() - 1).unwrap_or(u16::MAX)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn count(&mut self) -> BspResult<usize> {
        let range = check_range(NAME, self.at, 4, self.bytes.len())?;
        self.at = range.end;
        read_count(NAME, read_i32_le(&self.bytes[range]))
    }

    fn take(&mut self, count: usize, size: usize) -> BspResult<&'a [u8]> {
        let length = count.checked_mul(size).unwrap_or(usize::MAX);
        let range = check_range(NAME, self.at, length, self.bytes.len())?;
        self.at = range.end;
        Ok(&self.bytes[range])
    }
}
