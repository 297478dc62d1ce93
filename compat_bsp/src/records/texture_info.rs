use crate::bytes::{read_i32_le, write_i32};
use crate::error::BspResult;
use crate::layout::{lookup, LumpKind, TextureInfoLayout, TEXTURE_INFO_LAYOUTS};
use crate::lump::{require_len, LumpContext, LumpObject};
use crate::math::{Vector3, Vector4};
use crate::name::Name;

use super::vector::{read_vector4, write_vector4};

/// Texture projection for a face. Each axis is stored as `xyz` direction plus
/// `w` shift, the way every variant lays it out on disk.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureInfo {
    pub texture_u: Vector4,
    pub texture_v: Vector4,
    pub lightmap_u: Vector4,
    pub lightmap_v: Vector4,
    pub flags: i32,
    pub value: i32,
    /// Miptex index (Quake) or texdata index (Source).
    pub texture_index: i32,
    pub texture_name: Name,
    /// Next frame of an animated texture, -1 for none.
    pub next: i32,
}

impl TextureInfo {
    pub fn new(u_axis: Vector3, u_shift: f32, v_axis: Vector3, v_shift: f32) -> Self {
        Self {
            texture_u: u_axis.extend(u_shift),
            texture_v: v_axis.extend(v_shift),
            next: -1,
            ..Self::default()
        }
    }

    /// Projection aligned to the world axis nearest `normal`.
    pub fn from_plane_normal(normal: Vector3) -> Self {
        let (u, v) = texture_axes_from_plane(normal);
        Self::new(u, 0.0, v, 0.0)
    }

    pub fn u_axis(&self) -> Vector3 {
        self.texture_u.truncate()
    }

    pub fn v_axis(&self) -> Vector3 {
        self.texture_v.truncate()
    }

    /// Texture-space coordinate of a world point.
    pub fn project(&self, point: Vector3) -> (f32, f32) {
        (
            self.u_axis().dot(point) + self.texture_u.w,
            self.v_axis().dot(point) + self.texture_v.w,
        )
    }
}

/// Reference axes: face normal, then the u and v direction for that face.
/// Order is floor, ceiling, west, east, south, north.
const BASE_AXES: [[Vector3; 3]; 6] = [
    [
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
    ],
    [
        Vector3::new(0.0, 0.0, -1.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
    ],
    [
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
    ],
    [
        Vector3::new(-1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
    ],
    [
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
    ],
    [
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, -1.0),
    ],
];

/// Index of the reference axis closest to `normal`. Ties keep the earlier axis.
pub fn best_axis(normal: Vector3) -> usize {
    let mut best = 0.0;
    let mut best_axis = 0;
    for (i, axes) in BASE_AXES.iter().enumerate() {
        let dot = normal.dot(axes[0]);
        if dot > best {
            best = dot;
            best_axis = i;
        }
    }
    best_axis
}

pub fn texture_axes_from_plane(normal: Vector3) -> (Vector3, Vector3) {
    let axes = BASE_AXES[best_axis(normal)];
    (axes[1], axes[2])
}

impl LumpObject for TextureInfo {
    const NAME: &'static str = "texture_info";
    const KIND: Option<LumpKind> = Some(LumpKind::TextureInfo);
    type Layout = TextureInfoLayout;

    fn layout(ctx: LumpContext) -> Option<TextureInfoLayout> {
        lookup(TEXTURE_INFO_LAYOUTS, ctx.map_type)
    }

    fn struct_length(layout: TextureInfoLayout) -> Option<usize> {
        Some(match layout {
            TextureInfoLayout::Quake => 40,
            TextureInfoLayout::Nightfire => 32,
            TextureInfoLayout::Quake2 => 76,
            TextureInfoLayout::Sin => 108,
            TextureInfoLayout::Source => 72,
        })
    }

    fn decode(bytes: &[u8], layout: TextureInfoLayout) -> BspResult<Self> {
        let expected = Self::struct_length(layout).unwrap_or(0);
        require_len(Self::NAME, bytes, expected)?;
        let mut info = TextureInfo {
            texture_u: read_vector4(&bytes[0..16]),
            texture_v: read_vector4(&bytes[16..32]),
            next: -1,
            ..TextureInfo::default()
        };
        match layout {
            TextureInfoLayout::Nightfire => {}
            TextureInfoLayout::Quake => {
                info.texture_index = read_i32_le(&bytes[32..36]);
                info.flags = read_i32_le(&bytes[36..40]);
            }
            TextureInfoLayout::Quake2 | TextureInfoLayout::Sin => {
                let name_len = if layout == TextureInfoLayout::Sin { 64 } else { 32 };
                info.flags = read_i32_le(&bytes[32..36]);
                info.value = read_i32_le(&bytes[36..40]);
                info.texture_name = Name::from_field(&bytes[40..40 + name_len]);
                let at = 40 + name_len;
                info.next = read_i32_le(&bytes[at..at + 4]);
            }
            TextureInfoLayout::Source => {
                info.lightmap_u = read_vector4(&bytes[32..48]);
                info.lightmap_v = read_vector4(&bytes[48..64]);
                info.flags = read_i32_le(&bytes[64..68]);
                info.texture_index = read_i32_le(&bytes[68..72]);
            }
        }
        Ok(info)
    }

    fn encode(&self, layout: TextureInfoLayout, out: &mut Vec<u8>) {
        write_vector4(out, self.texture_u);
        write_vector4(out, self.texture_v);
        match layout {
            TextureInfoLayout::Nightfire => {}
            TextureInfoLayout::Quake => {
                write_i32(out, self.texture_index);
                write_i32(out, self.flags);
            }
            TextureInfoLayout::Quake2 | TextureInfoLayout::Sin => {
                let name_len = if layout == TextureInfoLayout::Sin { 64 } else { 32 };
                write_i32(out, self.flags);
                write_i32(out, self.value);
                self.texture_name.write_field(out, name_len);
                write_i32(out, self.next);
            }
            TextureInfoLayout::Source => {
                write_vector4(out, self.lightmap_u);
                write_vector4(out, self.lightmap_v);
                write_i32(out, self.flags);
                write_i32(out, self.texture_index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lump::{Lump, LumpInfo};
    use crate::map_type::MapType;

    #[test]
    fn best_axis_prefers_first_on_ties() {
        assert_eq!(best_axis(Vector3::new(0.0, 0.0, 1.0)), 0);
        assert_eq!(best_axis(Vector3::new(0.0, 0.0, -1.0)), 1);
        assert_eq!(best_axis(Vector3::new(-1.0, 0.0, 0.0)), 3);
        assert_eq!(best_axis(Vector3::new(0.0, -1.0, 0.0)), 5);
        // Equal x and z components: the floor comes before the west wall.
        let diagonal = Vector3::new(1.0, 0.0, 1.0).normalize();
        assert_eq!(best_axis(diagonal), 0);
        assert_eq!(best_axis(Vector3::ZERO), 0);
    }

    #[test]
    fn axes_from_wall_plane() {
        let (u, v) = texture_axes_from_plane(Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(u, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(v, Vector3::new(0.0, 0.0, -1.0));
        let info = TextureInfo::from_plane_normal(Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(info.project(Vector3::new(3.0, 4.0, 5.0)), (3.0, -4.0));
    }

    #[test]
    fn quake2_name_round_trips() {
        let mut info = TextureInfo::new(
            Vector3::new(1.0, 0.0, 0.0),
            8.0,
            Vector3::new(0.0, -1.0, 0.0),
            0.0,
        );
        info.flags = 0x10;
        info.value = 3;
        info.texture_name = Name::from("e1u1/floor1_3");

        for (tag, size) in [(MapType::QUAKE2, 76), (MapType::SIN, 108)] {
            let ctx = LumpContext::from(tag);
            let bytes = Lump::from_vec(vec![info.clone()]).emit(ctx).expect("emit");
            assert_eq!(bytes.len(), size);
            let decoded =
                Lump::<TextureInfo>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
            assert_eq!(decoded[0], info);
        }
    }

    #[test]
    fn source_keeps_lightmap_axes() {
        let mut info = TextureInfo::from_plane_normal(Vector3::new(1.0, 0.0, 0.0));
        info.lightmap_u = Vector4::new(0.0, 0.0625, 0.0, 2.0);
        info.lightmap_v = Vector4::new(0.0, 0.0, -0.0625, 1.0);
        info.texture_index = 7;
        let ctx = LumpContext::from(MapType::SOURCE20);
        let bytes = Lump::from_vec(vec![info.clone()]).emit(ctx).expect("emit");
        assert_eq!(bytes.len(), 72);
        let decoded = Lump::<TextureInfo>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(decoded[0], info);
    }

    #[test]
    fn nightfire_drops_everything_but_axes() {
        let mut info = TextureInfo::from_plane_normal(Vector3::new(0.0, 0.0, 1.0));
        info.flags = 99;
        let ctx = LumpContext::from(MapType::NIGHTFIRE);
        let bytes = Lump::from_vec(vec![info.clone()]).emit(ctx).expect("emit");
        assert_eq!(bytes.len(), 32);
        let decoded = Lump::<TextureInfo>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(decoded[0].flags, 0);
        assert_eq!(decoded[0].texture_u, info.texture_u);
    }

    #[test]
    fn extreme_indices_round_trip() {
        for (tag, index) in [
            (MapType::QUAKE, i32::MIN),
            (MapType::GOLDSRC, i32::MAX),
            (MapType::SOURCE20, i32::MIN),
            (MapType::SOURCE27, i32::MAX),
        ] {
            let mut info = TextureInfo::from_plane_normal(Vector3::new(0.0, 0.0, 1.0));
            info.texture_index = index;
            info.flags = i32::MIN;
            let ctx = LumpContext::from(tag);
            let bytes = Lump::from_vec(vec![info.clone()]).emit(ctx).expect("emit");
            let decoded =
                Lump::<TextureInfo>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
            assert_eq!(decoded[0], info, "{}", tag);
            assert_eq!(decoded.emit(ctx).expect("emit"), bytes);
        }
    }

    #[test]
    fn quake2_name_fields_keep_their_bytes() {
        let mut record = vec![0u8; 40];
        record.extend_from_slice(&[b'n'; 32]);
        record.extend_from_slice(&(-1i32).to_le_bytes());
        let mut second = vec![0u8; 40];
        let mut name = b"e1u1/\xFFsky\0old".to_vec();
        name.resize(32, 0);
        second.extend(name);
        second.extend_from_slice(&3i32.to_le_bytes());
        record.extend(second);

        let ctx = LumpContext::from(MapType::QUAKE2);
        let lump = Lump::<TextureInfo>::decode(&record, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(lump[0].texture_name.len(), 32);
        assert_eq!(lump[1].next, 3);
        assert_eq!(lump.emit(ctx).expect("emit"), record);
    }
}
