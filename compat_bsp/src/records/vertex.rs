use crate::error::BspResult;
use crate::layout::{lookup, LumpKind, VertexLayout, VERTEX_LAYOUTS};
use crate::lump::{require_len, LumpContext, LumpObject};
use crate::math::{Color, Vector2, Vector3};

use super::vector::{
    read_color, read_vector2, read_vector3, write_color, write_vector2, write_vector3,
};

/// Union of every vertex layout. `uv[0]` is the texture coordinate and
/// `uv[1..]` are lightmap coordinates; layouts without a field leave it at
/// its default.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: Vector3,
    pub normal: Vector3,
    pub uv: [Vector2; 5],
    pub colors: [Color; 4],
    pub tangent: Vector3,
    pub binormal: Vector3,
}

impl Vertex {
    pub fn at(position: Vector3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

impl LumpObject for Vertex {
    const NAME: &'static str = "vertices";
    const KIND: Option<LumpKind> = Some(LumpKind::Vertices);
    type Layout = VertexLayout;

    fn layout(ctx: LumpContext) -> Option<VertexLayout> {
        lookup(VERTEX_LAYOUTS, ctx.map_type)
    }

    fn struct_length(layout: VertexLayout) -> Option<usize> {
        Some(match layout {
            VertexLayout::Position => 12,
            VertexLayout::Quake3 => 44,
            VertexLayout::Raven => 80,
            VertexLayout::Cod => 44,
            VertexLayout::Cod2 => 68,
        })
    }

    fn decode(bytes: &[u8], layout: VertexLayout) -> BspResult<Self> {
        let expected = Self::struct_length(layout).unwrap_or(0);
        require_len(Self::NAME, bytes, expected)?;
        let mut vertex = Vertex::at(read_vector3(&bytes[0..12]));
        match layout {
            VertexLayout::Position => {}
            VertexLayout::Quake3 => {
                vertex.uv[0] = read_vector2(&bytes[12..20]);
                vertex.uv[1] = read_vector2(&bytes[20..28]);
                vertex.normal = read_vector3(&bytes[28..40]);
                vertex.colors[0] = read_color(&bytes[40..44]);
            }
            VertexLayout::Raven => {
                for (i, uv) in vertex.uv.iter_mut().enumerate() {
                    let at = 12 + i * 8;
                    *uv = read_vector2(&bytes[at..at + 8]);
                }
                vertex.normal = read_vector3(&bytes[52..64]);
                for (i, color) in vertex.colors.iter_mut().enumerate() {
                    let at = 64 + i * 4;
                    *color = read_color(&bytes[at..at + 4]);
                }
            }
            VertexLayout::Cod | VertexLayout::Cod2 => {
                vertex.normal = read_vector3(&bytes[12..24]);
                vertex.colors[0] = read_color(&bytes[24..28]);
                vertex.uv[0] = read_vector2(&bytes[28..36]);
                vertex.uv[1] = read_vector2(&bytes[36..44]);
                if layout == VertexLayout::Cod2 {
                    vertex.tangent = read_vector3(&bytes[44..56]);
                    vertex.binormal = read_vector3(&bytes[56..68]);
                }
            }
        }
        Ok(vertex)
    }

    fn encode(&self, layout: VertexLayout, out: &mut Vec<u8>) {
        write_vector3(out, self.position);
        match layout {
            VertexLayout::Position => {}
            VertexLayout::Quake3 => {
                write_vector2(out, self.uv[0]);
                write_vector2(out, self.uv[1]);
                write_vector3(out, self.normal);
                write_color(out, self.colors[0]);
            }
            VertexLayout::Raven => {
                for uv in self.uv {
                    write_vector2(out, uv);
                }
                write_vector3(out, self.normal);
                for color in self.colors {
                    write_color(out, color);
                }
            }
            VertexLayout::Cod | VertexLayout::Cod2 => {
                write_vector3(out, self.normal);
                write_color(out, self.colors[0]);
                write_vector2(out, self.uv[0]);
                write_vector2(out, self.uv[1]);
                if layout == VertexLayout::Cod2 {
                    write_vector3(out, self.tangent);
                    write_vector3(out, self.binormal);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lump::{Lump, LumpInfo};
    use crate::map_type::MapType;

    fn sample() -> Vertex {
        Vertex {
            position: Vector3::new(1.0, 2.0, 3.0),
            normal: Vector3::new(0.0, 0.0, 1.0),
            uv: [
                Vector2::new(0.5, 0.25),
                Vector2::new(0.1, 0.2),
                Vector2::new(0.3, 0.4),
                Vector2::new(0.5, 0.6),
                Vector2::new(0.7, 0.8),
            ],
            colors: [
                Color::new(255, 0, 0, 255),
                Color::new(0, 255, 0, 255),
                Color::new(0, 0, 255, 255),
                Color::new(9, 9, 9, 9),
            ],
            tangent: Vector3::new(1.0, 0.0, 0.0),
            binormal: Vector3::new(0.0, 1.0, 0.0),
        }
    }

    #[test]
    fn layouts_have_expected_sizes() {
        let cases = [
            (MapType::QUAKE, 12),
            (MapType::SOURCE20, 12),
            (MapType::QUAKE3, 44),
            (MapType::MOHAA, 44),
            (MapType::RAVEN, 80),
            (MapType::COD, 44),
            (MapType::COD2, 68),
        ];
        for (tag, size) in cases {
            let ctx = LumpContext::from(tag);
            let lump = Lump::from_vec(vec![sample()]);
            assert_eq!(lump.serialized_length(ctx).expect("len"), size, "{}", tag);
        }
    }

    #[test]
    fn raven_keeps_every_lightmap_channel() {
        let ctx = LumpContext::from(MapType::RAVEN);
        let bytes = Lump::from_vec(vec![sample()]).emit(ctx).expect("emit");
        let decoded = Lump::<Vertex>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(decoded[0], Vertex {
            tangent: Vector3::ZERO,
            binormal: Vector3::ZERO,
            ..sample()
        });
        assert_eq!(decoded.emit(ctx).expect("emit"), bytes);
    }

    #[test]
    fn absent_fields_decode_to_defaults() {
        let ctx = LumpContext::from(MapType::QUAKE3);
        let bytes = Lump::from_vec(vec![sample()]).emit(ctx).expect("emit");
        let decoded = Lump::<Vertex>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        let vertex = decoded[0];
        assert_eq!(vertex.uv[1], Vector2::new(0.1, 0.2));
        assert_eq!(vertex.uv[2], Vector2::default());
        assert_eq!(vertex.colors[1], Color::default());
        assert_eq!(vertex.tangent, Vector3::ZERO);
    }

    #[test]
    fn cod2_round_trips_tangent_frame() {
        let ctx = LumpContext::from(MapType::COD2);
        let bytes = Lump::from_vec(vec![sample()]).emit(ctx).expect("emit");
        let decoded = Lump::<Vertex>::decode(&bytes, ctx, LumpInfo::default()).expect("decode");
        assert_eq!(decoded[0].tangent, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(decoded[0].binormal, Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(decoded[0].colors[0], Color::new(255, 0, 0, 255));
    }
}
