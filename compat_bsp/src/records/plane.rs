use crate::bytes::{read_f32_le, read_i32_le, write_f32, write_i32};
use crate::error::BspResult;
use crate::layout::{lookup, LumpKind, PlaneLayout, PLANES_LAYOUTS};
use crate::lump::{require_len, LumpContext, LumpObject};
use crate::math::Vector3;

use super::vector::{read_vector3, write_vector3};

pub const PLANE_X: i32 = 0;
pub const PLANE_Y: i32 = 1;
pub const PLANE_Z: i32 = 2;
pub const PLANE_ANY_X: i32 = 3;
pub const PLANE_ANY_Y: i32 = 4;
pub const PLANE_ANY_Z: i32 = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3,
    pub distance: f32,
    /// Axis classification; stored on disk only by the 20-byte layout.
    pub plane_type: i32,
}

impl Plane {
    /// Builds a plane whose type is derived from the normal.
    pub fn new(normal: Vector3, distance: f32) -> Self {
        Self {
            normal,
            distance,
            plane_type: Self::type_for_normal(normal),
        }
    }

    /// Axial normals map to X/Y/Z, anything else to the dominant axis.
    pub fn type_for_normal(normal: Vector3) -> i32 {
        if normal.x == 1.0 || normal.x == -1.0 {
            return PLANE_X;
        }
        if normal.y == 1.0 || normal.y == -1.0 {
            return PLANE_Y;
        }
        if normal.z == 1.0 || normal.z == -1.0 {
            return PLANE_Z;
        }
        let (ax, ay, az) = (normal.x.abs(), normal.y.abs(), normal.z.abs());
        if ax >= ay && ax >= az {
            PLANE_ANY_X
        } else if ay >= ax && ay >= az {
            PLANE_ANY_Y
        } else {
            PLANE_ANY_Z
        }
    }

    pub fn distance_to(&self, point: Vector3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    pub fn flipped(&self) -> Self {
        Self::new(-self.normal, -self.distance)
    }
}

impl LumpObject for Plane {
    const NAME: &'static str = "planes";
    const KIND: Option<LumpKind> = Some(LumpKind::Planes);
    type Layout = PlaneLayout;

    fn layout(ctx: LumpContext) -> Option<PlaneLayout> {
        lookup(PLANES_LAYOUTS, ctx.map_type)
    }

    fn struct_length(layout: PlaneLayout) -> Option<usize> {
        Some(match layout {
            PlaneLayout::Quake => 20,
            PlaneLayout::Quake3 => 16,
        })
    }

    fn decode(bytes: &[u8], layout: PlaneLayout) -> BspResult<Self> {
        match layout {
            PlaneLayout::Quake => {
                require_len(Self::NAME, bytes, 20)?;
                Ok(Plane {
                    normal: read_vector3(&bytes[0..12]),
                    distance: read_f32_le(&bytes[12..16]),
                    plane_type: read_i32_le(&bytes[16..20]),
                })
            }
            PlaneLayout::Quake3 => {
                require_len(Self::NAME, bytes, 16)?;
                Ok(Plane::new(
                    read_vector3(&bytes[0..12]),
                    read_f32_le(&bytes[12..16]),
                ))
            }
        }
    }

    fn encode(&self, layout: PlaneLayout, out: &mut Vec<u8>) {
        write_vector3(out, self.normal);
        write_f32(out, self.distance);
        if layout == PlaneLayout::Quake {
            write_i32(out, self.plane_type);
        }
    }
}
