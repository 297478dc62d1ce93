use crate::bytes::{read_f32_le, write_f32};
use crate::error::BspResult;
use crate::lump::{require_len, LumpContext, LumpObject};
use crate::math::{Color, Vector2, Vector3, Vector4};

pub(crate) fn read_vector2(bytes: &[u8]) -> Vector2 {
    Vector2::new(read_f32_le(&bytes[0..4]), read_f32_le(&bytes[4..8]))
}

pub(crate) fn read_vector3(bytes: &[u8]) -> Vector3 {
    Vector3::new(
        read_f32_le(&bytes[0..4]),
        read_f32_le(&bytes[4..8]),
        read_f32_le(&bytes[8..12]),
    )
}

pub(crate) fn read_vector4(bytes: &[u8]) -> Vector4 {
    Vector4::new(
        read_f32_le(&bytes[0..4]),
        read_f32_le(&bytes[4..8]),
        read_f32_le(&bytes[8..12]),
        read_f32_le(&bytes[12..16]),
    )
}

pub(crate) fn read_color(bytes: &[u8]) -> Color {
    Color::new(bytes[0], bytes[1], bytes[2], bytes[3])
}

pub(crate) fn write_vector2(out: &mut Vec<u8>, value: Vector2) {
    write_f32(out, value.x);
    write_f32(out, value.y);
}

pub(crate) fn write_vector3(out: &mut Vec<u8>, value: Vector3) {
    write_f32(out, value.x);
    write_f32(out, value.y);
    write_f32(out, value.z);
}

pub(crate) fn write_vector4(out: &mut Vec<u8>, value: Vector4) {
    write_f32(out, value.x);
    write_f32(out, value.y);
    write_f32(out, value.z);
    write_f32(out, value.w);
}

pub(crate) fn write_color(out: &mut Vec<u8>, value: Color) {
    out.extend_from_slice(&[value.r, value.g, value.b, value.a]);
}

// Plain vector lumps (normals, lightmap coordinates) share one layout in
// every variant.

impl LumpObject for Vector2 {
    const NAME: &'static str = "vector2";
    type Layout = ();

    fn layout(_ctx: LumpContext) -> Option<()> {
        Some(())
    }

    fn struct_length(_layout: ()) -> Option<usize> {
        Some(8)
    }

    fn decode(bytes: &[u8], _layout: ()) -> BspResult<Self> {
        require_len(Self::NAME, bytes, 8)?;
        Ok(read_vector2(bytes))
    }

    fn encode(&self, _layout: (), out: &mut Vec<u8>) {
        write_vector2(out, *self);
    }
}

impl LumpObject for Vector3 {
    const NAME: &'static str = "vector3";
    type Layout = ();

    fn layout(_ctx: LumpContext) -> Option<()> {
        Some(())
    }

    fn struct_length(_layout: ()) -> Option<usize> {
        Some(12)
    }

    fn decode(bytes: &[u8], _layout: ()) -> BspResult<Self> {
        require_len(Self::NAME, bytes, 12)?;
        Ok(read_vector3(bytes))
    }

    fn encode(&self, _layout: (), out: &mut Vec<u8>) {
        write_vector3(out, *self);
    }
}

impl LumpObject for Vector4 {
    const NAME: &'static str = "vector4";
    type Layout = ();

    fn layout(_ctx: LumpContext) -> Option<()> {
        Some(())
    }

    fn struct_length(_layout: ()) -> Option<usize> {
        Some(16)
    }

    fn decode(bytes: &[u8], _layout: ()) -> BspResult<Self> {
        require_len(Self::NAME, bytes, 16)?;
        Ok(read_vector4(bytes))
    }

    fn encode(&self, _layout: (), out: &mut Vec<u8>) {
        write_vector4(out, *self);
    }
}
