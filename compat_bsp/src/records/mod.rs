//! Record codecs. Each type implements [`crate::lump::LumpObject`] and picks
//! its layout from [`crate::layout`].

pub mod plane;
pub mod texture;
pub mod texture_info;
pub mod vector;
pub mod vertex;

pub use plane::Plane;
pub use texture::{MipTexture, Texture};
pub use texture_info::TextureInfo;
pub use vertex::Vertex;
