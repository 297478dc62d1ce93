#![forbid(unsafe_code)]

//! Codecs and a lazily decoded container for the BSP map formats of the
//! Quake, GoldSrc, Quake 2, Quake 3, Call of Duty and Source engine lines.

mod bytes;

pub mod bsp;
pub mod cipher;
pub mod config;
pub mod detect;
pub mod error;
pub mod game_lump;
pub mod layout;
pub mod lump;
pub mod map_type;
pub mod math;
pub mod name;
pub mod overlay;
pub mod reader;
pub mod records;
pub mod static_props;
pub mod visibility;
pub mod writer;

pub use bsp::{Bsp, DynLump, LoadableLump, RawLump};
pub use config::ReaderOptions;
pub use detect::{detect, detect_with_key};
pub use error::{BspError, BspResult, Truncation};
pub use game_lump::{GameLump, GameLumpEntry};
pub use lump::{Lump, LumpContext, LumpInfo, LumpObject};
pub use map_type::MapType;
pub use math::{Color, Vector2, Vector3, Vector4};
pub use name::Name;
pub use static_props::{StaticProp, StaticProps};
pub use visibility::Visibility;
