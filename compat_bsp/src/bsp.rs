//! The map container: header, lump directory and one lazily decoded cell per
//! slot.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::cipher::{self, Key};
use crate::config::ReaderOptions;
use crate::error::{check_range, BspError, BspResult};
use crate::game_lump::GameLump;
use crate::layout::{header_layout, lump_index, signature, HeaderLayout, LumpKind};
use crate::lump::{Lump, LumpContext, LumpInfo, LumpObject, DEFAULT_MAX_RECORDS};
use crate::map_type::MapType;
use crate::overlay::Overlay;
use crate::records::{Plane, Texture, TextureInfo, Vertex};
use crate::visibility::Visibility;

/// A lump type that can live in a directory slot.
pub trait LoadableLump: Sized + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
    const KIND: Option<LumpKind>;

    fn load(bytes: &[u8], ctx: LumpContext, info: &LumpInfo, max_records: usize)
        -> BspResult<Self>;

    /// Encodes the lump; `base_offset` is where it will start in the file.
    fn emit(&self, ctx: LumpContext, base_offset: usize) -> BspResult<Vec<u8>>;
}

impl<T: LumpObject> LoadableLump for Lump<T> {
    const NAME: &'static str = T::NAME;
    const KIND: Option<LumpKind> = T::KIND;

    fn load(
        bytes: &[u8],
        ctx: LumpContext,
        info: &LumpInfo,
        max_records: usize,
    ) -> BspResult<Self> {
        Lump::decode_limited(bytes, ctx, info.clone(), max_records)
    }

    fn emit(&self, ctx: LumpContext, _base_offset: usize) -> BspResult<Vec<u8>> {
        Lump::emit(self, ctx)
    }
}

impl LoadableLump for Visibility {
    const NAME: &'static str = "visibility";
    const KIND: Option<LumpKind> = Some(LumpKind::Visibility);

    fn load(bytes: &[u8], ctx: LumpContext, _info: &LumpInfo, _max: usize) -> BspResult<Self> {
        Visibility::decode(bytes, ctx)
    }

    fn emit(&self, _ctx: LumpContext, _base_offset: usize) -> BspResult<Vec<u8>> {
        Ok(Visibility::emit(self))
    }
}

impl LoadableLump for GameLump {
    const NAME: &'static str = "game_lump";
    const KIND: Option<LumpKind> = Some(LumpKind::GameLump);

    fn load(bytes: &[u8], ctx: LumpContext, info: &LumpInfo, _max: usize) -> BspResult<Self> {
        GameLump::decode(bytes, ctx, info.offset)
    }

    fn emit(&self, ctx: LumpContext, base_offset: usize) -> BspResult<Vec<u8>> {
        GameLump::emit(self, ctx, base_offset)
    }
}

/// Undecoded lump bytes, for slots without a typed codec (entities and
/// anything else a caller wants to replace wholesale).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawLump(pub Vec<u8>);

impl LoadableLump for RawLump {
    const NAME: &'static str = "raw";
    const KIND: Option<LumpKind> = None;

    fn load(bytes: &[u8], _ctx: LumpContext, _info: &LumpInfo, _max: usize) -> BspResult<Self> {
        Ok(RawLump(bytes.to_vec()))
    }

    fn emit(&self, _ctx: LumpContext, _base_offset: usize) -> BspResult<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Object-safe view of a loaded slot.
pub trait DynLump: fmt::Debug + Send + Sync {
    fn emit_dyn(&self, ctx: LumpContext, base_offset: usize) -> BspResult<Vec<u8>>;
    fn name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<L: LoadableLump> DynLump for L {
    fn emit_dyn(&self, ctx: LumpContext, base_offset: usize) -> BspResult<Vec<u8>> {
        self.emit(ctx, base_offset)
    }

    fn name(&self) -> &'static str {
        L::NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) type Slot = OnceLock<Box<dyn DynLump>>;

/// Where unloaded lumps come from: the file as read (still encrypted when a
/// key was recovered) plus any external lump files.
#[derive(Default)]
pub(crate) struct ByteSource {
    pub(crate) data: Vec<u8>,
    pub(crate) key: Option<Key>,
    pub(crate) overlay: Overlay,
}

impl ByteSource {
    fn read(&self, slot: usize, info: &LumpInfo) -> BspResult<Vec<u8>> {
        if let Some(file) = self.overlay.get(slot) {
            return Ok(file.data.clone());
        }
        let range = check_range("lump", info.offset, info.length, self.data.len())?;
        let mut bytes = self.data[range].to_vec();
        if let Some(key) = &self.key {
            cipher::xor_in_place(&mut bytes, key, info.offset);
        }
        Ok(bytes)
    }
}

pub struct Bsp {
    pub(crate) map_type: MapType,
    pub(crate) header: HeaderLayout,
    /// Header bytes before the directory, decrypted.
    pub(crate) prefix: Vec<u8>,
    /// Header bytes after the directory, decrypted.
    pub(crate) suffix: Vec<u8>,
    pub(crate) infos: Vec<LumpInfo>,
    pub(crate) source: ByteSource,
    pub(crate) slots: Vec<Slot>,
    /// Key applied to written output.
    pub(crate) key: Option<Key>,
    pub(crate) max_records: usize,
    pub(crate) path: Option<PathBuf>,
}

impl fmt::Debug for Bsp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded: Vec<usize> = (0..self.slots.len())
            .filter(|slot| self.is_loaded(*slot))
            .collect();
        f.debug_struct("Bsp")
            .field("map_type", &self.map_type)
            .field("lump_count", &self.infos.len())
            .field("loaded", &loaded)
            .field("encrypted", &self.key.is_some())
            .field("path", &self.path)
            .finish()
    }
}

impl Bsp {
    /// An empty container of the given variant.
    pub fn new(map_type: MapType) -> BspResult<Self> {
        let header = header_layout(map_type)
            .ok_or_else(|| BspError::unsupported("header", map_type, 0))?;
        let signature = signature(map_type)
            .ok_or_else(|| BspError::unsupported("header", map_type, 0))?;
        let mut prefix = vec![0u8; header.prefix];
        match signature.ident {
            Some(ident) => {
                prefix[0..4].copy_from_slice(&ident);
                prefix[4..8].copy_from_slice(&signature.version.to_le_bytes());
            }
            None => prefix[0..4].copy_from_slice(&signature.version.to_le_bytes()),
        }
        Ok(Self::from_parts(
            map_type,
            header,
            prefix,
            vec![0u8; header.suffix],
            vec![LumpInfo::default(); header.lump_count],
            ByteSource::default(),
        ))
    }

    pub(crate) fn from_parts(
        map_type: MapType,
        header: HeaderLayout,
        prefix: Vec<u8>,
        suffix: Vec<u8>,
        infos: Vec<LumpInfo>,
        source: ByteSource,
    ) -> Self {
        let slots = (0..infos.len()).map(|_| OnceLock::new()).collect();
        let key = source.key;
        Bsp {
            map_type,
            header,
            prefix,
            suffix,
            infos,
            source,
            slots,
            key,
            max_records: DEFAULT_MAX_RECORDS,
            path: None,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> BspResult<Self> {
        crate::reader::read_bytes(data, &ReaderOptions::default())
    }

    pub fn open(path: impl AsRef<Path>) -> BspResult<Self> {
        crate::reader::read_file(path.as_ref(), &ReaderOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: &ReaderOptions) -> BspResult<Self> {
        crate::reader::read_file(path.as_ref(), options)
    }

    /// Serialises the container, re-encrypting when a key is set.
    pub fn to_bytes(&self) -> BspResult<Vec<u8>> {
        crate::writer::write_bytes(self)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> BspResult<()> {
        crate::writer::write_file(self, path.as_ref())
    }

    pub fn map_type(&self) -> MapType {
        self.map_type
    }

    pub fn header_layout(&self) -> HeaderLayout {
        self.header
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn lump_count(&self) -> usize {
        self.infos.len()
    }

    pub fn lump_info(&self, slot: usize) -> Option<&LumpInfo> {
        self.infos.get(slot)
    }

    pub fn lump_infos(&self) -> &[LumpInfo] {
        &self.infos
    }

    pub fn is_loaded(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|cell| cell.get().is_some())
    }

    pub fn encryption_key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Sets or clears the key used to encrypt written output. Stored lumps
    /// are still decrypted with the key the file was read with.
    pub fn set_encryption_key(&mut self, key: Option<Key>) {
        self.key = key;
    }

    pub fn context(&self, slot: usize) -> LumpContext {
        let version = self.infos.get(slot).map(|info| info.version).unwrap_or(0);
        LumpContext::new(self.map_type, version)
    }

    /// Directory slot holding `kind`, or `UnsupportedLayout` if the variant
    /// has no such lump.
    pub fn slot_of(&self, kind: LumpKind) -> BspResult<usize> {
        lump_index(kind, self.map_type)
            .ok_or_else(|| BspError::unsupported(kind.name(), self.map_type, 0))
    }

    fn check_slot(&self, slot: usize) -> BspResult<()> {
        if slot >= self.slots.len() {
            return Err(BspError::MalformedHeader(format!(
                "slot {} is outside the {}-entry directory",
                slot,
                self.slots.len()
            )));
        }
        Ok(())
    }

    /// Bytes of `slot` as stored in the file or its lump file, decrypted.
    pub fn raw_lump(&self, slot: usize) -> BspResult<Vec<u8>> {
        self.check_slot(slot)?;
        self.source.read(slot, &self.infos[slot])
    }

    /// Current encoding of `slot`: the codec output when loaded, otherwise
    /// the stored bytes.
    pub fn lump_bytes(&self, slot: usize) -> BspResult<Vec<u8>> {
        self.check_slot(slot)?;
        match self.slots[slot].get() {
            Some(lump) => lump.emit_dyn(self.context(slot), self.infos[slot].offset),
            None => self.raw_lump(slot),
        }
    }

    pub fn lump_at<L: LoadableLump>(&self, slot: usize) -> BspResult<&L> {
        self.check_slot(slot)?;
        let cell = &self.slots[slot];
        if let Some(existing) = cell.get() {
            return downcast(&**existing, slot);
        }
        let bytes = self.raw_lump(slot)?;
        let loaded = L::load(&bytes, self.context(slot), &self.infos[slot], self.max_records)?;
        tracing::debug!(slot, lump = L::NAME, bytes = bytes.len(), "loaded lump");
        let stored = cell.get_or_init(|| Box::new(loaded));
        downcast(&**stored, slot)
    }

    pub fn lump_at_mut<L: LoadableLump>(&mut self, slot: usize) -> BspResult<&mut L> {
        self.lump_at::<L>(slot)?;
        self.slots[slot]
            .get_mut()
            .and_then(|lump| lump.as_any_mut().downcast_mut::<L>())
            .ok_or(BspError::LumpTypeMismatch { slot })
    }

    fn kind_slot<L: LoadableLump>(&self) -> BspResult<usize> {
        match L::KIND {
            Some(kind) => self.slot_of(kind),
            None => Err(BspError::unsupported(L::NAME, self.map_type, 0)),
        }
    }

    pub fn lump<L: LoadableLump>(&self) -> BspResult<&L> {
        self.lump_at(self.kind_slot::<L>()?)
    }

    pub fn lump_mut<L: LoadableLump>(&mut self) -> BspResult<&mut L> {
        let slot = self.kind_slot::<L>()?;
        self.lump_at_mut(slot)
    }

    /// Installs `lump` as the authoritative content of `slot`.
    pub fn replace_lump<L: LoadableLump>(&mut self, slot: usize, lump: L) -> BspResult<()> {
        self.check_slot(slot)?;
        self.slots[slot] = OnceLock::from(Box::new(lump) as Box<dyn DynLump>);
        Ok(())
    }

    /// Drops the decoded form of `slot` so the next access reads the source.
    pub fn unload(&mut self, slot: usize) {
        if let Some(cell) = self.slots.get_mut(slot) {
            *cell = OnceLock::new();
        }
    }

    pub fn planes(&self) -> BspResult<&Lump<Plane>> {
        self.lump()
    }

    pub fn vertices(&self) -> BspResult<&Lump<Vertex>> {
        self.lump()
    }

    pub fn textures(&self) -> BspResult<&Lump<Texture>> {
        self.lump()
    }

    pub fn texture_info(&self) -> BspResult<&Lump<TextureInfo>> {
        self.lump()
    }

    pub fn visibility(&self) -> BspResult<&Visibility> {
        self.lump()
    }

    pub fn game_lump(&self) -> BspResult<&GameLump> {
        self.lump()
    }

    pub fn game_lump_mut(&mut self) -> BspResult<&mut GameLump> {
        self.lump_mut()
    }

    /// Entity text, without the trailing NUL.
    pub fn entities(&self) -> BspResult<String> {
        let slot = self.slot_of(LumpKind::Entities)?;
        let bytes = self.lump_bytes(slot)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    pub fn set_entities(&mut self, text: &str) -> BspResult<()> {
        let slot = self.slot_of(LumpKind::Entities)?;
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.replace_lump(slot, RawLump(bytes))
    }

    /// Decodes every typed lump the variant has, stopping at the first error.
    pub fn load_all(&self) -> BspResult<()> {
        for kind in LumpKind::ALL {
            if lump_index(kind, self.map_type).is_none() {
                continue;
            }
            match kind {
                LumpKind::Entities => self.lump_at::<RawLump>(self.slot_of(kind)?).map(drop)?,
                LumpKind::Planes => self.planes().map(drop)?,
                LumpKind::Textures => self.textures().map(drop)?,
                LumpKind::Vertices => self.vertices().map(drop)?,
                LumpKind::Visibility => self.visibility().map(drop)?,
                LumpKind::TextureInfo => self.texture_info().map(drop)?,
                LumpKind::GameLump => {
                    let ctx = self.context(self.slot_of(kind)?);
                    self.game_lump()?.load_all(ctx)?
                }
            }
        }
        Ok(())
    }
}

fn downcast<L: LoadableLump>(lump: &dyn DynLump, slot: usize) -> BspResult<&L> {
    lump.as_any()
        .downcast_ref::<L>()
        .ok_or(BspError::LumpTypeMismatch { slot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use crate::records::plane::PLANE_Z;

    #[test]
    fn new_container_has_empty_slots() {
        let bsp = Bsp::new(MapType::QUAKE2).expect("new");
        assert_eq!(bsp.lump_count(), 19);
        assert!(bsp.planes().expect("planes").is_empty());
        assert!(bsp.is_loaded(1));
        assert!(!bsp.is_loaded(0));
        assert!(matches!(
            bsp.textures(),
            Err(BspError::UnsupportedLayout { .. })
        ));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let bsp = Bsp::new(MapType::QUAKE3).expect("new");
        bsp.lump_at::<Lump<Vector3>>(2).expect("vectors");
        let err = bsp.planes().expect_err("mismatch");
        assert!(matches!(err, BspError::LumpTypeMismatch { slot: 2 }));
    }

    #[test]
    fn replace_and_mutate() {
        let mut bsp = Bsp::new(MapType::SOURCE20).expect("new");
        bsp.replace_lump(1, Lump::from_vec(vec![Plane::new(Vector3::new(0.0, 0.0, 1.0), 0.0)]))
            .expect("replace");
        bsp.lump_mut::<Lump<Plane>>()
            .expect("planes")
            .push(Plane::new(Vector3::new(0.0, 0.0, 1.0), 64.0));
        let planes = bsp.planes().expect("planes");
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[1].plane_type, PLANE_Z);
        assert_eq!(bsp.lump_bytes(1).expect("bytes").len(), 40);
    }

    #[test]
    fn entities_round_trip_through_raw_slot() {
        let mut bsp = Bsp::new(MapType::BLUE_SHIFT).expect("new");
        bsp.set_entities("{\n\"classname\" \"worldspawn\"\n}\n").expect("set");
        assert_eq!(bsp.slot_of(LumpKind::Entities).expect("slot"), 1);
        assert!(bsp.entities().expect("text").starts_with("{\n\"classname\""));
    }

    #[test]
    fn out_of_range_slot() {
        let bsp = Bsp::new(MapType::QUAKE).expect("new");
        assert!(matches!(
            bsp.raw_lump(15),
            Err(BspError::MalformedHeader(_))
        ));
    }

    #[test]
    fn container_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Bsp>();

        let bsp = Bsp::new(MapType::QUAKE3).expect("new");
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    assert!(bsp.planes().expect("planes").is_empty());
                });
            }
        });
        assert!(bsp.is_loaded(2));
    }

    #[test]
    fn undefined_has_no_header() {
        assert!(Bsp::new(MapType::UNDEFINED).is_err());
    }
}
