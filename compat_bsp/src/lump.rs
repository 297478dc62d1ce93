//! Typed lump container and the codec trait every record implements.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use crate::error::{BspError, BspResult, Truncation};
use crate::layout::LumpKind;
use crate::map_type::MapType;

/// Records above this count are refused unless the reader raises the limit.
pub const DEFAULT_MAX_RECORDS: usize = 4_000_000;

/// What a codec needs to pick a layout: the file variant and the lump's own
/// version field (zero where the directory has none).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LumpContext {
    pub map_type: MapType,
    pub version: i32,
}

impl LumpContext {
    pub const fn new(map_type: MapType, version: i32) -> Self {
        Self { map_type, version }
    }
}

impl From<MapType> for LumpContext {
    fn from(map_type: MapType) -> Self {
        LumpContext::new(map_type, 0)
    }
}

/// One directory row, or one game lump row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LumpInfo {
    /// Four-character code for Source rows, sub-lump id for game lump rows.
    pub ident: i32,
    pub flags: i32,
    pub version: i32,
    pub offset: usize,
    pub length: usize,
    /// Set when the bytes come from an external lump file.
    pub override_file: Option<PathBuf>,
}

impl LumpInfo {
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Codec for one record type.
///
/// Fixed-size layouts only implement [`LumpObject::decode`] and
/// [`LumpObject::encode`]; variable-length lumps override the whole-lump
/// methods as well.
pub trait LumpObject: Sized + Clone + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
    /// Slot in the directory, for records that own one.
    const KIND: Option<LumpKind> = None;

    type Layout: Copy + PartialEq + fmt::Debug;

    fn layout(ctx: LumpContext) -> Option<Self::Layout>;

    /// Encoded size of one record, `None` when it varies per record.
    fn struct_length(layout: Self::Layout) -> Option<usize>;

    fn decode(bytes: &[u8], layout: Self::Layout) -> BspResult<Self>;

    fn encode(&self, layout: Self::Layout, out: &mut Vec<u8>);

    fn decode_lump(bytes: &[u8], layout: Self::Layout) -> BspResult<Vec<Self>> {
        let Some(stride) = Self::struct_length(layout) else {
            return Ok(vec![Self::decode(bytes, layout)?]);
        };
        if stride == 0 || bytes.len() % stride != 0 {
            return Err(BspError::truncated(
                Self::NAME,
                Truncation::PartialRecord {
                    length: bytes.len(),
                    stride,
                },
            ));
        }
        bytes
            .chunks_exact(stride)
            .map(|chunk| Self::decode(chunk, layout))
            .collect()
    }

    fn encode_lump(items: &[Self], layout: Self::Layout, out: &mut Vec<u8>) {
        for item in items {
            item.encode(layout, out);
        }
    }

    /// Declared record count of an encoded lump, checked before decoding.
    fn record_count(bytes: &[u8], layout: Self::Layout) -> usize {
        match Self::struct_length(layout) {
            Some(stride) if stride > 0 => bytes.len() / stride,
            _ => 0,
        }
    }
}

pub(crate) fn require_layout<T: LumpObject>(ctx: LumpContext) -> BspResult<T::Layout> {
    T::layout(ctx).ok_or_else(|| BspError::unsupported(T::NAME, ctx.map_type, ctx.version))
}

/// Checks that a fixed-size record slice is long enough before fields are read.
pub(crate) fn require_len(name: &'static str, bytes: &[u8], expected: usize) -> BspResult<()> {
    if bytes.len() < expected {
        return Err(BspError::truncated(
            name,
            Truncation::ShortRecord {
                expected,
                actual: bytes.len(),
            },
        ));
    }
    Ok(())
}

/// An ordered list of records plus the directory row they came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Lump<T> {
    info: LumpInfo,
    items: Vec<T>,
}

impl<T> Default for Lump<T> {
    fn default() -> Self {
        Self {
            info: LumpInfo::default(),
            items: Vec::new(),
        }
    }
}

impl<T: LumpObject> Lump<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            info: LumpInfo::default(),
            items,
        }
    }

    pub fn decode(bytes: &[u8], ctx: LumpContext, info: LumpInfo) -> BspResult<Self> {
        Self::decode_limited(bytes, ctx, info, DEFAULT_MAX_RECORDS)
    }

    pub fn decode_limited(
        bytes: &[u8],
        ctx: LumpContext,
        info: LumpInfo,
        max_records: usize,
    ) -> BspResult<Self> {
        let layout = require_layout::<T>(ctx)?;
        let count = T::record_count(bytes, layout);
        if count > max_records {
            return Err(BspError::LumpTooLarge {
                lump: T::NAME,
                count,
                limit: max_records,
            });
        }
        let items = if bytes.is_empty() {
            Vec::new()
        } else {
            T::decode_lump(bytes, layout)?
        };
        Ok(Self { info, items })
    }

    pub fn serialized_length(&self, ctx: LumpContext) -> BspResult<usize> {
        let layout = require_layout::<T>(ctx)?;
        match T::struct_length(layout) {
            Some(stride) => Ok(stride * self.items.len()),
            None => Ok(self.encode_with(layout).len()),
        }
    }

    pub fn emit(&self, ctx: LumpContext) -> BspResult<Vec<u8>> {
        let layout = require_layout::<T>(ctx)?;
        Ok(self.encode_with(layout))
    }

    fn encode_with(&self, layout: T::Layout) -> Vec<u8> {
        let capacity = T::struct_length(layout).unwrap_or(0) * self.items.len();
        let mut out = Vec::with_capacity(capacity);
        T::encode_lump(&self.items, layout, &mut out);
        out
    }
}

impl<T> Lump<T> {
    pub fn info(&self) -> &LumpInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut LumpInfo {
        &mut self.info
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn insert(&mut self, index: usize, item: T) {
        self.items.insert(index, item);
    }

    pub fn remove(&mut self, index: usize) -> T {
        self.items.remove(index)
    }

    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        self.items.sort_by(compare);
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Deref for Lump<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for Lump<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<'a, T> IntoIterator for &'a Lump<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Copies raw record bytes between variants. Only allowed when both sides
/// share a layout; anything else has to go through [`transcode`].
pub fn copy_raw<T: LumpObject>(
    bytes: &[u8],
    from: LumpContext,
    to: LumpContext,
) -> BspResult<Vec<u8>> {
    let source = require_layout::<T>(from)?;
    let target = require_layout::<T>(to)?;
    if source != target {
        return Err(BspError::IncompatibleCopy {
            record: T::NAME,
            from: from.map_type,
            to: to.map_type,
        });
    }
    Ok(bytes.to_vec())
}

/// Decodes with one variant's layout and re-encodes with another's.
pub fn transcode<T: LumpObject>(
    bytes: &[u8],
    from: LumpContext,
    to: LumpContext,
) -> BspResult<Vec<u8>> {
    let lump = Lump::<T>::decode(bytes, from, LumpInfo::default())?;
    lump.emit(to)
}
