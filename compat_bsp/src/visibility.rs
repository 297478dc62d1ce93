//! Potentially visible set storage and its zero-run compression.
//!
//! A compressed row copies non-zero bytes through and replaces each run of
//! zero bytes by a `0` followed by the run length (at most 255).

use crate::bytes::{i32_from_len, read_i32_le, write_i32};
use crate::error::{check_range, read_count, BspError, BspResult, Truncation};
use crate::layout::{lookup, VisibilityLayout, VISIBILITY_LAYOUTS};
use crate::lump::{require_len, LumpContext};

const NAME: &str = "visibility";

pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] != 0 {
            out.push(data[i]);
            i += 1;
            continue;
        }
        let mut run = 0u8;
        while i < data.len() && data[i] == 0 && run < u8::MAX {
            run += 1;
            i += 1;
        }
        out.push(0);
        out.push(run);
    }
    out
}

pub fn decompress(data: &[u8]) -> BspResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        if data[i] != 0 {
            out.push(data[i]);
            i += 1;
            continue;
        }
        let Some(&run) = data.get(i + 1) else {
            return Err(BspError::truncated(NAME, Truncation::DanglingRun { offset: i }));
        };
        out.resize(out.len() + run as usize, 0);
        i += 2;
    }
    Ok(out)
}

/// Decodes one row starting at `start`. Stops once `row_len` bytes exist;
/// a run reaching past the row is clamped.
pub fn decompress_row(data: &[u8], start: usize, row_len: usize) -> BspResult<Vec<u8>> {
    let mut out = Vec::with_capacity(row_len);
    let mut i = start;
    while out.len() < row_len {
        let Some(&byte) = data.get(i) else {
            return Err(BspError::truncated(
                NAME,
                Truncation::OutOfBounds {
                    offset: start,
                    length: i - start,
                    available: data.len(),
                },
            ));
        };
        if byte != 0 {
            out.push(byte);
            i += 1;
            continue;
        }
        let Some(&run) = data.get(i + 1) else {
            return Err(BspError::truncated(NAME, Truncation::DanglingRun { offset: i }));
        };
        let run = (run as usize).min(row_len - out.len());
        out.resize(out.len() + run, 0);
        i += 2;
    }
    Ok(out)
}

/// Bit `cluster` of a decompressed row.
pub fn row_bit(row: &[u8], cluster: usize) -> bool {
    row.get(cluster / 8)
        .is_some_and(|byte| byte & (1 << (cluster % 8)) != 0)
}

/// Bytes needed for one row over `clusters` clusters.
pub fn row_length(clusters: usize) -> usize {
    clusters.div_ceil(8)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// Compressed rows addressed by offsets stored elsewhere (leaves).
    Raw { data: Vec<u8> },
    /// Per-cluster `[pvs, pas]` offsets relative to the lump start, followed by
    /// the compressed rows they point into.
    Clusters { offsets: Vec<[i32; 2]>, data: Vec<u8> },
    /// Uncompressed rows of `bytes_per_cluster` bytes.
    Quake3 {
        cluster_count: usize,
        bytes_per_cluster: usize,
        rows: Vec<u8>,
    },
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Raw { data: Vec::new() }
    }
}

impl Visibility {
    pub fn layout(ctx: LumpContext) -> Option<VisibilityLayout> {
        lookup(VISIBILITY_LAYOUTS, ctx.map_type)
    }

    pub fn decode(bytes: &[u8], ctx: LumpContext) -> BspResult<Self> {
        let layout = Self::layout(ctx)
            .ok_or_else(|| BspError::unsupported(NAME, ctx.map_type, ctx.version))?;
        Self::decode_layout(bytes, layout)
    }

    pub fn decode_layout(bytes: &[u8], layout: VisibilityLayout) -> BspResult<Self> {
        match layout {
            VisibilityLayout::Raw => Ok(Visibility::Raw {
                data: bytes.to_vec(),
            }),
            VisibilityLayout::Clusters => {
                if bytes.is_empty() {
                    return Ok(Visibility::Clusters {
                        offsets: Vec::new(),
                        data: Vec::new(),
                    });
                }
                require_len(NAME, bytes, 4)?;
                let count = read_count(NAME, read_i32_le(&bytes[0..4]))?;
                let table_len = count
                    .checked_mul(8)
                    .and_then(|len| len.checked_add(4))
                    .unwrap_or(usize::MAX);
                let table = check_range(NAME, 0, table_len, bytes.len())?;
                let offsets = bytes[4..table.end]
                    .chunks_exact(8)
                    .map(|pair| [read_i32_le(&pair[0..4]), read_i32_le(&pair[4..8])])
                    .collect();
                Ok(Visibility::Clusters {
                    offsets,
                    data: bytes[table.end..].to_vec(),
                })
            }
            VisibilityLayout::Quake3 => {
                if bytes.is_empty() {
                    return Ok(Visibility::Quake3 {
                        cluster_count: 0,
                        bytes_per_cluster: 0,
                        rows: Vec::new(),
                    });
                }
                require_len(NAME, bytes, 8)?;
                let count = read_count(NAME, read_i32_le(&bytes[0..4]))?;
                let bytes_per_cluster = read_count(NAME, read_i32_le(&bytes[4..8]))?;
                let rows_len = count.checked_mul(bytes_per_cluster).unwrap_or(usize::MAX);
                let rows = check_range(NAME, 8, rows_len, bytes.len())?;
                Ok(Visibility::Quake3 {
                    cluster_count: count,
                    bytes_per_cluster,
                    rows: bytes[rows].to_vec(),
                })
            }
        }
    }

    /// Builds a cluster table from uncompressed PVS and PAS rows.
    pub fn from_cluster_rows(pvs: &[Vec<u8>], pas: &[Vec<u8>]) -> Self {
        let header = 4 + pvs.len() * 8;
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(pvs.len());
        for (i, row) in pvs.iter().enumerate() {
            let pvs_offset = i32_from_len(header + data.len());
            data.extend(compress(row));
            let pas_offset = match pas.get(i) {
                Some(row) => {
                    let at = i32_from_len(header + data.len());
                    data.extend(compress(row));
                    at
                }
                None => pvs_offset,
            };
            offsets.push([pvs_offset, pas_offset]);
        }
        Visibility::Clusters { offsets, data }
    }

    pub fn from_quake3_rows(rows: &[Vec<u8>]) -> Self {
        let bytes_per_cluster = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut flat = Vec::with_capacity(rows.len() * bytes_per_cluster);
        for row in rows {
            flat.extend_from_slice(row);
            flat.resize(flat.len() + bytes_per_cluster - row.len(), 0);
        }
        Visibility::Quake3 {
            cluster_count: rows.len(),
            bytes_per_cluster,
            rows: flat,
        }
    }

    pub fn cluster_count(&self) -> usize {
        match self {
            Visibility::Raw { .. } => 0,
            Visibility::Clusters { offsets, .. } => offsets.len(),
            Visibility::Quake3 { cluster_count, .. } => *cluster_count,
        }
    }

    /// Decompressed PVS row of `cluster`.
    pub fn pvs(&self, cluster: usize) -> BspResult<Vec<u8>> {
        self.row(cluster, 0)
    }

    /// Decompressed PAS row of `cluster`; Quake 3 maps carry no PAS.
    pub fn pas(&self, cluster: usize) -> BspResult<Vec<u8>> {
        self.row(cluster, 1)
    }

    fn row(&self, cluster: usize, which: usize) -> BspResult<Vec<u8>> {
        match self {
            Visibility::Raw { .. } => Ok(Vec::new()),
            Visibility::Clusters { offsets, data } => {
                let Some(pair) = offsets.get(cluster) else {
                    return Ok(Vec::new());
                };
                let header = 4 + offsets.len() * 8;
                let start = usize::try_from(pair[which])
                    .ok()
                    .and_then(|offset| offset.checked_sub(header))
                    .ok_or_else(|| {
                        BspError::truncated(
                            NAME,
                            Truncation::OutOfBounds {
                                offset: 0,
                                length: 0,
                                available: data.len(),
                            },
                        )
                    })?;
                decompress_row(data, start, row_length(offsets.len()))
            }
            Visibility::Quake3 {
                cluster_count,
                bytes_per_cluster,
                rows,
            } => {
                if which == 1 || cluster >= *cluster_count {
                    return Ok(Vec::new());
                }
                let start = cluster * bytes_per_cluster;
                let range = check_range(NAME, start, *bytes_per_cluster, rows.len())?;
                Ok(rows[range].to_vec())
            }
        }
    }

    /// Compressed row at a leaf's visibility offset (Quake family).
    pub fn raw_row(&self, offset: usize, row_len: usize) -> BspResult<Vec<u8>> {
        match self {
            Visibility::Raw { data } => decompress_row(data, offset, row_len),
            _ => Ok(Vec::new()),
        }
    }

    pub fn can_see(&self, from: usize, to: usize) -> BspResult<bool> {
        Ok(row_bit(&self.pvs(from)?, to))
    }

    pub fn emit(&self) -> Vec<u8> {
        match self {
            Visibility::Raw { data } => data.clone(),
            Visibility::Clusters { offsets, data } => {
                if offsets.is_empty() && data.is_empty() {
                    return Vec::new();
                }
                let mut out = Vec::with_capacity(4 + offsets.len() * 8 + data.len());
                write_i32(&mut out, i32_from_len(offsets.len()));
                for [pvs, pas] in offsets {
                    write_i32(&mut out, *pvs);
                    write_i32(&mut out, *pas);
                }
                out.extend_from_slice(data);
                out
            }
            Visibility::Quake3 {
                cluster_count,
                bytes_per_cluster,
                rows,
            } => {
                if *cluster_count == 0 && rows.is_empty() {
                    return Vec::new();
                }
                let mut out = Vec::with_capacity(8 + rows.len());
                write_i32(&mut out, i32_from_len(*cluster_count));
                write_i32(&mut out, i32_from_len(*bytes_per_cluster));
                out.extend_from_slice(rows);
                out
            }
        }
    }
}
