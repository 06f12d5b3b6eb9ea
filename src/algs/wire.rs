//! Fixed little-endian wire records and a small framing codec.
//!
//! All multi-byte integers in these structs are little-endian on the wire:
//! constructors store them with `.to_le()`, accessors decode with
//! `.from_le()`. Records are `Pod`, so a run of them is sent as one
//! `cast_slice`. Variable-size payloads (fragments, sections) are framed by
//! [`WireEncoder`] / [`WireDecoder`] as a sequence of counted record runs
//! and length-prefixed strings.

use crate::mesh_error::MeshSieveError;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Copies `bytes` into a freshly allocated, correctly aligned `Vec<T>`.
pub fn records_from_bytes<T: Pod>(bytes: &[u8], neighbor: usize) -> Result<Vec<T>, MeshSieveError> {
    let sz = size_of::<T>();
    if sz == 0 || bytes.len() % sz != 0 {
        return Err(MeshSieveError::BufferSizeMismatch {
            neighbor,
            expected: bytes.len().next_multiple_of(sz.max(1)),
            got: bytes.len(),
        });
    }
    let mut out = vec![T::zeroed(); bytes.len() / sz];
    cast_slice_mut(&mut out).copy_from_slice(bytes);
    Ok(out)
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}
impl WireCount {
    /// # Errors
    /// [`MeshSieveError::WireCountOverflow`] if `n` does not fit in `u32`.
    pub fn new(n: usize) -> Result<Self, MeshSieveError> {
        let n = u32::try_from(n).map_err(|_| MeshSieveError::WireCountOverflow(n))?;
        Ok(Self { n_le: n.to_le() })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A point shipped with its global id and topological dimension.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireEntity {
    pub id_le: u64,
    pub dim_le: u32,
    pub _pad: u32,
}
impl WireEntity {
    pub fn new(id: u64, dim: u32) -> Self {
        Self {
            id_le: id.to_le(),
            dim_le: dim.to_le(),
            _pad: 0,
        }
    }
    pub fn id(&self) -> u64 {
        u64::from_le(self.id_le)
    }
    pub fn dim(&self) -> u32 {
        u32::from_le(self.dim_le)
    }
}

/// Arrow `(src, dst, orientation)` in global ids.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireArrow {
    pub src_le: u64,
    pub dst_le: u64,
    pub orientation_le: i32,
    pub _pad: u32,
}
impl WireArrow {
    pub fn new(src: u64, dst: u64, orientation: i32) -> Self {
        Self {
            src_le: src.to_le(),
            dst_le: dst.to_le(),
            orientation_le: orientation.to_le(),
            _pad: 0,
        }
    }
    pub fn src(&self) -> u64 {
        u64::from_le(self.src_le)
    }
    pub fn dst(&self) -> u64 {
        u64::from_le(self.dst_le)
    }
    pub fn orientation(&self) -> i32 {
        i32::from_le(self.orientation_le)
    }
}

/// One label entry; `name_le` indexes the payload's name table.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireLabel {
    pub point_le: u64,
    pub value_le: i32,
    pub name_le: u32,
}
impl WireLabel {
    pub fn new(point: u64, name: u32, value: i32) -> Self {
        Self {
            point_le: point.to_le(),
            value_le: value.to_le(),
            name_le: name.to_le(),
        }
    }
    pub fn point(&self) -> u64 {
        u64::from_le(self.point_le)
    }
    pub fn value(&self) -> i32 {
        i32::from_le(self.value_le)
    }
    pub fn name(&self) -> u32 {
        u32::from_le(self.name_le)
    }
}

/// Header of one point's section slice; `len` values follow in the value run.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireSectionEntry {
    pub point_le: u64,
    pub len_le: u64,
}
impl WireSectionEntry {
    pub fn new(point: u64, len: usize) -> Self {
        Self {
            point_le: point.to_le(),
            len_le: (len as u64).to_le(),
        }
    }
    pub fn point(&self) -> u64 {
        u64::from_le(self.point_le)
    }
    pub fn len(&self) -> usize {
        u64::from_le(self.len_le) as usize
    }
}

/// A pair of point handles: `(sender-side, receiver-side)` or `(global id, local)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct WireLink {
    pub a_le: u64,
    pub b_le: u64,
}
impl WireLink {
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            a_le: a.to_le(),
            b_le: b.to_le(),
        }
    }
    pub fn a(&self) -> u64 {
        u64::from_le(self.a_le)
    }
    pub fn b(&self) -> u64 {
        u64::from_le(self.b_le)
    }
}

/// Rank-qualified point name `(owner rank, handle on owner)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct WireName {
    pub rank_le: u32,
    pub dim_le: u32,
    pub point_le: u64,
}
impl WireName {
    pub fn new(rank: usize, dim: u32, point: u64) -> Self {
        Self {
            rank_le: (rank as u32).to_le(),
            dim_le: dim.to_le(),
            point_le: point.to_le(),
        }
    }
    pub fn rank(&self) -> usize {
        u32::from_le(self.rank_le) as usize
    }
    pub fn dim(&self) -> u32 {
        u32::from_le(self.dim_le)
    }
    pub fn point(&self) -> u64 {
        u64::from_le(self.point_le)
    }
}

/// Arrow between two rank-qualified names.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireNamedArrow {
    pub src: WireName,
    pub dst: WireName,
    pub orientation_le: i32,
    pub _pad: u32,
}
impl WireNamedArrow {
    pub fn new(src: WireName, dst: WireName, orientation: i32) -> Self {
        Self {
            src,
            dst,
            orientation_le: orientation.to_le(),
            _pad: 0,
        }
    }
    pub fn orientation(&self) -> i32 {
        i32::from_le(self.orientation_le)
    }
}

/// `f64` carried as its little-endian bit pattern.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireF64(pub u64);
impl WireF64 {
    pub fn new(v: f64) -> Self {
        Self(v.to_bits().to_le())
    }
    pub fn get(&self) -> f64 {
        f64::from_bits(u64::from_le(self.0))
    }
}

/// Builds a framed payload.
///
/// The first count that does not fit the wire format is kept and reported by
/// [`finish`](Self::finish); later writes are dropped.
#[derive(Debug, Default)]
pub struct WireEncoder {
    buf: Vec<u8>,
    error: Option<MeshSieveError>,
}

impl WireEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_count(&mut self, n: usize) {
        if self.error.is_some() {
            return;
        }
        match WireCount::new(n) {
            Ok(c) => self.buf.extend_from_slice(cast_slice(&[c])),
            Err(e) => self.error = Some(e),
        }
    }

    /// Count followed by the records.
    pub fn put_records<T: Pod>(&mut self, recs: &[T]) {
        self.put_count(recs.len());
        if self.error.is_none() {
            self.buf.extend_from_slice(cast_slice(recs));
        }
    }

    /// Length-prefixed UTF-8.
    pub fn put_str(&mut self, s: &str) {
        self.put_count(s.len());
        if self.error.is_none() {
            self.buf.extend_from_slice(s.as_bytes());
        }
    }

    pub fn finish(self) -> Result<Vec<u8>, MeshSieveError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.buf),
        }
    }
}

/// Reads a payload framed by [`WireEncoder`].
#[derive(Debug)]
pub struct WireDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    neighbor: usize,
}

impl<'a> WireDecoder<'a> {
    /// `neighbor` is the sending rank, used in error reports.
    pub fn new(buf: &'a [u8], neighbor: usize) -> Self {
        Self {
            buf,
            pos: 0,
            neighbor,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MeshSieveError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len()).ok_or(
            MeshSieveError::BufferSizeMismatch {
                neighbor: self.neighbor,
                expected: self.pos.saturating_add(n),
                got: self.buf.len(),
            },
        )?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn count(&mut self) -> Result<usize, MeshSieveError> {
        let raw = self.take(size_of::<WireCount>())?;
        let c: Vec<WireCount> = records_from_bytes(raw, self.neighbor)?;
        Ok(c[0].get())
    }

    pub fn records<T: Pod>(&mut self) -> Result<Vec<T>, MeshSieveError> {
        let n = self.count()?;
        let bytes = self.take(n.saturating_mul(size_of::<T>()))?;
        records_from_bytes(bytes, self.neighbor)
    }

    pub fn string(&mut self) -> Result<String, MeshSieveError> {
        let n = self.count()?;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| MeshSieveError::CommError {
            neighbor: self.neighbor,
            message: format!("invalid UTF-8 in payload: {e}"),
        })
    }

    /// Errors unless every byte was consumed.
    pub fn finish(self) -> Result<(), MeshSieveError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(MeshSieveError::BufferSizeMismatch {
                neighbor: self.neighbor,
                expected: self.pos,
                got: self.buf.len(),
            })
        }
    }
}
