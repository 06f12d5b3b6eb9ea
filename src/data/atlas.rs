//! Atlas: Mapping mesh points to contiguous slices in a flat data array.
//!
//! The `Atlas` struct provides a bijective mapping between topological
//! points (`PointId`) and sub-slices of a flat buffer, so that per-point
//! values (coordinates, volume constraints, field data) can be stored and
//! shipped between ranks as one contiguous `Vec`.

use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;
use std::collections::HashMap;

/// `Atlas` maintains:
/// - a lookup `map` from each `PointId` to its `(offset, len)`,
/// - an `order` vector preserving insertion order for deterministic iteration,
/// - and `total_len` tracking the next free offset.
///
/// # Invariants
/// - Each point appears exactly once in `order`.
/// - `map` contains precisely the keys listed in `order`.
/// - Every slice has `len > 0`.
/// - Offsets are contiguous in insertion order.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Atlas {
    map: HashMap<PointId, (usize, usize)>,
    order: Vec<PointId>,
    total_len: usize,
}

impl Atlas {
    /// Insert a brand-new point `p` with a slice of length `len`.
    ///
    /// Returns the starting offset of the slice.
    ///
    /// # Errors
    /// [`MeshSieveError::ZeroLengthSlice`] if `len == 0`,
    /// [`MeshSieveError::DuplicatePoint`] if `p` was already present.
    ///
    /// ```rust
    /// # fn try_main() -> Result<(), sieve_plex::mesh_error::MeshSieveError> {
    /// use sieve_plex::data::atlas::Atlas;
    /// use sieve_plex::topology::point::PointId;
    /// let mut atlas = Atlas::default();
    /// let offset = atlas.try_insert(PointId::new(7)?, 3)?;
    /// assert_eq!(offset, 0);
    /// assert_eq!(atlas.total_len(), 3);
    /// # Ok(())
    /// # }
    /// # try_main().unwrap();
    /// ```
    pub fn try_insert(&mut self, p: PointId, len: usize) -> Result<usize, MeshSieveError> {
        if len == 0 {
            return Err(MeshSieveError::ZeroLengthSlice);
        }
        if self.map.contains_key(&p) {
            return Err(MeshSieveError::DuplicatePoint(p));
        }
        let offset = self.total_len;
        self.map.insert(p, (offset, len));
        self.order.push(p);
        self.total_len += len;
        Ok(offset)
    }

    /// Slice descriptor `(offset, len)` for `p`.
    #[inline]
    pub fn get(&self, p: PointId) -> Option<(usize, usize)> {
        self.map.get(&p).copied()
    }

    #[inline]
    pub fn contains(&self, p: PointId) -> bool {
        self.map.contains_key(&p)
    }

    /// Number of registered points (not values; see [`total_len`](Self::total_len)).
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total number of values over all slices.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Points in insertion order.
    pub fn points(&self) -> impl Iterator<Item = PointId> + '_ {
        self.order.iter().copied()
    }

    /// `(point, (offset, len))` in insertion order.
    pub fn iter_entries(&self) -> impl Iterator<Item = (PointId, (usize, usize))> + '_ {
        self.order.iter().map(move |&p| (p, self.map[&p]))
    }
}
