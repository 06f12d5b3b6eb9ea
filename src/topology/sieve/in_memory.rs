//! In-memory implementation of the [`Sieve`] trait.
//!
//! [`InMemorySieve`] stores every arrow once, in an arena, and keeps two
//! per-point index lists (by target for cones, by source for supports) that
//! point into the arena. Cone and support are therefore views over a single
//! arrow list and always agree with each other.
//!
//! Every point also carries an optional topological dimension. When both
//! endpoints of an arrow declare one, the source must be of strictly lower
//! dimension than the target.

use super::sieve_trait::Sieve;
use crate::mesh_error::MeshSieveError;
use crate::topology::arrow::Arrow;
use crate::topology::point::PointId;
use crate::topology::sieve::strata::{StrataCache, compute_strata};
use once_cell::sync::OnceCell;
use std::collections::{BTreeSet, HashMap};

const NO_ARROWS: &[usize] = &[];

/// Arena-backed incidence store.
#[derive(Clone, Debug, Default)]
pub struct InMemorySieve {
    arrows: Vec<Arrow>,
    /// target → arena indices, insertion order.
    cone_index: HashMap<PointId, Vec<usize>>,
    /// source → arena indices, insertion order.
    support_index: HashMap<PointId, Vec<usize>>,
    points: BTreeSet<PointId>,
    dims: HashMap<PointId, u8>,
    strata: OnceCell<StrataCache>,
}

/// Iterator over one point's arrows, yielding the opposite endpoint.
pub struct IncidenceIter<'a> {
    arrows: &'a [Arrow],
    idx: std::slice::Iter<'a, usize>,
    towards_source: bool,
}

impl Iterator for IncidenceIter<'_> {
    type Item = (PointId, i32);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.idx.next().map(|&i| {
            let a = &self.arrows[i];
            let q = if self.towards_source { a.src } else { a.dst };
            (q, a.orientation)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.idx.size_hint()
    }
}

impl InMemorySieve {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a store from `(src, dst, orientation)` triples.
    ///
    /// ```rust
    /// use sieve_plex::topology::point::PointId;
    /// use sieve_plex::topology::sieve::{InMemorySieve, Sieve};
    /// let p = |u| PointId::new(u).unwrap();
    /// let s = InMemorySieve::from_arrows([(p(1), p(3), 0), (p(2), p(3), 0)]).unwrap();
    /// assert_eq!(s.cone_points(p(3)), vec![p(1), p(2)]);
    /// ```
    pub fn from_arrows<I>(arrows: I) -> Result<Self, MeshSieveError>
    where
        I: IntoIterator<Item = (PointId, PointId, i32)>,
    {
        let mut sieve = Self::default();
        for (src, dst, o) in arrows {
            sieve.add_arrow(src, dst, o)?;
        }
        Ok(sieve)
    }

    /// Declares `p` with topological dimension `dim`.
    ///
    /// Re-declaring with the same dimension is a no-op.
    ///
    /// # Errors
    /// [`MeshSieveError::DimensionMismatch`] if `p` was declared with another
    /// dimension, or if the new dimension contradicts an existing arrow.
    pub fn add_point(&mut self, p: PointId, dim: u8) -> Result<(), MeshSieveError> {
        match self.dims.get(&p) {
            Some(&d) if d == dim => return Ok(()),
            Some(&d) => {
                return Err(MeshSieveError::DimensionMismatch {
                    point: p,
                    message: format!("declared as dimension {d}, redeclared as {dim}"),
                });
            }
            None => {}
        }
        for (q, _) in self.cone(p) {
            if self.dims.get(&q).is_some_and(|&dq| dq >= dim) {
                return Err(Self::dim_error(q, p, self.dims[&q], dim));
            }
        }
        for (q, _) in self.support(p) {
            if self.dims.get(&q).is_some_and(|&dq| dq <= dim) {
                return Err(Self::dim_error(p, q, dim, self.dims[&q]));
            }
        }
        self.dims.insert(p, dim);
        self.points.insert(p);
        self.invalidate_strata();
        Ok(())
    }

    /// Inserts the arrow `src → dst` ("`src` is on the boundary of `dst`").
    ///
    /// Returns `true` if a new arrow was stored, `false` if the identical arrow
    /// already existed.
    ///
    /// # Errors
    /// * [`MeshSieveError::SelfLoop`] if `src == dst`.
    /// * [`MeshSieveError::OrientationConflict`] if the arrow exists with a
    ///   different orientation.
    /// * [`MeshSieveError::DimensionMismatch`] if both endpoints have declared
    ///   dimensions and `dim(src) >= dim(dst)`.
    pub fn add_arrow(
        &mut self,
        src: PointId,
        dst: PointId,
        orientation: i32,
    ) -> Result<bool, MeshSieveError> {
        if src == dst {
            return Err(MeshSieveError::SelfLoop(src));
        }
        if let Some(existing) = self.orientation(src, dst) {
            if existing == orientation {
                return Ok(false);
            }
            return Err(MeshSieveError::OrientationConflict {
                src,
                dst,
                existing,
                requested: orientation,
            });
        }
        if let (Some(&ds), Some(&dd)) = (self.dims.get(&src), self.dims.get(&dst)) {
            if ds >= dd {
                return Err(Self::dim_error(src, dst, ds, dd));
            }
        }
        let idx = self.arrows.len();
        self.arrows.push(Arrow::new(src, dst, orientation));
        self.cone_index.entry(dst).or_default().push(idx);
        self.support_index.entry(src).or_default().push(idx);
        self.points.insert(src);
        self.points.insert(dst);
        self.invalidate_strata();
        Ok(true)
    }

    fn dim_error(src: PointId, dst: PointId, ds: u8, dd: u8) -> MeshSieveError {
        MeshSieveError::DimensionMismatch {
            point: src,
            message: format!("arrow {src} (dim {ds}) -> {dst} (dim {dd}) must increase dimension"),
        }
    }

    /// Orientation of the arrow `src → dst`, if present.
    pub fn orientation(&self, src: PointId, dst: PointId) -> Option<i32> {
        let outs = self.support_index.get(&src)?;
        outs.iter()
            .map(|&i| &self.arrows[i])
            .find(|a| a.dst == dst)
            .map(|a| a.orientation)
    }

    #[inline]
    pub fn has_arrow(&self, src: PointId, dst: PointId) -> bool {
        self.orientation(src, dst).is_some()
    }

    /// Declared dimension of `p`.
    #[inline]
    pub fn dimension_of(&self, p: PointId) -> Option<u8> {
        self.dims.get(&p).copied()
    }

    /// All arrows in insertion order.
    pub fn arrows(&self) -> &[Arrow] {
        &self.arrows
    }

    #[inline]
    pub fn num_arrows(&self) -> usize {
        self.arrows.len()
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest handle in use, or 0 for an empty store.
    pub fn max_point(&self) -> u64 {
        self.points.last().map_or(0, |p| p.get())
    }

    // --- stratification -------------------------------------------------

    /// Cached stratification, computed on first use after any mutation.
    ///
    /// # Errors
    /// [`MeshSieveError::CycleDetected`] if the arrows do not form a DAG.
    #[inline]
    pub fn strata(&self) -> Result<&StrataCache, MeshSieveError> {
        self.strata.get_or_try_init(|| compute_strata(self))
    }

    #[inline]
    pub fn invalidate_strata(&mut self) {
        self.strata.take();
    }

    /// Depth of `p` (0 for vertices).
    pub fn depth(&self, p: PointId) -> Result<u32, MeshSieveError> {
        self.strata()?
            .depth_of(p)
            .ok_or(MeshSieveError::MissingPoint(p))
    }

    /// Height of `p` (0 for cells).
    pub fn height(&self, p: PointId) -> Result<u32, MeshSieveError> {
        self.strata()?
            .height_of(p)
            .ok_or(MeshSieveError::MissingPoint(p))
    }

    /// Points of depth `k`, ascending.
    pub fn depth_stratum(&self, k: u32) -> Result<Vec<PointId>, MeshSieveError> {
        Ok(self.strata()?.depth_stratum(k).to_vec())
    }

    /// Points of height `k`, ascending.
    pub fn height_stratum(&self, k: u32) -> Result<Vec<PointId>, MeshSieveError> {
        Ok(self.strata()?.height_stratum(k).to_vec())
    }

    /// Maximum depth over all points (the topological dimension of a
    /// simplicial complex).
    pub fn max_depth(&self) -> Result<u32, MeshSieveError> {
        Ok(self.strata()?.max_depth)
    }
}

impl Sieve for InMemorySieve {
    type ConeIter<'a> = IncidenceIter<'a>;
    type SupportIter<'a> = IncidenceIter<'a>;

    fn cone(&self, p: PointId) -> IncidenceIter<'_> {
        IncidenceIter {
            arrows: &self.arrows,
            idx: self.cone_index.get(&p).map_or(NO_ARROWS.iter(), |v| v.iter()),
            towards_source: true,
        }
    }

    fn support(&self, p: PointId) -> IncidenceIter<'_> {
        IncidenceIter {
            arrows: &self.arrows,
            idx: self.support_index.get(&p).map_or(NO_ARROWS.iter(), |v| v.iter()),
            towards_source: false,
        }
    }

    fn points(&self) -> Box<dyn Iterator<Item = PointId> + '_> {
        Box::new(self.points.iter().copied())
    }

    #[inline]
    fn contains_point(&self, p: PointId) -> bool {
        self.points.contains(&p)
    }

    #[inline]
    fn cone_size(&self, p: PointId) -> usize {
        self.cone_index.get(&p).map_or(0, Vec::len)
    }

    #[inline]
    fn support_size(&self, p: PointId) -> usize {
        self.support_index.get(&p).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn cone_and_support_follow_insertion_order() {
        let mut s = InMemorySieve::new();
        s.add_arrow(pid(3), pid(10), 0).unwrap();
        s.add_arrow(pid(1), pid(10), 0).unwrap();
        s.add_arrow(pid(2), pid(10), -1).unwrap();
        s.add_arrow(pid(1), pid(11), 0).unwrap();
        assert_eq!(s.cone_points(pid(10)), vec![pid(3), pid(1), pid(2)]);
        assert_eq!(s.support_points(pid(1)), vec![pid(10), pid(11)]);
        assert_eq!(s.cone(pid(10)).nth(2), Some((pid(2), -1)));
        assert!(s.cone(pid(1)).next().is_none());
        assert!(s.support(pid(99)).next().is_none());
    }

    #[test]
    fn duplicate_is_idempotent_conflict_is_error() {
        let mut s = InMemorySieve::new();
        assert!(s.add_arrow(pid(1), pid(2), 1).unwrap());
        assert!(!s.add_arrow(pid(1), pid(2), 1).unwrap());
        assert_eq!(s.num_arrows(), 1);
        assert_eq!(
            s.add_arrow(pid(1), pid(2), 0),
            Err(MeshSieveError::OrientationConflict {
                src: pid(1),
                dst: pid(2),
                existing: 1,
                requested: 0
            })
        );
        assert_eq!(s.num_arrows(), 1);
    }

    #[test]
    fn rejects_self_loops_and_dimension_violations() {
        let mut s = InMemorySieve::new();
        assert_eq!(s.add_arrow(pid(4), pid(4), 0), Err(MeshSieveError::SelfLoop(pid(4))));
        s.add_point(pid(1), 1).unwrap();
        s.add_point(pid(2), 0).unwrap();
        assert!(matches!(
            s.add_arrow(pid(1), pid(2), 0),
            Err(MeshSieveError::DimensionMismatch { .. })
        ));
        assert!(s.add_arrow(pid(2), pid(1), 0).unwrap());
        assert!(matches!(
            s.add_point(pid(2), 1),
            Err(MeshSieveError::DimensionMismatch { .. })
        ));
        s.add_point(pid(2), 0).unwrap();
    }

    #[test]
    fn declaring_after_arrows_is_checked() {
        let mut s = InMemorySieve::new();
        s.add_arrow(pid(1), pid(2), 0).unwrap();
        s.add_point(pid(2), 1).unwrap();
        assert!(matches!(
            s.add_point(pid(1), 1),
            Err(MeshSieveError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn strata_cache_is_invalidated_by_mutation() {
        let mut s = InMemorySieve::new();
        s.add_arrow(pid(1), pid(2), 0).unwrap();
        assert_eq!(s.max_depth().unwrap(), 1);
        s.add_arrow(pid(2), pid(3), 0).unwrap();
        assert_eq!(s.max_depth().unwrap(), 2);
        assert_eq!(s.depth(pid(3)).unwrap(), 2);
        assert_eq!(s.height(pid(1)).unwrap(), 2);
    }
}
