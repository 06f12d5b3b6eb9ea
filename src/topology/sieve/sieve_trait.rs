//! Core trait for incidence stores.
//!
//! The [`Sieve`] trait is the read side of a mesh topology: cone and support
//! views over a set of arrows, plus the point set. Traversals and lattice
//! operations are layered on top of it in [`super::query_ext`], so they work
//! for any store that implements these few methods.

use crate::topology::point::PointId;

/// Bidirectional incidence queries.
///
/// `cone(p)` yields the points with an arrow into `p` (its immediate
/// boundary) and `support(p)` the points `p` has an arrow into, each paired
/// with the arrow's orientation. Both follow arrow insertion order and are
/// empty, never an error, for points without incident arrows.
pub trait Sieve {
    type ConeIter<'a>: Iterator<Item = (PointId, i32)>
    where
        Self: 'a;
    type SupportIter<'a>: Iterator<Item = (PointId, i32)>
    where
        Self: 'a;

    /// Immediate boundary of `p`.
    fn cone(&self, p: PointId) -> Self::ConeIter<'_>;
    /// Immediate co-boundary of `p`.
    fn support(&self, p: PointId) -> Self::SupportIter<'_>;

    /// Every point of the store, ascending by handle.
    fn points(&self) -> Box<dyn Iterator<Item = PointId> + '_>;

    /// Whether `p` is part of the store.
    fn contains_point(&self, p: PointId) -> bool;

    /// Number of points in the cone of `p`.
    fn cone_size(&self, p: PointId) -> usize {
        self.cone(p).count()
    }

    /// Number of points in the support of `p`.
    fn support_size(&self, p: PointId) -> usize {
        self.support(p).count()
    }

    /// Cone points of `p` without orientations.
    fn cone_points(&self, p: PointId) -> Vec<PointId> {
        self.cone(p).map(|(q, _)| q).collect()
    }

    /// Support points of `p` without orientations.
    fn support_points(&self, p: PointId) -> Vec<PointId> {
        self.support(p).map(|(q, _)| q).collect()
    }
}
