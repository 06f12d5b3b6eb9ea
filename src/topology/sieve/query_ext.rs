//! Closure algebra: traversals and lattice queries over any [`Sieve`].
//!
//! All operations are read-only and deterministic. Sequence-valued queries
//! (`n_cone`, `closure`, ...) keep first-seen order with duplicates removed;
//! set-valued ones (`n_join`, `n_meet`) return points ascending by handle.
//!
//! `n_join` and `n_meet` return every match. Callers that need exactly one
//! entity (for instance the edge spanned by two vertices) go through
//! [`SieveQueryExt::unique_join`], which turns any other cardinality into an
//! [`MeshSieveError::AmbiguousJoin`].

use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;
use crate::topology::sieve::Sieve;
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Extension trait implemented for every [`Sieve`].
pub trait SieveQueryExt: Sieve {
    /// Points reachable from `p` by exactly `n` cone steps.
    ///
    /// `n_cone(p, 0) == [p]`; `n_cone(p, 1)` is the cone in insertion order.
    fn n_cone(&self, p: PointId, n: usize) -> Vec<PointId> {
        n_step(p, n, |q| self.cone_points(q))
    }

    /// Points reachable from `p` by exactly `n` support steps.
    fn n_support(&self, p: PointId, n: usize) -> Vec<PointId> {
        n_step(p, n, |q| self.support_points(q))
    }

    /// `p` together with everything on its boundary, transitively.
    fn closure(&self, p: PointId) -> Vec<PointId> {
        self.closure_of([p])
    }

    /// `p` together with everything it bounds, transitively.
    fn star(&self, p: PointId) -> Vec<PointId> {
        self.star_of([p])
    }

    /// Union of closures of `seeds`, breadth-first.
    fn closure_of<I>(&self, seeds: I) -> Vec<PointId>
    where
        I: IntoIterator<Item = PointId>,
    {
        bfs(seeds, |q| self.cone_points(q))
    }

    /// Union of stars of `seeds`, breadth-first.
    fn star_of<I>(&self, seeds: I) -> Vec<PointId>
    where
        I: IntoIterator<Item = PointId>,
    {
        bfs(seeds, |q| self.support_points(q))
    }

    /// Points lying in the `n`-support of every input point.
    ///
    /// `n_join({a, b}, 1)` in an interpolated mesh is the edge with vertices
    /// `a` and `b` (or nothing). An empty input yields an empty result.
    fn n_join(&self, points: &[PointId], n: usize) -> Vec<PointId> {
        intersect(points, |p| self.n_support(p, n))
    }

    /// Shorthand for `n_join(points, 1)`.
    fn join1(&self, points: &[PointId]) -> Vec<PointId> {
        self.n_join(points, 1)
    }

    /// Points lying in the `n`-cone of every input point.
    fn n_meet(&self, points: &[PointId], n: usize) -> Vec<PointId> {
        intersect(points, |p| self.n_cone(p, n))
    }

    /// `n_join` that must match exactly one point.
    fn unique_join(&self, points: &[PointId], n: usize) -> Result<PointId, MeshSieveError> {
        match self.n_join(points, n).as_slice() {
            [only] => Ok(*only),
            found => Err(MeshSieveError::AmbiguousJoin {
                points: points.to_vec(),
                found: found.to_vec(),
            }),
        }
    }
}

impl<S: Sieve + ?Sized> SieveQueryExt for S {}

fn n_step<F>(p: PointId, n: usize, mut step: F) -> Vec<PointId>
where
    F: FnMut(PointId) -> Vec<PointId>,
{
    let mut frontier = vec![p];
    for _ in 0..n {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for q in frontier {
            for r in step(q) {
                if seen.insert(r) {
                    next.push(r);
                }
            }
        }
        if next.is_empty() {
            return next;
        }
        frontier = next;
    }
    frontier
}

fn bfs<I, F>(seeds: I, mut step: F) -> Vec<PointId>
where
    I: IntoIterator<Item = PointId>,
    F: FnMut(PointId) -> Vec<PointId>,
{
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    let mut out = Vec::new();
    for s in seeds {
        if seen.insert(s) {
            queue.push_back(s);
        }
    }
    while let Some(p) = queue.pop_front() {
        out.push(p);
        for q in step(p) {
            if seen.insert(q) {
                queue.push_back(q);
            }
        }
    }
    out
}

fn intersect<F>(points: &[PointId], mut reach: F) -> Vec<PointId>
where
    F: FnMut(PointId) -> Vec<PointId>,
{
    let Some((&first, rest)) = points.split_first() else {
        return Vec::new();
    };
    let mut acc: BTreeSet<PointId> = reach(first).into_iter().collect();
    for &p in rest {
        if acc.is_empty() {
            break;
        }
        let other: HashSet<PointId> = reach(p).into_iter().collect();
        acc.retain(|q| other.contains(q));
    }
    acc.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::sieve::InMemorySieve;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    /// Two triangles 7 = (1,2,3) and 8 = (2,4,3) sharing edge 5 = (2,3), uninterpolated.
    fn two_triangles() -> InMemorySieve {
        InMemorySieve::from_arrows([
            (pid(1), pid(7), 0),
            (pid(2), pid(7), 0),
            (pid(3), pid(7), 0),
            (pid(2), pid(8), 0),
            (pid(4), pid(8), 0),
            (pid(3), pid(8), 0),
        ])
        .unwrap()
    }

    #[test]
    fn n_cone_levels() {
        let s = two_triangles();
        assert_eq!(s.n_cone(pid(7), 0), vec![pid(7)]);
        assert_eq!(s.n_cone(pid(7), 1), vec![pid(1), pid(2), pid(3)]);
        assert!(s.n_cone(pid(7), 2).is_empty());
        assert_eq!(s.n_support(pid(2), 1), vec![pid(7), pid(8)]);
    }

    #[test]
    fn closure_and_star() {
        let s = two_triangles();
        assert_eq!(s.closure(pid(8)), vec![pid(8), pid(2), pid(4), pid(3)]);
        assert_eq!(s.star(pid(3)), vec![pid(3), pid(7), pid(8)]);
        assert_eq!(s.closure(pid(1)), vec![pid(1)]);
    }

    #[test]
    fn joins_and_meets() {
        let s = two_triangles();
        assert_eq!(s.n_join(&[pid(2), pid(3)], 1), vec![pid(7), pid(8)]);
        assert_eq!(s.n_join(&[pid(1), pid(4)], 1), Vec::<PointId>::new());
        assert_eq!(s.n_meet(&[pid(7), pid(8)], 1), vec![pid(2), pid(3)]);
        assert!(s.n_join(&[], 1).is_empty());
        assert_eq!(s.unique_join(&[pid(1), pid(2)], 1), Ok(pid(7)));
        assert_eq!(
            s.unique_join(&[pid(2), pid(3)], 1),
            Err(MeshSieveError::AmbiguousJoin {
                points: vec![pid(2), pid(3)],
                found: vec![pid(7), pid(8)],
            })
        );
    }
}
