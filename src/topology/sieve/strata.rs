//! Strata computation for incidence stores.
//!
//! This module provides [`StrataCache`], the precomputed depth and height of
//! every point together with the strata (points grouped by depth or height),
//! and [`compute_strata`], which builds it for any [`Sieve`].
//!
//! * `depth(p) = 0` if `p` has an empty cone, else `1 + max(depth(cone(p)))`.
//! * `height(p) = 0` if `p` has an empty support, else `1 + max(height(support(p)))`.
//!
//! Both are the fixed point of the obvious relaxation; evaluating them along a
//! topological order reaches it in a single pass, and the absence of such an
//! order is exactly the case where no fixed point exists.
//!
//! # Errors
//! * [`MeshSieveError::MissingPoint`]: an arrow references a point that the
//!   store does not list among its points.
//! * [`MeshSieveError::CycleDetected`]: the topology contains a cycle.

use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;
use crate::topology::sieve::Sieve;
use std::collections::HashMap;

/// Precomputed stratum information for a store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StrataCache {
    /// Point → depth (distance to the vertices).
    pub depth: HashMap<PointId, u32>,
    /// Point → height (distance to the cells).
    pub height: HashMap<PointId, u32>,
    /// `depth_strata[k]` = points of depth `k`, ascending.
    pub depth_strata: Vec<Vec<PointId>>,
    /// `height_strata[k]` = points of height `k`, ascending.
    pub height_strata: Vec<Vec<PointId>>,
    pub max_depth: u32,
    pub max_height: u32,
}

impl StrataCache {
    #[inline]
    pub fn depth_of(&self, p: PointId) -> Option<u32> {
        self.depth.get(&p).copied()
    }

    #[inline]
    pub fn height_of(&self, p: PointId) -> Option<u32> {
        self.height.get(&p).copied()
    }

    /// Points of depth `k`; empty when `k` exceeds the maximum depth.
    pub fn depth_stratum(&self, k: u32) -> &[PointId] {
        self.depth_strata
            .get(k as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Points of height `k`; empty when `k` exceeds the maximum height.
    pub fn height_stratum(&self, k: u32) -> &[PointId] {
        self.height_strata
            .get(k as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of stratified points.
    pub fn len(&self) -> usize {
        self.depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }
}

/// Compute strata information on-the-fly (no cache).
///
/// ## Complexity
/// **O(|V| + |E|)**: Kahn topological sort plus one pass in each direction.
pub fn compute_strata<S: Sieve + ?Sized>(s: &S) -> Result<StrataCache, MeshSieveError> {
    // 1) in-degree = cone size; validate every endpoint
    let mut in_deg: HashMap<PointId, usize> = HashMap::new();
    for p in s.points() {
        in_deg.insert(p, s.cone_size(p));
    }
    for &p in in_deg.keys() {
        if let Some((q, _)) = s.cone(p).chain(s.support(p)).find(|(q, _)| !s.contains_point(*q)) {
            return Err(MeshSieveError::MissingPoint(q));
        }
    }

    // 2) Kahn from the vertices upwards
    let mut stack: Vec<PointId> = in_deg
        .iter()
        .filter_map(|(&p, &d)| (d == 0).then_some(p))
        .collect();
    stack.sort_unstable_by(|a, b| b.cmp(a));
    let mut topo = Vec::with_capacity(in_deg.len());
    while let Some(p) = stack.pop() {
        topo.push(p);
        for (q, _) in s.support(p) {
            if let Some(d) = in_deg.get_mut(&q) {
                *d -= 1;
                if *d == 0 {
                    stack.push(q);
                }
            }
        }
    }
    if topo.len() != in_deg.len() {
        return Err(MeshSieveError::CycleDetected);
    }

    // 3) depths along the order, heights against it
    let mut depth: HashMap<PointId, u32> = HashMap::with_capacity(topo.len());
    for &p in &topo {
        let d = s
            .cone(p)
            .map(|(q, _)| depth.get(&q).copied().unwrap_or(0))
            .max()
            .map_or(0, |m| m + 1);
        depth.insert(p, d);
    }
    let mut height: HashMap<PointId, u32> = HashMap::with_capacity(topo.len());
    for &p in topo.iter().rev() {
        let h = s
            .support(p)
            .map(|(q, _)| height.get(&q).copied().unwrap_or(0))
            .max()
            .map_or(0, |m| m + 1);
        height.insert(p, h);
    }

    let max_depth = depth.values().copied().max().unwrap_or(0);
    let max_height = height.values().copied().max().unwrap_or(0);
    let depth_strata = bucket(&depth, max_depth);
    let height_strata = bucket(&height, max_height);

    log::debug!(
        "stratified {} points: max depth {max_depth}, max height {max_height}",
        topo.len()
    );
    Ok(StrataCache {
        depth,
        height,
        depth_strata,
        height_strata,
        max_depth,
        max_height,
    })
}

fn bucket(level: &HashMap<PointId, u32>, max: u32) -> Vec<Vec<PointId>> {
    if level.is_empty() {
        return Vec::new();
    }
    let mut strata = vec![Vec::new(); max as usize + 1];
    for (&p, &k) in level {
        strata[k as usize].push(p);
    }
    for lev in &mut strata {
        lev.sort_unstable();
    }
    strata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::sieve::InMemorySieve;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    /// Triangle 7 with edges 4,5,6 over vertices 1,2,3.
    fn interpolated_triangle() -> InMemorySieve {
        InMemorySieve::from_arrows([
            (pid(1), pid(4), 0),
            (pid(2), pid(4), 0),
            (pid(2), pid(5), 0),
            (pid(3), pid(5), 0),
            (pid(3), pid(6), 0),
            (pid(1), pid(6), 0),
            (pid(4), pid(7), 0),
            (pid(5), pid(7), 0),
            (pid(6), pid(7), 0),
        ])
        .unwrap()
    }

    #[test]
    fn triangle_strata() {
        let s = interpolated_triangle();
        let c = compute_strata(&s).unwrap();
        assert_eq!(c.depth_stratum(0), &[pid(1), pid(2), pid(3)]);
        assert_eq!(c.depth_stratum(1), &[pid(4), pid(5), pid(6)]);
        assert_eq!(c.depth_stratum(2), &[pid(7)]);
        assert_eq!(c.height_stratum(0), &[pid(7)]);
        assert_eq!(c.height_stratum(2), &[pid(1), pid(2), pid(3)]);
        assert!(c.depth_stratum(3).is_empty());
        assert_eq!(c.max_depth, 2);
    }

    #[test]
    fn cycle_is_detected() {
        let s = InMemorySieve::from_arrows([
            (pid(1), pid(2), 0),
            (pid(2), pid(3), 0),
            (pid(3), pid(1), 0),
        ])
        .unwrap();
        assert_eq!(compute_strata(&s), Err(MeshSieveError::CycleDetected));
    }

    #[test]
    fn isolated_declared_point_is_vertex_and_cell() {
        let mut s = InMemorySieve::new();
        s.add_point(pid(9), 0).unwrap();
        let c = compute_strata(&s).unwrap();
        assert_eq!(c.depth_of(pid(9)), Some(0));
        assert_eq!(c.height_of(pid(9)), Some(0));
    }

    #[test]
    fn empty_store() {
        let c = compute_strata(&InMemorySieve::new()).unwrap();
        assert!(c.is_empty());
        assert!(c.depth_stratum(0).is_empty());
    }
}
