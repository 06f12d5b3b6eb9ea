//! A small 2-D oracle: fan triangulation plus uniform red refinement.
//!
//! Meshing mode triangulates a convex polygon given as a closed cycle of
//! segments (or the convex hull of the points when no segments are given or
//! the `convex_hull` switch is set). Refinement mode starts from the cells in
//! the input. Either way every triangle is split into four through its edge
//! midpoints, round after round, until each one satisfies its area bound.
//! Splitting every triangle each round keeps the mesh conforming.
//!
//! Segment markers follow the boundary: a midpoint on a marked segment gets
//! the segment's marker, and both halves keep it. The `quality` switch is
//! accepted and has no effect.

use super::oracle::{OracleError, OracleInput, OracleOutput, TriangulationOracle};
use std::collections::{BTreeMap, HashMap};

const MAX_ROUNDS: usize = 12;
const EPS: f64 = 1e-12;

#[derive(Copy, Clone, Debug, Default)]
pub struct UniformRefiner;

type Edge = (usize, usize);

fn key(a: usize, b: usize) -> Edge {
    (a.min(b), a.max(b))
}

fn fail<T>(msg: impl Into<String>) -> Result<T, OracleError> {
    Err(OracleError::Failed(msg.into()))
}

struct Mesh {
    xy: Vec<[f64; 2]>,
    markers: Vec<i32>,
    /// Triangle plus the index of the input cell it descends from.
    tris: Vec<([usize; 3], usize)>,
    boundary: HashMap<Edge, i32>,
}

impl Mesh {
    fn area(&self, t: &[usize; 3]) -> f64 {
        let [a, b, c] = t.map(|i| self.xy[i]);
        0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]))
    }

    fn midpoint(&mut self, mids: &mut HashMap<Edge, usize>, a: usize, b: usize) -> usize {
        let k = key(a, b);
        if let Some(&m) = mids.get(&k) {
            return m;
        }
        let m = self.xy.len();
        let (pa, pb) = (self.xy[a], self.xy[b]);
        self.xy.push([(pa[0] + pb[0]) / 2.0, (pa[1] + pb[1]) / 2.0]);
        let marker = match self.boundary.remove(&k) {
            Some(mk) => {
                self.boundary.insert(key(a, m), mk);
                self.boundary.insert(key(m, b), mk);
                mk
            }
            None => 0,
        };
        self.markers.push(marker);
        mids.insert(k, m);
        m
    }

    fn red_round(&mut self) {
        let mut mids = HashMap::new();
        let old = std::mem::take(&mut self.tris);
        for ([a, b, c], origin) in old {
            let ab = self.midpoint(&mut mids, a, b);
            let bc = self.midpoint(&mut mids, b, c);
            let ca = self.midpoint(&mut mids, c, a);
            self.tris.extend([
                ([a, ab, ca], origin),
                ([ab, b, bc], origin),
                ([ca, bc, c], origin),
                ([ab, bc, ca], origin),
            ]);
        }
    }

    fn into_output(self) -> OracleOutput {
        let mut edges: BTreeMap<Edge, i32> = BTreeMap::new();
        for ([a, b, c], _) in &self.tris {
            for (u, v) in [(*a, *b), (*b, *c), (*c, *a)] {
                let k = key(u, v);
                edges.insert(k, self.boundary.get(&k).copied().unwrap_or(0));
            }
        }
        OracleOutput {
            points: self.xy.iter().flatten().copied().collect(),
            point_markers: self.markers,
            cells: self.tris.iter().flat_map(|(t, _)| *t).collect(),
            corners: 3,
            edge_markers: edges.values().copied().collect(),
            edges: edges.keys().flat_map(|&(a, b)| [a, b]).collect(),
            faces: Vec::new(),
            face_markers: Vec::new(),
        }
    }
}

/// Orders segments into one closed cycle.
fn segment_cycle(segments: &[usize], n: usize) -> Result<Vec<usize>, OracleError> {
    let mut adj: HashMap<usize, Vec<usize>> = HashMap::new();
    for s in segments.chunks_exact(2) {
        if s[0] >= n || s[1] >= n || s[0] == s[1] {
            return fail(format!("bad segment {s:?}"));
        }
        adj.entry(s[0]).or_default().push(s[1]);
        adj.entry(s[1]).or_default().push(s[0]);
    }
    if adj.values().any(|v| v.len() != 2) {
        return fail("segments do not form a closed polygon");
    }
    let start = segments[0];
    let mut cycle = vec![start];
    let mut prev = start;
    let mut cur = adj[&start][0];
    while cur != start {
        cycle.push(cur);
        let next = if adj[&cur][0] == prev { adj[&cur][1] } else { adj[&cur][0] };
        prev = cur;
        cur = next;
    }
    if cycle.len() != adj.len() {
        return fail("segments form more than one loop");
    }
    Ok(cycle)
}

/// Counter-clockwise convex hull (monotone chain), collinear points dropped.
fn convex_hull(xy: &[[f64; 2]]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..xy.len()).collect();
    idx.sort_by(|&i, &j| xy[i].partial_cmp(&xy[j]).unwrap_or(std::cmp::Ordering::Equal));
    let cross = |o: usize, a: usize, b: usize| {
        (xy[a][0] - xy[o][0]) * (xy[b][1] - xy[o][1]) - (xy[a][1] - xy[o][1]) * (xy[b][0] - xy[o][0])
    };
    let mut hull: Vec<usize> = Vec::new();
    for pass in [idx.clone(), idx.into_iter().rev().collect()] {
        let base = hull.len();
        for i in pass {
            while hull.len() >= base + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], i) <= EPS {
                hull.pop();
            }
            hull.push(i);
        }
        hull.pop();
    }
    hull
}

impl UniformRefiner {
    fn boundary_mesh(&self, input: &OracleInput, xy: Vec<[f64; 2]>, markers: Vec<i32>) -> Result<Mesh, OracleError> {
        if !input.holes.is_empty() {
            return fail("holes are not supported");
        }
        let n = xy.len();
        let mut boundary = HashMap::new();
        let cycle = if input.segments.is_empty() || input.options.convex_hull {
            convex_hull(&xy)
        } else {
            for (i, s) in input.segments.chunks_exact(2).enumerate() {
                boundary.insert(key(s[0], s[1]), input.segment_markers.get(i).copied().unwrap_or(0));
            }
            segment_cycle(&input.segments, n)?
        };
        if cycle.len() < 3 {
            return fail("fewer than three boundary points");
        }
        if cycle.len() != n {
            return fail("points off the boundary polygon are not supported");
        }
        let mut mesh = Mesh {
            xy,
            markers,
            tris: Vec::new(),
            boundary,
        };
        let mut cycle = cycle;
        let signed: f64 = (1..cycle.len() - 1)
            .map(|i| mesh.area(&[cycle[0], cycle[i], cycle[i + 1]]))
            .sum();
        if signed < 0.0 {
            cycle.reverse();
        }
        for i in 0..cycle.len() {
            let t = [cycle[i], cycle[(i + 1) % n], cycle[(i + 2) % n]];
            if mesh.area(&t) < -EPS {
                return fail("boundary polygon is not convex");
            }
        }
        for i in 1..n - 1 {
            let t = [cycle[0], cycle[i], cycle[i + 1]];
            if mesh.area(&t) <= EPS {
                return fail("degenerate fan triangle; start the cycle at a corner");
            }
            mesh.tris.push((t, 0));
        }
        Ok(mesh)
    }

    fn refine_mesh(&self, input: &OracleInput, xy: Vec<[f64; 2]>, markers: Vec<i32>) -> Result<Mesh, OracleError> {
        if input.corners != 3 || input.cells.len() % 3 != 0 {
            return fail(format!("cannot refine cells with {} corners", input.corners));
        }
        let n = xy.len();
        let mut boundary = HashMap::new();
        for (i, s) in input.segments.chunks_exact(2).enumerate() {
            boundary.insert(key(s[0], s[1]), input.segment_markers.get(i).copied().unwrap_or(0));
        }
        let mut tris = Vec::with_capacity(input.cells.len() / 3);
        for (c, t) in input.cells.chunks_exact(3).enumerate() {
            if t.iter().any(|&i| i >= n) {
                return fail(format!("cell {c} references a missing point"));
            }
            tris.push(([t[0], t[1], t[2]], c));
        }
        Ok(Mesh {
            xy,
            markers,
            tris,
            boundary,
        })
    }
}

impl TriangulationOracle for UniformRefiner {
    fn name(&self) -> &str {
        "uniform-red"
    }

    fn dimension(&self) -> usize {
        2
    }

    fn triangulate(&self, input: &OracleInput) -> Result<OracleOutput, OracleError> {
        if input.dimension != 2 || input.points.len() % 2 != 0 {
            return fail(format!("expected 2-D points, got dimension {}", input.dimension));
        }
        let xy: Vec<[f64; 2]> = input.points.chunks_exact(2).map(|p| [p[0], p[1]]).collect();
        let mut markers = input.point_markers.clone();
        markers.resize(xy.len(), 0);

        let mut mesh = if input.options.refine {
            self.refine_mesh(input, xy, markers)?
        } else {
            self.boundary_mesh(input, xy, markers)?
        };

        let bound = |origin: usize| -> Option<f64> {
            let per_cell = input.max_volumes.get(origin).copied().filter(|v| *v > 0.0);
            match (input.options.max_volume, per_cell) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };
        if let Some(v) = input.options.max_volume.filter(|v| *v <= 0.0) {
            return fail(format!("area bound {v} is not positive"));
        }
        let mut rounds = 0;
        while mesh
            .tris
            .iter()
            .any(|(t, o)| bound(*o).is_some_and(|b| mesh.area(t).abs() > b))
        {
            if rounds == MAX_ROUNDS {
                return fail(format!("area bound not met after {MAX_ROUNDS} refinement rounds"));
            }
            mesh.red_round();
            rounds += 1;
        }
        log::debug!(
            "{}: {} triangles, {} points after {rounds} rounds",
            self.name(),
            mesh.tris.len(),
            mesh.xy.len()
        );
        Ok(mesh.into_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_generation::oracle::OracleOptions;

    fn square() -> OracleInput {
        OracleInput {
            dimension: 2,
            points: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
            point_markers: vec![1, 1, 1, 1],
            segments: vec![0, 1, 1, 2, 2, 3, 3, 0],
            segment_markers: vec![1, 1, 1, 1],
            ..Default::default()
        }
    }

    #[test]
    fn square_fan_is_two_triangles() {
        let out = UniformRefiner.triangulate(&square()).unwrap();
        assert_eq!(out.cells.len(), 6);
        assert_eq!(out.points.len(), 8);
        assert_eq!(out.edges.len() / 2, 5);
        // the diagonal is interior
        assert_eq!(out.edge_markers.iter().filter(|&&m| m == 1).count(), 4);
        out.validate(2).unwrap();
    }

    #[test]
    fn area_bound_refines_and_marks_midpoints() {
        let mut input = square();
        input.options = OracleOptions {
            max_volume: Some(0.2),
            ..Default::default()
        };
        let out = UniformRefiner.triangulate(&input).unwrap();
        // 2 triangles of area 0.5 -> 8 of area 0.125
        assert_eq!(out.cells.len() / 3, 8);
        assert_eq!(out.points.len() / 2, 9);
        let marked = out.point_markers.iter().filter(|&&m| m == 1).count();
        assert_eq!(marked, 8);
        // midpoint of the diagonal (0, 2), created third
        assert_eq!(out.point_markers[6], 0);
    }

    #[test]
    fn refine_mode_respects_per_cell_bounds() {
        let input = OracleInput {
            dimension: 2,
            points: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
            cells: vec![0, 1, 2, 1, 3, 2],
            corners: 3,
            max_volumes: vec![0.2, 0.0],
            options: OracleOptions {
                refine: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let out = UniformRefiner.triangulate(&input).unwrap();
        // both split together to stay conforming
        assert_eq!(out.cells.len() / 3, 8);
    }

    #[test]
    fn rejects_open_boundary() {
        let mut input = square();
        input.segments.truncate(6);
        assert!(UniformRefiner.triangulate(&input).is_err());
    }
}
