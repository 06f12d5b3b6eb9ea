//! Build an incidence store from a flat simplex list.
//!
//! Handle layout of the result:
//!
//! - vertex `i` (0-based index into the coordinate array) → `i + 1`,
//! - cell `c` → `num_vertices + c + 1`,
//! - interpolated edges and faces → after the last cell, in creation order.
//!
//! Without interpolation each cell's cone is its vertices in simplex order.
//! With interpolation cells point at faces, faces at edges and edges at
//! vertices, using the local facet tables
//!
//! - segment: `(0) (1)`
//! - triangle: `(0,1) (1,2) (2,0)`
//! - tetrahedron: `(0,1,2) (0,3,1) (0,2,3) (2,1,3)`
//!
//! A sub-simplex shared by two cells is created once (found again through
//! `n_join` over its own boundary) and each arrow into a cell records the
//! cell's local vertex order relative to the sub-simplex's canonical one.

use crate::data::section::Section;
use crate::mesh_error::MeshSieveError;
use crate::topology::orientation::relative_orientation;
use crate::topology::point::PointId;
use crate::topology::sieve::{InMemorySieve, Sieve, SieveQueryExt};
use std::collections::{BTreeMap, HashMap};

/// What to do with a facet shared by more than two cells.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ManifoldPolicy {
    /// Fail the build with [`MeshSieveError::NonManifold`].
    #[default]
    Reject,
    /// Keep building and report the facet in [`BuiltTopology::non_manifold`].
    Flag,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuildOptions {
    /// Materialise edges (and faces in 3-D).
    pub interpolate: bool,
    pub manifold: ManifoldPolicy,
}

/// A facet shared by more than two cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonManifoldFacet {
    /// Facet vertices in canonical order.
    pub vertices: Vec<PointId>,
    /// The facet's own point, when interpolated.
    pub entity: Option<PointId>,
    /// Cells containing the facet, ascending.
    pub cells: Vec<PointId>,
}

#[derive(Clone, Debug, Default)]
pub struct BuiltTopology {
    pub sieve: InMemorySieve,
    /// Vertex handles, indexed like the input coordinates.
    pub vertices: Vec<PointId>,
    /// Cell handles, indexed like the input simplices.
    pub cells: Vec<PointId>,
    /// Facets flagged under [`ManifoldPolicy::Flag`].
    pub non_manifold: Vec<NonManifoldFacet>,
    /// Topological dimension of the cells.
    pub dimension: usize,
}

/// Local facets of a simplex with `arity` vertices.
pub fn facet_table(arity: usize) -> &'static [&'static [usize]] {
    match arity {
        2 => &[&[0], &[1]],
        3 => &[&[0, 1], &[1, 2], &[2, 0]],
        4 => &[&[0, 1, 2], &[0, 3, 1], &[0, 2, 3], &[2, 1, 3]],
        _ => &[],
    }
}

/// Converts `cells` (flat, `num_corners` vertex indices per simplex) into a
/// fresh incidence store.
///
/// # Errors
/// * [`MeshSieveError::MalformedInput`] for an unsupported corner count, a
///   ragged array, an out-of-range index or a repeated vertex in a simplex.
/// * [`MeshSieveError::NonManifold`] under [`ManifoldPolicy::Reject`].
pub fn build_topology(
    cells: &[usize],
    num_vertices: usize,
    num_corners: usize,
    opts: &BuildOptions,
) -> Result<BuiltTopology, MeshSieveError> {
    validate_simplices(cells, num_vertices, num_corners)?;
    let num_cells = cells.len() / num_corners;
    let dimension = num_corners - 1;

    let mut sieve = InMemorySieve::new();
    let vertices: Vec<PointId> = (0..num_vertices).map(PointId::from_index).collect();
    for &v in &vertices {
        sieve.add_point(v, 0)?;
    }
    let cell_ids: Vec<PointId> = (0..num_cells)
        .map(|c| PointId::from_index(num_vertices + c))
        .collect();

    let mut builder = Interpolator {
        sieve: &mut sieve,
        canonical: HashMap::new(),
        next_id: (num_vertices + num_cells) as u64 + 1,
    };
    for (c, simplex) in cells.chunks_exact(num_corners).enumerate() {
        let cell = cell_ids[c];
        let local: Vec<PointId> = simplex.iter().map(|&i| vertices[i]).collect();
        builder.sieve.add_point(cell, dimension as u8)?;
        if opts.interpolate && num_corners > 2 {
            builder.attach(cell, &local)?;
        } else {
            for &v in &local {
                builder.sieve.add_arrow(v, cell, 0)?;
            }
        }
    }
    let canonical = builder.canonical;

    let non_manifold = if opts.interpolate {
        manifold_interpolated(&sieve, &canonical, dimension, &vertices)
    } else {
        manifold_uninterpolated(&sieve, cells, &vertices, num_corners)
    };
    if let Some(first) = non_manifold.first() {
        match opts.manifold {
            ManifoldPolicy::Reject => {
                return Err(MeshSieveError::NonManifold {
                    vertices: first.vertices.clone(),
                    support: first.cells.len(),
                });
            }
            ManifoldPolicy::Flag => {
                log::warn!(
                    "{} non-manifold facet(s), first {:?} in {} cells",
                    non_manifold.len(),
                    first.vertices,
                    first.cells.len()
                );
            }
        }
    }

    log::debug!(
        "built topology: {} vertices, {} cells, {} points, {} arrows (interpolate = {})",
        num_vertices,
        num_cells,
        sieve.num_points(),
        sieve.num_arrows(),
        opts.interpolate
    );
    Ok(BuiltTopology {
        sieve,
        vertices,
        cells: cell_ids,
        non_manifold,
        dimension,
    })
}

fn validate_simplices(
    cells: &[usize],
    num_vertices: usize,
    num_corners: usize,
) -> Result<(), MeshSieveError> {
    if !(2..=4).contains(&num_corners) {
        return Err(MeshSieveError::MalformedInput(format!(
            "unsupported corner count {num_corners} (expected 2, 3 or 4)"
        )));
    }
    if cells.len() % num_corners != 0 {
        return Err(MeshSieveError::MalformedInput(format!(
            "{} indices is not a multiple of {num_corners} corners",
            cells.len()
        )));
    }
    for (c, simplex) in cells.chunks_exact(num_corners).enumerate() {
        if let Some(&bad) = simplex.iter().find(|&&i| i >= num_vertices) {
            return Err(MeshSieveError::MalformedInput(format!(
                "cell {c} references vertex {bad}, only {num_vertices} vertices"
            )));
        }
        for (i, a) in simplex.iter().enumerate() {
            if simplex[i + 1..].contains(a) {
                return Err(MeshSieveError::MalformedInput(format!(
                    "cell {c} repeats vertex {a}"
                )));
            }
        }
    }
    Ok(())
}

struct Interpolator<'a> {
    sieve: &'a mut InMemorySieve,
    /// Sub-simplex → vertices in creation order.
    canonical: HashMap<PointId, Vec<PointId>>,
    next_id: u64,
}

impl Interpolator<'_> {
    /// Inserts the boundary of `parent`, whose vertices in local order are `local`.
    fn attach(&mut self, parent: PointId, local: &[PointId]) -> Result<(), MeshSieveError> {
        if local.len() == 2 {
            for &v in local {
                self.sieve.add_arrow(v, parent, 0)?;
            }
            return Ok(());
        }
        for facet in facet_table(local.len()) {
            let sub: Vec<PointId> = facet.iter().map(|&i| local[i]).collect();
            let child = self.entity(&sub)?;
            let orientation = self
                .canonical
                .get(&child)
                .and_then(|canon| relative_orientation(canon, &sub))
                .ok_or_else(|| {
                    MeshSieveError::MalformedInput(format!(
                        "sub-simplex {child} does not match vertices {sub:?}"
                    ))
                })?;
            self.sieve.add_arrow(child, parent, orientation)?;
        }
        Ok(())
    }

    /// Handle of the sub-simplex spanned by `verts`, created on first use.
    fn entity(&mut self, verts: &[PointId]) -> Result<PointId, MeshSieveError> {
        if let [v] = verts {
            return Ok(*v);
        }
        let dim = (verts.len() - 1) as u8;
        let boundary: Vec<PointId> = if verts.len() == 2 {
            verts.to_vec()
        } else {
            facet_table(verts.len())
                .iter()
                .map(|f| f.iter().map(|&i| verts[i]).collect::<Vec<_>>())
                .map(|sub| self.entity(&sub))
                .collect::<Result<_, _>>()?
        };
        let existing: Vec<PointId> = self
            .sieve
            .n_join(&boundary, 1)
            .into_iter()
            .filter(|&p| self.sieve.dimension_of(p) == Some(dim))
            .collect();
        match existing.as_slice() {
            [found] => Ok(*found),
            [] => {
                let id = PointId::new(self.next_id)?;
                self.next_id += 1;
                self.sieve.add_point(id, dim)?;
                self.canonical.insert(id, verts.to_vec());
                self.attach(id, verts)?;
                Ok(id)
            }
            found => Err(MeshSieveError::AmbiguousJoin {
                points: boundary,
                found: found.to_vec(),
            }),
        }
    }
}

fn manifold_interpolated(
    sieve: &InMemorySieve,
    canonical: &HashMap<PointId, Vec<PointId>>,
    dimension: usize,
    vertices: &[PointId],
) -> Vec<NonManifoldFacet> {
    let facets: Vec<(PointId, Vec<PointId>)> = if dimension == 1 {
        vertices.iter().map(|&v| (v, vec![v])).collect()
    } else {
        let mut f: Vec<_> = canonical
            .iter()
            .filter(|(p, _)| sieve.dimension_of(**p) == Some(dimension as u8 - 1))
            .map(|(&p, vs)| (p, vs.clone()))
            .collect();
        f.sort_unstable();
        f
    };
    facets
        .into_iter()
        .filter(|(p, _)| sieve.support_size(*p) > 2)
        .map(|(p, vs)| NonManifoldFacet {
            vertices: vs,
            entity: Some(p),
            cells: sieve.support_points(p),
        })
        .collect()
}

fn manifold_uninterpolated(
    sieve: &InMemorySieve,
    cells: &[usize],
    vertices: &[PointId],
    num_corners: usize,
) -> Vec<NonManifoldFacet> {
    let mut checked: BTreeMap<Vec<PointId>, ()> = BTreeMap::new();
    let mut out = Vec::new();
    for simplex in cells.chunks_exact(num_corners) {
        for facet in facet_table(num_corners) {
            let verts: Vec<PointId> = facet.iter().map(|&i| vertices[simplex[i]]).collect();
            let mut key = verts.clone();
            key.sort_unstable();
            if checked.insert(key, ()).is_some() {
                continue;
            }
            let holders = sieve.n_join(&verts, 1);
            if holders.len() > 2 {
                out.push(NonManifoldFacet {
                    vertices: verts,
                    entity: None,
                    cells: holders,
                });
            }
        }
    }
    out
}

/// Coordinate section over `vertices`, `spatial_dim` values each.
pub fn build_coordinates(
    vertices: &[PointId],
    spatial_dim: usize,
    coords: &[f64],
) -> Result<Section<f64>, MeshSieveError> {
    if spatial_dim == 0 || coords.len() != vertices.len() * spatial_dim {
        return Err(MeshSieveError::MalformedInput(format!(
            "{} coordinates for {} vertices of dimension {spatial_dim}",
            coords.len(),
            vertices.len()
        )));
    }
    let mut section: Section<f64> = Section::default();
    for (&v, xyz) in vertices.iter().zip(coords.chunks_exact(spatial_dim)) {
        section.insert(v, xyz)?;
    }
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn uninterpolated_handles_and_cones() {
        let b = build_topology(&[0, 1, 2, 1, 3, 2], 4, 3, &BuildOptions::default()).unwrap();
        assert_eq!(b.vertices, vec![pid(1), pid(2), pid(3), pid(4)]);
        assert_eq!(b.cells, vec![pid(5), pid(6)]);
        assert_eq!(b.sieve.cone_points(pid(6)), vec![pid(2), pid(4), pid(3)]);
        assert_eq!(b.sieve.max_depth().unwrap(), 1);
        assert_eq!(b.dimension, 2);
    }

    #[test]
    fn interpolated_triangles_share_edge() {
        let opts = BuildOptions {
            interpolate: true,
            ..Default::default()
        };
        let b = build_topology(&[0, 1, 2, 1, 3, 2], 4, 3, &opts).unwrap();
        let s = &b.sieve;
        // 4 vertices + 2 cells + 5 edges
        assert_eq!(s.num_points(), 11);
        assert_eq!(s.depth_stratum(1).unwrap().len(), 5);
        let shared = s.unique_join(&[pid(2), pid(3)], 1).unwrap();
        assert_eq!(s.support_points(shared), vec![pid(5), pid(6)]);
        // edges handles follow the cells
        assert!(s.depth_stratum(1).unwrap().iter().all(|e| e.get() > 6));
        // cell 6 = (1,3,2) sees edge (1,2) reversed relative to cell 5's (1,2)
        assert_eq!(s.orientation(shared, pid(5)), Some(0));
        assert_eq!(s.orientation(shared, pid(6)), Some(-1));
    }

    #[test]
    fn interpolated_tetrahedra_share_face() {
        let opts = BuildOptions {
            interpolate: true,
            ..Default::default()
        };
        let b = build_topology(&[0, 1, 2, 3, 1, 2, 3, 4], 5, 4, &opts).unwrap();
        let s = &b.sieve;
        assert_eq!(s.max_depth().unwrap(), 3);
        // 7 faces, 9 edges
        assert_eq!(s.depth_stratum(2).unwrap().len(), 7);
        assert_eq!(s.depth_stratum(1).unwrap().len(), 9);
        let e12 = s.unique_join(&[pid(2), pid(3)], 1).unwrap();
        let e23 = s.unique_join(&[pid(3), pid(4)], 1).unwrap();
        let e31 = s.unique_join(&[pid(4), pid(2)], 1).unwrap();
        let face = s.unique_join(&[e12, e23, e31], 1).unwrap();
        assert_eq!(s.support_size(face), 2);
    }

    #[test]
    fn non_manifold_rejected_or_flagged() {
        // three triangles on edge (0,1)
        let cells = [0, 1, 2, 1, 0, 3, 0, 1, 4];
        for interpolate in [false, true] {
            let reject = BuildOptions {
                interpolate,
                manifold: ManifoldPolicy::Reject,
            };
            assert!(matches!(
                build_topology(&cells, 5, 3, &reject),
                Err(MeshSieveError::NonManifold { support: 3, .. })
            ));
            let flag = BuildOptions {
                interpolate,
                manifold: ManifoldPolicy::Flag,
            };
            let b = build_topology(&cells, 5, 3, &flag).unwrap();
            assert_eq!(b.non_manifold.len(), 1);
            assert_eq!(b.non_manifold[0].cells.len(), 3);
            assert_eq!(b.non_manifold[0].entity.is_some(), interpolate);
        }
    }

    #[test]
    fn malformed_input() {
        let o = BuildOptions::default();
        assert!(build_topology(&[0, 1], 2, 5, &o).is_err());
        assert!(build_topology(&[0, 1, 2, 0], 3, 3, &o).is_err());
        assert!(build_topology(&[0, 1, 7], 3, 3, &o).is_err());
        assert!(build_topology(&[0, 1, 1], 3, 3, &o).is_err());
    }

    #[test]
    fn coordinates_section() {
        let vs = [pid(1), pid(2)];
        let c = build_coordinates(&vs, 2, &[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(c.try_restrict(pid(2)).unwrap(), &[2.0, 3.0]);
        assert!(build_coordinates(&vs, 2, &[0.0]).is_err());
    }
}
