//! Mesh fragment: one rank's portion of a mesh.
//!
//! A fragment bundles the incidence store with everything that has to
//! travel with it: labels, named `f64` sections (coordinates among them),
//! the overlap with other ranks, and the global ids of its points.
//! Refinement and distribution always produce a new fragment.

use crate::data::section::Section;
use crate::mesh_error::MeshSieveError;
use crate::overlap::Overlap;
use crate::topology::labels::LabelSet;
use crate::topology::point::PointId;
use crate::topology::sieve::InMemorySieve;
use std::collections::BTreeMap;

/// Name of the vertex-coordinate section.
pub const COORDINATES: &str = "coordinates";

/// Where a fragment sits in the distribution life cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DistributionState {
    /// Single process, no overlap.
    #[default]
    Local,
    /// Every rank holds a consistent piece, overlap populated.
    Distributed,
    /// The root holds the whole mesh, other ranks hold empty fragments.
    Unified,
}

#[derive(Clone, Debug, Default)]
pub struct MeshFragment {
    pub sieve: InMemorySieve,
    pub labels: LabelSet,
    pub sections: BTreeMap<String, Section<f64>>,
    pub overlap: Overlap,
    pub state: DistributionState,
    /// Topological dimension of the cells.
    pub dimension: usize,
    /// Number of coordinates per vertex.
    pub spatial_dim: usize,
    /// Hole seed points, `spatial_dim` values each.
    pub holes: Vec<f64>,
    /// Global id per point; absent entries use the handle itself.
    pub global_ids: BTreeMap<PointId, u64>,
}

impl MeshFragment {
    pub fn new(sieve: InMemorySieve, dimension: usize, spatial_dim: usize) -> Self {
        Self {
            sieve,
            dimension,
            spatial_dim,
            ..Self::default()
        }
    }

    /// Empty fragment in `state`, keeping the dimensions of `like`.
    pub fn empty_like(like: &MeshFragment, state: DistributionState) -> Self {
        Self {
            dimension: like.dimension,
            spatial_dim: like.spatial_dim,
            holes: like.holes.clone(),
            state,
            ..Self::default()
        }
    }

    pub fn coordinates(&self) -> Option<&Section<f64>> {
        self.sections.get(COORDINATES)
    }

    pub fn set_coordinates(&mut self, coords: Section<f64>) {
        self.sections.insert(COORDINATES.to_string(), coords);
    }

    /// Coordinates of vertex `v`.
    pub fn vertex_coordinates(&self, v: PointId) -> Result<&[f64], MeshSieveError> {
        self.coordinates()
            .ok_or(MeshSieveError::PointNotInAtlas(v))?
            .try_restrict(v)
    }

    /// Points of depth 0, ascending.
    pub fn vertices(&self) -> Result<Vec<PointId>, MeshSieveError> {
        self.sieve.depth_stratum(0)
    }

    /// Points of depth `dimension` (or 1 for a mesh stored without
    /// intermediate entities), ascending.
    pub fn cells(&self) -> Result<Vec<PointId>, MeshSieveError> {
        let depth = self.sieve.max_depth()?;
        if self.sieve.is_empty() || (depth == 0 && self.dimension > 0) {
            return Ok(Vec::new());
        }
        self.sieve.depth_stratum(depth)
    }

    /// Whether the store materialises every intermediate dimension.
    pub fn is_interpolated(&self) -> Result<bool, MeshSieveError> {
        Ok(self.dimension <= 1 || self.sieve.max_depth()? as usize == self.dimension)
    }

    #[inline]
    pub fn global_id(&self, p: PointId) -> u64 {
        self.global_ids.get(&p).copied().unwrap_or_else(|| p.get())
    }

    pub fn is_empty(&self) -> bool {
        self.sieve.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn cells_and_vertices_of_a_segment_chain() {
        let s = InMemorySieve::from_arrows([
            (pid(1), pid(4), 0),
            (pid(2), pid(4), 0),
            (pid(2), pid(5), 0),
            (pid(3), pid(5), 0),
        ])
        .unwrap();
        let mut f = MeshFragment::new(s, 1, 2);
        assert_eq!(f.vertices().unwrap(), vec![pid(1), pid(2), pid(3)]);
        assert_eq!(f.cells().unwrap(), vec![pid(4), pid(5)]);
        assert!(f.is_interpolated().unwrap());
        assert_eq!(f.global_id(pid(4)), 4);
        f.global_ids.insert(pid(4), 40);
        assert_eq!(f.global_id(pid(4)), 40);
        assert!(f.vertex_coordinates(pid(1)).is_err());
        assert_eq!(f.state, DistributionState::Local);
    }
}
