//! Capability interface for external triangulation / tetrahedralization.
//!
//! The orchestrator never looks inside a mesher. It fills an [`OracleInput`]
//! with flat, 0-based arrays, hands it to the [`TriangulationOracle`]
//! registered for the spatial dimension and reads back an [`OracleOutput`].
//! Markers of `0` mean "unmarked" on both sides of the call.

use crate::mesh_error::MeshSieveError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an oracle; carried unchanged to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The mesher rejected or could not satisfy its input.
    #[error("{0}")]
    Failed(String),
    /// The mesher produced arrays that do not fit together.
    #[error("inconsistent output: {0}")]
    InvalidOutput(String),
}

/// Behaviour switches passed to the oracle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OracleOptions {
    /// Quality refinement (minimum angle / radius-edge bound).
    pub quality: bool,
    /// Uniform area (2-D) or volume (3-D) bound.
    pub max_volume: Option<f64>,
    /// Mesh the convex hull of the points.
    pub convex_hull: bool,
    /// Suppress the oracle's own output.
    pub quiet: bool,
    /// Refine the cells given in [`OracleInput::cells`] instead of meshing a boundary.
    pub refine: bool,
}

impl Default for OracleOptions {
    fn default() -> Self {
        Self {
            quality: false,
            max_volume: None,
            convex_hull: false,
            quiet: true,
            refine: false,
        }
    }
}

impl OracleOptions {
    /// Switch string in the conventional mesher syntax.
    ///
    /// `p` (boundary constrained) is always present, then `r` when
    /// refining, `q` for quality, `a` (with the bound when uniform) for a
    /// volume constraint, `c` for the convex hull, `e z` for edge output and
    /// zero-based indices, and `Q` for quiet.
    pub fn switches(&self, per_cell_volumes: bool) -> String {
        let mut s = String::from("p");
        if self.refine {
            s.push('r');
        }
        if self.quality {
            s.push('q');
        }
        match self.max_volume {
            Some(v) => s.push_str(&format!("a{v}")),
            None if per_cell_volumes => s.push('a'),
            None => {}
        }
        if self.convex_hull {
            s.push('c');
        }
        s.push_str("ez");
        if self.quiet {
            s.push('Q');
        }
        s
    }
}

/// Flat description handed to the oracle. Indices are 0-based into `points`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OracleInput {
    /// Spatial dimension (stride of `points` and `holes`).
    pub dimension: usize,
    pub points: Vec<f64>,
    pub point_markers: Vec<i32>,
    /// Boundary segments as index pairs (2-D).
    pub segments: Vec<usize>,
    pub segment_markers: Vec<i32>,
    /// Boundary facets as index triples (3-D).
    pub facets: Vec<usize>,
    pub facet_markers: Vec<i32>,
    pub holes: Vec<f64>,
    /// Existing cells, when refining.
    pub cells: Vec<usize>,
    /// Vertices per cell in `cells`.
    pub corners: usize,
    /// Per-cell bound, parallel to `cells`; empty when unused.
    pub max_volumes: Vec<f64>,
    pub options: OracleOptions,
}

impl OracleInput {
    pub fn num_points(&self) -> usize {
        self.points.len().checked_div(self.dimension).unwrap_or(0)
    }
}

/// What the oracle produced. Indices are 0-based into `points`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OracleOutput {
    pub points: Vec<f64>,
    pub point_markers: Vec<i32>,
    pub cells: Vec<usize>,
    /// 3 for triangles, 4 for tetrahedra.
    pub corners: usize,
    pub edges: Vec<usize>,
    pub edge_markers: Vec<i32>,
    /// Boundary triangles (3-D only).
    pub faces: Vec<usize>,
    pub face_markers: Vec<i32>,
}

impl OracleOutput {
    /// Structural checks before the output is turned into topology.
    pub fn validate(&self, dimension: usize) -> Result<(), OracleError> {
        let bad = |m: String| Err(OracleError::InvalidOutput(m));
        if dimension == 0 || self.points.len() % dimension != 0 {
            return bad(format!("{} coordinates for dimension {dimension}", self.points.len()));
        }
        let np = self.points.len() / dimension;
        if !self.point_markers.is_empty() && self.point_markers.len() != np {
            return bad(format!("{} point markers for {np} points", self.point_markers.len()));
        }
        if self.corners == 0 || self.cells.len() % self.corners != 0 {
            return bad(format!("{} indices for {} corners", self.cells.len(), self.corners));
        }
        if self.edges.len() % 2 != 0 || self.edge_markers.len() * 2 > self.edges.len() {
            return bad("edge arrays do not match".into());
        }
        if self.faces.len() % 3 != 0 || self.face_markers.len() * 3 > self.faces.len() {
            return bad("face arrays do not match".into());
        }
        let max = self
            .cells
            .iter()
            .chain(&self.edges)
            .chain(&self.faces)
            .copied()
            .max();
        if let Some(m) = max.filter(|&m| m >= np) {
            return bad(format!("index {m} out of {np} points"));
        }
        Ok(())
    }
}

/// One mesher variant.
pub trait TriangulationOracle: Send + Sync {
    fn name(&self) -> &str;
    /// Spatial dimension this oracle meshes (2 or 3).
    fn dimension(&self) -> usize;
    fn triangulate(&self, input: &OracleInput) -> Result<OracleOutput, OracleError>;
}

/// Oracles by spatial dimension.
#[derive(Clone, Default)]
pub struct OracleRegistry {
    oracles: Vec<Arc<dyn TriangulationOracle>>,
}

impl fmt::Debug for OracleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.oracles.iter().map(|o| (o.name(), o.dimension())))
            .finish()
    }
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `oracle`, replacing any previous one of the same dimension.
    pub fn register<O>(&mut self, oracle: O) -> &mut Self
    where
        O: TriangulationOracle + 'static,
    {
        let dim = oracle.dimension();
        self.oracles.retain(|o| o.dimension() != dim);
        self.oracles.push(Arc::new(oracle));
        self
    }

    pub fn with<O>(mut self, oracle: O) -> Self
    where
        O: TriangulationOracle + 'static,
    {
        self.register(oracle);
        self
    }

    /// The oracle for `dimension`.
    ///
    /// # Errors
    /// [`MeshSieveError::UnsupportedConfiguration`] when none is registered.
    pub fn select(
        &self,
        operation: &'static str,
        dimension: usize,
    ) -> Result<&dyn TriangulationOracle, MeshSieveError> {
        self.oracles
            .iter()
            .find(|o| o.dimension() == dimension)
            .map(|o| o.as_ref())
            .ok_or(MeshSieveError::UnsupportedConfiguration {
                operation,
                dimension,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fails;

    impl TriangulationOracle for Fails {
        fn name(&self) -> &str {
            "fails"
        }
        fn dimension(&self) -> usize {
            3
        }
        fn triangulate(&self, _: &OracleInput) -> Result<OracleOutput, OracleError> {
            Err(OracleError::Failed("no".into()))
        }
    }

    #[test]
    fn switch_strings() {
        let mut o = OracleOptions {
            quality: true,
            ..Default::default()
        };
        assert_eq!(o.switches(false), "pqezQ");
        o.max_volume = Some(0.5);
        o.convex_hull = true;
        o.refine = true;
        o.quiet = false;
        assert_eq!(o.switches(false), "prqa0.5cez");
        o.max_volume = None;
        assert_eq!(o.switches(true), "prqacez");
    }

    #[test]
    fn registry_selects_by_dimension() {
        let reg = OracleRegistry::new().with(Fails);
        assert_eq!(reg.select("generate", 3).unwrap().name(), "fails");
        assert!(matches!(
            reg.select("generate", 2),
            Err(MeshSieveError::UnsupportedConfiguration { dimension: 2, .. })
        ));
    }

    #[test]
    fn output_validation() {
        let out = OracleOutput {
            points: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            cells: vec![0, 1, 2],
            corners: 3,
            ..Default::default()
        };
        out.validate(2).unwrap();
        let bad = OracleOutput {
            cells: vec![0, 1, 3],
            ..out.clone()
        };
        assert!(bad.validate(2).is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let o: OracleOptions = serde_json::from_str(r#"{"quality": true}"#).unwrap();
        assert!(o.quality && o.quiet && !o.refine);
    }
}
