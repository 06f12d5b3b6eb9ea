//! Mesh generation and refinement through a triangulation oracle.
//!
//! The orchestrator converts a fragment into the flat arrays an oracle
//! understands, calls the oracle registered for the target dimension on the
//! root rank, turns the answer back into a fragment with
//! [`build_topology`], re-attaches coordinates and boundary markers, and
//! distributes the result when more than one rank takes part.
//!
//! Dimension and depth are checked on every rank before the oracle runs;
//! an unsupported request never reaches the oracle.

pub mod oracle;
pub mod uniform;

pub use oracle::{
    OracleError, OracleInput, OracleOptions, OracleOutput, OracleRegistry, TriangulationOracle,
};
pub use uniform::UniformRefiner;

use crate::algs::build_topology::{BuildOptions, ManifoldPolicy, build_coordinates, build_topology};
use crate::algs::communicator::{Communicator, agree};
use crate::algs::distribute::distribute;
use crate::algs::numbering::{Numbering, StratumKey, local_numbering};
use crate::algs::partition::Partition;
use crate::algs::unify::unify;
use crate::fragment::{DistributionState, MeshFragment};
use crate::mesh_error::MeshSieveError;
use crate::topology::labels::{LABEL_UNSET, MARKER_LABEL};
use crate::topology::orientation::oriented_vertices;
use crate::topology::point::PointId;
use crate::topology::sieve::SieveQueryExt;

/// Options shared by generation and refinement.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Materialise edges (and faces) in the result.
    pub interpolate: bool,
    pub manifold_policy: ManifoldPolicy,
    /// Rank that runs the oracle.
    pub root: usize,
    pub quality: bool,
    /// Uniform area/volume bound for [`generate_mesh`].
    pub max_volume: Option<f64>,
    pub convex_hull: bool,
    pub quiet: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            interpolate: false,
            manifold_policy: ManifoldPolicy::Reject,
            root: 0,
            quality: false,
            max_volume: None,
            convex_hull: false,
            quiet: true,
        }
    }
}

impl GenerationOptions {
    fn oracle_options(&self, refine: bool) -> OracleOptions {
        OracleOptions {
            quality: self.quality,
            max_volume: self.max_volume,
            convex_hull: self.convex_hull,
            quiet: self.quiet,
            refine,
        }
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            interpolate: self.interpolate,
            manifold: self.manifold_policy,
        }
    }
}

/// Refinement bound.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxVolume {
    /// Same bound for every cell.
    Uniform(f64),
    /// First value of the named cell section.
    PerCell(String),
}

/// Vertex coordinates and markers in numbering order.
fn vertex_arrays(
    fragment: &MeshFragment,
    numbering: &Numbering,
) -> Result<(Vec<f64>, Vec<i32>), MeshSieveError> {
    let mut points = Vec::with_capacity(numbering.len() * fragment.spatial_dim);
    let mut markers = Vec::with_capacity(numbering.len());
    for &v in numbering.points() {
        let xyz = fragment.vertex_coordinates(v)?;
        if xyz.len() != fragment.spatial_dim {
            return Err(MeshSieveError::SliceLengthMismatch {
                point: v,
                expected: fragment.spatial_dim,
                found: xyz.len(),
            });
        }
        points.extend_from_slice(xyz);
        markers.push(fragment.labels.get_value(MARKER_LABEL, v));
    }
    Ok((points, markers))
}

/// Dense indices of the vertices of `p`, in the order `p` traverses them.
fn vertex_indices(
    fragment: &MeshFragment,
    numbering: &Numbering,
    p: PointId,
    expected: usize,
) -> Result<Vec<usize>, MeshSieveError> {
    let verts = oriented_vertices(&fragment.sieve, p);
    if verts.len() != expected {
        return Err(MeshSieveError::MalformedInput(format!(
            "entity {p} has {} vertices, expected {expected}",
            verts.len()
        )));
    }
    verts
        .into_iter()
        .map(|v| numbering.index_of(v).ok_or(MeshSieveError::MissingPoint(v)))
        .collect()
}

/// Oracle input describing the boundary `boundary` (segments in 2-D,
/// triangular facets in 3-D).
fn boundary_input(boundary: &MeshFragment, opts: &GenerationOptions) -> Result<OracleInput, MeshSieveError> {
    let numbering = local_numbering(&boundary.sieve, StratumKey::Depth(0))?;
    let (points, point_markers) = vertex_arrays(boundary, &numbering)?;
    let mut input = OracleInput {
        dimension: boundary.spatial_dim,
        points,
        point_markers,
        holes: boundary.holes.clone(),
        options: opts.oracle_options(false),
        ..OracleInput::default()
    };
    let top = boundary.sieve.max_depth()?;
    match boundary.dimension {
        1 => {
            for s in boundary.sieve.depth_stratum(1)? {
                input.segments.extend(vertex_indices(boundary, &numbering, s, 2)?);
                input.segment_markers.push(boundary.labels.get_value(MARKER_LABEL, s));
            }
        }
        _ => {
            for f in boundary.sieve.depth_stratum(top)? {
                input.facets.extend(vertex_indices(boundary, &numbering, f, 3)?);
                input.facet_markers.push(boundary.labels.get_value(MARKER_LABEL, f));
            }
        }
    }
    Ok(input)
}

/// Rebuilds a fragment from oracle output.
///
/// With interpolation, edge markers land on the edge joining their two
/// vertices, and face markers on the face joining their three edges, then
/// spread over the face's closure.
fn fragment_from_output(
    out: &OracleOutput,
    dimension: usize,
    opts: &GenerationOptions,
    holes: &[f64],
) -> Result<MeshFragment, MeshSieveError> {
    out.validate(dimension)?;
    let nv = out.points.len() / dimension;
    let built = build_topology(&out.cells, nv, out.corners, &opts.build_options())?;
    let coords = build_coordinates(&built.vertices, dimension, &out.points)?;
    let vertices = built.vertices;
    let mut frag = MeshFragment::new(built.sieve, built.dimension, dimension);
    frag.set_coordinates(coords);
    frag.holes = holes.to_vec();

    for (&v, &m) in vertices.iter().zip(&out.point_markers) {
        if m != LABEL_UNSET {
            frag.labels.set_value(MARKER_LABEL, v, m);
        }
    }
    if opts.interpolate {
        for (pair, &m) in out.edges.chunks_exact(2).zip(&out.edge_markers) {
            if m == LABEL_UNSET {
                continue;
            }
            let e = frag.sieve.unique_join(&[vertices[pair[0]], vertices[pair[1]]], 1)?;
            frag.labels.set_value(MARKER_LABEL, e, m);
        }
        if dimension == 3 {
            for (tri, &m) in out.faces.chunks_exact(3).zip(&out.face_markers) {
                if m == LABEL_UNSET {
                    continue;
                }
                let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| vertices[i]);
                let edges = [
                    frag.sieve.unique_join(&[a, b], 1)?,
                    frag.sieve.unique_join(&[b, c], 1)?,
                    frag.sieve.unique_join(&[c, a], 1)?,
                ];
                let face = frag.sieve.unique_join(&edges, 1)?;
                frag.labels.set_value(MARKER_LABEL, face, m);
                frag.labels
                    .propagate_through_closure(&frag.sieve, MARKER_LABEL, face);
            }
        }
    }
    log::info!(
        "oracle produced {} vertices and {} cells",
        nv,
        out.cells.len() / out.corners
    );
    Ok(frag)
}

fn check_generate(boundary: &MeshFragment) -> Result<usize, MeshSieveError> {
    let target = boundary.dimension + 1;
    if !matches!(boundary.dimension, 1 | 2) || boundary.spatial_dim != target {
        return Err(MeshSieveError::UnsupportedConfiguration {
            operation: "generate_mesh",
            dimension: boundary.dimension,
        });
    }
    Ok(target)
}

/// Collective: meshes the domain bounded by `boundary`.
///
/// `boundary` is a 1-D fragment (segments in the plane) for a 2-D mesh or a
/// 2-D fragment (triangles in space) for a 3-D mesh; only the root's copy is
/// read. Vertex and segment/facet markers come from the `marker` label.
///
/// # Errors
/// * [`MeshSieveError::UnsupportedConfiguration`] for any other boundary
///   dimension or a missing oracle, before any work.
/// * [`MeshSieveError::Oracle`] when the oracle fails.
pub fn generate_mesh<C>(
    boundary: &MeshFragment,
    registry: &OracleRegistry,
    opts: &GenerationOptions,
    comm: &C,
) -> Result<MeshFragment, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let target = check_generate(boundary)?;
    let oracle = registry.select("generate_mesh", target)?;

    let produced = if comm.rank() == opts.root {
        boundary_input(boundary, opts).and_then(|input| {
            log::info!(
                "generating {target}-D mesh with `{}` ({} boundary points, switches {})",
                oracle.name(),
                input.num_points(),
                input.options.switches(false)
            );
            let out = oracle.triangulate(&input)?;
            fragment_from_output(&out, target, opts, &boundary.holes)
        })
    } else {
        Ok(MeshFragment::empty_like(boundary, DistributionState::Local))
    };
    let mut mesh = agree(comm, "generate_mesh", produced)?;
    mesh.dimension = target;
    mesh.spatial_dim = target;
    redistribute(mesh, opts.root, comm)
}

fn redistribute<C>(mesh: MeshFragment, root: usize, comm: &C) -> Result<MeshFragment, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    if comm.size() <= 1 {
        return Ok(mesh);
    }
    let partition = if comm.rank() == root {
        Partition::block(&mesh.cells()?, comm.size())
    } else {
        Partition::new()
    };
    distribute(&mesh, &partition, comm, root)
}

/// Dimension and depth checks shared by both refinement entry points.
fn check_refine(mesh: &MeshFragment) -> Result<usize, MeshSieveError> {
    let dim = mesh.dimension;
    if !matches!(dim, 2 | 3) || mesh.spatial_dim != dim {
        return Err(MeshSieveError::UnsupportedConfiguration {
            operation: "refine_mesh",
            dimension: dim,
        });
    }
    if !mesh.is_empty() {
        let depth = mesh.sieve.max_depth()? as usize;
        if depth != 1 && depth != dim {
            return Err(MeshSieveError::UnsupportedConfiguration {
                operation: "refine_mesh",
                dimension: depth,
            });
        }
    }
    Ok(dim)
}

/// Oracle input for refining every cell of `mesh`.
fn refine_input(
    mesh: &MeshFragment,
    max_volume: &MaxVolume,
    opts: &GenerationOptions,
) -> Result<OracleInput, MeshSieveError> {
    let dim = mesh.dimension;
    let numbering = local_numbering(&mesh.sieve, StratumKey::Depth(0))?;
    let (points, point_markers) = vertex_arrays(mesh, &numbering)?;
    let mut options = opts.oracle_options(true);
    options.max_volume = None;

    let cells = mesh.cells()?;
    let mut input = OracleInput {
        dimension: dim,
        points,
        point_markers,
        corners: dim + 1,
        holes: mesh.holes.clone(),
        ..OracleInput::default()
    };
    for &c in &cells {
        input.cells.extend(vertex_indices(mesh, &numbering, c, dim + 1)?);
    }
    match max_volume {
        MaxVolume::Uniform(v) => options.max_volume = Some(*v),
        MaxVolume::PerCell(name) => {
            let section = mesh.sections.get(name).ok_or_else(|| {
                MeshSieveError::MalformedInput(format!("no cell section named `{name}`"))
            })?;
            for &c in &cells {
                let v = section
                    .try_restrict(c)?
                    .first()
                    .copied()
                    .ok_or(MeshSieveError::ZeroLengthSlice)?;
                input.max_volumes.push(v);
            }
        }
    }
    input.options = options;

    if mesh.is_interpolated()? {
        if dim == 2 {
            for e in mesh.sieve.depth_stratum(1)? {
                let m = mesh.labels.get_value(MARKER_LABEL, e);
                if m != LABEL_UNSET {
                    input.segments.extend(vertex_indices(mesh, &numbering, e, 2)?);
                    input.segment_markers.push(m);
                }
            }
        } else {
            for f in mesh.sieve.height_stratum(1)? {
                let m = mesh.labels.get_value(MARKER_LABEL, f);
                if m != LABEL_UNSET {
                    input.facets.extend(vertex_indices(mesh, &numbering, f, 3)?);
                    input.facet_markers.push(m);
                }
            }
        }
    }
    Ok(input)
}

fn run_refinement(
    mesh: &MeshFragment,
    oracle: &dyn TriangulationOracle,
    max_volume: &MaxVolume,
    opts: &GenerationOptions,
) -> Result<MeshFragment, MeshSieveError> {
    let input = refine_input(mesh, max_volume, opts)?;
    log::info!(
        "refining {} cells with `{}` (switches {})",
        input.cells.len() / input.corners,
        oracle.name(),
        input.options.switches(!input.max_volumes.is_empty())
    );
    let out = oracle.triangulate(&input)?;
    fragment_from_output(&out, mesh.dimension, opts, &mesh.holes)
}

/// Collective: refines the whole mesh under `max_volume`.
///
/// A distributed mesh is unified on the root first; the refined mesh is
/// redistributed with a block partition when more than one rank takes part.
///
/// # Errors
/// [`MeshSieveError::UnsupportedConfiguration`] on every rank when the
/// dimension has no oracle or a fragment has a depth other than 1 or its
/// dimension. Oracle failures on the root abort every rank.
pub fn refine_mesh<C>(
    mesh: &MeshFragment,
    max_volume: &MaxVolume,
    registry: &OracleRegistry,
    opts: &GenerationOptions,
    comm: &C,
) -> Result<MeshFragment, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let dim = agree(comm, "refine_mesh", check_refine(mesh))?;
    let oracle = registry.select("refine_mesh", dim)?;

    let whole = if mesh.state == DistributionState::Distributed {
        unify(mesh, comm, opts.root)?
    } else {
        mesh.clone()
    };
    let refined = if comm.rank() == opts.root {
        run_refinement(&whole, oracle, max_volume, opts)
    } else {
        Ok(MeshFragment::empty_like(mesh, DistributionState::Local))
    };
    let refined = agree(comm, "refine_mesh", refined)?;
    redistribute(refined, opts.root, comm)
}

/// Refines this fragment alone, with no communication.
///
/// The result is a `Local` fragment; shared points are not kept consistent
/// with other ranks.
pub fn refine_mesh_local(
    mesh: &MeshFragment,
    max_volume: &MaxVolume,
    registry: &OracleRegistry,
    opts: &GenerationOptions,
) -> Result<MeshFragment, MeshSieveError> {
    let dim = check_refine(mesh)?;
    let oracle = registry.select("refine_mesh_local", dim)?;
    if mesh.is_empty() {
        return Ok(MeshFragment::empty_like(mesh, DistributionState::Local));
    }
    run_refinement(mesh, oracle, max_volume, opts)
}
