//! MeshSieveError: Unified error type for sieve-plex public APIs
//!
//! Every fallible operation in the crate returns `Result<_, MeshSieveError>`.
//! Variants are grouped into four categories (see [`ErrorKind`]) so callers can
//! react to the class of failure without matching every variant.

use crate::mesh_generation::oracle::OracleError;
use crate::topology::point::PointId;
use thiserror::Error;

/// Coarse classification of a [`MeshSieveError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input topology or data.
    Structural,
    /// Cross-rank invariants were violated.
    Consistency,
    /// The requested dimension/operation is not available.
    UnsupportedConfiguration,
    /// The external triangulation capability failed.
    OracleFailure,
}

/// Unified error type for sieve-plex operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshSieveError {
    /// Attempted to construct a PointId with a zero value (invalid).
    #[error("PointId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidPointId,
    /// An arrow from a point to itself.
    #[error("Topology error: self-loop on point {0}")]
    SelfLoop(PointId),
    /// The same arrow was inserted twice with different orientations.
    #[error("Topology error: arrow {src} -> {dst} already has orientation {existing}, got {requested}")]
    OrientationConflict {
        src: PointId,
        dst: PointId,
        existing: i32,
        requested: i32,
    },
    /// Arrow endpoints or a redeclared point disagree on topological dimension.
    #[error("Topology error: dimension mismatch at {point}: {message}")]
    DimensionMismatch { point: PointId, message: String },
    /// A codimension-1 entity (given by its vertices) is shared by more than two cells.
    #[error("Topology error: facet {vertices:?} has {support} incident cells (non-manifold)")]
    NonManifold {
        vertices: Vec<PointId>,
        support: usize,
    },
    /// A join that must identify a single entity matched zero or several.
    #[error("Topology error: join of {points:?} matched {found:?}, expected exactly one entity")]
    AmbiguousJoin {
        points: Vec<PointId>,
        found: Vec<PointId>,
    },
    /// The mesh topology contains a cycle; expected a DAG.
    #[error("Topology error: cycle detected in mesh (expected DAG)")]
    CycleDetected,
    /// Flat simplex or coordinate input is not well formed.
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    /// A point was referenced but is not part of the topology.
    #[error("Topology error: point {0} is not in the mesh")]
    MissingPoint(PointId),
    /// A cell was mapped to a rank outside the communicator, or left unassigned.
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),
    /// Section slice has the wrong number of values.
    #[error("Section error: point {point} expects {expected} values, got {found}")]
    SliceLengthMismatch {
        point: PointId,
        expected: usize,
        found: usize,
    },
    /// Atlas slices must hold at least one value.
    #[error("Section error: zero-length slice")]
    ZeroLengthSlice,
    /// Section access for a point that has no storage.
    #[error("Section error: point {0} is not in the atlas")]
    PointNotInAtlas(PointId),
    /// Point inserted twice into an atlas.
    #[error("Section error: point {0} already present in the atlas")]
    DuplicatePoint(PointId),
    /// Overlap links are not mirrored between two ranks.
    #[error("Overlap asymmetry with rank {neighbor}: {message}")]
    OverlapAsymmetry { neighbor: usize, message: String },
    /// A shared point is missing its link to the owning rank.
    #[error("Overlap error: point {point} has no link to rank {rank}")]
    OverlapLinkMissing { point: PointId, rank: usize },
    /// Numbering produced a duplicate or unknown index.
    #[error("Numbering collision: {0}")]
    NumberingCollision(String),
    /// Transport failure while talking to a neighbour.
    #[error("Communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
    /// A received payload did not have the announced length.
    #[error("Buffer size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A record or byte count too large for the `u32` wire header.
    #[error("Wire count {0} exceeds the u32 header range")]
    WireCountOverflow(usize),
    /// Another rank failed during a collective operation.
    #[error("Collective operation `{0}` aborted on a remote rank")]
    CollectiveAbort(&'static str),
    /// No capability registered for this dimension, or an unsupported depth.
    #[error("Unsupported configuration for {operation}: dimension {dimension}")]
    UnsupportedConfiguration {
        operation: &'static str,
        dimension: usize,
    },
    /// The triangulation oracle reported a failure.
    #[error("Triangulation oracle failed: {0}")]
    Oracle(#[from] OracleError),
}

impl MeshSieveError {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use MeshSieveError::*;
        match self {
            InvalidPointId
            | SelfLoop(_)
            | OrientationConflict { .. }
            | DimensionMismatch { .. }
            | NonManifold { .. }
            | AmbiguousJoin { .. }
            | CycleDetected
            | MalformedInput(_)
            | MissingPoint(_)
            | InvalidPartition(_)
            | SliceLengthMismatch { .. }
            | ZeroLengthSlice
            | PointNotInAtlas(_)
            | DuplicatePoint(_) => ErrorKind::Structural,
            OverlapAsymmetry { .. }
            | OverlapLinkMissing { .. }
            | NumberingCollision(_)
            | CommError { .. }
            | BufferSizeMismatch { .. }
            | WireCountOverflow(_)
            | CollectiveAbort(_) => ErrorKind::Consistency,
            UnsupportedConfiguration { .. } => ErrorKind::UnsupportedConfiguration,
            Oracle(_) => ErrorKind::OracleFailure,
        }
    }
}
