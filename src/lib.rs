#![cfg_attr(docsrs, feature(doc_cfg))]
//! # sieve-plex
//!
//! sieve-plex stores unstructured simplicial meshes as a *sieve*: a directed
//! incidence graph over points of every dimension (vertices, edges, faces,
//! cells) where an arrow `a -> b` says that `a` lies on the boundary of `b`.
//! On top of that store it provides
//!
//! - stratification by depth and height, cached and recomputed after mutation,
//! - a closure algebra (cones, supports, closures, stars, joins and meets),
//! - a topology builder turning flat simplex lists into (optionally
//!   interpolated) sieves with orientation bookkeeping,
//! - named integer labels with closure/star propagation,
//! - dense stratum numberings, local and across ranks,
//! - partitioning, distribution and unification of mesh fragments over a
//!   pluggable message-passing backend (serial, threads, MPI),
//! - a generate/refine orchestrator that drives an external triangulation
//!   oracle through a small capability interface.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! sieve-plex = "0.1"
//! # Optional features:
//! # features = ["rayon", "mpi-support"]
//! ```
//!
//! Every fallible operation returns `Result<_, MeshSieveError>`. Collective
//! operations (distribution, unification, numbering, generation) take the
//! communicator as an argument; running them with [`algs::communicator::NoComm`]
//! is the serial case of the same algorithm.

pub mod algs;
pub mod data;
pub mod fragment;
pub mod mesh_error;
pub mod mesh_generation;
pub mod overlap;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::build_topology::{BuildOptions, ManifoldPolicy, build_topology};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm};
    pub use crate::algs::completion::complete_section;
    pub use crate::algs::distribute::distribute;
    pub use crate::algs::numbering::{StratumKey, global_numbering, local_numbering};
    pub use crate::algs::partition::Partition;
    pub use crate::algs::unify::unify;
    pub use crate::data::atlas::Atlas;
    pub use crate::data::section::Section;
    pub use crate::fragment::{DistributionState, MeshFragment};
    pub use crate::mesh_error::{ErrorKind, MeshSieveError};
    pub use crate::mesh_generation::{
        GenerationOptions, MaxVolume, OracleRegistry, TriangulationOracle, UniformRefiner,
        generate_mesh, refine_mesh, refine_mesh_local,
    };
    pub use crate::overlap::Overlap;
    pub use crate::topology::labels::{LABEL_UNSET, LabelSet, MARKER_LABEL};
    pub use crate::topology::point::PointId;
    pub use crate::topology::sieve::{InMemorySieve, Sieve, SieveQueryExt};
}
