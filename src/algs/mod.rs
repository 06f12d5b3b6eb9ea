//! Re-export public algorithms.

pub mod build_topology;
pub mod communicator;
pub mod completion;
pub mod distribute;
pub mod numbering;
pub mod partition;
pub mod unify;
pub mod wire;

pub use build_topology::{BuildOptions, BuiltTopology, ManifoldPolicy, build_coordinates, build_topology};
pub use completion::complete_section;
pub use distribute::{check_overlap_symmetry, compute_overlap, distribute};
pub use numbering::{StratumKey, global_numbering, local_numbering};
pub use partition::Partition;
pub use unify::unify;
