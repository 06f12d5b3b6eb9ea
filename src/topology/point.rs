//! `PointId`: a strong, zero-cost handle for mesh entities
//!
//! Every entity of a mesh (cell, face, edge, vertex) is an opaque point.
//! `PointId` wraps a nonzero `u64` so that 0 stays free as a sentinel value
//! and `Option<PointId>` costs nothing extra.

use crate::mesh_error::MeshSieveError;
use std::{fmt, num::NonZeroU64};

/// Opaque handle of a topological entity.
///
/// Handles are only meaningful within one rank's store; cross-rank identity
/// goes through the overlap or the global ids recorded on a fragment.
///
/// # Memory layout
/// This type is `repr(transparent)`, with the same ABI as `u64`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct PointId(NonZeroU64);

impl PointId {
    /// Creates a new `PointId` from a raw `u64` value.
    ///
    /// # Errors
    /// Returns [`MeshSieveError::InvalidPointId`] if `raw == 0`.
    ///
    /// ```rust
    /// # use sieve_plex::topology::point::PointId;
    /// let p = PointId::new(1).unwrap();
    /// assert_eq!(p.get(), 1);
    /// assert!(PointId::new(0).is_err());
    /// ```
    #[inline]
    pub fn new(raw: u64) -> Result<Self, MeshSieveError> {
        NonZeroU64::new(raw)
            .map(PointId)
            .ok_or(MeshSieveError::InvalidPointId)
    }

    /// Handle `index + 1`, for 0-based positions in flat arrays.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        // index + 1 >= 1
        PointId(NonZeroU64::MIN.saturating_add(index as u64))
    }

    /// Returns the inner `u64` value of this `PointId`.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PointId").field(&self.get()).finish()
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl TryFrom<u64> for PointId {
    type Error = MeshSieveError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        PointId::new(raw)
    }
}

/// `PointId` travels over MPI as a plain `u64`.
#[cfg(feature = "mpi-support")]
unsafe impl mpi::datatype::Equivalence for PointId {
    type Out = <u64 as mpi::datatype::Equivalence>::Out;

    fn equivalent_datatype() -> Self::Out {
        u64::equivalent_datatype()
    }
}



#[cfg(test)]
mod serde_tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let p = PointId::new(123).unwrap();
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, "123");
        let p2: PointId = serde_json::from_str(&s).unwrap();
        assert_eq!(p2, p);
    }

    #[test]
    fn json_rejects_zero() {
        assert!(serde_json::from_str::<PointId>("0").is_err());
    }

    #[test]
    fn bincode_roundtrip() {
        let p = PointId::new(456).unwrap();
        let bytes = bincode::serialize(&p).unwrap();
        let p2: PointId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(p2, p);
    }
}
