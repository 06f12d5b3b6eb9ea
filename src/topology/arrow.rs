//! Arrow: directed incidence between two topological entities.
//!
//! An arrow `(src, dst)` states that `src` lies on the boundary of `dst`
//! (a vertex on an edge, an edge on a face, a face on a cell). It carries an
//! integer orientation describing how `dst` traverses `src`; see
//! [`crate::topology::orientation`] for the encoding.

use crate::topology::point::PointId;

/// A directed boundary relation `src ⊂ ∂dst` with its orientation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Arrow {
    /// The lower-dimensional entity.
    pub src: PointId,
    /// The entity whose cone contains `src`.
    pub dst: PointId,
    /// Orientation of `src` as seen from `dst` (0 = identity).
    pub orientation: i32,
}

impl Arrow {
    /// Construct a new arrow `src → dst` with the given orientation.
    ///
    /// ```rust
    /// use sieve_plex::topology::arrow::Arrow;
    /// use sieve_plex::topology::point::PointId;
    /// let a = Arrow::new(PointId::new(1).unwrap(), PointId::new(2).unwrap(), -1);
    /// assert_eq!(a.endpoints(), (PointId::new(1).unwrap(), PointId::new(2).unwrap()));
    /// ```
    #[inline]
    pub fn new(src: PointId, dst: PointId, orientation: i32) -> Self {
        Arrow {
            src,
            dst,
            orientation,
        }
    }

    /// Arrow with identity orientation.
    #[inline]
    pub fn unoriented(src: PointId, dst: PointId) -> Self {
        Self::new(src, dst, 0)
    }

    #[inline]
    pub fn endpoints(&self) -> (PointId, PointId) {
        (self.src, self.dst)
    }
}
