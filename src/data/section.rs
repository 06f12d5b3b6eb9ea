//! Section: Field data storage over a topology atlas.
//!
//! The `Section<V>` type couples an [`Atlas`] (mapping points to slices in a
//! contiguous array) with a `Vec<V>` holding the values. Coordinates, per-cell
//! volume constraints and any field that must follow the mesh through
//! distribution are stored this way.

use crate::data::atlas::Atlas;
use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;

/// Storage for per-point field data, backed by an `Atlas`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Section<V> {
    atlas: Atlas,
    data: Vec<V>,
}

impl<V: Clone + Default> Section<V> {
    /// Construct a new `Section` over an existing `Atlas`, filled with `V::default()`.
    pub fn new(atlas: Atlas) -> Self {
        let data = vec![V::default(); atlas.total_len()];
        Section { atlas, data }
    }

    /// Section with `len` values on every point of `points`.
    pub fn with_uniform<I>(points: I, len: usize) -> Result<Self, MeshSieveError>
    where
        I: IntoIterator<Item = PointId>,
    {
        let mut atlas = Atlas::default();
        for p in points {
            atlas.try_insert(p, len)?;
        }
        Ok(Self::new(atlas))
    }

    /// Read-only view of the values at `p`.
    ///
    /// # Errors
    /// [`MeshSieveError::PointNotInAtlas`] if `p` has no slice.
    #[inline]
    pub fn try_restrict(&self, p: PointId) -> Result<&[V], MeshSieveError> {
        let (offset, len) = self
            .atlas
            .get(p)
            .ok_or(MeshSieveError::PointNotInAtlas(p))?;
        Ok(&self.data[offset..offset + len])
    }

    /// Mutable view of the values at `p`.
    #[inline]
    pub fn try_restrict_mut(&mut self, p: PointId) -> Result<&mut [V], MeshSieveError> {
        let (offset, len) = self
            .atlas
            .get(p)
            .ok_or(MeshSieveError::PointNotInAtlas(p))?;
        Ok(&mut self.data[offset..offset + len])
    }

    /// Overwrite the values at `p`.
    ///
    /// # Errors
    /// [`MeshSieveError::SliceLengthMismatch`] if `val` has the wrong length.
    pub fn try_set(&mut self, p: PointId, val: &[V]) -> Result<(), MeshSieveError> {
        let target = self.try_restrict_mut(p)?;
        if target.len() != val.len() {
            return Err(MeshSieveError::SliceLengthMismatch {
                point: p,
                expected: target.len(),
                found: val.len(),
            });
        }
        target.clone_from_slice(val);
        Ok(())
    }

    /// Add `p` with a default-filled slice of length `len`.
    pub fn try_add_point(&mut self, p: PointId, len: usize) -> Result<(), MeshSieveError> {
        self.atlas.try_insert(p, len)?;
        self.data.resize(self.atlas.total_len(), V::default());
        Ok(())
    }

    /// Add `p` and set its values in one step.
    pub fn insert(&mut self, p: PointId, val: &[V]) -> Result<(), MeshSieveError> {
        self.try_add_point(p, val.len())?;
        self.try_set(p, val)
    }

    /// Iterate over `(PointId, &[V])` in atlas order.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, &[V])> {
        self.atlas
            .iter_entries()
            .map(move |(p, (off, len))| (p, &self.data[off..off + len]))
    }

    /// New section holding the points `map` sends somewhere, under their new handles.
    ///
    /// Used when a fragment is rebuilt with fresh handles.
    pub fn remapped<F>(&self, mut map: F) -> Result<Self, MeshSieveError>
    where
        F: FnMut(PointId) -> Option<PointId>,
    {
        let mut out = Section::default();
        for (p, vals) in self.iter() {
            if let Some(q) = map(p) {
                out.insert(q, vals)?;
            }
        }
        Ok(out)
    }
}

impl<V> Section<V> {
    #[inline]
    pub fn atlas(&self) -> &Atlas {
        &self.atlas
    }

    #[inline]
    pub fn contains(&self, p: PointId) -> bool {
        self.atlas.contains(p)
    }

    /// Number of points carrying values.
    #[inline]
    pub fn len(&self) -> usize {
        self.atlas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.atlas.is_empty()
    }

    /// Flat value buffer in atlas order.
    #[inline]
    pub fn as_flat_slice(&self) -> &[V] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn set_and_restrict() {
        let mut s = Section::<f64>::with_uniform([pid(1), pid(2)], 2).unwrap();
        s.try_set(pid(2), &[3.0, 4.0]).unwrap();
        assert_eq!(s.try_restrict(pid(2)).unwrap(), &[3.0, 4.0]);
        assert_eq!(s.try_restrict(pid(1)).unwrap(), &[0.0, 0.0]);
        assert_eq!(s.as_flat_slice(), &[0.0, 0.0, 3.0, 4.0]);
    }

    #[test]
    fn length_and_membership_errors() {
        let mut s = Section::<f64>::with_uniform([pid(1)], 2).unwrap();
        assert_eq!(
            s.try_set(pid(1), &[1.0]),
            Err(MeshSieveError::SliceLengthMismatch {
                point: pid(1),
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            s.try_restrict(pid(9)).unwrap_err(),
            MeshSieveError::PointNotInAtlas(pid(9))
        );
    }

    #[test]
    fn remap_drops_and_relabels() {
        let mut s = Section::<i32>::default();
        s.insert(pid(1), &[10]).unwrap();
        s.insert(pid(2), &[20]).unwrap();
        let r = s
            .remapped(|p| (p == pid(2)).then(|| pid(7)))
            .unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.try_restrict(pid(7)).unwrap(), &[20]);
    }
}
