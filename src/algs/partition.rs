//! Cell-to-rank assignments consumed by [`distribute`](crate::algs::distribute::distribute).

use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;
use std::collections::BTreeMap;

/// Maps each cell of the root fragment to the rank that will own it.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Partition {
    assignment: BTreeMap<PointId, usize>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contiguous blocks of `cells` (in the given order), sizes differing by
    /// at most one, lower ranks taking the larger blocks.
    pub fn block(cells: &[PointId], nparts: usize) -> Self {
        let nparts = nparts.max(1);
        let base = cells.len() / nparts;
        let extra = cells.len() % nparts;
        let mut assignment = BTreeMap::new();
        let mut it = cells.iter();
        for rank in 0..nparts {
            let take = base + usize::from(rank < extra);
            for &c in it.by_ref().take(take) {
                assignment.insert(c, rank);
            }
        }
        Self { assignment }
    }

    pub fn from_fn<F>(cells: &[PointId], mut rank_of: F) -> Self
    where
        F: FnMut(PointId) -> usize,
    {
        Self {
            assignment: cells.iter().map(|&c| (c, rank_of(c))).collect(),
        }
    }

    pub fn assign(&mut self, cell: PointId, rank: usize) -> Option<usize> {
        self.assignment.insert(cell, rank)
    }

    #[inline]
    pub fn rank_of(&self, cell: PointId) -> Option<usize> {
        self.assignment.get(&cell).copied()
    }

    /// Cells assigned to `rank`, ascending.
    pub fn cells_of(&self, rank: usize) -> Vec<PointId> {
        self.assignment
            .iter()
            .filter_map(|(&c, &r)| (r == rank).then_some(c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Every cell in `cells` is assigned to a rank below `nparts`, and
    /// nothing else is assigned.
    pub fn validate(&self, cells: &[PointId], nparts: usize) -> Result<(), MeshSieveError> {
        for &c in cells {
            match self.rank_of(c) {
                None => {
                    return Err(MeshSieveError::InvalidPartition(format!(
                        "cell {c} is not assigned"
                    )));
                }
                Some(r) if r >= nparts => {
                    return Err(MeshSieveError::InvalidPartition(format!(
                        "cell {c} assigned to rank {r}, only {nparts} ranks"
                    )));
                }
                Some(_) => {}
            }
        }
        if self.assignment.len() != cells.len() {
            let extra = self
                .assignment
                .keys()
                .find(|p| !cells.contains(p))
                .map_or_else(|| "duplicate cells".to_string(), |p| format!("point {p}"));
            return Err(MeshSieveError::InvalidPartition(format!(
                "partition assigns {extra}, which is not a cell"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(n: u64) -> Vec<PointId> {
        (1..=n).map(|u| PointId::new(u).unwrap()).collect()
    }

    #[test]
    fn block_sizes_are_balanced() {
        let cs = cells(10);
        let p = Partition::block(&cs, 3);
        assert_eq!(p.cells_of(0).len(), 4);
        assert_eq!(p.cells_of(1).len(), 3);
        assert_eq!(p.cells_of(2).len(), 3);
        assert_eq!(p.rank_of(cs[4]), Some(1));
        p.validate(&cs, 3).unwrap();
    }

    #[test]
    fn validation_errors() {
        let cs = cells(4);
        let p = Partition::from_fn(&cs, |c| c.get() as usize % 3);
        assert!(matches!(
            p.validate(&cs, 2),
            Err(MeshSieveError::InvalidPartition(_))
        ));
        let mut q = Partition::block(&cs[..3], 2);
        assert!(q.validate(&cs, 2).is_err());
        q.assign(cs[3], 1);
        q.validate(&cs, 2).unwrap();
        q.assign(PointId::new(99).unwrap(), 0);
        assert!(q.validate(&cs, 2).is_err());
    }
}
