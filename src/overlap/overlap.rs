//! Overlap: per-rank correspondence of shared mesh points.
//!
//! For every local point that also exists on other ranks, the overlap stores
//! one [`Remote`] per other rank: the rank and the point's handle there.
//! After distribution the relation is symmetric across ranks; that is
//! checked collectively by
//! [`check_overlap_symmetry`](crate::algs::distribute::check_overlap_symmetry).
//!
//! Ownership of a shared point goes to the lowest rank holding it.

use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;
use std::collections::{BTreeMap, BTreeSet};

/// The copy of a local point held by another rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Remote {
    pub rank: usize,
    pub remote_point: PointId,
}

/// Local view of the shared points.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Overlap {
    links: BTreeMap<PointId, Vec<Remote>>,
}

impl Overlap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `local` is `remote` on `rank`.
    ///
    /// Returns `false` if the identical link already existed.
    ///
    /// # Errors
    /// [`MeshSieveError::OverlapAsymmetry`] if `local` is already linked to a
    /// different point on `rank`.
    pub fn add_link(
        &mut self,
        local: PointId,
        rank: usize,
        remote: PointId,
    ) -> Result<bool, MeshSieveError> {
        let remotes = self.links.entry(local).or_default();
        match remotes.iter().find(|r| r.rank == rank) {
            Some(r) if r.remote_point == remote => Ok(false),
            Some(r) => Err(MeshSieveError::OverlapAsymmetry {
                neighbor: rank,
                message: format!(
                    "point {local} already linked to {} on rank {rank}, got {remote}",
                    r.remote_point
                ),
            }),
            None => {
                remotes.push(Remote {
                    rank,
                    remote_point: remote,
                });
                remotes.sort_unstable();
                Ok(true)
            }
        }
    }

    /// Remote copies of `p`, ascending by rank.
    pub fn links(&self, p: PointId) -> &[Remote] {
        self.links.get(&p).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Handle of `p` on `rank`.
    pub fn remote(&self, p: PointId, rank: usize) -> Option<PointId> {
        self.links(p)
            .iter()
            .find(|r| r.rank == rank)
            .map(|r| r.remote_point)
    }

    /// `(local, remote)` pairs shared with `rank`, ascending by local point.
    pub fn links_to(&self, rank: usize) -> Vec<(PointId, PointId)> {
        self.links
            .iter()
            .filter_map(|(&p, rs)| {
                rs.iter()
                    .find(|r| r.rank == rank)
                    .map(|r| (p, r.remote_point))
            })
            .collect()
    }

    /// Ranks this rank shares at least one point with.
    pub fn neighbor_ranks(&self) -> BTreeSet<usize> {
        self.links
            .values()
            .flat_map(|rs| rs.iter().map(|r| r.rank))
            .collect()
    }

    /// Shared local points, ascending.
    pub fn shared_points(&self) -> impl Iterator<Item = PointId> + '_ {
        self.links.keys().copied()
    }

    /// Other ranks holding `p`.
    pub fn sharers(&self, p: PointId) -> Vec<usize> {
        self.links(p).iter().map(|r| r.rank).collect()
    }

    /// Owning rank of `p` as seen from `my_rank`: the minimum holder.
    pub fn owner(&self, p: PointId, my_rank: usize) -> usize {
        self.links(p)
            .iter()
            .map(|r| r.rank)
            .fold(my_rank, usize::min)
    }

    #[inline]
    pub fn is_owned(&self, p: PointId, my_rank: usize) -> bool {
        self.owner(p, my_rank) == my_rank
    }

    /// Number of shared local points.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Local structural checks: no link to `my_rank` itself, no two local
    /// points claiming the same remote point on one rank.
    pub fn validate_invariants(&self, my_rank: usize) -> Result<(), MeshSieveError> {
        let mut seen: BTreeSet<(usize, PointId)> = BTreeSet::new();
        for (&p, rs) in &self.links {
            for r in rs {
                if r.rank == my_rank {
                    return Err(MeshSieveError::OverlapAsymmetry {
                        neighbor: my_rank,
                        message: format!("point {p} linked to its own rank"),
                    });
                }
                if !seen.insert((r.rank, r.remote_point)) {
                    return Err(MeshSieveError::OverlapAsymmetry {
                        neighbor: r.rank,
                        message: format!(
                            "remote point {} claimed by more than one local point",
                            r.remote_point
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn links_and_ownership() {
        let mut o = Overlap::new();
        assert!(o.add_link(pid(1), 2, pid(10)).unwrap());
        assert!(o.add_link(pid(1), 0, pid(11)).unwrap());
        assert!(!o.add_link(pid(1), 2, pid(10)).unwrap());
        assert!(o.add_link(pid(1), 2, pid(12)).is_err());
        o.add_link(pid(3), 2, pid(13)).unwrap();

        assert_eq!(o.sharers(pid(1)), vec![0, 2]);
        assert_eq!(o.remote(pid(1), 0), Some(pid(11)));
        assert_eq!(o.links_to(2), vec![(pid(1), pid(10)), (pid(3), pid(13))]);
        assert_eq!(o.neighbor_ranks(), BTreeSet::from([0, 2]));
        assert_eq!(o.owner(pid(1), 1), 0);
        assert_eq!(o.owner(pid(3), 1), 1);
        assert!(o.is_owned(pid(7), 1));
        o.validate_invariants(1).unwrap();
        assert!(o.validate_invariants(2).is_err());
    }
}
