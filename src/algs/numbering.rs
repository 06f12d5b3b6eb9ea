//! Dense numberings of one stratum.
//!
//! [`local_numbering`] maps the points of a stratum to `0..n` in handle
//! order; it is the index space handed to the triangulation oracle. It is a
//! snapshot: after a topology rebuild a fresh numbering must be taken.
//!
//! [`global_numbering`] extends this across ranks. Each rank numbers the
//! points it owns (lowest holder rank) contiguously after the owned counts of
//! lower ranks, then owners push the index of every shared point to its
//! other holders over the overlap.

use crate::algs::communicator::{Communicator, SectionCommTags, agree, tags};
use crate::algs::completion::data_exchange::exchange_records;
use crate::algs::wire::WireLink;
use crate::fragment::MeshFragment;
use crate::mesh_error::MeshSieveError;
use crate::topology::point::PointId;
use crate::topology::sieve::InMemorySieve;
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Selects a stratum by depth (vertices = 0) or height (cells = 0).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StratumKey {
    Depth(u32),
    Height(u32),
}

impl StratumKey {
    pub fn points(self, sieve: &InMemorySieve) -> Result<Vec<PointId>, MeshSieveError> {
        match self {
            StratumKey::Depth(k) => sieve.depth_stratum(k),
            StratumKey::Height(k) => sieve.height_stratum(k),
        }
    }
}

/// Bijection between a stratum and `0..len`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Numbering {
    points: Vec<PointId>,
    index: HashMap<PointId, usize>,
}

impl Numbering {
    fn from_points(points: Vec<PointId>) -> Self {
        let index = points.iter().enumerate().map(|(i, &p)| (p, i)).collect();
        Self { points, index }
    }

    #[inline]
    pub fn index_of(&self, p: PointId) -> Option<usize> {
        self.index.get(&p).copied()
    }

    #[inline]
    pub fn point_at(&self, i: usize) -> Option<PointId> {
        self.points.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in index order.
    pub fn points(&self) -> &[PointId] {
        &self.points
    }
}

/// Dense 0-based indices for the stratum `key`, in handle order.
pub fn local_numbering(sieve: &InMemorySieve, key: StratumKey) -> Result<Numbering, MeshSieveError> {
    Ok(Numbering::from_points(key.points(sieve)?))
}

/// Stratum numbering that agrees across ranks on shared points.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalNumbering {
    indices: BTreeMap<PointId, u64>,
    owned: usize,
    global_len: u64,
}

impl GlobalNumbering {
    #[inline]
    pub fn index_of(&self, p: PointId) -> Option<u64> {
        self.indices.get(&p).copied()
    }

    /// Number of stratum points owned by this rank.
    pub fn owned_len(&self) -> usize {
        self.owned
    }

    /// Size of the stratum summed over ranks, shared points counted once.
    pub fn global_len(&self) -> u64 {
        self.global_len
    }

    /// `(point, index)` pairs, ascending by point.
    pub fn iter(&self) -> impl Iterator<Item = (PointId, u64)> + '_ {
        self.indices.iter().map(|(&p, &i)| (p, i))
    }
}

/// Collective: numbers the stratum `key` of every rank's fragment.
///
/// Owned points are ordered by global id, so the result does not depend on
/// local handle assignment.
///
/// # Errors
/// [`MeshSieveError::NumberingCollision`] when a shared point receives a
/// second index, an index for a point outside the stratum, or no index at all.
pub fn global_numbering<C>(
    fragment: &MeshFragment,
    key: StratumKey,
    comm: &C,
) -> Result<GlobalNumbering, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let me = comm.rank();
    let stratum = key.points(&fragment.sieve)?;
    let owned: Vec<PointId> = stratum
        .iter()
        .copied()
        .filter(|&p| fragment.overlap.is_owned(p, me))
        .sorted_by_key(|&p| fragment.global_id(p))
        .collect();

    let counts = comm.allgather(&(owned.len() as u64).to_le_bytes())?;
    let mut offset = 0u64;
    let mut global_len = 0u64;
    for (rank, raw) in counts.iter().enumerate() {
        let arr: [u8; 8] =
            raw.as_slice()
                .try_into()
                .map_err(|_| MeshSieveError::BufferSizeMismatch {
                    neighbor: rank,
                    expected: 8,
                    got: raw.len(),
                })?;
        let n = u64::from_le_bytes(arr);
        if rank < me {
            offset += n;
        }
        global_len += n;
    }

    let mut indices: BTreeMap<PointId, u64> = owned
        .iter()
        .enumerate()
        .map(|(i, &p)| (p, offset + i as u64))
        .collect();

    let mut outgoing: HashMap<usize, Vec<WireLink>> = HashMap::new();
    for &p in &owned {
        for r in fragment.overlap.links(p) {
            outgoing
                .entry(r.rank)
                .or_default()
                .push(WireLink::new(r.remote_point.get(), indices[&p]));
        }
    }
    let neighbors = fragment.overlap.neighbor_ranks();
    let tags = SectionCommTags::from_base(tags::NUMBERING);
    let received = exchange_records(&outgoing, comm, tags, &neighbors)?;

    let in_stratum: HashSet<PointId> = stratum.iter().copied().collect();
    let mut result = Ok(());
    for (nbr, links) in received.into_iter().sorted_by_key(|(r, _)| *r) {
        for link in links {
            let Some(p) = PointId::new(link.a()).ok().filter(|p| in_stratum.contains(p)) else {
                result = Err(MeshSieveError::NumberingCollision(format!(
                    "rank {nbr} numbered point {}, which is not in stratum {key:?}",
                    link.a()
                )));
                continue;
            };
            if let Some(prev) = indices.insert(p, link.b()) {
                result = Err(MeshSieveError::NumberingCollision(format!(
                    "point {p} numbered {prev} and {} (from rank {nbr})",
                    link.b()
                )));
            }
        }
    }
    if result.is_ok() {
        if let Some(p) = stratum.iter().find(|p| !indices.contains_key(p)) {
            result = Err(MeshSieveError::NumberingCollision(format!(
                "point {p} received no index in stratum {key:?}"
            )));
        }
    }
    agree(comm, "global_numbering", result)?;

    log::debug!(
        "rank {me}: numbered {} points of {key:?} ({} owned, {global_len} global)",
        indices.len(),
        owned.len()
    );
    Ok(GlobalNumbering {
        indices,
        owned: owned.len(),
        global_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    fn segment_pair() -> InMemorySieve {
        InMemorySieve::from_arrows([
            (pid(1), pid(4), 0),
            (pid(2), pid(4), 0),
            (pid(2), pid(5), 0),
            (pid(3), pid(5), 0),
        ])
        .unwrap()
    }

    #[test]
    fn local_numbering_is_dense_and_ordered() {
        let s = segment_pair();
        let n = local_numbering(&s, StratumKey::Depth(0)).unwrap();
        assert_eq!(n.points(), &[pid(1), pid(2), pid(3)]);
        assert_eq!(n.index_of(pid(3)), Some(2));
        assert_eq!(n.point_at(0), Some(pid(1)));
        assert_eq!(n.index_of(pid(4)), None);
        let cells = local_numbering(&s, StratumKey::Height(0)).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells.index_of(pid(5)), Some(1));
    }

    #[test]
    fn serial_global_numbering_follows_global_ids() {
        let mut f = MeshFragment::new(segment_pair(), 1, 1);
        f.global_ids.insert(pid(1), 30);
        f.global_ids.insert(pid(2), 20);
        f.global_ids.insert(pid(3), 10);
        let g = global_numbering(&f, StratumKey::Depth(0), &NoComm).unwrap();
        assert_eq!(g.index_of(pid(3)), Some(0));
        assert_eq!(g.index_of(pid(1)), Some(2));
        assert_eq!(g.global_len(), 3);
        assert_eq!(g.owned_len(), 3);
    }
}
