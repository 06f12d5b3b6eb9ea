//! Gather a distributed mesh onto one rank.
//!
//! Every rank names its points by `(owner rank, handle on owner)`; ghost
//! names come from the overlap link to the owner. Each rank ships the points
//! it owns, the cone arrows of those points (in cone order), and their labels
//! and section values. The root renumbers the union by
//! `(dimension, owner rank, owner handle)`, so no two ranks' handles can
//! collide, and rebuilds a single store. Other ranks are left with an empty
//! fragment.

use crate::algs::communicator::{Communicator, SectionCommTags, agree, tags};
use crate::algs::completion::data_exchange::exchange_records;
use crate::algs::wire::{
    WireDecoder, WireEncoder, WireF64, WireLabel, WireLink, WireName, WireNamedArrow,
    WireSectionEntry,
};
use crate::data::section::Section;
use crate::fragment::{DistributionState, MeshFragment};
use crate::mesh_error::MeshSieveError;
use crate::topology::labels::LabelSet;
use crate::topology::point::PointId;
use crate::topology::sieve::{InMemorySieve, Sieve};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type Name = (usize, u64);

fn name_of(fragment: &MeshFragment, p: PointId, me: usize) -> Result<Name, MeshSieveError> {
    let owner = fragment.overlap.owner(p, me);
    if owner == me {
        return Ok((me, p.get()));
    }
    fragment
        .overlap
        .remote(p, owner)
        .map(|q| (owner, q.get()))
        .ok_or(MeshSieveError::OverlapLinkMissing { point: p, rank: owner })
}

fn dim_of(fragment: &MeshFragment, p: PointId) -> Result<u32, MeshSieveError> {
    match fragment.sieve.dimension_of(p) {
        Some(d) => Ok(u32::from(d)),
        None => fragment.sieve.depth(p),
    }
}

fn wire_name(fragment: &MeshFragment, p: PointId, me: usize) -> Result<WireName, MeshSieveError> {
    let (rank, handle) = name_of(fragment, p, me)?;
    Ok(WireName::new(rank, dim_of(fragment, p)?, handle))
}

/// This rank's owned points, arrows, labels and sections, framed.
fn encode_owned(fragment: &MeshFragment, me: usize) -> Result<Vec<u8>, MeshSieveError> {
    let owned: Vec<PointId> = fragment
        .sieve
        .points()
        .filter(|&p| fragment.overlap.is_owned(p, me))
        .collect();
    let index: HashMap<PointId, u64> = owned
        .iter()
        .enumerate()
        .map(|(i, &p)| (p, i as u64))
        .collect();

    let mut names = Vec::with_capacity(owned.len());
    let mut gids = Vec::with_capacity(owned.len());
    let mut arrows = Vec::new();
    for &p in &owned {
        let name = WireName::new(me, dim_of(fragment, p)?, p.get());
        names.push(name);
        gids.push(WireLink::new(p.get(), fragment.global_id(p)));
        for (src, o) in fragment.sieve.cone(p) {
            arrows.push(WireNamedArrow::new(wire_name(fragment, src, me)?, name, o));
        }
    }

    let mut label_names: Vec<&str> = Vec::new();
    let mut labels = Vec::new();
    for (label, p, value) in fragment.labels.iter() {
        let Some(&i) = index.get(&p) else { continue };
        let idx = match label_names.iter().position(|n| *n == label) {
            Some(k) => k,
            None => {
                label_names.push(label);
                label_names.len() - 1
            }
        };
        labels.push(WireLabel::new(i, idx as u32, value));
    }

    let mut enc = WireEncoder::new();
    enc.put_records(&names);
    enc.put_records(&gids);
    enc.put_records(&arrows);
    enc.put_count(label_names.len());
    for n in &label_names {
        enc.put_str(n);
    }
    enc.put_records(&labels);
    enc.put_count(fragment.sections.len());
    for (sname, section) in &fragment.sections {
        let mut entries = Vec::new();
        let mut values = Vec::new();
        for (p, vals) in section.iter() {
            if let Some(&i) = index.get(&p) {
                entries.push(WireSectionEntry::new(i, vals.len()));
                values.extend(vals.iter().copied().map(WireF64::new));
            }
        }
        enc.put_str(sname);
        enc.put_records(&entries);
        enc.put_records(&values);
    }
    enc.finish()
}

/// Everything one rank contributed, as decoded on the root.
struct Contribution {
    rank: usize,
    names: Vec<WireName>,
    gids: Vec<WireLink>,
    arrows: Vec<WireNamedArrow>,
    label_names: Vec<String>,
    labels: Vec<WireLabel>,
    sections: Vec<(String, Vec<WireSectionEntry>, Vec<WireF64>)>,
}

fn decode_owned(bytes: &[u8], rank: usize) -> Result<Contribution, MeshSieveError> {
    let mut dec = WireDecoder::new(bytes, rank);
    let names = dec.records()?;
    let gids = dec.records()?;
    let arrows = dec.records()?;
    let n = dec.count()?;
    let label_names = (0..n).map(|_| dec.string()).collect::<Result<Vec<_>, _>>()?;
    let labels = dec.records()?;
    let n_sections = dec.count()?;
    let mut sections = Vec::with_capacity(n_sections);
    for _ in 0..n_sections {
        let name = dec.string()?;
        let entries = dec.records()?;
        let values = dec.records()?;
        sections.push((name, entries, values));
    }
    dec.finish()?;
    Ok(Contribution {
        rank,
        names,
        gids,
        arrows,
        label_names,
        labels,
        sections,
    })
}

fn collision(msg: String) -> MeshSieveError {
    MeshSieveError::NumberingCollision(msg)
}

/// Rebuilds the union on the root.
fn assemble(parts: Vec<Contribution>, like: &MeshFragment) -> Result<MeshFragment, MeshSieveError> {
    // (dim, rank, handle) -> gid
    let mut order: BTreeMap<(u32, usize, u64), u64> = BTreeMap::new();
    for part in &parts {
        if part.gids.len() != part.names.len() {
            return Err(collision(format!(
                "rank {} sent {} names and {} global ids",
                part.rank,
                part.names.len(),
                part.gids.len()
            )));
        }
        for (n, g) in part.names.iter().zip(&part.gids) {
            if n.rank() != part.rank {
                return Err(collision(format!(
                    "rank {} claims point {} owned by rank {}",
                    part.rank,
                    n.point(),
                    n.rank()
                )));
            }
            if order.insert((n.dim(), n.rank(), n.point()), g.b()).is_some() {
                return Err(collision(format!(
                    "point ({}, {}) sent twice",
                    n.rank(),
                    n.point()
                )));
            }
        }
    }

    let mut sieve = InMemorySieve::new();
    let mut handles: HashMap<Name, PointId> = HashMap::with_capacity(order.len());
    let mut global_ids = BTreeMap::new();
    let mut seen_gids = BTreeSet::new();
    for (i, (&(dim, rank, point), &gid)) in order.iter().enumerate() {
        let h = PointId::from_index(i);
        let dim = u8::try_from(dim)
            .map_err(|_| MeshSieveError::MalformedInput(format!("dimension {dim}")))?;
        sieve.add_point(h, dim)?;
        handles.insert((rank, point), h);
        if !seen_gids.insert(gid) {
            return Err(collision(format!("global id {gid} owned twice")));
        }
        global_ids.insert(h, gid);
    }
    let resolve = |n: &WireName| -> Result<PointId, MeshSieveError> {
        handles.get(&(n.rank(), n.point())).copied().ok_or_else(|| {
            collision(format!(
                "unknown point ({}, {}) referenced",
                n.rank(),
                n.point()
            ))
        })
    };

    let mut labels = LabelSet::new();
    let mut sections: BTreeMap<String, Section<f64>> = BTreeMap::new();
    for part in &parts {
        for a in &part.arrows {
            sieve.add_arrow(resolve(&a.src)?, resolve(&a.dst)?, a.orientation())?;
        }
        let local = |i: u64| -> Result<PointId, MeshSieveError> {
            part.names
                .get(i as usize)
                .ok_or_else(|| collision(format!("rank {} index {i} out of range", part.rank)))
                .and_then(resolve)
        };
        for l in &part.labels {
            let name = part.label_names.get(l.name() as usize).ok_or_else(|| {
                MeshSieveError::MalformedInput(format!("label name index {}", l.name()))
            })?;
            labels.set_value(name, local(l.point())?, l.value());
        }
        for (sname, entries, values) in &part.sections {
            let section = sections.entry(sname.clone()).or_default();
            let mut offset = 0;
            for e in entries {
                let vals: Vec<f64> = values
                    .get(offset..offset + e.len())
                    .ok_or_else(|| {
                        MeshSieveError::MalformedInput(format!("section `{sname}` payload ends early"))
                    })?
                    .iter()
                    .map(WireF64::get)
                    .collect();
                offset += e.len();
                section.insert(local(e.point())?, &vals)?;
            }
        }
    }

    let mut out = MeshFragment::new(sieve, like.dimension, like.spatial_dim);
    out.labels = labels;
    out.sections = sections;
    out.holes = like.holes.clone();
    out.global_ids = global_ids;
    out.state = DistributionState::Unified;
    Ok(out)
}

/// Collective: gathers every rank's fragment onto `root`.
///
/// Returns the full mesh on `root` and an empty `Unified` fragment elsewhere.
///
/// # Errors
/// * [`MeshSieveError::OverlapLinkMissing`] when a ghost has no link to its owner.
/// * [`MeshSieveError::NumberingCollision`] when the root sees a point twice or
///   an arrow to an unknown point.
///
/// Every rank fails together.
pub fn unify<C>(fragment: &MeshFragment, comm: &C, root: usize) -> Result<MeshFragment, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let me = comm.rank();
    let size = comm.size();
    if root >= size {
        return Err(MeshSieveError::InvalidPartition(format!(
            "root rank {root} outside a world of {size}"
        )));
    }

    let encoded = agree(comm, "unify", encode_owned(fragment, me))?;

    let neighbors: BTreeSet<usize> = if me == root {
        (0..size).filter(|&r| r != root).collect()
    } else {
        BTreeSet::from([root])
    };
    let mut outgoing = HashMap::new();
    if me != root {
        outgoing.insert(root, encoded.clone());
    }
    let received = exchange_records(
        &outgoing,
        comm,
        SectionCommTags::from_base(tags::UNIFY),
        &neighbors,
    )?;

    let assembled = if me == root {
        let mut payloads: Vec<(usize, &[u8])> = received
            .iter()
            .map(|(&r, b)| (r, b.as_slice()))
            .collect();
        payloads.push((me, encoded.as_slice()));
        payloads.sort_unstable_by_key(|(r, _)| *r);
        payloads
            .into_iter()
            .map(|(r, b)| decode_owned(b, r))
            .collect::<Result<Vec<_>, _>>()
            .and_then(|parts| assemble(parts, fragment))
    } else {
        Ok(MeshFragment::empty_like(fragment, DistributionState::Unified))
    };
    let out = agree(comm, "unify", assembled)?;
    if me == root {
        log::info!(
            "unified {} points from {size} ranks onto rank {root}",
            out.sieve.num_points()
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn serial_unify_keeps_content() {
        let mut s = InMemorySieve::new();
        s.add_point(pid(9), 0).unwrap();
        s.add_point(pid(2), 0).unwrap();
        s.add_point(pid(5), 1).unwrap();
        s.add_arrow(pid(9), pid(5), 0).unwrap();
        s.add_arrow(pid(2), pid(5), 0).unwrap();
        let mut f = MeshFragment::new(s, 1, 1);
        f.labels.set_value("marker", pid(9), 3);
        let u = unify(&f, &NoComm, 0).unwrap();
        assert_eq!(u.state, DistributionState::Unified);
        // vertices first by handle, then the segment
        assert_eq!(u.sieve.cone_points(pid(3)), vec![pid(2), pid(1)]);
        assert_eq!(u.labels.get_value("marker", pid(2)), 3);
        assert_eq!(u.global_id(pid(2)), 9);
    }
}
