//! Scatter a root fragment across ranks and build the overlap.
//!
//! `distribute` runs in three collective stages:
//!
//! 1. the root validates the partition and, for every rank, extracts the
//!    closure of that rank's cells (points, cone arrows with orientation,
//!    labels, section values), all keyed by global id;
//! 2. payloads travel with a two-phase (size, data) exchange and each rank
//!    rebuilds a fresh store whose handles follow `(dimension, global id)`;
//! 3. ranks compute the overlap from shared global ids and check that it is
//!    mirrored on both sides of every link.
//!
//! Any failure is agreed on collectively so every rank returns an error.

use crate::algs::communicator::{Communicator, SectionCommTags, agree, tags};
use crate::algs::completion::data_exchange::{exchange_all_to_all, exchange_records};
use crate::algs::partition::Partition;
use crate::algs::wire::{
    WireArrow, WireDecoder, WireEncoder, WireEntity, WireF64, WireLabel, WireLink,
    WireSectionEntry,
};
use crate::data::section::Section;
use crate::fragment::{DistributionState, MeshFragment};
use crate::mesh_error::MeshSieveError;
use crate::overlap::Overlap;
use crate::topology::labels::LabelSet;
use crate::topology::point::PointId;
use crate::topology::sieve::{InMemorySieve, Sieve, SieveQueryExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Collective: scatters `fragment` (meaningful on `root` only) according to
/// `partition` and returns this rank's piece in the `Distributed` state.
///
/// Points outside the closure of every cell stay on the root.
///
/// # Errors
/// * [`MeshSieveError::InvalidPartition`] on the root (and
///   [`MeshSieveError::CollectiveAbort`] elsewhere) for an unassigned cell or
///   an out-of-range rank.
/// * Consistency errors from the overlap construction.
pub fn distribute<C>(
    fragment: &MeshFragment,
    partition: &Partition,
    comm: &C,
    root: usize,
) -> Result<MeshFragment, MeshSieveError>
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

    let payloads = if me == root {
        extract_parts(fragment, partition, size, root)
    } else {
        Ok(Vec::new())
    };
    let mut payloads = agree(comm, "distribute", payloads)?;

    let tags = SectionCommTags::from_base(tags::DISTRIBUTE);
    let neighbors: BTreeSet<usize> = if me == root {
        (0..size).filter(|&r| r != root).collect()
    } else {
        BTreeSet::from([root])
    };
    let mut outgoing: HashMap<usize, Vec<u8>> = HashMap::new();
    let mut mine = Vec::new();
    for (r, bytes) in payloads.drain(..).enumerate() {
        if r == me {
            mine = bytes;
        } else {
            outgoing.insert(r, bytes);
        }
    }
    let assembled = exchange_records(&outgoing, comm, tags, &neighbors).and_then(|mut received| {
        if me != root {
            mine = received.remove(&root).unwrap_or_default();
        }
        decode_part(&mine, root).and_then(assemble_part)
    });
    let mut local = agree(comm, "distribute", assembled)?;

    local.overlap = compute_overlap(&local.sieve, &local.global_ids, comm)?;
    check_overlap_symmetry(&local.overlap, comm)?;
    local.state = DistributionState::Distributed;

    log::debug!(
        "rank {me}: received {} points, {} shared with {} neighbours",
        local.sieve.num_points(),
        local.overlap.len(),
        local.overlap.neighbor_ranks().len()
    );
    if me == root {
        log::info!("distributed {} cells over {size} ranks", partition.len());
    }
    Ok(local)
}

/// Per-rank point sets and their encoded payloads, built on the root.
fn extract_parts(
    fragment: &MeshFragment,
    partition: &Partition,
    size: usize,
    root: usize,
) -> Result<Vec<Vec<u8>>, MeshSieveError> {
    let cells = fragment.cells()?;
    partition.validate(&cells, size)?;

    let mut sets: Vec<BTreeSet<PointId>> = (0..size)
        .map(|r| {
            fragment
                .sieve
                .closure_of(partition.cells_of(r))
                .into_iter()
                .collect()
        })
        .collect();
    let covered: HashSet<PointId> = sets.iter().flatten().copied().collect();
    let stray: Vec<PointId> = fragment
        .sieve
        .points()
        .filter(|p| !covered.contains(p))
        .collect();
    if !stray.is_empty() {
        log::debug!("{} points outside every cell closure stay on the root", stray.len());
    }
    sets[root].extend(fragment.sieve.closure_of(stray));

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        sets.par_iter().map(|set| encode_part(fragment, set)).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        sets.iter().map(|set| encode_part(fragment, set)).collect()
    }
}

fn dimension_of(fragment: &MeshFragment, p: PointId) -> Result<u32, MeshSieveError> {
    match fragment.sieve.dimension_of(p) {
        Some(d) => Ok(u32::from(d)),
        None => fragment.sieve.depth(p),
    }
}

fn encode_part(fragment: &MeshFragment, set: &BTreeSet<PointId>) -> Result<Vec<u8>, MeshSieveError> {
    let gid = |p: PointId| fragment.global_id(p);

    let mut entities = Vec::with_capacity(set.len());
    let mut arrows = Vec::new();
    for &p in set {
        entities.push(WireEntity::new(gid(p), dimension_of(fragment, p)?));
        for (src, o) in fragment.sieve.cone(p) {
            arrows.push(WireArrow::new(gid(src), gid(p), o));
        }
    }

    let mut names: Vec<&str> = Vec::new();
    let mut labels = Vec::new();
    for (name, p, value) in fragment.labels.iter() {
        if !set.contains(&p) {
            continue;
        }
        let idx = match names.iter().position(|n| *n == name) {
            Some(i) => i,
            None => {
                names.push(name);
                names.len() - 1
            }
        };
        labels.push(WireLabel::new(gid(p), idx as u32, value));
    }

    let mut enc = WireEncoder::new();
    enc.put_count(fragment.dimension);
    enc.put_count(fragment.spatial_dim);
    let holes: Vec<WireF64> = fragment.holes.iter().copied().map(WireF64::new).collect();
    enc.put_records(&holes);
    enc.put_records(&entities);
    enc.put_records(&arrows);
    enc.put_count(names.len());
    for n in &names {
        enc.put_str(n);
    }
    enc.put_records(&labels);
    enc.put_count(fragment.sections.len());
    for (name, section) in &fragment.sections {
        let mut entries = Vec::new();
        let mut values = Vec::new();
        for (p, vals) in section.iter().filter(|(p, _)| set.contains(p)) {
            entries.push(WireSectionEntry::new(gid(p), vals.len()));
            values.extend(vals.iter().copied().map(WireF64::new));
        }
        enc.put_str(name);
        enc.put_records(&entries);
        enc.put_records(&values);
    }
    enc.finish()
}

/// Decoded per-rank payload.
struct PartPayload {
    dimension: usize,
    spatial_dim: usize,
    holes: Vec<f64>,
    entities: Vec<WireEntity>,
    arrows: Vec<WireArrow>,
    label_names: Vec<String>,
    labels: Vec<WireLabel>,
    sections: Vec<(String, Vec<WireSectionEntry>, Vec<WireF64>)>,
}

fn decode_part(bytes: &[u8], from: usize) -> Result<PartPayload, MeshSieveError> {
    let mut dec = WireDecoder::new(bytes, from);
    let dimension = dec.count()?;
    let spatial_dim = dec.count()?;
    let holes = dec.records::<WireF64>()?.iter().map(WireF64::get).collect();
    let entities = dec.records()?;
    let arrows = dec.records()?;
    let n_names = dec.count()?;
    let label_names = (0..n_names)
        .map(|_| dec.string())
        .collect::<Result<Vec<_>, _>>()?;
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
    Ok(PartPayload {
        dimension,
        spatial_dim,
        holes,
        entities,
        arrows,
        label_names,
        labels,
        sections,
    })
}

fn lookup(handles: &HashMap<u64, PointId>, gid: u64) -> Result<PointId, MeshSieveError> {
    handles.get(&gid).copied().ok_or_else(|| {
        MeshSieveError::NumberingCollision(format!("global id {gid} referenced but not shipped"))
    })
}

fn assemble_part(payload: PartPayload) -> Result<MeshFragment, MeshSieveError> {
    let mut order: Vec<(u32, u64)> = payload
        .entities
        .iter()
        .map(|e| (e.dim(), e.id()))
        .collect();
    order.sort_unstable();

    let mut sieve = InMemorySieve::new();
    let mut handles: HashMap<u64, PointId> = HashMap::with_capacity(order.len());
    let mut global_ids = BTreeMap::new();
    for (i, &(dim, gid)) in order.iter().enumerate() {
        let h = PointId::from_index(i);
        if handles.insert(gid, h).is_some() {
            return Err(MeshSieveError::NumberingCollision(format!(
                "global id {gid} shipped twice"
            )));
        }
        let dim = u8::try_from(dim).map_err(|_| {
            MeshSieveError::MalformedInput(format!("dimension {dim} of global id {gid}"))
        })?;
        sieve.add_point(h, dim)?;
        global_ids.insert(h, gid);
    }
    for a in &payload.arrows {
        sieve.add_arrow(lookup(&handles, a.src())?, lookup(&handles, a.dst())?, a.orientation())?;
    }

    let mut labels = LabelSet::new();
    for l in &payload.labels {
        let name = payload
            .label_names
            .get(l.name() as usize)
            .ok_or_else(|| MeshSieveError::MalformedInput(format!("label name index {}", l.name())))?;
        labels.set_value(name, lookup(&handles, l.point())?, l.value());
    }

    let mut sections = BTreeMap::new();
    for (name, entries, values) in payload.sections {
        let mut section: Section<f64> = Section::default();
        let mut vals = values.iter().map(WireF64::get);
        for e in &entries {
            let slice: Vec<f64> = vals.by_ref().take(e.len()).collect();
            if slice.len() != e.len() {
                return Err(MeshSieveError::MalformedInput(format!(
                    "section `{name}` payload ends early"
                )));
            }
            section.insert(lookup(&handles, e.point())?, &slice)?;
        }
        sections.insert(name, section);
    }

    let mut fragment = MeshFragment::new(sieve, payload.dimension, payload.spatial_dim);
    fragment.labels = labels;
    fragment.sections = sections;
    fragment.holes = payload.holes;
    fragment.global_ids = global_ids;
    Ok(fragment)
}

/// Collective: links every non-cell point to its copies on other ranks.
///
/// Each rank sends `(global id, local handle)` for its candidate points to
/// every other rank; a global id seen on both sides becomes a link.
///
/// # Errors
/// A rank whose links fail local validation returns that error, the other
/// ranks return [`MeshSieveError::CollectiveAbort`].
pub fn compute_overlap<C>(
    sieve: &InMemorySieve,
    global_ids: &BTreeMap<PointId, u64>,
    comm: &C,
) -> Result<Overlap, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let me = comm.rank();
    let gid_of = |p: PointId| global_ids.get(&p).copied().unwrap_or_else(|| p.get());
    let candidates = sieve.strata().map(|strata| {
        sieve
            .points()
            .filter(|&p| strata.height_of(p).is_some_and(|h| h > 0))
            .map(|p| WireLink::new(gid_of(p), p.get()))
            .collect::<Vec<_>>()
    });

    // a rank that failed still takes part in the exchange, with nothing to offer
    let offered = candidates.as_ref().map_or(&[][..], Vec::as_slice);
    let outgoing: HashMap<usize, Vec<WireLink>> = (0..comm.size())
        .filter(|&r| r != me)
        .map(|r| (r, offered.to_vec()))
        .collect();
    let exchanged = exchange_all_to_all(&outgoing, comm, SectionCommTags::from_base(tags::OVERLAP));

    let linked = candidates.and(exchanged).and_then(|received| {
        let by_gid: HashMap<u64, PointId> = sieve.points().map(|p| (gid_of(p), p)).collect();
        let mut overlap = Overlap::new();
        for (&rank, links) in &received {
            for link in links {
                if let Some(&local) = by_gid.get(&link.a()) {
                    overlap.add_link(local, rank, PointId::new(link.b())?)?;
                }
            }
        }
        overlap.validate_invariants(me)?;
        Ok(overlap)
    });
    agree(comm, "compute_overlap", linked)
}

/// Collective: every link `a -> (r, b)` on this rank must be mirrored by
/// `b -> (me, a)` on rank `r`.
///
/// # Errors
/// [`MeshSieveError::OverlapAsymmetry`] on a rank that saw a mismatch,
/// [`MeshSieveError::CollectiveAbort`] on the others.
pub fn check_overlap_symmetry<C>(overlap: &Overlap, comm: &C) -> Result<(), MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let me = comm.rank();
    let peers: BTreeSet<usize> = (0..comm.size()).filter(|&r| r != me).collect();
    let outgoing: HashMap<usize, Vec<WireLink>> = peers
        .iter()
        .map(|&r| {
            let links = overlap
                .links_to(r)
                .into_iter()
                .map(|(l, rem)| WireLink::new(l.get(), rem.get()))
                .collect();
            (r, links)
        })
        .collect();
    let received = match exchange_all_to_all(
        &outgoing,
        comm,
        SectionCommTags::from_base(tags::OVERLAP_SYMMETRY),
    ) {
        Ok(received) => received,
        Err(e) => return agree(comm, "check_overlap_symmetry", Err(e)),
    };

    let mut verdict = Ok(());
    for &r in &peers {
        let theirs: BTreeSet<(u64, u64)> = received
            .get(&r)
            .map(|v| v.iter().map(|l| (l.b(), l.a())).collect())
            .unwrap_or_default();
        let ours: BTreeSet<(u64, u64)> = overlap
            .links_to(r)
            .into_iter()
            .map(|(l, rem)| (l.get(), rem.get()))
            .collect();
        if theirs != ours {
            let missing = ours.symmetric_difference(&theirs).next().copied();
            verdict = Err(MeshSieveError::OverlapAsymmetry {
                neighbor: r,
                message: format!(
                    "{} links here, {} mirrored on rank {r}; first difference {missing:?}",
                    ours.len(),
                    theirs.len()
                ),
            });
            break;
        }
    }
    agree(comm, "check_overlap_symmetry", verdict)
}
