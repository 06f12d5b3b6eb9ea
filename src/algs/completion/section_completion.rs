//! Push owner values of shared points to every other holder.
//!
//! After distribution every shared point has one owner (the lowest rank
//! holding it). `complete_section` makes the copies on all other ranks equal
//! to the owner's slice: owners send `(remote point, length)` headers plus the
//! values to each sharer, receivers overwrite (or add) the slice.

use crate::algs::communicator::{Communicator, SectionCommTags, agree, tags};
use crate::algs::completion::data_exchange::exchange_records;
use crate::algs::wire::{WireDecoder, WireEncoder, WireSectionEntry};
use crate::data::section::Section;
use crate::fragment::MeshFragment;
use crate::mesh_error::MeshSieveError;
use crate::overlap::Overlap;
use crate::topology::point::PointId;
use bytemuck::Pod;
use std::collections::{BTreeSet, HashMap};

/// Collective over the overlap neighbours: owner slices overwrite ghosts.
///
/// Values travel in native byte order, so every rank must share one
/// architecture for non-`u8` value types. Received slices are checked in full
/// before any is written, and the outcome is agreed on by every rank: on
/// failure no rank's section is modified.
///
/// # Errors
/// [`MeshSieveError::SliceLengthMismatch`] on a rank whose ghost slice has a
/// different length than the owner's, transport or framing errors from the
/// exchange, and [`MeshSieveError::CollectiveAbort`] on every other rank.
pub fn complete_section<V, C>(
    section: &mut Section<V>,
    overlap: &Overlap,
    comm: &C,
) -> Result<(), MeshSieveError>
where
    V: Pod + Default,
    C: Communicator + ?Sized,
{
    complete_section_with_tags(section, overlap, comm, SectionCommTags::from_base(tags::SECTION))
}

/// [`complete_section`] on explicit tags.
pub fn complete_section_with_tags<V, C>(
    section: &mut Section<V>,
    overlap: &Overlap,
    comm: &C,
    tags: SectionCommTags,
) -> Result<(), MeshSieveError>
where
    V: Pod + Default,
    C: Communicator + ?Sized,
{
    let me = comm.rank();
    let neighbors = overlap.neighbor_ranks();

    let mut per_rank: HashMap<usize, (Vec<WireSectionEntry>, Vec<V>)> = HashMap::new();
    for p in overlap.shared_points() {
        if !overlap.is_owned(p, me) {
            continue;
        }
        let Ok(vals) = section.try_restrict(p) else {
            continue;
        };
        for r in overlap.links(p) {
            let (entries, values) = per_rank.entry(r.rank).or_default();
            entries.push(WireSectionEntry::new(r.remote_point.get(), vals.len()));
            values.extend_from_slice(vals);
        }
    }
    let encoded: Result<HashMap<usize, Vec<u8>>, _> = per_rank
        .into_iter()
        .map(|(r, (entries, values))| -> Result<_, MeshSieveError> {
            let mut enc = WireEncoder::new();
            enc.put_records(&entries);
            enc.put_records(&values);
            Ok((r, enc.finish()?))
        })
        .collect();
    // a rank that cannot encode still joins the exchange, sending nothing
    let (outgoing, encode_err) = match encoded {
        Ok(out) => (out, None),
        Err(e) => (HashMap::new(), Some(e)),
    };

    let received = exchange_records(&outgoing, comm, tags, &neighbors);
    let staged = match encode_err {
        Some(e) => Err(e),
        None => received.and_then(|received| stage_updates(section, &neighbors, &received)),
    };
    let updates = agree(comm, "complete_section", staged)?;

    let updated = updates.len();
    for (p, vals) in updates {
        if section.contains(p) {
            section.try_set(p, &vals)?;
        } else {
            section.insert(p, &vals)?;
        }
    }
    log::debug!("rank {me}: section completion updated {updated} ghost slices");
    Ok(())
}

/// Decodes every received slice and checks it against `section` without
/// writing anything.
fn stage_updates<V: Pod + Default>(
    section: &Section<V>,
    neighbors: &BTreeSet<usize>,
    received: &HashMap<usize, Vec<u8>>,
) -> Result<Vec<(PointId, Vec<V>)>, MeshSieveError> {
    let mut updates = Vec::new();
    for &nbr in neighbors {
        let Some(bytes) = received.get(&nbr).filter(|b| !b.is_empty()) else {
            continue;
        };
        let mut dec = WireDecoder::new(bytes, nbr);
        let entries: Vec<WireSectionEntry> = dec.records()?;
        let values: Vec<V> = dec.records()?;
        dec.finish()?;
        let mut offset: usize = 0;
        for e in entries {
            let p = PointId::new(e.point())?;
            let slice = offset
                .checked_add(e.len())
                .and_then(|end| values.get(offset..end))
                .ok_or(MeshSieveError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: offset.saturating_add(e.len()),
                    got: values.len(),
                })?;
            offset += e.len();
            if slice.is_empty() {
                return Err(MeshSieveError::ZeroLengthSlice);
            }
            if let Ok(existing) = section.try_restrict(p) {
                if existing.len() != slice.len() {
                    return Err(MeshSieveError::SliceLengthMismatch {
                        point: p,
                        expected: existing.len(),
                        found: slice.len(),
                    });
                }
            }
            updates.push((p, slice.to_vec()));
        }
    }
    Ok(updates)
}

/// Completes every named section of `fragment`, in name order.
pub fn complete_fragment_sections<C>(
    fragment: &mut MeshFragment,
    comm: &C,
) -> Result<(), MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let MeshFragment {
        sections, overlap, ..
    } = fragment;
    for section in sections.values_mut() {
        complete_section(section, overlap, comm)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::RayonComm;

    fn pid(u: u64) -> PointId {
        PointId::new(u).unwrap()
    }

    #[test]
    fn owner_values_reach_ghosts() {
        let world = RayonComm::world(2);
        let out: Vec<Section<f64>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let r = c.rank();
                        // rank 0 point 1 == rank 1 point 2
                        let mut o = Overlap::new();
                        let (local, remote) = if r == 0 { (1, 2) } else { (2, 1) };
                        o.add_link(pid(local), 1 - r, pid(remote)).unwrap();
                        let mut sec: Section<f64> = Section::default();
                        sec.insert(pid(local), &[r as f64 * 10.0, 1.0]).unwrap();
                        complete_section(&mut sec, &o, c).unwrap();
                        sec
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(out[0].try_restrict(pid(1)).unwrap(), &[0.0, 1.0]);
        assert_eq!(out[1].try_restrict(pid(2)).unwrap(), &[0.0, 1.0]);
    }
}
