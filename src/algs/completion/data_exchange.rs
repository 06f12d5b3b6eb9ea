//! Stage 2 of every neighbour exchange: ship the records themselves.

use crate::algs::communicator::{Communicator, SectionCommTags, Wait};
use crate::algs::completion::size_exchange::exchange_sizes_symmetric;
use crate::algs::wire::{cast_slice, records_from_bytes};
use crate::mesh_error::MeshSieveError;
use bytemuck::Pod;
use std::collections::{BTreeSet, HashMap};

/// Two-phase exchange of `T` records with every rank in `neighbors`.
///
/// `outgoing[nbr]` is sent to `nbr` (nothing if absent). Returns the records
/// received from each neighbour; neighbours that announced zero records map
/// to an empty vector. Payloads whose length disagrees with the announced
/// count are rejected with [`MeshSieveError::BufferSizeMismatch`].
///
/// `neighbors` must be symmetric: if `a` lists `b`, `b` lists `a`.
pub fn exchange_records<T, C>(
    outgoing: &HashMap<usize, Vec<T>>,
    comm: &C,
    tags: SectionCommTags,
    neighbors: &BTreeSet<usize>,
) -> Result<HashMap<usize, Vec<T>>, MeshSieveError>
where
    T: Pod,
    C: Communicator + ?Sized,
{
    let counts: HashMap<usize, usize> = outgoing.iter().map(|(&r, v)| (r, v.len())).collect();
    let sizes = exchange_sizes_symmetric(&counts, comm, tags.sizes, neighbors)?;

    let item = std::mem::size_of::<T>();
    let mut pending_recvs = Vec::new();
    for (&nbr, &n) in &sizes {
        if n > 0 {
            let mut buf = vec![0u8; n * item];
            pending_recvs.push((nbr, n * item, comm.irecv(nbr, tags.data.as_u16(), &mut buf)));
        }
    }
    let mut pending_sends = Vec::new();
    for &nbr in neighbors {
        if let Some(items) = outgoing.get(&nbr).filter(|v| !v.is_empty()) {
            pending_sends.push(comm.isend(nbr, tags.data.as_u16(), cast_slice(items)));
        }
    }

    let mut out: HashMap<usize, Vec<T>> = neighbors.iter().map(|&r| (r, Vec::new())).collect();
    let mut maybe_err = None;
    for (nbr, expected, h) in pending_recvs {
        match h.wait() {
            Some(raw) if raw.len() == expected => {
                if maybe_err.is_none() {
                    match records_from_bytes::<T>(&raw, nbr) {
                        Ok(recs) => {
                            out.insert(nbr, recs);
                        }
                        Err(e) => maybe_err = Some(e),
                    }
                }
            }
            Some(raw) if maybe_err.is_none() => {
                maybe_err = Some(MeshSieveError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected,
                    got: raw.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(MeshSieveError::CommError {
                    neighbor: nbr,
                    message: format!("failed to receive data from rank {nbr}"),
                });
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// [`exchange_records`] with every other rank as a neighbour (all-to-all).
pub fn exchange_all_to_all<T, C>(
    outgoing: &HashMap<usize, Vec<T>>,
    comm: &C,
    tags: SectionCommTags,
) -> Result<HashMap<usize, Vec<T>>, MeshSieveError>
where
    T: Pod,
    C: Communicator + ?Sized,
{
    let me = comm.rank();
    let peers: BTreeSet<usize> = (0..comm.size()).filter(|&r| r != me).collect();
    exchange_records(outgoing, comm, tags, &peers)
}
