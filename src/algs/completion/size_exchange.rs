//! Stage 1 of every neighbour exchange: agree on payload sizes.
//!
//! Each rank tells each neighbour how many items it is about to send, so the
//! receiver can size its buffer and verify the payload in stage 2. Every
//! send and receive handle is drained before returning, even when an error
//! occurs; the first error wins.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, records_from_bytes};
use crate::mesh_error::MeshSieveError;
use bytemuck::Zeroable;
use std::collections::{BTreeSet, HashMap};

/// Symmetric size exchange with every rank in `neighbors`.
///
/// `counts[nbr]` is what this rank will send to `nbr` (0 if absent). Returns
/// `nbr → count` announced by each neighbour.
pub fn exchange_sizes_symmetric<C>(
    counts: &HashMap<usize, usize>,
    comm: &C,
    tag: CommTag,
    neighbors: &BTreeSet<usize>,
) -> Result<HashMap<usize, usize>, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    // 1) post all receives
    let mut pending_recvs = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let mut hdr = [0u8; std::mem::size_of::<WireCount>()];
        pending_recvs.push((nbr, comm.irecv(nbr, tag.as_u16(), &mut hdr)));
    }

    // 2) post all sends; an unrepresentable count is announced as 0
    let mut maybe_err = None;
    let mut pending_sends = Vec::with_capacity(neighbors.len());
    for &nbr in neighbors {
        let count = match WireCount::new(counts.get(&nbr).copied().unwrap_or(0)) {
            Ok(c) => c,
            Err(e) => {
                maybe_err.get_or_insert(e);
                WireCount::zeroed()
            }
        };
        pending_sends.push(comm.isend(nbr, tag.as_u16(), cast_slice(&[count])));
    }

    // 3) wait for all receives without returning early
    let mut sizes_in = HashMap::with_capacity(neighbors.len());
    for (nbr, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                if let Ok(c) = records_from_bytes::<WireCount>(&data, nbr) {
                    sizes_in.insert(nbr, c[0].get());
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(MeshSieveError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: std::mem::size_of::<WireCount>(),
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(MeshSieveError::CommError {
                    neighbor: nbr,
                    message: format!("failed to receive size from rank {nbr}"),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    // 4) always drain all send handles
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}
