//! Deterministic collective reductions over a [`Communicator`].
//!
//! The selection algorithm branches on reduction results (max value, max
//! location), so every rank must compute bit-identical answers. All
//! reductions here gather the per-rank candidates and fold them in rank
//! order; tie-breaks resolve to the lowest global row index.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{MaxLocEntry, bytes_of, pod_read_unaligned};
use crate::transfer_error::TransferError;
use std::collections::HashMap;

/// Gather one byte buffer from every rank; `expected[r]` is the byte
/// length rank `r` contributes (known a priori by all ranks, so no sizing
/// stage is needed). Returns the buffers indexed by rank.
///
/// Every rank must call this collectively with consistent `expected`.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: &[u8],
    expected: &[usize],
) -> Result<Vec<Vec<u8>>, TransferError> {
    let size = comm.size();
    let me = comm.rank();
    debug_assert_eq!(expected.len(), size);
    debug_assert_eq!(expected[me], local.len());

    if size == 1 {
        return Ok(vec![local.to_vec()]);
    }

    // Post all receives first, then all sends, then drain everything.
    let mut recv_bufs: Vec<Vec<u8>> = (0..size).map(|r| vec![0u8; expected[r]]).collect();
    let mut recvs: HashMap<usize, C::RecvHandle> = HashMap::new();
    for (peer, buf) in recv_bufs.iter_mut().enumerate() {
        if peer != me {
            recvs.insert(peer, comm.irecv(peer, tag.base(), buf));
        }
    }

    let mut sends = Vec::with_capacity(size - 1);
    for peer in 0..size {
        if peer != me {
            sends.push(comm.isend(peer, tag.base(), local));
        }
    }

    let mut out: Vec<Vec<u8>> = vec![Vec::new(); size];
    let mut maybe_err = None;
    for peer in 0..size {
        if peer == me {
            out[peer] = local.to_vec();
            continue;
        }
        let handle = recvs.remove(&peer).expect("receive posted for every peer");
        match handle.wait() {
            Some(data) if data.len() == expected[peer] => out[peer] = data,
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(TransferError::CommError {
                    neighbor: peer,
                    message: format!(
                        "expected {} bytes in all-gather, got {}",
                        expected[peer],
                        data.len()
                    ),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(TransferError::CommError {
                    neighbor: peer,
                    message: format!("failed to receive all-gather shard from rank {peer}"),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    // Always drain all send handles before returning.
    for send in sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// Global max-abs-with-location: every rank supplies its local candidate
/// and receives the identical global winner (largest value; lowest row on
/// exact ties).
pub fn all_reduce_max_loc<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: MaxLocEntry,
) -> Result<MaxLocEntry, TransferError> {
    if comm.size() == 1 {
        return Ok(local);
    }
    let expected = vec![std::mem::size_of::<MaxLocEntry>(); comm.size()];
    let shards = all_gather_bytes(comm, tag, bytes_of(&local), &expected)?;
    let mut best = MaxLocEntry::NONE;
    for shard in &shards {
        // Received buffers carry no alignment guarantee.
        let entry = pod_read_unaligned::<MaxLocEntry>(shard);
        best = best.merge(entry);
    }
    Ok(best)
}

/// Global maximum of one `f64` per rank, folded in rank order.
pub fn all_reduce_max<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: f64,
) -> Result<f64, TransferError> {
    if comm.size() == 1 {
        return Ok(local);
    }
    let expected = vec![std::mem::size_of::<f64>(); comm.size()];
    let shards = all_gather_bytes(comm, tag, bytes_of(&local), &expected)?;
    let mut best = f64::NEG_INFINITY;
    for shard in &shards {
        let value = pod_read_unaligned::<f64>(shard);
        if value > best {
            best = value;
        }
    }
    Ok(best)
}
