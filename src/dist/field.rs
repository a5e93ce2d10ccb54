//! DistField: a dense, row-distributed field of `f64` values.
//!
//! Every rank stores the contiguous block of rows assigned to it by a
//! [`RowLayout`] and executes the same call sequence in lockstep (SPMD).
//! Reductions (`max_abs`, `max_abs_loc`) return identical results on all
//! ranks; `gather_rows` is the batched remote-row pull the point
//! selection algorithm projects data through.

use crate::algs::communicator::{CommTag, Communicator, GatherTags, Wait};
use crate::algs::reduction::{all_gather_bytes, all_reduce_max, all_reduce_max_loc};
use crate::algs::wire::{
    MaxLocEntry, WireCount, WireRowId, cast_slice, pod_collect_to_vec, pod_read_unaligned,
};
use crate::dist::layout::RowLayout;
use crate::transfer_error::TransferError;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

const TAG_REDUCE: CommTag = CommTag::new(0x5100);
const TAG_BCAST: CommTag = CommTag::new(0x5200);
const TAG_REPLICATE: CommTag = CommTag::new(0x5300);
const TAG_GATHER: GatherTags = GatherTags::from_base(CommTag::new(0x5400));

/// Dense row-distributed field: a local row shard plus the layout and
/// communicator shared by all ranks.
#[derive(Debug)]
pub struct DistField<C: Communicator> {
    comm: Arc<C>,
    layout: RowLayout,
    width: usize,
    local: Vec<f64>,
}

impl<C: Communicator> Clone for DistField<C> {
    fn clone(&self) -> Self {
        Self {
            comm: Arc::clone(&self.comm),
            layout: self.layout,
            width: self.width,
            local: self.local.clone(),
        }
    }
}

impl<C: Communicator> DistField<C> {
    /// All-zero field of `rows` x `width`.
    ///
    /// `width` must be nonzero; fields with zero columns are rejected at
    /// the public construction boundary ([`Self::from_global`]).
    pub fn zeros(comm: Arc<C>, rows: usize, width: usize) -> Self {
        debug_assert!(width > 0, "zero-width field");
        let layout = RowLayout::new(rows, comm.size());
        let local = vec![0.0; layout.count(comm.rank()) * width];
        Self {
            comm,
            layout,
            width,
            local,
        }
    }

    /// Build a field from replicated row-major global data; every rank
    /// passes the same `global` slice and keeps only its own shard.
    pub fn from_global(comm: Arc<C>, width: usize, global: &[f64]) -> Result<Self, TransferError> {
        if width == 0 || global.len() % width != 0 {
            return Err(TransferError::InvalidShape {
                rows: if width == 0 { global.len() } else { global.len() / width },
                width,
            });
        }
        let rows = global.len() / width;
        let mut field = Self::zeros(comm, rows, width);
        let range = field.local_range();
        field
            .local
            .copy_from_slice(&global[range.start * width..range.end * width]);
        Ok(field)
    }

    /// Field whose every row equals `row` (the broadcast operand of the
    /// seed-distance computation).
    pub fn constant_rows(comm: Arc<C>, rows: usize, row: &[f64]) -> Self {
        debug_assert!(!row.is_empty(), "zero-width field");
        let width = row.len();
        let mut field = Self::zeros(comm, rows, width);
        for chunk in field.local.chunks_mut(width) {
            chunk.copy_from_slice(row);
        }
        field
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.layout.rows()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn layout(&self) -> RowLayout {
        self.layout
    }

    #[inline]
    pub fn comm(&self) -> &Arc<C> {
        &self.comm
    }

    /// Global row range owned by this rank.
    #[inline]
    pub fn local_range(&self) -> std::ops::Range<usize> {
        self.layout.range(self.comm.rank())
    }

    #[inline]
    pub fn local_slice(&self) -> &[f64] {
        &self.local
    }

    /// Locally owned row, or `None` when `row` lives on another rank or
    /// out of bounds.
    pub fn local_row(&self, row: usize) -> Option<&[f64]> {
        let range = self.local_range();
        if !range.contains(&row) {
            return None;
        }
        let off = (row - range.start) * self.width;
        Some(&self.local[off..off + self.width])
    }

    /// Store `values` into a global row; only the owning rank writes,
    /// other ranks treat the call as a no-op (SPMD-collective setter).
    pub fn set_row(&mut self, row: usize, values: &[f64]) -> Result<(), TransferError> {
        if row >= self.height() {
            return Err(TransferError::RowOutOfBounds {
                row,
                rows: self.height(),
            });
        }
        if values.len() != self.width {
            return Err(TransferError::ShapeMismatch {
                expected: (self.height(), self.width),
                found: (self.height(), values.len()),
            });
        }
        let range = self.local_range();
        if range.contains(&row) {
            let off = (row - range.start) * self.width;
            self.local[off..off + self.width].copy_from_slice(values);
        }
        Ok(())
    }

    fn check_same_shape(&self, other: &Self) -> Result<(), TransferError> {
        if self.layout != other.layout {
            return Err(TransferError::LayoutMismatch {
                expected: self.layout.rows(),
                expected_ranks: self.layout.ranks(),
                found: other.layout.rows(),
                found_ranks: other.layout.ranks(),
            });
        }
        if self.width != other.width {
            return Err(TransferError::ShapeMismatch {
                expected: (self.height(), self.width),
                found: (other.height(), other.width),
            });
        }
        Ok(())
    }

    /// `self += alpha * x`, entrywise over the local shard.
    pub fn axpy(&mut self, alpha: f64, x: &Self) -> Result<(), TransferError> {
        self.check_same_shape(x)?;
        for (a, b) in self.local.iter_mut().zip(&x.local) {
            *a += alpha * b;
        }
        Ok(())
    }

    /// `self *= alpha`, entrywise over the local shard.
    pub fn scale(&mut self, alpha: f64) {
        for a in &mut self.local {
            *a *= alpha;
        }
    }

    /// Row-wise Euclidean norms as a width-1 field with the same layout.
    pub fn row_norms(&self) -> Self {
        let mut norms = Self::zeros(Arc::clone(&self.comm), self.height(), 1);
        for (norm, row) in norms.local.iter_mut().zip(self.local.chunks(self.width)) {
            *norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        }
        norms
    }

    /// Global maximum absolute entry value with the row it occurs in;
    /// exact ties resolve to the lowest global row on every rank.
    pub fn max_abs_loc(&self) -> Result<(usize, f64), TransferError> {
        if self.height() == 0 {
            return Err(TransferError::EmptyField);
        }
        let start = self.local_range().start;
        let mut local_best = MaxLocEntry::NONE;
        for (i, row) in self.local.chunks(self.width).enumerate() {
            for v in row {
                let abs = v.abs();
                if abs > local_best.value {
                    local_best = MaxLocEntry::new(abs, start + i);
                }
            }
        }
        let best = all_reduce_max_loc(self.comm.as_ref(), TAG_REDUCE, local_best)?;
        if best.row == u64::MAX {
            return Err(TransferError::EmptyField);
        }
        Ok((best.row as usize, best.value))
    }

    /// Global maximum absolute entry value.
    pub fn max_abs(&self) -> Result<f64, TransferError> {
        if self.height() == 0 {
            return Err(TransferError::EmptyField);
        }
        let local_best = self
            .local
            .iter()
            .fold(f64::NEG_INFINITY, |acc, v| acc.max(v.abs()));
        let best = all_reduce_max(self.comm.as_ref(), TAG_REDUCE.offset(1), local_best)?;
        // Ranks with an empty shard contribute -inf; some rank owns a row.
        Ok(best)
    }

    /// Fetch one global row onto every rank (owner broadcasts).
    pub fn broadcast_row(&self, row: usize) -> Result<Vec<f64>, TransferError> {
        let owner = self
            .layout
            .owner_of(row)
            .ok_or(TransferError::RowOutOfBounds {
                row,
                rows: self.height(),
            })?;
        let me = self.comm.rank();
        let size = self.comm.size();
        if size == 1 {
            return Ok(self.local_row(row).expect("single rank owns all rows").to_vec());
        }
        if me == owner {
            let data = self.local_row(row).expect("owner holds the row").to_vec();
            let bytes: &[u8] = cast_slice(&data);
            let mut sends = Vec::with_capacity(size - 1);
            for peer in 0..size {
                if peer != me {
                    sends.push(self.comm.isend(peer, TAG_BCAST.base(), bytes));
                }
            }
            for send in sends {
                let _ = send.wait();
            }
            Ok(data)
        } else {
            let mut buf = vec![0u8; self.width * std::mem::size_of::<f64>()];
            let handle = self.comm.irecv(owner, TAG_BCAST.base(), &mut buf);
            match handle.wait() {
                Some(data) if data.len() == buf.len() => Ok(pod_collect_to_vec(&data)),
                Some(data) => Err(TransferError::CommError {
                    neighbor: owner,
                    message: format!("expected {} bytes for row {row}, got {}", buf.len(), data.len()),
                }),
                None => Err(TransferError::CommError {
                    neighbor: owner,
                    message: format!("failed to receive broadcast of row {row}"),
                }),
            }
        }
    }

    /// Assemble the full row-major data on every rank. Intended for the
    /// reduced (selection-sized) fields; never call it on full meshes.
    pub fn replicate(&self) -> Result<Vec<f64>, TransferError> {
        let size = self.comm.size();
        if size == 1 {
            return Ok(self.local.clone());
        }
        let elem = std::mem::size_of::<f64>();
        let expected: Vec<usize> = (0..size)
            .map(|r| self.layout.count(r) * self.width * elem)
            .collect();
        let shards = all_gather_bytes(
            self.comm.as_ref(),
            TAG_REPLICATE,
            cast_slice(&self.local),
            &expected,
        )?;
        let mut out = Vec::with_capacity(self.height() * self.width);
        for shard in &shards {
            out.extend(pod_collect_to_vec::<u8, f64>(shard));
        }
        Ok(out)
    }

    /// Pull an arbitrary list of rows into a new field, whatever rank
    /// each row lives on.
    ///
    /// Result row `i` equals this field's row `indices[i]`; the result is
    /// block-distributed over the same communicator. Requests are batched
    /// per owner rank: a count exchange, a row-id exchange, then one
    /// packed data message per rank pair. With a single rank this reduces
    /// to a local copy.
    ///
    /// Collective: every rank must call with the identical `indices`.
    pub fn gather_rows(&self, indices: &[usize]) -> Result<Self, TransferError> {
        for &idx in indices {
            if idx >= self.height() {
                return Err(TransferError::RowOutOfBounds {
                    row: idx,
                    rows: self.height(),
                });
            }
        }
        let me = self.comm.rank();
        let size = self.comm.size();
        let mut result = Self::zeros(Arc::clone(&self.comm), indices.len(), self.width);

        if size == 1 {
            for (dst, &src) in indices.iter().enumerate() {
                let row = self.local_row(src).expect("single rank owns all rows").to_vec();
                result.set_row(dst, &row)?;
            }
            return Ok(result);
        }

        // (result row, source row) pairs this rank must fill, grouped by
        // the rank owning the source row.
        let my_range = result.local_range();
        let mut wanted: HashMap<usize, Vec<(usize, usize)>> = my_range
            .clone()
            .map(|dst| (dst, indices[dst]))
            .into_group_map_by(|&(_, src)| {
                self.layout.owner_of(src).expect("index validated above")
            });

        // Rows this rank already owns need no exchange.
        if let Some(local_pairs) = wanted.remove(&me) {
            for (dst, src) in local_pairs {
                let row = self.local_row(src).expect("owner holds the row").to_vec();
                result.set_row(dst, &row)?;
            }
        }

        // Stage 1: symmetric count exchange. Owners cannot know who wants
        // their rows, so every rank pair trades a count (possibly zero).
        let elem = std::mem::size_of::<f64>();
        let mut count_bufs = vec![[0u8; std::mem::size_of::<WireCount>()]; size];
        let mut count_recvs = HashMap::new();
        for (peer, buf) in count_bufs.iter_mut().enumerate() {
            if peer != me {
                count_recvs.insert(peer, self.comm.irecv(peer, TAG_GATHER.sizes.base(), buf));
            }
        }
        let mut pending_sends = Vec::new();
        for peer in 0..size {
            if peer == me {
                continue;
            }
            let count = WireCount::new(wanted.get(&peer).map_or(0, Vec::len));
            pending_sends.push(self.comm.isend(
                peer,
                TAG_GATHER.sizes.base(),
                cast_slice(std::slice::from_ref(&count)),
            ));
        }
        let mut counts_in: HashMap<usize, usize> = HashMap::new();
        let mut maybe_err = None;
        for peer in 0..size {
            let Some(handle) = count_recvs.remove(&peer) else {
                continue;
            };
            match handle.wait() {
                Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                    counts_in.insert(peer, pod_read_unaligned::<WireCount>(&data).get());
                }
                _ if maybe_err.is_none() => {
                    maybe_err = Some(TransferError::CommError {
                        neighbor: peer,
                        message: format!("failed to receive gather count from rank {peer}"),
                    });
                }
                _ => {}
            }
        }
        for send in pending_sends.drain(..) {
            let _ = send.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }

        // Stage 2: requesters send the source-row id lists.
        let mut id_bufs: HashMap<usize, Vec<u8>> = HashMap::new();
        let mut id_recvs = HashMap::new();
        for peer in 0..size {
            let n = counts_in.get(&peer).copied().unwrap_or(0);
            if n > 0 {
                let buf = id_bufs
                    .entry(peer)
                    .or_insert_with(|| vec![0u8; n * std::mem::size_of::<WireRowId>()]);
                id_recvs.insert(peer, self.comm.irecv(peer, TAG_GATHER.rows.base(), buf));
            }
        }
        let mut id_payloads: HashMap<usize, Vec<WireRowId>> = HashMap::new();
        for peer in 0..size {
            if let Some(pairs) = wanted.get(&peer) {
                let ids: Vec<WireRowId> = pairs.iter().map(|&(_, src)| WireRowId::new(src)).collect();
                let payload = id_payloads.entry(peer).or_insert(ids);
                pending_sends.push(self.comm.isend(
                    peer,
                    TAG_GATHER.rows.base(),
                    cast_slice(payload),
                ));
            }
        }
        let mut requested_of_me: HashMap<usize, Vec<usize>> = HashMap::new();
        for peer in 0..size {
            let Some(handle) = id_recvs.remove(&peer) else {
                continue;
            };
            match handle.wait() {
                Some(data) if data.len() == counts_in[&peer] * std::mem::size_of::<WireRowId>() => {
                    let ids: Vec<WireRowId> = pod_collect_to_vec(&data);
                    requested_of_me.insert(peer, ids.into_iter().map(WireRowId::get).collect());
                }
                _ if maybe_err.is_none() => {
                    maybe_err = Some(TransferError::CommError {
                        neighbor: peer,
                        message: format!("failed to receive gather row ids from rank {peer}"),
                    });
                }
                _ => {}
            }
        }
        for send in pending_sends.drain(..) {
            let _ = send.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }

        // Stage 3: owners reply with packed row data, in the requested order.
        let mut data_bufs: HashMap<usize, Vec<u8>> = HashMap::new();
        let mut data_recvs = HashMap::new();
        for peer in 0..size {
            if let Some(pairs) = wanted.get(&peer) {
                let buf = data_bufs
                    .entry(peer)
                    .or_insert_with(|| vec![0u8; pairs.len() * self.width * elem]);
                data_recvs.insert(peer, self.comm.irecv(peer, TAG_GATHER.data.base(), buf));
            }
        }
        let mut data_payloads: HashMap<usize, Vec<f64>> = HashMap::new();
        for peer in 0..size {
            if let Some(rows) = requested_of_me.get(&peer) {
                let mut packed = Vec::with_capacity(rows.len() * self.width);
                for &src in rows {
                    let row = self.local_row(src).ok_or_else(|| TransferError::CommError {
                        neighbor: peer,
                        message: format!("rank {peer} requested row {src} this rank does not own"),
                    })?;
                    packed.extend_from_slice(row);
                }
                let payload = data_payloads.entry(peer).or_insert(packed);
                pending_sends.push(self.comm.isend(
                    peer,
                    TAG_GATHER.data.base(),
                    cast_slice(payload),
                ));
            }
        }
        for peer in 0..size {
            let Some(handle) = data_recvs.remove(&peer) else {
                continue;
            };
            let pairs = &wanted[&peer];
            match handle.wait() {
                Some(data) if data.len() == pairs.len() * self.width * elem => {
                    let values: Vec<f64> = pod_collect_to_vec(&data);
                    for (k, &(dst, _)) in pairs.iter().enumerate() {
                        result.set_row(dst, &values[k * self.width..(k + 1) * self.width])?;
                    }
                }
                _ if maybe_err.is_none() => {
                    maybe_err = Some(TransferError::CommError {
                        neighbor: peer,
                        message: format!("failed to receive gathered rows from rank {peer}"),
                    });
                }
                _ => {}
            }
        }
        for send in pending_sends {
            let _ = send.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }

        Ok(result)
    }
}
