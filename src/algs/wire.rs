//! POD wire types for the collectives and the batched row gather.
//!
//! Everything that crosses a rank boundary is a `bytemuck::Pod` value so
//! buffers can be cast to and from byte slices without copies or manual
//! (de)serialization.

use bytemuck::{Pod, Zeroable};

/// Item count exchanged during the sizing stage of a batched gather.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct WireCount(u64);

impl WireCount {
    #[inline]
    pub fn new(n: usize) -> Self {
        WireCount(n as u64)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// Global row index exchanged during the request stage of a batched gather.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(transparent)]
pub struct WireRowId(u64);

impl WireRowId {
    #[inline]
    pub fn new(row: usize) -> Self {
        WireRowId(row as u64)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

/// One rank's candidate in a max-with-location reduction.
///
/// `row` is a global row index; ties on `value` resolve to the lowest row.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MaxLocEntry {
    pub value: f64,
    pub row: u64,
}

impl MaxLocEntry {
    /// Sentinel that loses against any real candidate (all values are
    /// absolute magnitudes, hence non-negative).
    pub const NONE: MaxLocEntry = MaxLocEntry {
        value: -1.0,
        row: u64::MAX,
    };

    #[inline]
    pub fn new(value: f64, row: usize) -> Self {
        Self {
            value,
            row: row as u64,
        }
    }

    /// Fold `other` into `self`, preferring the larger value and the
    /// lower row on exact ties.
    #[inline]
    pub fn merge(self, other: MaxLocEntry) -> MaxLocEntry {
        if other.value > self.value || (other.value == self.value && other.row < self.row) {
            other
        } else {
            self
        }
    }
}

pub use bytemuck::{bytes_of, cast_slice, cast_slice_mut, from_bytes, pod_collect_to_vec, pod_read_unaligned};
