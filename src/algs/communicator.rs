//! Thin facade over serial, in-process, or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking -- the collectives in
//! [`crate::algs::reduction`] and the batched gather in
//! [`crate::dist::field`] call `.wait()` before they trust that a buffer
//! is ready.

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Typed communication-epoch tag. Collective operations derive their
/// point-to-point tags from a base tag so that distinct epochs never
/// collide in the mailbox or the MPI tag space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(base: u16) -> Self {
        CommTag(base)
    }

    pub const fn base(self) -> u16 {
        self.0
    }

    pub const fn offset(self, off: u16) -> Self {
        CommTag(self.0.wrapping_add(off))
    }
}

/// Tags used by one batched row-gather epoch: request counts, then
/// requested row ids, then packed row data.
#[derive(Copy, Clone, Debug)]
pub struct GatherTags {
    pub sizes: CommTag,
    pub rows: CommTag,
    pub data: CommTag,
}

impl GatherTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            rows: base.offset(1),
            data: base.offset(2),
        }
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This participant's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of participants.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Synchronize all participants. No-op for single-rank backends.
    fn barrier(&self) {}
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- ThreadComm: in-process multi-rank, for deterministic rank-parallel tests ---

type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);

/// Receive handle for [`ThreadComm`]; joins the polling thread on `wait`.
pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut guard = self.buf.lock();
        guard.take()
    }
}

/// In-process multi-rank communicator backed by a global FIFO mailbox.
///
/// Each simulated rank owns one `ThreadComm`; messages are matched on
/// `(src, dst, tag)` in FIFO order, so lockstep SPMD call sequences pair
/// up deterministically. Received data is truncated to the posted buffer
/// length. Tests sharing the global mailbox must not run concurrently.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
}

impl ThreadComm {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for size {size}");
        Self { rank, size }
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag);
        let slot = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);
        let buf_len = buf.len();
        let handle = std::thread::spawn(move || {
            loop {
                let taken = MAILBOX
                    .get_mut(&key)
                    .and_then(|mut queue| queue.pop_front());
                if let Some(bytes) = taken {
                    let take = bytes.len().min(buf_len);
                    *slot_clone.lock() = Some(bytes[..take].to_vec());
                    break;
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: slot,
            handle: Some(handle),
        }
    }

    fn barrier(&self) {
        const BARRIER_TAG: u16 = 0xFFFE;
        let mut bufs = vec![[0u8; 1]; self.size];
        let mut handles = Vec::with_capacity(self.size.saturating_sub(1));
        for (peer, buf) in bufs.iter_mut().enumerate() {
            if peer != self.rank {
                handles.push(self.irecv(peer, BARRIER_TAG, buf));
            }
        }
        for peer in 0..self.size {
            if peer != self.rank {
                self.isend(peer, BARRIER_TAG, &[1]);
            }
        }
        for h in handles {
            let _ = h.wait();
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as MpiWorld, Destination, Source};

    /// Inter-process communicator over MPI immediate operations.
    pub struct MpiComm {
        _universe: mpi::environment::Universe,
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator.
        ///
        /// # Panics
        /// Panics if MPI was already initialized in this process.
        pub fn new() -> Self {
            let universe = mpi::initialize().expect("MPI already initialized");
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                _universe: universe,
                world,
                rank,
                size,
            }
        }
    }

    /// Send handle: owns the leaked send buffer until completion.
    pub struct MpiSendHandle {
        req: mpi::request::Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }

    unsafe impl Send for MpiSendHandle {}

    impl Wait for MpiSendHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            // Reclaim the buffer leaked in `isend`.
            drop(unsafe { Box::from_raw(self.buf) });
            None
        }
    }

    /// Receive handle: owns the leaked receive buffer until completion.
    pub struct MpiRecvHandle {
        req: mpi::request::Request<'static, [u8], StaticScope>,
        buf: *mut [u8],
    }

    unsafe impl Send for MpiRecvHandle {}

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.req.wait();
            let boxed = unsafe { Box::from_raw(self.buf) };
            Some(boxed.into_vec())
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr = leaked as *mut [u8];
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, &*leaked, tag as i32);
            MpiSendHandle { req, buf: ptr }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            let leaked: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr = leaked as *mut [u8];
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, leaked, tag as i32);
            MpiRecvHandle { req, buf: ptr }
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn no_comm_is_single_rank() {
        let comm = NoComm;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        let mut buf = [0u8; 4];
        comm.isend(0, 1, &[9]);
        assert!(comm.irecv(0, 1, &mut buf).wait().is_none());
    }

    #[test]
    #[serial]
    fn thread_comm_round_trip() {
        let tag = CommTag::new(0x1000);
        let c0 = ThreadComm::new(0, 2);
        let c1 = ThreadComm::new(1, 2);

        let msg = b"hello";
        c0.isend(1, tag.base(), msg);

        let mut buf = [0u8; 5];
        let h = c1.irecv(0, tag.base(), &mut buf);
        let got = h.wait().unwrap();
        assert_eq!(&got, msg);
    }

    #[test]
    #[serial]
    fn thread_comm_fifo_order() {
        let tag = CommTag::new(0x1001);
        let c0 = ThreadComm::new(0, 2);
        let c1 = ThreadComm::new(1, 2);

        for i in 0..10u8 {
            c0.isend(1, tag.base(), &[i]);
        }
        let mut out = Vec::new();
        for _ in 0..10 {
            let mut b = [0u8; 1];
            let h = c1.irecv(0, tag.base(), &mut b);
            out.push(h.wait().unwrap()[0]);
        }
        assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
    }

    #[test]
    #[serial]
    fn thread_comm_truncates_to_buffer() {
        let tag = CommTag::new(0x1002);
        let c0 = ThreadComm::new(0, 2);
        let c1 = ThreadComm::new(1, 2);

        c0.isend(1, tag.base(), &[1, 2, 3, 4, 5, 6]);
        let mut b = [0u8; 4];
        let h = c1.irecv(0, tag.base(), &mut b);
        let got = h.wait().unwrap();
        assert_eq!(got, vec![1, 2, 3, 4]);
    }

    #[test]
    #[serial]
    fn thread_comm_barrier_two_ranks() {
        let t0 = std::thread::spawn(|| ThreadComm::new(0, 2).barrier());
        let t1 = std::thread::spawn(|| ThreadComm::new(1, 2).barrier());
        t0.join().unwrap();
        t1.join().unwrap();
    }

    #[test]
    fn gather_tags_are_distinct() {
        let tags = GatherTags::from_base(CommTag::new(0x2000));
        assert_ne!(tags.sizes, tags.rows);
        assert_ne!(tags.rows, tags.data);
        assert_ne!(tags.sizes, tags.data);
    }
}
