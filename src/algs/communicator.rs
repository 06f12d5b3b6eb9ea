//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are contiguous byte slices. Handles are waitable but
//! non-blocking: exchange helpers post every receive and send first, then
//! call `.wait()` on each handle before trusting the data.
//!
//! Delivery between a fixed `(source, destination, tag)` triple is FIFO on
//! every backend, so repeated collectives on the same reserved tag never
//! overtake each other.
//!
//! Collective operations (`barrier`, `allgather`, `broadcast`,
//! `all_reduce_max`) have default implementations built from point-to-point
//! messages on reserved tags; a backend may override them with native ones.

use crate::mesh_error::MeshSieveError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(u16);

impl CommTag {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        CommTag(raw)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `k` slots after this one.
    #[inline]
    pub const fn offset(self, k: u16) -> Self {
        CommTag(self.0.wrapping_add(k))
    }
}

/// The pair of tags used by a two-phase (sizes, then payload) exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SectionCommTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl SectionCommTags {
    /// `sizes = base`, `data = base + 1`.
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

/// Base tags of the crate's exchanges; each reserves a small block above it.
pub mod tags {
    use super::CommTag;

    pub const DISTRIBUTE: CommTag = CommTag::new(0x1000);
    pub const OVERLAP: CommTag = CommTag::new(0x1100);
    pub const OVERLAP_SYMMETRY: CommTag = CommTag::new(0x1200);
    pub const UNIFY: CommTag = CommTag::new(0x1300);
    pub const SECTION: CommTag = CommTag::new(0x1400);
    pub const NUMBERING: CommTag = CommTag::new(0x1500);
    pub(crate) const ALLGATHER: CommTag = CommTag::new(0xFF00);
    pub(crate) const BROADCAST: CommTag = CommTag::new(0xFF01);
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    ///
    /// Receives yield the full payload; sends yield `None`. A receive that
    /// never completes (timeout, transport failure) also yields `None`.
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Non-blocking point-to-point messaging plus the collectives built on it.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Posts a receive; `buf.len()` is the expected size, the payload itself
    /// is returned by [`Wait::wait`].
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// True for the serial stand-in, where no peer exists.
    fn is_no_comm(&self) -> bool {
        false
    }

    /// Every rank contributes `send`; returns all contributions indexed by rank.
    fn allgather(&self, send: &[u8]) -> Result<Vec<Vec<u8>>, MeshSieveError> {
        let me = self.rank();
        let n = self.size();
        let tag = tags::ALLGATHER.as_u16();
        let mut recvs = Vec::with_capacity(n.saturating_sub(1));
        for peer in (0..n).filter(|&p| p != me) {
            recvs.push((peer, self.irecv(peer, tag, &mut [])));
        }
        let sends: Vec<_> = (0..n)
            .filter(|&p| p != me)
            .map(|peer| self.isend(peer, tag, send))
            .collect();
        let mut out = vec![Vec::new(); n];
        out[me] = send.to_vec();
        let mut maybe_err = None;
        for (peer, h) in recvs {
            match h.wait() {
                Some(data) => out[peer] = data,
                None if maybe_err.is_none() => {
                    maybe_err = Some(MeshSieveError::CommError {
                        neighbor: peer,
                        message: "allgather receive failed".into(),
                    });
                }
                None => {}
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        match maybe_err {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    /// Blocks until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), MeshSieveError> {
        self.allgather(&[]).map(|_| ())
    }

    /// Replaces `buf` on every rank by the root's contents.
    fn broadcast(&self, root: usize, buf: &mut Vec<u8>) -> Result<(), MeshSieveError> {
        let tag = tags::BROADCAST.as_u16();
        if self.rank() == root {
            let sends: Vec<_> = (0..self.size())
                .filter(|&p| p != root)
                .map(|peer| self.isend(peer, tag, buf))
                .collect();
            for s in sends {
                let _ = s.wait();
            }
            Ok(())
        } else {
            match self.irecv(root, tag, &mut []).wait() {
                Some(data) => {
                    *buf = data;
                    Ok(())
                }
                None => Err(MeshSieveError::CommError {
                    neighbor: root,
                    message: "broadcast receive failed".into(),
                }),
            }
        }
    }

    /// Maximum of `value` over all ranks.
    fn all_reduce_max(&self, value: u64) -> Result<u64, MeshSieveError> {
        let all = self.allgather(&value.to_le_bytes())?;
        let mut max = value;
        for (peer, bytes) in all.iter().enumerate() {
            let arr: [u8; 8] =
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| MeshSieveError::BufferSizeMismatch {
                        neighbor: peer,
                        expected: 8,
                        got: bytes.len(),
                    })?;
            max = max.max(u64::from_le_bytes(arr));
        }
        Ok(max)
    }
}

/// Agrees on success across all ranks.
///
/// Every rank passes its local outcome; if any rank failed, ranks that
/// succeeded get [`MeshSieveError::CollectiveAbort`] and failing ranks keep
/// their own error.
pub fn agree<C, T>(
    comm: &C,
    operation: &'static str,
    local: Result<T, MeshSieveError>,
) -> Result<T, MeshSieveError>
where
    C: Communicator + ?Sized,
{
    let flag = u64::from(local.is_err());
    let any = comm.all_reduce_max(flag)?;
    match local {
        Err(e) => Err(e),
        Ok(_) if any != 0 => Err(MeshSieveError::CollectiveAbort(operation)),
        Ok(v) => Ok(v),
    }
}

/// Compile-time no-op comm for serial runs: rank 0 of 1.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn is_no_comm(&self) -> bool {
        true
    }
}

// --- RayonComm: intra-process ranks on threads ---

type Key = (usize, usize, u16); // (src, dst, tag)

/// Mailbox shared by the ranks of one in-process world.
#[derive(Debug, Default)]
struct Mailbox {
    queues: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
}

/// In-process communicator: each rank is a thread holding one handle of a
/// world created by [`RayonComm::world`].
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Duration,
}

impl RayonComm {
    /// Default receive timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates `size` connected ranks sharing one mailbox.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                timeout: Self::DEFAULT_TIMEOUT,
            })
            .collect()
    }

    /// Sets how long a receive waits before reporting failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Pending receive on a [`RayonComm`] mailbox.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    deadline: Instant,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut guard = self.mailbox.lock.lock();
        loop {
            if let Some(mut q) = self.mailbox.queues.get_mut(&self.key) {
                if let Some(bytes) = q.pop_front() {
                    return Some(bytes.to_vec());
                }
            }
            let now = Instant::now();
            if now >= self.deadline {
                log::warn!(
                    "receive from rank {} (tag {}) timed out",
                    self.key.0,
                    self.key.2
                );
                return None;
            }
            self.mailbox
                .arrived
                .wait_for(&mut guard, self.deadline - now);
        }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        {
            let _guard = self.mailbox.lock.lock();
            self.mailbox
                .queues
                .entry(key)
                .or_default()
                .push_back(Bytes::copy_from_slice(buf));
        }
        self.mailbox.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            deadline: Instant::now() + self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination, Source};

    /// Communicator over `MPI_COMM_WORLD`.
    pub struct MpiComm {
        world: Arc<SimpleCommunicator>,
        _universe: Arc<Universe>,
        rank: usize,
        size: usize,
    }

    // SAFETY: MPI is initialised with thread support by the caller; handles
    // are only used from the thread that created them.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        /// Initialises MPI; `None` if it was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                world: Arc::new(world),
                _universe: Arc::new(universe),
                rank,
                size,
            })
        }
    }

    /// Pending immediate send; owns the leaked send buffer until completion.
    pub struct MpiSendHandle(Option<Box<dyn FnOnce()>>);

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(finish) = self.0.take() {
                finish();
            }
            None
        }
    }

    /// Receive performed lazily on `wait`.
    pub struct MpiRecvHandle {
        world: Arc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let data: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let raw: *mut [u8] = data;
            // SAFETY: `raw` stays valid until the closure reclaims it after `wait`.
            let req = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                mpi::request::StaticScope,
                unsafe { &*raw },
                tag as i32,
            );
            MpiSendHandle(Some(Box::new(move || {
                req.wait();
                drop(unsafe { Box::from_raw(raw) });
            })))
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) -> Result<(), MeshSieveError> {
            self.world.barrier();
            Ok(())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let (c0, c1) = (&world[0], &world[1]);
        let h = c1.irecv(0, 7, &mut [0u8; 4]);
        c0.isend(1, 7, &[1, 2, 3, 4]).wait();
        assert_eq!(h.wait(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn rayon_is_fifo_per_tag() {
        let world = RayonComm::world(2);
        world[0].isend(1, 3, &[1]);
        world[0].isend(1, 3, &[2]);
        world[0].isend(1, 4, &[9]);
        assert_eq!(world[1].irecv(0, 4, &mut []).wait(), Some(vec![9]));
        assert_eq!(world[1].irecv(0, 3, &mut []).wait(), Some(vec![1]));
        assert_eq!(world[1].irecv(0, 3, &mut []).wait(), Some(vec![2]));
    }

    #[test]
    fn rayon_receive_times_out() {
        let world = RayonComm::world(2);
        let c1 = world[1].clone().with_timeout(Duration::from_millis(20));
        assert_eq!(c1.irecv(0, 1, &mut []).wait(), None);
    }

    #[test]
    fn collectives_on_threads() {
        let world = RayonComm::world(3);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let all = c.allgather(&[c.rank() as u8]).unwrap();
                        let max = c.all_reduce_max(c.rank() as u64 * 10).unwrap();
                        let mut b = if c.rank() == 1 { vec![5, 6] } else { vec![] };
                        c.broadcast(1, &mut b).unwrap();
                        c.barrier().unwrap();
                        (all, max, b)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (all, max, b) in results {
            assert_eq!(all, vec![vec![0], vec![1], vec![2]]);
            assert_eq!(max, 20);
            assert_eq!(b, vec![5, 6]);
        }
    }

    #[test]
    fn no_comm_collectives_are_local() {
        let c = NoComm;
        assert_eq!(c.allgather(&[4]).unwrap(), vec![vec![4]]);
        assert_eq!(c.all_reduce_max(3).unwrap(), 3);
        let mut b = vec![1];
        c.broadcast(0, &mut b).unwrap();
        assert_eq!(b, vec![1]);
        assert!(c.is_no_comm());
    }

    #[test]
    fn agree_aborts_everywhere() {
        let world = RayonComm::world(2);
        let out: Vec<Result<(), MeshSieveError>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|c| {
                    s.spawn(move || {
                        let local = if c.rank() == 1 {
                            Err(MeshSieveError::CycleDetected)
                        } else {
                            Ok(())
                        };
                        agree(c, "test", local)
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(out[0], Err(MeshSieveError::CollectiveAbort("test")));
        assert_eq!(out[1], Err(MeshSieveError::CycleDetected));
    }
}
