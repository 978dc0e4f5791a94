//! Pool of reusable, individually locked workers
//!
//! Each slot is an `Arc<Mutex<Worker>>`. A [`WorkerHandle`] owns the slot's
//! lock guard, so a slot is busy exactly as long as its handle lives.
//! Automatic selection scans slots round-robin with `try_lock` and parks on
//! a condition variable when every slot is busy.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{ArcMutexGuard, Condvar, Mutex, RawMutex, RwLock};
use tracing::{debug, info, warn};

use crate::worker::Worker;
use crate::{ReaderConfig, ReaderError, Result};

/// Which worker services a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerSelector {
    /// First pooled worker that becomes free
    Auto,
    /// A fresh worker outside the pool
    Private,
    /// One specific pooled worker
    Pinned(usize),
}

impl WorkerSelector {
    /// Raw value of [`WorkerSelector::Auto`]
    pub const AUTO_RAW: i64 = -2;

    /// Raw value of [`WorkerSelector::Private`]
    pub const PRIVATE_RAW: i64 = -1;

    /// Decode the integer selector convention: `-2` auto, `-1` private,
    /// `i >= 0` pinned to worker `i`.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            Self::AUTO_RAW => Ok(Self::Auto),
            Self::PRIVATE_RAW => Ok(Self::Private),
            i if i >= 0 => usize::try_from(i).map(Self::Pinned).map_err(|_| {
                ReaderError::InvalidWorker {
                    selector: raw,
                    workers: 0,
                }
            }),
            _ => Err(ReaderError::InvalidWorker {
                selector: raw,
                workers: 0,
            }),
        }
    }

    /// Encode back to the integer convention
    pub fn as_raw(self) -> i64 {
        match self {
            Self::Auto => Self::AUTO_RAW,
            Self::Private => Self::PRIVATE_RAW,
            Self::Pinned(i) => i64::try_from(i).unwrap_or(i64::MAX),
        }
    }
}

impl From<usize> for WorkerSelector {
    fn from(index: usize) -> Self {
        Self::Pinned(index)
    }
}

impl TryFrom<i64> for WorkerSelector {
    type Error = ReaderError;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl fmt::Display for WorkerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Private => f.write_str("private"),
            Self::Pinned(i) => write!(f, "worker {i}"),
        }
    }
}

/// Release signal shared by every slot a pool has ever had
#[derive(Debug, Default)]
struct Availability {
    generation: Mutex<u64>,
    released: Condvar,
}

impl Availability {
    fn notify(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.released.notify_one();
    }
}

/// Notifies waiters when dropped. Declared after the guard in the pooled
/// handle so the slot is unlocked first.
#[derive(Debug)]
struct ReleaseNotice {
    slot: usize,
    availability: Arc<Availability>,
}

impl Drop for ReleaseNotice {
    fn drop(&mut self) {
        self.availability.notify();
        debug!("Released worker {}", self.slot);
    }
}

enum HandleKind {
    Pooled {
        guard: ArcMutexGuard<RawMutex, Worker>,
        notice: ReleaseNotice,
    },
    Private(Worker),
}

/// Exclusive access to one worker for the duration of a read
pub struct WorkerHandle {
    kind: HandleKind,
}

impl WorkerHandle {
    /// Pool slot index, or `None` for a private worker
    pub fn slot(&self) -> Option<usize> {
        match &self.kind {
            HandleKind::Pooled { notice, .. } => Some(notice.slot),
            HandleKind::Private(_) => None,
        }
    }

    /// True for a worker created outside the pool
    pub fn is_private(&self) -> bool {
        matches!(self.kind, HandleKind::Private(_))
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("slot", &self.slot())
            .finish_non_exhaustive()
    }
}

impl Deref for WorkerHandle {
    type Target = Worker;

    fn deref(&self) -> &Worker {
        match &self.kind {
            HandleKind::Pooled { guard, .. } => &**guard,
            HandleKind::Private(worker) => worker,
        }
    }
}

impl DerefMut for WorkerHandle {
    fn deref_mut(&mut self) -> &mut Worker {
        match &mut self.kind {
            HandleKind::Pooled { guard, .. } => &mut **guard,
            HandleKind::Private(worker) => worker,
        }
    }
}

type Slots = Arc<[Arc<Mutex<Worker>>]>;

fn no_slots() -> Slots {
    Arc::from(Vec::new())
}

/// Counters describing pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pooled acquisitions served
    pub acquisitions: u64,
    /// Auto acquisitions that had to wait for a release
    pub waits: u64,
    /// Private workers created
    pub private_workers: u64,
}

/// A set of reusable workers.
///
/// The pool starts uninitialized unless built with [`WorkerPool::new`].
/// Private reads work in every state.
pub struct WorkerPool {
    slots: RwLock<Slots>,
    cursor: AtomicUsize,
    availability: Arc<Availability>,
    scratch_capacity: usize,
    reuse_files: bool,
    acquisitions: AtomicU64,
    waits: AtomicU64,
    private_workers: AtomicU64,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.len())
            .field("scratch_capacity", &self.scratch_capacity)
            .field("reuse_files", &self.reuse_files)
            .finish_non_exhaustive()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::uninitialized(&ReaderConfig::default())
    }
}

impl WorkerPool {
    /// Create a pool with `config.workers` slots
    pub fn new(config: &ReaderConfig) -> Result<Self> {
        config.validate()?;
        let pool = Self::uninitialized(config);
        pool.init_workers(config.workers)?;
        Ok(pool)
    }

    /// Create a pool with no slots. Pooled acquisitions fail with
    /// [`ReaderError::PoolUninitialized`] until [`WorkerPool::init_workers`].
    pub fn uninitialized(config: &ReaderConfig) -> Self {
        Self {
            slots: RwLock::new(no_slots()),
            cursor: AtomicUsize::new(0),
            availability: Arc::new(Availability::default()),
            scratch_capacity: config.scratch_capacity,
            reuse_files: config.reuse_file_handles,
            acquisitions: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            private_workers: AtomicU64::new(0),
        }
    }

    fn new_worker(&self) -> Worker {
        Worker::new(self.scratch_capacity, self.reuse_files)
    }

    /// Replace the slot set with `n` fresh workers.
    ///
    /// Handles on the previous slots stay valid until dropped.
    pub fn init_workers(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(ReaderError::InvalidWorkerCount(n));
        }

        let fresh: Vec<_> = (0..n)
            .map(|_| Arc::new(Mutex::new(self.new_worker())))
            .collect();

        let mut slots = self.slots.write();
        let busy = slots.iter().filter(|slot| slot.is_locked()).count();
        if busy > 0 {
            warn!(
                "Re-initializing worker pool while {} of {} workers are in use",
                busy,
                slots.len()
            );
        }
        *slots = fresh.into();
        drop(slots);

        self.cursor.store(0, Ordering::Relaxed);
        info!("Initialized worker pool with {} workers", n);
        Ok(())
    }

    /// Drop every slot, returning the pool to the uninitialized state
    pub fn shutdown(&self) {
        let old = std::mem::replace(&mut *self.slots.write(), no_slots());
        if !old.is_empty() {
            info!("Shut down worker pool with {} workers", old.len());
        }
    }

    /// Number of pooled workers
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// True when the pool has no slots
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the pool has slots
    pub fn is_ready(&self) -> bool {
        !self.is_empty()
    }

    /// Usage counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            private_workers: self.private_workers.load(Ordering::Relaxed),
        }
    }

    fn snapshot(&self) -> Result<Slots> {
        let slots = self.slots.read().clone();
        if slots.is_empty() {
            return Err(ReaderError::PoolUninitialized);
        }
        Ok(slots)
    }

    fn pooled(&self, slot: usize, guard: ArcMutexGuard<RawMutex, Worker>) -> WorkerHandle {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        debug!("Acquired worker {}", slot);
        WorkerHandle {
            kind: HandleKind::Pooled {
                guard,
                notice: ReleaseNotice {
                    slot,
                    availability: Arc::clone(&self.availability),
                },
            },
        }
    }

    /// Acquire a worker. Blocks for `Pinned` until that slot is free, and
    /// for `Auto` until any slot is free.
    pub fn acquire(&self, selector: WorkerSelector) -> Result<WorkerHandle> {
        match selector {
            WorkerSelector::Private => {
                self.private_workers.fetch_add(1, Ordering::Relaxed);
                debug!("Created private worker");
                Ok(WorkerHandle {
                    kind: HandleKind::Private(self.new_worker()),
                })
            }
            WorkerSelector::Pinned(index) => {
                let slots = self.snapshot()?;
                let slot = slots.get(index).ok_or(ReaderError::InvalidWorker {
                    selector: selector.as_raw(),
                    workers: slots.len(),
                })?;
                let guard = slot.lock_arc();
                Ok(self.pooled(index, guard))
            }
            WorkerSelector::Auto => {
                let slots = self.snapshot()?;
                // Scanning under the generation lock means a release between
                // a failed scan and the wait cannot be missed.
                let mut generation = self.availability.generation.lock();
                let mut waited = false;
                loop {
                    if let Some((index, guard)) = self.try_any(&slots) {
                        drop(generation);
                        if waited {
                            self.waits.fetch_add(1, Ordering::Relaxed);
                        }
                        return Ok(self.pooled(index, guard));
                    }
                    waited = true;
                    self.availability.released.wait(&mut generation);
                }
            }
        }
    }

    /// Try every slot once, starting after the last one handed out
    fn try_any(&self, slots: &Slots) -> Option<(usize, ArcMutexGuard<RawMutex, Worker>)> {
        let n = slots.len();
        let start = self.cursor.load(Ordering::Relaxed) % n;
        (0..n).map(|step| (start + step) % n).find_map(|index| {
            let guard = slots[index].try_lock_arc()?;
            self.cursor.store(index + 1, Ordering::Relaxed);
            Some((index, guard))
        })
    }

    /// Return a worker to the pool. Equivalent to dropping the handle.
    pub fn release(&self, handle: WorkerHandle) {
        drop(handle);
    }
}
