//! Per-collection reader/writer locks, the global storage throttle, and the
//! ordered multi-collection acquisition built on top of them.

mod plan;
mod throttle;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{Collection, Result, StoreError};

pub use plan::{Access, HeldLocks, LockPlan};
pub use throttle::{Permit, Throttle, ThrottleSnapshot};

/// Upper bound on how long a waiter sleeps before re-checking cancellation.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared between a caller and its waits.
///
/// Clones observe the same flag. A cancelled token makes every pending and
/// future lock or throttle wait fail with [`StoreError::Interrupted`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Deadline bookkeeping shared by every bounded wait.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    /// Time left before the deadline, capped at the cancellation poll interval.
    /// `None` once the deadline has passed.
    pub(crate) fn next_slice(&self) -> Option<Duration> {
        let remaining = self.timeout.checked_sub(self.started.elapsed())?;
        if remaining.is_zero() {
            return None;
        }
        Some(remaining.min(CANCEL_POLL_INTERVAL))
    }

    pub(crate) fn busy(&self, resource: &'static str) -> StoreError {
        StoreError::Busy {
            resource,
            waited: self.started.elapsed(),
        }
    }
}

/// Reader/writer lock guarding a single collection's backing file.
pub struct CollectionLock {
    collection: Collection,
    lock: RwLock<()>,
    readers: AtomicU32,
    writers: AtomicU32,
}

/// Guard for a held collection lock, shared or exclusive.
pub struct CollectionGuard<'a> {
    owner: &'a CollectionLock,
    access: Access,
    held: Option<HeldGuard<'a>>,
}

enum HeldGuard<'a> {
    Read(RwLockReadGuard<'a, ()>),
    Write(RwLockWriteGuard<'a, ()>),
}

impl CollectionGuard<'_> {
    /// Collection this guard protects.
    pub fn collection(&self) -> Collection {
        self.owner.collection
    }

    /// Whether the guard is exclusive or shared.
    pub fn access(&self) -> Access {
        self.access
    }
}

impl Drop for CollectionGuard<'_> {
    fn drop(&mut self) {
        // The lock is released before the counters so a snapshot never
        // reports idle while a holder remains. A new holder may briefly
        // overlap with the old count.
        match self.held.take() {
            Some(HeldGuard::Read(guard)) => {
                drop(guard);
                self.owner.readers.fetch_sub(1, Ordering::SeqCst);
            }
            Some(HeldGuard::Write(guard)) => {
                drop(guard);
                self.owner.writers.fetch_sub(1, Ordering::SeqCst);
            }
            None => {}
        }
        debug!(collection = %self.owner.collection, access = ?self.access, "locks.release");
    }
}

impl CollectionLock {
    /// Creates an unlocked collection lock.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            lock: RwLock::new(()),
            readers: AtomicU32::new(0),
            writers: AtomicU32::new(0),
        }
    }

    /// Acquires the lock in the requested mode, waiting at most `timeout`.
    ///
    /// The wait is sliced so a cancelled token is noticed within
    /// [`CANCEL_POLL_INTERVAL`].
    pub fn acquire(
        &self,
        access: Access,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<CollectionGuard<'_>> {
        let deadline = Deadline::after(timeout);
        debug!(collection = %self.collection, access = ?access, "locks.acquire.start");
        loop {
            if cancel.is_cancelled() {
                debug!(collection = %self.collection, "locks.acquire.interrupted");
                return Err(StoreError::Interrupted(self.collection.lock_resource()));
            }
            let Some(slice) = deadline.next_slice() else {
                warn!(collection = %self.collection, access = ?access, "locks.acquire.busy");
                return Err(deadline.busy(self.collection.lock_resource()));
            };
            let held = match access {
                Access::Read => self.lock.try_read_for(slice).map(|guard| {
                    self.readers.fetch_add(1, Ordering::SeqCst);
                    HeldGuard::Read(guard)
                }),
                Access::Write => self.lock.try_write_for(slice).map(|guard| {
                    self.writers.fetch_add(1, Ordering::SeqCst);
                    HeldGuard::Write(guard)
                }),
            };
            if let Some(held) = held {
                debug!(collection = %self.collection, access = ?access, "locks.acquire.granted");
                return Ok(CollectionGuard {
                    owner: self,
                    access,
                    held: Some(held),
                });
            }
        }
    }

    /// Current holders, for observability and tests.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            readers: self.readers.load(Ordering::SeqCst),
            writer: self.writers.load(Ordering::SeqCst) > 0,
        }
    }
}

/// Snapshot of one collection lock.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockSnapshot {
    /// Number of active readers.
    pub readers: u32,
    /// Whether the writer lock is held.
    pub writer: bool,
}

impl LockSnapshot {
    /// True when nobody holds the lock.
    pub fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer
    }
}

/// Snapshot of every lock the manager owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManagerSnapshot {
    /// Users collection lock.
    pub users: LockSnapshot,
    /// Food offers collection lock.
    pub food_offers: LockSnapshot,
    /// Requests collection lock.
    pub requests: LockSnapshot,
    /// Global storage throttle.
    pub throttle: ThrottleSnapshot,
}

impl ManagerSnapshot {
    /// True when no lock is held, no permit is out and nobody is queued.
    pub fn is_idle(&self) -> bool {
        self.users.is_idle()
            && self.food_offers.is_idle()
            && self.requests.is_idle()
            && self.throttle.in_use == 0
            && self.throttle.waiting == 0
    }
}

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Owns the three collection locks and the shared storage throttle.
pub struct LockManager {
    id: u64,
    users: CollectionLock,
    food_offers: CollectionLock,
    requests: CollectionLock,
    throttle: Throttle,
    lock_timeout: Duration,
    throttle_timeout: Duration,
}

impl LockManager {
    /// Creates a manager with `permits` throttle slots and the given timeouts.
    pub fn new(permits: usize, lock_timeout: Duration, throttle_timeout: Duration) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            users: CollectionLock::new(Collection::Users),
            food_offers: CollectionLock::new(Collection::FoodOffers),
            requests: CollectionLock::new(Collection::Requests),
            throttle: Throttle::new(permits),
            lock_timeout,
            throttle_timeout,
        }
    }

    /// The lock guarding `collection`.
    pub fn lock_for(&self, collection: Collection) -> &CollectionLock {
        match collection {
            Collection::Users => &self.users,
            Collection::FoodOffers => &self.food_offers,
            Collection::Requests => &self.requests,
        }
    }

    /// The global storage throttle.
    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Acquires every lock in `plan` in global order, then one throttle permit.
    ///
    /// On any failure the locks already taken are released in reverse order
    /// before the error is returned. A thread that already holds a plan on
    /// this manager gets `Invalid` without waiting.
    pub fn acquire(&self, plan: &LockPlan, cancel: &CancelToken) -> Result<HeldLocks<'_>> {
        let mut held = HeldLocks::begin(self.id, plan).inspect_err(|_| {
            warn!(plan = ?plan, "locks.acquire.nested");
        })?;
        for (collection, access) in plan.iter() {
            let guard = self
                .lock_for(collection)
                .acquire(access, self.lock_timeout, cancel)?;
            held.push_guard(guard);
        }
        let permit = self.throttle.acquire(self.throttle_timeout, cancel)?;
        held.set_permit(permit);
        Ok(held)
    }

    /// Observability snapshot of every lock and the throttle.
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            users: self.users.snapshot(),
            food_offers: self.food_offers.snapshot(),
            requests: self.requests.snapshot(),
            throttle: self.throttle.snapshot(),
        }
    }
}
