use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{CollectionGuard, Permit};
use crate::types::{Collection, Result, StoreError};

thread_local! {
    /// Managers on which the current thread has a plan in flight.
    static ACTIVE_PLANS: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Lock mode requested for a collection. `Write` subsumes `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    /// Shared access: scans.
    Read,
    /// Exclusive access: appends and rewrites.
    Write,
}

/// The set of collection locks an operation needs.
///
/// Entries are kept in a `BTreeMap` keyed by [`Collection`], so iteration
/// always yields Users, then FoodOffers, then Requests regardless of the
/// order the caller listed them. Every multi-collection acquisition goes
/// through this type, which makes a cyclic wait between two plans impossible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockPlan {
    entries: BTreeMap<Collection, Access>,
}

impl LockPlan {
    /// Plan with a single shared lock.
    pub fn read(collection: Collection) -> Self {
        Self::default().and_read(collection)
    }

    /// Plan with a single exclusive lock.
    pub fn write(collection: Collection) -> Self {
        Self::default().and_write(collection)
    }

    /// Shared locks on every collection.
    pub fn read_all() -> Self {
        Collection::ALL
            .into_iter()
            .fold(Self::default(), |plan, c| plan.and_read(c))
    }

    /// Adds a shared lock; a collection already planned for writing stays exclusive.
    pub fn and_read(self, collection: Collection) -> Self {
        self.with(collection, Access::Read)
    }

    /// Adds an exclusive lock, upgrading an earlier shared entry.
    pub fn and_write(self, collection: Collection) -> Self {
        self.with(collection, Access::Write)
    }

    fn with(mut self, collection: Collection, access: Access) -> Self {
        let entry = self.entries.entry(collection).or_insert(access);
        *entry = (*entry).max(access);
        self
    }

    /// Entries in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = (Collection, Access)> + '_ {
        self.entries.iter().map(|(c, a)| (*c, *a))
    }

    /// Mode planned for `collection`, if any.
    pub fn access(&self, collection: Collection) -> Option<Access> {
        self.entries.get(&collection).copied()
    }

    /// Number of collections in the plan.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the plan locks nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locks and throttle permit held for the duration of one operation.
///
/// Dropping releases in the reverse of acquisition: the permit first, then
/// the collection locks from last acquired to first.
///
/// A thread holds at most one plan per manager. Acquiring a second one while
/// the first is alive fails with `Invalid` instead of waiting, since the
/// nested plan could lock a collection out of global order or queue for a
/// throttle permit while this thread keeps its own.
pub struct HeldLocks<'a> {
    manager: u64,
    permit: Option<Permit<'a>>,
    guards: Vec<CollectionGuard<'a>>,
}

impl<'a> HeldLocks<'a> {
    /// Registers a plan in flight on `manager` for the current thread.
    pub(crate) fn begin(manager: u64, plan: &LockPlan) -> Result<Self> {
        ACTIVE_PLANS.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&manager) {
                let wanted: Vec<String> = plan.iter().map(|(c, _)| c.to_string()).collect();
                return Err(StoreError::invalid(format!(
                    "nested lock acquisition of [{}] while this thread already holds a plan",
                    wanted.join(", ")
                )));
            }
            active.push(manager);
            Ok(())
        })?;
        Ok(Self {
            manager,
            permit: None,
            guards: Vec::new(),
        })
    }

    pub(crate) fn push_guard(&mut self, guard: CollectionGuard<'a>) {
        debug_assert!(
            self.guards
                .last()
                .map_or(true, |last| last.collection() < guard.collection()),
            "collection locks must be acquired in global order"
        );
        self.guards.push(guard);
    }

    pub(crate) fn set_permit(&mut self, permit: Permit<'a>) {
        self.permit = Some(permit);
    }

    /// Whether `collection` is held with at least `access`.
    pub fn covers(&self, collection: Collection, access: Access) -> bool {
        self.guards
            .iter()
            .any(|g| g.collection() == collection && g.access() >= access)
    }

    /// Whether a throttle permit is held.
    pub fn has_permit(&self) -> bool {
        self.permit.is_some()
    }

    /// Held collections in acquisition order.
    pub fn collections(&self) -> Vec<Collection> {
        self.guards.iter().map(|g| g.collection()).collect()
    }
}

impl Drop for HeldLocks<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
        }
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
        let manager = self.manager;
        // Ignore a destroyed thread-local during thread teardown.
        let _ = ACTIVE_PLANS.try_with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|id| *id == manager) {
                active.remove(pos);
            }
        });
    }
}
