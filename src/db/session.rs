use crate::primitives::concurrency::{Access, HeldLocks};
use crate::storage::{CollectionStore, Loaded, Record, Rewrite};
use crate::types::{Collection, RecordId, Result, StoreError};

use super::store::Collections;

/// Storage access while a [`LockPlan`](crate::primitives::concurrency::LockPlan)
/// is held.
///
/// Every call checks that the plan covers the collection in the needed mode,
/// so code running inside a session cannot touch a collection it did not lock.
pub struct Session<'a> {
    held: HeldLocks<'a>,
    collections: &'a Collections,
}

impl<'a> Session<'a> {
    pub(crate) fn new(held: HeldLocks<'a>, collections: &'a Collections) -> Self {
        Self { held, collections }
    }

    /// Locks backing this session.
    pub fn held(&self) -> &HeldLocks<'a> {
        &self.held
    }

    fn store(&self, collection: Collection, access: Access) -> Result<&'a CollectionStore> {
        if !self.held.covers(collection, access) {
            return Err(StoreError::invalid(format!(
                "{collection} is not locked for {access:?} in this session"
            )));
        }
        Ok(self.collections.get(collection))
    }

    /// Every well-formed record plus the skipped-line count. Needs read access.
    pub fn load(&self, collection: Collection) -> Result<Loaded> {
        self.store(collection, Access::Read)?.load()
    }

    /// Size of the backing file in bytes. Needs read access.
    pub fn file_len(&self, collection: Collection) -> Result<u64> {
        self.store(collection, Access::Read)?.file().len()
    }

    /// Records of `collection` matching `predicate`. Needs read access.
    pub fn scan<F>(&self, collection: Collection, predicate: F) -> Result<Vec<Record>>
    where
        F: FnMut(&Record) -> bool,
    {
        self.store(collection, Access::Read)?.scan(predicate)
    }

    /// Appends to `collection`. Needs write access.
    pub fn append(&self, collection: Collection, record: Record) -> Result<RecordId> {
        self.store(collection, Access::Write)?.append(record)
    }

    /// Rewrites `collection`. Needs write access.
    pub fn rewrite_all<F>(&self, collection: Collection, transform: F) -> Result<bool>
    where
        F: FnMut(&Record) -> Rewrite,
    {
        self.store(collection, Access::Write)?.rewrite_all(transform)
    }
}
