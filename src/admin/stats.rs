use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::db::Store;
use crate::model::{food_fields, request_fields, user_fields};
use crate::primitives::concurrency::{LockPlan, ManagerSnapshot};
use crate::storage::Loaded;
use crate::types::{Collection, Result};

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub data_dir: String,
    pub users: CollectionStats,
    pub food_offers: CollectionStats,
    pub requests: CollectionStats,
    pub locks: ManagerSnapshot,
}

impl StatsReport {
    pub fn collection(&self, collection: Collection) -> &CollectionStats {
        match collection {
            Collection::Users => &self.users,
            Collection::FoodOffers => &self.food_offers,
            Collection::Requests => &self.requests,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionStats {
    pub file: String,
    pub records: usize,
    pub skipped_lines: usize,
    pub size_bytes: u64,
    /// Records per status (users: per role).
    pub by_status: BTreeMap<String, usize>,
}

impl CollectionStats {
    fn from_loaded(collection: Collection, loaded: &Loaded, size_bytes: u64) -> Self {
        let status_field = match collection {
            Collection::Users => user_fields::ROLE,
            Collection::FoodOffers => food_fields::STATUS,
            Collection::Requests => request_fields::STATUS,
        };
        let mut by_status = BTreeMap::new();
        for record in &loaded.records {
            if let Some(status) = record.field(status_field) {
                *by_status.entry(status.to_string()).or_insert(0) += 1;
            }
        }
        Self {
            file: collection.file_name().to_string(),
            records: loaded.records.len(),
            skipped_lines: loaded.skipped,
            size_bytes,
            by_status,
        }
    }
}

/// Gathers a [`StatsReport`] with all three collections read-locked at once.
pub fn stats(store: &Store) -> Result<StatsReport> {
    let (users, food_offers, requests) = store.with_session(&LockPlan::read_all(), |s| {
        let section = |collection| -> Result<CollectionStats> {
            let loaded = s.load(collection)?;
            let size = s.file_len(collection)?;
            Ok(CollectionStats::from_loaded(collection, &loaded, size))
        };
        Ok((
            section(Collection::Users)?,
            section(Collection::FoodOffers)?,
            section(Collection::Requests)?,
        ))
    })?;
    debug!(
        users = users.records,
        food_offers = food_offers.records,
        requests = requests.records,
        "admin.stats"
    );
    Ok(StatsReport {
        data_dir: store.options().data_dir.display().to_string(),
        users,
        food_offers,
        requests,
        locks: store.locks().snapshot(),
    })
}
