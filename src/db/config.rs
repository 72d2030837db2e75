use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::{MAX_ID_LEN, MIN_ID_LEN};
use crate::types::{Result, StoreError};

/// Options used when opening a [`Store`](crate::db::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Directory holding `users.txt`, `food.txt` and `requests.txt`.
    pub data_dir: PathBuf,
    /// Longest wait for a collection lock before `Busy`.
    pub lock_timeout: Duration,
    /// Longest wait for a throttle permit before `Busy`.
    pub throttle_timeout: Duration,
    /// Storage operations allowed to run at once across all collections.
    pub throttle_permits: usize,
    /// Threads in a [`WorkerPool`](crate::db::WorkerPool) built from these options.
    pub workers: usize,
    /// Hex digits per generated id.
    pub id_len: usize,
    /// Flush every write to stable storage before returning.
    pub sync_writes: bool,
    /// Create the data directory and empty collection files if missing.
    pub create_if_missing: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            lock_timeout: Duration::from_secs(5),
            throttle_timeout: Duration::from_secs(5),
            throttle_permits: 5,
            workers: 10,
            id_len: 8,
            sync_writes: true,
            create_if_missing: true,
        }
    }
}

impl StoreOptions {
    /// Defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Short timeouts and no fsync, for tests and benches on scratch directories.
    pub fn scratch(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_timeout: Duration::from_millis(500),
            throttle_timeout: Duration::from_millis(500),
            sync_writes: false,
            ..Self::new(data_dir)
        }
    }

    /// Rejects option combinations the store cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.throttle_permits == 0 {
            return Err(StoreError::invalid("throttle_permits must be at least 1"));
        }
        if self.workers == 0 {
            return Err(StoreError::invalid("workers must be at least 1"));
        }
        if !(MIN_ID_LEN..=MAX_ID_LEN).contains(&self.id_len) {
            return Err(StoreError::invalid(format!(
                "id_len must be between {MIN_ID_LEN} and {MAX_ID_LEN}"
            )));
        }
        if self.lock_timeout.is_zero() || self.throttle_timeout.is_zero() {
            return Err(StoreError::invalid("timeouts must be non-zero"));
        }
        Ok(())
    }
}
