//! File-backed record store for a food-sharing service.
//!
//! Users, food offers and requests live in three pipe-delimited text files.
//! Every operation takes per-collection reader/writer locks in a fixed global
//! order plus a permit from a shared throttle, all with bounded waits, so
//! concurrent callers never observe torn rewrites and never deadlock.

#![warn(missing_docs)]

pub mod admin;
pub mod db;
pub mod logging;
pub mod model;
pub mod primitives;
pub mod storage;
pub mod types;

pub use db::{
    Command, Fields, JobHandle, Operation, Reply, Session, Store, StoreOptions, WorkerPool,
};
pub use logging::init_logging;
pub use model::{FoodOffer, FoodRequest, FoodStatus, RequestStatus, User};
pub use primitives::concurrency::{Access, CancelToken, LockPlan};
pub use types::{Collection, RecordId, Result, StoreError};
