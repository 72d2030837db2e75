#![forbid(unsafe_code)]

//! Administrative views over a running store.
//!
//! Reports are gathered under the same lock discipline as regular
//! operations, so they are consistent across collections.

mod stats;

/// Per-collection statistics.
///
/// Counts records, skipped malformed lines and status breakdowns while all
/// three collections are read-locked together.
pub use stats::{stats, CollectionStats, StatsReport};
