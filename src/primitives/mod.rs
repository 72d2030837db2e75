//! Low-level primitives the record store is built from.
//!
//! Includes the locking and throttling discipline and the line-oriented file
//! I/O used by every collection.

/// Concurrency primitives and synchronization.
///
/// Per-collection reader/writer locks with bounded waits, the fair global
/// storage throttle, and ordered multi-collection acquisition.
pub mod concurrency;

/// I/O abstractions and utilities.
///
/// Newline-delimited files with append and atomic whole-file replacement.
pub mod io;
