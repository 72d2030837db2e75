#![allow(missing_docs)]

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use foodshare::{CancelToken, Collection, LockPlan, Result, Store, StoreError, StoreOptions};
use tempfile::{tempdir, TempDir};

const TIMEOUT: Duration = Duration::from_millis(150);

fn open_store(permits: usize) -> Result<(TempDir, Store)> {
    let dir = tempdir()?;
    let mut opts = StoreOptions::scratch(dir.path());
    opts.lock_timeout = TIMEOUT;
    opts.throttle_timeout = TIMEOUT;
    opts.throttle_permits = permits;
    let store = Store::open(opts)?;
    Ok((dir, store))
}

/// Holds `plan` on another thread until the returned sender fires.
fn hold(store: &Store, plan: LockPlan) -> (mpsc::Sender<()>, JoinHandle<Result<()>>) {
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let store = store.clone();
    let handle = thread::spawn(move || {
        store.with_session(&plan, |_| {
            let _ = locked_tx.send(());
            let _ = release_rx.recv();
            Ok(())
        })
    });
    locked_rx.recv().expect("holder acquired its plan");
    (release_tx, handle)
}

#[test]
fn blocked_writer_reports_busy_and_releases_everything() -> Result<()> {
    let (_dir, store) = open_store(5)?;
    let (release, holder) = hold(&store, LockPlan::read(Collection::Users));

    let started = Instant::now();
    let err = store.register("dana", "pw", "donor").unwrap_err();
    let waited = started.elapsed();
    match &err {
        StoreError::Busy { resource, .. } => assert_eq!(*resource, "users lock"),
        other => panic!("expected busy, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert!(waited >= TIMEOUT, "gave up after {waited:?}");

    let snapshot = store.locks().snapshot();
    assert_eq!(snapshot.users.readers, 1);
    assert!(!snapshot.users.writer);
    assert_eq!(snapshot.throttle.in_use, 1);
    assert_eq!(snapshot.throttle.waiting, 0);

    release.send(()).expect("release holder");
    holder.join().expect("holder thread")?;
    assert!(store.locks().snapshot().is_idle());
    store.register("dana", "pw", "donor")?;
    Ok(())
}

#[test]
fn exhausted_throttle_reports_busy_and_drops_collection_locks() -> Result<()> {
    let (_dir, store) = open_store(1)?;
    let (release, holder) = hold(&store, LockPlan::read(Collection::Users));

    let err = store.add_request("alice", "rice", "2").unwrap_err();
    match &err {
        StoreError::Busy { resource, .. } => assert_eq!(*resource, "storage throttle"),
        other => panic!("expected busy, got {other:?}"),
    }
    let snapshot = store.locks().snapshot();
    assert!(snapshot.requests.is_idle());
    assert_eq!(snapshot.throttle.waiting, 0);

    release.send(()).expect("release holder");
    holder.join().expect("holder thread")?;
    assert!(store.locks().snapshot().is_idle());
    assert!(store.list_requests()?.is_empty());
    Ok(())
}

#[test]
fn multi_collection_plan_releases_earlier_locks_on_busy() -> Result<()> {
    let (_dir, store) = open_store(5)?;
    let (release, holder) = hold(&store, LockPlan::write(Collection::Requests));

    let plan = LockPlan::write(Collection::Users).and_write(Collection::FoodOffers).and_read(
        Collection::Requests,
    );
    let err = store.with_session(&plan, |_| Ok(())).unwrap_err();
    assert_eq!(err.code(), "busy");

    let snapshot = store.locks().snapshot();
    assert!(snapshot.users.is_idle());
    assert!(snapshot.food_offers.is_idle());
    assert!(snapshot.requests.writer);

    release.send(()).expect("release holder");
    holder.join().expect("holder thread")?;
    assert!(store.locks().snapshot().is_idle());
    Ok(())
}

#[test]
fn cancellation_ends_a_wait_early() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = StoreOptions::scratch(dir.path());
    opts.lock_timeout = Duration::from_secs(10);
    let store = Store::open(opts)?;
    let (release, holder) = hold(&store, LockPlan::write(Collection::FoodOffers));

    let token = CancelToken::new();
    let waiter = {
        let store = store.with_cancel(token.clone());
        thread::spawn(move || {
            let started = Instant::now();
            (store.list_food(), started.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(60));
    token.cancel();
    let (outcome, waited) = waiter.join().expect("waiter thread");
    assert!(matches!(outcome, Err(StoreError::Interrupted(_))));
    assert!(waited < Duration::from_secs(5));

    release.send(()).expect("release holder");
    holder.join().expect("holder thread")?;
    assert!(store.locks().snapshot().is_idle());
    Ok(())
}
