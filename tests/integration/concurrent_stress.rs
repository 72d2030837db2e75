//! Concurrent callers against one store.
//!
//! Covers union-of-appends with unique ids, rewrite isolation from readers,
//! single winners for duplicate registration and double claims, plans
//! naming collections in opposite orders, and nested operations that are
//! refused instead of waiting.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use foodshare::storage::Rewrite;
use foodshare::{Collection, LockPlan, Result, Store, StoreError, StoreOptions};
use tempfile::{tempdir, TempDir};

const THREADS: usize = 8;
const APPENDS_PER_THREAD: usize = 25;

fn open_store() -> Result<(TempDir, Store)> {
    let dir = tempdir()?;
    let mut opts = StoreOptions::scratch(dir.path());
    opts.lock_timeout = Duration::from_secs(10);
    opts.throttle_timeout = Duration::from_secs(10);
    let store = Store::open(opts)?;
    Ok((dir, store))
}

#[test]
fn concurrent_appends_keep_every_record_with_unique_ids() -> Result<()> {
    let (_dir, store) = open_store()?;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<Vec<String>> {
                barrier.wait();
                let mut ids = Vec::with_capacity(APPENDS_PER_THREAD);
                for i in 0..APPENDS_PER_THREAD {
                    let id = store.add_request(&format!("r{t}"), &format!("item{i}"), "1")?;
                    ids.push(id.0);
                }
                Ok(ids)
            })
        })
        .collect();

    let mut returned = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("append thread")? {
            assert!(returned.insert(id), "duplicate id handed out");
        }
    }

    let requests = store.list_requests()?;
    assert_eq!(requests.len(), THREADS * APPENDS_PER_THREAD);
    let persisted: HashSet<String> = requests.iter().map(|r| r.id.0.clone()).collect();
    assert_eq!(persisted, returned);
    for t in 0..THREADS {
        let mine = requests
            .iter()
            .filter(|r| r.receiver == format!("r{t}"))
            .count();
        assert_eq!(mine, APPENDS_PER_THREAD);
    }
    assert!(store.locks().snapshot().is_idle());
    Ok(())
}

#[test]
fn readers_never_observe_a_partial_rewrite() -> Result<()> {
    let (_dir, store) = open_store()?;
    for i in 0..20 {
        store.add_request("alice", &format!("item{i}"), "1")?;
    }

    let done = Arc::new(AtomicBool::new(false));
    let observations = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let done = Arc::clone(&done);
            let observations = Arc::clone(&observations);
            thread::spawn(move || -> Result<()> {
                while !done.load(Ordering::SeqCst) {
                    let requests = store.list_requests()?;
                    assert_eq!(requests.len(), 20);
                    let quantities: HashSet<&str> =
                        requests.iter().map(|r| r.quantity.as_str()).collect();
                    assert_eq!(quantities.len(), 1, "mixed image: {quantities:?}");
                    observations.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            })
        })
        .collect();

    for round in 2..6 {
        let quantity = round.to_string();
        store.with_session(&LockPlan::write(Collection::Requests), |s| {
            s.rewrite_all(Collection::Requests, |r| {
                thread::sleep(Duration::from_millis(2));
                let mut next = r.clone();
                next.set(3, quantity.as_str());
                Rewrite::Replace(next)
            })
        })?;
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().expect("reader thread")?;
    }

    assert!(observations.load(Ordering::SeqCst) > 0);
    let requests = store.list_requests()?;
    assert!(requests.iter().all(|r| r.quantity == "5"));
    Ok(())
}

#[test]
fn duplicate_registration_has_one_winner() -> Result<()> {
    let (_dir, store) = open_store()?;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.register("dana", &format!("pw{t}"), "donor")
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("register thread"))
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::Conflict(_))))
            .count(),
        THREADS - 1
    );
    let users = store.with_session(&LockPlan::read(Collection::Users), |s| {
        s.load(Collection::Users)
    })?;
    assert_eq!(users.records.len(), 1);
    Ok(())
}

#[test]
fn concurrent_claims_have_one_winner() -> Result<()> {
    let (_dir, store) = open_store()?;
    let id = store.add_food("dana", "bread", "3", "market")?;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                store.claim_food(id.as_str(), &format!("receiver{t}"))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("claim thread"))
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::NotFound(_))))
            .count(),
        THREADS - 1
    );
    assert!(store.list_food()?.is_empty());
    Ok(())
}

#[test]
fn plans_in_opposite_orders_do_not_deadlock() -> Result<()> {
    let (_dir, store) = open_store()?;
    let plans = [
        LockPlan::write(Collection::Requests).and_read(Collection::Users),
        LockPlan::write(Collection::Users).and_read(Collection::Requests),
        LockPlan::write(Collection::FoodOffers)
            .and_write(Collection::Requests)
            .and_read(Collection::Users),
    ];
    let handles: Vec<_> = (0..6)
        .map(|t| {
            let store = store.clone();
            let plan = plans[t % plans.len()].clone();
            thread::spawn(move || -> Result<()> {
                for _ in 0..50 {
                    store.with_session(&plan, |s| {
                        assert!(s.held().has_permit());
                        Ok(())
                    })?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("plan thread")?;
    }
    assert!(store.locks().snapshot().is_idle());
    Ok(())
}

#[test]
fn nested_operations_in_opposite_orders_fail_without_waiting() -> Result<()> {
    let (_dir, store) = open_store()?;
    let barrier = Arc::new(Barrier::new(2));
    let spawn = |plan: LockPlan, nested: fn(&Store) -> Result<()>| {
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || -> Result<()> {
            store.with_session(&plan, |_| {
                barrier.wait();
                let outcome = nested(&store);
                barrier.wait();
                outcome
            })
        })
    };
    let started = std::time::Instant::now();
    let requests_then_users = spawn(LockPlan::write(Collection::Requests), |store| {
        store.register("dana", "pw", "donor")
    });
    let users_then_requests = spawn(LockPlan::write(Collection::Users), |store| {
        store.add_request("alice", "rice", "2").map(|_| ())
    });
    for handle in [requests_then_users, users_then_requests] {
        let err = handle.join().expect("session thread").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)), "{err}");
    }
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(store.locks().snapshot().is_idle());
    assert!(store.list_requests()?.is_empty());
    Ok(())
}
