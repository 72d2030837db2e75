use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::primitives::concurrency::CancelToken;
use crate::types::{Result, StoreError};

use super::command::{Command, Reply};
use super::store::Store;

/// Fixed set of threads running [`Command`]s against one [`Store`].
///
/// Jobs are taken in submission order. Dropping the pool lets the workers
/// finish every queued job, then joins them.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    shutdown: bool,
}

struct Job {
    command: Command,
    cancel: CancelToken,
    slot: Arc<JobSlot>,
}

struct JobSlot {
    result: Mutex<Option<Result<Reply>>>,
    cv: Condvar,
}

impl JobSlot {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn finish(&self, outcome: Result<Reply>) {
        let mut result = self.result.lock();
        if result.is_none() {
            *result = Some(outcome);
            self.cv.notify_all();
        }
    }

    fn wait(&self) -> Result<Reply> {
        let mut guard = self.result.lock();
        loop {
            if let Some(outcome) = guard.take() {
                return outcome;
            }
            self.cv.wait(&mut guard);
        }
    }
}

/// Pending result of a submitted command.
pub struct JobHandle {
    slot: Arc<JobSlot>,
    cancel: CancelToken,
}

impl JobHandle {
    /// Asks the job to stop. A job still waiting for a lock or permit
    /// reports `Interrupted`; one already past its waits completes normally.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks until the job finishes.
    pub fn wait(self) -> Result<Reply> {
        self.slot.wait()
    }
}

impl WorkerPool {
    /// Starts `workers` threads (at least one) serving `store`.
    pub fn new(store: Store, workers: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
        });
        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let shared = Arc::clone(&shared);
            let store = store.clone();
            let handle = thread::Builder::new()
                .name(format!("foodshare-worker-{index}"))
                .spawn(move || worker_loop(store, shared))?;
            handles.push(handle);
        }
        debug!(workers = count, "pool.start");
        Ok(Self {
            shared,
            workers: handles,
        })
    }

    /// Pool sized by the store's `workers` option.
    pub fn for_store(store: Store) -> Result<Self> {
        let workers = store.options().workers;
        Self::new(store, workers)
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Queues `command` and returns a handle to its result.
    pub fn submit(&self, command: Command) -> JobHandle {
        let slot = Arc::new(JobSlot::new());
        let cancel = CancelToken::new();
        let mut state = self.shared.state.lock();
        state.pending.push_back(Job {
            command,
            cancel: cancel.clone(),
            slot: Arc::clone(&slot),
        });
        debug!(pending = state.pending.len(), "pool.submit");
        drop(state);
        self.shared.wakeup.notify_one();
        JobHandle { slot, cancel }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("pool.worker_panicked");
            }
        }
        // Workers drain the queue before exiting; anything left means they died.
        let mut state = self.shared.state.lock();
        while let Some(job) = state.pending.pop_front() {
            job.slot.finish(Err(StoreError::Interrupted("a worker")));
        }
    }
}

fn worker_loop(store: Store, shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.pending.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                shared.wakeup.wait(&mut state);
            }
        };
        let op = job.command.operation();
        let outcome = if job.cancel.is_cancelled() {
            Err(StoreError::Interrupted("a worker"))
        } else {
            store.with_cancel(job.cancel).apply(job.command)
        };
        if let Err(err) = &outcome {
            debug!(op = %op, code = err.code(), "pool.job_failed");
        }
        job.slot.finish(outcome);
    }
}
