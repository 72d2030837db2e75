use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, warn};

use super::{CancelToken, Deadline};
use crate::types::{Result, StoreError};

const RESOURCE: &str = "storage throttle";

/// Fair counting gate bounding concurrent storage access.
///
/// Waiters are served strictly in arrival order: a permit is only handed to
/// the waiter at the head of the queue, so a stream of late arrivals cannot
/// starve an earlier one.
pub struct Throttle {
    capacity: usize,
    state: Mutex<ThrottleState>,
    wake: Condvar,
}

#[derive(Debug)]
struct ThrottleState {
    available: usize,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

impl ThrottleState {
    fn leave(&mut self, ticket: u64) {
        if let Some(pos) = self.queue.iter().position(|&t| t == ticket) {
            self.queue.remove(pos);
        }
    }
}

/// A held throttle slot, returned on drop.
pub struct Permit<'a> {
    throttle: &'a Throttle,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.throttle.state.lock();
        state.available += 1;
        drop(state);
        self.throttle.wake.notify_all();
    }
}

/// Point-in-time view of the throttle.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottleSnapshot {
    /// Total number of permits.
    pub capacity: usize,
    /// Permits currently handed out.
    pub in_use: usize,
    /// Callers queued for a permit.
    pub waiting: usize,
}

impl Throttle {
    /// Creates a throttle with `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(ThrottleState {
                available: capacity,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            wake: Condvar::new(),
        }
    }

    /// Waits in arrival order for a permit, at most `timeout`.
    pub fn acquire(&self, timeout: Duration, cancel: &CancelToken) -> Result<Permit<'_>> {
        let deadline = Deadline::after(timeout);
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.queue.push_back(ticket);
        loop {
            if state.available > 0 && state.queue.front() == Some(&ticket) {
                state.queue.pop_front();
                state.available -= 1;
                let more = state.available > 0 && !state.queue.is_empty();
                drop(state);
                if more {
                    self.wake.notify_all();
                }
                debug!(ticket, "throttle.acquire.granted");
                return Ok(Permit { throttle: self });
            }
            if cancel.is_cancelled() {
                state.leave(ticket);
                drop(state);
                self.wake.notify_all();
                debug!(ticket, "throttle.acquire.interrupted");
                return Err(StoreError::Interrupted(RESOURCE));
            }
            let Some(slice) = deadline.next_slice() else {
                state.leave(ticket);
                drop(state);
                self.wake.notify_all();
                warn!(ticket, "throttle.acquire.busy");
                return Err(deadline.busy(RESOURCE));
            };
            self.wake.wait_for(&mut state, slice);
        }
    }

    /// Current permit usage.
    pub fn snapshot(&self) -> ThrottleSnapshot {
        let state = self.state.lock();
        ThrottleSnapshot {
            capacity: self.capacity,
            in_use: self.capacity - state.available,
            waiting: state.queue.len(),
        }
    }
}
