//! One-shot timer service.
//!
//! Timers are kept in a min-heap ordered by deadline (generation numbers
//! break ties so equal deadlines fire in scheduling order). A dedicated
//! worker thread sleeps until the earliest deadline and delivers
//! [`Timeout`] events into the host's queue.
//!
//! [`Timers::sleep`] is the routine-level face of the service: it mints a
//! fresh [`Id`], schedules a timer, waits for the matching [`Timeout`], and
//! holds the pending timer as a scoped resource so that cancellation of the
//! routine cancels the timer instead of leaking it.

use super::queue::EventQueue;
use crate::ivr::{using, wait_if, Ivr, Scoped};
use crate::types::{Event, Id, Timeout};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerEntry {
    deadline: Instant,
    id: Id,
    generation: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for a min-heap (earliest deadline first).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct TimerState {
    heap: BinaryHeap<TimerEntry>,
    cancelled: HashSet<Id>,
    next_generation: u64,
    shutdown: bool,
}

/// The host's one-shot timer service.
pub struct Timers {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    queue: Arc<EventQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Timers {
    /// Starts the timer service, delivering [`Timeout`] events into
    /// `queue`.
    #[must_use]
    pub fn start(queue: Arc<EventQueue>) -> Arc<Self> {
        let timers = Arc::new(Self {
            state: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
            queue,
            worker: Mutex::new(None),
        });
        let service = Arc::clone(&timers);
        let handle = std::thread::Builder::new()
            .name("interflux-timers".into())
            .spawn(move || service.worker_loop())
            .expect("failed to spawn the timer worker");
        *timers.worker.lock() = Some(handle);
        timers
    }

    /// Schedules a one-shot timer firing `Timeout(id)` after `duration`.
    pub fn schedule(&self, id: Id, duration: Duration) {
        let mut state = self.state.lock();
        let generation = state.next_generation;
        state.next_generation += 1;
        state.heap.push(TimerEntry {
            deadline: Instant::now() + duration,
            id,
            generation,
        });
        trace!(timer = %id, ?duration, "timer scheduled");
        self.wakeup.notify_one();
    }

    /// Cancels a pending timer; a timer that already fired is unaffected.
    pub fn cancel(&self, id: Id) {
        let mut state = self.state.lock();
        if state.heap.iter().any(|entry| entry.id == id) {
            state.cancelled.insert(id);
            trace!(timer = %id, "timer cancelled");
            self.wakeup.notify_one();
        }
    }

    /// Returns the number of pending (non-cancelled) timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.heap.len() - state.cancelled.len()
    }

    /// Sleeps for `duration`.
    ///
    /// The pending timer is a scoped resource: cancelling the routine
    /// cancels the timer.
    #[must_use]
    pub fn sleep(self: &Arc<Self>, duration: Duration) -> Ivr<()> {
        let timers = Arc::clone(self);
        Ivr::delay(move || {
            let id = Id::fresh();
            timers.schedule(id, duration);
            using(TimerLease { id, timers }, move |lease| {
                let id = lease.id;
                wait_if(move |timeout: &Timeout| timeout.0 == id)
            })
        })
    }

    /// Stops the worker thread; pending timers are discarded.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.shutdown = true;
            self.wakeup.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        debug!("timer service stopped");
    }

    fn worker_loop(&self) {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return;
            }
            while let Some(entry) = state.heap.peek().copied() {
                if state.cancelled.remove(&entry.id) {
                    state.heap.pop();
                    continue;
                }
                if entry.deadline > Instant::now() {
                    break;
                }
                state.heap.pop();
                trace!(timer = %entry.id, "timer fired");
                // A closed queue means the host is shutting down; the
                // event is dropped with it.
                let _ = self.queue.submit(Event::new(Timeout(entry.id)));
            }
            match state.heap.peek().map(|entry| entry.deadline) {
                Some(deadline) => {
                    let _ = self.wakeup.wait_until(&mut state, deadline);
                }
                None => self.wakeup.wait(&mut state),
            }
        }
    }
}

impl std::fmt::Debug for Timers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timers")
            .field("pending", &self.pending())
            .finish()
    }
}

struct TimerLease {
    id: Id,
    timers: Arc<Timers>,
}

impl Scoped for TimerLease {
    fn release(&self) {
        self.timers.cancel(self.id);
    }
}
