//! The host run loop.
//!
//! The host owns the event queue, the request handler, and optionally the
//! timer service. Its loop:
//!
//! 1. Start the root routine.
//! 2. Drain all pending requests through the handler.
//! 3. If the root has completed, return its outcome.
//! 4. Dequeue the next event. A [`Cancel`](crate::types::Cancel) event
//!    drives the root to completion through its finalizers and yields
//!    `None`; any other event is stepped into the root.
//!
//! All routine advancement happens on the thread calling [`Host::run`]; the
//! queue is the only cross-thread surface. [`HostHandle`] is the clonable
//! face used by other threads to submit events or request shutdown.

mod queue;
mod timer;

pub use queue::{EventQueue, QueueClosed};
pub use timer::Timers;

use crate::flux::Flux;
use crate::ivr::Ivr;
use crate::types::{CancelReason, Event, Outcome, Request, Response};
use std::sync::Arc;
use tracing::{debug, trace};

/// The host: event queue, request handler, and run loop.
pub struct Host {
    queue: Arc<EventQueue>,
    timers: Option<Arc<Timers>>,
    handler: Box<dyn FnMut(Request) -> Response>,
}

impl Host {
    /// Creates a host with the given request handler.
    ///
    /// The handler is called synchronously from the run loop while pending
    /// requests are drained.
    #[must_use]
    pub fn new(handler: impl FnMut(Request) -> Response + 'static) -> Self {
        Self {
            queue: Arc::new(EventQueue::new()),
            timers: None,
            handler: Box::new(handler),
        }
    }

    /// Enables the timer service for this host.
    #[must_use]
    pub fn with_timers(mut self) -> Self {
        self.timers = Some(Timers::start(Arc::clone(&self.queue)));
        self
    }

    /// Returns the timer service, if enabled.
    #[must_use]
    pub fn timers(&self) -> Option<&Arc<Timers>> {
        self.timers.as_ref()
    }

    /// Returns a clonable handle for submitting events and shutting down.
    #[must_use]
    pub fn handle(&self) -> HostHandle {
        HostHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Runs `root` to completion.
    ///
    /// Returns `None` if the loop observed a cancellation event (shutdown)
    /// before the root produced an outcome, `Some(outcome)` otherwise.
    pub fn run<T: 'static>(mut self, root: Ivr<T>) -> Option<Outcome<T>> {
        let result = self.run_loop(root);
        if let Some(timers) = self.timers.take() {
            timers.shutdown();
        }
        self.queue.close();
        result
    }

    fn run_loop<T: 'static>(&mut self, root: Ivr<T>) -> Option<Outcome<T>> {
        let mut flux = root.start();
        loop {
            flux = flux.dispatch_requests(&mut *self.handler);
            if flux.is_completed() {
                debug!("root routine completed");
                return Some(flux.into_outcome());
            }
            let event = match self.queue.next() {
                Ok(event) => event,
                // Queue closed without a cancellation event: unwind the
                // root as on shutdown.
                Err(QueueClosed) => {
                    self.unwind(flux, CancelReason::shutdown());
                    return None;
                }
            };
            if let Some(cancel) = event.cancellation() {
                debug!(reason = %cancel.reason(), "cancellation observed");
                self.unwind(flux, cancel.reason());
                return None;
            }
            trace!(event = event.type_name(), "dispatching event");
            flux = flux.step(&event);
        }
    }

    /// Drives a routine through cancellation, resolving any requests its
    /// unwind emits.
    fn unwind<T: 'static>(&mut self, flux: Flux<T>, reason: CancelReason) {
        let flux = flux
            .try_cancel_with(reason)
            .dispatch_requests(&mut *self.handler);
        if !flux.is_completed() {
            // Cancellation was delivered and ignored; the routine is
            // abandoned as cancelled.
            debug!("routine ignored cancellation");
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("queue", &self.queue)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

/// A clonable handle for feeding a running host from other threads.
#[derive(Clone, Debug)]
pub struct HostHandle {
    queue: Arc<EventQueue>,
}

impl HostHandle {
    /// Submits an event to the host.
    pub fn submit(&self, event: Event) -> Result<(), QueueClosed> {
        self.queue.submit(event)
    }

    /// Requests shutdown: enqueues a cancellation event and closes the
    /// queue.
    ///
    /// The run loop drains events already queued, observes the
    /// cancellation, unwinds the root through its finalizers, and returns
    /// `None` to the caller of [`Host::run`].
    pub fn shutdown(&self) {
        let _ = self.queue.submit(Event::cancel(CancelReason::shutdown()));
        self.queue.close();
    }
}
