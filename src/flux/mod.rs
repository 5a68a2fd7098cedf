//! The flux state machine.
//!
//! A flux is the run-time representation of a suspended routine, in exactly
//! one of four states:
//!
//! - `Delay`: not yet started; the thunk produces a flux on demand, so side
//!   effects in a routine's prologue are deferred to [`start`](Flux::start).
//! - `Waiting`: paused awaiting the next event.
//! - `Requesting`: paused awaiting the host's reply to a request.
//! - `Completed`: terminal, carrying the immutable [`Outcome`].
//!
//! # Invariants
//!
//! - `start` drives through all `Delay` nodes; no `Delay` appears at the top
//!   of a started flux, and `start` is idempotent.
//! - `step` requires `Waiting`; stepping a `Completed`, `Requesting`, or
//!   unstarted flux is a programmer error and panics.
//! - Continuations are always forced: `step` never returns `Delay`.
//! - A pending request must be resolved by the host before the next event is
//!   delivered; [`dispatch_requests`](Flux::dispatch_requests) drives that.
//!
//! # Cancellation
//!
//! [`try_cancel`](Flux::try_cancel) delivers the distinguished
//! [`Cancel`](crate::types::Cancel) event to a waiting flux, which is
//! expected to unwind through its scoped resources to
//! `Completed(Cancelled)`. Cancelling a flux with a pending request is
//! deferred: the request is resolved first, then cancellation continues. A
//! completed flux is inert to cancellation.

use crate::types::{CancelReason, Event, Outcome, Request, Response};
use core::fmt;

/// Thunk forced by [`Flux::start`].
pub type Thunk<T> = Box<dyn FnOnce() -> Flux<T>>;

/// Continuation applied to the next event.
pub type EventCont<T> = Box<dyn FnOnce(&Event) -> Flux<T>>;

/// Continuation applied to the host's reply.
pub type ResponseCont<T> = Box<dyn FnOnce(Response) -> Flux<T>>;

/// A suspended routine in one of four states.
pub enum Flux<T> {
    /// Not yet started.
    Delay(Thunk<T>),
    /// Paused awaiting the next event.
    Waiting(EventCont<T>),
    /// Paused awaiting the host's reply to the carried request.
    Requesting(Request, ResponseCont<T>),
    /// Terminal.
    Completed(Outcome<T>),
}

impl<T: 'static> Flux<T> {
    /// A flux completed with a value.
    #[must_use]
    pub fn value(value: T) -> Self {
        Self::Completed(Outcome::Value(value))
    }

    /// Unwraps `Delay` chains until the first started state.
    ///
    /// Idempotent on already-started fluxes.
    #[must_use]
    pub fn start(self) -> Self {
        let mut flux = self;
        loop {
            match flux {
                Self::Delay(thunk) => flux = thunk(),
                started => return started,
            }
        }
    }

    /// Delivers an event to a waiting flux.
    ///
    /// The returned flux is always forced: `Requesting`, `Waiting`, or
    /// `Completed`, never `Delay`.
    ///
    /// # Panics
    ///
    /// Panics if the flux is not `Waiting`; stepping a completed flux, a
    /// flux with a pending request, or an unstarted flux is a programmer
    /// error.
    #[must_use]
    pub fn step(self, event: &Event) -> Self {
        match self {
            Self::Waiting(cont) => cont(event).start(),
            Self::Delay(_) => panic!("step on an unstarted flux"),
            Self::Requesting(request, _) => {
                panic!("step on a flux with a pending request ({})", request.type_name())
            }
            Self::Completed(_) => panic!("step on a completed flux"),
        }
    }

    /// Requests cancellation with a default user reason.
    ///
    /// See [`try_cancel_with`](Self::try_cancel_with).
    #[must_use]
    pub fn try_cancel(self) -> Self {
        self.try_cancel_with(CancelReason::default())
    }

    /// Requests cancellation of this flux.
    ///
    /// - `Waiting`: delivers the [`Cancel`](crate::types::Cancel) event;
    ///   the continuation unwinds through its finalizers.
    /// - `Requesting`: deferred; the host must resolve the request first,
    ///   after which cancellation continues.
    /// - `Completed`: returned unchanged.
    ///
    /// # Panics
    ///
    /// Panics on an unstarted flux.
    #[must_use]
    pub fn try_cancel_with(self, reason: CancelReason) -> Self {
        match self {
            Self::Completed(_) => self,
            Self::Waiting(cont) => cont(&Event::cancel(reason)).start(),
            Self::Requesting(request, cont) => Self::Requesting(
                request,
                Box::new(move |response| cont(response).start().try_cancel_with(reason)),
            ),
            Self::Delay(_) => panic!("cancel on an unstarted flux"),
        }
    }

    /// Drives this flux through all immediate `Requesting` nodes.
    ///
    /// Each pending request is handed to `handler` and the reply fed into
    /// the continuation, until the flux is `Waiting` or `Completed`. Accepts
    /// an unstarted flux and starts it first.
    #[must_use]
    pub fn dispatch_requests(self, handler: &mut dyn FnMut(Request) -> Response) -> Self {
        let mut flux = self.start();
        loop {
            match flux {
                Self::Requesting(request, cont) => {
                    let response = handler(request);
                    flux = cont(response).start();
                }
                settled => return settled,
            }
        }
    }

    /// Returns true if the flux is awaiting an event.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting(_))
    }

    /// Returns true if the flux has a pending request.
    #[must_use]
    pub const fn is_requesting(&self) -> bool {
        matches!(self, Self::Requesting(..))
    }

    /// Returns true if the flux is terminal.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the outcome of a completed flux.
    #[must_use]
    pub const fn outcome(&self) -> Option<&Outcome<T>> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Consumes a completed flux, yielding its outcome.
    ///
    /// # Panics
    ///
    /// Panics if the flux has not completed.
    #[must_use]
    pub fn into_outcome(self) -> Outcome<T> {
        match self {
            Self::Completed(outcome) => outcome,
            other => panic!("flux has not completed: {other:?}"),
        }
    }
}

impl<T> fmt::Debug for Flux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delay(_) => f.write_str("Flux::Delay"),
            Self::Waiting(_) => f.write_str("Flux::Waiting"),
            Self::Requesting(request, _) => write!(f, "Flux::Requesting({})", request.type_name()),
            Self::Completed(_) => f.write_str("Flux::Completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{reply, Fault};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Tick;

    fn waiting_for_tick() -> Flux<u32> {
        Flux::Waiting(Box::new(|event| {
            if let Some(cancel) = event.cancellation() {
                return Flux::Completed(Outcome::Cancelled(cancel.reason()));
            }
            if event.is::<Tick>() {
                Flux::value(1)
            } else {
                waiting_for_tick()
            }
        }))
    }

    #[test]
    fn start_forces_delay_chains() {
        let forced = Rc::new(Cell::new(0));
        let observed = Rc::clone(&forced);
        let flux: Flux<u32> = Flux::Delay(Box::new(move || {
            observed.set(observed.get() + 1);
            Flux::Delay(Box::new(move || {
                observed.set(observed.get() + 1);
                Flux::value(9)
            }))
        }));
        assert_eq!(forced.get(), 0);
        let flux = flux.start();
        assert_eq!(forced.get(), 2);
        assert!(matches!(flux.into_outcome(), Outcome::Value(9)));
    }

    #[test]
    fn start_is_idempotent() {
        let flux = waiting_for_tick().start().start();
        assert!(flux.is_waiting());
    }

    #[test]
    fn step_consumes_the_matching_event() {
        let flux = waiting_for_tick().step(&Event::new(Tick));
        assert!(matches!(flux.into_outcome(), Outcome::Value(1)));
    }

    #[test]
    fn step_keeps_waiting_on_unmatched_events() {
        let flux = waiting_for_tick().step(&Event::new("noise"));
        assert!(flux.is_waiting());
    }

    #[test]
    #[should_panic(expected = "step on a completed flux")]
    fn step_on_a_completed_flux_panics() {
        let _ = Flux::value(0_u32).step(&Event::new(Tick));
    }

    #[test]
    #[should_panic(expected = "step on an unstarted flux")]
    fn step_on_an_unstarted_flux_panics() {
        let flux: Flux<u32> = Flux::Delay(Box::new(|| Flux::value(0)));
        let _ = flux.step(&Event::new(Tick));
    }

    #[test]
    fn cancel_unwinds_a_waiting_flux() {
        let flux = waiting_for_tick().try_cancel();
        assert!(matches!(flux.into_outcome(), Outcome::Cancelled(_)));
    }

    #[test]
    fn cancel_is_inert_on_a_completed_flux() {
        let flux = Flux::value(3_u32).try_cancel();
        assert!(matches!(flux.into_outcome(), Outcome::Value(3)));
    }

    #[test]
    fn cancel_is_deferred_past_a_pending_request() {
        struct Hangup;
        let flux: Flux<u32> = Flux::Requesting(
            Request::new(Hangup),
            Box::new(|_| waiting_for_tick()),
        );
        let flux = flux.try_cancel_with(CancelReason::shutdown());
        assert!(flux.is_requesting(), "cancellation must wait for the reply");

        let flux = flux.dispatch_requests(&mut |_| reply(()));
        assert!(matches!(flux.into_outcome(), Outcome::Cancelled(_)));
    }

    #[test]
    fn dispatch_requests_drains_chained_requests() {
        struct Step(u32);
        fn chain(n: u32) -> Flux<u32> {
            if n == 0 {
                Flux::value(0)
            } else {
                Flux::Requesting(
                    Request::new(Step(n)),
                    Box::new(move |_| chain(n - 1)),
                )
            }
        }
        let mut seen = Vec::new();
        let flux = chain(3).dispatch_requests(&mut |request| {
            seen.push(request.downcast::<Step>().unwrap().0);
            reply(())
        });
        assert_eq!(seen, vec![3, 2, 1]);
        assert!(flux.is_completed());
    }

    #[test]
    fn dispatch_requests_stops_at_waiting() {
        let flux = waiting_for_tick().dispatch_requests(&mut |_| reply(()));
        assert!(flux.is_waiting());
    }

    #[test]
    fn a_faulted_reply_reaches_the_continuation() {
        struct Probe;
        let flux: Flux<u32> = Flux::Requesting(
            Request::new(Probe),
            Box::new(|response| match response {
                Outcome::Value(_) => Flux::value(1),
                Outcome::Error(fault) => Flux::Completed(Outcome::Error(fault)),
                Outcome::Cancelled(reason) => Flux::Completed(Outcome::Cancelled(reason)),
            }),
        );
        let flux = flux.dispatch_requests(&mut |_| Outcome::Error(Fault::msg("line busy")));
        assert!(matches!(flux.into_outcome(), Outcome::Error(_)));
    }
}
