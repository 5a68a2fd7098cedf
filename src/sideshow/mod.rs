//! The sideshow coordinator: a nested, replaceable sub-routine driven by a
//! control routine through in-band requests.
//!
//! A control routine wrapped by [`attach_to`] receives a [`Control`]
//! handle. [`Control::begin`] cancels the current sideshow (if any),
//! installs a new one, and returns only after the new sideshow has advanced
//! to its first suspension point or completed. [`Control::state`] reads the
//! currently installed tag without touching the sideshow.
//!
//! The coordinator intercepts the control's tagged requests before they
//! reach the host, so sideshow management works host-free and never
//! pollutes the host's request trace. Requests are tagged with a fresh
//! [`Id`] per attachment, so nested attachments do not interfere.
//!
//! # Error forwarding
//!
//! - A new sideshow that settles with a fault before its first suspension:
//!   the fault is returned to the caller of `begin` and the slot is idle.
//! - An old sideshow that faults while being cancelled: the fault is
//!   returned to the caller of `begin` and the new routine is discarded.
//! - A sideshow that faults on its own: the fault is held and surfaces at
//!   the next `begin`, or merges into the final result.
//! - At control completion the sideshow is cancelled; a control fault
//!   dominates, a sideshow teardown fault replaces a control value.

use crate::combinator::cancel_and_drain;
use crate::flux::{Flux, ResponseCont};
use crate::ivr::{request, Ivr};
use crate::types::{reply, CancelReason, Fault, Id, Outcome, Request};
use std::marker::PhantomData;
use tracing::debug;

/// Handle through which a control routine manages its sideshow.
///
/// `S` tags the installed sideshow and is what [`state`](Control::state)
/// reports.
pub struct Control<S> {
    id: Id,
    _tag: PhantomData<fn(S) -> S>,
}

impl<S> Clone for Control<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Control<S> {}

impl<S: 'static> Control<S> {
    /// Replaces the current sideshow.
    ///
    /// Cancels the installed sideshow (running its finalizers), installs
    /// `routine`, and returns only after the new sideshow has advanced to
    /// its first suspension point or completed. Faults from the new
    /// sideshow's prologue, or from the old sideshow's unwind, surface
    /// here.
    #[must_use]
    pub fn begin(&self, state: S, routine: Ivr<()>) -> Ivr<()> {
        request(Replace {
            id: self.id,
            state,
            routine,
        })
    }

    /// Returns the tag of the installed sideshow, or `None` when idle.
    #[must_use]
    pub fn state(&self) -> Ivr<Option<S>> {
        request(GetState { id: self.id })
    }
}

impl<S> std::fmt::Debug for Control<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Control({})", self.id)
    }
}

struct Replace<S> {
    id: Id,
    state: S,
    routine: Ivr<()>,
}

struct GetState {
    id: Id,
}

enum SideshowSlot<S> {
    Idle,
    Live { state: S, flux: Flux<()> },
}

struct Coordinator<S> {
    id: Id,
    sideshow: SideshowSlot<S>,
    pending: Option<Fault>,
}

/// Wraps a control routine, giving it a [`Control`] handle over a nested
/// sideshow slot.
#[must_use]
pub fn attach_to<S, R>(control: impl FnOnce(Control<S>) -> Ivr<R> + 'static) -> Ivr<R>
where
    S: Clone + 'static,
    R: 'static,
{
    Ivr::delay(move || {
        let id = Id::fresh();
        let flux = control(Control {
            id,
            _tag: PhantomData,
        })
        .start();
        Ivr::from_flux(settle(
            Coordinator {
                id,
                sideshow: SideshowSlot::<S>::Idle,
                pending: None,
            },
            flux,
        ))
    })
}

fn settle<S, R>(mut coord: Coordinator<S>, control: Flux<R>) -> Flux<R>
where
    S: Clone + 'static,
    R: 'static,
{
    // The sideshow advances first: its pending requests flow to the host
    // before the control is consulted.
    if let SideshowSlot::Live { state, flux } =
        std::mem::replace(&mut coord.sideshow, SideshowSlot::Idle)
    {
        match flux {
            Flux::Requesting(request, cont) => {
                return Flux::Requesting(
                    request,
                    Box::new(move |response| {
                        coord.sideshow = SideshowSlot::Live {
                            state,
                            flux: cont(response).start(),
                        };
                        settle(coord, control)
                    }),
                );
            }
            Flux::Completed(outcome) => {
                // The sideshow settled on its own; the slot goes idle and
                // a fault is held for the next begin or the final merge.
                if let Outcome::Error(fault) = outcome {
                    debug!(sideshow = %coord.id, "sideshow faulted");
                    if coord.pending.is_none() {
                        coord.pending = Some(fault);
                    }
                }
            }
            waiting => {
                coord.sideshow = SideshowSlot::Live {
                    state,
                    flux: waiting,
                };
            }
        }
    }
    match control {
        Flux::Completed(outcome) => teardown(coord, outcome),
        Flux::Requesting(request, cont) => intercept(coord, request, cont),
        Flux::Waiting(cont) => Flux::Waiting(Box::new(move |event| {
            // One event, both continuations: sideshow first, then control.
            if let SideshowSlot::Live { state, flux } =
                std::mem::replace(&mut coord.sideshow, SideshowSlot::Idle)
            {
                let flux = match flux {
                    Flux::Waiting(sideshow_cont) => sideshow_cont(event).start(),
                    settled => settled,
                };
                coord.sideshow = SideshowSlot::Live { state, flux };
            }
            settle(coord, cont(event).start())
        })),
        Flux::Delay(_) => unreachable!("control flux is started"),
    }
}

fn intercept<S, R>(coord: Coordinator<S>, request: Request, cont: ResponseCont<R>) -> Flux<R>
where
    S: Clone + 'static,
    R: 'static,
{
    let request = match request.downcast::<Replace<S>>() {
        Ok(replace) if replace.id == coord.id => {
            debug!(sideshow = %coord.id, "replacing sideshow");
            return begin_replace(coord, replace.state, replace.routine, cont);
        }
        // Same payload type, different attachment: not ours.
        Ok(foreign) => Request::new(foreign),
        Err(request) => request,
    };
    let request = match request.downcast::<GetState>() {
        Ok(get) if get.id == coord.id => {
            let current: Option<S> = match &coord.sideshow {
                SideshowSlot::Live { state, .. } => Some(state.clone()),
                SideshowSlot::Idle => None,
            };
            return settle(coord, cont(reply(current)).start());
        }
        Ok(foreign) => Request::new(foreign),
        Err(request) => request,
    };
    Flux::Requesting(
        request,
        Box::new(move |response| settle(coord, cont(response).start())),
    )
}

fn begin_replace<S, R>(
    mut coord: Coordinator<S>,
    new_state: S,
    routine: Ivr<()>,
    cont: ResponseCont<R>,
) -> Flux<R>
where
    S: Clone + 'static,
    R: 'static,
{
    if let Some(fault) = coord.pending.take() {
        // An earlier sideshow fault surfaces to this begin; the new
        // routine is discarded.
        return settle(coord, cont(Outcome::Error(fault)).start());
    }
    match std::mem::replace(&mut coord.sideshow, SideshowSlot::Idle) {
        SideshowSlot::Idle => install(coord, new_state, routine.start(), cont),
        SideshowSlot::Live { flux, .. } => retire(
            coord,
            flux.try_cancel_with(CancelReason::superseded()),
            new_state,
            routine,
            cont,
        ),
    }
}

/// Drains the cancelled old sideshow before installing the new one.
fn retire<S, R>(
    coord: Coordinator<S>,
    old: Flux<()>,
    new_state: S,
    routine: Ivr<()>,
    cont: ResponseCont<R>,
) -> Flux<R>
where
    S: Clone + 'static,
    R: 'static,
{
    match old {
        Flux::Requesting(request, old_cont) => Flux::Requesting(
            request,
            Box::new(move |response| {
                retire(coord, old_cont(response).start(), new_state, routine, cont)
            }),
        ),
        Flux::Completed(Outcome::Error(fault)) => {
            // The old sideshow faulted while unwinding: the fault goes to
            // the caller of begin and the new routine is discarded.
            settle(coord, cont(Outcome::Error(fault)).start())
        }
        Flux::Completed(_) => install(coord, new_state, routine.start(), cont),
        // Ignored cancellation: settled as cancelled.
        Flux::Waiting(_) | Flux::Delay(_) => install(coord, new_state, routine.start(), cont),
    }
}

/// Drives the new sideshow to its first suspension point, then replies to
/// the control.
fn install<S, R>(
    mut coord: Coordinator<S>,
    state: S,
    new: Flux<()>,
    cont: ResponseCont<R>,
) -> Flux<R>
where
    S: Clone + 'static,
    R: 'static,
{
    match new {
        Flux::Requesting(request, new_cont) => Flux::Requesting(
            request,
            Box::new(move |response| install(coord, state, new_cont(response).start(), cont)),
        ),
        Flux::Completed(outcome) => {
            // Settled before its first suspension: the slot stays idle and
            // a fault is the begin's reply.
            let response = match outcome {
                Outcome::Error(fault) => Outcome::Error(fault),
                _ => reply(()),
            };
            settle(coord, cont(response).start())
        }
        waiting @ Flux::Waiting(_) => {
            coord.sideshow = SideshowSlot::Live {
                state,
                flux: waiting,
            };
            settle(coord, cont(reply(())).start())
        }
        Flux::Delay(_) => unreachable!("the new sideshow is started"),
    }
}

/// Cancels the sideshow when the control completes and merges the results.
fn teardown<S, R>(mut coord: Coordinator<S>, outcome: Outcome<R>) -> Flux<R>
where
    S: 'static,
    R: 'static,
{
    let primary = match coord.pending.take() {
        Some(fault) if outcome.is_value() => Outcome::Error(fault),
        _ => outcome,
    };
    match std::mem::replace(&mut coord.sideshow, SideshowSlot::Idle) {
        SideshowSlot::Idle => Flux::Completed(primary),
        SideshowSlot::Live { flux, .. } => {
            debug!(sideshow = %coord.id, "control completed; cancelling sideshow");
            cancel_and_drain(flux, primary, CancelReason::parent_cancelled(), true)
        }
    }
}
