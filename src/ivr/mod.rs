//! Sequential composition of interactive value routines.
//!
//! An [`Ivr<T>`] is the user-facing wrapper over an unstarted [`Flux<T>`].
//! Builder operations compose routines sequentially:
//!
//! - [`and_then`](Ivr::and_then): bind; failures short-circuit without
//!   invoking the continuation
//! - [`delay`](Ivr::delay): defer a routine's prologue to start time
//! - [`finally`](Ivr::finally) / [`try_finally`](Ivr::try_finally): run a
//!   finalizer on every exit path, including cancellation
//! - [`catch`](Ivr::catch): recover from faults; cancellation is not
//!   catchable
//! - [`repeat_while`] / [`for_each`]: loops, stack-safe over arbitrarily
//!   many synchronous iterations
//!
//! # Stack safety
//!
//! Bind advances its source in a loop and returns un-forced continuations;
//! [`Flux::start`] is the trampoline that forces them. A loop of a million
//! synchronous iterations runs in constant stack.

mod primitives;
mod scoped;

pub use primitives::{request, send, wait, wait_for, wait_if};
pub use scoped::{using, Scoped};

use crate::flux::Flux;
use crate::types::{Fault, Outcome};
use std::rc::Rc;

/// An interactive value routine: a composable, unstarted suspended
/// computation producing a `T`.
pub struct Ivr<T> {
    pub(crate) flux: Flux<T>,
}

impl<T: 'static> Ivr<T> {
    /// A routine that completes immediately with a value.
    ///
    /// `Ivr::unit(())` is the empty routine.
    #[must_use]
    pub fn unit(value: T) -> Self {
        Self {
            flux: Flux::value(value),
        }
    }

    /// A routine that completes immediately with the given outcome.
    #[must_use]
    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        Self {
            flux: Flux::Completed(outcome),
        }
    }

    /// A routine that fails immediately with a fault.
    #[must_use]
    pub fn raise(fault: Fault) -> Self {
        Self::from_outcome(Outcome::Error(fault))
    }

    /// Lifts a `Result` into a routine.
    #[must_use]
    pub fn from_result(result: Result<T, Fault>) -> Self {
        Self::from_outcome(result.into())
    }

    /// Defers construction of a routine until it is started.
    ///
    /// Side effects in the thunk run at start time, not at composition
    /// time.
    #[must_use]
    pub fn delay(f: impl FnOnce() -> Self + 'static) -> Self {
        Self {
            flux: Flux::Delay(Box::new(move || f().flux)),
        }
    }

    /// Wraps an already-built flux.
    pub(crate) fn from_flux(flux: Flux<T>) -> Self {
        Self { flux }
    }

    /// Starts the routine, driving through all deferred prologues.
    #[must_use]
    pub fn start(self) -> Flux<T> {
        self.flux.start()
    }

    /// Sequential bind: continue with `k` applied to this routine's value.
    ///
    /// If this routine settles on `Error` or `Cancelled`, the same outcome
    /// is yielded and `k` is never invoked.
    #[must_use]
    pub fn and_then<U: 'static>(self, k: impl FnOnce(T) -> Ivr<U> + 'static) -> Ivr<U> {
        Ivr::from_flux(Flux::Delay(Box::new(move || {
            advance_bind(self.flux, Box::new(move |value| k(value).flux))
        })))
    }

    /// Maps the routine's value.
    #[must_use]
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Ivr<U> {
        self.and_then(move |value| Ivr::unit(f(value)))
    }

    /// Sequences another routine after this one, discarding this value.
    #[must_use]
    pub fn then<U: 'static>(self, next: Ivr<U>) -> Ivr<U> {
        self.and_then(move |_| next)
    }

    /// Runs a finalizer when this routine settles, on any exit path:
    /// normal completion, fault, or cancellation.
    #[must_use]
    pub fn finally(self, fin: impl FnOnce() + 'static) -> Self {
        self.try_finally(move || {
            fin();
            Ok(())
        })
    }

    /// Runs a fallible finalizer when this routine settles.
    ///
    /// The finalizer runs exactly once, on any exit path. A finalizer fault
    /// replaces a `Value` outcome; it never overrides an existing `Error`
    /// or `Cancelled`.
    #[must_use]
    pub fn try_finally(self, fin: impl FnOnce() -> Result<(), Fault> + 'static) -> Self {
        Self::from_flux(Flux::Delay(Box::new(move || {
            advance_finally(self.flux, Box::new(fin))
        })))
    }

    /// Recovers from a fault by continuing with `handler`.
    ///
    /// Only `Error` outcomes are caught; `Cancelled` passes through
    /// unhandled.
    #[must_use]
    pub fn catch(self, handler: impl FnOnce(Fault) -> Self + 'static) -> Self {
        Self::from_flux(Flux::Delay(Box::new(move || {
            advance_catch(self.flux, Box::new(move |fault| handler(fault).flux))
        })))
    }
}

fn advance_bind<T: 'static, U: 'static>(
    mut src: Flux<T>,
    k: Box<dyn FnOnce(T) -> Flux<U>>,
) -> Flux<U> {
    loop {
        match src {
            Flux::Delay(thunk) => src = thunk(),
            Flux::Completed(Outcome::Value(value)) => return k(value),
            Flux::Completed(Outcome::Error(fault)) => {
                return Flux::Completed(Outcome::Error(fault))
            }
            Flux::Completed(Outcome::Cancelled(reason)) => {
                return Flux::Completed(Outcome::Cancelled(reason))
            }
            Flux::Waiting(cont) => {
                return Flux::Waiting(Box::new(move |event| {
                    advance_bind(cont(event), k).start()
                }))
            }
            Flux::Requesting(request, cont) => {
                return Flux::Requesting(
                    request,
                    Box::new(move |response| advance_bind(cont(response), k).start()),
                )
            }
        }
    }
}

fn advance_finally<T: 'static>(
    mut src: Flux<T>,
    fin: Box<dyn FnOnce() -> Result<(), Fault>>,
) -> Flux<T> {
    loop {
        match src {
            Flux::Delay(thunk) => src = thunk(),
            Flux::Completed(outcome) => {
                let outcome = match (fin(), outcome) {
                    (Err(fault), Outcome::Value(_)) => Outcome::Error(fault),
                    (_, settled) => settled,
                };
                return Flux::Completed(outcome);
            }
            Flux::Waiting(cont) => {
                return Flux::Waiting(Box::new(move |event| {
                    advance_finally(cont(event), fin).start()
                }))
            }
            Flux::Requesting(request, cont) => {
                return Flux::Requesting(
                    request,
                    Box::new(move |response| advance_finally(cont(response), fin).start()),
                )
            }
        }
    }
}

fn advance_catch<T: 'static>(
    mut src: Flux<T>,
    handler: Box<dyn FnOnce(Fault) -> Flux<T>>,
) -> Flux<T> {
    loop {
        match src {
            Flux::Delay(thunk) => src = thunk(),
            Flux::Completed(Outcome::Error(fault)) => return handler(fault),
            Flux::Completed(settled) => return Flux::Completed(settled),
            Flux::Waiting(cont) => {
                return Flux::Waiting(Box::new(move |event| {
                    advance_catch(cont(event), handler).start()
                }))
            }
            Flux::Requesting(request, cont) => {
                return Flux::Requesting(
                    request,
                    Box::new(move |response| advance_catch(cont(response), handler).start()),
                )
            }
        }
    }
}

/// Repeats `body` while `cond` holds.
///
/// Desugars to recursive bind through the start trampoline; safe for
/// arbitrarily many synchronous iterations.
#[must_use]
pub fn repeat_while(
    cond: impl Fn() -> bool + 'static,
    body: impl Fn() -> Ivr<()> + 'static,
) -> Ivr<()> {
    fn go(cond: Rc<dyn Fn() -> bool>, body: Rc<dyn Fn() -> Ivr<()>>) -> Ivr<()> {
        Ivr::delay(move || {
            if cond() {
                let next_cond = Rc::clone(&cond);
                let next_body = Rc::clone(&body);
                body().and_then(move |()| go(next_cond, next_body))
            } else {
                Ivr::unit(())
            }
        })
    }
    go(Rc::new(cond), Rc::new(body))
}

/// Runs `f` over each item in sequence.
#[must_use]
pub fn for_each<I, T>(items: I, f: impl Fn(T) -> Ivr<()> + 'static) -> Ivr<()>
where
    I: IntoIterator<Item = T> + 'static,
    I::IntoIter: 'static,
    T: 'static,
{
    fn go<T: 'static>(mut items: Box<dyn Iterator<Item = T>>, f: Rc<dyn Fn(T) -> Ivr<()>>) -> Ivr<()> {
        Ivr::delay(move || match items.next() {
            Some(item) => {
                let next_f = Rc::clone(&f);
                f(item).and_then(move |()| go(items, next_f))
            }
            None => Ivr::unit(()),
        })
    }
    go(Box::new(items.into_iter()), Rc::new(f))
}
