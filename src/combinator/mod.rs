//! Combinators for composing routines in parallel.
//!
//! - [`par`] / [`par_all`]: run routines in parallel, waiting for all
//! - [`race`] / [`race_all`]: run routines in parallel, first settled wins
//! - [`timeout`]: bound a routine by a deadline
//!
//! All combinators share the same discipline: children advance left to
//! right, pending child requests are hoisted to the composite (left first)
//! before the composite suspends, and a resolved composite never abandons a
//! child. Losers are cancelled and drained through their finalizers, not
//! dropped.

mod all;
mod race;
mod timeout;

pub use all::{par, par_all};
pub use race::{race, race_all, RaceResult};
pub use timeout::timeout;

use crate::flux::Flux;
use crate::types::{CancelReason, Event, Outcome};

/// Advances a waiting child with the event; settled children pass through.
pub(crate) fn step_ready<T: 'static>(flux: Flux<T>, event: &Event) -> Flux<T> {
    match flux {
        Flux::Waiting(cont) => cont(event).start(),
        settled => settled,
    }
}

/// Cancels a losing child and drains it to completion, then settles on
/// `primary`.
///
/// Requests emitted during the loser's unwind are hoisted to the composite.
/// With `merge_loser_fault`, a fault from the loser's unwind replaces a
/// `Value` primary; it never overrides a primary failure.
pub(crate) fn cancel_and_drain<X: 'static, T: 'static>(
    loser: Flux<X>,
    primary: Outcome<T>,
    reason: CancelReason,
    merge_loser_fault: bool,
) -> Flux<T> {
    drain_loser(loser.try_cancel_with(reason), primary, merge_loser_fault)
}

fn drain_loser<X: 'static, T: 'static>(
    loser: Flux<X>,
    primary: Outcome<T>,
    merge_loser_fault: bool,
) -> Flux<T> {
    match loser {
        Flux::Completed(outcome) => {
            Flux::Completed(merge_outcomes(primary, outcome, merge_loser_fault))
        }
        Flux::Requesting(request, cont) => Flux::Requesting(
            request,
            Box::new(move |response| {
                drain_loser(cont(response).start(), primary, merge_loser_fault)
            }),
        ),
        // Cancellation was delivered and ignored; settle the composite
        // without it.
        Flux::Waiting(_) | Flux::Delay(_) => Flux::Completed(primary),
    }
}

/// Cancels and drains a list of losers left to right.
pub(crate) fn cancel_and_drain_all<X: 'static, T: 'static>(
    mut losers: Vec<Flux<X>>,
    primary: Outcome<T>,
    reason: CancelReason,
    merge_loser_fault: bool,
) -> Flux<T> {
    if losers.is_empty() {
        return Flux::Completed(primary);
    }
    let first = losers.remove(0);
    drain_next(
        first.try_cancel_with(reason.clone()),
        losers,
        primary,
        reason,
        merge_loser_fault,
    )
}

fn drain_next<X: 'static, T: 'static>(
    current: Flux<X>,
    rest: Vec<Flux<X>>,
    primary: Outcome<T>,
    reason: CancelReason,
    merge_loser_fault: bool,
) -> Flux<T> {
    match current {
        Flux::Completed(outcome) => cancel_and_drain_all(
            rest,
            merge_outcomes(primary, outcome, merge_loser_fault),
            reason,
            merge_loser_fault,
        ),
        Flux::Requesting(request, cont) => Flux::Requesting(
            request,
            Box::new(move |response| {
                drain_next(
                    cont(response).start(),
                    rest,
                    primary,
                    reason,
                    merge_loser_fault,
                )
            }),
        ),
        Flux::Waiting(_) | Flux::Delay(_) => {
            cancel_and_drain_all(rest, primary, reason, merge_loser_fault)
        }
    }
}

fn merge_outcomes<X, T>(primary: Outcome<T>, loser: Outcome<X>, merge_loser_fault: bool) -> Outcome<T> {
    if merge_loser_fault && primary.is_value() {
        if let Outcome::Error(fault) = loser {
            return Outcome::Error(fault);
        }
    }
    primary
}
