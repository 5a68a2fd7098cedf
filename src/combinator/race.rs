//! Parallel-race: run routines in parallel, first settled wins.
//!
//! # Semantics
//!
//! `race(a, b)`:
//! 1. Start both children, left first. A child that is already settled wins
//!    immediately; the loser is cancelled without ever observing an event.
//! 2. Each event is delivered to `a` first. If `a` settles, `b` does not
//!    observe that event: it is cancelled and drained on the spot.
//!    Otherwise the event is delivered to `b`.
//! 3. The winner's outcome is returned as-is, including `Error` and
//!    `Cancelled`. The loser is always cancelled and drained through its
//!    finalizers; its outcome is discarded.
//!
//! Ties are impossible within a tick: the first child to settle wins and
//! later children never see the event.
//!
//! `race_all` races a list with the same left-to-right discipline.

use super::{cancel_and_drain, cancel_and_drain_all, step_ready};
use crate::flux::Flux;
use crate::ivr::Ivr;
use crate::types::CancelReason;

/// The result of a two-way race, indicating which branch won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceResult<A, B> {
    /// The first branch won.
    First(A),
    /// The second branch won.
    Second(B),
}

impl<A, B> RaceResult<A, B> {
    /// Returns true if the first branch won.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        matches!(self, Self::First(_))
    }

    /// Returns true if the second branch won.
    #[must_use]
    pub const fn is_second(&self) -> bool {
        matches!(self, Self::Second(_))
    }
}

/// Races two routines; the first to settle wins, the loser is cancelled.
#[must_use]
pub fn race<A: 'static, B: 'static>(a: Ivr<A>, b: Ivr<B>) -> Ivr<RaceResult<A, B>> {
    Ivr::from_flux(Flux::Delay(Box::new(move || {
        settle(a.flux.start(), b.flux.start())
    })))
}

fn settle<A: 'static, B: 'static>(a: Flux<A>, b: Flux<B>) -> Flux<RaceResult<A, B>> {
    let a = match a {
        Flux::Completed(outcome) => {
            let primary = outcome.map(RaceResult::First);
            return cancel_and_drain(b, primary, CancelReason::race_lost(), false);
        }
        active => active,
    };
    let b = match b {
        Flux::Completed(outcome) => {
            let primary = outcome.map(RaceResult::Second);
            return cancel_and_drain(a, primary, CancelReason::race_lost(), false);
        }
        active => active,
    };
    let a = match a {
        Flux::Requesting(request, cont) => {
            return Flux::Requesting(
                request,
                Box::new(move |response| settle(cont(response).start(), b)),
            )
        }
        active => active,
    };
    let b = match b {
        Flux::Requesting(request, cont) => {
            return Flux::Requesting(
                request,
                Box::new(move |response| settle(a, cont(response).start())),
            )
        }
        active => active,
    };
    Flux::Waiting(Box::new(move |event| {
        let a = step_ready(a, event);
        if a.is_completed() {
            // A winner at this tick: the event is never delivered to the
            // loser.
            return settle(a, b);
        }
        let b = step_ready(b, event);
        settle(a, b)
    }))
}

/// Races a list of routines; ties are broken by list order.
///
/// The winner's outcome is returned as-is; every loser is cancelled and
/// drained. Racing an empty list never completes.
#[must_use]
pub fn race_all<T: 'static>(routines: Vec<Ivr<T>>) -> Ivr<T> {
    Ivr::from_flux(Flux::Delay(Box::new(move || {
        settle_all(
            routines
                .into_iter()
                .map(|routine| routine.flux.start())
                .collect(),
        )
    })))
}

fn settle_all<T: 'static>(mut children: Vec<Flux<T>>) -> Flux<T> {
    if let Some(index) = children.iter().position(Flux::is_completed) {
        let winner = children.remove(index);
        return cancel_and_drain_all(
            children,
            winner.into_outcome(),
            CancelReason::race_lost(),
            false,
        );
    }
    if let Some(index) = children.iter().position(Flux::is_requesting) {
        let Flux::Requesting(request, cont) = children.remove(index) else {
            unreachable!()
        };
        return Flux::Requesting(
            request,
            Box::new(move |response| {
                let mut children = children;
                children.insert(index, cont(response).start());
                settle_all(children)
            }),
        );
    }
    Flux::Waiting(Box::new(move |event| {
        let mut stepped = Vec::with_capacity(children.len());
        let mut pending = children.into_iter();
        while let Some(child) = pending.next() {
            let child = step_ready(child, event);
            if child.is_completed() {
                // Break out at the first winner; the rest never see the
                // event.
                let mut losers = stepped;
                losers.extend(pending);
                return cancel_and_drain_all(
                    losers,
                    child.into_outcome(),
                    CancelReason::race_lost(),
                    false,
                );
            }
            stepped.push(child);
        }
        settle_all(stepped)
    }))
}
