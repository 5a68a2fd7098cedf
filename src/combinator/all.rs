//! Parallel-all: run routines in parallel, waiting for all.
//!
//! # Semantics
//!
//! `par(a, b)`:
//! 1. Start both children, left first.
//! 2. A child failure (`Error` or `Cancelled`) resolves the composite: the
//!    sibling is cancelled and drained through its finalizers, then the
//!    composite settles on the first-observed failure. A fault raised by
//!    the loser while unwinding replaces a `Value` primary only.
//! 3. Otherwise each event advances both children, left first; the
//!    composite completes when both children hold values.
//! 4. Pending child requests are hoisted to the composite, left first,
//!    before the composite suspends.
//!
//! `par_all` generalizes to a list, preserving left-to-right order for
//! event delivery, request hoisting, and loser cancellation.

use super::{cancel_and_drain, cancel_and_drain_all, step_ready};
use crate::flux::Flux;
use crate::ivr::Ivr;
use crate::types::{CancelReason, Outcome};

/// Runs two routines in parallel; completes when both have values.
#[must_use]
pub fn par<A: 'static, B: 'static>(a: Ivr<A>, b: Ivr<B>) -> Ivr<(A, B)> {
    Ivr::from_flux(Flux::Delay(Box::new(move || {
        settle(a.flux.start(), b.flux.start())
    })))
}

fn settle<A: 'static, B: 'static>(a: Flux<A>, b: Flux<B>) -> Flux<(A, B)> {
    let a = match a {
        Flux::Completed(outcome) => match outcome.forward_failure::<(A, B)>() {
            Ok(failure) => {
                return cancel_and_drain(b, failure, CancelReason::sibling_failed(), true)
            }
            Err(value) => Flux::Completed(Outcome::Value(value)),
        },
        active => active,
    };
    let b = match b {
        Flux::Completed(outcome) => match outcome.forward_failure::<(A, B)>() {
            Ok(failure) => {
                return cancel_and_drain(a, failure, CancelReason::sibling_failed(), true)
            }
            Err(value) => Flux::Completed(Outcome::Value(value)),
        },
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
    match (a, b) {
        (Flux::Completed(Outcome::Value(left)), Flux::Completed(Outcome::Value(right))) => {
            Flux::value((left, right))
        }
        (a, b) => Flux::Waiting(Box::new(move |event| {
            let a = step_ready(a, event);
            let b = step_ready(b, event);
            settle(a, b)
        })),
    }
}

/// Runs a list of routines in parallel; completes with all values in
/// order.
///
/// An empty list completes immediately.
#[must_use]
pub fn par_all<T: 'static>(routines: Vec<Ivr<T>>) -> Ivr<Vec<T>> {
    Ivr::from_flux(Flux::Delay(Box::new(move || {
        settle_all(
            routines
                .into_iter()
                .map(|routine| routine.flux.start())
                .collect(),
        )
    })))
}

fn settle_all<T: 'static>(mut children: Vec<Flux<T>>) -> Flux<Vec<T>> {
    if let Some(index) = children
        .iter()
        .position(|child| matches!(child, Flux::Completed(outcome) if outcome.is_failure()))
    {
        let Flux::Completed(outcome) = children.remove(index) else {
            unreachable!()
        };
        let Ok(primary) = outcome.forward_failure::<Vec<T>>() else {
            unreachable!()
        };
        return cancel_and_drain_all(children, primary, CancelReason::sibling_failed(), true);
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
    if children.iter().all(Flux::is_completed) {
        let values = children
            .into_iter()
            .map(|child| match child.into_outcome() {
                Outcome::Value(value) => value,
                _ => unreachable!("failures settle above"),
            })
            .collect();
        return Flux::value(values);
    }
    Flux::Waiting(Box::new(move |event| {
        settle_all(
            children
                .into_iter()
                .map(|child| step_ready(child, event))
                .collect(),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ivr::{send, using, wait, wait_for, wait_if, Scoped};
    use crate::types::{Event, Fault, Request, Response};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct Event1;
    struct Event2;

    struct Tracked {
        releases: Rc<Cell<u32>>,
    }

    impl Scoped for Tracked {
        fn release(&self) {
            self.releases.set(self.releases.get() + 1);
        }
    }

    #[test]
    fn completes_when_both_children_hold_values() {
        let a = wait_if::<Event1>(|_| true).map(|()| 1_u32);
        let b = wait_if::<Event2>(|_| true).map(|()| 2_u32);
        let flux = par(a, b).start();
        let flux = flux.step(&Event::new(Event1));
        assert!(flux.is_waiting(), "right child still pending");
        let flux = flux.step(&Event::new(Event2));
        assert!(matches!(flux.into_outcome(), Outcome::Value((1, 2))));
    }

    #[test]
    fn left_child_observes_the_event_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let left_log = Rc::clone(&order);
        let right_log = Rc::clone(&order);
        let a = wait(move |_| {
            left_log.borrow_mut().push("left");
            Some(())
        });
        let b = wait(move |_| {
            right_log.borrow_mut().push("right");
            Some(())
        });
        let flux = par(a, b).start().step(&Event::new(Event1));
        assert!(flux.is_completed());
        assert_eq!(*order.borrow(), vec!["left", "right"]);
    }

    #[test]
    fn child_failure_cancels_the_sibling_and_releases_its_resources() {
        let releases = Rc::new(Cell::new(0));
        let tracked = Tracked {
            releases: Rc::clone(&releases),
        };
        let a = wait_if::<Event1>(|_| true)
            .and_then(|()| Ivr::<u32>::raise(Fault::msg("E")));
        let b = using(tracked, |_| wait_if::<Event2>(|_| true).map(|()| 2_u32));
        let flux = par(a, b).start().step(&Event::new(Event1));
        match flux.into_outcome() {
            Outcome::Error(fault) => assert_eq!(format!("{fault}"), "E"),
            _ => panic!("composite must fail with the child fault"),
        }
        assert_eq!(releases.get(), 1, "sibling resource must be released");
    }

    #[test]
    fn failure_at_start_resolves_without_events() {
        let releases = Rc::new(Cell::new(0));
        let tracked = Tracked {
            releases: Rc::clone(&releases),
        };
        let a = Ivr::<u32>::raise(Fault::msg("immediate"));
        let b = using(tracked, |_| wait_if::<Event2>(|_| true).map(|()| 2_u32));
        let flux = par(a, b).start();
        assert!(matches!(flux.into_outcome(), Outcome::Error(_)));
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn cancelling_the_composite_unwinds_both_children() {
        let releases = Rc::new(Cell::new(0));
        let left = Tracked {
            releases: Rc::clone(&releases),
        };
        let right = Tracked {
            releases: Rc::clone(&releases),
        };
        let a = using(left, |_| wait_if::<Event1>(|_| true).map(|()| 1_u32));
        let b = using(right, |_| wait_if::<Event2>(|_| true).map(|()| 2_u32));
        let flux = par(a, b).start().try_cancel();
        assert!(matches!(flux.into_outcome(), Outcome::Cancelled(_)));
        assert_eq!(releases.get(), 2);
    }

    #[test]
    fn child_requests_are_hoisted_left_first() {
        struct Cmd(&'static str);
        let a = send(Cmd("left")).and_then(|()| wait_if::<Event1>(|_| true)).map(|()| 1_u32);
        let b = send(Cmd("right")).and_then(|()| wait_if::<Event2>(|_| true)).map(|()| 2_u32);
        let seen = RefCell::new(Vec::new());
        let mut handler = |request: Request| -> Response {
            seen.borrow_mut().push(request.downcast::<Cmd>().unwrap().0);
            crate::types::reply(())
        };
        let flux = par(a, b).start().dispatch_requests(&mut handler);
        assert!(flux.is_waiting());
        assert_eq!(*seen.borrow(), vec!["left", "right"]);
    }

    #[test]
    fn loser_fault_during_unwind_does_not_override_the_primary_failure() {
        // The sibling faults while unwinding through try_finally.
        let a = wait_if::<Event1>(|_| true)
            .and_then(|()| Ivr::<u32>::raise(Fault::msg("primary")));
        let b = wait_if::<Event2>(|_| true)
            .map(|()| 2_u32)
            .try_finally(|| Err(Fault::msg("unwind fault")));
        let flux = par(a, b).start().step(&Event::new(Event1));
        match flux.into_outcome() {
            Outcome::Error(fault) => assert_eq!(format!("{fault}"), "primary"),
            _ => panic!("the primary failure must win"),
        }
    }

    #[test]
    fn par_all_collects_values_in_list_order() {
        struct Digit(u8);
        let routines: Vec<Ivr<u8>> = (0..3)
            .map(|slot| wait_for(move |digit: &Digit| (digit.0 == slot).then_some(slot)))
            .collect();
        let mut flux = par_all(routines).start();
        for digit in [2, 0, 1] {
            assert!(flux.is_waiting());
            flux = flux.step(&Event::new(Digit(digit)));
        }
        match flux.into_outcome() {
            Outcome::Value(values) => assert_eq!(values, vec![0, 1, 2]),
            _ => panic!("all children completed"),
        }
    }

    #[test]
    fn par_all_failure_cancels_all_remaining_children() {
        let releases = Rc::new(Cell::new(0));
        let mut routines = Vec::new();
        for _ in 0..2 {
            let tracked = Tracked {
                releases: Rc::clone(&releases),
            };
            routines.push(using(tracked, |_| wait_if::<Event2>(|_| true)));
        }
        routines.push(
            wait_if::<Event1>(|_| true).and_then(|()| Ivr::raise(Fault::msg("E"))),
        );
        let flux = par_all(routines).start().step(&Event::new(Event1));
        assert!(matches!(flux.into_outcome(), Outcome::Error(_)));
        assert_eq!(releases.get(), 2);
    }

    #[test]
    fn par_all_of_nothing_completes_immediately() {
        let flux = par_all(Vec::<Ivr<u32>>::new()).start();
        match flux.into_outcome() {
            Outcome::Value(values) => assert!(values.is_empty()),
            _ => panic!("empty composition completes"),
        }
    }
}
