//! Event and request primitives.
//!
//! These are the leaves of every routine: suspend until an event matches
//! ([`wait`], [`wait_for`], [`wait_if`]), or exchange a request with the
//! host ([`send`], [`request`]).
//!
//! All waiting primitives respond to the distinguished [`Cancel`] event by
//! unwinding to `Cancelled`; unmatched events are filtered out silently.

use super::Ivr;
use crate::flux::Flux;
use crate::types::{Event, Fault, Outcome, Request};
use std::any::Any;

/// Suspends until `f` matches an event, yielding the mapped value.
///
/// Events for which `f` returns `None` are skipped. The cancellation event
/// unwinds the wait to `Cancelled` without consulting `f`.
#[must_use]
pub fn wait<R: 'static>(f: impl FnMut(&Event) -> Option<R> + 'static) -> Ivr<R> {
    Ivr::from_flux(wait_flux(Box::new(f)))
}

fn wait_flux<R: 'static>(mut f: Box<dyn FnMut(&Event) -> Option<R>>) -> Flux<R> {
    Flux::Waiting(Box::new(move |event| {
        if let Some(cancel) = event.cancellation() {
            return Flux::Completed(Outcome::Cancelled(cancel.reason()));
        }
        match f(event) {
            Some(value) => Flux::value(value),
            None => wait_flux(f),
        }
    }))
}

/// Suspends until an event of type `E` matches `f`.
///
/// Events of other types are skipped.
#[must_use]
pub fn wait_for<E: Any, R: 'static>(mut f: impl FnMut(&E) -> Option<R> + 'static) -> Ivr<R> {
    wait(move |event| event.get::<E>().and_then(&mut f))
}

/// Suspends until the first event of type `E` satisfying `pred`.
#[must_use]
pub fn wait_if<E: Any>(mut pred: impl FnMut(&E) -> bool + 'static) -> Ivr<()> {
    wait_for(move |event: &E| pred(event).then_some(()))
}

/// Sends a fire-and-forget command to the host.
///
/// The command flows through the host's request channel, so its ordering
/// relative to other requests is preserved; the host's reply is ignored.
#[must_use]
pub fn send<C: Any>(command: C) -> Ivr<()> {
    Ivr::from_flux(Flux::Requesting(
        Request::new(command),
        Box::new(|_| Flux::value(())),
    ))
}

/// Sends a command to the host and awaits its typed reply.
///
/// A `Value` reply is downcast to `R` (a mismatch is a fault); `Error` and
/// `Cancelled` replies propagate unchanged.
#[must_use]
pub fn request<R: Any, C: Any>(command: C) -> Ivr<R> {
    Ivr::from_flux(Flux::Requesting(
        Request::new(command),
        Box::new(|response| {
            Flux::Completed(match response {
                Outcome::Value(payload) => match payload.downcast::<R>() {
                    Ok(value) => Outcome::Value(*value),
                    Err(_) => Outcome::Error(Fault::msg(format!(
                        "request reply type mismatch: expected {}",
                        std::any::type_name::<R>()
                    ))),
                },
                Outcome::Error(fault) => Outcome::Error(fault),
                Outcome::Cancelled(reason) => Outcome::Cancelled(reason),
            })
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::reply;

    #[derive(Debug, PartialEq)]
    struct Digit(u8);

    struct Connected;

    #[test]
    fn wait_for_skips_other_event_types() {
        let flux = wait_for(|digit: &Digit| Some(digit.0)).start();
        let flux = flux.step(&Event::new(Connected));
        assert!(flux.is_waiting());
        let flux = flux.step(&Event::new(Digit(4)));
        assert!(matches!(flux.into_outcome(), Outcome::Value(4)));
    }

    #[test]
    fn wait_if_filters_on_the_predicate() {
        let flux = wait_if(|digit: &Digit| digit.0 == 9).start();
        let flux = flux.step(&Event::new(Digit(1)));
        assert!(flux.is_waiting());
        let flux = flux.step(&Event::new(Digit(9)));
        assert!(flux.is_completed());
    }

    #[test]
    fn wait_unwinds_on_cancellation() {
        let flux = wait_for(|digit: &Digit| Some(digit.0)).start().try_cancel();
        assert!(matches!(flux.into_outcome(), Outcome::Cancelled(_)));
    }

    #[test]
    fn send_ignores_the_reply() {
        struct Hangup;
        let flux = send(Hangup)
            .start()
            .dispatch_requests(&mut |_| Outcome::Error(Fault::msg("ignored")));
        assert!(matches!(flux.into_outcome(), Outcome::Value(())));
    }

    #[test]
    fn request_downcasts_the_reply() {
        struct AskExtension;
        let flux = request::<u32, _>(AskExtension)
            .start()
            .dispatch_requests(&mut |_| reply(700_u32));
        assert!(matches!(flux.into_outcome(), Outcome::Value(700)));
    }

    #[test]
    fn request_faults_on_a_mistyped_reply() {
        struct AskExtension;
        let flux = request::<u32, _>(AskExtension)
            .start()
            .dispatch_requests(&mut |_| reply("not a number"));
        match flux.into_outcome() {
            Outcome::Error(fault) => {
                assert!(format!("{fault}").contains("type mismatch"));
            }
            _ => panic!("expected a fault"),
        }
    }

    #[test]
    fn request_propagates_host_faults() {
        struct AskExtension;
        let flux = request::<u32, _>(AskExtension)
            .start()
            .dispatch_requests(&mut |_| Outcome::Error(Fault::msg("switch offline")));
        assert!(matches!(flux.into_outcome(), Outcome::Error(_)));
    }
}
