//! Timeout combinator.
//!
//! A timeout is a race between the routine and a timer: whichever settles
//! first wins and the other is cancelled through its finalizers. A routine
//! losing to the deadline releases its scoped resources; a routine winning
//! cancels the pending timer so it never fires.

use super::race::{race, RaceResult};
use crate::ivr::Ivr;
use crate::runtime::Timers;
use std::sync::Arc;
use std::time::Duration;

/// Bounds `routine` by a deadline.
///
/// Completes with `Some(value)` if the routine settles first, `None` if
/// the deadline fires first. A routine fault or cancellation that wins the
/// race propagates as-is.
#[must_use]
pub fn timeout<T: 'static>(
    timers: &Arc<Timers>,
    duration: Duration,
    routine: Ivr<T>,
) -> Ivr<Option<T>> {
    race(timers.sleep(duration), routine).map(|result| match result {
        RaceResult::First(()) => None,
        RaceResult::Second(value) => Some(value),
    })
}
