//! Interflux: a deterministic, cancel-correct runtime for interactive
//! value routines.
//!
//! # Overview
//!
//! Interflux is a single-threaded cooperative concurrency engine for
//! long-running processes that respond to discrete external events. A
//! routine ([`Ivr`]) suspends while waiting for events or host replies,
//! composes sequentially and in parallel, and can be cancelled at any
//! point with guaranteed teardown of its scoped resources.
//!
//! # Core Guarantees
//!
//! - **Deterministic dispatch**: identical event sequences produce
//!   identical results; composition order fixes event delivery order
//! - **Cancel-correctness**: cancellation unwinds through finalizers,
//!   never a silent drop; losing branches of parallel compositions are
//!   always cancelled and drained
//! - **Scoped release**: a resource acquired with [`using`] is released
//!   exactly once, on every exit path
//! - **Synchronous advancement**: between two suspension points a routine
//!   runs synchronously and uninterrupted; pending requests are resolved
//!   before the next event is delivered
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, outcomes, cancellation reasons, events,
//!   requests
//! - [`flux`]: the four-state suspended-routine machine and its step
//!   function
//! - [`ivr`]: sequential composition, event primitives, scoped resources
//! - [`combinator`]: parallel-all, parallel-race, timeout
//! - [`runtime`]: the host run loop, event queue, timer service
//! - [`sideshow`]: a nested, replaceable sub-routine driven through
//!   in-band requests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod combinator;
pub mod flux;
pub mod ivr;
pub mod runtime;
pub mod sideshow;
pub mod types;

pub use combinator::{par, par_all, race, race_all, timeout, RaceResult};
pub use flux::Flux;
pub use ivr::{
    for_each, repeat_while, request, send, using, wait, wait_for, wait_if, Ivr, Scoped,
};
pub use runtime::{EventQueue, Host, HostHandle, QueueClosed, Timers};
pub use sideshow::{attach_to, Control};
pub use types::{
    reply, Cancel, CancelKind, CancelReason, Event, Fault, Id, Outcome, OutcomeError, Request,
    Response, Timeout,
};
