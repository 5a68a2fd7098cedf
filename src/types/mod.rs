//! Core types for the interflux engine.
//!
//! This module contains the fundamental types used throughout the runtime:
//!
//! - [`id`]: the process-wide monotonic identifier
//! - [`outcome`]: three-valued completion result with its opaque fault payload
//! - [`cancel`]: cancellation reason and kind types
//! - [`event`]: erased host events, including the distinguished cancellation
//!   and timer events
//! - [`request`]: erased host-bound requests and the host reply type

pub mod cancel;
pub mod event;
pub mod id;
pub mod outcome;
pub mod request;

pub use cancel::{CancelKind, CancelReason};
pub use event::{Cancel, Event, Timeout};
pub use id::Id;
pub use outcome::{Fault, Outcome, OutcomeError};
pub use request::{reply, Request, Response};
