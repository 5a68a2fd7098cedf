//! Erased host events.
//!
//! The engine never inspects event contents; `wait`-style primitives apply
//! user-supplied downcasts and predicates. Two event types are distinguished
//! by the engine itself: [`Cancel`], which unwinds a waiting routine, and
//! [`Timeout`], delivered by the host timer service.

use super::cancel::CancelReason;
use super::id::Id;
use core::fmt;
use std::any::Any;

/// An opaque event supplied by the host.
///
/// Events cross the host's queue between threads, so payloads must be
/// `Send`. The concrete type name is captured at construction for
/// diagnostics only.
pub struct Event {
    payload: Box<dyn Any + Send>,
    type_name: &'static str,
}

impl Event {
    /// Wraps a payload as an event.
    #[must_use]
    pub fn new<E: Any + Send>(event: E) -> Self {
        Self {
            payload: Box::new(event),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Creates the distinguished cancellation event.
    #[must_use]
    pub fn cancel(reason: CancelReason) -> Self {
        Self::new(Cancel::new(reason))
    }

    /// Returns true if the payload is of type `E`.
    #[must_use]
    pub fn is<E: Any>(&self) -> bool {
        self.payload.is::<E>()
    }

    /// Downcasts the payload by reference.
    #[must_use]
    pub fn get<E: Any>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    /// Returns the cancellation payload, if this is a cancellation event.
    #[must_use]
    pub fn cancellation(&self) -> Option<&Cancel> {
        self.get::<Cancel>()
    }

    /// Returns the concrete type name of the payload.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({})", self.type_name)
    }
}

/// The distinguished cancellation event.
///
/// Delivering `Cancel` to a waiting routine unwinds it through its scoped
/// resources to `Cancelled`. Not catchable by error handlers; only
/// finalizers observe the unwind.
#[derive(Debug, Clone)]
pub struct Cancel {
    reason: CancelReason,
}

impl Cancel {
    /// Creates a cancellation payload with the given reason.
    #[must_use]
    pub const fn new(reason: CancelReason) -> Self {
        Self { reason }
    }

    /// Returns the cancellation reason.
    #[must_use]
    pub fn reason(&self) -> CancelReason {
        self.reason.clone()
    }
}

/// Timer completion event, correlated by the id minted at scheduling time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout(pub Id);
