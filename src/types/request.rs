//! Erased host-bound requests and the host reply type.
//!
//! A request is produced by a routine and dispatched to the host, which
//! resolves it into a [`Response`] before the routine can observe another
//! event. Request payloads never leave the run-loop thread, so they need not
//! be `Send`; the sideshow coordinator exploits this to route whole routines
//! through the request channel.

use super::outcome::Outcome;
use core::fmt;
use std::any::Any;

/// An opaque request dispatched by a routine to the host.
pub struct Request {
    payload: Box<dyn Any>,
    type_name: &'static str,
}

impl Request {
    /// Wraps a payload as a request.
    #[must_use]
    pub fn new<R: Any>(request: R) -> Self {
        Self {
            payload: Box::new(request),
            type_name: std::any::type_name::<R>(),
        }
    }

    /// Returns true if the payload is of type `R`.
    #[must_use]
    pub fn is<R: Any>(&self) -> bool {
        self.payload.is::<R>()
    }

    /// Downcasts the payload by reference.
    #[must_use]
    pub fn get<R: Any>(&self) -> Option<&R> {
        self.payload.downcast_ref::<R>()
    }

    /// Downcasts the payload by value, returning the request unchanged on a
    /// type mismatch.
    ///
    /// Interceptors that consume the payload (the sideshow coordinator takes
    /// ownership of the routine carried by a replace request) go through
    /// this.
    pub fn downcast<R: Any>(self) -> Result<R, Self> {
        let type_name = self.type_name;
        match self.payload.downcast::<R>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Self { payload, type_name }),
        }
    }

    /// Returns the concrete type name of the payload.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Request({})", self.type_name)
    }
}

/// The host's reply to a request: an erased value, a fault, or cancellation.
pub type Response = Outcome<Box<dyn Any>>;

/// Wraps a value as a successful [`Response`].
#[must_use]
pub fn reply<T: Any>(value: T) -> Response {
    Outcome::Value(Box::new(value))
}
