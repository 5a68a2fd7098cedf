//! Scoped resources.
//!
//! A resource acquired with [`using`] is released exactly once when the
//! owning routine settles, on any exit path: normal completion, fault, or
//! cancellation. The body and the finalizer share the resource through an
//! `Rc`, so release does not require cloning the resource itself.

use super::Ivr;
use std::rc::Rc;

/// A resource whose release is guaranteed on every exit path of its owning
/// routine.
///
/// `release` takes `&self`: resources needing mutation on release use
/// interior mutability.
pub trait Scoped {
    /// Releases the resource. Called exactly once.
    fn release(&self);
}

/// Acquires `resource` for the duration of `body`.
///
/// Acquisition happens at start time (not at composition time); release
/// runs when the body settles, including on cancellation.
#[must_use]
pub fn using<R, T>(resource: R, body: impl FnOnce(Rc<R>) -> Ivr<T> + 'static) -> Ivr<T>
where
    R: Scoped + 'static,
    T: 'static,
{
    Ivr::delay(move || {
        let resource = Rc::new(resource);
        let guard = Rc::clone(&resource);
        body(resource).finally(move || guard.release())
    })
}
