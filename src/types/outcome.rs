//! Three-valued outcome type and the opaque fault payload.
//!
//! The outcome type represents the terminal result of a routine:
//!
//! - `Value(T)`: success with a value
//! - `Error(Fault)`: application failure, carrying an opaque payload
//! - `Cancelled(CancelReason)`: the routine was unwound by cancellation
//!
//! Failures short-circuit: binding over an `Error` or `Cancelled` outcome
//! never invokes the continuation. Once a flux settles on an outcome, the
//! outcome never changes.

use super::cancel::CancelReason;
use core::fmt;
use std::error::Error;
use std::sync::Arc;

/// An opaque, cheaply-cloneable failure payload.
///
/// Faults wrap any [`std::error::Error`] behind an `Arc` so that outcomes
/// can be forwarded between combinator branches without copying the
/// underlying error.
#[derive(Clone)]
pub struct Fault {
    inner: Arc<dyn Error + Send + Sync>,
}

/// A plain-text fault source for faults raised from a message.
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

impl Fault {
    /// Wraps an error value as a fault.
    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Creates a fault from a plain message.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Returns a reference to the wrapped error.
    #[must_use]
    pub fn get_ref(&self) -> &(dyn Error + Send + Sync + 'static) {
        &*self.inner
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fault({:?})", self.inner)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

/// The three-valued outcome of a routine.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// Success with a value.
    Value(T),
    /// Application-level failure.
    Error(Fault),
    /// The routine was cancelled.
    Cancelled(CancelReason),
}

impl<T> Outcome<T> {
    /// Returns true if this outcome is `Value`.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this outcome is `Error`.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this outcome is `Error` or `Cancelled`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.is_value()
    }

    /// Returns the success value, discarding failures.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Error(_) | Self::Cancelled(_) => None,
        }
    }

    /// Maps the success value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Value(value) => Outcome::Value(f(value)),
            Self::Error(fault) => Outcome::Error(fault),
            Self::Cancelled(reason) => Outcome::Cancelled(reason),
        }
    }

    /// Chains another outcome-producing operation on the success value.
    ///
    /// Binding over an `Error` or `Cancelled` outcome short-circuits.
    pub fn and_then<U, F: FnOnce(T) -> Outcome<U>>(self, f: F) -> Outcome<U> {
        match self {
            Self::Value(value) => f(value),
            Self::Error(fault) => Outcome::Error(fault),
            Self::Cancelled(reason) => Outcome::Cancelled(reason),
        }
    }

    /// Re-tags a failure with a different value type.
    ///
    /// Returns `Err(value)` when the outcome is a success; combinators use
    /// this to forward a child failure as the composite result.
    pub fn forward_failure<U>(self) -> Result<Outcome<U>, T> {
        match self {
            Self::Value(value) => Err(value),
            Self::Error(fault) => Ok(Outcome::Error(fault)),
            Self::Cancelled(reason) => Ok(Outcome::Cancelled(reason)),
        }
    }

    /// Converts this outcome to a standard `Result`, with cancellation as an
    /// error.
    pub fn into_result(self) -> Result<T, OutcomeError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Error(fault) => Err(OutcomeError::Fault(fault)),
            Self::Cancelled(reason) => Err(OutcomeError::Cancelled(reason)),
        }
    }
}

impl<T> From<Result<T, Fault>> for Outcome<T> {
    fn from(result: Result<T, Fault>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(fault) => Self::Error(fault),
        }
    }
}

/// Error type produced when converting a failed [`Outcome`] into a `Result`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OutcomeError {
    /// The routine failed with a fault.
    #[error("{0}")]
    Fault(Fault),
    /// The routine was cancelled.
    #[error("cancelled: {0}")]
    Cancelled(CancelReason),
}
