//! Cancellation reason and kind types.
//!
//! Cancellation in interflux is a first-class protocol, not a silent drop.
//! A cancelled routine unwinds through its scoped resources and settles as
//! [`Outcome::Cancelled`](super::Outcome::Cancelled); the reason records why.
//! Reasons are diagnostic payload only: every `Cancelled` outcome is equal
//! for the purposes of the engine's three-valued semantics.

use core::fmt;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// Cancellation due to a timeout.
    Timeout,
    /// Cancellation because a sibling in a parallel-all composition failed.
    SiblingFailed,
    /// Cancellation because another branch of a race completed first.
    RaceLost,
    /// Cancellation because a sideshow was replaced by a newer one.
    Superseded,
    /// Cancellation because the owning control routine completed.
    ParentCancelled,
    /// Cancellation due to host shutdown.
    Shutdown,
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::SiblingFailed => write!(f, "sibling failed"),
            Self::RaceLost => write!(f, "race lost"),
            Self::Superseded => write!(f, "superseded"),
            Self::ParentCancelled => write!(f, "parent cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a sibling-failed cancellation reason (parallel-all teardown).
    #[must_use]
    pub const fn sibling_failed() -> Self {
        Self::new(CancelKind::SiblingFailed)
    }

    /// Creates a race-loser cancellation reason.
    #[must_use]
    pub const fn race_lost() -> Self {
        Self::new(CancelKind::RaceLost)
    }

    /// Creates a superseded cancellation reason (sideshow replacement).
    #[must_use]
    pub const fn superseded() -> Self {
        Self::new(CancelKind::Superseded)
    }

    /// Creates a parent-cancelled cancellation reason.
    #[must_use]
    pub const fn parent_cancelled() -> Self {
        Self::new(CancelKind::ParentCancelled)
    }

    /// Creates a shutdown cancellation reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(message) => write!(f, "{} ({message})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
