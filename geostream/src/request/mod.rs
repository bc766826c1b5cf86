//! Stateful sensor requests.
//!
//! A request is one consumer's registration for sensor updates, with its
//! own filtering policy, callbacks, and lifecycle. Two concrete kinds
//! exist: [`LocationRequest`] for position fixes and [`HeadingRequest`]
//! for orientation. Both implement the [`Request`] contract so the
//! session manager can treat them uniformly for resume/pause/cancel and
//! admission decisions.
//!
//! Requests are built against a [`SessionManager`](crate::session::SessionManager)
//! and delegate queue membership to it through a weak back-reference;
//! there is no global registry.

mod heading;
mod location;
mod state;

pub use heading::{HeadingRequest, HeadingRequestBuilder};
pub use location::{LocationRequest, LocationRequestBuilder};
pub use state::{RequestState, StateCell, Transition};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observers::DeliveryContext;
use crate::policy::Authorization;

// =============================================================================
// Request Identity
// =============================================================================

/// Process-wide counter backing [`RequestId::next`]. Identifiers are never
/// reused within a process.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique opaque token identifying a request.
///
/// Two requests are equal iff their identifiers match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates a fresh identifier.
    pub(crate) fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// =============================================================================
// Request Contract
// =============================================================================

/// Outcome of an activation attempt, used by the session manager to
/// decide whether to run resume setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    /// Newly transitioned into `Running`; run resume setup.
    Started,
    /// Already running; nothing to do.
    AlreadyActive,
    /// Cancelled or terminally failed; must not be queued.
    Refused,
}

/// Handler invoked on lifecycle state changes with `(old, new)`.
pub type StateChangeHandler = Arc<dyn Fn(RequestState, RequestState) + Send + Sync>;

/// The abstract contract shared by all request kinds.
///
/// The session manager relies on these queries for admission and
/// scheduling; consumers use the lifecycle operations. All methods are
/// safe to call from any thread.
pub trait Request: Send + Sync {
    /// The request's immutable identifier.
    fn id(&self) -> RequestId;

    /// Current lifecycle state.
    fn state(&self) -> RequestState;

    /// Optional human label; no semantic effect.
    fn name(&self) -> Option<String>;

    /// Sets the human label.
    fn set_name(&self, name: Option<String>);

    /// Platform permission level this request needs, derived from its
    /// policy.
    fn required_authorization(&self) -> Authorization;

    /// True when the request stays eligible for background delivery.
    fn is_background_capable(&self) -> bool;

    /// True while the request is a member of the session's active queue.
    fn is_in_queue(&self) -> bool;

    /// Requests activation: hands the request to the session queue and
    /// runs kind-specific setup (timeout timer, one-shot IP fetch).
    fn resume(&self);

    /// Requests deactivation without discarding registered observers.
    fn pause(&self);

    /// Removes the request from the queue. Irreversible; subsequent
    /// dispatches are no-ops and the request is never reused.
    fn cancel(&self);

    /// Registers the state-change hook, fired exactly once per distinct
    /// transition with `(old, new)` on the given context. Replaces any
    /// previously registered hook.
    fn on_state_change(&self, context: DeliveryContext, handler: StateChangeHandler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique_and_monotonic() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::next();
        assert!(id.to_string().starts_with("req-"));
    }
}
