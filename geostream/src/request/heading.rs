//! Heading request: degree-change filtered orientation updates.
//!
//! The filter compares the new reading against the *last raw sample*, not
//! the last accepted one: every dispatched sample replaces the reference
//! point, accepted or not, so a slow drift below the filter threshold
//! never accumulates into a delivery.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::SensorError;
use crate::observers::{DeliveryContext, HeadingFailure, HeadingUpdate, ObserverSet};
use crate::policy::Authorization;
use crate::request::{
    Activation, Request, RequestId, RequestState, StateCell, StateChangeHandler, Transition,
};
use crate::sample::HeadingSample;
use crate::session::{SessionCore, SessionManager};

struct Inner {
    state: StateCell,
    cancelled: bool,
    name: Option<String>,
    filter: Option<f64>,
    previous: Option<HeadingSample>,
    last_error: Option<SensorError>,
}

struct Observers {
    on_heading: ObserverSet<HeadingUpdate>,
    on_failure: ObserverSet<HeadingFailure>,
    state_hook: Option<(DeliveryContext, StateChangeHandler)>,
}

/// A consumer's registration for orientation updates.
///
/// Construction fails with [`SensorError::ServiceUnavailable`] when the
/// session reports no heading capability; the check happens once, never
/// per dispatch.
pub struct HeadingRequest {
    id: RequestId,
    self_weak: Weak<HeadingRequest>,
    session: Weak<SessionCore>,
    cancel_on_error: bool,
    inner: Mutex<Inner>,
    observers: Mutex<Observers>,
}

impl HeadingRequest {
    /// Starts building a heading request.
    pub fn builder() -> HeadingRequestBuilder {
        HeadingRequestBuilder::new()
    }

    /// The degree-change filter; `None` accepts every reading.
    pub fn filter(&self) -> Option<f64> {
        self.inner.lock().filter
    }

    /// Updates the degree-change filter and asks the session manager to
    /// recompute the hardware profile.
    pub fn set_filter(&self, filter: Option<f64>) {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.filter != filter;
            inner.filter = filter;
            changed
        };
        if changed {
            if let Some(core) = self.session.upgrade() {
                core.notify_required_services_changed();
            }
        }
    }

    /// Whether errors terminate the request.
    pub fn cancel_on_error(&self) -> bool {
        self.cancel_on_error
    }

    /// The last raw sample seen, accepted or not (the filter reference).
    pub fn previous_heading(&self) -> Option<HeadingSample> {
        self.inner.lock().previous.clone()
    }

    /// The most recent error dispatched to this request.
    pub fn last_error(&self) -> Option<SensorError> {
        self.inner.lock().last_error.clone()
    }

    /// Registers an observer for accepted heading readings.
    pub fn on_heading(
        &self,
        context: DeliveryContext,
        handler: impl Fn(HeadingUpdate) + Send + Sync + 'static,
    ) {
        self.observers.lock().on_heading.register(context, handler);
    }

    /// Registers an observer for errors.
    pub fn on_failure(
        &self,
        context: DeliveryContext,
        handler: impl Fn(HeadingFailure) + Send + Sync + 'static,
    ) {
        self.observers.lock().on_failure.register(context, handler);
    }

    // -------------------------------------------------------------------------
    // Session manager entry points
    // -------------------------------------------------------------------------

    /// Attempts the `Idle|Paused -> Running` transition.
    pub(crate) fn activate(&self) -> Activation {
        let transition = {
            let mut inner = self.inner.lock();
            if inner.cancelled {
                return Activation::Refused;
            }
            inner.state.transition(RequestState::Running)
        };
        match transition {
            Transition::Changed { old, new } => {
                debug!(id = %self.id, from = %old, to = %new, "heading request activated");
                self.fire_state_hook(old, new);
                Activation::Started
            }
            Transition::Unchanged => Activation::AlreadyActive,
            Transition::Rejected => Activation::Refused,
        }
    }

    /// `Running -> Paused` transition.
    pub(crate) fn deactivate(&self) {
        let transition = { self.inner.lock().state.transition(RequestState::Paused) };
        if let Some((old, new)) = transition.changed() {
            debug!(id = %self.id, from = %old, to = %new, "heading request paused");
            self.fire_state_hook(old, new);
        }
    }

    /// Marks the request cancelled. Idempotent; returns true first time.
    pub(crate) fn mark_cancelled(&self) -> bool {
        let mut inner = self.inner.lock();
        let first = !inner.cancelled;
        inner.cancelled = true;
        if first {
            debug!(id = %self.id, "heading request cancelled");
        }
        first
    }

    /// Dispatches a raw heading reading through the degree-change filter.
    ///
    /// The previous-heading reference is updated on every dispatched
    /// sample, accepted or rejected.
    pub(crate) fn dispatch_heading(self: &Arc<Self>, sample: &HeadingSample) {
        let accepted = {
            let mut inner = self.inner.lock();
            if inner.cancelled || !inner.state.current().is_running() {
                return;
            }

            let previous = inner.previous.replace(sample.clone());
            match (previous, inner.filter) {
                (None, _) | (_, None) => true,
                (Some(previous), Some(filter)) => {
                    let delta =
                        (previous.true_heading.abs() - sample.true_heading.abs()).abs();
                    if delta > filter {
                        true
                    } else {
                        trace!(
                            id = %self.id,
                            delta_deg = delta,
                            filter_deg = filter,
                            "heading rejected by degree-change filter"
                        );
                        false
                    }
                }
            }
        };

        if !accepted {
            return;
        }

        let observers = self.observers.lock().on_heading.clone();
        observers.notify(HeadingUpdate {
            request: Arc::clone(self),
            heading: sample.clone(),
        });
        debug!(id = %self.id, true_heading = sample.true_heading, "heading update delivered");
    }

    /// Dispatches an error. Returns true when fatal (`cancel_on_error`).
    pub(crate) fn dispatch_error(self: &Arc<Self>, error: SensorError) -> bool {
        let transition = {
            let mut inner = self.inner.lock();
            if inner.cancelled {
                return false;
            }
            inner.last_error = Some(error.clone());
            if self.cancel_on_error {
                inner.cancelled = true;
                inner.state.transition(RequestState::Failed(error.clone()))
            } else {
                Transition::Unchanged
            }
        };

        let observers = self.observers.lock().on_failure.clone();
        observers.notify(HeadingFailure {
            request: Arc::clone(self),
            error: error.clone(),
        });
        debug!(id = %self.id, %error, fatal = self.cancel_on_error, "heading error delivered");

        if let Some((old, new)) = transition.changed() {
            self.fire_state_hook(old, new);
        }
        self.cancel_on_error
    }

    fn fire_state_hook(&self, old: RequestState, new: RequestState) {
        let hook = self.observers.lock().state_hook.clone();
        if let Some((context, handler)) = hook {
            context.deliver(move || handler(old, new));
        }
    }
}

impl Request for HeadingRequest {
    fn id(&self) -> RequestId {
        self.id
    }

    fn state(&self) -> RequestState {
        self.inner.lock().state.current().clone()
    }

    fn name(&self) -> Option<String> {
        self.inner.lock().name.clone()
    }

    fn set_name(&self, name: Option<String>) {
        self.inner.lock().name = name;
    }

    fn required_authorization(&self) -> Authorization {
        // Heading needs no location permission.
        Authorization::None
    }

    fn is_background_capable(&self) -> bool {
        false
    }

    fn is_in_queue(&self) -> bool {
        self.session
            .upgrade()
            .map(|core| core.is_queued(self.id))
            .unwrap_or(false)
    }

    fn resume(&self) {
        let Some(core) = self.session.upgrade() else {
            warn!(id = %self.id, "session manager dropped; cannot resume");
            return;
        };
        let Some(me) = self.self_weak.upgrade() else {
            return;
        };
        core.start_heading(&me);
    }

    fn pause(&self) {
        if let Some(core) = self.session.upgrade() {
            core.pause_heading(self.id);
        }
    }

    fn cancel(&self) {
        self.mark_cancelled();
        if let Some(core) = self.session.upgrade() {
            core.cancel_heading(self.id);
        }
    }

    fn on_state_change(&self, context: DeliveryContext, handler: StateChangeHandler) {
        self.observers.lock().state_hook = Some((context, handler));
    }
}

impl PartialEq for HeadingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HeadingRequest {}

impl fmt::Debug for HeadingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HeadingRequest")
            .field("id", &self.id)
            .field("filter", &inner.filter)
            .field("state", inner.state.current())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`HeadingRequest`].
pub struct HeadingRequestBuilder {
    filter: Option<f64>,
    cancel_on_error: bool,
    name: Option<String>,
}

impl HeadingRequestBuilder {
    fn new() -> Self {
        Self {
            filter: None,
            cancel_on_error: false,
            name: None,
        }
    }

    /// Degree-change filter: deliver only when the reading moved strictly
    /// more than this many degrees from the last raw sample.
    pub fn filter(mut self, degrees: f64) -> Self {
        self.filter = Some(degrees);
        self
    }

    /// Whether an error terminates the request (default: false).
    pub fn cancel_on_error(mut self, cancel: bool) -> Self {
        self.cancel_on_error = cancel;
        self
    }

    /// Human label; no semantic effect.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the request against the given session manager.
    ///
    /// # Errors
    ///
    /// [`SensorError::ServiceUnavailable`] when the session reports no
    /// heading capability.
    pub fn build(self, manager: &SessionManager) -> Result<Arc<HeadingRequest>, SensorError> {
        if !manager.heading_available() {
            return Err(SensorError::ServiceUnavailable("heading".to_string()));
        }

        Ok(Arc::new_cyclic(|weak| HeadingRequest {
            id: RequestId::next(),
            self_weak: weak.clone(),
            session: manager.core_weak(),
            cancel_on_error: self.cancel_on_error,
            inner: Mutex::new(Inner {
                state: StateCell::new(),
                cancelled: false,
                name: self.name,
                filter: self.filter,
                previous: None,
                last_error: None,
            }),
            observers: Mutex::new(Observers {
                on_heading: ObserverSet::new(),
                on_failure: ObserverSet::new(),
                state_hook: None,
            }),
        }))
    }
}

impl Default for HeadingRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, SessionManager};

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default())
    }

    #[test]
    fn test_construction_fails_without_heading_capability() {
        let manager = SessionManager::new(SessionConfig {
            heading_available: false,
            ..Default::default()
        });
        let result = HeadingRequest::builder().filter(5.0).build(&manager);
        assert_eq!(
            result.err(),
            Some(SensorError::ServiceUnavailable("heading".to_string()))
        );
    }

    #[test]
    fn test_construction_succeeds_with_capability() {
        let m = manager();
        let req = HeadingRequest::builder().filter(10.0).build(&m).unwrap();
        assert_eq!(req.filter(), Some(10.0));
        assert_eq!(req.state(), RequestState::Idle);
        assert_eq!(req.required_authorization(), Authorization::None);
        assert!(!req.is_background_capable());
    }

    #[test]
    fn test_dispatch_before_resume_does_not_update_reference() {
        let m = manager();
        let req = HeadingRequest::builder().build(&m).unwrap();
        req.dispatch_heading(&HeadingSample::new(90.0));
        assert_eq!(req.previous_heading(), None);
    }

    #[test]
    fn test_equality_is_by_identifier() {
        let m = manager();
        let a = HeadingRequest::builder().build(&m).unwrap();
        let b = HeadingRequest::builder().build(&m).unwrap();
        assert_eq!(*a, *a);
        assert_ne!(*a, *b);
    }
}
