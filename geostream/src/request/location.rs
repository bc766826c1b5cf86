//! Location request: filtered position updates.
//!
//! A location request validates incoming samples against its accuracy
//! policy and minimum-distance filter, records the last accepted fix,
//! delivers accepted samples to its observers, and terminates itself on
//! one-shot completion, fatal errors, or timeout.
//!
//! # Example
//!
//! ```ignore
//! use geostream::prelude::*;
//!
//! let manager = SessionManager::new(SessionConfig::default());
//! let request = LocationRequest::builder()
//!     .accuracy(Accuracy::House)
//!     .frequency(Frequency::Continuous)
//!     .minimum_distance(50.0)
//!     .build(&manager);
//!
//! request.on_update(DeliveryContext::Inline, |update| {
//!     println!("fix: {:.5}, {:.5}", update.location.latitude, update.location.longitude);
//! });
//! request.resume();
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::SensorError;
use crate::observers::{
    AuthorizationChange, DeliveryContext, LocationFailure, LocationUpdate, ObserverSet,
};
use crate::policy::{Accuracy, ActivityType, Authorization, Frequency};
use crate::request::{
    Activation, Request, RequestId, RequestState, StateCell, StateChangeHandler, Transition,
};
use crate::sample::LocationSample;
use crate::session::{SessionCore, SessionManager};
use crate::timeout::DeadlineTimer;

// =============================================================================
// Location Request
// =============================================================================

struct Inner {
    state: StateCell,
    cancelled: bool,
    name: Option<String>,
    activity: ActivityType,
    last_location: Option<LocationSample>,
    last_error: Option<SensorError>,
    // Bumped under this lock by every event that satisfies or supersedes
    // an armed deadline (accepted sample, pause, cancel, re-arm). A
    // firing deadline carries the epoch it was armed with and is dropped
    // when it no longer matches, so a timeout racing an accepted sample
    // can never deliver both.
    timeout_epoch: u64,
}

struct Observers {
    on_update: ObserverSet<LocationUpdate>,
    on_failure: ObserverSet<LocationFailure>,
    on_auth_change: ObserverSet<AuthorizationChange>,
    state_hook: Option<(DeliveryContext, StateChangeHandler)>,
}

/// A consumer's registration for position updates.
///
/// Immutable policy (accuracy, frequency, distance filter, timeout,
/// error escalation) is fixed at construction through
/// [`LocationRequestBuilder`]. Mutable fields are the human label and the
/// activity type hint.
pub struct LocationRequest {
    id: RequestId,
    self_weak: Weak<LocationRequest>,
    session: Weak<SessionCore>,
    accuracy: Accuracy,
    frequency: Frequency,
    minimum_distance: Option<f64>,
    timeout: Option<Duration>,
    cancel_on_error: bool,
    timer: DeadlineTimer,
    inner: Mutex<Inner>,
    observers: Mutex<Observers>,
}

impl LocationRequest {
    /// Starts building a location request.
    pub fn builder() -> LocationRequestBuilder {
        LocationRequestBuilder::new()
    }

    /// The accuracy policy.
    pub fn accuracy(&self) -> &Accuracy {
        &self.accuracy
    }

    /// The update frequency. When the accuracy is IP lookup this is
    /// always [`Frequency::OneShot`], regardless of what was requested.
    pub fn frequency(&self) -> &Frequency {
        &self.frequency
    }

    /// Minimum distance in meters a fix must move from the last accepted
    /// one; `None` accepts every distance.
    pub fn minimum_distance(&self) -> Option<f64> {
        self.minimum_distance
    }

    /// Configured timeout interval, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether errors terminate the request.
    pub fn cancel_on_error(&self) -> bool {
        self.cancel_on_error
    }

    /// The most recent sample accepted by the filters.
    pub fn last_location(&self) -> Option<LocationSample> {
        self.inner.lock().last_location.clone()
    }

    /// The most recent error dispatched to this request.
    pub fn last_error(&self) -> Option<SensorError> {
        self.inner.lock().last_error.clone()
    }

    /// The activity type hint.
    pub fn activity(&self) -> ActivityType {
        self.inner.lock().activity
    }

    /// Updates the activity type hint and asks the session manager to
    /// recompute the hardware profile.
    pub fn set_activity(&self, activity: ActivityType) {
        let changed = {
            let mut inner = self.inner.lock();
            let changed = inner.activity != activity;
            inner.activity = activity;
            changed
        };
        if changed {
            if let Some(core) = self.session.upgrade() {
                core.notify_required_services_changed();
            }
        }
    }

    /// Registers an observer for accepted position fixes.
    pub fn on_update(
        &self,
        context: DeliveryContext,
        handler: impl Fn(LocationUpdate) + Send + Sync + 'static,
    ) {
        self.observers.lock().on_update.register(context, handler);
    }

    /// Registers an observer for timeout and provider errors.
    pub fn on_failure(
        &self,
        context: DeliveryContext,
        handler: impl Fn(LocationFailure) + Send + Sync + 'static,
    ) {
        self.observers.lock().on_failure.register(context, handler);
    }

    /// Registers an observer for platform authorization changes.
    pub fn on_authorization_change(
        &self,
        context: DeliveryContext,
        handler: impl Fn(AuthorizationChange) + Send + Sync + 'static,
    ) {
        self.observers
            .lock()
            .on_auth_change
            .register(context, handler);
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
                debug!(id = %self.id, from = %old, to = %new, "location request activated");
                self.fire_state_hook(old, new);
                Activation::Started
            }
            Transition::Unchanged => Activation::AlreadyActive,
            Transition::Rejected => Activation::Refused,
        }
    }

    /// Resume setup: arms the timeout timer and, for IP-lookup accuracy,
    /// issues the one-shot fetch. Called by the manager after the request
    /// entered the queue.
    pub(crate) fn on_resumed(&self, core: &Arc<SessionCore>) {
        if let Some(timeout) = self.timeout {
            let epoch = {
                let mut inner = self.inner.lock();
                inner.timeout_epoch += 1;
                inner.timeout_epoch
            };
            match core.runtime() {
                Some(handle) => {
                    let session = Arc::downgrade(core);
                    let id = self.id;
                    self.timer.arm(&handle, timeout, move || {
                        if let Some(core) = session.upgrade() {
                            core.location_timed_out(id, timeout, epoch);
                        }
                    });
                }
                None => {
                    warn!(id = %self.id, "timeout configured but no tokio runtime is available")
                }
            }
        }

        if let Accuracy::IpLookup(service) = &self.accuracy {
            match core.runtime() {
                Some(handle) => {
                    let service = Arc::clone(service);
                    let session = Arc::downgrade(core);
                    let id = self.id;
                    handle.spawn(async move {
                        let result = service.lookup().await;
                        if let Some(core) = session.upgrade() {
                            match result {
                                Ok(sample) => core.dispatch_location_to(id, sample),
                                Err(error) => core.dispatch_location_error_to(id, error),
                            }
                        }
                    });
                }
                None => {
                    warn!(id = %self.id, "IP lookup requires a tokio runtime; request will idle")
                }
            }
        }
    }

    /// `Running -> Paused` transition; disarms the timeout timer.
    pub(crate) fn deactivate(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let transition = inner.state.transition(RequestState::Paused);
            if matches!(transition, Transition::Changed { .. }) {
                inner.timeout_epoch += 1;
            }
            transition
        };
        if let Some((old, new)) = transition.changed() {
            self.timer.disarm();
            debug!(id = %self.id, from = %old, to = %new, "location request paused");
            self.fire_state_hook(old, new);
        }
    }

    /// Marks the request cancelled so every later dispatch is a no-op.
    /// Idempotent; returns true the first time.
    pub(crate) fn mark_cancelled(&self) -> bool {
        let first = {
            let mut inner = self.inner.lock();
            let first = !inner.cancelled;
            inner.cancelled = true;
            inner.timeout_epoch += 1;
            first
        };
        if first {
            self.timer.disarm();
            debug!(id = %self.id, "location request cancelled");
        }
        first
    }

    /// Dispatches a raw position sample through the filters.
    ///
    /// Runs synchronously on the producer path: only the filtering
    /// decision happens under the request lock; observer delivery is an
    /// enqueue. Returns true when the request auto-stops (one-shot or
    /// IP-lookup completion) and must leave the queue.
    pub(crate) fn dispatch_location(self: &Arc<Self>, sample: &LocationSample) -> bool {
        let accepted = {
            let mut inner = self.inner.lock();
            if inner.cancelled || !inner.state.current().is_running() {
                return false;
            }

            let accepted = if !self.accuracy.accepts(sample) {
                trace!(
                    id = %self.id,
                    horizontal_accuracy = sample.horizontal_accuracy,
                    "sample rejected by accuracy policy"
                );
                false
            } else if let (Some(minimum), Some(last)) =
                (self.minimum_distance, inner.last_location.as_ref())
            {
                let moved = last.distance_to(sample);
                if moved > minimum {
                    true
                } else {
                    trace!(
                        id = %self.id,
                        moved_m = moved,
                        minimum_m = minimum,
                        "sample rejected by distance filter"
                    );
                    false
                }
            } else {
                true
            };

            if accepted {
                inner.last_location = Some(sample.clone());
                // Supersede any in-flight deadline while still holding the
                // lock; a timeout that already fired is now stale.
                inner.timeout_epoch += 1;
            }
            accepted
        };

        if !accepted {
            return false;
        }

        // The awaited sample arrived; the timeout watchdog is satisfied.
        self.timer.disarm();

        let observers = self.observers.lock().on_update.clone();
        observers.notify(LocationUpdate {
            request: Arc::clone(self),
            location: sample.clone(),
        });
        debug!(id = %self.id, "location update delivered");

        self.frequency.is_one_shot() || self.accuracy.is_ip_lookup()
    }

    /// Dispatches a timeout or provider error.
    ///
    /// Returns true when the error is fatal (`cancel_on_error` or
    /// one-shot): the request transitions to `Failed` and must leave the
    /// queue.
    pub(crate) fn dispatch_error(self: &Arc<Self>, error: SensorError) -> bool {
        self.dispatch_error_guarded(error, None)
    }

    /// Dispatches a fired deadline.
    ///
    /// `epoch` is the value captured when the deadline was armed. A
    /// deadline that lost the race against an accepted sample, a pause,
    /// a cancel, or a re-arm carries a stale epoch and is dropped under
    /// the request lock without notifying anyone.
    pub(crate) fn dispatch_timeout(self: &Arc<Self>, interval: Duration, epoch: u64) -> bool {
        self.dispatch_error_guarded(SensorError::Timeout(interval), Some(epoch))
    }

    fn dispatch_error_guarded(
        self: &Arc<Self>,
        error: SensorError,
        only_epoch: Option<u64>,
    ) -> bool {
        let fatal = self.cancel_on_error || self.frequency.is_one_shot();
        let (last_location, transition) = {
            let mut inner = self.inner.lock();
            if inner.cancelled {
                return false;
            }
            if let Some(epoch) = only_epoch {
                if inner.timeout_epoch != epoch {
                    trace!(id = %self.id, "stale deadline ignored");
                    return false;
                }
            }
            inner.last_error = Some(error.clone());
            let transition = if fatal {
                inner.cancelled = true;
                inner.state.transition(RequestState::Failed(error.clone()))
            } else {
                Transition::Unchanged
            };
            (inner.last_location.clone(), transition)
        };

        if fatal {
            self.timer.disarm();
        }

        let observers = self.observers.lock().on_failure.clone();
        observers.notify(LocationFailure {
            request: Arc::clone(self),
            last_location,
            error: error.clone(),
        });
        debug!(id = %self.id, %error, fatal, "location error delivered");

        if let Some((old, new)) = transition.changed() {
            self.fire_state_hook(old, new);
        }
        fatal
    }

    /// Dispatches a platform authorization change. No-op unless running;
    /// never causes a state transition by itself.
    pub(crate) fn dispatch_authorization_change(
        self: &Arc<Self>,
        old: Authorization,
        new: Authorization,
    ) {
        {
            let inner = self.inner.lock();
            if inner.cancelled || !inner.state.current().is_running() {
                return;
            }
        }
        let observers = self.observers.lock().on_auth_change.clone();
        observers.notify(AuthorizationChange {
            request: Arc::clone(self),
            old,
            new,
        });
    }

    fn fire_state_hook(&self, old: RequestState, new: RequestState) {
        let hook = self.observers.lock().state_hook.clone();
        if let Some((context, handler)) = hook {
            context.deliver(move || handler(old, new));
        }
    }
}

impl Request for LocationRequest {
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
        if self.accuracy.is_ip_lookup() {
            Authorization::None
        } else if self.frequency.is_background_capable() {
            Authorization::Always
        } else {
            Authorization::WhenInUse
        }
    }

    fn is_background_capable(&self) -> bool {
        self.frequency.is_background_capable()
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
        core.start_location(&me);
    }

    fn pause(&self) {
        if let Some(core) = self.session.upgrade() {
            core.pause_location(self.id);
        }
    }

    fn cancel(&self) {
        self.mark_cancelled();
        if let Some(core) = self.session.upgrade() {
            core.cancel_location(self.id);
        }
    }

    fn on_state_change(&self, context: DeliveryContext, handler: StateChangeHandler) {
        self.observers.lock().state_hook = Some((context, handler));
    }
}

impl PartialEq for LocationRequest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocationRequest {}

impl fmt::Debug for LocationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationRequest")
            .field("id", &self.id)
            .field("accuracy", &self.accuracy)
            .field("frequency", &self.frequency)
            .field("minimum_distance", &self.minimum_distance)
            .field("state", &self.inner.lock().state.current())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`LocationRequest`].
pub struct LocationRequestBuilder {
    accuracy: Accuracy,
    frequency: Frequency,
    minimum_distance: Option<f64>,
    timeout: Option<Duration>,
    cancel_on_error: bool,
    activity: ActivityType,
    name: Option<String>,
}

impl LocationRequestBuilder {
    fn new() -> Self {
        Self {
            accuracy: Accuracy::Any,
            frequency: Frequency::default(),
            minimum_distance: None,
            timeout: None,
            cancel_on_error: false,
            activity: ActivityType::default(),
            name: None,
        }
    }

    /// Accuracy policy (default: [`Accuracy::Any`]).
    pub fn accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Update frequency (default: [`Frequency::Continuous`]). Ignored in
    /// favor of one-shot when the accuracy is IP lookup.
    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    /// Minimum distance filter in meters; a fix must move strictly more
    /// than this from the last accepted one.
    pub fn minimum_distance(mut self, meters: f64) -> Self {
        self.minimum_distance = Some(meters);
        self
    }

    /// Timeout interval: if no sample is accepted within it after resume,
    /// a [`SensorError::Timeout`] is dispatched once.
    pub fn timeout(mut self, interval: Duration) -> Self {
        self.timeout = Some(interval);
        self
    }

    /// Whether an error terminates the request (default: false).
    pub fn cancel_on_error(mut self, cancel: bool) -> Self {
        self.cancel_on_error = cancel;
        self
    }

    /// Activity type hint (default: [`ActivityType::Other`]).
    pub fn activity(mut self, activity: ActivityType) -> Self {
        self.activity = activity;
        self
    }

    /// Human label; no semantic effect.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the request against the given session manager.
    ///
    /// IP-lookup accuracy unconditionally forces one-shot frequency for
    /// the request's entire lifetime.
    pub fn build(self, manager: &SessionManager) -> Arc<LocationRequest> {
        let frequency = if self.accuracy.is_ip_lookup() {
            Frequency::OneShot
        } else {
            self.frequency
        };

        Arc::new_cyclic(|weak| LocationRequest {
            id: RequestId::next(),
            self_weak: weak.clone(),
            session: manager.core_weak(),
            accuracy: self.accuracy,
            frequency,
            minimum_distance: self.minimum_distance,
            timeout: self.timeout,
            cancel_on_error: self.cancel_on_error,
            timer: DeadlineTimer::new(),
            inner: Mutex::new(Inner {
                state: StateCell::new(),
                cancelled: false,
                name: self.name,
                activity: self.activity,
                last_location: None,
                last_error: None,
                timeout_epoch: 0,
            }),
            observers: Mutex::new(Observers {
                on_update: ObserverSet::new(),
                on_failure: ObserverSet::new(),
                on_auth_change: ObserverSet::new(),
                state_hook: None,
            }),
        })
    }
}

impl Default for LocationRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::test_support::FixedLookup;
    use crate::session::SessionConfig;

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default())
    }

    #[test]
    fn test_builder_defaults() {
        let m = manager();
        let req = LocationRequest::builder().build(&m);
        assert_eq!(*req.accuracy(), Accuracy::Any);
        assert_eq!(*req.frequency(), Frequency::Continuous);
        assert_eq!(req.minimum_distance(), None);
        assert!(!req.cancel_on_error());
        assert_eq!(req.state(), RequestState::Idle);
        assert!(!req.is_in_queue());
    }

    #[test]
    fn test_ip_lookup_forces_one_shot() {
        let m = manager();
        let service = Arc::new(FixedLookup::succeeding(53.0, 10.0));
        let req = LocationRequest::builder()
            .accuracy(Accuracy::IpLookup(service))
            .frequency(Frequency::Continuous)
            .build(&m);
        assert_eq!(*req.frequency(), Frequency::OneShot);
    }

    #[test]
    fn test_required_authorization_derivation() {
        let m = manager();

        let whenever = LocationRequest::builder()
            .frequency(Frequency::Continuous)
            .build(&m);
        assert_eq!(
            whenever.required_authorization(),
            Authorization::WhenInUse
        );

        let background = LocationRequest::builder()
            .frequency(Frequency::SignificantChange)
            .build(&m);
        assert_eq!(background.required_authorization(), Authorization::Always);
        assert!(background.is_background_capable());

        let ip = LocationRequest::builder()
            .accuracy(Accuracy::IpLookup(Arc::new(FixedLookup::succeeding(
                1.0, 2.0,
            ))))
            .build(&m);
        assert_eq!(ip.required_authorization(), Authorization::None);
    }

    #[test]
    fn test_equality_is_by_identifier() {
        let m = manager();
        let a = LocationRequest::builder().build(&m);
        let b = LocationRequest::builder().build(&m);
        assert_eq!(*a, *a);
        assert_ne!(*a, *b);
    }

    #[test]
    fn test_name_is_mutable_without_side_effects() {
        let m = manager();
        let req = LocationRequest::builder().name("walk tracker").build(&m);
        assert_eq!(req.name().as_deref(), Some("walk tracker"));
        req.set_name(None);
        assert_eq!(req.name(), None);
        assert_eq!(req.state(), RequestState::Idle);
    }

    #[test]
    fn test_dispatch_before_resume_is_noop() {
        let m = manager();
        let req = LocationRequest::builder().build(&m);
        let terminated = req.dispatch_location(&LocationSample::new(53.0, 10.0, 5.0));
        assert!(!terminated);
        assert_eq!(req.last_location(), None);
    }

    #[test]
    fn test_deadline_superseded_by_accepted_sample_never_delivers() {
        let m = manager();
        let req = LocationRequest::builder()
            .timeout(Duration::from_secs(2))
            .cancel_on_error(true)
            .build(&m);
        let failures = Arc::new(Mutex::new(0usize));
        let failures_clone = Arc::clone(&failures);
        req.on_failure(DeliveryContext::Inline, move |_| {
            *failures_clone.lock() += 1;
        });

        // Resume arms epoch 1; the accepted sample supersedes it before
        // the (simulated) deadline gets to run.
        req.resume();
        assert!(!req.dispatch_location(&LocationSample::new(53.0, 10.0, 5.0)));
        assert!(!req.dispatch_timeout(Duration::from_secs(2), 1));

        assert_eq!(*failures.lock(), 0);
        assert_eq!(req.last_error(), None);
        assert_eq!(req.state(), RequestState::Running);

        // A deadline carrying the current epoch still fires normally.
        assert!(req.dispatch_timeout(Duration::from_secs(2), 2));
        assert_eq!(*failures.lock(), 1);
        assert!(req.state().is_failed());
    }

    #[test]
    fn test_deadline_armed_before_pause_is_ignored() {
        let m = manager();
        let req = LocationRequest::builder()
            .timeout(Duration::from_secs(2))
            .build(&m);

        req.resume();
        req.pause();
        assert!(!req.dispatch_timeout(Duration::from_secs(2), 1));
        assert_eq!(req.last_error(), None);
    }

    #[test]
    fn test_deadline_after_one_shot_completion_is_ignored() {
        let m = manager();
        let req = LocationRequest::builder()
            .frequency(Frequency::OneShot)
            .timeout(Duration::from_secs(2))
            .build(&m);

        req.resume();
        // One accepted sample completes the request and removes it from
        // the queue; the armed deadline must find nothing to fail.
        m.dispatch_location(LocationSample::new(53.0, 10.0, 5.0));
        assert!(!req.is_in_queue());
        assert!(!req.dispatch_timeout(Duration::from_secs(2), 1));
        assert_eq!(req.last_error(), None);
        assert!(!req.state().is_failed());
    }
}
