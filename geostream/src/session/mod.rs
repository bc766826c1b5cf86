//! Sensor session manager.
//!
//! The [`SessionManager`] owns the queue of active requests. It is an
//! explicitly constructed, cheaply clonable handle rather than a
//! process-wide singleton, so multiple independent sessions can coexist
//! and tests run deterministically.
//!
//! # Responsibilities
//!
//! - Start, pause, and cancel requests (reached through each request's
//!   `resume`/`pause`/`cancel` delegation).
//! - Forward raw samples, provider errors, and authorization changes into
//!   every queued request's dispatch entry point. Dispatch runs
//!   synchronously on the producer's path; only filtering happens there,
//!   callback delivery is an enqueue onto each observer's context.
//! - Recompute the coarsest [`SessionProfile`] whenever the request set
//!   or a profile-relevant policy field changes, and notify the hardware
//!   layer through the profile-changed hook.
//!
//! # Thread safety
//!
//! Queues are `DashMap`s and per-request mutable state sits behind one
//! `parking_lot::Mutex` per request, held only across the synchronous
//! filtering decision. Producers may call dispatch from any thread;
//! timers synchronize through the same per-request boundary.

mod profile;

pub use profile::SessionProfile;

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::SensorError;
use crate::policy::Authorization;
use crate::request::{Activation, HeadingRequest, LocationRequest, Request, RequestId};
use crate::sample::{HeadingSample, LocationSample};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for a sensor session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether the device reports heading (compass) capability. Heading
    /// request construction fails when false.
    pub heading_available: bool,

    /// Runtime for timeout timers and IP lookups. Defaults to the ambient
    /// tokio runtime at the point of use when `None`.
    pub runtime: Option<tokio::runtime::Handle>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heading_available: true,
            runtime: None,
        }
    }
}

/// Hook invoked when the aggregated session profile changes.
pub type ProfileChangedHandler = Arc<dyn Fn(&SessionProfile) + Send + Sync>;

// =============================================================================
// Session Core
// =============================================================================

pub(crate) struct SessionCore {
    config: SessionConfig,
    locations: DashMap<RequestId, Arc<LocationRequest>>,
    headings: DashMap<RequestId, Arc<HeadingRequest>>,
    authorization: RwLock<Authorization>,
    profile: RwLock<SessionProfile>,
    profile_hook: RwLock<Option<ProfileChangedHandler>>,
}

impl SessionCore {
    fn new(config: SessionConfig) -> Self {
        Self {
            config,
            locations: DashMap::new(),
            headings: DashMap::new(),
            authorization: RwLock::new(Authorization::None),
            profile: RwLock::new(SessionProfile::default()),
            profile_hook: RwLock::new(None),
        }
    }

    /// The runtime timers and lookups spawn on: the configured handle or
    /// the ambient one, if any.
    pub(crate) fn runtime(&self) -> Option<tokio::runtime::Handle> {
        self.config
            .runtime
            .clone()
            .or_else(|| tokio::runtime::Handle::try_current().ok())
    }

    pub(crate) fn is_queued(&self, id: RequestId) -> bool {
        self.locations.contains_key(&id) || self.headings.contains_key(&id)
    }

    // -------------------------------------------------------------------------
    // Location queue
    // -------------------------------------------------------------------------

    pub(crate) fn start_location(self: &Arc<Self>, request: &Arc<LocationRequest>) {
        match request.activate() {
            Activation::Started => {
                self.locations.insert(request.id(), Arc::clone(request));
                request.on_resumed(self);
                self.recompute_profile();
            }
            Activation::AlreadyActive => {}
            Activation::Refused => {
                debug!(id = %request.id(), "refusing to queue cancelled or failed request");
            }
        }
    }

    pub(crate) fn pause_location(&self, id: RequestId) {
        let request = self.locations.get(&id).map(|e| Arc::clone(e.value()));
        if let Some(request) = request {
            request.deactivate();
            self.recompute_profile();
        }
    }

    pub(crate) fn cancel_location(&self, id: RequestId) {
        if let Some((_, request)) = self.locations.remove(&id) {
            request.mark_cancelled();
            self.recompute_profile();
        }
    }

    pub(crate) fn dispatch_location(&self, sample: &LocationSample) {
        let requests: Vec<_> = self
            .locations
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut removed = false;
        for request in requests {
            if request.dispatch_location(sample) {
                self.finish_location(&request);
                removed = true;
            }
        }
        if removed {
            self.recompute_profile();
        }
    }

    /// Targeted dispatch for IP-lookup results: the resolved fix goes to
    /// the request that issued the lookup, not the whole queue.
    pub(crate) fn dispatch_location_to(&self, id: RequestId, sample: LocationSample) {
        let request = self.locations.get(&id).map(|e| Arc::clone(e.value()));
        if let Some(request) = request {
            if request.dispatch_location(&sample) {
                self.finish_location(&request);
                self.recompute_profile();
            }
        }
    }

    pub(crate) fn dispatch_location_error(&self, error: &SensorError) {
        let requests: Vec<_> = self
            .locations
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut removed = false;
        for request in requests {
            if request.dispatch_error(error.clone()) {
                self.locations.remove(&request.id());
                removed = true;
            }
        }
        if removed {
            self.recompute_profile();
        }
    }

    pub(crate) fn dispatch_location_error_to(&self, id: RequestId, error: SensorError) {
        let request = self.locations.get(&id).map(|e| Arc::clone(e.value()));
        if let Some(request) = request {
            if request.dispatch_error(error) {
                self.locations.remove(&id);
                self.recompute_profile();
            }
        }
    }

    /// Timeout timer entry point. `epoch` identifies the armed deadline;
    /// the request drops the dispatch when it has been superseded.
    pub(crate) fn location_timed_out(
        &self,
        id: RequestId,
        interval: std::time::Duration,
        epoch: u64,
    ) {
        let request = self.locations.get(&id).map(|e| Arc::clone(e.value()));
        if let Some(request) = request {
            if request.dispatch_timeout(interval, epoch) {
                debug!(id = %id, "location request timed out");
                self.locations.remove(&id);
                self.recompute_profile();
            }
        }
    }

    fn finish_location(&self, request: &Arc<LocationRequest>) {
        request.mark_cancelled();
        self.locations.remove(&request.id());
        debug!(id = %request.id(), "location request auto-stopped after delivery");
    }

    // -------------------------------------------------------------------------
    // Heading queue
    // -------------------------------------------------------------------------

    pub(crate) fn start_heading(self: &Arc<Self>, request: &Arc<HeadingRequest>) {
        match request.activate() {
            Activation::Started => {
                self.headings.insert(request.id(), Arc::clone(request));
                self.recompute_profile();
            }
            Activation::AlreadyActive => {}
            Activation::Refused => {
                debug!(id = %request.id(), "refusing to queue cancelled or failed request");
            }
        }
    }

    pub(crate) fn pause_heading(&self, id: RequestId) {
        let request = self.headings.get(&id).map(|e| Arc::clone(e.value()));
        if let Some(request) = request {
            request.deactivate();
            self.recompute_profile();
        }
    }

    pub(crate) fn cancel_heading(&self, id: RequestId) {
        if let Some((_, request)) = self.headings.remove(&id) {
            request.mark_cancelled();
            self.recompute_profile();
        }
    }

    pub(crate) fn dispatch_heading(&self, sample: &HeadingSample) {
        let requests: Vec<_> = self
            .headings
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for request in requests {
            request.dispatch_heading(sample);
        }
    }

    pub(crate) fn dispatch_heading_error(&self, error: &SensorError) {
        let requests: Vec<_> = self
            .headings
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut removed = false;
        for request in requests {
            if request.dispatch_error(error.clone()) {
                self.headings.remove(&request.id());
                removed = true;
            }
        }
        if removed {
            self.recompute_profile();
        }
    }

    // -------------------------------------------------------------------------
    // Authorization & profile
    // -------------------------------------------------------------------------

    fn update_authorization(&self, new: Authorization) {
        let old = {
            let mut current = self.authorization.write();
            std::mem::replace(&mut *current, new)
        };
        if old == new {
            return;
        }
        info!(%old, %new, "platform authorization changed");

        let requests: Vec<_> = self
            .locations
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for request in requests {
            request.dispatch_authorization_change(old, new);
        }
    }

    pub(crate) fn notify_required_services_changed(&self) {
        self.recompute_profile();
    }

    fn recompute_profile(&self) {
        let mut profile = SessionProfile::default();

        for entry in self.locations.iter() {
            let request = entry.value();
            if !request.state().is_running() {
                continue;
            }
            profile.accuracy = profile.accuracy.max(request.accuracy().level());
            profile.activity = profile.activity.max(request.activity());
            profile.authorization = profile
                .authorization
                .max(request.required_authorization());
            profile.background |= request.is_background_capable();
        }

        let mut unfiltered_heading = false;
        for entry in self.headings.iter() {
            let request = entry.value();
            if !request.state().is_running() {
                continue;
            }
            profile.heading = true;
            match request.filter() {
                None => unfiltered_heading = true,
                Some(filter) => {
                    profile.heading_filter = Some(
                        profile
                            .heading_filter
                            .map_or(filter, |current| current.min(filter)),
                    );
                }
            }
        }
        if unfiltered_heading {
            profile.heading_filter = None;
        }

        let changed = {
            let mut current = self.profile.write();
            if *current != profile {
                *current = profile.clone();
                true
            } else {
                false
            }
        };

        if changed {
            info!(
                accuracy = %profile.accuracy,
                authorization = %profile.authorization,
                background = profile.background,
                heading = profile.heading,
                "session profile changed"
            );
            let hook = self.profile_hook.read().clone();
            if let Some(hook) = hook {
                hook(&profile);
            }
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Handle to a sensor session. Cloning shares the same queue.
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<SessionCore>,
}

impl SessionManager {
    /// Creates a session with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            core: Arc::new(SessionCore::new(config)),
        }
    }

    /// Whether the device reports heading capability.
    pub fn heading_available(&self) -> bool {
        self.core.config.heading_available
    }

    /// The aggregated hardware profile for the current request set.
    pub fn profile(&self) -> SessionProfile {
        self.core.profile.read().clone()
    }

    /// Registers the hook fired when the aggregated profile changes.
    /// Replaces any previous hook.
    pub fn on_profile_changed(&self, handler: impl Fn(&SessionProfile) + Send + Sync + 'static) {
        *self.core.profile_hook.write() = Some(Arc::new(handler));
    }

    /// Recomputes the profile; called automatically on queue changes and
    /// by requests when a profile-relevant policy field mutates.
    pub fn notify_required_services_changed(&self) {
        self.core.notify_required_services_changed();
    }

    /// The platform authorization level last reported to this session.
    pub fn authorization(&self) -> Authorization {
        *self.core.authorization.read()
    }

    /// Reports a platform authorization change; running location requests
    /// observe `(old, new)` on their registered contexts.
    pub fn update_authorization(&self, new: Authorization) {
        self.core.update_authorization(new);
    }

    /// True while the request is a member of this session's queue.
    pub fn is_queued(&self, request: &dyn Request) -> bool {
        self.core.is_queued(request.id())
    }

    /// Number of queued requests (running or paused) of both kinds.
    pub fn queued_count(&self) -> usize {
        self.core.locations.len() + self.core.headings.len()
    }

    /// Forwards a raw position sample into every queued location request.
    pub fn dispatch_location(&self, sample: LocationSample) {
        self.core.dispatch_location(&sample);
    }

    /// Forwards a provider error into every queued location request.
    pub fn dispatch_location_error(&self, error: SensorError) {
        self.core.dispatch_location_error(&error);
    }

    /// Forwards a raw heading reading into every queued heading request.
    pub fn dispatch_heading(&self, sample: HeadingSample) {
        self.core.dispatch_heading(&sample);
    }

    /// Forwards a provider error into every queued heading request.
    pub fn dispatch_heading_error(&self, error: SensorError) {
        self.core.dispatch_heading_error(&error);
    }

    pub(crate) fn core_weak(&self) -> Weak<SessionCore> {
        Arc::downgrade(&self.core)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("locations", &self.core.locations.len())
            .field("headings", &self.core.headings.len())
            .field("profile", &*self.core.profile.read())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::DeliveryContext;
    use crate::policy::{Accuracy, AccuracyLevel, ActivityType, Frequency};
    use crate::request::RequestState;
    use parking_lot::Mutex;

    fn manager() -> SessionManager {
        SessionManager::default()
    }

    #[test]
    fn test_resume_queues_request() {
        let m = manager();
        let req = LocationRequest::builder().build(&m);

        assert!(!m.is_queued(&*req));
        req.resume();
        assert!(m.is_queued(&*req));
        assert_eq!(req.state(), RequestState::Running);
        assert_eq!(m.queued_count(), 1);
    }

    #[test]
    fn test_cancel_removes_from_queue() {
        let m = manager();
        let req = LocationRequest::builder().build(&m);
        req.resume();
        req.cancel();

        assert!(!m.is_queued(&*req));
        assert_eq!(m.queued_count(), 0);

        // Resume after cancel must not re-queue.
        req.resume();
        assert!(!m.is_queued(&*req));
    }

    #[test]
    fn test_pause_keeps_queued_but_stops_dispatch() {
        let m = manager();
        let req = LocationRequest::builder().build(&m);
        let seen = Arc::new(Mutex::new(0usize));
        let seen_clone = Arc::clone(&seen);
        req.on_update(DeliveryContext::Inline, move |_| {
            *seen_clone.lock() += 1;
        });

        req.resume();
        m.dispatch_location(LocationSample::new(53.0, 10.0, 5.0));
        assert_eq!(*seen.lock(), 1);

        req.pause();
        assert!(m.is_queued(&*req));
        assert_eq!(req.state(), RequestState::Paused);
        m.dispatch_location(LocationSample::new(53.1, 10.1, 5.0));
        assert_eq!(*seen.lock(), 1);

        req.resume();
        m.dispatch_location(LocationSample::new(53.2, 10.2, 5.0));
        assert_eq!(*seen.lock(), 2);
    }

    #[test]
    fn test_profile_aggregates_strictest_demands() {
        let m = manager();

        let coarse = LocationRequest::builder()
            .accuracy(Accuracy::City)
            .frequency(Frequency::Continuous)
            .build(&m);
        let fine = LocationRequest::builder()
            .accuracy(Accuracy::Room)
            .frequency(Frequency::SignificantChange)
            .activity(ActivityType::Navigation)
            .build(&m);

        coarse.resume();
        fine.resume();

        let profile = m.profile();
        assert_eq!(profile.accuracy, AccuracyLevel::Room);
        assert_eq!(profile.authorization, Authorization::Always);
        assert_eq!(profile.activity, ActivityType::Navigation);
        assert!(profile.background);

        fine.cancel();
        let profile = m.profile();
        assert_eq!(profile.accuracy, AccuracyLevel::City);
        assert_eq!(profile.authorization, Authorization::WhenInUse);
        assert!(!profile.background);
    }

    #[test]
    fn test_profile_hook_fires_only_on_change() {
        let m = manager();
        let fired = Arc::new(Mutex::new(0usize));
        let fired_clone = Arc::clone(&fired);
        m.on_profile_changed(move |_| {
            *fired_clone.lock() += 1;
        });

        let req = LocationRequest::builder()
            .accuracy(Accuracy::House)
            .build(&m);
        req.resume();
        assert_eq!(*fired.lock(), 1);

        // No policy changed; recompute is a no-op for the hook.
        m.notify_required_services_changed();
        assert_eq!(*fired.lock(), 1);

        req.cancel();
        assert_eq!(*fired.lock(), 2);
    }

    #[test]
    fn test_heading_filter_aggregation() {
        let m = manager();
        let a = HeadingRequest::builder().filter(10.0).build(&m).unwrap();
        let b = HeadingRequest::builder().filter(5.0).build(&m).unwrap();

        a.resume();
        b.resume();
        assert_eq!(m.profile().heading_filter, Some(5.0));
        assert!(m.profile().heading);

        // An unfiltered request forces unfiltered hardware delivery.
        let c = HeadingRequest::builder().build(&m).unwrap();
        c.resume();
        assert_eq!(m.profile().heading_filter, None);
        assert!(m.profile().heading);
    }

    #[test]
    fn test_authorization_change_reaches_running_requests() {
        let m = manager();
        let req = LocationRequest::builder().build(&m);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        req.on_authorization_change(DeliveryContext::Inline, move |change| {
            seen_clone.lock().push((change.old, change.new));
        });

        // Not running yet: no delivery.
        m.update_authorization(Authorization::WhenInUse);
        assert!(seen.lock().is_empty());

        req.resume();
        m.update_authorization(Authorization::Always);
        assert_eq!(
            *seen.lock(),
            vec![(Authorization::WhenInUse, Authorization::Always)]
        );

        // Same value again: no delivery.
        m.update_authorization(Authorization::Always);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_one_shot_leaves_queue_after_first_accepted_sample() {
        let m = manager();
        let req = LocationRequest::builder()
            .frequency(Frequency::OneShot)
            .build(&m);
        let seen = Arc::new(Mutex::new(0usize));
        let seen_clone = Arc::clone(&seen);
        req.on_update(DeliveryContext::Inline, move |_| {
            *seen_clone.lock() += 1;
        });

        req.resume();
        m.dispatch_location(LocationSample::new(53.0, 10.0, 5.0));
        assert_eq!(*seen.lock(), 1);
        assert!(!m.is_queued(&*req));

        m.dispatch_location(LocationSample::new(53.1, 10.1, 5.0));
        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_set_filter_triggers_profile_recompute() {
        let m = manager();
        let req = HeadingRequest::builder().filter(10.0).build(&m).unwrap();
        req.resume();
        assert_eq!(m.profile().heading_filter, Some(10.0));

        req.set_filter(Some(2.5));
        assert_eq!(m.profile().heading_filter, Some(2.5));
    }
}
