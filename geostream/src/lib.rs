//! Geostream - Request lifecycle and event dispatch for sensor streams
//!
//! This library manages consumer subscriptions to continuous position and
//! heading sample streams: per-request filtering policies, observer
//! callbacks with explicit delivery contexts, lifecycle state machines,
//! timeout watchdogs, approximate positioning over IP geolocation, and a
//! session manager that aggregates all running requests into the coarsest
//! hardware profile satisfying them.
//!
//! It deliberately does not talk to sensor hardware. A platform layer
//! feeds raw samples into [`session::SessionManager::dispatch_location`]
//! and [`session::SessionManager::dispatch_heading`] and configures the
//! physical sensors from the [`session::SessionProfile`] the manager
//! publishes.
//!
//! # Example
//!
//! ```ignore
//! use geostream::prelude::*;
//!
//! let manager = SessionManager::new(SessionConfig::default());
//! let request = LocationRequest::builder()
//!     .accuracy(Accuracy::Block)
//!     .minimum_distance(50.0)
//!     .build(&manager);
//!
//! request.on_update(DeliveryContext::Inline, |update| {
//!     println!("fix: {:?}", update.location);
//! });
//! request.resume();
//!
//! // The platform layer pushes samples in:
//! manager.dispatch_location(LocationSample::new(53.55, 9.99, 12.0));
//! ```

pub mod error;
pub mod ip;
pub mod observers;
pub mod policy;
pub mod request;
pub mod sample;
pub mod session;
pub mod timeout;

/// Convenience re-exports for typical consumers.
pub mod prelude {
    pub use crate::error::SensorError;
    pub use crate::ip::{IpApiService, IpLookupService};
    pub use crate::observers::DeliveryContext;
    pub use crate::policy::{Accuracy, AccuracyLevel, ActivityType, Authorization, Frequency};
    pub use crate::request::{
        HeadingRequest, LocationRequest, Request, RequestId, RequestState,
    };
    pub use crate::sample::{HeadingSample, LocationSample};
    pub use crate::session::{SessionConfig, SessionManager, SessionProfile};
}
