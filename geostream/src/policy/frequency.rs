//! Update frequency policy.

use std::fmt;
use std::time::Duration;

/// How often, and with what semantics, a location request receives updates.
#[derive(Debug, Clone, PartialEq)]
pub enum Frequency {
    /// Deliver exactly one accepted sample (or one error), then terminate.
    OneShot,

    /// Deliver every accepted sample for the life of the request.
    Continuous,

    /// Deliver only on significant position changes, as judged by the
    /// hardware layer. Requires the strongest authorization and keeps the
    /// request alive in the background.
    SignificantChange,

    /// Defer delivery until the device has moved at least `meters` or
    /// `interval` has elapsed, whichever the hardware honors first.
    /// Background-capable.
    DeferredUntil {
        /// Minimum distance moved before delivery, in meters.
        meters: f64,
        /// Maximum time between deliveries.
        interval: Duration,
        /// Optional cap on how long deferral may be honored at all.
        timeout: Option<Duration>,
    },
}

impl Frequency {
    /// Returns true if this frequency keeps the request eligible for
    /// background delivery.
    pub fn is_background_capable(&self) -> bool {
        matches!(self, Self::SignificantChange | Self::DeferredUntil { .. })
    }

    /// Returns true for the one-shot cadence.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, Self::OneShot)
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self::Continuous
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneShot => write!(f, "OneShot"),
            Self::Continuous => write!(f, "Continuous"),
            Self::SignificantChange => write!(f, "SignificantChange"),
            Self::DeferredUntil { meters, interval, .. } => {
                write!(f, "DeferredUntil({meters}m, {interval:?})")
            }
        }
    }
}
