//! Accuracy policy and its acceptance predicate.

use std::fmt;
use std::sync::Arc;

use crate::ip::IpLookupService;
use crate::sample::LocationSample;

// =============================================================================
// Accuracy Bounds (meters)
// =============================================================================

/// Horizontal accuracy bound for [`AccuracyLevel::City`].
pub const CITY_ACCURACY_M: f64 = 5000.0;

/// Horizontal accuracy bound for [`AccuracyLevel::Neighborhood`].
pub const NEIGHBORHOOD_ACCURACY_M: f64 = 1000.0;

/// Horizontal accuracy bound for [`AccuracyLevel::Block`].
pub const BLOCK_ACCURACY_M: f64 = 100.0;

/// Horizontal accuracy bound for [`AccuracyLevel::House`].
pub const HOUSE_ACCURACY_M: f64 = 15.0;

/// Horizontal accuracy bound for [`AccuracyLevel::Room`].
pub const ROOM_ACCURACY_M: f64 = 5.0;

/// A hardware-facing accuracy level, ordered from loosest to strictest.
///
/// This is what the session manager aggregates across all active requests
/// to pick the coarsest configuration that satisfies everyone: the
/// strictest level wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccuracyLevel {
    /// Any fix is acceptable.
    Any,
    /// Within ~5 km.
    City,
    /// Within ~1 km.
    Neighborhood,
    /// Within ~100 m.
    Block,
    /// Within ~15 m.
    House,
    /// Within ~5 m.
    Room,
}

impl AccuracyLevel {
    /// Returns the horizontal accuracy bound in meters, or `None` when any
    /// fix is acceptable.
    pub fn horizontal_bound(&self) -> Option<f64> {
        match self {
            Self::Any => None,
            Self::City => Some(CITY_ACCURACY_M),
            Self::Neighborhood => Some(NEIGHBORHOOD_ACCURACY_M),
            Self::Block => Some(BLOCK_ACCURACY_M),
            Self::House => Some(HOUSE_ACCURACY_M),
            Self::Room => Some(ROOM_ACCURACY_M),
        }
    }
}

impl fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How precise a position fix must be before a request accepts it.
///
/// Generic levels validate samples against a horizontal accuracy bound.
/// [`Accuracy::IpLookup`] is a different strategy entirely: a single
/// network-derived fix from the injected service, with no hardware
/// precision requirement. IP-lookup requests are always one-shot.
#[derive(Clone)]
pub enum Accuracy {
    /// Accept every sample.
    Any,
    /// Accept samples within ~5 km.
    City,
    /// Accept samples within ~1 km.
    Neighborhood,
    /// Accept samples within ~100 m.
    Block,
    /// Accept samples within ~15 m.
    House,
    /// Accept samples within ~5 m.
    Room,
    /// One-shot IP-based lookup through the injected service.
    IpLookup(Arc<dyn IpLookupService>),
}

impl Accuracy {
    /// Returns the hardware-facing level this accuracy contributes to the
    /// session profile. IP lookup needs no hardware fix and maps to `Any`.
    pub fn level(&self) -> AccuracyLevel {
        match self {
            Self::Any | Self::IpLookup(_) => AccuracyLevel::Any,
            Self::City => AccuracyLevel::City,
            Self::Neighborhood => AccuracyLevel::Neighborhood,
            Self::Block => AccuracyLevel::Block,
            Self::House => AccuracyLevel::House,
            Self::Room => AccuracyLevel::Room,
        }
    }

    /// Acceptance predicate: does this sample satisfy the accuracy policy?
    ///
    /// Samples failing the predicate are discarded silently; an imprecise
    /// fix is not an error.
    pub fn accepts(&self, sample: &LocationSample) -> bool {
        match self.level().horizontal_bound() {
            None => true,
            Some(bound) => sample.horizontal_accuracy <= bound,
        }
    }

    /// Returns true for the IP-lookup strategy variant.
    pub fn is_ip_lookup(&self) -> bool {
        matches!(self, Self::IpLookup(_))
    }
}

impl fmt::Debug for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IpLookup(_) => write!(f, "IpLookup"),
            other => write!(f, "{:?}", other.level()),
        }
    }
}

impl PartialEq for Accuracy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::IpLookup(a), Self::IpLookup(b)) => Arc::ptr_eq(a, b),
            (a, b) => {
                !a.is_ip_lookup() && !b.is_ip_lookup() && a.level() == b.level()
            }
        }
    }
}
