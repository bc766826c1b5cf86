//! Aggregated hardware session profile.

use crate::policy::{AccuracyLevel, ActivityType, Authorization};

/// The coarsest hardware configuration satisfying every running request.
///
/// Recomputed by the session manager whenever the active request set or a
/// profile-relevant policy field changes. The external hardware layer
/// configures the physical sensor session from this, once, instead of
/// once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionProfile {
    /// Strictest accuracy level demanded by any running location request.
    pub accuracy: AccuracyLevel,
    /// Most demanding activity type hint.
    pub activity: ActivityType,
    /// Highest authorization level any running request needs.
    pub authorization: Authorization,
    /// True when any running request is background-capable.
    pub background: bool,
    /// True when any heading request is running.
    pub heading: bool,
    /// Smallest degree-change filter among running heading requests;
    /// `None` when none are running or any of them is unfiltered.
    pub heading_filter: Option<f64>,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self {
            accuracy: AccuracyLevel::Any,
            activity: ActivityType::Other,
            authorization: Authorization::None,
            background: false,
            heading: false,
            heading_filter: None,
        }
    }
}

impl SessionProfile {
    /// True when no running request demands anything from the hardware.
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_idle() {
        assert!(SessionProfile::default().is_idle());
    }

    #[test]
    fn test_profile_with_demand_is_not_idle() {
        let profile = SessionProfile {
            accuracy: AccuracyLevel::House,
            ..Default::default()
        };
        assert!(!profile.is_idle());
    }
}
